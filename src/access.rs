//! Authorization checks shared by every read and mutation path.
//!
//! Existence is resolved before permission. Membership doubles as access: a user without a
//! membership row gets `Permission`, never `NotFound`, so non-members cannot detect which workspaces exist.

use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{
    GlobalRole, GroupRef, ItemRef, UserSummary, WorkspaceMember, WorkspaceRef, WorkspaceRole,
};

const NO_ACCESS_MESSAGE: &str = "You do not have access to this workspace";

/// Outcome of a successful role check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessContext {
    pub workspace_id: String,
    pub user_id: String,
    /// `None` when access was granted only through the super-admin bypass.
    pub member_role: Option<WorkspaceRole>,
    pub global_role: GlobalRole,
}

impl AccessContext {
    pub fn is_super_admin(&self) -> bool {
        self.global_role == GlobalRole::SuperAdmin
    }

    /// Rank used by role-dependent rules. Super admins act as OWNER.
    pub fn effective_role(&self) -> WorkspaceRole {
        if self.is_super_admin() {
            return WorkspaceRole::Owner;
        }
        self.member_role.unwrap_or(WorkspaceRole::Viewer)
    }
}

pub fn resolve_user(db: &Database, user_id: &str) -> AppResult<UserSummary> {
    db.get_user(user_id)?
        .map(|user| user.summary())
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

pub fn resolve_workspace(db: &Database, workspace_id: &str) -> AppResult<WorkspaceRef> {
    db.get_workspace_ref(workspace_id)?
        .ok_or_else(|| AppError::NotFound("Workspace not found".to_string()))
}

pub fn resolve_group(db: &Database, group_id: &str) -> AppResult<GroupRef> {
    db.get_group_ref(group_id)?
        .ok_or_else(|| AppError::NotFound("Group not found".to_string()))
}

pub fn resolve_item(db: &Database, item_id: &str) -> AppResult<ItemRef> {
    db.get_item_ref(item_id)?
        .ok_or_else(|| AppError::NotFound("Item not found".to_string()))
}

/// The actor's membership row, joined with their global role.
///
/// Workspaces created before membership rows existed only carry `user_id`; their creator is
/// treated as an OWNER member for as long as the workspace has no rows at all. Once any row
/// exists, a creator without one has left or been removed.
pub fn resolve_membership(db: &Database, workspace_id: &str, user_id: &str) -> AppResult<WorkspaceMember> {
    if let Some(member) = db.get_member(workspace_id, user_id)? {
        return Ok(member);
    }

    if let Some(workspace) = db.get_workspace(workspace_id)? {
        if workspace.user_id == user_id && db.count_members(workspace_id)? == 0 {
            if let Some(user) = db.get_user(user_id)? {
                return Ok(WorkspaceMember {
                    workspace_id: workspace.id,
                    user_id: user.id,
                    role: WorkspaceRole::Owner,
                    joined_at: workspace.created_at,
                    user_role: user.role,
                });
            }
        }
    }

    tracing::debug!(workspace_id = %workspace_id, user_id = %user_id, "no membership for workspace");
    Err(AppError::Permission(NO_ACCESS_MESSAGE.to_string()))
}

/// Single choke point for workspace-scoped permission.
pub fn require_role(
    db: &Database,
    workspace_id: &str,
    user_id: &str,
    minimum: WorkspaceRole,
) -> AppResult<AccessContext> {
    let member = match resolve_membership(db, workspace_id, user_id) {
        Ok(member) => member,
        Err(AppError::Permission(message)) => {
            let is_super_admin = db
                .get_user(user_id)?
                .map(|user| user.role == GlobalRole::SuperAdmin)
                .unwrap_or(false);
            if !is_super_admin {
                return Err(AppError::Permission(message));
            }
            resolve_workspace(db, workspace_id)?;
            tracing::info!(workspace_id = %workspace_id, user_id = %user_id, "super admin bypass without membership");
            return Ok(AccessContext {
                workspace_id: workspace_id.to_string(),
                user_id: user_id.to_string(),
                member_role: None,
                global_role: GlobalRole::SuperAdmin,
            });
        }
        Err(error) => return Err(error),
    };

    let context = AccessContext {
        workspace_id: member.workspace_id.clone(),
        user_id: member.user_id.clone(),
        member_role: Some(member.role),
        global_role: member.user_role,
    };

    if context.is_super_admin() || member.role.satisfies(minimum) {
        return Ok(context);
    }

    tracing::debug!(
        workspace_id = %workspace_id,
        user_id = %user_id,
        role = %member.role,
        required = %minimum,
        "workspace role below requirement"
    );
    Err(AppError::Permission(format!(
        "This action requires the {} role or higher",
        minimum
    )))
}

/// Resolves the group, then checks the actor's role on its workspace.
pub fn require_group_role(
    db: &Database,
    group_id: &str,
    user_id: &str,
    minimum: WorkspaceRole,
) -> AppResult<(GroupRef, AccessContext)> {
    let group = resolve_group(db, group_id)?;
    let context = require_role(db, &group.workspace_id, user_id, minimum)?;
    Ok((group, context))
}

/// Resolves the item, then checks the actor's role on the workspace that owns its group.
pub fn require_item_role(
    db: &Database,
    item_id: &str,
    user_id: &str,
    minimum: WorkspaceRole,
) -> AppResult<(ItemRef, AccessContext)> {
    let item = resolve_item(db, item_id)?;
    let context = require_role(db, &item.workspace_id, user_id, minimum)?;
    Ok((item, context))
}

/// Any member of the item's workspace may edit item fields.
pub fn require_item_edit_permission(db: &Database, item_id: &str, user_id: &str) -> AppResult<(ItemRef, AccessContext)> {
    require_item_role(db, item_id, user_id, WorkspaceRole::Viewer)
}

#[cfg(test)]
mod tests {
    use super::{require_item_edit_permission, require_role, resolve_membership, resolve_user};
    use crate::db::Database;
    use crate::errors::AppError;
    use crate::models::{CreateItemPayload, GlobalRole, SignUpPayload, WorkspaceRole};

    struct Fixture {
        _dir: tempfile::TempDir,
        db: Database,
        workspace_id: String,
        alice: String,
        bob: String,
        carol: String,
        dave: String,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("access.db")).expect("db");
        let mut ids = Vec::new();
        for name in ["alice", "bob", "carol", "dave"] {
            let user = db
                .create_user(
                    &SignUpPayload {
                        name: name.to_string(),
                        email: format!("{}@example.com", name),
                        image: None,
                    },
                    GlobalRole::User,
                )
                .expect("user");
            ids.push(user.id);
        }
        let workspace = db.create_workspace(&ids[0], "W", None, &[]).expect("workspace");
        db.insert_member(&workspace.id, &ids[1], WorkspaceRole::Admin).expect("bob");
        db.insert_member(&workspace.id, &ids[2], WorkspaceRole::Member).expect("carol");
        Fixture {
            _dir: dir,
            db,
            workspace_id: workspace.id,
            alice: ids[0].clone(),
            bob: ids[1].clone(),
            carol: ids[2].clone(),
            dave: ids[3].clone(),
        }
    }

    #[test]
    fn role_checks_follow_hierarchy() {
        let f = fixture();
        assert!(matches!(
            require_role(&f.db, &f.workspace_id, &f.carol, WorkspaceRole::Admin),
            Err(AppError::Permission(_))
        ));
        let context = require_role(&f.db, &f.workspace_id, &f.bob, WorkspaceRole::Admin).expect("bob is admin");
        assert_eq!(context.member_role, Some(WorkspaceRole::Admin));
        require_role(&f.db, &f.workspace_id, &f.alice, WorkspaceRole::Owner).expect("alice owns");
    }

    #[test]
    fn role_checks_are_monotonic() {
        let f = fixture();
        let actors = [
            (WorkspaceRole::Member, &f.carol),
            (WorkspaceRole::Admin, &f.bob),
            (WorkspaceRole::Owner, &f.alice),
        ];
        for minimum in WorkspaceRole::ALL {
            for (role, actor) in actors {
                let allowed = require_role(&f.db, &f.workspace_id, actor, minimum).is_ok();
                assert_eq!(allowed, role >= minimum, "{} vs {}", role, minimum);
            }
        }
    }

    #[test]
    fn non_members_get_permission_denied_not_not_found() {
        let f = fixture();
        assert!(matches!(
            resolve_membership(&f.db, &f.workspace_id, &f.dave),
            Err(AppError::Permission(_))
        ));
        assert!(matches!(
            require_role(&f.db, &f.workspace_id, &f.dave, WorkspaceRole::Viewer),
            Err(AppError::Permission(_))
        ));
        assert!(matches!(
            require_role(&f.db, "missing-workspace", &f.dave, WorkspaceRole::Viewer),
            Err(AppError::Permission(_))
        ));
    }

    #[test]
    fn super_admin_bypasses_rank_and_membership() {
        let f = fixture();
        f.db.set_user_role(&f.carol, GlobalRole::SuperAdmin).expect("promote carol");
        let context = require_role(&f.db, &f.workspace_id, &f.carol, WorkspaceRole::Owner).expect("bypass");
        assert_eq!(context.member_role, Some(WorkspaceRole::Member));
        assert_eq!(context.effective_role(), WorkspaceRole::Owner);

        f.db.set_user_role(&f.dave, GlobalRole::SuperAdmin).expect("promote dave");
        let context = require_role(&f.db, &f.workspace_id, &f.dave, WorkspaceRole::Owner).expect("no row bypass");
        assert_eq!(context.member_role, None);
        assert!(matches!(
            require_role(&f.db, "missing-workspace", &f.dave, WorkspaceRole::Viewer),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn legacy_creator_without_row_is_owner() {
        let f = fixture();
        let legacy = f.db.create_workspace(&f.alice, "Legacy", None, &[]).expect("workspace");
        f.db.delete_member(&legacy.id, &f.alice).expect("drop row");
        assert_eq!(f.db.count_members(&legacy.id).expect("count"), 0);
        let member = resolve_membership(&f.db, &legacy.id, &f.alice).expect("legacy owner");
        assert_eq!(member.role, WorkspaceRole::Owner);
    }

    #[test]
    fn removed_creator_loses_access() {
        let f = fixture();
        f.db.delete_member(&f.workspace_id, &f.alice).expect("drop row");
        assert!(matches!(
            resolve_membership(&f.db, &f.workspace_id, &f.alice),
            Err(AppError::Permission(_))
        ));
        assert!(matches!(
            require_role(&f.db, &f.workspace_id, &f.alice, WorkspaceRole::Viewer),
            Err(AppError::Permission(_))
        ));
    }

    #[test]
    fn item_edit_requires_membership_only() {
        let f = fixture();
        let group = f.db.insert_group(&f.workspace_id, "G", "#000000").expect("group");
        let item = f
            .db
            .insert_item(
                &group.id,
                &f.alice,
                &CreateItemPayload {
                    title: "Task".to_string(),
                    ..CreateItemPayload::default()
                },
            )
            .expect("item");
        require_item_edit_permission(&f.db, &item.id, &f.carol).expect("member edits");
        assert!(matches!(
            require_item_edit_permission(&f.db, &item.id, &f.dave),
            Err(AppError::Permission(_))
        ));
        assert!(matches!(
            require_item_edit_permission(&f.db, "missing", &f.carol),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(resolve_user(&f.db, "missing"), Err(AppError::NotFound(_))));
    }
}
