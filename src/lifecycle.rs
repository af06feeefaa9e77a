//! ACTIVE / ARCHIVED / DELETED transitions for workspaces, groups and items.

use crate::access::{self, AccessContext};
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{EntityStatus, GroupRecord, ItemRecord, WorkspaceRecord, WorkspaceRole};
use chrono::Utc;

/// Minimum workspace role for `current -> target`, or `None` when nothing would change.
pub fn required_role(current: EntityStatus, target: EntityStatus) -> Option<WorkspaceRole> {
    use EntityStatus::{Active, Archived, Deleted};
    match (current, target) {
        (Active, Active) | (Archived, Archived) | (Deleted, Deleted) => None,
        (Deleted, _) => Some(WorkspaceRole::Owner),
        (_, Deleted) => Some(WorkspaceRole::Admin),
        (Active, Archived) | (Archived, Active) => Some(WorkspaceRole::Member),
    }
}

/// Table lookup plus the narrower rule that MEMBER and VIEWER may only restore to ACTIVE.
pub fn authorize_transition(actor: WorkspaceRole, current: EntityStatus, target: EntityStatus) -> AppResult<()> {
    let Some(required) = required_role(current, target) else {
        return Err(AppError::Validation(format!("Status is already {}", target)));
    };

    if actor < WorkspaceRole::Admin && target != EntityStatus::Active {
        return Err(AppError::Permission(format!(
            "The {} role may only restore entries to {}",
            actor,
            EntityStatus::Active
        )));
    }

    if !actor.satisfies(required) {
        return Err(AppError::Permission(if current == EntityStatus::Deleted {
            "Only the workspace owner can restore deleted entries".to_string()
        } else {
            format!("Moving from {} to {} requires the {} role", current, target, required)
        }));
    }

    Ok(())
}

fn authorize(context: &AccessContext, current: EntityStatus, target: EntityStatus) -> AppResult<()> {
    let result = authorize_transition(context.effective_role(), current, target);
    if let Err(error) = &result {
        tracing::debug!(
            workspace_id = %context.workspace_id,
            user_id = %context.user_id,
            from = %current,
            to = %target,
            error = %error,
            "status transition rejected"
        );
    }
    result
}

pub fn transition_workspace(
    db: &Database,
    actor_id: &str,
    workspace_id: &str,
    target: EntityStatus,
) -> AppResult<WorkspaceRecord> {
    // Membership before existence: a non-member gets Permission for a missing id too.
    let context = access::require_role(db, workspace_id, actor_id, WorkspaceRole::Viewer)?;
    let workspace = access::resolve_workspace(db, workspace_id)?;
    authorize(&context, workspace.status, target)?;

    db.set_workspace_status(&workspace.id, target, actor_id, Utc::now())?;
    tracing::info!(workspace_id = %workspace.id, user_id = %actor_id, from = %workspace.status, to = %target, "workspace status changed");
    db.get_workspace(&workspace.id)?
        .ok_or_else(|| AppError::NotFound("Workspace not found".to_string()))
}

pub fn transition_group(db: &Database, actor_id: &str, group_id: &str, target: EntityStatus) -> AppResult<GroupRecord> {
    let (group, context) = access::require_group_role(db, group_id, actor_id, WorkspaceRole::Viewer)?;
    authorize(&context, group.status, target)?;

    db.set_group_status(&group.id, target)?;
    db.touch_workspace(&group.workspace_id)?;
    tracing::info!(group_id = %group.id, user_id = %actor_id, from = %group.status, to = %target, "group status changed");
    db.get_group(&group.id)?
        .ok_or_else(|| AppError::NotFound("Group not found".to_string()))
}

pub fn transition_item(db: &Database, actor_id: &str, item_id: &str, target: EntityStatus) -> AppResult<ItemRecord> {
    let (item, context) = access::require_item_role(db, item_id, actor_id, WorkspaceRole::Viewer)?;
    authorize(&context, item.entity_status, target)?;

    db.set_item_entity_status(&item.id, target)?;
    db.touch_workspace(&item.workspace_id)?;
    tracing::info!(item_id = %item.id, user_id = %actor_id, from = %item.entity_status, to = %target, "item status changed");
    db.get_item(&item.id)?
        .ok_or_else(|| AppError::NotFound("Item not found".to_string()))
}
