use crate::access::{self, AccessContext};
use crate::config::AppConfig;
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::lifecycle;
use crate::models::{
    AccountSession, AssignItemPayload, BooleanResponse, ChangeMemberRolePayload, CreateGroupPayload,
    CreateInvitationPayload, CreateItemPayload, CreateWorkspacePayload, EntityStatus, FriendRequestPayload,
    FriendView, FriendshipRecord, FriendshipStatus, GlobalRole, GroupRecord, InvitationRecord, InvitationStatus,
    ItemRecord, ItemStatus, ListEntitiesFilters, ListWorkspacesFilters, MemberView, NotificationEvent,
    NotificationType, SessionRecord, SetWorkStatusPayload, SignInPayload, SignUpPayload, UpdateGroupPayload,
    UpdateItemPayload, UpdateWorkspacePayload, UserRecord, UserSummary, WorkspaceMember, WorkspaceRecord, WorkspaceRole,
};
use crate::notifications::NotificationDispatcher;
use crate::validation::{
    self, DEFAULT_GROUP_COLOR, MAX_DESCRIPTION_CHARS, MAX_NAME_CHARS, MAX_NOTES_CHARS, MAX_TITLE_CHARS,
};
use chrono::{Duration, Utc};
use rand::Rng;
use std::sync::Arc;

const SESSION_TOKEN_BYTES: usize = 32;
const MAX_IMAGE_URL_CHARS: usize = 2_000;

/// Re-issues an idempotent mutation once when the first attempt failed on the store.
/// Creates must not go through here.
pub fn retry_idempotent<T>(operation: &str, mut attempt: impl FnMut() -> AppResult<T>) -> AppResult<T> {
    match attempt() {
        Err(error) if error.is_transient() => {
            tracing::warn!(operation, error = %error, "transient failure; retrying once");
            attempt()
        }
        other => other,
    }
}

fn ensure_active(status: EntityStatus, what: &str) -> AppResult<()> {
    if status != EntityStatus::Active {
        return Err(AppError::Relation(format!("{} is {} and cannot be changed", what, status)));
    }
    Ok(())
}

fn new_session_token() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    bytes.iter().map(|byte| format!("{:02x}", byte)).collect()
}

/// Every domain operation behind the HTTP surface. Callers pass the already-authenticated actor id.
#[derive(Debug, Clone)]
pub struct WorkspaceService {
    db: Arc<Database>,
    notifier: NotificationDispatcher,
    invitation_ttl: Duration,
    session_ttl: Duration,
}

impl WorkspaceService {
    pub fn new(db: Arc<Database>, config: &AppConfig) -> Self {
        Self {
            notifier: NotificationDispatcher::new(Arc::clone(&db)),
            db,
            invitation_ttl: Duration::days(i64::from(config.invitation_ttl_days)),
            session_ttl: Duration::days(i64::from(config.session_ttl_days)),
        }
    }

    pub fn notifications(&self) -> &NotificationDispatcher {
        &self.notifier
    }

    /// Follow-up notifications never fail the mutation that caused them.
    fn notify(&self, event: NotificationEvent) {
        let kind = event.r#type;
        let recipient = event.user_id.clone();
        if let Err(error) = self.notifier.dispatch(event) {
            tracing::warn!(kind = %kind, user_id = %recipient, error = %error, "notification dispatch failed");
        }
    }

    fn touch(&self, workspace_id: &str) {
        if let Err(error) = self.db.touch_workspace(workspace_id) {
            tracing::warn!(workspace_id = %workspace_id, error = %error, "failed to bump workspace activity");
        }
    }

    fn actor(&self, actor_id: &str) -> AppResult<UserSummary> {
        self.db
            .get_user(actor_id)?
            .map(|user| user.summary())
            .ok_or_else(|| AppError::Authentication("Sign in required".to_string()))
    }

    // ─── Accounts & sessions ──────────────────────────────────────────────────

    pub fn sign_up(&self, payload: SignUpPayload) -> AppResult<AccountSession> {
        let normalized = SignUpPayload {
            name: validation::required_text("Name", &payload.name, MAX_NAME_CHARS)?,
            email: validation::email(&payload.email)?,
            image: validation::optional_text("Image", payload.image.as_deref(), MAX_IMAGE_URL_CHARS)?,
        };
        let user = self.db.create_user(&normalized, GlobalRole::User)?;
        let session = self.create_session(&user.id)?;
        tracing::info!(user_id = %user.id, "user signed up");
        Ok(AccountSession {
            user: user.summary(),
            session,
        })
    }

    /// Opens a new session for a returning user. The caller has already proven the email.
    pub fn sign_in(&self, payload: SignInPayload) -> AppResult<AccountSession> {
        let email = validation::email(&payload.email)?;
        let user = match self.db.get_user_by_email(&email)? {
            Some(user) if user.is_active => user,
            _ => return Err(AppError::Authentication("No active account for this email".to_string())),
        };
        let session = self.create_session(&user.id)?;
        tracing::info!(user_id = %user.id, "user signed in");
        Ok(AccountSession {
            user: user.summary(),
            session,
        })
    }

    pub fn create_session(&self, user_id: &str) -> AppResult<SessionRecord> {
        access::resolve_user(&self.db, user_id)?;
        let expires_at = Utc::now() + self.session_ttl;
        self.db.insert_session(user_id, &new_session_token(), expires_at)
    }

    /// Resolves a bearer session token to its user.
    pub fn authenticate(&self, token: &str) -> AppResult<UserRecord> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::Authentication("Sign in required".to_string()));
        }
        let invalid = || AppError::Authentication("Session is invalid or expired".to_string());
        let session = self.db.get_session(token)?.ok_or_else(invalid)?;
        if session.expires_at <= Utc::now() {
            self.db.delete_session(token)?;
            return Err(invalid());
        }
        match self.db.get_user(&session.user_id)? {
            Some(user) if user.is_active => Ok(user),
            _ => Err(invalid()),
        }
    }

    pub fn sign_out(&self, token: &str) -> AppResult<BooleanResponse> {
        let success = retry_idempotent("sign_out", || self.db.delete_session(token.trim()))?;
        Ok(BooleanResponse { success })
    }

    pub fn set_global_role(&self, actor_id: &str, user_id: &str, role: GlobalRole) -> AppResult<UserSummary> {
        validation::identifier("User", user_id)?;
        let actor = self
            .db
            .get_user(actor_id)?
            .ok_or_else(|| AppError::Authentication("Sign in required".to_string()))?;
        if actor.role != GlobalRole::SuperAdmin {
            return Err(AppError::Permission(
                "Only a super admin can change global roles".to_string(),
            ));
        }
        let target = access::resolve_user(&self.db, user_id)?;
        retry_idempotent("set_global_role", || self.db.set_user_role(&target.id, role))?;
        tracing::info!(actor_id = %actor_id, user_id = %target.id, role = %role, "global role changed");
        Ok(target)
    }

    // ─── Workspaces ───────────────────────────────────────────────────────────

    pub fn create_workspace(&self, actor_id: &str, payload: CreateWorkspacePayload) -> AppResult<WorkspaceRecord> {
        let title = validation::required_text("Title", &payload.title, MAX_TITLE_CHARS)?;
        let description =
            validation::optional_text("Description", payload.description.as_deref(), MAX_DESCRIPTION_CHARS)?;
        let categories = validation::categories(&payload.categories)?;
        self.actor(actor_id)?;

        let workspace = self
            .db
            .create_workspace(actor_id, &title, description.as_deref(), &categories)?;
        tracing::info!(workspace_id = %workspace.id, user_id = %actor_id, "workspace created");
        Ok(workspace)
    }

    pub fn list_workspaces(&self, actor_id: &str, filters: &ListWorkspacesFilters) -> AppResult<Vec<WorkspaceRecord>> {
        self.db
            .list_workspaces_for_user(actor_id, filters.status.unwrap_or(EntityStatus::Active))
    }

    pub fn get_workspace(&self, actor_id: &str, workspace_id: &str) -> AppResult<WorkspaceRecord> {
        access::require_role(&self.db, workspace_id, actor_id, WorkspaceRole::Viewer)?;
        self.db
            .get_workspace(workspace_id)?
            .ok_or_else(|| AppError::NotFound("Workspace not found".to_string()))
    }

    pub fn update_workspace(
        &self,
        actor_id: &str,
        workspace_id: &str,
        payload: UpdateWorkspacePayload,
    ) -> AppResult<WorkspaceRecord> {
        let normalized = UpdateWorkspacePayload {
            title: payload
                .title
                .as_deref()
                .map(|title| validation::required_text("Title", title, MAX_TITLE_CHARS))
                .transpose()?,
            description: validation::optional_text(
                "Description",
                payload.description.as_deref(),
                MAX_DESCRIPTION_CHARS,
            )?,
            categories: payload
                .categories
                .as_deref()
                .map(validation::categories)
                .transpose()?,
        };
        access::require_role(&self.db, workspace_id, actor_id, WorkspaceRole::Admin)?;
        ensure_active(access::resolve_workspace(&self.db, workspace_id)?.status, "Workspace")?;

        retry_idempotent("update_workspace", || self.db.update_workspace(workspace_id, &normalized))?;
        self.get_workspace(actor_id, workspace_id)
    }

    pub fn change_workspace_status(
        &self,
        actor_id: &str,
        workspace_id: &str,
        status: EntityStatus,
    ) -> AppResult<WorkspaceRecord> {
        lifecycle::transition_workspace(&self.db, actor_id, workspace_id, status)
    }

    // ─── Members ──────────────────────────────────────────────────────────────

    pub fn list_members(&self, actor_id: &str, workspace_id: &str) -> AppResult<Vec<MemberView>> {
        access::require_role(&self.db, workspace_id, actor_id, WorkspaceRole::Viewer)?;
        self.db.list_members(workspace_id)
    }

    fn target_member(&self, workspace_id: &str, user_id: &str) -> AppResult<WorkspaceMember> {
        access::resolve_membership(&self.db, workspace_id, user_id).map_err(|error| match error {
            AppError::Permission(_) => AppError::NotFound("Member not found".to_string()),
            other => other,
        })
    }

    /// Rank rules shared by role changes and removals of other members.
    fn guard_member_change(
        &self,
        context: &AccessContext,
        target: &WorkspaceMember,
        new_role: Option<WorkspaceRole>,
    ) -> AppResult<()> {
        let actor_role = context.effective_role();
        if target.role >= WorkspaceRole::Admin && actor_role < WorkspaceRole::Owner {
            return Err(AppError::Permission(
                "Only the workspace owner can change admins or owners".to_string(),
            ));
        }
        if let Some(role) = new_role {
            if role > actor_role {
                return Err(AppError::Permission(format!(
                    "You cannot grant the {} role",
                    role
                )));
            }
        }
        if target.role == WorkspaceRole::Owner
            && new_role != Some(WorkspaceRole::Owner)
            && self.db.count_owners(&target.workspace_id)? <= 1
        {
            return Err(AppError::Relation(
                "A workspace must keep at least one owner".to_string(),
            ));
        }
        Ok(())
    }

    pub fn change_member_role(
        &self,
        actor_id: &str,
        workspace_id: &str,
        member_id: &str,
        payload: ChangeMemberRolePayload,
    ) -> AppResult<WorkspaceMember> {
        validation::identifier("Member", member_id)?;
        let context = access::require_role(&self.db, workspace_id, actor_id, WorkspaceRole::Admin)?;
        ensure_active(access::resolve_workspace(&self.db, workspace_id)?.status, "Workspace")?;
        let target = self.target_member(workspace_id, member_id)?;
        if target.role == payload.role {
            return Ok(target);
        }
        self.guard_member_change(&context, &target, Some(payload.role))?;

        let updated = retry_idempotent("change_member_role", || {
            self.db.update_member_role(workspace_id, member_id, payload.role)
        })?;
        if !updated {
            // Legacy creator without a membership row.
            self.db.insert_member(workspace_id, member_id, payload.role)?;
        }
        self.touch(workspace_id);
        tracing::info!(
            workspace_id = %workspace_id,
            actor_id = %actor_id,
            user_id = %member_id,
            from = %target.role,
            to = %payload.role,
            "member role changed"
        );
        access::resolve_membership(&self.db, workspace_id, member_id)
    }

    /// Admins remove others; anyone may leave. The last owner stays.
    pub fn remove_member(&self, actor_id: &str, workspace_id: &str, member_id: &str) -> AppResult<BooleanResponse> {
        validation::identifier("Member", member_id)?;
        if actor_id == member_id {
            let context = access::require_role(&self.db, workspace_id, actor_id, WorkspaceRole::Viewer)?;
            if let Some(role) = context.member_role {
                if role == WorkspaceRole::Owner && self.db.count_owners(workspace_id)? <= 1 {
                    return Err(AppError::Relation(
                        "Transfer ownership before leaving this workspace".to_string(),
                    ));
                }
            }
        } else {
            let context = access::require_role(&self.db, workspace_id, actor_id, WorkspaceRole::Admin)?;
            let target = self.target_member(workspace_id, member_id)?;
            self.guard_member_change(&context, &target, None)?;
        }

        let success = retry_idempotent("remove_member", || self.db.delete_member(workspace_id, member_id))?;
        if !success {
            return Err(AppError::NotFound("Member not found".to_string()));
        }
        self.touch(workspace_id);
        tracing::info!(workspace_id = %workspace_id, actor_id = %actor_id, user_id = %member_id, "member removed");
        Ok(BooleanResponse { success })
    }

    // ─── Invitations ──────────────────────────────────────────────────────────

    /// Pending invitations of `invitee_id`, marking the expired ones on the way.
    fn refresh_pending_invitations(&self, invitee_id: &str) -> AppResult<Vec<InvitationRecord>> {
        let now = Utc::now();
        let mut pending = Vec::new();
        for invitation in self.db.list_pending_invitations(invitee_id)? {
            if invitation.expires_at.is_some_and(|expires_at| expires_at <= now) {
                self.db.set_invitation_status(&invitation.id, InvitationStatus::Expired)?;
                continue;
            }
            pending.push(invitation);
        }
        Ok(pending)
    }

    pub fn invite_member(
        &self,
        actor_id: &str,
        workspace_id: &str,
        payload: CreateInvitationPayload,
    ) -> AppResult<InvitationRecord> {
        validation::identifier("Invitee", &payload.invitee_id)?;
        let role = payload.role.unwrap_or(WorkspaceRole::Member);
        let context = access::require_role(&self.db, workspace_id, actor_id, WorkspaceRole::Admin)?;
        let workspace = access::resolve_workspace(&self.db, workspace_id)?;
        ensure_active(workspace.status, "Workspace")?;
        if role > context.effective_role() {
            return Err(AppError::Permission(format!("You cannot invite with the {} role", role)));
        }

        let invitee = access::resolve_user(&self.db, &payload.invitee_id)?;
        match access::resolve_membership(&self.db, &workspace.id, &invitee.id) {
            Ok(_) => {
                return Err(AppError::Duplicate(
                    "User is already a member of this workspace".to_string(),
                ))
            }
            Err(AppError::Permission(_)) => {}
            Err(error) => return Err(error),
        }
        self.refresh_pending_invitations(&invitee.id)?;

        let invitation = self.db.insert_invitation(
            &workspace.id,
            actor_id,
            &invitee.id,
            role,
            Some(Utc::now() + self.invitation_ttl),
        )?;
        let inviter = self.actor(actor_id)?;
        self.notify(NotificationEvent {
            user_id: invitee.id,
            reference_id: workspace.id.clone(),
            message: format!("{} invited you to join {}", inviter.name, workspace.title),
            r#type: NotificationType::WorkspaceInvite,
            image: inviter.image,
            name_reference: Some(inviter.name),
        });
        self.touch(&workspace.id);
        Ok(invitation)
    }

    pub fn list_invitations(&self, actor_id: &str) -> AppResult<Vec<InvitationRecord>> {
        self.refresh_pending_invitations(actor_id)
    }

    fn pending_invitation_for(&self, actor_id: &str, invitation_id: &str) -> AppResult<InvitationRecord> {
        validation::identifier("Invitation", invitation_id)?;
        let invitation = self
            .db
            .get_invitation(invitation_id)?
            .filter(|invitation| invitation.invitee_id == actor_id)
            .ok_or_else(|| AppError::NotFound("Invitation not found".to_string()))?;
        if invitation.status != InvitationStatus::Pending {
            return Err(AppError::Relation(format!("Invitation is already {}", invitation.status)));
        }
        if invitation.expires_at.is_some_and(|expires_at| expires_at <= Utc::now()) {
            self.db.set_invitation_status(&invitation.id, InvitationStatus::Expired)?;
            return Err(AppError::Relation("Invitation has expired".to_string()));
        }
        Ok(invitation)
    }

    pub fn accept_invitation(&self, actor_id: &str, invitation_id: &str) -> AppResult<InvitationRecord> {
        let invitation = self.pending_invitation_for(actor_id, invitation_id)?;
        let workspace = access::resolve_workspace(&self.db, &invitation.workspace_id)?;
        if workspace.status == EntityStatus::Deleted {
            return Err(AppError::Relation("Workspace has been deleted".to_string()));
        }

        self.db.accept_invitation(&invitation)?;
        tracing::info!(
            workspace_id = %workspace.id,
            user_id = %actor_id,
            role = %invitation.role,
            "invitation accepted"
        );

        let invitee = self.actor(actor_id)?;
        self.notify(NotificationEvent {
            user_id: invitation.inviter_id.clone(),
            reference_id: workspace.id.clone(),
            message: format!("{} joined {}", invitee.name, workspace.title),
            r#type: NotificationType::WorkspaceAccepted,
            image: invitee.image,
            name_reference: Some(invitee.name),
        });
        self.db
            .get_invitation(&invitation.id)?
            .ok_or_else(|| AppError::NotFound("Invitation not found".to_string()))
    }

    pub fn decline_invitation(&self, actor_id: &str, invitation_id: &str) -> AppResult<InvitationRecord> {
        let invitation = self.pending_invitation_for(actor_id, invitation_id)?;
        if !self.db.set_invitation_status(&invitation.id, InvitationStatus::Declined)? {
            return Err(AppError::Relation("Invitation is no longer pending".to_string()));
        }
        self.db
            .get_invitation(&invitation.id)?
            .ok_or_else(|| AppError::NotFound("Invitation not found".to_string()))
    }

    // ─── Groups ───────────────────────────────────────────────────────────────

    pub fn create_group(&self, actor_id: &str, workspace_id: &str, payload: CreateGroupPayload) -> AppResult<GroupRecord> {
        let title = validation::required_text("Title", &payload.title, MAX_TITLE_CHARS)?;
        let color = validation::text_color(payload.text_color.as_deref())?
            .unwrap_or_else(|| DEFAULT_GROUP_COLOR.to_string());
        access::require_role(&self.db, workspace_id, actor_id, WorkspaceRole::Member)?;
        ensure_active(access::resolve_workspace(&self.db, workspace_id)?.status, "Workspace")?;

        let group = self.db.insert_group(workspace_id, &title, &color)?;
        self.touch(workspace_id);
        Ok(group)
    }

    pub fn list_groups(
        &self,
        actor_id: &str,
        workspace_id: &str,
        filters: &ListEntitiesFilters,
    ) -> AppResult<Vec<GroupRecord>> {
        access::require_role(&self.db, workspace_id, actor_id, WorkspaceRole::Viewer)?;
        self.db
            .list_groups(workspace_id, filters.status.unwrap_or(EntityStatus::Active))
    }

    pub fn update_group(&self, actor_id: &str, group_id: &str, payload: UpdateGroupPayload) -> AppResult<GroupRecord> {
        let normalized = UpdateGroupPayload {
            title: payload
                .title
                .as_deref()
                .map(|title| validation::required_text("Title", title, MAX_TITLE_CHARS))
                .transpose()?,
            text_color: validation::text_color(payload.text_color.as_deref())?,
        };
        let (group, _) = access::require_group_role(&self.db, group_id, actor_id, WorkspaceRole::Member)?;
        ensure_active(group.status, "Group")?;

        retry_idempotent("update_group", || self.db.update_group(&group.id, &normalized))?;
        self.touch(&group.workspace_id);
        self.db
            .get_group(&group.id)?
            .ok_or_else(|| AppError::NotFound("Group not found".to_string()))
    }

    pub fn change_group_status(&self, actor_id: &str, group_id: &str, status: EntityStatus) -> AppResult<GroupRecord> {
        lifecycle::transition_group(&self.db, actor_id, group_id, status)
    }

    // ─── Items ────────────────────────────────────────────────────────────────

    /// Assignees must belong to the workspace at assignment time.
    fn ensure_assignable(&self, workspace_id: &str, assignee_id: &str) -> AppResult<()> {
        match access::resolve_membership(&self.db, workspace_id, assignee_id) {
            Ok(_) => Ok(()),
            Err(AppError::Permission(_)) => Err(AppError::Relation(
                "Assignee must be a member of the workspace".to_string(),
            )),
            Err(error) => Err(error),
        }
    }

    fn notify_assignment(&self, actor_id: &str, item: &ItemRecord) {
        let Some(assignee) = item.assigned_to.as_deref() else {
            return;
        };
        if assignee == actor_id {
            return;
        }
        let actor_name = self
            .actor(actor_id)
            .map(|actor| actor.name)
            .unwrap_or_else(|_| "Someone".to_string());
        self.notify(NotificationEvent {
            user_id: assignee.to_string(),
            reference_id: item.id.clone(),
            message: format!("{} assigned you to {}", actor_name, item.title),
            r#type: NotificationType::ItemAssigned,
            image: None,
            name_reference: Some(item.title.clone()),
        });
    }

    pub fn create_item(&self, actor_id: &str, group_id: &str, payload: CreateItemPayload) -> AppResult<ItemRecord> {
        let normalized = CreateItemPayload {
            title: validation::required_text("Title", &payload.title, MAX_TITLE_CHARS)?,
            notes: validation::optional_text("Notes", payload.notes.as_deref(), MAX_NOTES_CHARS)?,
            description: validation::optional_text(
                "Description",
                payload.description.as_deref(),
                MAX_DESCRIPTION_CHARS,
            )?,
            assigned_to: payload.assigned_to.filter(|assignee| !assignee.trim().is_empty()),
            ..payload
        };
        let (group, _) = access::require_group_role(&self.db, group_id, actor_id, WorkspaceRole::Member)?;
        ensure_active(access::resolve_workspace(&self.db, &group.workspace_id)?.status, "Workspace")?;
        ensure_active(group.status, "Group")?;
        if let Some(assignee) = normalized.assigned_to.as_deref() {
            self.ensure_assignable(&group.workspace_id, assignee)?;
        }

        let item = self.db.insert_item(&group.id, actor_id, &normalized)?;
        self.touch(&group.workspace_id);
        self.notify_assignment(actor_id, &item);
        Ok(item)
    }

    pub fn list_items(&self, actor_id: &str, group_id: &str, filters: &ListEntitiesFilters) -> AppResult<Vec<ItemRecord>> {
        let (group, _) = access::require_group_role(&self.db, group_id, actor_id, WorkspaceRole::Viewer)?;
        self.db
            .list_items(&group.id, filters.status.unwrap_or(EntityStatus::Active))
    }

    pub fn get_item(&self, actor_id: &str, item_id: &str) -> AppResult<ItemRecord> {
        let (item, _) = access::require_item_role(&self.db, item_id, actor_id, WorkspaceRole::Viewer)?;
        self.db
            .get_item(&item.id)?
            .ok_or_else(|| AppError::NotFound("Item not found".to_string()))
    }

    pub fn update_item(&self, actor_id: &str, item_id: &str, payload: UpdateItemPayload) -> AppResult<ItemRecord> {
        let normalized = UpdateItemPayload {
            title: payload
                .title
                .as_deref()
                .map(|title| validation::required_text("Title", title, MAX_TITLE_CHARS))
                .transpose()?,
            notes: validation::optional_text("Notes", payload.notes.as_deref(), MAX_NOTES_CHARS)?,
            description: validation::optional_text(
                "Description",
                payload.description.as_deref(),
                MAX_DESCRIPTION_CHARS,
            )?,
            ..payload
        };
        let (item, _) = access::require_item_edit_permission(&self.db, item_id, actor_id)?;
        ensure_active(item.entity_status, "Item")?;

        retry_idempotent("update_item", || self.db.update_item(&item.id, &normalized))?;
        self.touch(&item.workspace_id);
        self.get_item(actor_id, &item.id)
    }

    pub fn assign_item(&self, actor_id: &str, item_id: &str, payload: AssignItemPayload) -> AppResult<ItemRecord> {
        let assignee = payload
            .assigned_to
            .map(|assignee| assignee.trim().to_string())
            .filter(|assignee| !assignee.is_empty());
        let (item, _) = access::require_item_edit_permission(&self.db, item_id, actor_id)?;
        ensure_active(item.entity_status, "Item")?;
        if let Some(assignee) = assignee.as_deref() {
            self.ensure_assignable(&item.workspace_id, assignee)?;
        }

        retry_idempotent("assign_item", || self.db.set_item_assignee(&item.id, assignee.as_deref()))?;
        self.touch(&item.workspace_id);
        let updated = self.get_item(actor_id, &item.id)?;
        self.notify_assignment(actor_id, &updated);
        Ok(updated)
    }

    pub fn set_item_work_status(
        &self,
        actor_id: &str,
        item_id: &str,
        payload: SetWorkStatusPayload,
    ) -> AppResult<ItemRecord> {
        let (item, _) = access::require_item_edit_permission(&self.db, item_id, actor_id)?;
        ensure_active(item.entity_status, "Item")?;
        let previous = self.get_item(actor_id, &item.id)?.status;

        retry_idempotent("set_item_work_status", || {
            self.db.set_item_work_status(&item.id, payload.status)
        })?;
        self.touch(&item.workspace_id);

        if payload.status == ItemStatus::Done && previous != ItemStatus::Done && item.created_by != actor_id {
            let actor_name = self
                .actor(actor_id)
                .map(|actor| actor.name)
                .unwrap_or_else(|_| "Someone".to_string());
            self.notify(NotificationEvent {
                user_id: item.created_by.clone(),
                reference_id: item.id.clone(),
                message: format!("{} completed {}", actor_name, item.title),
                r#type: NotificationType::ItemCompleted,
                image: None,
                name_reference: Some(item.title.clone()),
            });
        }
        self.get_item(actor_id, &item.id)
    }

    pub fn change_item_status(&self, actor_id: &str, item_id: &str, status: EntityStatus) -> AppResult<ItemRecord> {
        lifecycle::transition_item(&self.db, actor_id, item_id, status)
    }

    // ─── Friendships ──────────────────────────────────────────────────────────

    pub fn send_friend_request(&self, actor_id: &str, payload: FriendRequestPayload) -> AppResult<FriendshipRecord> {
        validation::identifier("Addressee", &payload.addressee_id)?;
        if payload.addressee_id == actor_id {
            return Err(AppError::Validation(
                "You cannot send a friend request to yourself".to_string(),
            ));
        }
        let requester = self.actor(actor_id)?;
        let addressee = access::resolve_user(&self.db, &payload.addressee_id)?;

        if let Some(existing) = self.db.find_friendship_between(actor_id, &addressee.id)? {
            return Err(match existing.status {
                FriendshipStatus::Accepted => AppError::Duplicate("You are already friends".to_string()),
                FriendshipStatus::Pending if existing.requester_id == actor_id => {
                    AppError::Duplicate("Friend request already sent".to_string())
                }
                FriendshipStatus::Pending => AppError::AlreadyReceived(
                    "This user has already sent you a friend request".to_string(),
                ),
            });
        }

        let friendship = self.db.insert_friendship(actor_id, &addressee.id)?;
        self.notify(NotificationEvent {
            user_id: addressee.id,
            reference_id: requester.id,
            message: format!("{} sent you a friend request", requester.name),
            r#type: NotificationType::FriendRequest,
            image: None,
            name_reference: None,
        });
        Ok(friendship)
    }

    pub fn accept_friend_request(&self, actor_id: &str, friendship_id: &str) -> AppResult<FriendshipRecord> {
        validation::identifier("Friend request", friendship_id)?;
        let friendship = self
            .db
            .get_friendship(friendship_id)?
            .filter(|friendship| friendship.requester_id == actor_id || friendship.addressee_id == actor_id)
            .ok_or_else(|| AppError::NotFound("Friend request not found".to_string()))?;
        if friendship.addressee_id != actor_id {
            return Err(AppError::Permission(
                "Only the recipient can accept a friend request".to_string(),
            ));
        }
        if friendship.status == FriendshipStatus::Accepted || !self.db.accept_friendship(&friendship.id)? {
            return Err(AppError::Duplicate("You are already friends".to_string()));
        }

        let addressee = self.actor(actor_id)?;
        self.notify(NotificationEvent {
            user_id: friendship.requester_id.clone(),
            reference_id: addressee.id,
            message: format!("{} accepted your friend request", addressee.name),
            r#type: NotificationType::FriendAccepted,
            image: None,
            name_reference: None,
        });
        self.db
            .get_friendship(&friendship.id)?
            .ok_or_else(|| AppError::NotFound("Friend request not found".to_string()))
    }

    /// Declines, cancels or unfriends. Either side of the pair may do it.
    pub fn remove_friendship(&self, actor_id: &str, friendship_id: &str) -> AppResult<BooleanResponse> {
        validation::identifier("Friend request", friendship_id)?;
        let friendship = self
            .db
            .get_friendship(friendship_id)?
            .filter(|friendship| friendship.requester_id == actor_id || friendship.addressee_id == actor_id)
            .ok_or_else(|| AppError::NotFound("Friend request not found".to_string()))?;
        let success = retry_idempotent("remove_friendship", || self.db.delete_friendship(&friendship.id))?;
        Ok(BooleanResponse { success })
    }

    pub fn list_friends(&self, actor_id: &str) -> AppResult<Vec<FriendView>> {
        self.db.list_friendships(actor_id)
    }
}
