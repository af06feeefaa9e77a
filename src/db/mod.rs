use crate::errors::{AppError, AppResult};
use crate::models::{
    CreateItemPayload, EntityStatus, FriendView, FriendshipRecord, FriendshipStatus, GlobalRole, GroupRecord,
    GroupRef, InvitationRecord, InvitationStatus, ItemRecord, ItemRef, ItemStatus, MemberView, NotificationRecord,
    NotificationType, Priority, SessionRecord, SignUpPayload, UpdateGroupPayload, UpdateItemPayload,
    UpdateWorkspacePayload, UserRecord, UserSummary, WorkspaceMember, WorkspaceRecord, WorkspaceRef, WorkspaceRole,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("schema.sql");

const USER_COLUMNS: &str = "id, name, email, image, role, is_active, created_at";
const WORKSPACE_COLUMNS: &str = "id, title, description, categories_json, user_id, status, status_changed_at, status_changed_by, last_activity_at, created_at";
const GROUP_COLUMNS: &str = "id, workspace_id, title, text_color, status, created_at";
const ITEM_COLUMNS: &str = "id, group_id, title, notes, description, details_json, term, priority, status, entity_status, created_by, assigned_to, created_at, updated_at";
const NOTIFICATION_COLUMNS: &str = "id, user_id, type, message, reference_id, image, name_reference, is_read, created_at";
const INVITATION_COLUMNS: &str = "id, workspace_id, inviter_id, invitee_id, role, status, expires_at, created_at";
const FRIENDSHIP_COLUMNS: &str = "id, requester_id, addressee_id, status, created_at";

/// A notification about to be persisted.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: String,
    pub r#type: NotificationType,
    pub message: String,
    pub reference_id: String,
    pub image: Option<String>,
    pub name_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapedWorkspaces {
    pub workspaces: u64,
    pub notifications: u64,
}

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> AppResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> AppResult<Self> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }

    // ─── Users & sessions ─────────────────────────────────────────────────────

    /// Creates the user and its settings row together.
    pub fn create_user(&self, payload: &SignUpPayload, role: GlobalRole) -> AppResult<UserRecord> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO users (id, name, email, image, role, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
            params![
                id,
                payload.name,
                payload.email,
                payload.image,
                role.as_str(),
                format_time(now)
            ],
        )
        .map_err(|error| match AppError::from(error) {
            AppError::Duplicate(_) => AppError::Duplicate("Email address is already registered".to_string()),
            other => other,
        })?;
        tx.execute(
            "INSERT INTO user_settings (user_id, email_notifications, created_at) VALUES (?1, 1, ?2)",
            params![id, format_time(now)],
        )?;
        tx.commit()?;

        Ok(UserRecord {
            id,
            name: payload.name.clone(),
            email: payload.email.clone(),
            image: payload.image.clone(),
            role,
            is_active: true,
            created_at: now,
        })
    }

    pub fn get_user(&self, user_id: &str) -> AppResult<Option<UserRecord>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            [user_id],
            parse_user_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn get_user_by_email(&self, email: &str) -> AppResult<Option<UserRecord>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            [email],
            parse_user_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn set_user_role(&self, user_id: &str, role: GlobalRole) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE users SET role = ?1 WHERE id = ?2",
            params![role.as_str(), user_id],
        )?;
        Ok(changed > 0)
    }

    pub fn list_active_user_ids(&self) -> AppResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM users WHERE is_active = 1 ORDER BY created_at ASC")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn insert_session(&self, user_id: &str, token: &str, expires_at: DateTime<Utc>) -> AppResult<SessionRecord> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sessions (token, user_id, expires_at, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![token, user_id, format_time(expires_at), format_time(Utc::now())],
        )?;
        Ok(SessionRecord {
            token: token.to_string(),
            user_id: user_id.to_string(),
            expires_at,
        })
    }

    pub fn get_session(&self, token: &str) -> AppResult<Option<SessionRecord>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT token, user_id, expires_at FROM sessions WHERE token = ?1",
            [token],
            |row| {
                Ok(SessionRecord {
                    token: row.get(0)?,
                    user_id: row.get(1)?,
                    expires_at: parse_time(&row.get::<_, String>(2)?)?,
                })
            },
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn delete_session(&self, token: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM sessions WHERE token = ?1", [token])?;
        Ok(changed > 0)
    }

    // ─── Workspaces ───────────────────────────────────────────────────────────

    /// Inserts the workspace and its creator's OWNER membership in one transaction.
    pub fn create_workspace(
        &self,
        owner_id: &str,
        title: &str,
        description: Option<&str>,
        categories: &[String],
    ) -> AppResult<WorkspaceRecord> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let categories_json = serde_json::to_string(categories)?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO workspaces (id, title, description, categories_json, user_id, status, last_activity_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                id,
                title,
                description,
                categories_json,
                owner_id,
                EntityStatus::Active.as_str(),
                format_time(now)
            ],
        )?;
        tx.execute(
            "INSERT INTO workspace_members (workspace_id, user_id, role, joined_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, owner_id, WorkspaceRole::Owner.as_str(), format_time(now)],
        )?;
        tx.commit()?;

        Ok(WorkspaceRecord {
            id,
            title: title.to_string(),
            description: description.map(ToString::to_string),
            categories: categories.to_vec(),
            user_id: owner_id.to_string(),
            status: EntityStatus::Active,
            status_changed_at: None,
            status_changed_by: None,
            last_activity_at: now,
            created_at: now,
        })
    }

    pub fn get_workspace_ref(&self, workspace_id: &str) -> AppResult<Option<WorkspaceRef>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, title, status, user_id FROM workspaces WHERE id = ?1",
            [workspace_id],
            |row| {
                Ok(WorkspaceRef {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    status: parse_entity_status(&row.get::<_, String>(2)?)?,
                    user_id: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn get_workspace(&self, workspace_id: &str) -> AppResult<Option<WorkspaceRecord>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE id = ?1"),
            [workspace_id],
            parse_workspace_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    /// Workspaces the user belongs to, filtered by lifecycle status. A creator without a row only
    /// counts while the workspace has no membership rows at all.
    pub fn list_workspaces_for_user(&self, user_id: &str, status: EntityStatus) -> AppResult<Vec<WorkspaceRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {WORKSPACE_COLUMNS} FROM workspaces w
             WHERE w.status = ?2
               AND (w.id IN (SELECT workspace_id FROM workspace_members WHERE user_id = ?1)
                    OR (w.user_id = ?1
                        AND NOT EXISTS (SELECT 1 FROM workspace_members m WHERE m.workspace_id = w.id)))
             ORDER BY w.last_activity_at DESC"
        ))?;
        let rows = stmt
            .query_map(params![user_id, status.as_str()], parse_workspace_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn update_workspace(&self, workspace_id: &str, payload: &UpdateWorkspacePayload) -> AppResult<bool> {
        let categories_json = payload
            .categories
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE workspaces
             SET title = COALESCE(?1, title),
                 description = COALESCE(?2, description),
                 categories_json = COALESCE(?3, categories_json),
                 last_activity_at = ?4
             WHERE id = ?5",
            params![
                payload.title,
                payload.description,
                categories_json,
                format_time(Utc::now()),
                workspace_id
            ],
        )?;
        Ok(changed > 0)
    }

    /// `at` stamps both the status change and the activity clock the reaper measures from.
    pub fn set_workspace_status(
        &self,
        workspace_id: &str,
        status: EntityStatus,
        changed_by: &str,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE workspaces
             SET status = ?1, status_changed_at = ?2, status_changed_by = ?3, last_activity_at = ?2
             WHERE id = ?4",
            params![status.as_str(), format_time(at), changed_by, workspace_id],
        )?;
        Ok(changed > 0)
    }

    pub fn touch_workspace(&self, workspace_id: &str) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE workspaces SET last_activity_at = ?1 WHERE id = ?2",
            params![format_time(Utc::now()), workspace_id],
        )?;
        Ok(())
    }

    // ─── Members ──────────────────────────────────────────────────────────────

    pub fn get_member(&self, workspace_id: &str, user_id: &str) -> AppResult<Option<WorkspaceMember>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT m.workspace_id, m.user_id, m.role, m.joined_at, u.role
             FROM workspace_members m
             JOIN users u ON u.id = m.user_id
             WHERE m.workspace_id = ?1 AND m.user_id = ?2",
            params![workspace_id, user_id],
            |row| {
                Ok(WorkspaceMember {
                    workspace_id: row.get(0)?,
                    user_id: row.get(1)?,
                    role: parse_workspace_role(&row.get::<_, String>(2)?)?,
                    joined_at: parse_time(&row.get::<_, String>(3)?)?,
                    user_role: GlobalRole::parse_or_default(row.get::<_, Option<String>>(4)?.as_deref()),
                })
            },
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn list_members(&self, workspace_id: &str) -> AppResult<Vec<MemberView>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT u.id, u.name, u.image, u.email, m.role, m.joined_at
             FROM workspace_members m
             JOIN users u ON u.id = m.user_id
             WHERE m.workspace_id = ?1
             ORDER BY m.joined_at ASC",
        )?;
        let rows = stmt
            .query_map([workspace_id], |row| {
                Ok(MemberView {
                    user: UserSummary {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        image: row.get(2)?,
                        email: row.get(3)?,
                    },
                    role: parse_workspace_role(&row.get::<_, String>(4)?)?,
                    joined_at: parse_time(&row.get::<_, String>(5)?)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Fails with `Duplicate` when the (workspace, user) pair already has a row.
    pub fn insert_member(&self, workspace_id: &str, user_id: &str, role: WorkspaceRole) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO workspace_members (workspace_id, user_id, role, joined_at) VALUES (?1, ?2, ?3, ?4)",
            params![workspace_id, user_id, role.as_str(), format_time(Utc::now())],
        )
        .map_err(member_conflict)?;
        Ok(())
    }

    pub fn update_member_role(&self, workspace_id: &str, user_id: &str, role: WorkspaceRole) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE workspace_members SET role = ?1 WHERE workspace_id = ?2 AND user_id = ?3",
            params![role.as_str(), workspace_id, user_id],
        )?;
        Ok(changed > 0)
    }

    /// Drops the membership row and unassigns the user from every item in the workspace.
    pub fn delete_member(&self, workspace_id: &str, user_id: &str) -> AppResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "DELETE FROM workspace_members WHERE workspace_id = ?1 AND user_id = ?2",
            params![workspace_id, user_id],
        )?;
        if changed == 0 {
            return Ok(false);
        }
        tx.execute(
            "UPDATE items SET assigned_to = NULL, updated_at = ?3
             WHERE assigned_to = ?2
               AND group_id IN (SELECT id FROM item_groups WHERE workspace_id = ?1)",
            params![workspace_id, user_id, format_time(Utc::now())],
        )?;
        tx.commit()?;
        Ok(true)
    }

    pub fn count_members(&self, workspace_id: &str) -> AppResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(1) FROM workspace_members WHERE workspace_id = ?1",
            [workspace_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn count_owners(&self, workspace_id: &str) -> AppResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(1) FROM workspace_members WHERE workspace_id = ?1 AND role = ?2",
            params![workspace_id, WorkspaceRole::Owner.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ─── Invitations ──────────────────────────────────────────────────────────

    pub fn insert_invitation(
        &self,
        workspace_id: &str,
        inviter_id: &str,
        invitee_id: &str,
        role: WorkspaceRole,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<InvitationRecord> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO workspace_invitations (id, workspace_id, inviter_id, invitee_id, role, status, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                workspace_id,
                inviter_id,
                invitee_id,
                role.as_str(),
                InvitationStatus::Pending.as_str(),
                expires_at.map(format_time),
                format_time(now)
            ],
        )
        .map_err(|error| match AppError::from(error) {
            AppError::Duplicate(_) => {
                AppError::Duplicate("A pending invitation already exists for this user".to_string())
            }
            other => other,
        })?;

        Ok(InvitationRecord {
            id,
            workspace_id: workspace_id.to_string(),
            inviter_id: inviter_id.to_string(),
            invitee_id: invitee_id.to_string(),
            role,
            status: InvitationStatus::Pending,
            expires_at,
            created_at: now,
        })
    }

    pub fn get_invitation(&self, invitation_id: &str) -> AppResult<Option<InvitationRecord>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {INVITATION_COLUMNS} FROM workspace_invitations WHERE id = ?1"),
            [invitation_id],
            parse_invitation_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn list_pending_invitations(&self, invitee_id: &str) -> AppResult<Vec<InvitationRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {INVITATION_COLUMNS} FROM workspace_invitations
             WHERE invitee_id = ?1 AND status = ?2
             ORDER BY created_at DESC"
        ))?;
        let rows = stmt
            .query_map(
                params![invitee_id, InvitationStatus::Pending.as_str()],
                parse_invitation_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn set_invitation_status(&self, invitation_id: &str, status: InvitationStatus) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE workspace_invitations SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![status.as_str(), invitation_id, InvitationStatus::Pending.as_str()],
        )?;
        Ok(changed > 0)
    }

    /// Marks the invitation accepted and spawns the membership row; both or neither.
    pub fn accept_invitation(&self, invitation: &InvitationRecord) -> AppResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE workspace_invitations SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![
                InvitationStatus::Accepted.as_str(),
                invitation.id,
                InvitationStatus::Pending.as_str()
            ],
        )?;
        if changed == 0 {
            return Err(AppError::Relation("Invitation is no longer pending".to_string()));
        }
        // A workspace without rows is owned by its creator; keep that once others join.
        tx.execute(
            "INSERT INTO workspace_members (workspace_id, user_id, role, joined_at)
             SELECT w.id, w.user_id, ?2, w.created_at FROM workspaces w
             WHERE w.id = ?1
               AND NOT EXISTS (SELECT 1 FROM workspace_members m WHERE m.workspace_id = w.id)",
            params![invitation.workspace_id, WorkspaceRole::Owner.as_str()],
        )?;
        tx.execute(
            "INSERT INTO workspace_members (workspace_id, user_id, role, joined_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                invitation.workspace_id,
                invitation.invitee_id,
                invitation.role.as_str(),
                format_time(Utc::now())
            ],
        )
        .map_err(member_conflict)?;
        tx.execute(
            "UPDATE workspaces SET last_activity_at = ?1 WHERE id = ?2",
            params![format_time(Utc::now()), invitation.workspace_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ─── Groups ───────────────────────────────────────────────────────────────

    pub fn insert_group(&self, workspace_id: &str, title: &str, text_color: &str) -> AppResult<GroupRecord> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO item_groups (id, workspace_id, title, text_color, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                workspace_id,
                title,
                text_color,
                EntityStatus::Active.as_str(),
                format_time(now)
            ],
        )?;
        Ok(GroupRecord {
            id,
            workspace_id: workspace_id.to_string(),
            title: title.to_string(),
            text_color: text_color.to_string(),
            status: EntityStatus::Active,
            created_at: now,
        })
    }

    pub fn get_group_ref(&self, group_id: &str) -> AppResult<Option<GroupRef>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, workspace_id, title, status FROM item_groups WHERE id = ?1",
            [group_id],
            |row| {
                Ok(GroupRef {
                    id: row.get(0)?,
                    workspace_id: row.get(1)?,
                    title: row.get(2)?,
                    status: parse_entity_status(&row.get::<_, String>(3)?)?,
                })
            },
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn get_group(&self, group_id: &str) -> AppResult<Option<GroupRecord>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {GROUP_COLUMNS} FROM item_groups WHERE id = ?1"),
            [group_id],
            parse_group_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn list_groups(&self, workspace_id: &str, status: EntityStatus) -> AppResult<Vec<GroupRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {GROUP_COLUMNS} FROM item_groups
             WHERE workspace_id = ?1 AND status = ?2
             ORDER BY created_at ASC"
        ))?;
        let rows = stmt
            .query_map(params![workspace_id, status.as_str()], parse_group_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn update_group(&self, group_id: &str, payload: &UpdateGroupPayload) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE item_groups SET title = COALESCE(?1, title), text_color = COALESCE(?2, text_color) WHERE id = ?3",
            params![payload.title, payload.text_color, group_id],
        )?;
        Ok(changed > 0)
    }

    pub fn set_group_status(&self, group_id: &str, status: EntityStatus) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE item_groups SET status = ?1 WHERE id = ?2",
            params![status.as_str(), group_id],
        )?;
        Ok(changed > 0)
    }

    // ─── Items ────────────────────────────────────────────────────────────────

    pub fn insert_item(&self, group_id: &str, created_by: &str, payload: &CreateItemPayload) -> AppResult<ItemRecord> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let priority = payload.priority.unwrap_or_default();
        let details_json = payload.details.as_ref().map(serde_json::to_string).transpose()?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO items (
               id, group_id, title, notes, description, details_json, term, priority, status,
               entity_status, created_by, assigned_to, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
            params![
                id,
                group_id,
                payload.title,
                payload.notes,
                payload.description,
                details_json,
                payload.term.map(format_time),
                priority.as_str(),
                ItemStatus::NotStarted.as_str(),
                EntityStatus::Active.as_str(),
                created_by,
                payload.assigned_to,
                format_time(now)
            ],
        )?;
        Ok(ItemRecord {
            id,
            group_id: group_id.to_string(),
            title: payload.title.clone(),
            notes: payload.notes.clone(),
            description: payload.description.clone(),
            details: payload.details.clone(),
            term: payload.term,
            priority,
            status: ItemStatus::NotStarted,
            entity_status: EntityStatus::Active,
            created_by: created_by.to_string(),
            assigned_to: payload.assigned_to.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_item_ref(&self, item_id: &str) -> AppResult<Option<ItemRef>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT i.id, i.group_id, g.workspace_id, i.title, i.entity_status, i.created_by
             FROM items i
             JOIN item_groups g ON g.id = i.group_id
             WHERE i.id = ?1",
            [item_id],
            |row| {
                Ok(ItemRef {
                    id: row.get(0)?,
                    group_id: row.get(1)?,
                    workspace_id: row.get(2)?,
                    title: row.get(3)?,
                    entity_status: parse_entity_status(&row.get::<_, String>(4)?)?,
                    created_by: row.get(5)?,
                })
            },
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn get_item(&self, item_id: &str) -> AppResult<Option<ItemRecord>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"),
            [item_id],
            parse_item_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn list_items(&self, group_id: &str, entity_status: EntityStatus) -> AppResult<Vec<ItemRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM items
             WHERE group_id = ?1 AND entity_status = ?2
             ORDER BY created_at ASC"
        ))?;
        let rows = stmt
            .query_map(params![group_id, entity_status.as_str()], parse_item_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn update_item(&self, item_id: &str, payload: &UpdateItemPayload) -> AppResult<bool> {
        let details_json = payload.details.as_ref().map(serde_json::to_string).transpose()?;
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE items
             SET title = COALESCE(?1, title),
                 notes = COALESCE(?2, notes),
                 description = COALESCE(?3, description),
                 details_json = COALESCE(?4, details_json),
                 term = COALESCE(?5, term),
                 priority = COALESCE(?6, priority),
                 updated_at = ?7
             WHERE id = ?8",
            params![
                payload.title,
                payload.notes,
                payload.description,
                details_json,
                payload.term.map(format_time),
                payload.priority.map(Priority::as_str),
                format_time(Utc::now()),
                item_id
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn set_item_assignee(&self, item_id: &str, assigned_to: Option<&str>) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE items SET assigned_to = ?1, updated_at = ?2 WHERE id = ?3",
            params![assigned_to, format_time(Utc::now()), item_id],
        )?;
        Ok(changed > 0)
    }

    pub fn set_item_work_status(&self, item_id: &str, status: ItemStatus) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE items SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), format_time(Utc::now()), item_id],
        )?;
        Ok(changed > 0)
    }

    pub fn set_item_entity_status(&self, item_id: &str, status: EntityStatus) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE items SET entity_status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), format_time(Utc::now()), item_id],
        )?;
        Ok(changed > 0)
    }

    // ─── Notifications ────────────────────────────────────────────────────────

    pub fn insert_notification(&self, notification: &NewNotification) -> AppResult<NotificationRecord> {
        let id = Uuid::new_v4().to_string();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO notifications (id, user_id, type, message, reference_id, image, name_reference, is_read, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)",
            params![
                id,
                notification.user_id,
                notification.r#type.as_str(),
                notification.message,
                notification.reference_id,
                notification.image,
                notification.name_reference,
                format_time(notification.created_at)
            ],
        )?;
        Ok(NotificationRecord {
            id,
            user_id: notification.user_id.clone(),
            r#type: notification.r#type,
            message: notification.message.clone(),
            reference_id: notification.reference_id.clone(),
            image: notification.image.clone(),
            name_reference: notification.name_reference.clone(),
            is_read: false,
            created_at: notification.created_at,
        })
    }

    /// One row per recipient in a single transaction; rows that already exist are skipped.
    pub fn insert_broadcast(
        &self,
        recipients: &[String],
        notification_type: NotificationType,
        message: &str,
        reference_id: &str,
    ) -> AppResult<u64> {
        let now = format_time(Utc::now());
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0u64;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO notifications (id, user_id, type, message, reference_id, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
            )?;
            for user_id in recipients {
                inserted += stmt.execute(params![
                    Uuid::new_v4().to_string(),
                    user_id,
                    notification_type.as_str(),
                    message,
                    reference_id,
                    now
                ])? as u64;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn list_notifications(&self, user_id: &str, unread_only: bool, limit: u32) -> AppResult<Vec<NotificationRecord>> {
        let conn = self.conn()?;
        let mut query = format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE user_id = ?1");
        if unread_only {
            query.push_str(" AND is_read = 0");
        }
        query.push_str(" ORDER BY created_at DESC, id DESC LIMIT ?2");
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt
            .query_map(params![user_id, limit], parse_notification_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count_unread_notifications(&self, user_id: &str) -> AppResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(1) FROM notifications WHERE user_id = ?1 AND is_read = 0",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn count_notifications(&self, user_id: &str) -> AppResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(1) FROM notifications WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn get_notification(&self, notification_id: &str) -> AppResult<Option<NotificationRecord>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1"),
            [notification_id],
            parse_notification_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn mark_notification_read(&self, notification_id: &str, user_id: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
            params![notification_id, user_id],
        )?;
        Ok(changed > 0)
    }

    pub fn mark_all_notifications_read(&self, user_id: &str) -> AppResult<u64> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
            [user_id],
        )?;
        Ok(changed as u64)
    }

    pub fn delete_notification(&self, notification_id: &str, user_id: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "DELETE FROM notifications WHERE id = ?1 AND user_id = ?2",
            params![notification_id, user_id],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_all_notifications(&self, user_id: &str) -> AppResult<u64> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM notifications WHERE user_id = ?1", [user_id])?;
        Ok(changed as u64)
    }

    // ─── Retention ────────────────────────────────────────────────────────────

    pub fn delete_notifications_older_than(&self, is_read: bool, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "DELETE FROM notifications WHERE is_read = ?1 AND created_at < ?2",
            params![is_read as i32, format_time(cutoff)],
        )?;
        Ok(changed as u64)
    }

    pub fn users_over_notification_cap(&self, cap: u32) -> AppResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT user_id FROM notifications GROUP BY user_id HAVING COUNT(1) > ?1 ORDER BY user_id",
        )?;
        let rows = stmt
            .query_map([cap], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Keeps the `keep` most recent notifications of the user and deletes the rest.
    pub fn trim_user_notifications(&self, user_id: &str, keep: u32) -> AppResult<u64> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "DELETE FROM notifications
             WHERE user_id = ?1
               AND id NOT IN (
                 SELECT id FROM notifications
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2
               )",
            params![user_id, keep],
        )?;
        Ok(changed as u64)
    }

    /// Permanently removes DELETED workspaces idle since before `cutoff`, together with their
    /// invite notifications. Members, groups, items and invitations go through FK cascade.
    pub fn reap_deleted_workspaces(&self, cutoff: DateTime<Utc>) -> AppResult<ReapedWorkspaces> {
        let cutoff = format_time(cutoff);
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let notifications = tx.execute(
            "DELETE FROM notifications
             WHERE type IN (?1, ?2)
               AND reference_id IN (
                 SELECT id FROM workspaces WHERE status = ?3 AND last_activity_at < ?4
               )",
            params![
                NotificationType::WorkspaceInvite.as_str(),
                NotificationType::WorkspaceAccepted.as_str(),
                EntityStatus::Deleted.as_str(),
                cutoff
            ],
        )?;
        let workspaces = tx.execute(
            "DELETE FROM workspaces WHERE status = ?1 AND last_activity_at < ?2",
            params![EntityStatus::Deleted.as_str(), cutoff],
        )?;
        tx.commit()?;
        Ok(ReapedWorkspaces {
            workspaces: workspaces as u64,
            notifications: notifications as u64,
        })
    }

    // ─── Friendships ──────────────────────────────────────────────────────────

    /// The row for the unordered pair, whichever direction it was created in.
    pub fn find_friendship_between(&self, user_a: &str, user_b: &str) -> AppResult<Option<FriendshipRecord>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {FRIENDSHIP_COLUMNS} FROM user_friends
                 WHERE (requester_id = ?1 AND addressee_id = ?2) OR (requester_id = ?2 AND addressee_id = ?1)
                 LIMIT 1"
            ),
            params![user_a, user_b],
            parse_friendship_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn insert_friendship(&self, requester_id: &str, addressee_id: &str) -> AppResult<FriendshipRecord> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO user_friends (id, requester_id, addressee_id, status, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                requester_id,
                addressee_id,
                FriendshipStatus::Pending.as_str(),
                format_time(now)
            ],
        )
        .map_err(|error| match AppError::from(error) {
            AppError::Duplicate(_) => {
                AppError::Duplicate("A friendship already exists between these users".to_string())
            }
            other => other,
        })?;
        Ok(FriendshipRecord {
            id,
            requester_id: requester_id.to_string(),
            addressee_id: addressee_id.to_string(),
            status: FriendshipStatus::Pending,
            created_at: now,
        })
    }

    pub fn get_friendship(&self, friendship_id: &str) -> AppResult<Option<FriendshipRecord>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {FRIENDSHIP_COLUMNS} FROM user_friends WHERE id = ?1"),
            [friendship_id],
            parse_friendship_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn accept_friendship(&self, friendship_id: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE user_friends SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![
                FriendshipStatus::Accepted.as_str(),
                friendship_id,
                FriendshipStatus::Pending.as_str()
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_friendship(&self, friendship_id: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM user_friends WHERE id = ?1", [friendship_id])?;
        Ok(changed > 0)
    }

    pub fn list_friendships(&self, user_id: &str) -> AppResult<Vec<FriendView>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT f.id, f.status, f.addressee_id = ?1, u.id, u.name, u.image, u.email
             FROM user_friends f
             JOIN users u ON u.id = CASE WHEN f.requester_id = ?1 THEN f.addressee_id ELSE f.requester_id END
             WHERE f.requester_id = ?1 OR f.addressee_id = ?1
             ORDER BY f.created_at DESC",
        )?;
        let rows = stmt
            .query_map([user_id], |row| {
                Ok(FriendView {
                    friendship_id: row.get(0)?,
                    status: parse_friendship_status(&row.get::<_, String>(1)?)?,
                    incoming: row.get::<_, i64>(2)? != 0,
                    user: UserSummary {
                        id: row.get(3)?,
                        name: row.get(4)?,
                        image: row.get(5)?,
                        email: row.get(6)?,
                    },
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn member_conflict(error: rusqlite::Error) -> AppError {
    match AppError::from(error) {
        AppError::Duplicate(_) => AppError::Duplicate("User is already a member of this workspace".to_string()),
        other => other,
    }
}

/// Fixed-width UTC timestamps so that string order matches chronological order.
pub fn format_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, error.to_string())),
            )
        })
}

fn parse_optional_time(raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|raw| parse_time(&raw)).transpose()
}

fn parse_wire<T>(raw: &str, parse: fn(&str) -> Option<T>, what: &str) -> rusqlite::Result<T> {
    parse(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Unknown {} '{}'", what, raw),
            )),
        )
    })
}

fn parse_entity_status(raw: &str) -> rusqlite::Result<EntityStatus> {
    parse_wire(raw, EntityStatus::parse, "entity status")
}

fn parse_workspace_role(raw: &str) -> rusqlite::Result<WorkspaceRole> {
    parse_wire(raw, WorkspaceRole::parse, "workspace role")
}

fn parse_friendship_status(raw: &str) -> rusqlite::Result<FriendshipStatus> {
    parse_wire(raw, FriendshipStatus::parse, "friendship status")
}

fn parse_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        image: row.get(3)?,
        role: GlobalRole::parse_or_default(row.get::<_, Option<String>>(4)?.as_deref()),
        is_active: row.get::<_, i32>(5)? != 0,
        created_at: parse_time(&row.get::<_, String>(6)?)?,
    })
}

fn parse_workspace_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<WorkspaceRecord> {
    let categories_raw: String = row.get(3)?;
    Ok(WorkspaceRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        categories: serde_json::from_str::<Vec<String>>(&categories_raw).unwrap_or_default(),
        user_id: row.get(4)?,
        status: parse_entity_status(&row.get::<_, String>(5)?)?,
        status_changed_at: parse_optional_time(row.get(6)?)?,
        status_changed_by: row.get(7)?,
        last_activity_at: parse_time(&row.get::<_, String>(8)?)?,
        created_at: parse_time(&row.get::<_, String>(9)?)?,
    })
}

fn parse_invitation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<InvitationRecord> {
    Ok(InvitationRecord {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        inviter_id: row.get(2)?,
        invitee_id: row.get(3)?,
        role: parse_workspace_role(&row.get::<_, String>(4)?)?,
        status: parse_wire(&row.get::<_, String>(5)?, InvitationStatus::parse, "invitation status")?,
        expires_at: parse_optional_time(row.get(6)?)?,
        created_at: parse_time(&row.get::<_, String>(7)?)?,
    })
}

fn parse_group_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GroupRecord> {
    Ok(GroupRecord {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        title: row.get(2)?,
        text_color: row.get(3)?,
        status: parse_entity_status(&row.get::<_, String>(4)?)?,
        created_at: parse_time(&row.get::<_, String>(5)?)?,
    })
}

fn parse_item_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ItemRecord> {
    Ok(ItemRecord {
        id: row.get(0)?,
        group_id: row.get(1)?,
        title: row.get(2)?,
        notes: row.get(3)?,
        description: row.get(4)?,
        details: row
            .get::<_, Option<String>>(5)?
            .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok()),
        term: parse_optional_time(row.get(6)?)?,
        priority: Priority::parse(&row.get::<_, String>(7)?).unwrap_or_default(),
        status: ItemStatus::parse(&row.get::<_, String>(8)?).unwrap_or_default(),
        entity_status: parse_entity_status(&row.get::<_, String>(9)?)?,
        created_by: row.get(10)?,
        assigned_to: row.get(11)?,
        created_at: parse_time(&row.get::<_, String>(12)?)?,
        updated_at: parse_time(&row.get::<_, String>(13)?)?,
    })
}

fn parse_notification_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NotificationRecord> {
    Ok(NotificationRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        r#type: parse_wire(&row.get::<_, String>(2)?, NotificationType::parse, "notification type")?,
        message: row.get(3)?,
        reference_id: row.get(4)?,
        image: row.get(5)?,
        name_reference: row.get(6)?,
        is_read: row.get::<_, i32>(7)? != 0,
        created_at: parse_time(&row.get::<_, String>(8)?)?,
    })
}

fn parse_friendship_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FriendshipRecord> {
    Ok(FriendshipRecord {
        id: row.get(0)?,
        requester_id: row.get(1)?,
        addressee_id: row.get(2)?,
        status: parse_friendship_status(&row.get::<_, String>(3)?)?,
        created_at: parse_time(&row.get::<_, String>(4)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::{format_time, Database, NewNotification};
    use crate::errors::AppError;
    use crate::models::{
        CreateItemPayload, EntityStatus, GlobalRole, NotificationType, SignUpPayload, WorkspaceRole,
    };
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");
        (dir, db)
    }

    fn user(db: &Database, name: &str) -> String {
        db.create_user(
            &SignUpPayload {
                name: name.to_string(),
                email: format!("{}@example.com", name),
                image: None,
            },
            GlobalRole::User,
        )
        .expect("create user")
        .id
    }

    #[test]
    fn timestamps_sort_as_strings() {
        let earlier = Utc::now();
        let later = earlier + Duration::milliseconds(1500);
        assert!(format_time(earlier) < format_time(later));
        assert_eq!(format_time(earlier).len(), format_time(later).len());
    }

    #[test]
    fn signup_rejects_duplicate_email() {
        let db = Database::open_in_memory().expect("db");
        user(&db, "alice");
        let error = db
            .create_user(
                &SignUpPayload {
                    name: "Alice Again".to_string(),
                    email: "alice@example.com".to_string(),
                    image: None,
                },
                GlobalRole::User,
            )
            .expect_err("duplicate email");
        assert!(matches!(error, AppError::Duplicate(_)));
    }

    #[test]
    fn creating_workspace_makes_creator_owner() {
        let (_dir, db) = open();
        let alice = user(&db, "alice");
        let workspace = db
            .create_workspace(&alice, "Roadmap", None, &["eng".to_string()])
            .expect("create workspace");
        let member = db
            .get_member(&workspace.id, &alice)
            .expect("get member")
            .expect("member exists");
        assert_eq!(member.role, WorkspaceRole::Owner);
        assert_eq!(member.user_role, GlobalRole::User);

        let loaded = db.get_workspace(&workspace.id).expect("get").expect("exists");
        assert_eq!(loaded.categories, vec!["eng".to_string()]);
    }

    #[test]
    fn concurrent_member_inserts_leave_one_row() {
        let (_dir, db) = open();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let workspace = db.create_workspace(&alice, "Shared", None, &[]).expect("workspace");
        let db = Arc::new(db);

        let handles = (0..2)
            .map(|_| {
                let db = Arc::clone(&db);
                let workspace_id = workspace.id.clone();
                let bob = bob.clone();
                std::thread::spawn(move || db.insert_member(&workspace_id, &bob, WorkspaceRole::Member))
            })
            .collect::<Vec<_>>();
        let results = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread"))
            .collect::<Vec<_>>();

        assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|result| matches!(result, Err(AppError::Duplicate(_)))));
        let members = db.list_members(&workspace.id).expect("list");
        assert_eq!(members.iter().filter(|member| member.user.id == bob).count(), 1);
    }

    #[test]
    fn friendship_pair_is_unique_in_either_direction() {
        let (_dir, db) = open();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        db.insert_friendship(&alice, &bob).expect("first request");
        let error = db.insert_friendship(&bob, &alice).expect_err("reverse duplicate");
        assert!(matches!(error, AppError::Duplicate(_)));
        let found = db
            .find_friendship_between(&bob, &alice)
            .expect("find")
            .expect("exists");
        assert_eq!(found.requester_id, alice);
    }

    #[test]
    fn trim_keeps_most_recent_rows() {
        let (_dir, db) = open();
        let alice = user(&db, "alice");
        let base = Utc::now() - Duration::days(1);
        for index in 0..5 {
            db.insert_notification(&NewNotification {
                user_id: alice.clone(),
                r#type: NotificationType::ChatMessage,
                message: format!("message {}", index),
                reference_id: alice.clone(),
                image: None,
                name_reference: None,
                created_at: base + Duration::minutes(index),
            })
            .expect("insert");
        }
        assert_eq!(db.users_over_notification_cap(3).expect("over cap"), vec![alice.clone()]);
        assert_eq!(db.trim_user_notifications(&alice, 3).expect("trim"), 2);
        let remaining = db.list_notifications(&alice, false, 10).expect("list");
        let messages = remaining.iter().map(|n| n.message.as_str()).collect::<Vec<_>>();
        assert_eq!(messages, vec!["message 4", "message 3", "message 2"]);
    }

    #[test]
    fn reaping_workspace_cascades_to_children() {
        let (_dir, db) = open();
        let alice = user(&db, "alice");
        let workspace = db.create_workspace(&alice, "Old", None, &[]).expect("workspace");
        let group = db.insert_group(&workspace.id, "Backlog", "#000000").expect("group");
        let item = db
            .insert_item(
                &group.id,
                &alice,
                &CreateItemPayload {
                    title: "Task".to_string(),
                    ..CreateItemPayload::default()
                },
            )
            .expect("item");
        db.insert_notification(&NewNotification {
            user_id: alice.clone(),
            r#type: NotificationType::WorkspaceInvite,
            message: "invite".to_string(),
            reference_id: workspace.id.clone(),
            image: None,
            name_reference: None,
            created_at: Utc::now(),
        })
        .expect("notification");

        let long_ago = Utc::now() - Duration::days(40);
        db.set_workspace_status(&workspace.id, EntityStatus::Deleted, &alice, long_ago)
            .expect("delete");

        let reaped = db
            .reap_deleted_workspaces(Utc::now() - Duration::days(30))
            .expect("reap");
        assert_eq!(reaped.workspaces, 1);
        assert_eq!(reaped.notifications, 1);
        assert!(db.get_workspace(&workspace.id).expect("get").is_none());
        assert!(db.get_group(&group.id).expect("get").is_none());
        assert!(db.get_item(&item.id).expect("get").is_none());
        assert!(db.get_member(&workspace.id, &alice).expect("get").is_none());
    }

    #[test]
    fn removing_member_unassigns_only_their_workspace_items() {
        let (_dir, db) = open();
        let alice = user(&db, "alice");
        let carol = user(&db, "carol");
        let task = CreateItemPayload {
            title: "Task".to_string(),
            ..CreateItemPayload::default()
        };
        let mut items = Vec::new();
        for title in ["Here", "Elsewhere"] {
            let workspace = db.create_workspace(&alice, title, None, &[]).expect("workspace");
            db.insert_member(&workspace.id, &carol, WorkspaceRole::Member).expect("carol");
            let group = db.insert_group(&workspace.id, "G", "#000000").expect("group");
            let item = db.insert_item(&group.id, &alice, &task).expect("item");
            db.set_item_assignee(&item.id, Some(carol.as_str())).expect("assign");
            items.push((workspace.id, item.id));
        }

        assert!(db.delete_member(&items[0].0, &carol).expect("remove"));
        let here = db.get_item(&items[0].1).expect("get").expect("exists");
        let elsewhere = db.get_item(&items[1].1).expect("get").expect("exists");
        assert_eq!(here.assigned_to, None);
        assert_eq!(elsewhere.assigned_to.as_deref(), Some(carol.as_str()));
        assert!(!db.delete_member(&items[0].0, &carol).expect("second remove"));
    }

    #[test]
    fn first_acceptance_keeps_legacy_creator_as_owner() {
        let (_dir, db) = open();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let workspace = db.create_workspace(&alice, "Legacy", None, &[]).expect("workspace");
        db.delete_member(&workspace.id, &alice).expect("drop creator row");
        let invitation = db
            .insert_invitation(&workspace.id, &alice, &bob, WorkspaceRole::Member, None)
            .expect("invite");

        db.accept_invitation(&invitation).expect("accept");
        let creator = db.get_member(&workspace.id, &alice).expect("get").expect("adopted");
        assert_eq!(creator.role, WorkspaceRole::Owner);
        assert_eq!(db.count_members(&workspace.id).expect("count"), 2);
    }
}
