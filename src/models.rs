use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! wire_enum {
    ($name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }

            pub fn parse(raw: &str) -> Option<Self> {
                match raw {
                    $($wire => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityStatus {
    Active,
    Archived,
    Deleted,
}

wire_enum!(EntityStatus {
    Active => "ACTIVE",
    Archived => "ARCHIVED",
    Deleted => "DELETED",
});

/// Workspace-scoped role. Declaration order is the rank order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkspaceRole {
    Viewer,
    Member,
    Admin,
    Owner,
}

wire_enum!(WorkspaceRole {
    Viewer => "VIEWER",
    Member => "MEMBER",
    Admin => "ADMIN",
    Owner => "OWNER",
});

impl WorkspaceRole {
    pub const ALL: [WorkspaceRole; 4] = [Self::Viewer, Self::Member, Self::Admin, Self::Owner];

    pub fn rank(self) -> u8 {
        match self {
            Self::Viewer => 0,
            Self::Member => 1,
            Self::Admin => 2,
            Self::Owner => 3,
        }
    }

    pub fn satisfies(self, minimum: WorkspaceRole) -> bool {
        self.rank() >= minimum.rank()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GlobalRole {
    #[default]
    User,
    Admin,
    SuperAdmin,
}

wire_enum!(GlobalRole {
    User => "USER",
    Admin => "ADMIN",
    SuperAdmin => "SUPER_ADMIN",
});

impl GlobalRole {
    /// Unknown or missing values fall back to the implicit default.
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        raw.and_then(Self::parse).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    FriendRequest,
    FriendAccepted,
    WorkspaceInvite,
    WorkspaceAccepted,
    ItemAssigned,
    ItemCompleted,
    ChatMessage,
    SistemMessage,
    NoticesMessage,
}

wire_enum!(NotificationType {
    FriendRequest => "FRIEND_REQUEST",
    FriendAccepted => "FRIEND_ACCEPTED",
    WorkspaceInvite => "WORKSPACE_INVITE",
    WorkspaceAccepted => "WORKSPACE_ACCEPTED",
    ItemAssigned => "ITEM_ASSIGNED",
    ItemCompleted => "ITEM_COMPLETED",
    ChatMessage => "CHAT_MESSAGE",
    SistemMessage => "SISTEM_MESSAGE",
    NoticesMessage => "NOTICES_MESSAGE",
});

impl NotificationType {
    pub fn is_broadcast(self) -> bool {
        matches!(self, Self::SistemMessage | Self::NoticesMessage)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
}

wire_enum!(InvitationStatus {
    Pending => "PENDING",
    Accepted => "ACCEPTED",
    Declined => "DECLINED",
    Expired => "EXPIRED",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FriendshipStatus {
    Pending,
    Accepted,
}

wire_enum!(FriendshipStatus {
    Pending => "PENDING",
    Accepted => "ACCEPTED",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
    #[default]
    Standard,
}

wire_enum!(Priority {
    Critical => "CRITICAL",
    High => "HIGH",
    Medium => "MEDIUM",
    Low => "LOW",
    Standard => "STANDARD",
});

/// Work status of an item, independent of its lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    #[default]
    NotStarted,
    InProgress,
    Done,
    Stopped,
}

wire_enum!(ItemStatus {
    NotStarted => "NOT_STARTED",
    InProgress => "IN_PROGRESS",
    Done => "DONE",
    Stopped => "STOPPED",
});

// ─── Records ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    pub image: Option<String>,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    pub image: Option<String>,
    pub role: GlobalRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            image: self.image.clone(),
            email: self.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub token: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Minimal projection used by access checks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceRef {
    pub id: String,
    pub title: String,
    pub status: EntityStatus,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceRecord {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub categories: Vec<String>,
    pub user_id: String,
    pub status: EntityStatus,
    pub status_changed_at: Option<DateTime<Utc>>,
    pub status_changed_by: Option<String>,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceMember {
    pub workspace_id: String,
    pub user_id: String,
    pub role: WorkspaceRole,
    pub joined_at: DateTime<Utc>,
    pub user_role: GlobalRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    pub user: UserSummary,
    pub role: WorkspaceRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationRecord {
    pub id: String,
    pub workspace_id: String,
    pub inviter_id: String,
    pub invitee_id: String,
    pub role: WorkspaceRole,
    pub status: InvitationStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GroupRef {
    pub id: String,
    pub workspace_id: String,
    pub title: String,
    pub status: EntityStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRecord {
    pub id: String,
    pub workspace_id: String,
    pub title: String,
    pub text_color: String,
    pub status: EntityStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ItemRef {
    pub id: String,
    pub group_id: String,
    pub workspace_id: String,
    pub title: String,
    pub entity_status: EntityStatus,
    pub created_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    pub id: String,
    pub group_id: String,
    pub title: String,
    pub notes: Option<String>,
    pub description: Option<String>,
    pub details: Option<serde_json::Value>,
    pub term: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub status: ItemStatus,
    pub entity_status: EntityStatus,
    pub created_by: String,
    pub assigned_to: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: String,
    pub user_id: String,
    pub r#type: NotificationType,
    pub message: String,
    pub reference_id: String,
    pub image: Option<String>,
    pub name_reference: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendshipRecord {
    pub id: String,
    pub requester_id: String,
    pub addressee_id: String,
    pub status: FriendshipStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendView {
    pub friendship_id: String,
    pub user: UserSummary,
    pub status: FriendshipStatus,
    pub incoming: bool,
}

// ─── Payloads ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpPayload {
    pub name: String,
    pub email: String,
    pub image: Option<String>,
}

/// Issued by the identity bridge once the provider has vouched for the email.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInPayload {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkspacePayload {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWorkspacePayload {
    pub title: Option<String>,
    pub description: Option<String>,
    pub categories: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListWorkspacesFilters {
    pub status: Option<EntityStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeStatusPayload {
    pub status: EntityStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvitationPayload {
    pub invitee_id: String,
    pub role: Option<WorkspaceRole>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeMemberRolePayload {
    pub role: WorkspaceRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetGlobalRolePayload {
    pub role: GlobalRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupPayload {
    pub title: String,
    pub text_color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGroupPayload {
    pub title: Option<String>,
    pub text_color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemPayload {
    pub title: String,
    pub notes: Option<String>,
    pub description: Option<String>,
    pub details: Option<serde_json::Value>,
    pub term: Option<DateTime<Utc>>,
    pub priority: Option<Priority>,
    pub assigned_to: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemPayload {
    pub title: Option<String>,
    pub notes: Option<String>,
    pub description: Option<String>,
    pub details: Option<serde_json::Value>,
    pub term: Option<DateTime<Utc>>,
    pub priority: Option<Priority>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignItemPayload {
    pub assigned_to: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetWorkStatusPayload {
    pub status: ItemStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListEntitiesFilters {
    pub status: Option<EntityStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub user_id: String,
    pub reference_id: String,
    pub message: String,
    pub r#type: NotificationType,
    pub image: Option<String>,
    pub name_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastPayload {
    pub r#type: NotificationType,
    pub message: String,
    /// Stable id for the announcement; re-sending with the same id skips users who already have it.
    #[serde(default)]
    pub reference_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListNotificationsFilters {
    pub unread_only: Option<bool>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequestPayload {
    pub addressee_id: String,
}

// ─── Responses ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSession {
    pub user: UserSummary,
    pub session: SessionRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountResponse {
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BooleanResponse {
    pub success: bool,
}

/// Uniform result envelope returned by every domain operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ActionResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
        }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::ok(data)
        }
    }

    pub fn failure(error: &AppError) -> Self {
        Self {
            success: false,
            data: None,
            message: None,
            error: Some(error.client_message()),
        }
    }

    /// Boundary translation: unexpected errors are logged in full and replaced by a generic message.
    pub fn from_result(result: AppResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(error) => {
                if error.is_unexpected() {
                    tracing::error!(kind = error.kind(), error = %error, "unexpected failure in domain operation");
                } else {
                    tracing::debug!(kind = error.kind(), error = %error, "domain operation rejected");
                }
                Self::failure(&error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ActionResponse, EntityStatus, GlobalRole, NotificationType, WorkspaceRole};
    use crate::errors::AppError;

    #[test]
    fn role_order_is_total() {
        assert!(WorkspaceRole::Viewer < WorkspaceRole::Member);
        assert!(WorkspaceRole::Member < WorkspaceRole::Admin);
        assert!(WorkspaceRole::Admin < WorkspaceRole::Owner);
        for (index, role) in WorkspaceRole::ALL.iter().enumerate() {
            assert_eq!(role.rank() as usize, index);
        }
        assert!(WorkspaceRole::Owner.satisfies(WorkspaceRole::Admin));
        assert!(!WorkspaceRole::Member.satisfies(WorkspaceRole::Admin));
    }

    #[test]
    fn wire_values_match_literal_strings() {
        assert_eq!(
            serde_json::to_string(&EntityStatus::Archived).expect("serialize"),
            "\"ARCHIVED\""
        );
        assert_eq!(
            serde_json::to_string(&NotificationType::SistemMessage).expect("serialize"),
            "\"SISTEM_MESSAGE\""
        );
        assert_eq!(GlobalRole::parse("SUPER_ADMIN"), Some(GlobalRole::SuperAdmin));
        assert_eq!(GlobalRole::parse_or_default(None), GlobalRole::User);
        assert_eq!(GlobalRole::parse_or_default(Some("bogus")), GlobalRole::User);
        assert_eq!(WorkspaceRole::parse("OWNER"), Some(WorkspaceRole::Owner));
    }

    #[test]
    fn envelope_shapes() {
        let ok = serde_json::to_value(ActionResponse::ok(3)).expect("serialize");
        assert_eq!(ok, serde_json::json!({ "success": true, "data": 3 }));

        let failed: ActionResponse<u32> =
            ActionResponse::from_result(Err(AppError::Permission("Insufficient role".into())));
        let failed = serde_json::to_value(failed).expect("serialize");
        assert_eq!(
            failed,
            serde_json::json!({ "success": false, "error": "Insufficient role" })
        );
    }
}
