//! JSON surface over [`WorkspaceService`]. Domain routes answer with the `ActionResponse`
//! envelope and the status code of the error kind; the cron route answers with reaper counts.

use crate::errors::{AppError, AppResult};
use crate::models::{
    ActionResponse, AssignItemPayload, BroadcastPayload, ChangeMemberRolePayload, ChangeStatusPayload,
    CountResponse, CreateGroupPayload, CreateInvitationPayload, CreateItemPayload, CreateWorkspacePayload,
    FriendRequestPayload, ListEntitiesFilters, ListNotificationsFilters, ListWorkspacesFilters,
    SetGlobalRolePayload, SetWorkStatusPayload, SignInPayload, SignUpPayload, UpdateGroupPayload, UpdateItemPayload,
    UpdateWorkspacePayload,
};
use crate::reaper::{Reaper, ReaperReport};
use crate::service::WorkspaceService;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post, put};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use subtle::ConstantTimeEq;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<WorkspaceService>,
    pub reaper: Arc<Reaper>,
    pub cron_secret: Option<String>,
    pub identity_secret: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CleanupResponse {
    success: bool,
    deleted: ReaperReport,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/cron/cleanup", get(cleanup))
        .route("/api/auth/sign-up", post(sign_up))
        .route("/api/auth/sign-in", post(sign_in))
        .route("/api/auth/sign-out", post(sign_out))
        .route("/api/users/{user_id}/role", put(set_global_role))
        .route("/api/workspaces", get(list_workspaces).post(create_workspace))
        .route("/api/workspaces/{workspace_id}", get(get_workspace).patch(update_workspace))
        .route("/api/workspaces/{workspace_id}/status", put(change_workspace_status))
        .route("/api/workspaces/{workspace_id}/members", get(list_members))
        .route(
            "/api/workspaces/{workspace_id}/members/{user_id}",
            put(change_member_role).delete(remove_member),
        )
        .route("/api/workspaces/{workspace_id}/invitations", post(invite_member))
        .route("/api/workspaces/{workspace_id}/groups", get(list_groups).post(create_group))
        .route("/api/invitations", get(list_invitations))
        .route("/api/invitations/{invitation_id}/accept", post(accept_invitation))
        .route("/api/invitations/{invitation_id}/decline", post(decline_invitation))
        .route("/api/groups/{group_id}", patch(update_group))
        .route("/api/groups/{group_id}/status", put(change_group_status))
        .route("/api/groups/{group_id}/items", get(list_items).post(create_item))
        .route("/api/items/{item_id}", get(get_item).patch(update_item))
        .route("/api/items/{item_id}/assignee", put(assign_item))
        .route("/api/items/{item_id}/work-status", put(set_item_work_status))
        .route("/api/items/{item_id}/status", put(change_item_status))
        .route("/api/friends", get(list_friends).post(send_friend_request))
        .route("/api/friends/{friendship_id}", delete(remove_friendship))
        .route("/api/friends/{friendship_id}/accept", post(accept_friend_request))
        .route(
            "/api/notifications",
            get(list_notifications).delete(delete_all_notifications),
        )
        .route("/api/notifications/unread-count", get(unread_count))
        .route("/api/notifications/read-all", post(mark_all_read))
        .route("/api/notifications/broadcast", post(broadcast))
        .route("/api/notifications/{notification_id}", delete(delete_notification))
        .route("/api/notifications/{notification_id}/read", post(mark_read))
        .with_state(state)
}

/// Store calls hold a blocking mutex, so they run off the async workers.
async fn blocking<T, F>(work: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|error| AppError::Internal(format!("worker task failed: {}", error)))?
}

fn respond<T: Serialize>(result: AppResult<T>) -> Response {
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(error) => error.status_code(),
    };
    (status, Json(ActionResponse::from_result(result))).into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Constant-time comparison of the bearer value against a configured shared secret (cron
/// trigger, identity bridge). An unset secret rejects every call.
pub fn verify_shared_secret(purpose: &str, expected: Option<&str>, headers: &HeaderMap) -> AppResult<()> {
    let Some(expected) = expected.filter(|secret| !secret.is_empty()) else {
        tracing::warn!(purpose, "shared-secret route called but no secret is configured");
        return Err(AppError::Authentication("Unauthorized".to_string()));
    };
    let provided = bearer_token(headers).unwrap_or_default();
    if bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(AppError::Authentication("Unauthorized".to_string()))
    }
}

/// Id of the user behind the request's session token.
pub struct Actor(pub String);

impl FromRequestParts<AppState> for Actor {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).unwrap_or_default().to_string();
        let service = Arc::clone(&state.service);
        blocking(move || service.authenticate(&token))
            .await
            .map(|user| Actor(user.id))
            .map_err(|error| respond::<()>(Err(error)))
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn cleanup(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(error) = verify_shared_secret("cleanup", state.cron_secret.as_deref(), &headers) {
        return respond::<()>(Err(error));
    }
    let reaper = Arc::clone(&state.reaper);
    match blocking(move || reaper.run()).await {
        Ok(deleted) => (
            StatusCode::OK,
            Json(CleanupResponse {
                success: true,
                deleted,
            }),
        )
            .into_response(),
        Err(error) => respond::<()>(Err(error)),
    }
}

// ─── Accounts ─────────────────────────────────────────────────────────────

async fn sign_up(State(state): State<AppState>, Json(payload): Json<SignUpPayload>) -> Response {
    respond(blocking(move || state.service.sign_up(payload)).await)
}

/// Called by the identity bridge after the provider verified the email.
async fn sign_in(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SignInPayload>,
) -> Response {
    if let Err(error) = verify_shared_secret("sign-in", state.identity_secret.as_deref(), &headers) {
        return respond::<()>(Err(error));
    }
    respond(blocking(move || state.service.sign_in(payload)).await)
}

async fn sign_out(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let token = bearer_token(&headers).unwrap_or_default().to_string();
    respond(blocking(move || state.service.sign_out(&token)).await)
}

async fn set_global_role(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(user_id): Path<String>,
    Json(payload): Json<SetGlobalRolePayload>,
) -> Response {
    respond(blocking(move || state.service.set_global_role(&actor, &user_id, payload.role)).await)
}

// ─── Workspaces & members ─────────────────────────────────────────────────

async fn list_workspaces(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Query(filters): Query<ListWorkspacesFilters>,
) -> Response {
    respond(blocking(move || state.service.list_workspaces(&actor, &filters)).await)
}

async fn create_workspace(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(payload): Json<CreateWorkspacePayload>,
) -> Response {
    respond(blocking(move || state.service.create_workspace(&actor, payload)).await)
}

async fn get_workspace(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(workspace_id): Path<String>,
) -> Response {
    respond(blocking(move || state.service.get_workspace(&actor, &workspace_id)).await)
}

async fn update_workspace(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(workspace_id): Path<String>,
    Json(payload): Json<UpdateWorkspacePayload>,
) -> Response {
    respond(blocking(move || state.service.update_workspace(&actor, &workspace_id, payload)).await)
}

async fn change_workspace_status(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(workspace_id): Path<String>,
    Json(payload): Json<ChangeStatusPayload>,
) -> Response {
    respond(
        blocking(move || {
            state
                .service
                .change_workspace_status(&actor, &workspace_id, payload.status)
        })
        .await,
    )
}

async fn list_members(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(workspace_id): Path<String>,
) -> Response {
    respond(blocking(move || state.service.list_members(&actor, &workspace_id)).await)
}

async fn change_member_role(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path((workspace_id, user_id)): Path<(String, String)>,
    Json(payload): Json<ChangeMemberRolePayload>,
) -> Response {
    respond(
        blocking(move || {
            state
                .service
                .change_member_role(&actor, &workspace_id, &user_id, payload)
        })
        .await,
    )
}

async fn remove_member(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path((workspace_id, user_id)): Path<(String, String)>,
) -> Response {
    respond(blocking(move || state.service.remove_member(&actor, &workspace_id, &user_id)).await)
}

// ─── Invitations ──────────────────────────────────────────────────────────

async fn invite_member(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(workspace_id): Path<String>,
    Json(payload): Json<CreateInvitationPayload>,
) -> Response {
    respond(blocking(move || state.service.invite_member(&actor, &workspace_id, payload)).await)
}

async fn list_invitations(State(state): State<AppState>, Actor(actor): Actor) -> Response {
    respond(blocking(move || state.service.list_invitations(&actor)).await)
}

async fn accept_invitation(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(invitation_id): Path<String>,
) -> Response {
    respond(blocking(move || state.service.accept_invitation(&actor, &invitation_id)).await)
}

async fn decline_invitation(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(invitation_id): Path<String>,
) -> Response {
    respond(blocking(move || state.service.decline_invitation(&actor, &invitation_id)).await)
}

// ─── Groups & items ───────────────────────────────────────────────────────

async fn list_groups(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(workspace_id): Path<String>,
    Query(filters): Query<ListEntitiesFilters>,
) -> Response {
    respond(blocking(move || state.service.list_groups(&actor, &workspace_id, &filters)).await)
}

async fn create_group(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(workspace_id): Path<String>,
    Json(payload): Json<CreateGroupPayload>,
) -> Response {
    respond(blocking(move || state.service.create_group(&actor, &workspace_id, payload)).await)
}

async fn update_group(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(group_id): Path<String>,
    Json(payload): Json<UpdateGroupPayload>,
) -> Response {
    respond(blocking(move || state.service.update_group(&actor, &group_id, payload)).await)
}

async fn change_group_status(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(group_id): Path<String>,
    Json(payload): Json<ChangeStatusPayload>,
) -> Response {
    respond(blocking(move || state.service.change_group_status(&actor, &group_id, payload.status)).await)
}

async fn list_items(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(group_id): Path<String>,
    Query(filters): Query<ListEntitiesFilters>,
) -> Response {
    respond(blocking(move || state.service.list_items(&actor, &group_id, &filters)).await)
}

async fn create_item(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(group_id): Path<String>,
    Json(payload): Json<CreateItemPayload>,
) -> Response {
    respond(blocking(move || state.service.create_item(&actor, &group_id, payload)).await)
}

async fn get_item(State(state): State<AppState>, Actor(actor): Actor, Path(item_id): Path<String>) -> Response {
    respond(blocking(move || state.service.get_item(&actor, &item_id)).await)
}

async fn update_item(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(item_id): Path<String>,
    Json(payload): Json<UpdateItemPayload>,
) -> Response {
    respond(blocking(move || state.service.update_item(&actor, &item_id, payload)).await)
}

async fn assign_item(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(item_id): Path<String>,
    Json(payload): Json<AssignItemPayload>,
) -> Response {
    respond(blocking(move || state.service.assign_item(&actor, &item_id, payload)).await)
}

async fn set_item_work_status(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(item_id): Path<String>,
    Json(payload): Json<SetWorkStatusPayload>,
) -> Response {
    respond(blocking(move || state.service.set_item_work_status(&actor, &item_id, payload)).await)
}

async fn change_item_status(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(item_id): Path<String>,
    Json(payload): Json<ChangeStatusPayload>,
) -> Response {
    respond(blocking(move || state.service.change_item_status(&actor, &item_id, payload.status)).await)
}

// ─── Friends ──────────────────────────────────────────────────────────────

async fn list_friends(State(state): State<AppState>, Actor(actor): Actor) -> Response {
    respond(blocking(move || state.service.list_friends(&actor)).await)
}

async fn send_friend_request(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(payload): Json<FriendRequestPayload>,
) -> Response {
    respond(blocking(move || state.service.send_friend_request(&actor, payload)).await)
}

async fn accept_friend_request(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(friendship_id): Path<String>,
) -> Response {
    respond(blocking(move || state.service.accept_friend_request(&actor, &friendship_id)).await)
}

async fn remove_friendship(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(friendship_id): Path<String>,
) -> Response {
    respond(blocking(move || state.service.remove_friendship(&actor, &friendship_id)).await)
}

// ─── Notifications ────────────────────────────────────────────────────────

async fn list_notifications(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Query(filters): Query<ListNotificationsFilters>,
) -> Response {
    respond(blocking(move || state.service.notifications().list(&actor, &filters)).await)
}

async fn unread_count(State(state): State<AppState>, Actor(actor): Actor) -> Response {
    respond(
        blocking(move || {
            let count = state.service.notifications().unread_count(&actor)?;
            Ok(CountResponse { count })
        })
        .await,
    )
}

async fn mark_read(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(notification_id): Path<String>,
) -> Response {
    respond(blocking(move || state.service.notifications().mark_read(&actor, &notification_id)).await)
}

async fn mark_all_read(State(state): State<AppState>, Actor(actor): Actor) -> Response {
    respond(
        blocking(move || {
            let count = state.service.notifications().mark_all_read(&actor)?;
            Ok(CountResponse { count })
        })
        .await,
    )
}

async fn delete_notification(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(notification_id): Path<String>,
) -> Response {
    respond(blocking(move || state.service.notifications().delete(&actor, &notification_id)).await)
}

async fn delete_all_notifications(State(state): State<AppState>, Actor(actor): Actor) -> Response {
    respond(
        blocking(move || {
            let count = state.service.notifications().delete_all(&actor)?;
            Ok(CountResponse { count })
        })
        .await,
    )
}

async fn broadcast(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(payload): Json<BroadcastPayload>,
) -> Response {
    match blocking(move || state.service.notifications().broadcast(&actor, payload)).await {
        Ok(count) => (
            StatusCode::OK,
            Json(ActionResponse::ok_with_message(
                CountResponse { count },
                format!("Broadcast delivered to {} users", count),
            )),
        )
            .into_response(),
        Err(error) => respond::<()>(Err(error)),
    }
}
