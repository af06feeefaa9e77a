//! Typed notification events: reference validation, persistence, broadcast fan-out and the
//! recipient-side inbox operations.

use crate::access;
use crate::db::{Database, NewNotification};
use crate::errors::{AppError, AppResult};
use crate::models::{
    BroadcastPayload, ListNotificationsFilters, NotificationEvent, NotificationRecord, NotificationType,
};
use crate::validation::{self, MAX_MESSAGE_CHARS, MAX_TITLE_CHARS};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_LIST_LIMIT: u32 = 50;
const MAX_LIST_LIMIT: u32 = 200;

#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    db: Arc<Database>,
}

impl NotificationDispatcher {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Persists one notification for `event.user_id` once its reference resolves. Nothing is
    /// written when any lookup fails.
    pub fn dispatch(&self, event: NotificationEvent) -> AppResult<NotificationRecord> {
        let message = validation::required_text("Message", &event.message, MAX_MESSAGE_CHARS)?;
        validation::identifier("Recipient", &event.user_id)?;
        validation::identifier("Reference", &event.reference_id)?;
        if event.r#type.is_broadcast() {
            return Err(AppError::Validation(format!(
                "{} notifications are sent through broadcast",
                event.r#type
            )));
        }

        access::resolve_user(&self.db, &event.user_id)?;

        let mut image = event.image;
        let mut name_reference = event.name_reference;
        match event.r#type {
            NotificationType::FriendRequest | NotificationType::FriendAccepted | NotificationType::ChatMessage => {
                let actor = access::resolve_user(&self.db, &event.reference_id)?;
                if image.is_none() {
                    image = actor.image;
                }
                if name_reference.is_none() {
                    name_reference = Some(actor.name);
                }
            }
            NotificationType::WorkspaceInvite | NotificationType::WorkspaceAccepted => {
                access::resolve_workspace(&self.db, &event.reference_id)?;
            }
            NotificationType::ItemAssigned | NotificationType::ItemCompleted => {
                access::resolve_item(&self.db, &event.reference_id)?;
            }
            NotificationType::SistemMessage | NotificationType::NoticesMessage => {}
        }

        let record = self.db.insert_notification(&NewNotification {
            user_id: event.user_id,
            r#type: event.r#type,
            message,
            reference_id: event.reference_id,
            image,
            name_reference,
            created_at: Utc::now(),
        })?;
        tracing::debug!(
            notification_id = %record.id,
            user_id = %record.user_id,
            kind = %record.r#type,
            "notification dispatched"
        );
        Ok(record)
    }

    /// Fans a system or notice message out to every active user. Returns how many rows were written.
    pub fn broadcast(&self, actor_id: &str, payload: BroadcastPayload) -> AppResult<u64> {
        if !payload.r#type.is_broadcast() {
            return Err(AppError::Validation(format!(
                "{} is not a broadcast notification type",
                payload.r#type
            )));
        }
        let message = validation::required_text("Message", &payload.message, MAX_MESSAGE_CHARS)?;

        // TODO: restrict to global ADMIN once the admin console issues broadcasts itself.
        if self.db.get_user(actor_id)?.is_none() {
            return Err(AppError::Authentication("Sign in to send broadcasts".to_string()));
        }

        let reference_id = match payload.reference_id.as_deref().map(str::trim) {
            Some(reference_id) if !reference_id.is_empty() => {
                validation::required_text("Reference", reference_id, MAX_TITLE_CHARS)?
            }
            _ => Uuid::new_v4().to_string(),
        };
        let recipients = self.db.list_active_user_ids()?;
        let sent = self
            .db
            .insert_broadcast(&recipients, payload.r#type, &message, &reference_id)?;
        tracing::info!(
            actor_id = %actor_id,
            kind = %payload.r#type,
            recipients = recipients.len(),
            sent,
            "broadcast sent"
        );
        Ok(sent)
    }

    pub fn list(&self, user_id: &str, filters: &ListNotificationsFilters) -> AppResult<Vec<NotificationRecord>> {
        let limit = filters.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        self.db
            .list_notifications(user_id, filters.unread_only.unwrap_or(false), limit)
    }

    pub fn unread_count(&self, user_id: &str) -> AppResult<u64> {
        self.db.count_unread_notifications(user_id)
    }

    /// Someone else's notification is reported as missing.
    pub fn mark_read(&self, user_id: &str, notification_id: &str) -> AppResult<NotificationRecord> {
        if !self.db.mark_notification_read(notification_id, user_id)? {
            return Err(not_found());
        }
        self.db.get_notification(notification_id)?.ok_or_else(not_found)
    }

    pub fn mark_all_read(&self, user_id: &str) -> AppResult<u64> {
        self.db.mark_all_notifications_read(user_id)
    }

    pub fn delete(&self, user_id: &str, notification_id: &str) -> AppResult<()> {
        if !self.db.delete_notification(notification_id, user_id)? {
            return Err(not_found());
        }
        Ok(())
    }

    pub fn delete_all(&self, user_id: &str) -> AppResult<u64> {
        self.db.delete_all_notifications(user_id)
    }
}

fn not_found() -> AppError {
    AppError::NotFound("Notification not found".to_string())
}

#[cfg(test)]
mod tests {
    use super::NotificationDispatcher;
    use crate::db::Database;
    use crate::errors::AppError;
    use crate::models::{
        BroadcastPayload, GlobalRole, ListNotificationsFilters, NotificationEvent, NotificationType, SignUpPayload,
    };
    use std::sync::Arc;

    fn setup() -> (tempfile::TempDir, Arc<Database>, NotificationDispatcher) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Arc::new(Database::new(&dir.path().join("notify.db")).expect("db"));
        let dispatcher = NotificationDispatcher::new(Arc::clone(&db));
        (dir, db, dispatcher)
    }

    fn user(db: &Database, name: &str, image: Option<&str>) -> String {
        db.create_user(
            &SignUpPayload {
                name: name.to_string(),
                email: format!("{}@example.com", name),
                image: image.map(ToString::to_string),
            },
            GlobalRole::User,
        )
        .expect("user")
        .id
    }

    fn event(user_id: &str, reference_id: &str, kind: NotificationType) -> NotificationEvent {
        NotificationEvent {
            user_id: user_id.to_string(),
            reference_id: reference_id.to_string(),
            message: "hello".to_string(),
            r#type: kind,
            image: None,
            name_reference: None,
        }
    }

    #[test]
    fn user_events_fill_actor_details() {
        let (_dir, db, dispatcher) = setup();
        let alice = user(&db, "alice", Some("https://img/alice.png"));
        let bob = user(&db, "bob", None);

        let record = dispatcher
            .dispatch(event(&bob, &alice, NotificationType::FriendRequest))
            .expect("dispatch");
        assert_eq!(record.user_id, bob);
        assert_eq!(record.image.as_deref(), Some("https://img/alice.png"));
        assert_eq!(record.name_reference.as_deref(), Some("alice"));
        assert!(!record.is_read);
    }

    #[test]
    fn unresolved_reference_writes_nothing() {
        let (_dir, db, dispatcher) = setup();
        let bob = user(&db, "bob", None);
        for kind in [
            NotificationType::ChatMessage,
            NotificationType::WorkspaceInvite,
            NotificationType::ItemCompleted,
        ] {
            assert!(matches!(
                dispatcher.dispatch(event(&bob, "missing", kind)),
                Err(AppError::NotFound(_))
            ));
        }
        assert_eq!(db.count_notifications(&bob).expect("count"), 0);
    }

    #[test]
    fn workspace_events_require_existing_workspace() {
        let (_dir, db, dispatcher) = setup();
        let alice = user(&db, "alice", None);
        let bob = user(&db, "bob", None);
        let workspace = db.create_workspace(&alice, "W", None, &[]).expect("workspace");
        let record = dispatcher
            .dispatch(event(&bob, &workspace.id, NotificationType::WorkspaceInvite))
            .expect("dispatch");
        assert_eq!(record.reference_id, workspace.id);
        assert_eq!(record.name_reference, None);
    }

    #[test]
    fn blank_message_is_rejected_before_lookup() {
        let (_dir, _db, dispatcher) = setup();
        let mut blank = event("nobody", "nothing", NotificationType::ChatMessage);
        blank.message = "   ".to_string();
        assert!(matches!(dispatcher.dispatch(blank), Err(AppError::Validation(_))));
        assert!(matches!(
            dispatcher.dispatch(event("nobody", "nothing", NotificationType::SistemMessage)),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn broadcast_reaches_every_active_user() {
        let (_dir, db, dispatcher) = setup();
        let alice = user(&db, "alice", None);
        let bob = user(&db, "bob", None);
        user(&db, "carol", None);

        let sent = dispatcher
            .broadcast(
                &alice,
                BroadcastPayload {
                    r#type: NotificationType::NoticesMessage,
                    message: "Maintenance tonight".to_string(),
                    reference_id: None,
                },
            )
            .expect("broadcast");
        assert_eq!(sent, 3);
        assert_eq!(dispatcher.unread_count(&bob).expect("count"), 1);

        assert!(matches!(
            dispatcher.broadcast(
                "ghost",
                BroadcastPayload {
                    r#type: NotificationType::SistemMessage,
                    message: "x".to_string(),
                    reference_id: None,
                },
            ),
            Err(AppError::Authentication(_))
        ));
    }

    #[test]
    fn resending_a_broadcast_skips_existing_recipients() {
        let (_dir, db, dispatcher) = setup();
        let alice = user(&db, "alice", None);
        let bob = user(&db, "bob", None);
        let notice = || BroadcastPayload {
            r#type: NotificationType::SistemMessage,
            message: "Release 2.4 is out".to_string(),
            reference_id: Some("release-2-4".to_string()),
        };

        assert_eq!(dispatcher.broadcast(&alice, notice()).expect("first send"), 2);
        user(&db, "carol", None);
        assert_eq!(dispatcher.broadcast(&alice, notice()).expect("resend"), 1);
        assert_eq!(dispatcher.unread_count(&bob).expect("count"), 1);
    }

    #[test]
    fn inbox_operations_are_scoped_to_recipient() {
        let (_dir, db, dispatcher) = setup();
        let alice = user(&db, "alice", None);
        let bob = user(&db, "bob", None);
        let first = dispatcher
            .dispatch(event(&bob, &alice, NotificationType::ChatMessage))
            .expect("first");
        dispatcher
            .dispatch(event(&bob, &alice, NotificationType::ChatMessage))
            .expect("second");

        assert!(matches!(dispatcher.mark_read(&alice, &first.id), Err(AppError::NotFound(_))));
        assert!(dispatcher.mark_read(&bob, &first.id).expect("mark").is_read);

        let unread = dispatcher
            .list(
                &bob,
                &ListNotificationsFilters {
                    unread_only: Some(true),
                    limit: None,
                },
            )
            .expect("list");
        assert_eq!(unread.len(), 1);

        assert_eq!(dispatcher.mark_all_read(&bob).expect("all"), 1);
        assert!(matches!(dispatcher.delete(&alice, &first.id), Err(AppError::NotFound(_))));
        dispatcher.delete(&bob, &first.id).expect("delete");
        assert_eq!(dispatcher.delete_all(&bob).expect("delete all"), 1);
    }
}
