use crate::config::RetentionPolicy;
use crate::db::Database;
use crate::errors::AppResult;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Rows removed by one reaper pass, by category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaperReport {
    pub read_notifications: u64,
    pub unread_notifications: u64,
    pub excess_notifications: u64,
    pub workspaces: u64,
    pub workspace_notifications: u64,
    pub failed_users: u64,
}

impl ReaperReport {
    pub fn total(&self) -> u64 {
        self.read_notifications
            + self.unread_notifications
            + self.excess_notifications
            + self.workspaces
            + self.workspace_notifications
    }
}

#[derive(Debug, Clone)]
pub struct Reaper {
    db: Arc<Database>,
    policy: RetentionPolicy,
}

impl Reaper {
    pub fn new(db: Arc<Database>, policy: RetentionPolicy) -> Self {
        Self { db, policy }
    }

    pub fn run(&self) -> AppResult<ReaperReport> {
        self.run_at(Utc::now())
    }

    /// One pass measured against `now`. The per-user trim is best effort; the workspace reap is
    /// one transaction.
    pub fn run_at(&self, now: DateTime<Utc>) -> AppResult<ReaperReport> {
        let policy = &self.policy;
        let mut report = ReaperReport {
            read_notifications: self
                .db
                .delete_notifications_older_than(true, days_before(now, policy.read_notification_days))?,
            unread_notifications: self
                .db
                .delete_notifications_older_than(false, days_before(now, policy.unread_notification_days))?,
            ..ReaperReport::default()
        };

        for user_id in self.db.users_over_notification_cap(policy.max_notifications_per_user)? {
            match self
                .db
                .trim_user_notifications(&user_id, policy.max_notifications_per_user)
            {
                Ok(removed) => report.excess_notifications += removed,
                Err(error) => {
                    report.failed_users += 1;
                    tracing::warn!(user_id = %user_id, error = %error, "notification trim failed; continuing");
                }
            }
        }

        let reaped = self
            .db
            .reap_deleted_workspaces(days_before(now, policy.deleted_workspace_grace_days))?;
        report.workspaces = reaped.workspaces;
        report.workspace_notifications = reaped.notifications;

        tracing::info!(
            read_notifications = report.read_notifications,
            unread_notifications = report.unread_notifications,
            excess_notifications = report.excess_notifications,
            workspaces = report.workspaces,
            workspace_notifications = report.workspace_notifications,
            failed_users = report.failed_users,
            "retention pass finished"
        );
        Ok(report)
    }

    /// Runs the reaper every `reaper_interval_hours` until the runtime shuts down.
    pub fn spawn_interval(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let period = std::time::Duration::from_secs(u64::from(self.policy.reaper_interval_hours.max(1)) * 3600);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let reaper = Arc::clone(&self);
                match tokio::task::spawn_blocking(move || reaper.run()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(error)) => tracing::warn!(error = %error, "retention maintenance failed"),
                    Err(error) => tracing::error!(error = %error, "retention task panicked"),
                }
            }
        })
    }
}

fn days_before(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    now - Duration::days(i64::from(days))
}

#[cfg(test)]
mod tests {
    use super::{Reaper, ReaperReport};
    use crate::config::RetentionPolicy;
    use crate::db::{Database, NewNotification};
    use crate::models::{EntityStatus, GlobalRole, NotificationType, SignUpPayload};
    use chrono::{DateTime, Duration, Utc};
    use std::sync::Arc;

    fn setup() -> (tempfile::TempDir, Arc<Database>, Reaper, String) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Arc::new(Database::new(&dir.path().join("reaper.db")).expect("db"));
        let alice = db
            .create_user(
                &SignUpPayload {
                    name: "alice".to_string(),
                    email: "alice@example.com".to_string(),
                    image: None,
                },
                GlobalRole::User,
            )
            .expect("user")
            .id;
        let reaper = Reaper::new(Arc::clone(&db), RetentionPolicy::default());
        (dir, db, reaper, alice)
    }

    fn notify(db: &Database, user_id: &str, message: &str, created_at: DateTime<Utc>, read: bool) -> String {
        let record = db
            .insert_notification(&NewNotification {
                user_id: user_id.to_string(),
                r#type: NotificationType::ChatMessage,
                message: message.to_string(),
                reference_id: user_id.to_string(),
                image: None,
                name_reference: None,
                created_at,
            })
            .expect("insert");
        if read {
            db.mark_notification_read(&record.id, user_id).expect("mark read");
        }
        record.id
    }

    #[test]
    fn age_windows_depend_on_read_state() {
        let (_dir, db, reaper, alice) = setup();
        let now = Utc::now();
        let n1 = notify(&db, &alice, "n1", now - Duration::days(31), true);
        let n2 = notify(&db, &alice, "n2", now - Duration::days(100), false);
        let n3 = notify(&db, &alice, "n3", now - Duration::days(5), true);
        let n4 = notify(&db, &alice, "n4", now - Duration::days(60), false);

        let report = reaper.run_at(now).expect("run");
        assert_eq!(report.read_notifications, 1);
        assert_eq!(report.unread_notifications, 1);
        assert!(db.get_notification(&n1).expect("get").is_none());
        assert!(db.get_notification(&n2).expect("get").is_none());
        assert!(db.get_notification(&n3).expect("get").is_some());
        assert!(db.get_notification(&n4).expect("get").is_some());
    }

    #[test]
    fn cap_keeps_most_recent_hundred() {
        let (_dir, db, reaper, alice) = setup();
        let now = Utc::now();
        for index in 0..130 {
            notify(&db, &alice, &format!("m{}", index), now - Duration::minutes(200 - index), false);
        }

        let report = reaper.run_at(now).expect("run");
        assert_eq!(report.excess_notifications, 30);
        let kept = db.list_notifications(&alice, false, 500).expect("list");
        assert_eq!(kept.len(), 100);
        assert_eq!(kept.first().map(|n| n.message.as_str()), Some("m129"));
        assert_eq!(kept.last().map(|n| n.message.as_str()), Some("m30"));
    }

    #[test]
    fn second_run_deletes_nothing() {
        let (_dir, db, reaper, alice) = setup();
        let now = Utc::now();
        for index in 0..105 {
            notify(&db, &alice, &format!("m{}", index), now - Duration::days(index % 120), index % 2 == 0);
        }
        let workspace = db.create_workspace(&alice, "Gone", None, &[]).expect("workspace");
        db.set_workspace_status(&workspace.id, EntityStatus::Deleted, &alice, now - Duration::days(45))
            .expect("delete");

        let first = reaper.run_at(now).expect("first run");
        assert!(first.total() > 0);
        assert_eq!(first.workspaces, 1);
        let second = reaper.run_at(now).expect("second run");
        assert_eq!(second, ReaperReport::default());
    }

    #[test]
    fn recently_deleted_workspace_survives_grace_period() {
        let (_dir, db, reaper, alice) = setup();
        let now = Utc::now();
        let workspace = db.create_workspace(&alice, "Recent", None, &[]).expect("workspace");
        db.set_workspace_status(&workspace.id, EntityStatus::Deleted, &alice, now - Duration::days(10))
            .expect("delete");
        let archived = db.create_workspace(&alice, "Archived", None, &[]).expect("workspace");
        db.set_workspace_status(&archived.id, EntityStatus::Archived, &alice, now - Duration::days(400))
            .expect("archive");

        let report = reaper.run_at(now).expect("run");
        assert_eq!(report.workspaces, 0);
        assert!(db.get_workspace(&workspace.id).expect("get").is_some());
        assert!(db.get_workspace(&archived.id).expect("get").is_some());
    }

    #[tokio::test]
    async fn interval_loop_runs_immediately() {
        let (_dir, db, reaper, alice) = setup();
        notify(&db, &alice, "old", Utc::now() - Duration::days(40), true);
        let handle = Arc::new(reaper).spawn_interval();
        for _ in 0..50 {
            if db.count_notifications(&alice).expect("count") == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        handle.abort();
        assert_eq!(db.count_notifications(&alice).expect("count"), 0);
    }
}
