use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_PATH_ENV: &str = "TASKHUB_CONFIG";
pub const DATA_DIR_ENV: &str = "TASKHUB_DATA_DIR";
pub const BIND_ADDR_ENV: &str = "TASKHUB_BIND_ADDR";
pub const CRON_SECRET_ENV: &str = "TASKHUB_CRON_SECRET";
pub const IDENTITY_SECRET_ENV: &str = "TASKHUB_IDENTITY_SECRET";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct RetentionPolicy {
    pub read_notification_days: u32,
    pub unread_notification_days: u32,
    pub max_notifications_per_user: u32,
    pub deleted_workspace_grace_days: u32,
    pub reaper_interval_hours: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            read_notification_days: 30,
            unread_notification_days: 90,
            max_notifications_per_user: 100,
            deleted_workspace_grace_days: 30,
            reaper_interval_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub bind_addr: String,
    pub cron_secret: Option<String>,
    /// Shared with the identity bridge that exchanges a verified email for a session.
    pub identity_secret: Option<String>,
    pub invitation_ttl_days: u32,
    pub session_ttl_days: u32,
    pub retention: RetentionPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            bind_addr: "127.0.0.1:8080".to_string(),
            cron_secret: None,
            identity_secret: None,
            invitation_ttl_days: 7,
            session_ttl_days: 30,
            retention: RetentionPolicy::default(),
        }
    }
}

impl AppConfig {
    /// Reads the optional YAML file named by `TASKHUB_CONFIG`, then applies environment overrides.
    pub fn load() -> AppResult<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(Path::new(path.trim()))?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|error| AppError::Io(format!("{}: {}", path.to_string_lossy(), error)))?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> AppResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(data_dir) = lookup(DATA_DIR_ENV).filter(|value| !value.trim().is_empty()) {
            self.data_dir = PathBuf::from(data_dir.trim());
        }
        if let Some(bind_addr) = lookup(BIND_ADDR_ENV).filter(|value| !value.trim().is_empty()) {
            self.bind_addr = bind_addr.trim().to_string();
        }
        if let Some(secret) = lookup(CRON_SECRET_ENV) {
            self.cron_secret = non_empty(secret);
        }
        if let Some(secret) = lookup(IDENTITY_SECRET_ENV) {
            self.identity_secret = non_empty(secret);
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        let retention = &self.retention;
        if retention.read_notification_days == 0
            || retention.unread_notification_days == 0
            || retention.deleted_workspace_grace_days == 0
        {
            return Err(AppError::Validation(
                "Retention windows must be at least one day".to_string(),
            ));
        }
        if retention.max_notifications_per_user == 0 {
            return Err(AppError::Validation(
                "maxNotificationsPerUser must be greater than zero".to_string(),
            ));
        }
        if retention.reaper_interval_hours == 0 {
            return Err(AppError::Validation(
                "reaperIntervalHours must be greater than zero".to_string(),
            ));
        }
        if self.invitation_ttl_days == 0 || self.session_ttl_days == 0 {
            return Err(AppError::Validation(
                "Invitation and session lifetimes must be at least one day".to_string(),
            ));
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("taskhub.sqlite")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim().to_string();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{AppConfig, RetentionPolicy, CRON_SECRET_ENV, DATA_DIR_ENV, IDENTITY_SECRET_ENV};
    use std::collections::HashMap;
    use std::path::PathBuf;

    #[test]
    fn defaults_match_retention_policy() {
        let config = AppConfig::default();
        assert_eq!(config.retention, RetentionPolicy::default());
        assert_eq!(config.retention.read_notification_days, 30);
        assert_eq!(config.retention.unread_notification_days, 90);
        assert_eq!(config.retention.max_notifications_per_user, 100);
        assert_eq!(config.retention.deleted_workspace_grace_days, 30);
        assert!(config.cron_secret.is_none());
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn yaml_fills_missing_fields_with_defaults() {
        let config = AppConfig::from_yaml(
            "bindAddr: 0.0.0.0:9000\nretention:\n  maxNotificationsPerUser: 50\n",
        )
        .expect("parse");
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.retention.max_notifications_per_user, 50);
        assert_eq!(config.retention.read_notification_days, 30);
        assert_eq!(config.invitation_ttl_days, 7);
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config = AppConfig::from_yaml("cronSecret: from-file\n").expect("parse");
        let env: HashMap<&str, &str> = [
            (CRON_SECRET_ENV, " from-env "),
            (IDENTITY_SECRET_ENV, "bridge"),
            (DATA_DIR_ENV, "/tmp/hub"),
        ]
        .into_iter()
        .collect();
        config.apply_overrides(|key| env.get(key).map(|value| value.to_string()));
        assert_eq!(config.cron_secret.as_deref(), Some("from-env"));
        assert_eq!(config.identity_secret.as_deref(), Some("bridge"));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/hub"));

        config.apply_overrides(|key| (key == CRON_SECRET_ENV).then(|| "   ".to_string()));
        assert!(config.cron_secret.is_none());
    }

    #[test]
    fn zero_windows_are_rejected() {
        let config = AppConfig::from_yaml("retention:\n  readNotificationDays: 0\n").expect("parse");
        assert!(config.validate().is_err());
    }
}
