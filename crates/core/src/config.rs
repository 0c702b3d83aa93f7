use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConfigError;
use crate::member::MemberStatus;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key) {
        Some(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        None => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub engine: EngineSettings,
    pub postgres: PostgresConfig,
    pub lms: LmsConfig,
    pub search: SearchConfig,
    pub notification: NotificationConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `COHORT_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("COHORT_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            engine: EngineSettings::from_env_profiled(p),
            postgres: PostgresConfig::from_env_profiled(p),
            lms: LmsConfig::from_env_profiled(p),
            search: SearchConfig::from_env_profiled(p),
            notification: NotificationConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  engine:        batch_size={}, max_concurrent_batches={}, backlog_limit={}",
            self.engine.batch_size,
            self.engine.max_concurrent_batches,
            self.engine.backlog_limit
        );
        tracing::info!(
            "  side effects:  email={}, search_sync={}",
            self.engine.email_notifications_enabled,
            self.engine.search_sync_enabled
        );
        tracing::info!("  postgres:      host={}, db={}", self.postgres.host, self.postgres.database);
        tracing::info!("  lms:           url={}", self.lms.base_url);
        tracing::info!("  search:        host={}, index={}", self.search.host, self.search.index);
        tracing::info!("  notification:  url={}", self.notification.base_url);
    }
}

// ── Engine ────────────────────────────────────────────────────

/// Read-only settings for shortlisting and rejection-email runs.
///
/// The two date-field identifiers have no safe default. They are kept as
/// `Option` while loading so that [`EngineSettings::validate`] can name the
/// missing variable instead of panicking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    pub batch_size: usize,
    pub max_concurrent_batches: usize,
    /// Ceiling on members fetched per cohort per run.
    pub backlog_limit: usize,
    pub email_notifications_enabled: bool,
    pub search_sync_enabled: bool,
    pub shortlist_date_field_id: Option<String>,
    pub rejection_notification_date_field_id: Option<String>,
    pub slow_batch_threshold: Duration,
    pub external_call_timeout: Duration,
    pub member_timeout: Duration,
    /// Statuses that trigger an email on interactive (non-batch) updates.
    pub notify_on_statuses: Vec<MemberStatus>,
    pub failure_log_path: Option<PathBuf>,
    pub shortlist_cron: String,
    pub rejection_email_cron: String,
}

impl EngineSettings {
    fn from_env_profiled(p: &str) -> Self {
        let notify_on_statuses = profiled_env_or(p, "NOTIFY_ON_STATUSES", "shortlisted,rejected")
            .split(',')
            .filter_map(|s| s.trim().parse::<MemberStatus>().ok())
            .collect();

        Self {
            batch_size: profiled_env_u32(p, "SHORTLIST_BATCH_SIZE", 100) as usize,
            max_concurrent_batches: profiled_env_u32(p, "SHORTLIST_MAX_CONCURRENT_BATCHES", 5)
                as usize,
            backlog_limit: profiled_env_u32(p, "SHORTLIST_BACKLOG_LIMIT", 100_000) as usize,
            email_notifications_enabled: profiled_env_bool(p, "EMAIL_NOTIFICATIONS_ENABLED", true),
            search_sync_enabled: profiled_env_bool(p, "SEARCH_SYNC_ENABLED", true),
            shortlist_date_field_id: profiled_env_opt(p, "SHORTLIST_DATE_FIELD_ID"),
            rejection_notification_date_field_id: profiled_env_opt(
                p,
                "REJECTION_NOTIFICATION_DATE_FIELD_ID",
            ),
            slow_batch_threshold: Duration::from_millis(profiled_env_u64(
                p,
                "SLOW_BATCH_THRESHOLD_MS",
                30_000,
            )),
            external_call_timeout: Duration::from_millis(profiled_env_u64(
                p,
                "EXTERNAL_CALL_TIMEOUT_MS",
                10_000,
            )),
            member_timeout: Duration::from_millis(profiled_env_u64(p, "MEMBER_TIMEOUT_MS", 60_000)),
            notify_on_statuses,
            failure_log_path: profiled_env_opt(p, "FAILURE_LOG_PATH").map(PathBuf::from),
            shortlist_cron: profiled_env_or(p, "SHORTLIST_CRON", "0 1 * * *"),
            rejection_email_cron: profiled_env_or(p, "REJECTION_EMAIL_CRON", "0 3 * * *"),
        }
    }

    /// Check the settings that have no safe default.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shortlist_field()?;
        self.rejection_field()?;
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "SHORTLIST_BATCH_SIZE",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_concurrent_batches == 0 {
            return Err(ConfigError::Invalid {
                key: "SHORTLIST_MAX_CONCURRENT_BATCHES",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.backlog_limit == 0 {
            return Err(ConfigError::Invalid {
                key: "SHORTLIST_BACKLOG_LIMIT",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Field id of the cohort's "shortlist date" custom field.
    pub fn shortlist_field(&self) -> Result<Uuid, ConfigError> {
        parse_field_id("SHORTLIST_DATE_FIELD_ID", self.shortlist_date_field_id.as_deref())
    }

    /// Field id of the cohort's "rejection notification date" custom field.
    pub fn rejection_field(&self) -> Result<Uuid, ConfigError> {
        parse_field_id(
            "REJECTION_NOTIFICATION_DATE_FIELD_ID",
            self.rejection_notification_date_field_id.as_deref(),
        )
    }

    pub fn notifies_on(&self, status: MemberStatus) -> bool {
        self.notify_on_statuses.contains(&status)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_concurrent_batches: 5,
            backlog_limit: 100_000,
            email_notifications_enabled: true,
            search_sync_enabled: true,
            shortlist_date_field_id: None,
            rejection_notification_date_field_id: None,
            slow_batch_threshold: Duration::from_secs(30),
            external_call_timeout: Duration::from_secs(10),
            member_timeout: Duration::from_secs(60),
            notify_on_statuses: vec![MemberStatus::Shortlisted, MemberStatus::Rejected],
            failure_log_path: None,
            shortlist_cron: "0 1 * * *".to_string(),
            rejection_email_cron: "0 3 * * *".to_string(),
        }
    }
}

fn parse_field_id(key: &'static str, raw: Option<&str>) -> Result<Uuid, ConfigError> {
    let raw = raw.ok_or(ConfigError::Missing(key))?;
    Uuid::parse_str(raw.trim()).map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "PG_HOST", "localhost"),
            port: profiled_env_u16(p, "PG_PORT", 5432),
            database: profiled_env_or(p, "PG_DATABASE", "cohorts"),
            username: profiled_env_opt(p, "PG_USERNAME"),
            password: profiled_env_opt(p, "PG_PASSWORD"),
            ssl_mode: profiled_env_or(p, "PG_SSL_MODE", "prefer"),
            max_connections: profiled_env_u32(p, "PG_MAX_CONNECTIONS", 10),
        }
    }

    pub fn connection_string(&self) -> String {
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn is_configured(&self) -> bool {
        self.username.is_some()
    }
}

// ── Learning-management service ──────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LmsConfig {
    pub base_url: String,
    pub tenant_id: Option<String>,
    pub organisation_id: Option<String>,
}

impl LmsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            base_url: profiled_env_or(p, "LMS_BASE_URL", "http://localhost:4000"),
            tenant_id: profiled_env_opt(p, "LMS_TENANT_ID"),
            organisation_id: profiled_env_opt(p, "LMS_ORGANISATION_ID"),
        }
    }
}

// ── OpenSearch / Elasticsearch ────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub host: String,
    pub port: u16,
    pub index: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_ssl: bool,
}

impl SearchConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "OPENSEARCH_HOST", "localhost"),
            port: profiled_env_u16(p, "OPENSEARCH_PORT", 9200),
            index: profiled_env_or(p, "OPENSEARCH_INDEX", "users"),
            username: profiled_env_opt(p, "OPENSEARCH_USERNAME"),
            password: profiled_env_opt(p, "OPENSEARCH_PASSWORD"),
            use_ssl: profiled_env_or(p, "OPENSEARCH_USE_SSL", "false") == "true",
        }
    }

    pub fn base_url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

// ── Notification service ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub base_url: String,
}

impl NotificationConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            base_url: profiled_env_or(p, "NOTIFICATION_BASE_URL", "http://localhost:4001"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_fields(shortlist: Option<&str>, rejection: Option<&str>) -> EngineSettings {
        EngineSettings {
            shortlist_date_field_id: shortlist.map(String::from),
            rejection_notification_date_field_id: rejection.map(String::from),
            ..EngineSettings::default()
        }
    }

    #[test]
    fn validate_requires_shortlist_field() {
        let settings = settings_with_fields(None, Some("7b1e7a47-5d2b-4a43-9c2a-2d1f1d0c7a11"));
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SHORTLIST_DATE_FIELD_ID")));
    }

    #[test]
    fn validate_requires_rejection_field() {
        let settings = settings_with_fields(Some("7b1e7a47-5d2b-4a43-9c2a-2d1f1d0c7a11"), None);
        let err = settings.validate().unwrap_err();
        assert!(
            err.to_string().contains("REJECTION_NOTIFICATION_DATE_FIELD_ID"),
            "got: {err}"
        );
    }

    #[test]
    fn validate_rejects_malformed_field_id() {
        let settings = settings_with_fields(Some("not-a-uuid"), Some("also-bad"));
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "SHORTLIST_DATE_FIELD_ID", .. }));
    }

    #[test]
    fn validate_rejects_zero_batch_size() {
        let mut settings = settings_with_fields(
            Some("7b1e7a47-5d2b-4a43-9c2a-2d1f1d0c7a11"),
            Some("0d7c3f0e-2f5c-4b8e-8f43-1c9f0a6a2b22"),
        );
        settings.batch_size = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_backlog_limit() {
        let mut settings = settings_with_fields(
            Some("7b1e7a47-5d2b-4a43-9c2a-2d1f1d0c7a11"),
            Some("0d7c3f0e-2f5c-4b8e-8f43-1c9f0a6a2b22"),
        );
        settings.backlog_limit = 0;
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "SHORTLIST_BACKLOG_LIMIT", .. }));
    }

    #[test]
    fn validate_accepts_complete_settings() {
        let settings = settings_with_fields(
            Some("7b1e7a47-5d2b-4a43-9c2a-2d1f1d0c7a11"),
            Some(" 0d7c3f0e-2f5c-4b8e-8f43-1c9f0a6a2b22 "),
        );
        assert!(settings.validate().is_ok());
        assert_eq!(
            settings.rejection_field().unwrap().to_string(),
            "0d7c3f0e-2f5c-4b8e-8f43-1c9f0a6a2b22"
        );
    }

    #[test]
    fn default_notify_statuses() {
        let settings = EngineSettings::default();
        assert!(settings.notifies_on(MemberStatus::Shortlisted));
        assert!(settings.notifies_on(MemberStatus::Rejected));
        assert!(!settings.notifies_on(MemberStatus::Dropout));
    }

    #[test]
    fn search_base_url_scheme() {
        let mut search = SearchConfig::from_env_profiled("COHORT_CONFIG_TEST_UNSET");
        search.host = "search.internal".to_string();
        search.port = 9443;
        search.use_ssl = true;
        assert_eq!(search.base_url(), "https://search.internal:9443");
    }
}
