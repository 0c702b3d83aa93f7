//! Cron schedules for the two recurring runs.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use cohort_core::config::EngineSettings;
use cohort_core::ConfigError;

/// Normalize a 5-field cron expression to 6-field by prepending "0 " for seconds.
///
/// The `cron` crate requires 6 fields: `sec min hour day-of-month month day-of-week`.
pub fn normalize_cron(expr: &str) -> String {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// Whether a tick of `schedule` falls in `(last_run, now]`. Without a last
/// run the window is the preceding day.
pub fn is_cron_due(schedule: &Schedule, now: DateTime<Utc>, last_run: Option<DateTime<Utc>>) -> bool {
    let check_from = last_run.unwrap_or(now - chrono::Duration::days(1));
    schedule
        .after(&check_from)
        .next()
        .is_some_and(|next| next <= now)
}

/// A named recurring job and when it last ran.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub name: &'static str,
    schedule: Schedule,
    last_run: Option<DateTime<Utc>>,
}

impl ScheduledJob {
    pub fn parse(name: &'static str, key: &'static str, expr: &str) -> Result<Self, ConfigError> {
        let schedule = Schedule::from_str(&normalize_cron(expr)).map_err(|e| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        })?;
        Ok(Self {
            name,
            schedule,
            last_run: None,
        })
    }

    /// The job is due now; a job that has never run only counts ticks from
    /// `started_at` on, so a restart does not replay the previous tick.
    pub fn is_due(&self, now: DateTime<Utc>, started_at: DateTime<Utc>) -> bool {
        is_cron_due(&self.schedule, now, Some(self.last_run.unwrap_or(started_at)))
    }

    pub fn mark_run(&mut self, at: DateTime<Utc>) {
        self.last_run = Some(at);
    }
}

/// Shortlisting and rejection-email jobs from settings, in that order.
pub fn jobs_from_settings(settings: &EngineSettings) -> Result<Vec<ScheduledJob>, ConfigError> {
    Ok(vec![
        ScheduledJob::parse("shortlist", "SHORTLIST_CRON", &settings.shortlist_cron)?,
        ScheduledJob::parse(
            "rejection_emails",
            "REJECTION_EMAIL_CRON",
            &settings.rejection_email_cron,
        )?,
    ])
}
