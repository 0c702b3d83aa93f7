//! Top-level entry points: shortlisting, the rejection-email sweep and the
//! interactive single-member update.

mod rejection;
mod shortlist;

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use cohort_connector::{LearningService, LmsClient, OpenSearchIndex, SearchIndex};
use cohort_core::config::EngineSettings;
use cohort_core::{Config, MemberStatus};
use cohort_notify::{HttpNotificationClient, NotificationService};
use cohort_storage::{CohortStore, PgCohortStore};

use crate::context::RunContext;
use crate::error::EngineError;
use crate::failure_log::FailureLog;
use crate::resolver::FieldValueResolver;
use crate::scanner::CohortScanner;
use crate::updater::{MemberStatusUpdater, UpdateOutcome};

/// External collaborators the engine drives.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn CohortStore>,
    pub lms: Arc<dyn LearningService>,
    /// `None` disables search index sync regardless of settings.
    pub index: Option<Arc<dyn SearchIndex>>,
    pub notifier: Arc<dyn NotificationService>,
}

pub struct Engine {
    store: Arc<dyn CohortStore>,
    notifier: Arc<dyn NotificationService>,
    settings: Arc<EngineSettings>,
    failure_log: Arc<FailureLog>,
    scanner: CohortScanner,
    resolver: FieldValueResolver,
    updater: Arc<MemberStatusUpdater>,
}

impl Engine {
    /// Build the engine, failing fast on settings with no safe default.
    pub fn new(services: Services, settings: EngineSettings) -> Result<Self, EngineError> {
        settings.validate()?;
        let failure_log = Arc::new(FailureLog::new(settings.failure_log_path.clone()));
        let updater = MemberStatusUpdater::new(
            services.store.clone(),
            services.lms.clone(),
            services.index.clone(),
            services.notifier.clone(),
        );
        Ok(Self {
            scanner: CohortScanner::new(services.store.clone()),
            resolver: FieldValueResolver::new(services.store.clone()),
            updater: Arc::new(updater),
            store: services.store,
            notifier: services.notifier,
            settings: Arc::new(settings),
            failure_log,
        })
    }

    /// Wire the engine to the live services described by `config`. Settings
    /// are validated before any connection is attempted.
    pub async fn connect(config: &Config) -> Result<Self, EngineError> {
        config.engine.validate()?;

        let store = PgCohortStore::connect(&config.postgres).await?;
        let lms = LmsClient::new(&config.lms)?;
        let notifier = HttpNotificationClient::new(&config.notification)?;
        let index: Option<Arc<dyn SearchIndex>> = if config.engine.search_sync_enabled {
            Some(Arc::new(OpenSearchIndex::new(&config.search)))
        } else {
            None
        };

        let services = Services {
            store: Arc::new(store),
            lms: Arc::new(lms),
            index,
            notifier: Arc::new(notifier),
        };
        Self::new(services, config.engine.clone())
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn context(&self, kind: &'static str) -> RunContext {
        RunContext::new(kind, self.settings.clone(), self.failure_log.clone())
    }

    /// Apply a status change to one member outside the scheduled runs.
    pub async fn update_member(
        &self,
        membership_id: Uuid,
        status: MemberStatus,
        reason: &str,
    ) -> Result<UpdateOutcome, EngineError> {
        let ctx = self.context("set_status");
        info!(run_id = %ctx.run_id, %membership_id, %status, "Interactive status update");
        self.updater
            .update_member(&ctx, membership_id, status, reason)
            .await
    }
}
