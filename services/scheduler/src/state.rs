use axum::extract::FromRef;
use sea_orm::DatabaseConnection;

use clipcast_auth_types::cron::CronSecret;

use crate::config::SchedulerConfig;
use crate::domain::policy::RetryPolicy;
use crate::error::SchedulerError;
use crate::infra::db::{DbReviewRepository, DbScheduleRepository};
use crate::infra::webhook::ReqwestWebhook;
use crate::usecase::dispatch::{DispatchBatchUseCase, DispatchSettings};

/// Shared application state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub webhook: ReqwestWebhook,
    pub cron_secret: CronSecret,
    pub policy: RetryPolicy,
    pub dispatch: DispatchSettings,
    pub default_max_retries: u32,
}

impl AppState {
    pub fn from_config(config: &SchedulerConfig, db: DatabaseConnection) -> Result<Self, SchedulerError> {
        let dispatch = config.dispatch_settings();
        Ok(Self {
            db,
            webhook: ReqwestWebhook::new(config.webhook_url.clone(), dispatch.webhook_timeout)?,
            cron_secret: CronSecret::new(config.cron_secret.clone()),
            policy: config.retry_policy(),
            dispatch,
            default_max_retries: config.default_max_retries,
        })
    }

    pub fn schedule_repo(&self) -> DbScheduleRepository {
        DbScheduleRepository {
            db: self.db.clone(),
        }
    }

    pub fn review_repo(&self) -> DbReviewRepository {
        DbReviewRepository {
            db: self.db.clone(),
        }
    }

    pub fn dispatch_usecase(
        &self,
    ) -> DispatchBatchUseCase<DbScheduleRepository, DbReviewRepository, ReqwestWebhook> {
        DispatchBatchUseCase {
            schedules: self.schedule_repo(),
            reviews: self.review_repo(),
            webhook: self.webhook.clone(),
            policy: self.policy,
            settings: self.dispatch,
        }
    }
}

impl FromRef<AppState> for CronSecret {
    fn from_ref(state: &AppState) -> Self {
        state.cron_secret.clone()
    }
}
