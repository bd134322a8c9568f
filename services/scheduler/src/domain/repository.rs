#![allow(async_fn_in_trait)]

use chrono::{DateTime, Utc};

use clipcast_domain::id::{ReviewId, ScheduleId, UserId};
use clipcast_domain::pagination::PageRequest;
use clipcast_domain::schedule::ScheduleStatus;

use crate::domain::types::{
    DeliveryError, NewSchedule, PostPayload, Review, Schedule, ScheduleFilter, SchedulePatch,
};
use crate::error::SchedulerError;

/// Persistent collection of schedules.
///
/// Implementations apply each update atomically per row. The dispatcher
/// keeps no schedule state between calls.
pub trait ScheduleRepository: Send + Sync {
    async fn create(&self, draft: &NewSchedule) -> Result<Schedule, SchedulerError>;

    async fn find_by_id(&self, id: ScheduleId) -> Result<Option<Schedule>, SchedulerError>;

    /// Apply `patch` only if the row is still in `expected` status.
    ///
    /// Fails with `ScheduleNotFound` if the row is gone, or
    /// `InvalidTransition(StatusChanged)` if its status moved on.
    async fn update(
        &self,
        id: ScheduleId,
        expected: ScheduleStatus,
        patch: &SchedulePatch,
    ) -> Result<Schedule, SchedulerError>;

    /// Ordered by `scheduled_for`, direction from the filter.
    async fn list(
        &self,
        filter: &ScheduleFilter,
        page: PageRequest,
    ) -> Result<Vec<Schedule>, SchedulerError>;

    /// Pending schedules whose slot and retry backoff have passed, oldest
    /// `scheduled_for` first, at most `limit`.
    async fn list_due(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<Schedule>, SchedulerError>;

    /// Delete a schedule owned by `user_id`. Returns `true` if a row was deleted.
    async fn delete(&self, id: ScheduleId, user_id: UserId) -> Result<bool, SchedulerError>;
}

/// Read access to review content owned by the surrounding application.
pub trait ReviewRepository: Send + Sync {
    async fn find_by_id(&self, id: ReviewId) -> Result<Option<Review>, SchedulerError>;
}

/// Outbound webhook that performs the actual social-media post.
pub trait WebhookPort: Send + Sync {
    async fn deliver(&self, payload: &PostPayload) -> Result<(), DeliveryError>;
}
