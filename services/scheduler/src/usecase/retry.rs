use tracing::info;

use clipcast_domain::id::ScheduleId;
use clipcast_domain::schedule::ScheduleStatus;

use crate::domain::policy::RetryPolicy;
use crate::domain::repository::ScheduleRepository;
use crate::domain::types::{Requester, Schedule};
use crate::error::SchedulerError;

pub struct RetryScheduleUseCase<S>
where
    S: ScheduleRepository,
{
    pub schedules: S,
    pub policy: RetryPolicy,
}

impl<S> RetryScheduleUseCase<S>
where
    S: ScheduleRepository,
{
    /// Put a failed schedule back in the queue for the next dispatcher run.
    pub async fn execute(
        &self,
        requester: Requester,
        id: ScheduleId,
    ) -> Result<Schedule, SchedulerError> {
        // 1. Load; a schedule the caller may not manage is reported as missing
        let schedule = self
            .schedules
            .find_by_id(id)
            .await?
            .filter(|s| requester.can_manage(s))
            .ok_or(SchedulerError::ScheduleNotFound)?;

        // 2. Policy decides whether the retry is allowed → 400 if not
        let decision = self.policy.manual_retry(&schedule)?;

        // 3. Persist only if nobody moved it out of `failed` meanwhile
        let updated = self
            .schedules
            .update(id, ScheduleStatus::Failed, &decision.into_patch())
            .await?;

        info!(
            schedule_id = %id,
            retry_count = updated.retry_count,
            requested_by = %requester.user_id,
            "manual retry queued"
        );
        Ok(updated)
    }
}
