use chrono::{DateTime, Utc};
use tracing::info;

use clipcast_domain::id::{ReviewId, ScheduleId, UserId};
use clipcast_domain::pagination::PageRequest;
use clipcast_domain::schedule::TargetType;

use crate::domain::repository::{ReviewRepository, ScheduleRepository};
use crate::domain::types::{
    MAX_ALLOWED_RETRIES, NewSchedule, PostTarget, Requester, Schedule, ScheduleFilter,
};
use crate::error::SchedulerError;

// ── Create ───────────────────────────────────────────────────────────────────

pub struct CreateScheduleInput {
    pub user_id: UserId,
    pub review_id: ReviewId,
    pub scheduled_for: DateTime<Utc>,
    pub max_retries: Option<u32>,
    pub target_type: String,
    pub target_id: String,
    pub target_name: Option<String>,
    pub post_message: String,
    pub landing_page_url: Option<String>,
}

pub struct CreateScheduleUseCase<S, R>
where
    S: ScheduleRepository,
    R: ReviewRepository,
{
    pub schedules: S,
    pub reviews: R,
    pub default_max_retries: u32,
}

impl<S, R> CreateScheduleUseCase<S, R>
where
    S: ScheduleRepository,
    R: ReviewRepository,
{
    pub async fn execute(&self, input: CreateScheduleInput) -> Result<Schedule, SchedulerError> {
        // 1. Required fields → 400 if blank
        let target_id = input.target_id.trim();
        let post_message = input.post_message.trim();
        if target_id.is_empty() || post_message.is_empty() || input.target_type.trim().is_empty()
        {
            return Err(SchedulerError::MissingData);
        }

        let max_retries = input.max_retries.unwrap_or(self.default_max_retries);
        if max_retries > MAX_ALLOWED_RETRIES {
            return Err(SchedulerError::InvalidMaxRetries);
        }

        // 2. Review must exist and belong to the caller → 404 otherwise
        self.reviews
            .find_by_id(input.review_id)
            .await?
            .filter(|r| r.user_id == input.user_id)
            .ok_or(SchedulerError::ReviewNotFound)?;

        // 3. Insert as pending with a fresh retry counter
        let draft = NewSchedule {
            user_id: input.user_id,
            review_id: input.review_id,
            scheduled_for: input.scheduled_for,
            max_retries,
            target: PostTarget {
                kind: TargetType::from(input.target_type.trim()),
                id: target_id.to_owned(),
                name: non_blank(input.target_name),
            },
            post_message: post_message.to_owned(),
            landing_page_url: non_blank(input.landing_page_url),
        };
        let schedule = self.schedules.create(&draft).await?;

        info!(
            schedule_id = %schedule.id,
            scheduled_for = %schedule.scheduled_for,
            "schedule created"
        );
        Ok(schedule)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

// ── Get ──────────────────────────────────────────────────────────────────────

pub struct GetScheduleUseCase<S: ScheduleRepository> {
    pub schedules: S,
}

impl<S: ScheduleRepository> GetScheduleUseCase<S> {
    pub async fn execute(
        &self,
        requester: Requester,
        id: ScheduleId,
    ) -> Result<Schedule, SchedulerError> {
        self.schedules
            .find_by_id(id)
            .await?
            .filter(|s| requester.can_manage(s))
            .ok_or(SchedulerError::ScheduleNotFound)
    }
}

// ── List ─────────────────────────────────────────────────────────────────────

pub struct ListSchedulesUseCase<S: ScheduleRepository> {
    pub schedules: S,
}

impl<S: ScheduleRepository> ListSchedulesUseCase<S> {
    /// Admins see every user's schedules, narrowed by `filter.user_id` if
    /// set. Anyone else sees only their own, whatever `filter.user_id` says.
    pub async fn execute(
        &self,
        requester: Requester,
        filter: ScheduleFilter,
        page: PageRequest,
    ) -> Result<Vec<Schedule>, SchedulerError> {
        let filter = if requester.is_admin() {
            filter
        } else {
            ScheduleFilter {
                user_id: Some(requester.user_id),
                ..filter
            }
        };
        self.schedules.list(&filter, page.clamped()).await
    }
}

// ── Delete ───────────────────────────────────────────────────────────────────

pub struct DeleteScheduleUseCase<S: ScheduleRepository> {
    pub schedules: S,
}

impl<S: ScheduleRepository> DeleteScheduleUseCase<S> {
    pub async fn execute(&self, requester: Requester, id: ScheduleId) -> Result<(), SchedulerError> {
        let owner = if requester.is_admin() {
            self.schedules
                .find_by_id(id)
                .await?
                .ok_or(SchedulerError::ScheduleNotFound)?
                .user_id
        } else {
            requester.user_id
        };
        if !self.schedules.delete(id, owner).await? {
            return Err(SchedulerError::ScheduleNotFound);
        }
        info!(schedule_id = %id, requested_by = %requester.user_id, "schedule deleted");
        Ok(())
    }
}
