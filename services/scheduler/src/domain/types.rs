use chrono::{DateTime, Utc};
use serde::Serialize;

use clipcast_domain::id::{ReviewId, ScheduleId, UserId};
use clipcast_domain::pagination::Sort;
use clipcast_domain::schedule::{ScheduleStatus, TargetType};
use clipcast_domain::user::UserRole;

/// Retry ceiling applied when a schedule is created without one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Largest `max_retries` a caller may request.
pub const MAX_ALLOWED_RETRIES: u32 = 10;

/// Destination a post is published to (e.g. a social page).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostTarget {
    #[serde(rename = "type")]
    pub kind: TargetType,
    pub id: String,
    pub name: Option<String>,
}

/// One planned social-media post for a review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub id: ScheduleId,
    pub user_id: UserId,
    pub review_id: ReviewId,
    pub scheduled_for: DateTime<Utc>,
    pub status: ScheduleStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error_message: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub target: PostTarget,
    pub post_message: String,
    pub landing_page_url: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    /// Pending, its slot has arrived, and any retry backoff has elapsed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ScheduleStatus::Pending
            && self.scheduled_for <= now
            && self.next_retry_at.is_none_or(|at| at <= now)
    }

    /// Apply a patch in memory, as the store does on update.
    pub fn apply(&mut self, patch: &SchedulePatch, now: DateTime<Utc>) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(retry_count) = patch.retry_count {
            self.retry_count = retry_count;
        }
        if let Some(error_message) = &patch.error_message {
            self.error_message = error_message.clone();
        }
        if let Some(next_retry_at) = patch.next_retry_at {
            self.next_retry_at = next_retry_at;
        }
        if let Some(posted_at) = patch.posted_at {
            self.posted_at = posted_at;
        }
        self.updated_at = now;
    }
}

/// The authenticated caller of a schedule endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    pub user_id: UserId,
    pub role: UserRole,
}

impl Requester {
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            role: UserRole::Normal,
        }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            role: UserRole::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role >= UserRole::Admin
    }

    /// Owners manage their own schedules; admins manage everyone's.
    pub fn can_manage(&self, schedule: &Schedule) -> bool {
        self.is_admin() || schedule.user_id == self.user_id
    }
}

/// Fields supplied when a schedule is created. The store assigns the id,
/// status (`pending`), retry counter and timestamps.
#[derive(Debug, Clone)]
pub struct NewSchedule {
    pub user_id: UserId,
    pub review_id: ReviewId,
    pub scheduled_for: DateTime<Utc>,
    pub max_retries: u32,
    pub target: PostTarget,
    pub post_message: String,
    pub landing_page_url: Option<String>,
}

/// Partial update of the dispatcher-owned fields.
///
/// `None` leaves a field untouched; `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulePatch {
    pub status: Option<ScheduleStatus>,
    pub retry_count: Option<u32>,
    pub error_message: Option<Option<String>>,
    pub next_retry_at: Option<Option<DateTime<Utc>>>,
    pub posted_at: Option<Option<DateTime<Utc>>>,
}

/// Filter for schedule list queries. Range bounds apply to `scheduled_for`
/// (`from` inclusive, `to` exclusive).
#[derive(Debug, Clone, Default)]
pub struct ScheduleFilter {
    pub user_id: Option<UserId>,
    pub status: Option<ScheduleStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub sort: Sort,
}

/// Affiliate link attached to a review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AffiliateLink {
    pub platform: String,
    pub url: String,
}

/// Review content referenced by a schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Review {
    pub id: ReviewId,
    pub user_id: UserId,
    pub title: String,
    pub video_url: Option<String>,
    pub affiliate_links: Vec<AffiliateLink>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewSummary {
    pub title: String,
    pub video_url: Option<String>,
}

/// JSON body sent to the posting webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostPayload {
    pub schedule_id: ScheduleId,
    pub review_id: ReviewId,
    /// 1 for the first delivery, incremented with every retry.
    pub attempt: u32,
    /// Stable across repeated deliveries of the same attempt.
    pub idempotency_key: String,
    pub target: PostTarget,
    pub message: String,
    pub landing_page_url: Option<String>,
    pub review: ReviewSummary,
    pub affiliate_links: Vec<AffiliateLink>,
    #[serde(serialize_with = "clipcast_core::serde::to_rfc3339_ms")]
    pub scheduled_for: DateTime<Utc>,
}

impl PostPayload {
    pub fn build(schedule: &Schedule, review: &Review) -> Self {
        Self {
            schedule_id: schedule.id,
            review_id: schedule.review_id,
            attempt: schedule.retry_count + 1,
            idempotency_key: format!("{}:{}", schedule.id, schedule.retry_count),
            target: schedule.target.clone(),
            message: schedule.post_message.clone(),
            landing_page_url: schedule.landing_page_url.clone(),
            review: ReviewSummary {
                title: review.title.clone(),
                video_url: review.video_url.clone(),
            },
            affiliate_links: review.affiliate_links.clone(),
            scheduled_for: schedule.scheduled_for,
        }
    }
}

/// A failed webhook delivery: network error, timeout, or non-2xx response.
/// Recorded on the schedule as its `error_message`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct DeliveryError(pub String);

impl DeliveryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn timed_out(after: std::time::Duration) -> Self {
        Self(format!("webhook timed out after {}s", after.as_secs()))
    }
}
