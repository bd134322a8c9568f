//! Retry policy: maps a delivery outcome to a schedule's next state.
//!
//! Everything here is pure. The caller supplies the clock.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};

use clipcast_domain::schedule::ScheduleStatus;

use crate::domain::types::{DeliveryError, Schedule, SchedulePatch};

/// Shape of the delay between retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backoff {
    /// `base * attempt`
    Linear,
    /// `base * 2^(attempt - 1)`
    #[default]
    Exponential,
}

impl FromStr for Backoff {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "exponential" => Ok(Self::Exponential),
            other => Err(format!("unknown backoff: {other}")),
        }
    }
}

/// Result of trying to deliver a schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Delivered,
    Failed(DeliveryError),
    NotAttempted,
}

/// Transition the policy refuses to make.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("schedule is already posted")]
    AlreadyPosted,
    #[error("schedule is {0}, not pending")]
    NotPending(ScheduleStatus),
    #[error("only failed schedules can be retried, schedule is {0}")]
    NotFailed(ScheduleStatus),
    #[error("retries exhausted ({retry_count}/{max_retries})")]
    ExhaustedRetries { retry_count: u32, max_retries: u32 },
    #[error("schedule changed concurrently: expected {expected}, found {actual}")]
    StatusChanged {
        expected: ScheduleStatus,
        actual: ScheduleStatus,
    },
}

/// Next values for the dispatcher-owned fields of a schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub status: ScheduleStatus,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub posted_at: Option<DateTime<Utc>>,
}

impl Decision {
    fn unchanged(schedule: &Schedule) -> Self {
        Self {
            status: schedule.status,
            retry_count: schedule.retry_count,
            error_message: schedule.error_message.clone(),
            next_retry_at: schedule.next_retry_at,
            posted_at: schedule.posted_at,
        }
    }

    pub fn into_patch(self) -> SchedulePatch {
        SchedulePatch {
            status: Some(self.status),
            retry_count: Some(self.retry_count),
            error_message: Some(self.error_message),
            next_retry_at: Some(self.next_retry_at),
            posted_at: Some(self.posted_at),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Backoff,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Backoff::Exponential,
            base_delay: Duration::minutes(5),
            max_delay: Duration::hours(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    ///
    /// Never shorter than one second, never longer than `max_delay`, and
    /// non-decreasing in `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay.max(Duration::seconds(1));
        let cap = self.max_delay.max(base);
        let attempt = attempt.max(1);

        let delay = match self.backoff {
            Backoff::Linear => i32::try_from(attempt)
                .ok()
                .and_then(|n| base.checked_mul(n)),
            Backoff::Exponential => 2i32
                .checked_pow(attempt - 1)
                .and_then(|factor| base.checked_mul(factor)),
        };
        delay.map_or(cap, |d| d.min(cap))
    }

    /// Decide the next state of a pending schedule after a delivery attempt.
    pub fn decide(
        &self,
        schedule: &Schedule,
        outcome: &AttemptOutcome,
        now: DateTime<Utc>,
    ) -> Result<Decision, TransitionError> {
        match schedule.status {
            ScheduleStatus::Pending => {}
            ScheduleStatus::Posted => return Err(TransitionError::AlreadyPosted),
            status => return Err(TransitionError::NotPending(status)),
        }

        let decision = match outcome {
            AttemptOutcome::NotAttempted => Decision::unchanged(schedule),
            AttemptOutcome::Delivered => Decision {
                status: ScheduleStatus::Posted,
                retry_count: schedule.retry_count,
                error_message: None,
                next_retry_at: None,
                posted_at: Some(now),
            },
            AttemptOutcome::Failed(err) => {
                let next = schedule.retry_count.saturating_add(1);
                // The failure that uses up the last retry is terminal.
                if next >= schedule.max_retries {
                    Decision {
                        status: ScheduleStatus::Failed,
                        retry_count: next.min(schedule.max_retries),
                        error_message: Some(err.to_string()),
                        next_retry_at: None,
                        posted_at: None,
                    }
                } else {
                    Decision {
                        status: ScheduleStatus::Pending,
                        retry_count: next,
                        error_message: Some(err.to_string()),
                        next_retry_at: Some(now + self.delay_for(next)),
                        posted_at: None,
                    }
                }
            }
        };
        Ok(decision)
    }

    /// Decide the state after an operator asks to retry a failed schedule.
    pub fn manual_retry(&self, schedule: &Schedule) -> Result<Decision, TransitionError> {
        match schedule.status {
            ScheduleStatus::Failed => {}
            ScheduleStatus::Posted => return Err(TransitionError::AlreadyPosted),
            status => return Err(TransitionError::NotFailed(status)),
        }
        if schedule.retry_count >= schedule.max_retries {
            return Err(TransitionError::ExhaustedRetries {
                retry_count: schedule.retry_count,
                max_retries: schedule.max_retries,
            });
        }
        Ok(Decision {
            status: ScheduleStatus::Pending,
            retry_count: schedule.retry_count + 1,
            error_message: None,
            next_retry_at: None,
            posted_at: None,
        })
    }
}
