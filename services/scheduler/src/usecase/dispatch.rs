//! One batch run of the schedule dispatcher.
//!
//! Selects due schedules, posts each through the webhook, and records the
//! retry policy's verdict. Delivery is at-least-once: if the process dies
//! between a successful post and the status write, the next run posts again.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::StreamExt as _;
use futures::stream::FuturesOrdered;
use serde::{Serialize, Serializer};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument as _, error, info, info_span, warn};

use clipcast_domain::id::ScheduleId;
use clipcast_domain::schedule::ScheduleStatus;

use crate::domain::policy::{AttemptOutcome, Decision, RetryPolicy};
use crate::domain::repository::{ReviewRepository, ScheduleRepository, WebhookPort};
use crate::domain::types::{DeliveryError, PostPayload, Schedule};
use crate::error::SchedulerError;

/// Upper bound for a single batch, whatever the caller asks for.
pub const MAX_BATCH_LIMIT: u64 = 100;

/// Upper bound for concurrent webhook calls.
pub const MAX_CONCURRENCY: usize = 16;

#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    /// Candidates per batch when the trigger does not say.
    pub batch_limit: u64,
    /// Webhook calls in flight at once.
    pub concurrency: usize,
    /// Per-call deadline; expiry counts as a delivery failure.
    pub webhook_timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            batch_limit: 10,
            concurrency: 5,
            webhook_timeout: Duration::from_secs(15),
        }
    }
}

pub struct DispatchBatchInput {
    pub now: DateTime<Utc>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Posted,
    RetryScheduled,
    Failed,
    /// The store failed while handling this schedule; its state is unchanged.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    pub schedule_id: ScheduleId,
    pub status: DispatchStatus,
    pub message: Option<String>,
}

impl DispatchResult {
    fn from_decision(schedule_id: ScheduleId, decision: &Decision) -> Self {
        let status = match decision.status {
            ScheduleStatus::Posted => DispatchStatus::Posted,
            ScheduleStatus::Pending => DispatchStatus::RetryScheduled,
            ScheduleStatus::Failed => DispatchStatus::Failed,
        };
        Self {
            schedule_id,
            status,
            message: decision.error_message.clone(),
        }
    }

    fn error(schedule_id: ScheduleId, err: &SchedulerError) -> Self {
        Self {
            schedule_id,
            status: DispatchStatus::Error,
            message: Some(err.detail()),
        }
    }
}

/// Summary of one batch. `posted + retried + failed + errors == processed`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub posted: usize,
    pub retried: usize,
    pub failed: usize,
    pub errors: usize,
    /// Due candidates left untouched because the batch was cancelled.
    pub skipped: usize,
    /// Milliseconds.
    #[serde(serialize_with = "as_millis")]
    pub duration: Duration,
    pub results: Vec<DispatchResult>,
}

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

impl BatchReport {
    fn tally(results: Vec<DispatchResult>, candidates: usize, duration: Duration) -> Self {
        let mut report = Self {
            processed: results.len(),
            skipped: candidates.saturating_sub(results.len()),
            duration,
            ..Default::default()
        };
        for result in &results {
            match result.status {
                DispatchStatus::Posted => report.posted += 1,
                DispatchStatus::RetryScheduled => report.retried += 1,
                DispatchStatus::Failed => report.failed += 1,
                DispatchStatus::Error => report.errors += 1,
            }
        }
        report.results = results;
        report
    }
}

pub struct DispatchBatchUseCase<S, R, W>
where
    S: ScheduleRepository,
    R: ReviewRepository,
    W: WebhookPort,
{
    pub schedules: S,
    pub reviews: R,
    pub webhook: W,
    pub policy: RetryPolicy,
    pub settings: DispatchSettings,
}

impl<S, R, W> DispatchBatchUseCase<S, R, W>
where
    S: ScheduleRepository,
    R: ReviewRepository,
    W: WebhookPort,
{
    /// Run one batch. Only a failure to list candidates fails the whole run;
    /// per-schedule problems end up in the report.
    ///
    /// Once `cancel` fires no further candidates are started. Deliveries
    /// already in flight finish and are recorded.
    pub async fn execute(
        &self,
        input: DispatchBatchInput,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, SchedulerError> {
        let started = Instant::now();
        let limit = input
            .limit
            .unwrap_or(self.settings.batch_limit)
            .clamp(1, MAX_BATCH_LIMIT);

        let span = info_span!("dispatch_batch", limit);
        async move {
            let due = self.schedules.list_due(input.now, limit).await?;

            let mut seen = HashSet::new();
            let candidates: Vec<Schedule> = due
                .into_iter()
                .filter(|s| s.is_due(input.now) && seen.insert(s.id))
                .collect();
            let total = candidates.len();
            info!(candidates = total, "dispatch batch started");

            let concurrency = self.settings.concurrency.clamp(1, MAX_CONCURRENCY);
            let mut queue = candidates.into_iter();
            let mut in_flight = FuturesOrdered::new();
            let mut results = Vec::with_capacity(total);
            loop {
                while in_flight.len() < concurrency && !cancel.is_cancelled() {
                    let Some(schedule) = queue.next() else { break };
                    in_flight.push_back(self.dispatch_one(schedule));
                }
                match in_flight.next().await {
                    Some(result) => results.push(result),
                    None => break,
                }
            }

            let report = BatchReport::tally(results, total, started.elapsed());
            if report.skipped > 0 {
                warn!(skipped = report.skipped, "dispatch batch cancelled");
            }
            info!(
                processed = report.processed,
                posted = report.posted,
                retried = report.retried,
                failed = report.failed,
                errors = report.errors,
                duration_ms = u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
                "dispatch batch finished"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    async fn dispatch_one(&self, schedule: Schedule) -> DispatchResult {
        let span = info_span!(
            "dispatch_schedule",
            schedule_id = %schedule.id,
            attempt = schedule.retry_count + 1,
        );
        async move {
            let outcome = match self.attempt(&schedule).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e.detail(), "could not load review content");
                    return DispatchResult::error(schedule.id, &e);
                }
            };

            let decision = match self.policy.decide(&schedule, &outcome, Utc::now()) {
                Ok(decision) => decision,
                Err(e) => return DispatchResult::error(schedule.id, &SchedulerError::from(e)),
            };
            let result = DispatchResult::from_decision(schedule.id, &decision);

            if let Err(e) = self
                .schedules
                .update(schedule.id, ScheduleStatus::Pending, &decision.into_patch())
                .await
            {
                if outcome == AttemptOutcome::Delivered {
                    error!(error = %e.detail(), "posted but status not saved; next run will post again");
                } else {
                    error!(error = %e.detail(), "could not save dispatch outcome");
                }
                return DispatchResult::error(schedule.id, &e);
            }

            match result.status {
                DispatchStatus::Posted => info!("schedule posted"),
                DispatchStatus::RetryScheduled => {
                    warn!(reason = result.message.as_deref(), "delivery failed, retry scheduled")
                }
                DispatchStatus::Failed => {
                    warn!(reason = result.message.as_deref(), "delivery failed, retries exhausted")
                }
                DispatchStatus::Error => {}
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Build the payload and call the webhook. `Err` only for store failures.
    async fn attempt(&self, schedule: &Schedule) -> Result<AttemptOutcome, SchedulerError> {
        let Some(review) = self.reviews.find_by_id(schedule.review_id).await? else {
            return Ok(AttemptOutcome::Failed(DeliveryError::new(format!(
                "review {} not found",
                schedule.review_id
            ))));
        };
        let payload = PostPayload::build(schedule, &review);

        let timeout = self.settings.webhook_timeout;
        let outcome = match tokio::time::timeout(timeout, self.webhook.deliver(&payload)).await {
            Ok(Ok(())) => AttemptOutcome::Delivered,
            Ok(Err(e)) => AttemptOutcome::Failed(e),
            Err(_) => AttemptOutcome::Failed(DeliveryError::timed_out(timeout)),
        };
        Ok(outcome)
    }
}
