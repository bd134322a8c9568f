use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio_util::sync::CancellationToken;

use clipcast_domain::id::UserId;
use clipcast_domain::schedule::ScheduleStatus;
use clipcast_scheduler::domain::policy::TransitionError;
use clipcast_scheduler::domain::types::{DeliveryError, Requester, Review, Schedule};
use clipcast_scheduler::handlers::cron::DispatchResponse;
use clipcast_scheduler::error::SchedulerError;
use clipcast_scheduler::usecase::dispatch::{DispatchBatchInput, DispatchSettings, DispatchStatus};
use clipcast_scheduler::usecase::retry::RetryScheduleUseCase;

use crate::helpers::{
    MockReviewRepo, MockScheduleRepo, MockWebhook, dispatcher, test_review, test_schedule,
};

fn now_input() -> DispatchBatchInput {
    DispatchBatchInput {
        now: Utc::now(),
        limit: None,
    }
}

#[tokio::test]
async fn should_post_due_schedule_on_success() {
    let review = test_review(UserId::new());
    let schedule = test_schedule(&review, Utc::now() - Duration::minutes(1));
    let repo = MockScheduleRepo::new(vec![schedule.clone()]);
    let webhook = MockWebhook::ok();
    let delivered = webhook.delivered_handle();

    let uc = dispatcher(repo.clone(), MockReviewRepo::new(vec![review.clone()]), webhook);
    let report = uc.execute(now_input(), &CancellationToken::new()).await.unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.posted, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.results[0].schedule_id, schedule.id);
    assert_eq!(report.results[0].status, DispatchStatus::Posted);

    let stored = repo.get(schedule.id);
    assert_eq!(stored.status, ScheduleStatus::Posted);
    assert!(stored.posted_at.is_some());
    assert!(stored.error_message.is_none());

    let delivered = delivered.lock().unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].review.title, review.title);
    assert_eq!(delivered[0].idempotency_key, format!("{}:0", schedule.id));
}

#[tokio::test]
async fn should_not_touch_future_or_settled_schedules() {
    let review = test_review(UserId::new());
    let future = test_schedule(&review, Utc::now() + Duration::hours(2));
    let mut posted = test_schedule(&review, Utc::now() - Duration::hours(1));
    posted.status = ScheduleStatus::Posted;
    let mut failed = test_schedule(&review, Utc::now() - Duration::hours(1));
    failed.status = ScheduleStatus::Failed;

    let repo = MockScheduleRepo::new(vec![future.clone(), posted, failed]);
    let webhook = MockWebhook::ok();
    let delivered = webhook.delivered_handle();

    let uc = dispatcher(repo.clone(), MockReviewRepo::new(vec![review]), webhook);
    let report = uc.execute(now_input(), &CancellationToken::new()).await.unwrap();

    assert_eq!(report.processed, 0);
    assert!(report.results.is_empty());
    assert!(delivered.lock().unwrap().is_empty());
    assert_eq!(repo.get(future.id), future);
}

#[tokio::test]
async fn should_return_empty_report_on_immediate_second_run() {
    let review = test_review(UserId::new());
    let repo = MockScheduleRepo::new(vec![
        test_schedule(&review, Utc::now() - Duration::minutes(5)),
        test_schedule(&review, Utc::now() - Duration::minutes(3)),
    ]);
    let webhook = MockWebhook::ok();
    let delivered = webhook.delivered_handle();
    let uc = dispatcher(repo, MockReviewRepo::new(vec![review]), webhook);

    let first = uc.execute(now_input(), &CancellationToken::new()).await.unwrap();
    assert_eq!(first.posted, 2);

    let second = uc.execute(now_input(), &CancellationToken::new()).await.unwrap();
    assert_eq!(second.processed, 0);
    assert_eq!(delivered.lock().unwrap().len(), 2, "no schedule is posted twice");
}

#[tokio::test]
async fn should_schedule_retry_with_backoff_on_failure() {
    let review = test_review(UserId::new());
    let schedule = test_schedule(&review, Utc::now() - Duration::minutes(1));
    let repo = MockScheduleRepo::new(vec![schedule.clone()]);
    let uc = dispatcher(
        repo.clone(),
        MockReviewRepo::new(vec![review]),
        MockWebhook::failing(),
    );

    let before = Utc::now();
    let report = uc.execute(now_input(), &CancellationToken::new()).await.unwrap();

    assert_eq!(report.retried, 1);
    assert_eq!(report.results[0].status, DispatchStatus::RetryScheduled);
    assert_eq!(
        report.results[0].message.as_deref(),
        Some("webhook responded 500 Internal Server Error")
    );

    let stored = repo.get(schedule.id);
    assert_eq!(stored.status, ScheduleStatus::Pending);
    assert_eq!(stored.retry_count, 1);
    let retry_at = stored.next_retry_at.expect("backoff recorded");
    assert!(retry_at >= before + Duration::minutes(5));

    // Still backing off: the next run leaves it alone.
    let report = uc.execute(now_input(), &CancellationToken::new()).await.unwrap();
    assert_eq!(report.processed, 0);
}

#[tokio::test]
async fn should_fail_after_exhausting_retries_and_reject_manual_retry() {
    let review = test_review(UserId::new());
    let schedule = test_schedule(&review, Utc::now() - Duration::minutes(1));
    let repo = MockScheduleRepo::new(vec![schedule.clone()]);
    let uc = dispatcher(
        repo.clone(),
        MockReviewRepo::new(vec![review]),
        MockWebhook::failing(),
    );

    // max_retries = 3: two failures reschedule, the third gives up.
    for expected in 1..=2 {
        let report = uc.execute(now_input(), &CancellationToken::new()).await.unwrap();
        assert_eq!(report.retried, 1);
        let stored = repo.get(schedule.id);
        assert_eq!(stored.status, ScheduleStatus::Pending);
        assert_eq!(stored.retry_count, expected);
        repo.expire_backoff(schedule.id);
    }

    let report = uc.execute(now_input(), &CancellationToken::new()).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.results[0].status, DispatchStatus::Failed);

    let stored = repo.get(schedule.id);
    assert_eq!(stored.status, ScheduleStatus::Failed);
    assert_eq!(stored.retry_count, 3);
    assert!(stored.next_retry_at.is_none());
    assert!(stored.error_message.is_some());

    let retry = RetryScheduleUseCase {
        schedules: repo.clone(),
        policy: uc.policy,
    };
    let result = retry
        .execute(Requester::user(schedule.user_id), schedule.id)
        .await;
    assert!(
        matches!(
            result,
            Err(SchedulerError::InvalidTransition(
                TransitionError::ExhaustedRetries {
                    retry_count: 3,
                    max_retries: 3
                }
            ))
        ),
        "expected ExhaustedRetries, got {result:?}"
    );
}

#[tokio::test]
async fn should_recover_after_transient_failure() {
    let review = test_review(UserId::new());
    let schedule = test_schedule(&review, Utc::now() - Duration::minutes(1));
    let repo = MockScheduleRepo::new(vec![schedule.clone()]);
    let webhook = MockWebhook::scripted(vec![Err(DeliveryError::new("webhook unreachable"))]);
    let delivered = webhook.delivered_handle();
    let uc = dispatcher(repo.clone(), MockReviewRepo::new(vec![review]), webhook);

    uc.execute(now_input(), &CancellationToken::new()).await.unwrap();
    repo.expire_backoff(schedule.id);
    let report = uc.execute(now_input(), &CancellationToken::new()).await.unwrap();

    assert_eq!(report.posted, 1);
    let stored = repo.get(schedule.id);
    assert_eq!(stored.status, ScheduleStatus::Posted);
    assert!(stored.error_message.is_none());
    assert!(stored.next_retry_at.is_none());

    let delivered = delivered.lock().unwrap();
    assert_eq!(delivered[1].attempt, 2);
    assert_eq!(delivered[1].idempotency_key, format!("{}:1", schedule.id));
}

#[tokio::test]
async fn should_treat_missing_review_as_delivery_failure() {
    let review = test_review(UserId::new());
    let schedule = test_schedule(&review, Utc::now() - Duration::minutes(1));
    let repo = MockScheduleRepo::new(vec![schedule.clone()]);
    let webhook = MockWebhook::ok();
    let delivered = webhook.delivered_handle();
    let uc = dispatcher(repo.clone(), MockReviewRepo::empty(), webhook);

    let report = uc.execute(now_input(), &CancellationToken::new()).await.unwrap();

    assert_eq!(report.retried, 1);
    let message = report.results[0].message.clone().unwrap();
    assert!(message.contains("not found"), "{message}");
    assert!(delivered.lock().unwrap().is_empty());
    assert_eq!(repo.get(schedule.id).retry_count, 1);
}

#[tokio::test]
async fn should_isolate_store_failures_per_schedule() {
    let review = test_review(UserId::new());
    let schedule = test_schedule(&review, Utc::now() - Duration::minutes(1));
    let repo = MockScheduleRepo::new(vec![schedule.clone()]);
    repo.fail_updates.store(true, Ordering::SeqCst);
    let uc = dispatcher(repo.clone(), MockReviewRepo::new(vec![review]), MockWebhook::ok());

    let report = uc.execute(now_input(), &CancellationToken::new()).await.unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.errors, 1);
    assert_eq!(report.results[0].status, DispatchStatus::Error);
    let message = report.results[0].message.as_deref().unwrap();
    assert!(message.contains("connection reset"), "{message}");
    assert_eq!(repo.get(schedule.id).status, ScheduleStatus::Pending);
}

#[tokio::test]
async fn should_fail_batch_when_candidates_cannot_be_listed() {
    let repo = MockScheduleRepo::empty();
    repo.fail_listing.store(true, Ordering::SeqCst);
    let uc = dispatcher(repo, MockReviewRepo::empty(), MockWebhook::ok());

    let result = uc.execute(now_input(), &CancellationToken::new()).await;
    assert!(
        matches!(result, Err(SchedulerError::Store(_))),
        "expected Store, got {result:?}"
    );
}

#[tokio::test]
async fn should_respect_batch_limit_oldest_first() {
    let review = test_review(UserId::new());
    let oldest = test_schedule(&review, Utc::now() - Duration::hours(3));
    let middle = test_schedule(&review, Utc::now() - Duration::hours(2));
    let newest = test_schedule(&review, Utc::now() - Duration::hours(1));
    let repo = MockScheduleRepo::new(vec![newest.clone(), oldest.clone(), middle.clone()]);
    let uc = dispatcher(repo.clone(), MockReviewRepo::new(vec![review]), MockWebhook::ok());

    let input = DispatchBatchInput {
        now: Utc::now(),
        limit: Some(2),
    };
    let report = uc.execute(input, &CancellationToken::new()).await.unwrap();

    let ids: Vec<_> = report.results.iter().map(|r| r.schedule_id).collect();
    assert_eq!(ids, vec![oldest.id, middle.id]);
    assert_eq!(repo.get(newest.id).status, ScheduleStatus::Pending);
}

#[tokio::test(start_paused = true)]
async fn should_count_webhook_timeout_as_failure() {
    let review = test_review(UserId::new());
    let schedule = test_schedule(&review, Utc::now() - Duration::minutes(1));
    let repo = MockScheduleRepo::new(vec![schedule.clone()]);
    let mut uc = dispatcher(
        repo.clone(),
        MockReviewRepo::new(vec![review]),
        MockWebhook::slow(StdDuration::from_secs(60)),
    );
    uc.settings = DispatchSettings {
        webhook_timeout: StdDuration::from_secs(2),
        ..DispatchSettings::default()
    };

    let report = uc.execute(now_input(), &CancellationToken::new()).await.unwrap();

    assert_eq!(report.retried, 1);
    assert_eq!(
        report.results[0].message.as_deref(),
        Some("webhook timed out after 2s")
    );
    assert_eq!(repo.get(schedule.id).retry_count, 1);
}

#[tokio::test]
async fn should_skip_remaining_candidates_once_cancelled() {
    let review = test_review(UserId::new());
    let repo = MockScheduleRepo::new(vec![
        test_schedule(&review, Utc::now() - Duration::minutes(3)),
        test_schedule(&review, Utc::now() - Duration::minutes(2)),
    ]);
    let webhook = MockWebhook::ok();
    let delivered = webhook.delivered_handle();
    let uc = dispatcher(repo, MockReviewRepo::new(vec![review]), webhook);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = uc.execute(now_input(), &cancel).await.unwrap();

    assert_eq!(report.processed, 0);
    assert_eq!(report.skipped, 2);
    assert!(delivered.lock().unwrap().is_empty());
}

fn due_schedules(review: &Review, n: i64) -> Vec<Schedule> {
    (0..n)
        .map(|i| test_schedule(review, Utc::now() - Duration::minutes(n - i)))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn should_cap_concurrent_webhook_calls() {
    let review = test_review(UserId::new());
    let repo = MockScheduleRepo::new(due_schedules(&review, 6));
    let webhook = MockWebhook::slow(StdDuration::from_secs(1));
    let max_in_flight = Arc::clone(&webhook.max_in_flight);
    let delivered = webhook.delivered_handle();
    let mut uc = dispatcher(repo, MockReviewRepo::new(vec![review]), webhook);
    uc.settings = DispatchSettings {
        concurrency: 3,
        ..DispatchSettings::default()
    };

    let report = uc.execute(now_input(), &CancellationToken::new()).await.unwrap();

    assert_eq!(report.posted, 6);
    assert_eq!(delivered.lock().unwrap().len(), 6);
    assert_eq!(max_in_flight.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn should_finish_in_flight_deliveries_when_cancelled_mid_batch() {
    let review = test_review(UserId::new());
    let schedules = due_schedules(&review, 6);
    let repo = MockScheduleRepo::new(schedules.clone());
    let webhook = MockWebhook::slow(StdDuration::from_secs(10));
    let delivered = webhook.delivered_handle();
    let mut uc = dispatcher(repo.clone(), MockReviewRepo::new(vec![review]), webhook);
    uc.settings = DispatchSettings {
        concurrency: 2,
        ..DispatchSettings::default()
    };

    // First pair lands at 10s, second pair starts then and lands at 20s.
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(StdDuration::from_secs(15)).await;
        trigger.cancel();
    });
    let report = uc.execute(now_input(), &cancel).await.unwrap();

    assert_eq!(report.processed, 4);
    assert_eq!(report.posted, 4);
    assert_eq!(report.skipped, 2);
    assert_eq!(delivered.lock().unwrap().len(), 4);

    let posted: Vec<_> = report.results.iter().map(|r| r.schedule_id).collect();
    let expected: Vec<_> = schedules[..4].iter().map(|s| s.id).collect();
    assert_eq!(posted, expected);
    for s in &schedules[4..] {
        assert_eq!(repo.get(s.id).status, ScheduleStatus::Pending);
    }
}

#[tokio::test]
async fn should_dispatch_duplicate_candidates_once() {
    let review = test_review(UserId::new());
    let schedule = test_schedule(&review, Utc::now() - Duration::minutes(1));
    let repo = MockScheduleRepo::new(vec![schedule.clone()]);
    repo.duplicate_due.store(true, Ordering::SeqCst);
    let webhook = MockWebhook::ok();
    let delivered = webhook.delivered_handle();
    let uc = dispatcher(repo.clone(), MockReviewRepo::new(vec![review]), webhook);

    let report = uc.execute(now_input(), &CancellationToken::new()).await.unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.posted, 1);
    assert_eq!(report.errors, 0);
    assert_eq!(delivered.lock().unwrap().len(), 1);
    assert_eq!(repo.get(schedule.id).status, ScheduleStatus::Posted);
}

#[tokio::test]
async fn should_serialize_dispatch_response_flat() {
    let review = test_review(UserId::new());
    let schedule = test_schedule(&review, Utc::now() - Duration::minutes(1));
    let repo = MockScheduleRepo::new(vec![schedule.clone()]);
    let uc = dispatcher(repo, MockReviewRepo::new(vec![review]), MockWebhook::failing());

    let report = uc.execute(now_input(), &CancellationToken::new()).await.unwrap();
    let json = serde_json::to_value(DispatchResponse {
        success: true,
        report,
    })
    .unwrap();

    assert_eq!(json["success"], true);
    assert_eq!(json["processed"], 1);
    assert_eq!(json["posted"], 0);
    assert_eq!(json["retried"], 1);
    assert_eq!(json["failed"], 0);
    assert_eq!(json["errors"], 0);
    assert_eq!(json["skipped"], 0);
    assert!(json["duration"].is_u64());
    assert!(json.get("report").is_none());

    let result = &json["results"][0];
    assert_eq!(result["scheduleId"], schedule.id.to_string());
    assert_eq!(result["status"], "retry_scheduled");
    assert_eq!(
        result["message"],
        "webhook responded 500 Internal Server Error"
    );
}
