use chrono::{Duration, Utc};

use clipcast_domain::id::UserId;
use clipcast_domain::pagination::{PageRequest, Sort};
use clipcast_domain::schedule::{ScheduleStatus, TargetType};
use clipcast_scheduler::domain::types::{DEFAULT_MAX_RETRIES, Requester, Review, ScheduleFilter};
use clipcast_scheduler::error::SchedulerError;
use clipcast_scheduler::usecase::schedule::{
    CreateScheduleInput, CreateScheduleUseCase, DeleteScheduleUseCase, GetScheduleUseCase,
    ListSchedulesUseCase,
};

use crate::helpers::{MockReviewRepo, MockScheduleRepo, test_review, test_schedule};

fn create_input(review: &Review) -> CreateScheduleInput {
    CreateScheduleInput {
        user_id: review.user_id,
        review_id: review.id,
        scheduled_for: Utc::now() + Duration::hours(4),
        max_retries: None,
        target_type: "group".to_owned(),
        target_id: " 5566778899 ".to_owned(),
        target_name: Some("  ".to_owned()),
        post_message: "Fresh review: budget keyboards".to_owned(),
        landing_page_url: None,
    }
}

fn create_usecase(
    repo: MockScheduleRepo,
    reviews: Vec<Review>,
) -> CreateScheduleUseCase<MockScheduleRepo, MockReviewRepo> {
    CreateScheduleUseCase {
        schedules: repo,
        reviews: MockReviewRepo::new(reviews),
        default_max_retries: DEFAULT_MAX_RETRIES,
    }
}

#[tokio::test]
async fn should_create_pending_schedule_with_defaults() {
    let review = test_review(UserId::new());
    let repo = MockScheduleRepo::empty();
    let uc = create_usecase(repo.clone(), vec![review.clone()]);

    let created = uc.execute(create_input(&review)).await.unwrap();

    assert_eq!(created.status, ScheduleStatus::Pending);
    assert_eq!(created.retry_count, 0);
    assert_eq!(created.max_retries, DEFAULT_MAX_RETRIES);
    assert_eq!(created.target.kind, TargetType::Group);
    assert_eq!(created.target.id, "5566778899");
    assert!(created.target.name.is_none(), "blank name is dropped");
    assert_eq!(repo.handle().lock().unwrap().len(), 1);
}

#[tokio::test]
async fn should_reject_blank_required_fields() {
    let review = test_review(UserId::new());
    let uc = create_usecase(MockScheduleRepo::empty(), vec![review.clone()]);

    let mut input = create_input(&review);
    input.post_message = "   ".to_owned();
    let result = uc.execute(input).await;
    assert!(
        matches!(result, Err(SchedulerError::MissingData)),
        "expected MissingData, got {result:?}"
    );

    let mut input = create_input(&review);
    input.target_id = String::new();
    assert!(matches!(uc.execute(input).await, Err(SchedulerError::MissingData)));
}

#[tokio::test]
async fn should_reject_excessive_max_retries() {
    let review = test_review(UserId::new());
    let uc = create_usecase(MockScheduleRepo::empty(), vec![review.clone()]);

    let mut input = create_input(&review);
    input.max_retries = Some(50);
    assert!(matches!(
        uc.execute(input).await,
        Err(SchedulerError::InvalidMaxRetries)
    ));

    let mut input = create_input(&review);
    input.max_retries = Some(0);
    let created = uc.execute(input).await.unwrap();
    assert_eq!(created.max_retries, 0);
}

#[tokio::test]
async fn should_reject_review_of_another_user() {
    let review = test_review(UserId::new());
    let repo = MockScheduleRepo::empty();
    let uc = create_usecase(repo.clone(), vec![review.clone()]);

    let mut input = create_input(&review);
    input.user_id = UserId::new();
    let result = uc.execute(input).await;

    assert!(
        matches!(result, Err(SchedulerError::ReviewNotFound)),
        "expected ReviewNotFound, got {result:?}"
    );
    assert!(repo.handle().lock().unwrap().is_empty());
}

#[tokio::test]
async fn should_scope_get_list_and_delete_to_owner() {
    let mine = test_review(UserId::new());
    let theirs = test_review(UserId::new());
    let early = test_schedule(&mine, Utc::now() - Duration::hours(2));
    let late = test_schedule(&mine, Utc::now() + Duration::hours(2));
    let foreign = test_schedule(&theirs, Utc::now());
    let repo = MockScheduleRepo::new(vec![late.clone(), foreign.clone(), early.clone()]);

    let get = GetScheduleUseCase {
        schedules: repo.clone(),
    };
    assert_eq!(get.execute(Requester::user(mine.user_id), early.id).await.unwrap(), early);
    assert!(matches!(
        get.execute(Requester::user(mine.user_id), foreign.id).await,
        Err(SchedulerError::ScheduleNotFound)
    ));

    let list = ListSchedulesUseCase {
        schedules: repo.clone(),
    };
    let filter = ScheduleFilter {
        sort: Sort::Desc,
        ..Default::default()
    };
    let listed = list
        .execute(Requester::user(mine.user_id), filter, PageRequest::default())
        .await
        .unwrap();
    let ids: Vec<_> = listed.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![late.id, early.id]);

    let delete = DeleteScheduleUseCase {
        schedules: repo.clone(),
    };
    assert!(matches!(
        delete.execute(Requester::user(mine.user_id), foreign.id).await,
        Err(SchedulerError::ScheduleNotFound)
    ));
    delete.execute(Requester::user(mine.user_id), early.id).await.unwrap();
    assert_eq!(repo.handle().lock().unwrap().len(), 2);
}

#[tokio::test]
async fn should_filter_list_by_status_and_range() {
    let review = test_review(UserId::new());
    let mut failed = test_schedule(&review, Utc::now() - Duration::days(1));
    failed.status = ScheduleStatus::Failed;
    let pending = test_schedule(&review, Utc::now() + Duration::days(1));
    let repo = MockScheduleRepo::new(vec![failed.clone(), pending.clone()]);
    let list = ListSchedulesUseCase { schedules: repo };

    let filter = ScheduleFilter {
        status: Some(ScheduleStatus::Failed),
        ..Default::default()
    };
    let listed = list
        .execute(Requester::user(review.user_id), filter, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(listed, vec![failed]);

    let filter = ScheduleFilter {
        from: Some(Utc::now()),
        ..Default::default()
    };
    let listed = list
        .execute(Requester::user(review.user_id), filter, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(listed, vec![pending]);
}

#[tokio::test]
async fn should_let_admin_manage_any_users_schedules() {
    let theirs = test_review(UserId::new());
    let other = test_review(UserId::new());
    let first = test_schedule(&theirs, Utc::now() - Duration::hours(1));
    let second = test_schedule(&other, Utc::now());
    let repo = MockScheduleRepo::new(vec![first.clone(), second.clone()]);
    let admin = Requester::admin(UserId::new());

    let get = GetScheduleUseCase {
        schedules: repo.clone(),
    };
    assert_eq!(get.execute(admin, first.id).await.unwrap(), first);

    let list = ListSchedulesUseCase {
        schedules: repo.clone(),
    };
    let everyone = list
        .execute(admin, ScheduleFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(everyone.len(), 2);

    let filter = ScheduleFilter {
        user_id: Some(other.user_id),
        ..Default::default()
    };
    let narrowed = list
        .execute(admin, filter.clone(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(narrowed, vec![second.clone()]);

    // A normal caller cannot widen the listing to someone else.
    let own = list
        .execute(Requester::user(theirs.user_id), filter, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(own, vec![first.clone()]);

    let delete = DeleteScheduleUseCase {
        schedules: repo.clone(),
    };
    delete.execute(admin, first.id).await.unwrap();
    assert!(matches!(
        delete.execute(admin, first.id).await,
        Err(SchedulerError::ScheduleNotFound)
    ));
    assert_eq!(repo.handle().lock().unwrap().len(), 1);
}
