use anyhow::Context as _;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect,
};

use clipcast_domain::id::{ReviewId, ScheduleId, UserId};
use clipcast_domain::pagination::{PageRequest, Sort};
use clipcast_domain::schedule::{ScheduleStatus, TargetType};
use clipcast_scheduler_schema::{reviews, schedules};

use crate::domain::policy::TransitionError;
use crate::domain::repository::{ReviewRepository, ScheduleRepository};
use crate::domain::types::{
    AffiliateLink, NewSchedule, PostTarget, Review, Schedule, ScheduleFilter, SchedulePatch,
};
use crate::error::SchedulerError;

// ── Schedule repository ──────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbScheduleRepository {
    pub db: DatabaseConnection,
}

impl ScheduleRepository for DbScheduleRepository {
    async fn create(&self, draft: &NewSchedule) -> Result<Schedule, SchedulerError> {
        let now = Utc::now();
        let max_retries = i32::try_from(draft.max_retries).context("max_retries out of range")?;
        let model = schedules::ActiveModel {
            id: Set(ScheduleId::new().0),
            user_id: Set(draft.user_id.0),
            review_id: Set(draft.review_id.0),
            scheduled_for: Set(draft.scheduled_for),
            status: Set(ScheduleStatus::Pending.as_str().to_owned()),
            retry_count: Set(0),
            max_retries: Set(max_retries),
            error_message: Set(None),
            next_retry_at: Set(None),
            target_type: Set(draft.target.kind.as_str().to_owned()),
            target_id: Set(draft.target.id.clone()),
            target_name: Set(draft.target.name.clone()),
            post_message: Set(draft.post_message.clone()),
            landing_page_url: Set(draft.landing_page_url.clone()),
            posted_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await
        .context("create schedule")?;
        schedule_from_model(model)
    }

    async fn find_by_id(&self, id: ScheduleId) -> Result<Option<Schedule>, SchedulerError> {
        let model = schedules::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .context("find schedule by id")?;
        model.map(schedule_from_model).transpose()
    }

    async fn update(
        &self,
        id: ScheduleId,
        expected: ScheduleStatus,
        patch: &SchedulePatch,
    ) -> Result<Schedule, SchedulerError> {
        let mut am = schedules::ActiveModel {
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        if let Some(status) = patch.status {
            am.status = Set(status.as_str().to_owned());
        }
        if let Some(retry_count) = patch.retry_count {
            am.retry_count = Set(i32::try_from(retry_count).context("retry_count out of range")?);
        }
        if let Some(error_message) = &patch.error_message {
            am.error_message = Set(error_message.clone());
        }
        if let Some(next_retry_at) = patch.next_retry_at {
            am.next_retry_at = Set(next_retry_at);
        }
        if let Some(posted_at) = patch.posted_at {
            am.posted_at = Set(posted_at);
        }

        // Single conditional UPDATE; the row lock serializes concurrent writers.
        let updated = schedules::Entity::update_many()
            .set(am)
            .filter(schedules::Column::Id.eq(id.0))
            .filter(schedules::Column::Status.eq(expected.as_str()))
            .exec_with_returning(&self.db)
            .await
            .context("update schedule")?;

        if let Some(model) = updated.into_iter().next() {
            return schedule_from_model(model);
        }
        match self.find_by_id(id).await? {
            None => Err(SchedulerError::ScheduleNotFound),
            Some(current) => Err(TransitionError::StatusChanged {
                expected,
                actual: current.status,
            }
            .into()),
        }
    }

    async fn list(
        &self,
        filter: &ScheduleFilter,
        page: PageRequest,
    ) -> Result<Vec<Schedule>, SchedulerError> {
        let mut query = schedules::Entity::find();
        if let Some(user_id) = filter.user_id {
            query = query.filter(schedules::Column::UserId.eq(user_id.0));
        }
        if let Some(status) = filter.status {
            query = query.filter(schedules::Column::Status.eq(status.as_str()));
        }
        if let Some(from) = filter.from {
            query = query.filter(schedules::Column::ScheduledFor.gte(from));
        }
        if let Some(to) = filter.to {
            query = query.filter(schedules::Column::ScheduledFor.lt(to));
        }
        query = match filter.sort {
            Sort::Asc => query.order_by_asc(schedules::Column::ScheduledFor),
            Sort::Desc => query.order_by_desc(schedules::Column::ScheduledFor),
        };

        let models = query
            .order_by_asc(schedules::Column::Id)
            .offset(page.offset())
            .limit(page.limit())
            .all(&self.db)
            .await
            .context("list schedules")?;
        models.into_iter().map(schedule_from_model).collect()
    }

    async fn list_due(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<Schedule>, SchedulerError> {
        let models = schedules::Entity::find()
            .filter(schedules::Column::Status.eq(ScheduleStatus::Pending.as_str()))
            .filter(schedules::Column::ScheduledFor.lte(now))
            .filter(
                Condition::any()
                    .add(schedules::Column::NextRetryAt.is_null())
                    .add(schedules::Column::NextRetryAt.lte(now)),
            )
            .order_by_asc(schedules::Column::ScheduledFor)
            .order_by_asc(schedules::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await
            .context("list due schedules")?;
        models.into_iter().map(schedule_from_model).collect()
    }

    async fn delete(&self, id: ScheduleId, user_id: UserId) -> Result<bool, SchedulerError> {
        let result = schedules::Entity::delete_many()
            .filter(schedules::Column::Id.eq(id.0))
            .filter(schedules::Column::UserId.eq(user_id.0))
            .exec(&self.db)
            .await
            .context("delete schedule")?;
        Ok(result.rows_affected > 0)
    }
}

fn schedule_from_model(model: schedules::Model) -> Result<Schedule, SchedulerError> {
    let status: ScheduleStatus = model
        .status
        .parse()
        .with_context(|| format!("schedule {} has unreadable status", model.id))?;
    Ok(Schedule {
        id: model.id.into(),
        user_id: model.user_id.into(),
        review_id: model.review_id.into(),
        scheduled_for: model.scheduled_for,
        status,
        retry_count: u32::try_from(model.retry_count)
            .with_context(|| format!("schedule {} has negative retry_count", model.id))?,
        max_retries: u32::try_from(model.max_retries)
            .with_context(|| format!("schedule {} has negative max_retries", model.id))?,
        error_message: model.error_message,
        next_retry_at: model.next_retry_at,
        target: PostTarget {
            kind: TargetType::from(model.target_type.as_str()),
            id: model.target_id,
            name: model.target_name,
        },
        post_message: model.post_message,
        landing_page_url: model.landing_page_url,
        posted_at: model.posted_at,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

// ── Review repository ────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbReviewRepository {
    pub db: DatabaseConnection,
}

impl ReviewRepository for DbReviewRepository {
    async fn find_by_id(&self, id: ReviewId) -> Result<Option<Review>, SchedulerError> {
        let model = reviews::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .context("find review by id")?;
        Ok(model.map(review_from_model))
    }
}

fn review_from_model(model: reviews::Model) -> Review {
    // A malformed link list should not block posting the review itself.
    let links: Vec<reviews::AffiliateLinkJson> =
        match serde_json::from_value(model.affiliate_links) {
            Ok(links) => links,
            Err(e) => {
                tracing::warn!(review_id = %model.id, error = %e, "ignoring malformed affiliate_links");
                Vec::new()
            }
        };
    Review {
        id: model.id.into(),
        user_id: model.user_id.into(),
        title: model.title,
        video_url: model.video_url,
        affiliate_links: links
            .into_iter()
            .map(|link| AffiliateLink {
                platform: link.platform,
                url: link.url,
            })
            .collect(),
    }
}
