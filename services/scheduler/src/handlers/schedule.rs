use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clipcast_auth_types::identity::IdentityHeaders;
use clipcast_core::serde::{to_rfc3339_ms, to_rfc3339_ms_opt};
use clipcast_domain::id::{ReviewId, ScheduleId, UserId};
use clipcast_domain::pagination::{PageRequest, Sort};
use clipcast_domain::schedule::ScheduleStatus;
use clipcast_domain::user::UserRole;

use crate::domain::types::{PostTarget, Requester, Schedule, ScheduleFilter};
use crate::error::SchedulerError;
use crate::state::AppState;
use crate::usecase::retry::RetryScheduleUseCase;
use crate::usecase::schedule::{
    CreateScheduleInput, CreateScheduleUseCase, DeleteScheduleUseCase, GetScheduleUseCase,
    ListSchedulesUseCase,
};

impl From<&IdentityHeaders> for Requester {
    fn from(identity: &IdentityHeaders) -> Self {
        Self {
            user_id: UserId::from(identity.user_id),
            role: UserRole::from_u8_or_normal(identity.user_role),
        }
    }
}

#[derive(Serialize)]
pub struct ScheduleResponse {
    pub id: ScheduleId,
    pub review_id: ReviewId,
    #[serde(serialize_with = "to_rfc3339_ms")]
    pub scheduled_for: DateTime<Utc>,
    pub status: ScheduleStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error_message: Option<String>,
    #[serde(serialize_with = "to_rfc3339_ms_opt")]
    pub next_retry_at: Option<DateTime<Utc>>,
    pub target: PostTarget,
    pub post_message: String,
    pub landing_page_url: Option<String>,
    #[serde(serialize_with = "to_rfc3339_ms_opt")]
    pub posted_at: Option<DateTime<Utc>>,
    #[serde(serialize_with = "to_rfc3339_ms")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "to_rfc3339_ms")]
    pub updated_at: DateTime<Utc>,
}

impl From<Schedule> for ScheduleResponse {
    fn from(s: Schedule) -> Self {
        Self {
            id: s.id,
            review_id: s.review_id,
            scheduled_for: s.scheduled_for,
            status: s.status,
            retry_count: s.retry_count,
            max_retries: s.max_retries,
            error_message: s.error_message,
            next_retry_at: s.next_retry_at,
            target: s.target,
            post_message: s.post_message,
            landing_page_url: s.landing_page_url,
            posted_at: s.posted_at,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

// ── POST /schedules ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateScheduleRequest {
    pub review_id: ReviewId,
    pub scheduled_for: DateTime<Utc>,
    pub max_retries: Option<u32>,
    pub target_type: String,
    pub target_id: String,
    pub target_name: Option<String>,
    pub post_message: String,
    pub landing_page_url: Option<String>,
}

pub async fn create_schedule(
    identity: IdentityHeaders,
    State(state): State<AppState>,
    Json(body): Json<CreateScheduleRequest>,
) -> Result<impl IntoResponse, SchedulerError> {
    let usecase = CreateScheduleUseCase {
        schedules: state.schedule_repo(),
        reviews: state.review_repo(),
        default_max_retries: state.default_max_retries,
    };
    let schedule = usecase
        .execute(CreateScheduleInput {
            user_id: UserId::from(identity.user_id),
            review_id: body.review_id,
            scheduled_for: body.scheduled_for,
            max_retries: body.max_retries,
            target_type: body.target_type,
            target_id: body.target_id,
            target_name: body.target_name,
            post_message: body.post_message,
            landing_page_url: body.landing_page_url,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(ScheduleResponse::from(schedule))))
}

// ── GET /schedules ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ListSchedulesQuery {
    /// Honoured for admins only.
    pub user_id: Option<UserId>,
    pub status: Option<ScheduleStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sort: Sort,
    pub per_page: Option<u32>,
    pub page: Option<u32>,
}

impl ListSchedulesQuery {
    fn page_request(&self) -> PageRequest {
        let default = PageRequest::default();
        PageRequest {
            per_page: self.per_page.unwrap_or(default.per_page),
            page: self.page.unwrap_or(default.page),
        }
    }
}

pub async fn list_schedules(
    identity: IdentityHeaders,
    State(state): State<AppState>,
    Query(query): Query<ListSchedulesQuery>,
) -> Result<Json<Vec<ScheduleResponse>>, SchedulerError> {
    let usecase = ListSchedulesUseCase {
        schedules: state.schedule_repo(),
    };
    let page = query.page_request();
    let filter = ScheduleFilter {
        user_id: query.user_id,
        status: query.status,
        from: query.from,
        to: query.to,
        sort: query.sort,
    };
    let schedules = usecase
        .execute(Requester::from(&identity), filter, page)
        .await?;

    Ok(Json(schedules.into_iter().map(ScheduleResponse::from).collect()))
}

// ── GET /schedules/{id} ──────────────────────────────────────────────────────

pub async fn get_schedule(
    identity: IdentityHeaders,
    State(state): State<AppState>,
    Path(id): Path<ScheduleId>,
) -> Result<Json<ScheduleResponse>, SchedulerError> {
    let usecase = GetScheduleUseCase {
        schedules: state.schedule_repo(),
    };
    let schedule = usecase.execute(Requester::from(&identity), id).await?;
    Ok(Json(schedule.into()))
}

// ── DELETE /schedules/{id} ───────────────────────────────────────────────────

pub async fn delete_schedule(
    identity: IdentityHeaders,
    State(state): State<AppState>,
    Path(id): Path<ScheduleId>,
) -> Result<StatusCode, SchedulerError> {
    let usecase = DeleteScheduleUseCase {
        schedules: state.schedule_repo(),
    };
    usecase.execute(Requester::from(&identity), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── POST /schedules/{id}/retry ───────────────────────────────────────────────

pub async fn retry_schedule(
    identity: IdentityHeaders,
    State(state): State<AppState>,
    Path(id): Path<ScheduleId>,
) -> Result<Json<ScheduleResponse>, SchedulerError> {
    let usecase = RetryScheduleUseCase {
        schedules: state.schedule_repo(),
        policy: state.policy,
    };
    let schedule = usecase.execute(Requester::from(&identity), id).await?;
    Ok(Json(schedule.into()))
}
