use axum::{
    Router,
    routing::{get, post},
};

use clipcast_core::health::healthz;
use clipcast_core::middleware::{propagate_request_id_layer, request_id_layer, trace_layer};

use crate::handlers::{
    cron::run_dispatch,
    health::readyz,
    schedule::{create_schedule, delete_schedule, get_schedule, list_schedules, retry_schedule},
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Cron trigger
        .route("/cron/dispatch", get(run_dispatch).post(run_dispatch))
        // Schedules
        .route("/schedules", get(list_schedules).post(create_schedule))
        .route("/schedules/{id}", get(get_schedule).delete(delete_schedule))
        .route("/schedules/{id}/retry", post(retry_schedule))
        .with_state(state)
        // Outermost last: the request id is set before tracing sees the request.
        .layer(propagate_request_id_layer())
        .layer(trace_layer())
        .layer(request_id_layer())
}
