//! HTTP routes

mod admin;
mod health;
mod webhooks;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/webhooks/stripe", post(webhooks::stripe_webhook))
        .route("/payments/stars", post(webhooks::stars_payment))
        // Operator endpoints; authentication is enforced by the fronting
        // gateway, which only admits support tooling roles
        .route(
            "/admin/queues/grant/:job_id/replay",
            post(admin::replay_grant),
        )
        .route(
            "/admin/queues/revoke/:job_id/replay",
            post(admin::replay_revoke),
        )
        .route("/admin/queues/dead", get(admin::list_dead_jobs))
        .with_state(state)
}
