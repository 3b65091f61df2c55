pub mod monitoring_routes;
pub mod provision_routes;

use crate::state::SharedState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub fn app(state: SharedState) -> Router {
    let api = Router::new()
        .route("/provision", post(provision_routes::provision))
        .route("/status/{id}", get(provision_routes::status))
        .route("/ssl/{id}", post(provision_routes::issue_certificate))
        .with_state(state.clone());

    // Unauthenticated probes at the root, everything else under /api
    Router::new()
        .route("/health", get(monitoring_routes::health))
        .route("/metrics", get(monitoring_routes::metrics))
        .with_state(state)
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
}
