// BSD 3-Clause License
// Copyright (c) 2025, Shipyard Contributors
//
//! HTTP Front (spec 4.7-4.8): axum router wiring, grounded in the teacher's
//! `Router::new()` assembly in `noxterm.rs`.

mod handlers;
mod middleware;
pub mod state;

pub use state::AppState;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Builds the full axum `Router`. `/health` is deliberately left outside the
/// bearer-token gate so load balancers can probe liveness without a token.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/ship", post(handlers::create_ship))
        .route("/ship/:id", get(handlers::get_ship).delete(handlers::delete_ship))
        .route("/ship/:id/exec/:oper_endpoint", post(handlers::exec_operation))
        .route("/ship/logs/:id", get(handlers::ship_logs))
        .route("/ship/:id/extend-ttl", post(handlers::extend_ttl))
        .route("/health/detailed", get(handlers::health_detailed))
        .route("/metrics", get(handlers::metrics))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_bearer_token,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
