pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod gateways;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod outcome;
pub mod ports;
pub mod schemas;
pub mod services;
pub mod validation;

use std::time::Duration;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};

use crate::health::HealthService;
use crate::services::{PaymentService, RateLimiter};

#[derive(Clone)]
pub struct AppState {
    pub payments: PaymentService,
    pub rate_limiter: RateLimiter,
    pub health: HealthService,
}

pub fn create_app(state: AppState, request_timeout: Duration) -> Router {
    // Only payment initiation is quota'd; gateways must always reach callbacks.
    let initiation = Router::new()
        .route("/deposit", post(handlers::payments::deposit))
        .route("/withdrawal", post(handlers::payments::withdrawal))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit_middleware,
        ));

    let api = Router::new()
        .merge(initiation)
        .route(
            "/callback/deposits/:transaction_id",
            put(handlers::callbacks::deposit_callback),
        )
        .route(
            "/callback/withdrawals/:transaction_id",
            put(handlers::callbacks::withdrawal_callback),
        );

    Router::new()
        .route("/health", get(handlers::health::health))
        .nest("/api/v1", api)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CorsLayer::permissive())
        .layer(from_fn(middleware::security_headers_middleware))
        .layer(from_fn(middleware::request_logger_middleware))
        .with_state(state)
}
