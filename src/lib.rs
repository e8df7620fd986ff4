pub mod adapters;
pub mod config;
pub mod domain;
pub mod infra;
pub mod services;

use {
    adapters::http,
    axum::{
        Router,
        extract::DefaultBodyLimit,
        routing::{get, post},
    },
    domain::{gateway::CheckoutGateway, ledger::LedgerStore, notification::NotificationOutbox},
    services::payment_orchestrator::CheckoutSettings,
    std::{sync::Arc, time::Duration},
    tower::ServiceBuilder,
    tower_http::timeout::TimeoutLayer,
};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn LedgerStore>,
    pub outbox: Arc<dyn NotificationOutbox>,
    pub gateway: Arc<dyn CheckoutGateway>,
    pub checkout: Arc<CheckoutSettings>,
    pub stripe_webhook_secret: Arc<str>,
}

pub fn router(state: AppState, http_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(http::health))
        .route("/requests", post(http::create_request))
        .route(
            "/requests/{id}",
            get(http::get_request)
                .patch(http::update_request)
                .delete(http::delete_request),
        )
        .route("/requests/{id}/attachments", post(http::add_attachment))
        .route("/requests/{id}/notes", post(http::add_note))
        .route(
            "/requests/{id}/reviews",
            get(http::list_reviews).post(http::add_review),
        )
        .route("/requests/{id}/payment", post(http::initiate_payment))
        .route("/attachments/{id}/request", get(http::request_for_attachment))
        .route("/payments/confirm-session", get(http::confirm_session))
        .route(
            "/webhooks/stripe",
            post(adapters::stripe::webhook::wh_handler),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TimeoutLayer::new(http_timeout))
                .layer(DefaultBodyLimit::max(64 * 1024)), // 64 KB; checkout events are well below
        )
        .with_state(state)
}
