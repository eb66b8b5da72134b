//! Router construction for the PetPal contract server.

use axum::{
    routing::{get, post, put},
    Extension, Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the full axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let templates = Router::new()
        .route(
            "/templates",
            get(handlers::templates::list_templates).post(handlers::templates::save_template),
        )
        .route("/templates/:id", get(handlers::templates::get_template))
        .route(
            "/templates/:id/deactivate",
            post(handlers::templates::deactivate_template),
        );

    let contracts = Router::new()
        .route("/contracts/generate", post(handlers::contracts::generate))
        .route(
            "/contracts/generated",
            get(handlers::contracts::list_contracts).post(handlers::contracts::upsert_contract),
        )
        .route(
            "/contracts/generated/:id",
            get(handlers::contracts::get_contract),
        )
        .route(
            "/contracts/generated/:id/status",
            put(handlers::contracts::update_status),
        )
        .route(
            "/contracts/generated/:id/send",
            post(handlers::contracts::send_for_signature),
        )
        .route(
            "/contracts/generated/:id/cancel",
            post(handlers::contracts::cancel_contract),
        )
        .route("/contracts/expire", post(handlers::contracts::expire_overdue));

    // Signers arrive with a token, no session
    let signing = Router::new().route(
        "/sign/:token",
        get(handlers::signing::open).post(handlers::signing::submit),
    );

    Router::new()
        .route("/health", get(handlers::health::health))
        .merge(templates)
        .merge(contracts)
        .merge(signing)
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
