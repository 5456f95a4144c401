//! Axum server setup and routing.

use std::net::SocketAddr;

use axum::{middleware, routing::get, Router};
use eyre::WrapErr;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::api::{handlers, middleware as api_middleware};
use crate::app_state::AppState;

/// Build the `/api/v1` router with tracing, CORS and request logging.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/prices", get(handlers::prices::list_prices))
        .route("/prices/:symbol", get(handlers::prices::get_price))
        .route("/pools", get(handlers::pools::list_pools))
        .route("/stream", get(handlers::stream::websocket_handler))
        .route("/events", get(handlers::events::sse_handler));

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(middleware::from_fn(api_middleware::logging::log_requests));

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware_stack)
        .with_state(state)
}

/// Bind `addr` and serve until the process exits.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn run_server(state: AppState, addr: SocketAddr) -> eyre::Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("cannot bind {addr}"))?;
    info!(addr = %addr, "Broadcast server listening");

    axum::serve(listener, app).await.wrap_err("server failed")?;
    Ok(())
}
