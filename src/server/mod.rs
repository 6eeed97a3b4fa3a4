//! HTTP surface: `POST /chat`, `POST /chat/stream`, `GET /health`.
//!
//! Handlers always answer 200 once past the rate-limit gate; failures arrive as
//! sentinel text inside the body or the event stream.

pub mod rate_limit;

use crate::client::ChatService;
use crate::config::RelayConfig;
use crate::resilience::{KeyedRateLimiter, RateLimiterConfig};
use crate::types::{CompletionRequest, CompletionResult, STREAMING_DISABLED};
use crate::{Result, TokenStream};
use axum::extract::State;
use axum::http::{HeaderValue, Method};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use futures::{stream, Stream, StreamExt};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

const BUCKET_EVICTION_INTERVAL: Duration = Duration::from_secs(300);
const BUCKET_MAX_IDLE: Duration = Duration::from_secs(600);

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<dyn ChatService>,
    pub limiter: Arc<KeyedRateLimiter>,
    pub stream_enabled: bool,
    pub allowed_origin: String,
}

impl AppState {
    pub fn new(service: Arc<dyn ChatService>, cfg: &RelayConfig) -> Self {
        Self {
            service,
            limiter: Arc::new(KeyedRateLimiter::new(RateLimiterConfig::per_minute(
                cfg.requests_per_minute,
            ))),
            stream_enabled: cfg.stream_enabled,
            allowed_origin: cfg.allowed_origin.clone(),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let chat_routes = Router::new()
        .route("/chat", post(chat))
        .route("/chat/stream", post(chat_stream))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.limiter),
            rate_limit::limit_by_client,
        ));

    Router::new()
        .merge(chat_routes)
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.allowed_origin))
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any);

    if origin == "*" {
        return layer.allow_origin(AllowOrigin::any());
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => layer.allow_origin(value),
        Err(_) => {
            warn!(origin, "ignoring unparsable CORS origin");
            layer
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<CompletionRequest>,
) -> Json<CompletionResult> {
    debug!(stream = request.stream, "received synchronous chat request");
    Json(state.service.chat(request).await)
}

async fn chat_stream(
    State(state): State<AppState>,
    Json(request): Json<CompletionRequest>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let tokens: TokenStream = if state.stream_enabled {
        state.service.chat_stream(request)
    } else {
        stream::iter(vec![STREAMING_DISABLED.to_string()]).boxed()
    };

    let events = tokens.map(|token| Ok::<_, Infallible>(Event::default().data(sse_safe(token))));
    Sse::new(events).keep_alive(KeepAlive::default())
}

/// SSE framing cannot carry a carriage return inside `data`.
fn sse_safe(token: String) -> String {
    if token.contains('\r') {
        token.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        token
    }
}

/// Bind, serve until Ctrl-C, and periodically drop idle rate-limit buckets.
pub async fn serve(cfg: &RelayConfig, service: Arc<dyn ChatService>) -> Result<()> {
    let state = AppState::new(service, cfg);

    let limiter = Arc::clone(&state.limiter);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(BUCKET_EVICTION_INTERVAL);
        loop {
            ticker.tick().await;
            let evicted = limiter.evict_idle(BUCKET_MAX_IDLE);
            if evicted > 0 {
                debug!(
                    evicted,
                    remaining = limiter.tracked_clients(),
                    "evicted idle rate-limit buckets"
                );
            }
        }
    });

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;

    info!(
        addr = %cfg.bind_addr,
        upstream = %cfg.base_url,
        model = %cfg.model,
        stream_enabled = cfg.stream_enabled,
        "chat relay listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_safe_strips_carriage_returns() {
        assert_eq!(sse_safe("a\r\nb\rc".to_string()), "a\nb\nc");
        assert_eq!(sse_safe("plain".to_string()), "plain");
    }
}
