//! HTTP surface (feature `server`).
//!
//! Reads are open; every mutating route and the whole `/raspi` resource
//! require the `x-api-key` header. List routes return a JSON array and
//! signal truncation through `x-has-more` / `x-next-offset`.

pub mod auth;
pub mod error;
pub mod extract;
mod machines;
mod nodes;
mod usage;

pub use auth::{ApiKey, RequireApiKey, API_KEY_HEADER};
pub use error::{ApiError, ApiResult, ErrorBody};

use crate::config::QueryConfig;
use crate::filter::Page;
use crate::node::NodeRegistry;
use crate::registry::MachineRegistry;
use crate::sensor::SensorIngest;
use crate::service::LaundryService;
use crate::usage_log::UsageLog;
use axum::{
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub const HAS_MORE_HEADER: &str = "x-has-more";
pub const NEXT_OFFSET_HEADER: &str = "x-next-offset";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: MachineRegistry,
    pub usage: Arc<UsageLog>,
    pub nodes: Arc<NodeRegistry>,
    pub sensors: Arc<SensorIngest>,
    pub query: QueryConfig,
    pub api_key: ApiKey,
}

impl AppState {
    pub fn new(service: &LaundryService, query: QueryConfig, api_key: &str) -> Self {
        AppState {
            registry: service.registry.clone(),
            usage: service.usage.clone(),
            nodes: service.nodes.clone(),
            sensors: service.sensors.clone(),
            query,
            api_key: ApiKey::new(api_key),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/machine",
            post(machines::create)
                .get(machines::list)
                .put(machines::update)
                .delete(machines::delete),
        )
        .route("/machine/search", post(machines::search))
        .route("/machine/start", put(machines::start))
        .route("/machine/stop", put(machines::stop))
        .route("/machine/summary", get(machines::summary))
        .route("/usage", get(usage::list))
        .route(
            "/raspi",
            post(nodes::create)
                .put(nodes::upsert)
                .patch(nodes::update)
                .get(nodes::list),
        )
        .route("/sensor", put(nodes::report_sample))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

/// GET /health
async fn health_check() -> impl IntoResponse {
    Json(Health {
        status: "ok",
        version: crate::VERSION,
    })
}

/// JSON array of the page items plus the paging headers.
fn paged<T: Serialize>(page: Page<T>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        HAS_MORE_HEADER,
        HeaderValue::from_static(if page.has_more { "true" } else { "false" }),
    );
    if let Some(next) = page.next_offset {
        headers.insert(NEXT_OFFSET_HEADER, HeaderValue::from(next as u64));
    }

    (headers, Json(page.items)).into_response()
}
