// /raspi and /sensor routes: sensor node registry and raw samples

use super::extract::{ApiJson, ApiQuery};
use super::{paged, ApiResult, AppState, RequireApiKey};
use crate::filter::NodeFilter;
use crate::machine::MachineStatus;
use crate::node::{NodeUpdate, SensorNode};
use crate::sensor::SensorSample;
use axum::{extract::State, http::StatusCode, response::Response, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct FloorQuery {
    floor: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct NodeQuery {
    floor: Option<i64>,
    ip_addr: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

/// POST /raspi
pub async fn create(
    _auth: RequireApiKey,
    State(state): State<AppState>,
    ApiJson(node): ApiJson<SensorNode>,
) -> ApiResult<(StatusCode, Json<SensorNode>)> {
    let node = state.nodes.create(node).await?;
    Ok((StatusCode::CREATED, Json(node)))
}

/// PUT /raspi: heartbeat, creates the node when missing
pub async fn upsert(
    _auth: RequireApiKey,
    State(state): State<AppState>,
    ApiJson(node): ApiJson<SensorNode>,
) -> ApiResult<Json<SensorNode>> {
    Ok(Json(state.nodes.upsert(node).await?))
}

/// PATCH /raspi?floor=
pub async fn update(
    _auth: RequireApiKey,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<FloorQuery>,
    ApiJson(update): ApiJson<NodeUpdate>,
) -> ApiResult<Json<SensorNode>> {
    Ok(Json(state.nodes.update(query.floor, update).await?))
}

/// GET /raspi
pub async fn list(
    _auth: RequireApiKey,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<NodeQuery>,
) -> ApiResult<Response> {
    let filter = NodeFilter {
        floor: query.floor,
        ip_addr: query.ip_addr,
    };
    let page = state.query.page(query.limit, query.offset);
    Ok(paged(state.nodes.find(&filter, page).await?))
}

#[derive(Debug, Serialize)]
pub struct SampleOutcome {
    /// New machine status when the sample changed it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<MachineStatus>,
}

/// PUT /sensor: one raw indicator sample from a node
pub async fn report_sample(
    _auth: RequireApiKey,
    State(state): State<AppState>,
    ApiJson(sample): ApiJson<SensorSample>,
) -> ApiResult<Json<SampleOutcome>> {
    let changed = state.sensors.report(sample).await?;
    Ok(Json(SampleOutcome {
        status: changed.map(|m| m.status),
    }))
}
