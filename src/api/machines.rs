// /machine routes

use super::extract::{ApiJson, ApiQuery};
use super::{paged, ApiResult, AppState, RequireApiKey};
use crate::filter::MachineFilter;
use crate::machine::{Machine, MachineKey, MachineStatus, MachineType, MachineUpdate};
use crate::notify::{self, FloorSummary};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Machine as returned to clients, with the derived time left.
#[derive(Debug, Serialize)]
pub struct MachineView {
    #[serde(flatten)]
    pub machine: Machine,
    /// Seconds left in the current cycle.
    pub approx_time_left: u64,
}

impl MachineView {
    fn at(machine: Machine, now: DateTime<Utc>) -> Self {
        let approx_time_left = machine.time_left(now).as_secs();
        MachineView {
            machine,
            approx_time_left,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LocationQuery {
    pub floor: i64,
    #[serde(alias = "position")]
    pub pos: i64,
}

impl LocationQuery {
    fn key(&self) -> MachineKey {
        MachineKey::new(self.floor, self.pos)
    }
}

/// Query string of GET /machine. Flattening does not survive
/// urlencoded numbers, so the filter fields are repeated here.
#[derive(Debug, Default, Deserialize)]
pub struct MachineQuery {
    id: Option<String>,
    floor: Option<i64>,
    #[serde(alias = "position")]
    pos: Option<i64>,
    #[serde(rename = "type")]
    machine_type: Option<MachineType>,
    status: Option<MachineStatus>,
    last_started_before: Option<DateTime<Utc>>,
    last_started_after: Option<DateTime<Utc>>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl MachineQuery {
    fn filter(&self) -> MachineFilter {
        MachineFilter {
            id: self.id.clone(),
            floor: self.floor,
            pos: self.pos,
            machine_type: self.machine_type,
            status: self.status,
            last_started_before: self.last_started_before,
            last_started_after: self.last_started_after,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    floor: Option<i64>,
}

/// POST /machine
pub async fn create(
    _auth: RequireApiKey,
    State(state): State<AppState>,
    ApiJson(machine): ApiJson<Machine>,
) -> ApiResult<StatusCode> {
    state.registry.create(machine).await?;
    Ok(StatusCode::CREATED)
}

/// GET /machine
pub async fn list(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<MachineQuery>,
) -> ApiResult<Response> {
    let page = state.query.page(query.limit, query.offset);
    let machines = state.registry.find(&query.filter(), page).await?;

    let now = Utc::now();
    Ok(paged(machines.map(|m| MachineView::at(m, now))))
}

/// POST /machine/search: same as GET /machine with the filter in the body
pub async fn search(
    State(state): State<AppState>,
    ApiQuery(paging): ApiQuery<PageQuery>,
    ApiJson(filter): ApiJson<MachineFilter>,
) -> ApiResult<Response> {
    let page = state.query.page(paging.limit, paging.offset);
    let machines = state.registry.find(&filter, page).await?;

    let now = Utc::now();
    Ok(paged(machines.map(|m| MachineView::at(m, now))))
}

/// PUT /machine?floor=&pos=
pub async fn update(
    _auth: RequireApiKey,
    State(state): State<AppState>,
    ApiQuery(location): ApiQuery<LocationQuery>,
    ApiJson(update): ApiJson<MachineUpdate>,
) -> ApiResult<Json<MachineView>> {
    let machine = state.registry.update(location.key(), update).await?;
    Ok(Json(MachineView::at(machine, Utc::now())))
}

/// PUT /machine/start?floor=&pos=
pub async fn start(
    _auth: RequireApiKey,
    State(state): State<AppState>,
    ApiQuery(location): ApiQuery<LocationQuery>,
) -> ApiResult<StatusCode> {
    state.registry.start(location.key()).await?;
    Ok(StatusCode::ACCEPTED)
}

/// PUT /machine/stop?floor=&pos=
pub async fn stop(
    _auth: RequireApiKey,
    State(state): State<AppState>,
    ApiQuery(location): ApiQuery<LocationQuery>,
) -> ApiResult<StatusCode> {
    state.registry.stop(location.key()).await?;
    Ok(StatusCode::ACCEPTED)
}

/// DELETE /machine?floor=&pos=
pub async fn delete(
    _auth: RequireApiKey,
    State(state): State<AppState>,
    ApiQuery(location): ApiQuery<LocationQuery>,
) -> ApiResult<StatusCode> {
    state.registry.delete(location.key()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /machine/summary?floor=
pub async fn summary(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SummaryQuery>,
) -> ApiResult<impl IntoResponse> {
    let filter = MachineFilter {
        floor: query.floor,
        ..Default::default()
    };
    let floors: Vec<FloorSummary> = notify::snapshot(&state.registry, &filter).await?;
    Ok(Json(floors))
}
