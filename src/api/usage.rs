// /usage routes

use super::extract::ApiQuery;
use super::{paged, ApiResult, AppState};
use crate::filter::UsageFilter;
use crate::machine::MachineType;
use axum::{extract::State, response::Response};
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct UsageQuery {
    machine_id: Option<String>,
    floor: Option<i64>,
    #[serde(alias = "position")]
    pos: Option<i64>,
    #[serde(rename = "type")]
    machine_type: Option<MachineType>,
    time_lower: Option<DateTime<Utc>>,
    time_upper: Option<DateTime<Utc>>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl UsageQuery {
    fn filter(&self) -> UsageFilter {
        UsageFilter {
            machine_id: self.machine_id.clone(),
            floor: self.floor,
            pos: self.pos,
            machine_type: self.machine_type,
            time_lower: self.time_lower,
            time_upper: self.time_upper,
        }
    }
}

/// GET /usage
pub async fn list(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<UsageQuery>,
) -> ApiResult<Response> {
    let page = state.query.page(query.limit, query.offset);
    let records = state.usage.find(&query.filter(), page).await?;
    Ok(paged(records))
}
