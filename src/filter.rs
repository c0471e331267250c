// Query/Filter Engine
//
// A filter is a sparse descriptor: every present field narrows the result,
// absent fields are unconstrained. Each filter lowers to a list of
// conditions joined by AND. The in-memory adapter evaluates them with
// `matches`, the SQLite adapter renders them into a WHERE clause, so both
// return the same rows in the same order.

use crate::machine::{Machine, MachineStatus, MachineType};
use crate::node::SensorNode;
use crate::usage::UsageRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// CONDITIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub enum FilterValue {
    Int(i64),
    Text(String),
    Time(DateTime<Utc>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    /// Greater than or equal.
    Ge,
    /// Less than or equal.
    Le,
}

impl Op {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ge => ">=",
            Op::Le => "<=",
        }
    }

    fn holds(&self, actual: &FilterValue, expected: &FilterValue) -> bool {
        match self {
            Op::Eq => actual == expected,
            Op::Ge => actual >= expected,
            Op::Le => actual <= expected,
        }
    }
}

/// One term of a conjunctive predicate. `field` is a column name of the
/// stored entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: &'static str,
    pub op: Op,
    pub value: FilterValue,
}

impl Condition {
    pub fn eq(field: &'static str, value: FilterValue) -> Self {
        Condition { field, op: Op::Eq, value }
    }

    pub fn ge(field: &'static str, value: FilterValue) -> Self {
        Condition { field, op: Op::Ge, value }
    }

    pub fn le(field: &'static str, value: FilterValue) -> Self {
        Condition { field, op: Op::Le, value }
    }
}

/// Entities that can be tested against conditions.
pub trait Filterable {
    fn field(&self, name: &str) -> Option<FilterValue>;
}

pub trait Filter {
    fn conditions(&self) -> Vec<Condition>;

    fn is_empty(&self) -> bool {
        self.conditions().is_empty()
    }

    fn matches<T: Filterable>(&self, item: &T) -> bool {
        self.conditions().iter().all(|c| match item.field(c.field) {
            Some(actual) => c.op.holds(&actual, &c.value),
            None => false,
        })
    }
}

// ============================================================================
// MACHINE FILTER
// ============================================================================

/// Sparse machine query. Results are ordered by `(floor, pos)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineFilter {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub floor: Option<i64>,
    #[serde(default, alias = "position")]
    pub pos: Option<i64>,
    #[serde(default, rename = "type")]
    pub machine_type: Option<MachineType>,
    #[serde(default)]
    pub status: Option<MachineStatus>,
    /// Machine last started at or before this time.
    #[serde(default)]
    pub last_started_before: Option<DateTime<Utc>>,
    /// Machine last started at or after this time.
    #[serde(default)]
    pub last_started_after: Option<DateTime<Utc>>,
}

impl MachineFilter {
    pub fn floor(floor: i64) -> Self {
        MachineFilter {
            floor: Some(floor),
            ..Default::default()
        }
    }

    pub fn at(floor: i64, pos: i64) -> Self {
        MachineFilter {
            floor: Some(floor),
            pos: Some(pos),
            ..Default::default()
        }
    }

    pub fn of_type(machine_type: MachineType) -> Self {
        MachineFilter {
            machine_type: Some(machine_type),
            ..Default::default()
        }
    }

    pub fn with_status(status: MachineStatus) -> Self {
        MachineFilter {
            status: Some(status),
            ..Default::default()
        }
    }
}

impl Filter for MachineFilter {
    fn conditions(&self) -> Vec<Condition> {
        let mut conditions = Vec::new();

        if let Some(id) = &self.id {
            conditions.push(Condition::eq("id", FilterValue::Text(id.clone())));
        }
        if let Some(floor) = self.floor {
            conditions.push(Condition::eq("floor", FilterValue::Int(floor)));
        }
        if let Some(pos) = self.pos {
            conditions.push(Condition::eq("pos", FilterValue::Int(pos)));
        }
        if let Some(machine_type) = self.machine_type {
            conditions.push(Condition::eq(
                "type",
                FilterValue::Text(machine_type.as_str().to_string()),
            ));
        }
        if let Some(status) = self.status {
            conditions.push(Condition::eq(
                "status",
                FilterValue::Text(status.as_str().to_string()),
            ));
        }
        if let Some(before) = self.last_started_before {
            conditions.push(Condition::le("last_started_at", FilterValue::Time(before)));
        }
        if let Some(after) = self.last_started_after {
            conditions.push(Condition::ge("last_started_at", FilterValue::Time(after)));
        }

        conditions
    }
}

impl Filterable for Machine {
    fn field(&self, name: &str) -> Option<FilterValue> {
        match name {
            "id" => self.id.clone().map(FilterValue::Text),
            "floor" => Some(FilterValue::Int(self.floor)),
            "pos" => Some(FilterValue::Int(self.pos)),
            "type" => Some(FilterValue::Text(self.machine_type.as_str().to_string())),
            "status" => Some(FilterValue::Text(self.status.as_str().to_string())),
            "last_started_at" => Some(FilterValue::Time(self.last_started_at)),
            _ => None,
        }
    }
}

// ============================================================================
// USAGE FILTER
// ============================================================================

/// Sparse usage query. Time bounds apply to `started_at` and are inclusive.
/// Results are ordered by `(started_at, id)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageFilter {
    #[serde(default)]
    pub machine_id: Option<String>,
    #[serde(default)]
    pub floor: Option<i64>,
    #[serde(default, alias = "position")]
    pub pos: Option<i64>,
    #[serde(default, rename = "type")]
    pub machine_type: Option<MachineType>,
    #[serde(default)]
    pub time_lower: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_upper: Option<DateTime<Utc>>,
}

impl UsageFilter {
    pub fn at(floor: i64, pos: i64) -> Self {
        UsageFilter {
            floor: Some(floor),
            pos: Some(pos),
            ..Default::default()
        }
    }
}

impl Filter for UsageFilter {
    fn conditions(&self) -> Vec<Condition> {
        let mut conditions = Vec::new();

        if let Some(machine_id) = &self.machine_id {
            conditions.push(Condition::eq("machine_id", FilterValue::Text(machine_id.clone())));
        }
        if let Some(floor) = self.floor {
            conditions.push(Condition::eq("floor", FilterValue::Int(floor)));
        }
        if let Some(pos) = self.pos {
            conditions.push(Condition::eq("pos", FilterValue::Int(pos)));
        }
        if let Some(machine_type) = self.machine_type {
            conditions.push(Condition::eq(
                "type",
                FilterValue::Text(machine_type.as_str().to_string()),
            ));
        }
        if let Some(lower) = self.time_lower {
            conditions.push(Condition::ge("started_at", FilterValue::Time(lower)));
        }
        if let Some(upper) = self.time_upper {
            conditions.push(Condition::le("started_at", FilterValue::Time(upper)));
        }

        conditions
    }
}

impl Filterable for UsageRecord {
    fn field(&self, name: &str) -> Option<FilterValue> {
        match name {
            "machine_id" => Some(FilterValue::Text(self.machine_id.clone())),
            "floor" => Some(FilterValue::Int(self.floor)),
            "pos" => Some(FilterValue::Int(self.pos)),
            "type" => Some(FilterValue::Text(self.machine_type.as_str().to_string())),
            "started_at" => Some(FilterValue::Time(self.started_at)),
            _ => None,
        }
    }
}

// ============================================================================
// NODE FILTER
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeFilter {
    #[serde(default)]
    pub floor: Option<i64>,
    #[serde(default)]
    pub ip_addr: Option<String>,
}

impl Filter for NodeFilter {
    fn conditions(&self) -> Vec<Condition> {
        let mut conditions = Vec::new();
        if let Some(floor) = self.floor {
            conditions.push(Condition::eq("floor", FilterValue::Int(floor)));
        }
        if let Some(ip_addr) = &self.ip_addr {
            conditions.push(Condition::eq("ip_addr", FilterValue::Text(ip_addr.clone())));
        }
        conditions
    }
}

impl Filterable for SensorNode {
    fn field(&self, name: &str) -> Option<FilterValue> {
        match name {
            "floor" => Some(FilterValue::Int(self.floor)),
            "ip_addr" => Some(FilterValue::Text(self.ip_addr.clone())),
            _ => None,
        }
    }
}

// ============================================================================
// PAGING
// ============================================================================

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

/// Largest offset or limit any backend can address (SQLite binds `i64`).
pub const MAX_PAGE_INDEX: usize = i64::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: usize,
    pub offset: usize,
}

impl PageRequest {
    pub fn new(limit: usize, offset: usize) -> Self {
        PageRequest {
            limit: limit.clamp(1, MAX_PAGE_INDEX - 1),
            offset: offset.min(MAX_PAGE_INDEX),
        }
    }

    /// Number of rows to fetch so that `has_more` can be computed.
    pub fn fetch_limit(&self) -> usize {
        self.limit.saturating_add(1)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest::new(DEFAULT_PAGE_SIZE, 0)
    }
}

/// One page of results. A truncated result always reports `has_more`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<usize>,
}

impl<T> Page<T> {
    /// Build a page from rows fetched with `PageRequest::fetch_limit`.
    pub fn from_overfetch(mut items: Vec<T>, request: PageRequest) -> Self {
        let has_more = items.len() > request.limit;
        items.truncate(request.limit);

        Page {
            items,
            has_more,
            next_offset: has_more.then(|| request.offset.saturating_add(request.limit)),
        }
    }

    /// Page an already sorted, fully materialized result.
    pub fn slice(sorted: Vec<T>, request: PageRequest) -> Self {
        let window = sorted
            .into_iter()
            .skip(request.offset)
            .take(request.fetch_limit())
            .collect();
        Page::from_overfetch(window, request)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            has_more: self.has_more,
            next_offset: self.next_offset,
        }
    }
}

// ============================================================================
// ORDERING
// ============================================================================

pub fn sort_machines(machines: &mut [Machine]) {
    machines.sort_by_key(|m| m.key());
}

pub fn sort_usage(records: &mut [UsageRecord]) {
    records.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
}

pub fn sort_nodes(nodes: &mut [SensorNode]) {
    nodes.sort_by_key(|n| n.floor);
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::MachineKey;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    fn machines() -> Vec<Machine> {
        let mut washer = Machine::new(14, 0, MachineType::Washer, Duration::from_secs(1800));
        washer.id = Some("w".to_string());
        let dryer = Machine::new(14, 2, MachineType::Dryer, Duration::from_secs(2400));
        let mut other = Machine::new(8, 1, MachineType::Washer, Duration::from_secs(1800));
        other.status = MachineStatus::InUse;
        vec![washer, dryer, other]
    }

    fn matching(filter: &MachineFilter) -> Vec<MachineKey> {
        machines()
            .into_iter()
            .filter(|m| filter.matches(m))
            .map(|m| m.key())
            .collect()
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = MachineFilter::default();
        assert!(filter.is_empty());
        assert_eq!(matching(&filter).len(), 3);
    }

    #[test]
    fn test_fields_are_conjunctive() {
        assert_eq!(
            matching(&MachineFilter::floor(14)),
            vec![MachineKey::new(14, 0), MachineKey::new(14, 2)]
        );
        assert_eq!(
            matching(&MachineFilter::of_type(MachineType::Washer)),
            vec![MachineKey::new(14, 0), MachineKey::new(8, 1)]
        );

        let filter = MachineFilter {
            floor: Some(14),
            machine_type: Some(MachineType::Washer),
            ..Default::default()
        };
        assert_eq!(matching(&filter), vec![MachineKey::new(14, 0)]);

        assert!(matching(&MachineFilter::with_status(MachineStatus::Error)).is_empty());
    }

    #[test]
    fn test_id_filter_skips_machines_without_id() {
        let filter = MachineFilter {
            id: Some("w".to_string()),
            ..Default::default()
        };
        assert_eq!(matching(&filter), vec![MachineKey::new(14, 0)]);
    }

    #[test]
    fn test_time_bounds_are_inclusive() {
        let m = Machine::new(5, 0, MachineType::Washer, Duration::from_secs(60));
        let base = Utc::now();
        let mut record = UsageRecord::open(&m, base);
        record.stopped_at = Some(base + ChronoDuration::minutes(30));

        let exact = UsageFilter {
            time_lower: Some(base),
            time_upper: Some(base),
            ..Default::default()
        };
        assert!(exact.matches(&record));

        let later = UsageFilter {
            time_lower: Some(base + ChronoDuration::seconds(1)),
            ..Default::default()
        };
        assert!(!later.matches(&record));

        let earlier = UsageFilter {
            time_upper: Some(base - ChronoDuration::seconds(1)),
            ..Default::default()
        };
        assert!(!earlier.matches(&record));
    }

    #[test]
    fn test_page_signals_truncation() {
        let request = PageRequest::new(2, 0);
        let page = Page::slice(vec![1, 2, 3, 4, 5], request);

        assert_eq!(page.items, vec![1, 2]);
        assert!(page.has_more);
        assert_eq!(page.next_offset, Some(2));

        let last = Page::slice(vec![1, 2, 3, 4, 5], PageRequest::new(2, 4));
        assert_eq!(last.items, vec![5]);
        assert!(!last.has_more);
        assert_eq!(last.next_offset, None);
    }

    #[test]
    fn test_huge_offsets_are_clamped() {
        let request = PageRequest::new(usize::MAX, usize::MAX);
        assert_eq!(request.offset, MAX_PAGE_INDEX);
        assert_eq!(request.fetch_limit(), MAX_PAGE_INDEX);

        let unclamped = PageRequest {
            limit: 2,
            offset: usize::MAX,
        };
        let page = Page::from_overfetch(vec![1, 2, 3], unclamped);
        assert!(page.has_more);
        assert_eq!(page.next_offset, Some(usize::MAX));

        let beyond = Page::slice(vec![1, 2, 3], PageRequest::new(2, usize::MAX));
        assert!(beyond.is_empty());
        assert!(!beyond.has_more);
    }

    #[test]
    fn test_machine_filter_from_query_string_shape() {
        let filter: MachineFilter =
            serde_json::from_value(serde_json::json!({"floor": 14, "position": 0, "type": "washer"}))
                .unwrap();
        assert_eq!(filter.floor, Some(14));
        assert_eq!(filter.pos, Some(0));
        assert_eq!(filter.machine_type, Some(MachineType::Washer));
    }
}
