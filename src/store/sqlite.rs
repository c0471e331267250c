// SQLite adapter
//
// Statements run on pooled connections inside the pool's blocking threads,
// so calls on different machines never wait on each other in-process.
// Concurrent writers are serialized by SQLite itself (WAL plus a busy
// timeout). Key uniqueness is enforced by the schema, so create-if-absent is
// a plain INSERT whose constraint violation becomes `Conflict`. Timestamps are
// stored as fixed-width RFC3339 text so string order equals time order.

use super::{MachineStore, NodeStore, UsageStore};
use crate::error::{LaundryError, Result};
use crate::filter::{
    Condition, Filter, FilterValue, MachineFilter, NodeFilter, Page, PageRequest, UsageFilter,
};
use crate::machine::{Machine, MachineKey, MachineStatus, MachineType};
use crate::node::SensorNode;
use crate::usage::UsageRecord;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use deadpool_sqlite::{Config as PoolConfig, Pool, Runtime};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// How long a statement waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool,
    /// Holds a shared in-memory database open while pooled connections come
    /// and go. Never used for statements.
    _anchor: Option<Arc<Mutex<Connection>>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                LaundryError::BackendUnavailable(format!("{}: {}", parent.display(), e))
            })?;
        }

        setup_database(&Connection::open(path)?)?;
        Ok(SqliteStore {
            pool: create_pool(path)?,
            _anchor: None,
        })
    }

    /// Private in-memory database, shared by this store's connections only.
    pub fn open_in_memory() -> Result<Self> {
        let uri = format!("file:laundry-{}?mode=memory&cache=shared", Uuid::new_v4());
        let anchor = Connection::open(&uri)?;
        setup_database(&anchor)?;

        Ok(SqliteStore {
            pool: create_pool(Path::new(&uri))?,
            _anchor: Some(Arc::new(Mutex::new(anchor))),
        })
    }

    /// Run `f` on a pooled connection off the async worker threads.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.pool.get().await?;
        conn.interact(move |conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            f(&*conn)
        })
        .await?
    }
}

fn create_pool(path: &Path) -> Result<Pool> {
    let pool = PoolConfig::new(path)
        .create_pool(Runtime::Tokio1)
        .map_err(|e| LaundryError::BackendUnavailable(format!("Failed to create pool: {}", e)))?;
    debug!(max_size = pool.status().max_size, "sqlite pool ready");
    Ok(pool)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery; in-memory databases silently keep "memory"
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Machines (one row per floor/position)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS machines (
            floor INTEGER NOT NULL,
            pos INTEGER NOT NULL,
            id TEXT,
            type TEXT NOT NULL,
            status TEXT NOT NULL,
            cycle_duration INTEGER NOT NULL,
            last_started_at TEXT NOT NULL,
            PRIMARY KEY (floor, pos)
        )",
        [],
    )?;

    // ==========================================================================
    // Usage log (append-only except for stopped_at)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS usage_records (
            id TEXT PRIMARY KEY,
            machine_id TEXT NOT NULL,
            floor INTEGER NOT NULL,
            pos INTEGER NOT NULL,
            type TEXT NOT NULL,
            started_at TEXT NOT NULL,
            stopped_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sensor_nodes (
            floor INTEGER PRIMARY KEY,
            ip_addr TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_machines_type ON machines(type)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_usage_started ON usage_records(started_at, id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_usage_machine ON usage_records(floor, pos, stopped_at)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// ROW MAPPING
// ============================================================================

const MACHINE_COLUMNS: &str = "floor, pos, id, type, status, cycle_duration, last_started_at";
const USAGE_COLUMNS: &str = "id, machine_id, floor, pos, type, started_at, stopped_at";
const NODE_COLUMNS: &str = "floor, ip_addr, updated_at";

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Cycle length as stored, in whole seconds.
fn cycle_secs(machine: &Machine) -> Result<i64> {
    i64::try_from(machine.cycle_duration.as_secs()).map_err(|_| {
        LaundryError::Validation(format!("cycle_duration of {} is out of range", machine.key()))
    })
}

/// Offsets beyond what SQLite can bind address no rows anyway.
fn bind_index(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn conversion_error<E>(idx: usize, ty: Type, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(err))
}

fn time_at(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, Type::Text, e))
}

fn parsed_at<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    text.parse().map_err(|e| conversion_error(idx, Type::Text, e))
}

fn machine_from_row(row: &Row) -> rusqlite::Result<Machine> {
    let secs: i64 = row.get(5)?;
    let secs = u64::try_from(secs).map_err(|e| conversion_error(5, Type::Integer, e))?;
    Ok(Machine {
        floor: row.get(0)?,
        pos: row.get(1)?,
        id: row.get(2)?,
        machine_type: parsed_at::<MachineType>(row, 3)?,
        status: parsed_at::<MachineStatus>(row, 4)?,
        cycle_duration: Duration::from_secs(secs),
        last_started_at: time_at(row, 6)?,
    })
}

fn usage_from_row(row: &Row) -> rusqlite::Result<UsageRecord> {
    let stopped_at = match row.get::<_, Option<String>>(6)? {
        Some(_) => Some(time_at(row, 6)?),
        None => None,
    };

    Ok(UsageRecord {
        id: parsed_at::<Uuid>(row, 0)?,
        machine_id: row.get(1)?,
        floor: row.get(2)?,
        pos: row.get(3)?,
        machine_type: parsed_at::<MachineType>(row, 4)?,
        started_at: time_at(row, 5)?,
        stopped_at,
    })
}

fn node_from_row(row: &Row) -> rusqlite::Result<SensorNode> {
    Ok(SensorNode {
        floor: row.get(0)?,
        ip_addr: row.get(1)?,
        updated_at: time_at(row, 2)?,
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

// ============================================================================
// FILTER RENDERING
// ============================================================================

fn sql_value(value: &FilterValue) -> Value {
    match value {
        FilterValue::Int(i) => Value::Integer(*i),
        FilterValue::Text(s) => Value::Text(s.clone()),
        FilterValue::Time(t) => Value::Text(ts(*t)),
    }
}

/// Render conditions as a WHERE clause with positional parameters.
fn where_clause(conditions: &[Condition]) -> (String, Vec<Value>) {
    if conditions.is_empty() {
        return (String::new(), Vec::new());
    }

    let terms: Vec<String> = conditions
        .iter()
        .map(|c| format!("\"{}\" {} ?", c.field, c.op.as_sql()))
        .collect();
    let values = conditions.iter().map(|c| sql_value(&c.value)).collect();

    (format!(" WHERE {}", terms.join(" AND ")), values)
}

/// Run a filtered, ordered, paged SELECT and wrap the rows in a page.
fn select_page<T>(
    conn: &Connection,
    table: &str,
    columns: &str,
    order_by: &str,
    filter: &impl Filter,
    page: PageRequest,
    map: fn(&Row) -> rusqlite::Result<T>,
) -> Result<Page<T>> {
    let (clause, mut values) = where_clause(&filter.conditions());
    let sql = format!(
        "SELECT {} FROM {}{} ORDER BY {} LIMIT ? OFFSET ?",
        columns, table, clause, order_by
    );
    values.push(Value::Integer(bind_index(page.fetch_limit())));
    values.push(Value::Integer(bind_index(page.offset)));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values.iter()), map)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Page::from_overfetch(rows, page))
}

// ============================================================================
// MACHINES
// ============================================================================

#[async_trait]
impl MachineStore for SqliteStore {
    async fn insert_machine(&self, machine: &Machine) -> Result<()> {
        let machine = machine.clone();
        self.with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO machines (floor, pos, id, type, status, cycle_duration, last_started_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    machine.floor,
                    machine.pos,
                    machine.id,
                    machine.machine_type.as_str(),
                    machine.status.as_str(),
                    cycle_secs(&machine)?,
                    ts(machine.last_started_at),
                ],
            );

            match inserted {
                Ok(_) => Ok(()),
                Err(e) if is_constraint_violation(&e) => {
                    Err(LaundryError::machine_exists(machine.key()))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn get_machine(&self, key: MachineKey) -> Result<Option<Machine>> {
        self.with_conn(move |conn| {
            let sql = format!("SELECT {} FROM machines WHERE floor = ?1 AND pos = ?2", MACHINE_COLUMNS);
            Ok(conn
                .query_row(&sql, params![key.floor, key.pos], machine_from_row)
                .optional()?)
        })
        .await
    }

    async fn replace_machine(&self, machine: &Machine) -> Result<Machine> {
        let machine = machine.clone();
        self.with_conn(move |conn| {
            let sql = format!(
                "UPDATE machines
                 SET id = ?3, type = ?4, status = ?5, cycle_duration = ?6, last_started_at = ?7
                 WHERE floor = ?1 AND pos = ?2
                 RETURNING {}",
                MACHINE_COLUMNS
            );
            conn.query_row(
                &sql,
                params![
                    machine.floor,
                    machine.pos,
                    machine.id,
                    machine.machine_type.as_str(),
                    machine.status.as_str(),
                    cycle_secs(&machine)?,
                    ts(machine.last_started_at),
                ],
                machine_from_row,
            )
            .optional()?
            .ok_or_else(|| LaundryError::machine_not_found(machine.key()))
        })
        .await
    }

    async fn find_machines(
        &self,
        filter: &MachineFilter,
        page: PageRequest,
    ) -> Result<Page<Machine>> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            select_page(
                conn,
                "machines",
                MACHINE_COLUMNS,
                "floor, pos",
                &filter,
                page,
                machine_from_row,
            )
        })
        .await
    }
}

// ============================================================================
// USAGE LOG
// ============================================================================

#[async_trait]
impl UsageStore for SqliteStore {
    async fn append_usage(&self, record: &UsageRecord) -> Result<bool> {
        let record = record.clone();
        self.with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO usage_records
                    (id, machine_id, floor, pos, type, started_at, stopped_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id.to_string(),
                    record.machine_id,
                    record.floor,
                    record.pos,
                    record.machine_type.as_str(),
                    ts(record.started_at),
                    record.stopped_at.map(ts),
                ],
            )?;
            Ok(inserted == 1)
        })
        .await
    }

    async fn latest_open_usage(&self, key: MachineKey) -> Result<Option<UsageRecord>> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM usage_records
                 WHERE floor = ?1 AND pos = ?2 AND stopped_at IS NULL
                 ORDER BY started_at DESC, id DESC
                 LIMIT 1",
                USAGE_COLUMNS
            );
            Ok(conn
                .query_row(&sql, params![key.floor, key.pos], usage_from_row)
                .optional()?)
        })
        .await
    }

    async fn close_usage(
        &self,
        id: Uuid,
        stopped_at: DateTime<Utc>,
    ) -> Result<Option<UsageRecord>> {
        self.with_conn(move |conn| {
            let sql = format!(
                "UPDATE usage_records SET stopped_at = ?2
                 WHERE id = ?1 AND stopped_at IS NULL
                 RETURNING {}",
                USAGE_COLUMNS
            );
            Ok(conn
                .query_row(&sql, params![id.to_string(), ts(stopped_at)], usage_from_row)
                .optional()?)
        })
        .await
    }

    async fn find_usage(
        &self,
        filter: &UsageFilter,
        page: PageRequest,
    ) -> Result<Page<UsageRecord>> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            select_page(
                conn,
                "usage_records",
                USAGE_COLUMNS,
                "started_at, id",
                &filter,
                page,
                usage_from_row,
            )
        })
        .await
    }
}

// ============================================================================
// SENSOR NODES
// ============================================================================

#[async_trait]
impl NodeStore for SqliteStore {
    async fn insert_node(&self, node: &SensorNode) -> Result<()> {
        let node = node.clone();
        self.with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO sensor_nodes (floor, ip_addr, updated_at) VALUES (?1, ?2, ?3)",
                params![node.floor, node.ip_addr, ts(node.updated_at)],
            );

            match inserted {
                Ok(_) => Ok(()),
                Err(e) if is_constraint_violation(&e) => Err(LaundryError::Conflict(format!(
                    "Sensor node at floor {}",
                    node.floor
                ))),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn upsert_node(&self, node: &SensorNode) -> Result<()> {
        let node = node.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO sensor_nodes (floor, ip_addr, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(floor) DO UPDATE
                 SET ip_addr = excluded.ip_addr, updated_at = excluded.updated_at",
                params![node.floor, node.ip_addr, ts(node.updated_at)],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_node(&self, floor: i64) -> Result<Option<SensorNode>> {
        self.with_conn(move |conn| {
            let sql = format!("SELECT {} FROM sensor_nodes WHERE floor = ?1", NODE_COLUMNS);
            Ok(conn.query_row(&sql, params![floor], node_from_row).optional()?)
        })
        .await
    }

    async fn replace_node(&self, node: &SensorNode) -> Result<SensorNode> {
        let node = node.clone();
        self.with_conn(move |conn| {
            let sql = format!(
                "UPDATE sensor_nodes SET ip_addr = ?2, updated_at = ?3 WHERE floor = ?1 RETURNING {}",
                NODE_COLUMNS
            );
            conn.query_row(
                &sql,
                params![node.floor, node.ip_addr, ts(node.updated_at)],
                node_from_row,
            )
            .optional()?
            .ok_or_else(|| LaundryError::NotFound(format!("Sensor node at floor {}", node.floor)))
        })
        .await
    }

    async fn find_nodes(&self, filter: &NodeFilter, page: PageRequest) -> Result<Page<SensorNode>> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            select_page(
                conn,
                "sensor_nodes",
                NODE_COLUMNS,
                "floor",
                &filter,
                page,
                node_from_row,
            )
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn dryer(floor: i64, pos: i64) -> Machine {
        Machine::new(floor, pos, MachineType::Dryer, Duration::from_secs(2400))
    }

    #[test]
    fn test_where_clause_quotes_columns() {
        let filter = MachineFilter {
            floor: Some(8),
            machine_type: Some(MachineType::Dryer),
            ..Default::default()
        };
        let (clause, values) = where_clause(&filter.conditions());

        assert_eq!(clause, " WHERE \"floor\" = ? AND \"type\" = ?");
        assert_eq!(values, vec![Value::Integer(8), Value::Text("dryer".into())]);
        assert_eq!(where_clause(&[]).0, "");
    }

    #[tokio::test]
    async fn test_duplicate_key_is_conflict() {
        let store = store();

        store.insert_machine(&dryer(8, 2)).await.unwrap();
        let dup = store.insert_machine(&dryer(8, 2)).await;

        assert!(matches!(dup, Err(LaundryError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_machine_round_trips_through_table() {
        let store = store();
        let mut m = dryer(8, 2);
        m.id = Some("d-8-2".to_string());
        store.insert_machine(&m).await.unwrap();

        m.status = MachineStatus::InUse;
        m.last_started_at = Utc::now();
        let replaced = store.replace_machine(&m).await.unwrap();
        assert_eq!(replaced, m);

        let loaded = store.get_machine(m.key()).await.unwrap().unwrap();
        assert_eq!(loaded, m);

        let missing = store.replace_machine(&dryer(99, 0)).await;
        assert!(matches!(missing, Err(LaundryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_find_pages_in_location_order() {
        let store = store();
        for (floor, pos) in [(11, 3), (5, 2), (11, 2), (5, 3)] {
            store.insert_machine(&dryer(floor, pos)).await.unwrap();
        }

        let first = store
            .find_machines(&MachineFilter::default(), PageRequest::new(3, 0))
            .await
            .unwrap();
        let keys: Vec<_> = first.items.iter().map(|m| (m.floor, m.pos)).collect();
        assert_eq!(keys, vec![(5, 2), (5, 3), (11, 2)]);
        assert!(first.has_more);
        assert_eq!(first.next_offset, Some(3));

        let rest = store
            .find_machines(&MachineFilter::default(), PageRequest::new(3, 3))
            .await
            .unwrap();
        assert_eq!(rest.len(), 1);
        assert!(!rest.has_more);
    }

    #[tokio::test]
    async fn test_usage_time_filter_and_close() {
        let store = store();
        let m = dryer(5, 2);
        let base = Utc::now();

        let early = UsageRecord::open(&m, base);
        let late = UsageRecord::open(&m, base + ChronoDuration::hours(2));
        assert!(store.append_usage(&early).await.unwrap());
        assert!(store.append_usage(&late).await.unwrap());
        assert!(!store.append_usage(&early).await.unwrap());

        let window = UsageFilter {
            time_lower: Some(base + ChronoDuration::hours(1)),
            ..Default::default()
        };
        let page = store.find_usage(&window, PageRequest::default()).await.unwrap();
        assert_eq!(page.items, vec![late.clone()]);

        let open = store.latest_open_usage(m.key()).await.unwrap().unwrap();
        assert_eq!(open.id, late.id);

        let stop = late.started_at + ChronoDuration::minutes(40);
        let closed = store.close_usage(late.id, stop).await.unwrap().unwrap();
        assert_eq!(closed.stopped_at, Some(stop));
        assert!(store.close_usage(late.id, stop).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_node_upsert_overwrites() {
        let store = store();

        store.upsert_node(&SensorNode::new(11, "10.0.0.11")).await.unwrap();
        store.upsert_node(&SensorNode::new(11, "10.0.0.12")).await.unwrap();

        let node = store.get_node(11).await.unwrap().unwrap();
        assert_eq!(node.ip_addr, "10.0.0.12");

        let dup = store.insert_node(&SensorNode::new(11, "10.0.0.13")).await;
        assert!(matches!(dup, Err(LaundryError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_offset_past_addressable_range_is_empty() {
        let store = store();
        for pos in 0..5 {
            store.insert_machine(&dryer(5, pos)).await.unwrap();
        }

        for page in [
            PageRequest::new(2, i64::MAX as usize + 1),
            PageRequest {
                limit: 2,
                offset: usize::MAX,
            },
        ] {
            let found = store
                .find_machines(&MachineFilter::default(), page)
                .await
                .unwrap();
            assert!(found.is_empty());
            assert!(!found.has_more);
        }
    }

    #[tokio::test]
    async fn test_cycle_duration_out_of_range() {
        let store = store();

        let huge = Machine::new(14, 0, MachineType::Washer, Duration::from_secs(u64::MAX));
        let result = store.insert_machine(&huge).await;
        assert!(matches!(result, Err(LaundryError::Validation(_))));
        assert!(store.get_machine(huge.key()).await.unwrap().is_none());

        store
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO machines (floor, pos, id, type, status, cycle_duration, last_started_at)
                     VALUES (14, 1, NULL, 'washer', 'idle', -5, ?1)",
                    params![ts(Utc::now())],
                )?;
                Ok(())
            })
            .await
            .unwrap();
        let corrupt = store.get_machine(MachineKey::new(14, 1)).await;
        assert!(matches!(corrupt, Err(LaundryError::BackendUnavailable(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_busy_connection_does_not_block_other_machines() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("laundry.db")).unwrap();
        store.insert_machine(&dryer(5, 2)).await.unwrap();
        store.insert_machine(&dryer(5, 3)).await.unwrap();

        let held = store.pool.get().await.unwrap();
        let other = tokio::time::timeout(
            Duration::from_secs(5),
            store.get_machine(MachineKey::new(5, 3)),
        )
        .await;
        drop(held);

        assert!(other.unwrap().unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_on_different_machines() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("laundry.db")).unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|pos| {
                let store = store.clone();
                tokio::spawn(async move {
                    let mut m = dryer(17, pos);
                    store.insert_machine(&m).await?;
                    m.status = MachineStatus::InUse;
                    m.last_started_at = Utc::now();
                    store.replace_machine(&m).await
                })
            })
            .collect();

        for task in tasks {
            let machine = task.await.unwrap().unwrap();
            assert_eq!(machine.status, MachineStatus::InUse);
        }

        let page = store
            .find_machines(&MachineFilter::floor(17), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.len(), 8);
    }
}
