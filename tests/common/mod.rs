#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use sql_fragments::prelude::*;

/// Everything the fake server remembers, shared by every connection of one pool.
#[derive(Default)]
pub struct FakeState {
    /// Every statement text and control command, in execution order.
    pub log: Vec<String>,
    /// Committed rows of the `items` table.
    pub items: Vec<i64>,
    /// Rows inserted inside the open transaction.
    pub pending: Vec<i64>,
    pub in_tx: bool,
    pub acquired: usize,
    pub released: usize,
    /// Connections closed instead of returned, e.g. with a transaction still open.
    pub discarded: usize,
    /// Fixed results keyed by statement text; checked before the built-in statements.
    pub canned: HashMap<String, ResultSet>,
    pub fail_commit: bool,
    pub fail_rollback: bool,
}

pub type Shared = Arc<Mutex<FakeState>>;

pub fn lock(state: &Shared) -> MutexGuard<'_, FakeState> {
    state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

pub struct FakePool {
    state: Shared,
}

pub struct FakeConn {
    state: Shared,
}

impl Drop for FakeConn {
    fn drop(&mut self) {
        lock(&self.state).released += 1;
    }
}

#[async_trait]
impl ConnectionPool for FakePool {
    type Connection = FakeConn;

    async fn acquire(&self) -> Result<FakeConn, SqlFragmentsError> {
        lock(&self.state).acquired += 1;
        Ok(FakeConn {
            state: Arc::clone(&self.state),
        })
    }
}

#[async_trait]
impl Connection for FakeConn {
    async fn query(&mut self, statement: &ParsedStatement) -> Result<ResultSet, DriverError> {
        run_query(&mut lock(&self.state), statement)
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<(), DriverError> {
        run_command(&mut lock(&self.state), sql)
    }

    fn discard(self) {
        let mut state = lock(&self.state);
        state.discarded += 1;
        // the server ends the session's transaction when the connection closes
        state.pending.clear();
        state.in_tx = false;
    }
}

fn run_query(state: &mut FakeState, statement: &ParsedStatement) -> Result<ResultSet, DriverError> {
    let text = statement.text();
    state.log.push(text.to_string());

    if let Some(rs) = state.canned.get(text) {
        return Ok(rs.clone());
    }
    if text.starts_with("INSERT INTO items") {
        let ids: Vec<i64> = statement
            .values()
            .iter()
            .filter_map(SqlValue::as_int)
            .collect();
        let inserted = ids.len() as u64;
        if state.in_tx {
            state.pending.extend(ids);
        } else {
            state.items.extend(ids);
        }
        return Ok(ResultSet::affected(inserted));
    }
    match text {
        "SELECT 1+1" => Ok(rows(&["?column?"], vec![vec![SqlValue::Int(2)]])),
        "SELECT count(*) FROM items" => {
            let mut visible = state.items.len();
            if state.in_tx {
                visible += state.pending.len();
            }
            let count = i64::try_from(visible).unwrap_or(i64::MAX);
            Ok(rows(&["count"], vec![vec![SqlValue::Int(count)]]))
        }
        _ => {
            let first = text.split_whitespace().next().unwrap_or_default();
            Err(DriverError::new(format!("syntax error at or near \"{first}\"")).with_position(1))
        }
    }
}

fn run_command(state: &mut FakeState, sql: &str) -> Result<(), DriverError> {
    state.log.push(sql.to_string());
    match sql {
        "BEGIN" => state.in_tx = true,
        "COMMIT" => {
            if state.fail_commit {
                return Err(DriverError::new(
                    "could not serialize access due to concurrent update",
                ));
            }
            let pending = std::mem::take(&mut state.pending);
            state.items.extend(pending);
            state.in_tx = false;
        }
        "ROLLBACK" => {
            if state.fail_rollback {
                return Err(DriverError::new("connection reset"));
            }
            state.pending.clear();
            state.in_tx = false;
        }
        _ => {}
    }
    Ok(())
}

/// Build a result set from column names and row values.
pub fn rows(columns: &[&str], values: Vec<Vec<SqlValue>>) -> ResultSet {
    let mut rs = ResultSet::with_columns(
        columns.iter().map(|c| (*c).to_string()).collect(),
        values.len(),
    );
    for row in values {
        rs.add_row_values(row);
    }
    rs
}

pub fn fake_db() -> (Db<FakePool>, Shared) {
    let state = Shared::default();
    let pool = FakePool {
        state: Arc::clone(&state),
    };
    (Db::new(pool).with_database_name("fake"), state)
}

/// Register a fixed result for an exact statement text.
pub fn can(state: &Shared, text: &str, rs: ResultSet) {
    lock(state).canned.insert(text.to_string(), rs);
}

pub fn log(state: &Shared) -> Vec<String> {
    lock(state).log.clone()
}

/// The log without the one-time startup check.
pub fn statements(state: &Shared) -> Vec<String> {
    log(state)
        .into_iter()
        .filter(|s| s != "SELECT 1+1")
        .collect()
}
