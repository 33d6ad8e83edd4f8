//! Scripted in-process connection for unit tests

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::connection::{BufferedCursor, Connection, ConnectionManager, RowCursor};
use crate::error::{Error, Result};
use crate::value::Value;

#[derive(Debug)]
struct ScriptState {
    alive: bool,
    fail_pings: bool,
    pings: usize,
    closes: usize,
    log: Vec<String>,
    failing: Vec<String>,
    results: VecDeque<(Vec<String>, Vec<Vec<Value>>)>,
    insert_id: Option<i64>,
}

impl Default for ScriptState {
    fn default() -> Self {
        Self {
            alive: true,
            fail_pings: false,
            pings: 0,
            closes: 0,
            log: Vec::new(),
            failing: Vec::new(),
            results: VecDeque::new(),
            insert_id: None,
        }
    }
}

/// Behaviour shared by every connection a [`FakeManager`] hands out.
#[derive(Debug, Default)]
pub struct Script {
    state: Mutex<ScriptState>,
}

impl Script {
    pub fn set_alive(&self, alive: bool) {
        self.state.lock().alive = alive;
    }

    pub fn fail_pings(&self, fail: bool) {
        self.state.lock().fail_pings = fail;
    }

    /// Statements starting with `pattern` fail from now on.
    pub fn fail_when(&self, pattern: &str) {
        self.state.lock().failing.push(pattern.to_string());
    }

    pub fn push_result(&self, columns: &[&str], rows: Vec<Vec<Value>>) {
        let columns = columns.iter().map(ToString::to_string).collect();
        self.state.lock().results.push_back((columns, rows));
    }

    pub fn set_insert_id(&self, id: i64) {
        self.state.lock().insert_id = Some(id);
    }

    pub fn pings(&self) -> usize {
        self.state.lock().pings
    }

    pub fn closes(&self) -> usize {
        self.state.lock().closes
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().log.clone()
    }

    fn run(&self, statement: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.log.push(statement.to_string());
        if state.failing.iter().any(|p| statement.starts_with(p.as_str())) {
            return Err(Error::database(format!("scripted failure: {statement}")));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct FakeConnection {
    script: Arc<Script>,
    auto_commit: bool,
    closed: bool,
}

impl FakeConnection {
    pub fn new() -> Self {
        Self::with_script(Arc::default())
    }

    pub const fn with_script(script: Arc<Script>) -> Self {
        Self {
            script,
            auto_commit: true,
            closed: false,
        }
    }

    pub fn script(&self) -> &Script {
        &self.script
    }
}

impl Connection for FakeConnection {
    fn execute(&mut self, sql: &str, _params: &[Value]) -> Result<u64> {
        self.script.run(sql)?;
        Ok(1)
    }

    fn query(&mut self, sql: &str, _params: &[Value]) -> Result<Box<dyn RowCursor>> {
        self.script.run(sql)?;
        let next = self.script.state.lock().results.pop_front();
        let (columns, rows) = next.unwrap_or_default();
        Ok(Box::new(BufferedCursor::new(columns, rows)))
    }

    fn last_insert_id(&self) -> Option<i64> {
        self.script.state.lock().insert_id
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    fn set_auto_commit(&mut self, enabled: bool) -> Result<()> {
        self.script
            .run(if enabled { "AUTOCOMMIT ON" } else { "AUTOCOMMIT OFF" })?;
        self.auto_commit = enabled;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.script.run("COMMIT")
    }

    fn rollback(&mut self) -> Result<()> {
        self.script.run("ROLLBACK")
    }

    fn set_savepoint(&mut self, name: &str) -> Result<()> {
        self.script.run(&format!("SAVEPOINT {name}"))
    }

    fn release_savepoint(&mut self, name: &str) -> Result<()> {
        self.script.run(&format!("RELEASE SAVEPOINT {name}"))
    }

    fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        self.script.run(&format!("ROLLBACK TO SAVEPOINT {name}"))
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn is_valid(&mut self, _timeout: Duration) -> Result<bool> {
        let mut state = self.script.state.lock();
        state.pings += 1;
        if state.fail_pings {
            return Err(Error::database("ping failed"));
        }
        Ok(state.alive)
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.script.state.lock().closes += 1;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeManager {
    script: Arc<Script>,
    created: AtomicUsize,
    fail_create: AtomicBool,
}

impl FakeManager {
    pub fn new() -> Arc<Self> {
        Arc::default()
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }
}

impl ConnectionManager for Arc<FakeManager> {
    fn create(&self) -> Result<Box<dyn Connection>> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::database("connection refused"));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection::with_script(Arc::clone(
            &self.script,
        ))))
    }
}
