//! In-process adapter for unit tests.

use crate::adapter::DatabaseAdapter;
use crate::error::{Error, OperationError};
use async_trait::async_trait;
use mend_schema::{Engine, LiveColumn, LiveTable};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub(crate) struct MockAdapter {
    engine: Engine,
    tables: Vec<LiveTable>,
    fail_on: Vec<String>,
    delay: Option<Duration>,
    introspection_error: Option<String>,
    unreachable: bool,
    executed: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockAdapter {
    pub(crate) fn new(engine: Engine) -> Self {
        Self {
            engine,
            tables: Vec::new(),
            fail_on: Vec::new(),
            delay: None,
            introspection_error: None,
            unreachable: false,
            executed: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_table(mut self, table: LiveTable) -> Self {
        self.tables.push(table);
        self
    }

    /// Fail every statement containing `needle`.
    pub(crate) fn fail_on(mut self, needle: &str) -> Self {
        self.fail_on.push(needle.to_string());
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn failing_introspection(mut self, message: &str) -> Self {
        self.introspection_error = Some(message.to_string());
        self
    }

    /// Lose the connection: catalog reads fail with [`Error::Connection`].
    pub(crate) fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Statements received so far, in arrival order.
    pub(crate) fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatabaseAdapter for MockAdapter {
    fn engine(&self) -> Engine {
        self.engine
    }

    async fn table_names(&self) -> Result<Vec<String>, Error> {
        if self.unreachable {
            return Err(Error::connection(self.engine, "connection refused"));
        }
        if let Some(message) = &self.introspection_error {
            return Err(Error::introspection(self.engine, message.clone()));
        }
        Ok(self.tables.iter().map(|t| t.name.clone()).collect())
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<LiveColumn>, Error> {
        Ok(self
            .tables
            .iter()
            .find(|t| t.name == table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn execute(&self, sql: &str) -> Result<u64, OperationError> {
        self.executed.lock().unwrap().push(sql.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_on.iter().any(|needle| sql.contains(needle)) {
            return Err(OperationError::new("rejected by mock").with_code("42000"));
        }
        Ok(0)
    }
}
