//! The reconciliation pipeline: introspect, diff, plan, execute.

use crate::EngineExt;
use crate::adapter::{self, DatabaseAdapter};
use crate::diff::{self, SchemaDiff, TypeMismatchWarning};
use crate::error::Error;
use crate::executor::{DEFAULT_MAX_CONCURRENCY, ExecutionReport, Executor};
use crate::introspect::Introspector;
use crate::plan::{self, MigrationPlan};
use mend_schema::{LiveTable, LogicalSchema, LogicalSchemaProvider};
use std::sync::Arc;

/// Everything computed before any DDL runs.
#[derive(Debug, Clone)]
pub struct PreparedMigration {
    pub schema: LogicalSchema,
    pub live: Vec<LiveTable>,
    pub diff: SchemaDiff,
    pub plan: MigrationPlan,
}

impl PreparedMigration {
    pub fn warnings(&self) -> &[TypeMismatchWarning] {
        &self.diff.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.plan.is_empty()
    }
}

/// Result of a full run.
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub warnings: Vec<TypeMismatchWarning>,
    pub plan: MigrationPlan,
    pub execution: ExecutionReport,
}

impl ReconcileReport {
    pub fn is_success(&self) -> bool {
        self.execution.is_success()
    }
}

/// Brings a database in line with a logical schema, additively.
pub struct Reconciler {
    adapter: Arc<dyn DatabaseAdapter>,
    max_concurrency: usize,
}

impl Reconciler {
    pub fn new(adapter: Arc<dyn DatabaseAdapter>) -> Self {
        Self {
            adapter,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Connect to `url` with a pool large enough for `max_concurrency` lanes.
    pub async fn connect(url: &str, max_concurrency: usize) -> Result<Self, Error> {
        let max_concurrency = max_concurrency.max(1);
        let adapter = adapter::connect(url, max_concurrency + 1).await?;
        Ok(Self::new(adapter).with_max_concurrency(max_concurrency))
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn adapter(&self) -> &Arc<dyn DatabaseAdapter> {
        &self.adapter
    }

    /// Read both schemas and build the plan, without touching the database.
    pub async fn prepare(
        &self,
        provider: &dyn LogicalSchemaProvider,
    ) -> Result<PreparedMigration, Error> {
        let engine = self.adapter.engine();
        let schema = provider.logical_schema()?;
        schema.validate()?;
        let live = Introspector::new(self.adapter.as_ref())
            .list_live_tables()
            .await?;

        let diff = diff::diff(&schema, &live, engine.type_mapper());
        let plan = plan::plan(&diff, engine);
        tracing::info!(
            "{} tables to create, {} columns to add, {} type mismatches",
            diff.to_create.len(),
            diff.to_add.iter().map(|t| t.fields.len()).sum::<usize>(),
            diff.warnings.len()
        );

        Ok(PreparedMigration {
            schema,
            live,
            diff,
            plan,
        })
    }

    /// Execute a prepared plan.
    pub async fn apply(&self, prepared: PreparedMigration) -> ReconcileReport {
        let execution = Executor::new(Arc::clone(&self.adapter))
            .with_max_concurrency(self.max_concurrency)
            .execute(&prepared.plan)
            .await;
        ReconcileReport {
            warnings: prepared.diff.warnings,
            plan: prepared.plan,
            execution,
        }
    }

    /// Prepare and execute in one go. Fatal errors (schema, connection,
    /// introspection) abort before any DDL is issued.
    pub async fn run(&self, provider: &dyn LogicalSchemaProvider) -> Result<ReconcileReport, Error> {
        let prepared = self.prepare(provider).await?;
        Ok(self.apply(prepared).await)
    }
}
