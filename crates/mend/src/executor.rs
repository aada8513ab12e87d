//! Best-effort plan execution.
//!
//! Stages run one after another. Inside a stage, operations are grouped into
//! one lane per table; lanes run concurrently (bounded by a semaphore) and the
//! operations of a lane run in plan order. A failed operation is recorded and
//! execution carries on, including with the rest of its own lane.

use crate::adapter::DatabaseAdapter;
use crate::ddl::{self, DdlBuilder};
use crate::error::OperationError;
use crate::plan::{MigrationOperation, MigrationPlan, Stage};
use indexmap::IndexMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Lanes allowed to run at the same time unless configured otherwise.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// What happened to one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationOutcome {
    /// Zero-based stage index
    pub stage: usize,
    pub operation: MigrationOperation,
    /// The statement sent, or `None` if the engine cannot express it
    pub sql: Option<String>,
    pub result: Result<(), OperationError>,
}

impl OperationOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Outcome of every operation of a plan, in plan order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub outcomes: Vec<OperationOutcome>,
}

impl ExecutionReport {
    fn count_successful(&self, pred: impl Fn(&MigrationOperation) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.is_success() && pred(&o.operation))
            .count()
    }

    pub fn tables_created(&self) -> usize {
        self.count_successful(|op| matches!(op, MigrationOperation::CreateTable { .. }))
    }

    pub fn columns_added(&self) -> usize {
        self.count_successful(|op| matches!(op, MigrationOperation::AddColumn { .. }))
    }

    pub fn foreign_keys_attached(&self) -> usize {
        self.count_successful(|op| matches!(op, MigrationOperation::AddForeignKey { .. }))
    }

    pub fn unique_indexes_created(&self) -> usize {
        self.count_successful(|op| matches!(op, MigrationOperation::AddUniqueIndex { .. }))
    }

    pub fn failures(&self) -> impl Iterator<Item = &OperationOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    /// False iff at least one operation failed.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

impl std::fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} tables created, {} columns added, {} foreign keys attached, {} failed",
            self.tables_created(),
            self.columns_added(),
            self.foreign_keys_attached(),
            self.failed()
        )?;
        for outcome in self.failures() {
            if let Err(e) = &outcome.result {
                writeln!(f, "  x {}: {}", outcome.operation, e)?;
            }
        }
        Ok(())
    }
}

/// Runs migration plans against one database.
pub struct Executor {
    adapter: Arc<dyn DatabaseAdapter>,
    max_concurrency: usize,
}

impl Executor {
    pub fn new(adapter: Arc<dyn DatabaseAdapter>) -> Self {
        Self {
            adapter,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Maximum number of table lanes running at once (at least 1).
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Execute every operation of `plan`. Never fails as a whole: individual
    /// failures are in the report.
    ///
    /// A plan built for another engine is not run at all; every operation is
    /// reported as failed.
    pub async fn execute(&self, plan: &MigrationPlan) -> ExecutionReport {
        let engine = self.adapter.engine();
        if plan.engine != engine {
            let err = OperationError::new(format!(
                "plan was built for {} but the database is {}",
                plan.engine, engine
            ));
            tracing::warn!("{}", err);
            return ExecutionReport {
                outcomes: plan
                    .stages
                    .iter()
                    .enumerate()
                    .flat_map(|(idx, stage)| {
                        stage.operations.iter().map(move |operation| (idx, operation))
                    })
                    .map(|(stage, operation)| OperationOutcome {
                        stage,
                        operation: operation.clone(),
                        sql: None,
                        result: Err(err.clone()),
                    })
                    .collect(),
            };
        }

        let ddl = ddl::builder(plan.engine);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut report = ExecutionReport::default();

        for (idx, stage) in plan.stages.iter().enumerate() {
            tracing::debug!("running stage {} ({} operations)", idx + 1, stage.operations.len());
            let outcomes = self.run_stage(idx, stage, ddl, &semaphore).await;
            report.outcomes.extend(outcomes);
        }

        tracing::info!(
            "migration finished: {} tables created, {} columns added, {} foreign keys attached, {} failed",
            report.tables_created(),
            report.columns_added(),
            report.foreign_keys_attached(),
            report.failed()
        );
        report
    }

    async fn run_stage(
        &self,
        stage_idx: usize,
        stage: &Stage,
        ddl: &dyn DdlBuilder,
        semaphore: &Arc<Semaphore>,
    ) -> Vec<OperationOutcome> {
        let mut lanes: IndexMap<&str, Vec<usize>> = IndexMap::new();
        for (idx, op) in stage.operations.iter().enumerate() {
            lanes.entry(op.table()).or_default().push(idx);
        }

        let mut tasks = JoinSet::new();
        for indices in lanes.into_values() {
            let lane: Vec<(usize, MigrationOperation, Option<String>)> = indices
                .into_iter()
                .map(|idx| {
                    let op = &stage.operations[idx];
                    (idx, op.clone(), op.to_sql(ddl))
                })
                .collect();
            let adapter = Arc::clone(&self.adapter);
            let semaphore = Arc::clone(semaphore);

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let mut done = Vec::with_capacity(lane.len());
                for (idx, operation, sql) in lane {
                    let result = run_operation(adapter.as_ref(), &operation, sql.as_deref()).await;
                    done.push((
                        idx,
                        OperationOutcome {
                            stage: stage_idx,
                            operation,
                            sql,
                            result,
                        },
                    ));
                }
                done
            });
        }

        let mut slots: Vec<Option<OperationOutcome>> =
            (0..stage.operations.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(done) => {
                    for (idx, outcome) in done {
                        slots[idx] = Some(outcome);
                    }
                }
                Err(e) => tracing::error!("executor task failed: {}", e),
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.unwrap_or_else(|| {
                    let operation = stage.operations[idx].clone();
                    OperationOutcome {
                        stage: stage_idx,
                        sql: operation.to_sql(ddl),
                        operation,
                        result: Err(OperationError::new("executor task aborted")),
                    }
                })
            })
            .collect()
    }
}

async fn run_operation(
    adapter: &dyn DatabaseAdapter,
    operation: &MigrationOperation,
    sql: Option<&str>,
) -> Result<(), OperationError> {
    let Some(sql) = sql else {
        let err = OperationError::new(format!("not supported by {}", adapter.engine()));
        tracing::warn!("{} failed: {}", operation, err);
        return Err(err);
    };

    match adapter.execute(sql).await {
        Ok(_) => {
            match operation {
                MigrationOperation::CreateTable { name, .. } => {
                    tracing::info!("created table {}", name)
                }
                MigrationOperation::AddColumn { table, field } => {
                    tracing::info!("added field {} to table {}", field.name, table)
                }
                MigrationOperation::AddForeignKey {
                    table,
                    field,
                    reference,
                } => tracing::info!("attached foreign key {}.{} -> {}", table, field, reference),
                MigrationOperation::AddUniqueIndex { table, field } => {
                    tracing::info!("made {}.{} unique", table, field)
                }
            }
            Ok(())
        }
        Err(err) => {
            tracing::warn!("{} failed: {}", operation, err);
            Err(err)
        }
    }
}
