//! Migration solver: orders plan operations into stages.
//!
//! Operations are simulated against a virtual schema seeded with the live
//! table names. Each round schedules every operation whose preconditions hold
//! against the schema as it was at the start of the round; those operations
//! form one stage and are then applied.
//!
//! ```text
//! -- Fails on Postgres: "user" doesn't exist yet
//! CREATE TABLE "session" (... REFERENCES "user" ("id"));
//! CREATE TABLE "user" (...);
//!
//! -- stage 1
//! CREATE TABLE "user" (...);
//! -- stage 2
//! CREATE TABLE "session" (... REFERENCES "user" ("id"));
//! ```
//!
//! When tables reference each other in a cycle, one table of the cycle is
//! created without its foreign keys and the constraints are attached by
//! `AddForeignKey` operations once every table exists.

use crate::plan::{MigrationOperation, Stage};
use std::collections::HashSet;

/// Why an operation cannot be applied to the virtual schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    /// The operation needs a table that doesn't exist.
    TableNotFound { operation: String, table: String },
    /// The operation creates a table that already exists.
    TableAlreadyExists { operation: String, table: String },
    /// A foreign key references a table that doesn't exist.
    ReferenceTargetNotFound {
        operation: String,
        table: String,
        target: String,
    },
    /// The operation needs a column the plan hasn't created yet.
    ColumnNotFound {
        operation: String,
        table: String,
        column: String,
    },
}

impl std::fmt::Display for SolverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolverError::TableNotFound { operation, table } => {
                write!(f, "{}: table '{}' does not exist", operation, table)
            }
            SolverError::TableAlreadyExists { operation, table } => {
                write!(f, "{}: table '{}' already exists", operation, table)
            }
            SolverError::ReferenceTargetNotFound {
                operation,
                table,
                target,
            } => write!(
                f,
                "{}: foreign key from '{}' references non-existent table '{}'",
                operation, table, target
            ),
            SolverError::ColumnNotFound {
                operation,
                table,
                column,
            } => write!(
                f,
                "{}: column '{}.{}' has not been created",
                operation, table, column
            ),
        }
    }
}

impl std::error::Error for SolverError {}

/// Table-level view of the database used to simulate a plan.
#[derive(Debug, Clone, Default)]
pub struct VirtualSchema {
    tables: HashSet<String>,
    /// Columns created by applied operations; live columns are not tracked
    columns: HashSet<(String, String)>,
    /// Whether the engine checks foreign-key targets when DDL runs
    eager_references: bool,
}

impl VirtualSchema {
    pub fn new(eager_references: bool) -> Self {
        Self {
            eager_references,
            ..Self::default()
        }
    }

    /// Initialize from the tables the database already has.
    pub fn from_existing<'a>(
        existing_tables: impl IntoIterator<Item = &'a String>,
        eager_references: bool,
    ) -> Self {
        Self {
            tables: existing_tables.into_iter().cloned().collect(),
            columns: HashSet::new(),
            eager_references,
        }
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains(name)
    }

    /// Check an operation's preconditions without applying it.
    pub fn check(&self, op: &MigrationOperation) -> Result<(), SolverError> {
        let table_missing = || SolverError::TableNotFound {
            operation: op.to_string(),
            table: op.table().to_string(),
        };

        match op {
            MigrationOperation::CreateTable { name, fields } => {
                if self.table_exists(name) {
                    return Err(SolverError::TableAlreadyExists {
                        operation: op.to_string(),
                        table: name.clone(),
                    });
                }
                if self.eager_references {
                    let references = fields.iter().filter_map(|f| f.reference.as_ref());
                    for reference in references {
                        self.check_reference(op, name, &reference.table)?;
                    }
                }
            }
            MigrationOperation::AddColumn { table, field } => {
                if !self.table_exists(table) {
                    return Err(table_missing());
                }
                if self.eager_references
                    && let Some(reference) = &field.reference
                {
                    self.check_reference(op, table, &reference.table)?;
                }
            }
            MigrationOperation::AddForeignKey {
                table, reference, ..
            } => {
                if !self.table_exists(table) {
                    return Err(table_missing());
                }
                self.check_reference(op, table, &reference.table)?;
            }
            MigrationOperation::AddUniqueIndex { table, field } => {
                if !self.table_exists(table) {
                    return Err(table_missing());
                }
                if !self.columns.contains(&(table.clone(), field.clone())) {
                    return Err(SolverError::ColumnNotFound {
                        operation: op.to_string(),
                        table: table.clone(),
                        column: field.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn check_reference(
        &self,
        op: &MigrationOperation,
        table: &str,
        target: &str,
    ) -> Result<(), SolverError> {
        if target == table || self.table_exists(target) {
            Ok(())
        } else {
            Err(SolverError::ReferenceTargetNotFound {
                operation: op.to_string(),
                table: table.to_string(),
                target: target.to_string(),
            })
        }
    }

    /// Check an operation and record its effect.
    pub fn apply(&mut self, op: &MigrationOperation) -> Result<(), SolverError> {
        self.check(op)?;
        match op {
            MigrationOperation::CreateTable { name, fields } => {
                self.tables.insert(name.clone());
                for field in fields {
                    self.columns.insert((name.clone(), field.name.clone()));
                }
            }
            MigrationOperation::AddColumn { table, field } => {
                self.columns.insert((table.clone(), field.name.clone()));
            }
            MigrationOperation::AddForeignKey { .. } | MigrationOperation::AddUniqueIndex { .. } => {}
        }
        Ok(())
    }

    pub fn can_apply(&self, op: &MigrationOperation) -> bool {
        self.check(op).is_ok()
    }
}

/// Order operations into stages.
///
/// Never fails: operations that can never be scheduled (their target table is
/// neither live nor planned) are logged and put in a final stage, where the
/// database will reject them and the executor will report it.
pub fn order_operations<'a>(
    operations: Vec<MigrationOperation>,
    existing_tables: impl IntoIterator<Item = &'a String>,
    eager_references: bool,
) -> Vec<Stage> {
    let mut schema = VirtualSchema::from_existing(existing_tables, eager_references);
    let mut pending = operations;
    let mut stages = Vec::new();

    while !pending.is_empty() {
        let (ready, blocked): (Vec<_>, Vec<_>) =
            pending.into_iter().partition(|op| schema.can_apply(op));

        if !ready.is_empty() {
            for op in &ready {
                if let Err(e) = schema.apply(op) {
                    tracing::warn!("{}", e);
                }
            }
            stages.push(Stage { operations: ready });
            pending = blocked;
            continue;
        }

        pending = blocked;
        if defer_cycle_references(&mut pending, &schema) {
            continue;
        }

        for op in &pending {
            if let Err(e) = schema.check(op) {
                tracing::warn!("cannot order operation, running it last: {}", e);
            }
        }
        stages.push(Stage {
            operations: std::mem::take(&mut pending),
        });
    }

    stages
}

/// Break one reference cycle among the pending `CreateTable` operations.
///
/// Picks the first table (in plan order) that can reach itself through
/// references to other pending tables, strips those references from its
/// `CreateTable` and appends matching `AddForeignKey` operations. Returns
/// `false` when no pending table is part of a cycle.
fn defer_cycle_references(pending: &mut Vec<MigrationOperation>, schema: &VirtualSchema) -> bool {
    let planned: HashSet<String> = pending
        .iter()
        .filter_map(|op| match op {
            MigrationOperation::CreateTable { name, .. } if !schema.table_exists(name) => {
                Some(name.clone())
            }
            _ => None,
        })
        .collect();

    let edges = |table: &str| -> Vec<String> {
        pending
            .iter()
            .filter_map(|op| match op {
                MigrationOperation::CreateTable { name, fields } if name == table => Some(fields),
                _ => None,
            })
            .flatten()
            .filter_map(|f| f.reference.as_ref())
            .map(|r| r.table.clone())
            .filter(|t| t != table && planned.contains(t))
            .collect()
    };

    let in_cycle = |start: &str| -> bool {
        let mut seen = HashSet::new();
        let mut stack = edges(start);
        while let Some(table) = stack.pop() {
            if table == start {
                return true;
            }
            if seen.insert(table.clone()) {
                stack.extend(edges(&table));
            }
        }
        false
    };

    let Some(idx) = pending.iter().position(|op| match op {
        MigrationOperation::CreateTable { name, .. } => planned.contains(name) && in_cycle(name),
        _ => false,
    }) else {
        return false;
    };

    let mut deferred = Vec::new();
    if let MigrationOperation::CreateTable { name, fields } = &mut pending[idx] {
        for field in fields.iter_mut() {
            let cyclic = field
                .reference
                .as_ref()
                .is_some_and(|r| r.table != *name && planned.contains(&r.table));
            if cyclic && let Some(reference) = field.reference.take() {
                tracing::debug!(
                    "deferring foreign key {}.{} -> {} to break a reference cycle",
                    name,
                    field.name,
                    reference
                );
                deferred.push(MigrationOperation::AddForeignKey {
                    table: name.clone(),
                    field: field.name.clone(),
                    reference,
                });
            }
        }
    }

    let progressed = !deferred.is_empty();
    pending.extend(deferred);
    progressed
}
