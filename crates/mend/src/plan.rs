//! Migration planning: turn a [`SchemaDiff`] into staged DDL operations.

use crate::ddl::{self, DdlBuilder};
use crate::diff::SchemaDiff;
use crate::solver;
use mend_schema::{Engine, FieldReference, LogicalField};

/// A single additive schema operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOperation {
    /// Create a table with all of its fields.
    CreateTable {
        name: String,
        fields: Vec<LogicalField>,
    },
    /// Add one column to an existing table.
    AddColumn { table: String, field: LogicalField },
    /// Attach a foreign-key constraint to a column created earlier without it.
    AddForeignKey {
        table: String,
        field: String,
        reference: FieldReference,
    },
    /// Make a column added by this plan unique, on engines that can't say so
    /// in `ADD COLUMN`.
    AddUniqueIndex { table: String, field: String },
}

impl MigrationOperation {
    /// The table this operation modifies.
    pub fn table(&self) -> &str {
        match self {
            MigrationOperation::CreateTable { name, .. } => name,
            MigrationOperation::AddColumn { table, .. } => table,
            MigrationOperation::AddForeignKey { table, .. } => table,
            MigrationOperation::AddUniqueIndex { table, .. } => table,
        }
    }

    /// Render the operation as a single DDL statement (no trailing `;`).
    ///
    /// Returns `None` when the engine cannot express the operation.
    pub fn to_sql(&self, ddl: &dyn DdlBuilder) -> Option<String> {
        match self {
            MigrationOperation::CreateTable { name, fields } => {
                Some(ddl.create_table(name, fields))
            }
            MigrationOperation::AddColumn { table, field } => Some(ddl.add_column(table, field)),
            MigrationOperation::AddForeignKey {
                table,
                field,
                reference,
            } => ddl.add_foreign_key(table, field, reference),
            MigrationOperation::AddUniqueIndex { table, field } => {
                Some(ddl.add_unique_index(table, field))
            }
        }
    }
}

impl std::fmt::Display for MigrationOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationOperation::CreateTable { name, fields } => {
                write!(f, "+ table {} ({} fields)", name, fields.len())
            }
            MigrationOperation::AddColumn { table, field } => {
                let nullable = if field.is_nullable() { " (nullable)" } else { "" };
                write!(f, "+ column {}.{}: {}{}", table, field.name, field.field_type, nullable)
            }
            MigrationOperation::AddForeignKey {
                table,
                field,
                reference,
            } => write!(f, "+ foreign key {}.{} -> {}", table, field, reference),
            MigrationOperation::AddUniqueIndex { table, field } => {
                write!(f, "+ unique index {}.{}", table, field)
            }
        }
    }
}

/// Operations that may run concurrently across tables, once every earlier
/// stage has finished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stage {
    pub operations: Vec<MigrationOperation>,
}

/// An ordered, staged list of operations for one engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan {
    pub engine: Engine,
    pub stages: Vec<Stage>,
}

impl MigrationPlan {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            stages: Vec::new(),
        }
    }

    /// True when there is nothing to run.
    pub fn is_empty(&self) -> bool {
        self.stages.iter().all(|s| s.operations.is_empty())
    }

    /// Total number of operations.
    pub fn len(&self) -> usize {
        self.stages.iter().map(|s| s.operations.len()).sum()
    }

    /// All operations in global execution order.
    pub fn operations(&self) -> impl Iterator<Item = &MigrationOperation> {
        self.stages.iter().flat_map(|s| s.operations.iter())
    }

    /// Render the plan as an SQL script, one `-- stage N` block per stage.
    pub fn to_sql(&self, ddl: &dyn DdlBuilder) -> String {
        let mut sql = String::new();
        for (idx, stage) in self.stages.iter().enumerate() {
            sql.push_str(&format!("-- stage {}\n", idx + 1));
            for op in &stage.operations {
                match op.to_sql(ddl) {
                    Some(stmt) => {
                        sql.push_str(&stmt);
                        sql.push_str(";\n");
                    }
                    None => {
                        sql.push_str(&format!("-- not supported by {}: {}\n", ddl.engine(), op));
                    }
                }
            }
            sql.push('\n');
        }
        sql
    }
}

impl std::fmt::Display for MigrationPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return writeln!(f, "Nothing to do.");
        }
        for (idx, stage) in self.stages.iter().enumerate() {
            writeln!(f, "stage {}:", idx + 1)?;
            for op in &stage.operations {
                writeln!(f, "  {}", op)?;
            }
        }
        Ok(())
    }
}

/// Build the staged plan for a diff.
///
/// Every table in `to_create` becomes one `CreateTable`, every field in
/// `to_add` one `AddColumn`; the solver then orders them into stages.
///
/// A primary key cannot be added to a table that already exists, so such a
/// field is added as a unique column instead. On engines whose `ADD COLUMN`
/// can't be `UNIQUE`, a unique column is followed by an `AddUniqueIndex`.
pub fn plan(diff: &SchemaDiff, engine: Engine) -> MigrationPlan {
    let ddl = ddl::builder(engine);
    let mut operations = Vec::with_capacity(diff.change_count());

    for change in &diff.to_create {
        tracing::debug!("planning table {} ({} fields)", change.table, change.fields.len());
        operations.push(MigrationOperation::CreateTable {
            name: change.table.clone(),
            fields: change.fields.values().cloned().collect(),
        });
    }

    for change in &diff.to_add {
        for field in change.fields.values() {
            tracing::debug!("planning column {}.{}", change.table, field.name);
            let mut field = field.clone();
            if field.primary_key {
                tracing::warn!(
                    "table {} already exists, adding primary key field {} as a unique column",
                    change.table,
                    field.name
                );
                field.primary_key = false;
                field.unique = true;
            }

            let unique_index = field.unique && !ddl.adds_unique_columns_inline();
            let name = field.name.clone();
            operations.push(MigrationOperation::AddColumn {
                table: change.table.clone(),
                field,
            });
            if unique_index {
                operations.push(MigrationOperation::AddUniqueIndex {
                    table: change.table.clone(),
                    field: name,
                });
            }
        }
    }

    MigrationPlan {
        engine,
        stages: solver::order_operations(
            operations,
            &diff.existing_tables,
            ddl.validates_references_eagerly(),
        ),
    }
}
