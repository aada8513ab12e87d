//! Additive schema reconciliation for Postgres, MySQL and SQLite.
//!
//! Given a [`LogicalSchema`] and a live database, mend
//!
//! 1. introspects the tables and columns the database has ([`Introspector`]),
//! 2. diffs them against the logical schema ([`diff()`]): tables to create,
//!    columns to add, and advisory type mismatches,
//! 3. plans staged DDL ([`plan()`]), ordering tables so foreign keys only
//!    point at tables that already exist on engines that check them eagerly,
//! 4. executes the plan best-effort ([`Executor`]), one lane per table.
//!
//! Nothing is ever dropped, renamed or altered.
//!
//! ```ignore
//! use mend::Reconciler;
//!
//! let reconciler = Reconciler::connect("postgres://localhost/app", 4).await?;
//! let report = reconciler.run(&schema).await?;
//! println!("{}", report.execution);
//! ```

pub mod adapter;
pub mod ddl;
pub mod diff;
mod error;
pub mod executor;
pub mod introspect;
pub mod plan;
mod reconcile;
pub mod solver;
mod traced;
pub mod typemap;

#[cfg(test)]
mod mock;

pub use adapter::{DatabaseAdapter, MySqlAdapter, PostgresAdapter, SqliteAdapter, connect};
pub use ddl::DdlBuilder;
pub use diff::{SchemaDiff, TableChange, TypeMismatchWarning, diff};
pub use error::{Error, OperationError};
pub use executor::{ExecutionReport, Executor, OperationOutcome};
pub use introspect::Introspector;
pub use plan::{MigrationOperation, MigrationPlan, Stage, plan};
pub use reconcile::{PreparedMigration, ReconcileReport, Reconciler};
pub use typemap::TypeMapper;

pub use mend_schema::{
    Engine, FieldReference, FieldType, LiveColumn, LiveTable, LogicalField, LogicalSchema,
    LogicalSchemaProvider, LogicalTable, SchemaError,
};

/// Result type for mend operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Per-engine capabilities.
pub trait EngineExt {
    fn type_mapper(self) -> &'static dyn TypeMapper;
    fn ddl(self) -> &'static dyn DdlBuilder;
}

impl EngineExt for Engine {
    fn type_mapper(self) -> &'static dyn TypeMapper {
        typemap::type_mapper(self)
    }

    fn ddl(self) -> &'static dyn DdlBuilder {
        ddl::builder(self)
    }
}
