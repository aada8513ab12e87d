//! Schema diffing: compare the logical schema against the live database.
//!
//! The diff is strictly additive. It reports tables that must be created and
//! columns that must be added to existing tables; tables and columns that only
//! exist in the database are left alone, and a column whose native type does
//! not fit its logical type is reported as a [`TypeMismatchWarning`] and
//! otherwise ignored (no type alteration, ever).

use crate::typemap::TypeMapper;
use indexmap::IndexMap;
use mend_schema::{FieldType, LiveTable, LogicalField, LogicalSchema, LogicalTable};
use std::collections::BTreeSet;

/// Result of comparing a logical schema with a live one.
#[derive(Debug, Clone, Default)]
pub struct SchemaDiff {
    /// Tables absent from the database, with their full field set.
    pub to_create: Vec<TableChange>,
    /// Existing tables, with the fields they are missing.
    pub to_add: Vec<TableChange>,
    /// Columns whose native type does not fit the logical type.
    pub warnings: Vec<TypeMismatchWarning>,
    /// Names of the tables the database had when the diff was taken.
    pub existing_tables: BTreeSet<String>,
}

impl SchemaDiff {
    /// True when nothing needs to be created or added. Warnings don't count.
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_add.is_empty()
    }

    /// Number of tables to create plus number of columns to add.
    pub fn change_count(&self) -> usize {
        self.to_create.len() + self.to_add.iter().map(|t| t.fields.len()).sum::<usize>()
    }
}

/// A table and a set of fields: the whole table for `to_create`, the missing
/// columns for `to_add`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableChange {
    pub table: String,
    pub fields: IndexMap<String, LogicalField>,
}

impl TableChange {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            fields: IndexMap::new(),
        }
    }
}

/// A column that exists but whose native type is not acceptable for its
/// logical type. Advisory only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMismatchWarning {
    pub table: String,
    pub field: String,
    pub expected: FieldType,
    pub actual: String,
}

impl std::fmt::Display for TypeMismatchWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "field {} in table {} has a different type in the database: expected {} but found {}",
            self.field, self.table, self.expected, self.actual
        )
    }
}

/// Diff a merged logical schema against the live tables.
pub fn diff(logical: &LogicalSchema, live: &[LiveTable], mapper: &dyn TypeMapper) -> SchemaDiff {
    diff_tables(logical.iter_tables(), live, mapper)
}

/// Diff a sequence of logical tables against the live tables.
///
/// The same table name may appear more than once (unmerged fragments); entries
/// destined for `to_create` or `to_add` are unioned by field name, later
/// definitions winning.
pub fn diff_tables<'a>(
    tables: impl IntoIterator<Item = &'a LogicalTable>,
    live: &[LiveTable],
    mapper: &dyn TypeMapper,
) -> SchemaDiff {
    let mut diff = SchemaDiff {
        existing_tables: live.iter().map(|t| t.name.clone()).collect(),
        ..Default::default()
    };

    for table in tables {
        let Some(live_table) = live.iter().find(|t| t.name == table.name) else {
            let entry = entry_for(&mut diff.to_create, &table.name);
            for (name, field) in &table.fields {
                entry.fields.insert(name.clone(), field.clone());
            }
            continue;
        };

        for (name, field) in &table.fields {
            match live_table.column(name) {
                None => {
                    entry_for(&mut diff.to_add, &table.name)
                        .fields
                        .insert(name.clone(), field.clone());
                }
                Some(column) if !mapper.matches(&column.data_type, field.field_type) => {
                    let warning = TypeMismatchWarning {
                        table: table.name.clone(),
                        field: name.clone(),
                        expected: field.field_type,
                        actual: column.data_type.clone(),
                    };
                    if !diff.warnings.contains(&warning) {
                        tracing::warn!("{}", warning);
                        diff.warnings.push(warning);
                    }
                }
                Some(_) => {}
            }
        }
    }

    diff
}

fn entry_for<'a>(changes: &'a mut Vec<TableChange>, table: &str) -> &'a mut TableChange {
    let idx = match changes.iter().position(|c| c.table == table) {
        Some(idx) => idx,
        None => {
            changes.push(TableChange::new(table));
            changes.len() - 1
        }
    };
    &mut changes[idx]
}

impl std::fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            writeln!(f, "No changes detected.")?;
        } else {
            writeln!(f, "Changes detected:\n")?;
            for change in &self.to_create {
                writeln!(f, "  + table {} ({} fields)", change.table, change.fields.len())?;
                for field in change.fields.values() {
                    writeln!(f, "      {}", describe_field(field))?;
                }
            }
            for change in &self.to_add {
                writeln!(f, "  {}:", change.table)?;
                for field in change.fields.values() {
                    writeln!(f, "    + {}", describe_field(field))?;
                }
            }
        }
        for warning in &self.warnings {
            writeln!(
                f,
                "  ! {}.{}: expected {}, found {}",
                warning.table, warning.field, warning.expected, warning.actual
            )?;
        }
        Ok(())
    }
}

fn describe_field(field: &LogicalField) -> String {
    let mut out = format!("{}: {}", field.name, field.field_type);
    if field.is_nullable() {
        out.push_str(" (nullable)");
    }
    if let Some(reference) = &field.reference {
        out.push_str(&format!(" -> {}", reference));
    }
    out
}
