//! Schema types for mend.
//!
//! This crate contains the vocabulary shared by the engine (`mend`), the
//! configuration loader (`mend-config`) and the CLI:
//!
//! - the **logical** model: what the application wants ([`LogicalSchema`],
//!   [`LogicalTable`], [`LogicalField`])
//! - the **live** model: what the database reports ([`LiveTable`],
//!   [`LiveColumn`])
//! - the supported database [`Engine`]s.

use indexmap::IndexMap;
use std::fmt;
use std::str::FromStr;


/// Errors raised while building a logical schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("invalid reference '{0}': expected 'table.field' or 'table(field)'")]
    InvalidReference(String),

    #[error("unknown field type '{0}': expected string, number, boolean or date")]
    UnknownFieldType(String),

    #[error("unknown database engine '{0}': expected postgres, mysql or sqlite")]
    UnknownEngine(String),

    #[error("{kind} name must not be empty")]
    EmptyName { kind: &'static str },

    #[error("table '{0}' has no fields")]
    EmptyTable(String),
}

/// Result type for schema operations.
pub type Result<T> = std::result::Result<T, SchemaError>;

// =============================================================================
// Engines
// =============================================================================

/// The database engines mend knows how to reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    Postgres,
    MySql,
    Sqlite,
}

impl Engine {
    /// Every supported engine.
    pub const ALL: [Engine; 3] = [Engine::Postgres, Engine::MySql, Engine::Sqlite];

    /// Short lowercase name, used in logs and config files.
    pub fn name(&self) -> &'static str {
        match self {
            Engine::Postgres => "postgres",
            Engine::MySql => "mysql",
            Engine::Sqlite => "sqlite",
        }
    }

    /// Guess the engine from a connection URL scheme.
    ///
    /// ```
    /// use mend_schema::Engine;
    /// assert_eq!(Engine::from_url("postgres://localhost/app"), Some(Engine::Postgres));
    /// assert_eq!(Engine::from_url("sqlite::memory:"), Some(Engine::Sqlite));
    /// assert_eq!(Engine::from_url("redis://localhost"), None);
    /// ```
    pub fn from_url(url: &str) -> Option<Engine> {
        let scheme = url.split_once(':')?.0.to_ascii_lowercase();
        match scheme.as_str() {
            "postgres" | "postgresql" => Some(Engine::Postgres),
            "mysql" | "mariadb" => Some(Engine::MySql),
            "sqlite" => Some(Engine::Sqlite),
            _ => None,
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Engine {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Engine::Postgres),
            "mysql" | "mariadb" => Ok(Engine::MySql),
            "sqlite" | "sqlite3" => Ok(Engine::Sqlite),
            _ => Err(SchemaError::UnknownEngine(s.to_string())),
        }
    }
}

// =============================================================================
// Logical model
// =============================================================================

/// Logical field types. Engines map each of these to a set of native types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
}

impl FieldType {
    /// Every logical field type.
    pub const ALL: [FieldType; 4] = [
        FieldType::String,
        FieldType::Number,
        FieldType::Boolean,
        FieldType::Date,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FieldType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" => Ok(FieldType::String),
            "number" => Ok(FieldType::Number),
            "boolean" => Ok(FieldType::Boolean),
            "date" => Ok(FieldType::Date),
            _ => Err(SchemaError::UnknownFieldType(s.to_string())),
        }
    }
}

/// A foreign-key reference from a field to `table.field`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldReference {
    /// Referenced table
    pub table: String,
    /// Referenced field in that table
    pub field: String,
}

impl FieldReference {
    pub fn new(table: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            field: field.into(),
        }
    }

    /// Parse `"table.field"` or `"table(field)"`.
    pub fn parse(reference: &str) -> Result<Self> {
        parse_reference(reference)
            .map(|(table, field)| Self::new(table, field))
            .ok_or_else(|| SchemaError::InvalidReference(reference.to_string()))
    }
}

impl fmt::Display for FieldReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.field)
    }
}

/// Split a reference string into `(table, field)`.
///
/// Supports both `"table.field"` and `"table(field)"`. Returns `None` when
/// the string matches neither form, or when either side is empty or contains
/// `.`, `(`, `)` or whitespace.
pub fn parse_reference(reference: &str) -> Option<(&str, &str)> {
    let reference = reference.trim();

    let (table, field) = match reference.strip_suffix(')') {
        Some(inner) => inner.split_once('(')?,
        None => reference.split_once('.')?,
    };

    (is_reference_part(table) && is_reference_part(field)).then_some((table, field))
}

fn is_reference_part(part: &str) -> bool {
    !part.is_empty()
        && !part
            .chars()
            .any(|c| matches!(c, '.' | '(' | ')') || c.is_whitespace())
}

/// A field of a logical table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalField {
    /// Field (column) name, unique within its table
    pub name: String,
    /// Logical type
    pub field_type: FieldType,
    /// Whether the column is NOT NULL. Defaults to `true`.
    pub required: bool,
    /// Whether the column carries a UNIQUE constraint
    pub unique: bool,
    /// Whether the column is the table's primary key
    pub primary_key: bool,
    /// Foreign-key reference, if any
    pub reference: Option<FieldReference>,
}

impl LogicalField {
    /// A required field with no constraints.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
            unique: false,
            primary_key: false,
            reference: None,
        }
    }

    /// Mark the field as optional (nullable).
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Add a foreign-key reference to `table.field`.
    pub fn references(mut self, table: impl Into<String>, field: impl Into<String>) -> Self {
        self.reference = Some(FieldReference::new(table, field));
        self
    }

    /// Columns are nullable unless explicitly required.
    pub fn is_nullable(&self) -> bool {
        !self.required
    }
}

/// A logical table: a name plus its fields, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogicalTable {
    /// Table name
    pub name: String,
    /// Fields, indexed by name
    pub fields: IndexMap<String, LogicalField>,
}

impl LogicalTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
        }
    }

    /// Builder-style field insertion.
    pub fn with_field(mut self, field: LogicalField) -> Self {
        self.insert_field(field);
        self
    }

    /// Insert a field, returning the definition it replaced (if any).
    pub fn insert_field(&mut self, field: LogicalField) -> Option<LogicalField> {
        self.fields.insert(field.name.clone(), field)
    }

    /// Get a field by name.
    pub fn field(&self, name: &str) -> Option<&LogicalField> {
        self.fields.get(name)
    }

    /// Tables referenced by this table's fields, excluding itself.
    pub fn referenced_tables(&self) -> impl Iterator<Item = &str> {
        self.fields
            .values()
            .filter_map(|f| f.reference.as_ref())
            .map(|r| r.table.as_str())
            .filter(move |t| *t != self.name)
    }
}

/// A field that was defined twice with different definitions while merging
/// schema fragments. The later definition wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldConflict {
    pub table: String,
    pub field: String,
    pub previous: LogicalField,
    pub replacement: LogicalField,
}

impl fmt::Display for FieldConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "field {}.{} redefined: {} (required: {}) replaced by {} (required: {})",
            self.table,
            self.field,
            self.previous.field_type,
            self.previous.required,
            self.replacement.field_type,
            self.replacement.required,
        )
    }
}

/// The desired schema, merged from one or more fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogicalSchema {
    /// Tables, indexed by name, in first-seen order
    pub tables: IndexMap<String, LogicalTable>,
    /// Fields overwritten by a later fragment with a different definition
    pub conflicts: Vec<FieldConflict>,
}

impl LogicalSchema {
    /// Create a new empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a schema by merging fragments in order.
    pub fn from_fragments(fragments: impl IntoIterator<Item = LogicalTable>) -> Self {
        let mut schema = Self::new();
        for fragment in fragments {
            schema.merge(fragment);
        }
        schema
    }

    /// Merge a table fragment into the schema.
    ///
    /// Fields are unioned by name. A field already present is replaced by the
    /// fragment's definition; when the two definitions differ the overwrite is
    /// recorded in [`LogicalSchema::conflicts`].
    pub fn merge(&mut self, fragment: LogicalTable) {
        let table = self
            .tables
            .entry(fragment.name.clone())
            .or_insert_with(|| LogicalTable::new(fragment.name.clone()));

        for (_, field) in fragment.fields {
            let replacement = field.clone();
            if let Some(previous) = table.insert_field(field)
                && previous != replacement
            {
                let conflict = FieldConflict {
                    table: table.name.clone(),
                    field: replacement.name.clone(),
                    previous,
                    replacement,
                };
                tracing::warn!("{}", conflict);
                self.conflicts.push(conflict);
            }
        }
    }

    /// Get a table by name.
    pub fn get_table(&self, name: &str) -> Option<&LogicalTable> {
        self.tables.get(name)
    }

    /// Iterate over all tables.
    pub fn iter_tables(&self) -> impl Iterator<Item = &LogicalTable> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Check that every table ended up with at least one field once all
    /// fragments were merged.
    pub fn validate(&self) -> Result<()> {
        match self.iter_tables().find(|t| t.fields.is_empty()) {
            Some(table) => Err(SchemaError::EmptyTable(table.name.clone())),
            None => Ok(()),
        }
    }
}

/// Produces the desired schema for a run.
///
/// Implementations must be deterministic for a fixed configuration. Errors are
/// returned to the caller, which decides whether to abort.
pub trait LogicalSchemaProvider {
    fn logical_schema(&self) -> Result<LogicalSchema>;
}

impl LogicalSchemaProvider for LogicalSchema {
    fn logical_schema(&self) -> Result<LogicalSchema> {
        self.validate()?;
        Ok(self.clone())
    }
}

// =============================================================================
// Live model
// =============================================================================

/// A column as reported by the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveColumn {
    /// Column name
    pub name: String,
    /// Native type name, verbatim from the engine's catalog
    pub data_type: String,
}

impl LiveColumn {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A table as reported by the database.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LiveTable {
    /// Table name
    pub name: String,
    /// Columns, in catalog order
    pub columns: Vec<LiveColumn>,
}

impl LiveTable {
    pub fn new(name: impl Into<String>, columns: Vec<LiveColumn>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Look up a column by exact name.
    pub fn column(&self, name: &str) -> Option<&LiveColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}
