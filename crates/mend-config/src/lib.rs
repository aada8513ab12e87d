//! Configuration file handling for mend.
//!
//! Looks for `.config/mend.toml` in the current directory or any parent
//! directory. The file names the database and declares the logical schema as a
//! list of fragments, merged in file order:
//!
//! ```toml
//! [database]
//! url = "postgres://localhost/app"
//! max_concurrency = 4
//!
//! [[fragments]]
//! name = "core"
//!
//! [fragments.tables.user.fields.id]
//! type = "string"
//! primary_key = true
//!
//! [fragments.tables.session.fields.userId]
//! type = "string"
//! references = "user.id"
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use mend_schema::{
    FieldReference, FieldType, LogicalField, LogicalSchema, LogicalSchemaProvider, LogicalTable,
    SchemaError,
};
use serde::Deserialize;

/// Location of the config file, relative to a project directory.
pub const CONFIG_FILE: &str = ".config/mend.toml";

/// Lanes the executor runs at once when the config doesn't say.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Schema fragments, merged in order
    #[serde(default)]
    pub fragments: Vec<FragmentConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Connection URL; `DATABASE_URL` and `--database-url` take precedence
    pub url: Option<String>,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

/// A named group of tables, e.g. one per plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FragmentConfig {
    pub name: Option<String>,

    #[serde(default)]
    pub tables: IndexMap<String, TableConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    #[serde(default)]
    pub fields: IndexMap<String, FieldConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldConfig {
    /// `string`, `number`, `boolean` or `date`
    #[serde(rename = "type")]
    pub field_type: String,

    #[serde(default = "default_required")]
    pub required: bool,

    #[serde(default)]
    pub unique: bool,

    #[serde(default)]
    pub primary_key: bool,

    /// `"table.field"` or `"table(field)"`
    pub references: Option<String>,
}

fn default_required() -> bool {
    true
}

impl FieldConfig {
    fn to_logical(&self, name: &str) -> Result<LogicalField, SchemaError> {
        if name.is_empty() {
            return Err(SchemaError::EmptyName { kind: "field" });
        }
        let field_type: FieldType = self.field_type.parse()?;
        let mut field = LogicalField::new(name, field_type);
        field.required = self.required;
        field.unique = self.unique;
        field.primary_key = self.primary_key;
        if let Some(reference) = &self.references {
            field.reference = Some(FieldReference::parse(reference)?);
        }
        Ok(field)
    }
}

impl Config {
    /// Parse a config from TOML text and validate its schema.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.logical_schema().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// One logical table per `(fragment, table)` entry, in file order.
    pub fn table_fragments(&self) -> Result<Vec<LogicalTable>, SchemaError> {
        let mut tables = Vec::new();
        for fragment in &self.fragments {
            for (table_name, table) in &fragment.tables {
                if table_name.is_empty() {
                    return Err(SchemaError::EmptyName { kind: "table" });
                }
                let mut logical = LogicalTable::new(table_name);
                for (field_name, field) in &table.fields {
                    logical.insert_field(field.to_logical(field_name)?);
                }
                tables.push(logical);
            }
        }
        Ok(tables)
    }
}

impl LogicalSchemaProvider for Config {
    fn logical_schema(&self) -> Result<LogicalSchema, SchemaError> {
        let schema = LogicalSchema::from_fragments(self.table_fragments()?);
        schema.validate()?;
        Ok(schema)
    }
}

/// Load configuration from `.config/mend.toml`, searching up the directory tree.
pub fn load() -> Result<(Config, Utf8PathBuf), ConfigError> {
    let cwd = std::env::current_dir().map_err(|e| ConfigError::Io(e.to_string()))?;
    let cwd = Utf8PathBuf::try_from(cwd).map_err(|e| ConfigError::Io(e.to_string()))?;
    load_from(&cwd)
}

/// Load configuration starting from a specific directory.
pub fn load_from(start: &Utf8Path) -> Result<(Config, Utf8PathBuf), ConfigError> {
    let config_path = find_config_file(start)?;
    let config = load_file(&config_path)?;
    Ok((config, config_path))
}

/// Load a specific config file.
pub fn load_file(path: &Utf8Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
    Config::parse(&content)
}

/// Find `.config/mend.toml` by searching up the directory tree.
pub fn find_config_file(start: &Utf8Path) -> Result<Utf8PathBuf, ConfigError> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE);
        if config_path.exists() {
            return Ok(config_path);
        }

        if !current.pop() {
            return Err(ConfigError::NotFound);
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// No `.config/mend.toml` found in any parent directory
    NotFound,
    /// I/O error reading the file
    Io(String),
    /// TOML syntax or shape error
    Parse(String),
    /// Unknown field type, bad reference, empty name or table without fields
    Invalid(SchemaError),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound => {
                write!(f, "No {} found in current directory or any parent", CONFIG_FILE)
            }
            ConfigError::Io(e) => write!(f, "Failed to read {}: {}", CONFIG_FILE, e),
            ConfigError::Parse(e) => write!(f, "Failed to parse {}: {}", CONFIG_FILE, e),
            ConfigError::Invalid(e) => write!(f, "Invalid schema in {}: {}", CONFIG_FILE, e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Invalid(e) => Some(e),
            _ => None,
        }
    }
}
