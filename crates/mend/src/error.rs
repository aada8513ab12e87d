use mend_schema::{Engine, SchemaError};
use thiserror::Error;

/// Fatal errors: any of these aborts a run before DDL is issued.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot connect to {engine} database: {message}")]
    Connection { engine: Engine, message: String },

    #[error("{engine} schema introspection failed: {message}")]
    Introspection { engine: Engine, message: String },

    /// Carries the URL scheme only, never credentials.
    #[error("unsupported database url scheme '{0}': expected postgres, mysql or sqlite")]
    UnsupportedUrl(String),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
}

impl Error {
    pub fn connection(engine: Engine, message: impl Into<String>) -> Self {
        Error::Connection {
            engine,
            message: message.into(),
        }
    }

    pub fn introspection(engine: Engine, message: impl Into<String>) -> Self {
        Error::Introspection {
            engine,
            message: message.into(),
        }
    }
}

/// A DDL statement rejected by the database.
///
/// Recorded per operation in the execution report; never aborts other operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct OperationError {
    /// Engine error message
    pub message: String,
    /// Engine error code (SQLSTATE or vendor code), when available
    pub code: Option<String>,
}

impl OperationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}
