use super::DatabaseAdapter;
use crate::error::{Error, OperationError};
use crate::traced;
use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use mend_schema::{Engine, LiveColumn};
use std::str::FromStr;
use tokio_postgres::NoTls;

const TABLES_SQL: &str = "SELECT table_name::text FROM information_schema.tables \
     WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
     ORDER BY table_name";

const COLUMNS_SQL: &str = "SELECT column_name::text, data_type::text FROM information_schema.columns \
     WHERE table_schema = current_schema() AND table_name = $1 \
     ORDER BY ordinal_position";

/// Postgres, through a deadpool-managed tokio-postgres pool.
#[derive(Clone)]
pub struct PostgresAdapter {
    pool: Pool,
}

impl PostgresAdapter {
    /// Build a pool for `url` and check that a connection can be made.
    pub async fn connect(url: &str, max_connections: usize) -> Result<Self, Error> {
        let config = tokio_postgres::Config::from_str(url)
            .map_err(|e| Error::connection(Engine::Postgres, e.to_string()))?;

        let manager = Manager::from_config(
            config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(max_connections.max(1))
            .build()
            .map_err(|e| Error::connection(Engine::Postgres, e.to_string()))?;

        let adapter = Self { pool };
        adapter.client().await?;
        Ok(adapter)
    }

    async fn client(&self) -> Result<Object, Error> {
        self.pool
            .get()
            .await
            .map_err(|e| Error::connection(Engine::Postgres, e.to_string()))
    }
}

fn catalog_error(err: tokio_postgres::Error) -> Error {
    if err.is_closed() {
        Error::connection(Engine::Postgres, err.to_string())
    } else {
        Error::introspection(Engine::Postgres, err.to_string())
    }
}

fn operation_error(err: tokio_postgres::Error) -> OperationError {
    match err.as_db_error() {
        Some(db) => OperationError::new(db.message()).with_code(db.code().code()),
        None => OperationError::new(err.to_string()),
    }
}

#[async_trait]
impl DatabaseAdapter for PostgresAdapter {
    fn engine(&self) -> Engine {
        Engine::Postgres
    }

    async fn table_names(&self) -> Result<Vec<String>, Error> {
        let client = self.client().await?;
        let rows = traced::query(Engine::Postgres, TABLES_SQL, 0, client.query(TABLES_SQL, &[]))
            .await
            .map_err(catalog_error)?;

        rows.iter()
            .map(|row| row.try_get::<_, String>(0))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Error::introspection(Engine::Postgres, e.to_string()))
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<LiveColumn>, Error> {
        let client = self.client().await?;
        let rows = traced::query(
            Engine::Postgres,
            COLUMNS_SQL,
            1,
            client.query(COLUMNS_SQL, &[&table]),
        )
        .await
        .map_err(catalog_error)?;

        rows.iter()
            .map(|row| {
                let name: String = row.try_get(0)?;
                let data_type: String = row.try_get(1)?;
                Ok(LiveColumn::new(name, data_type))
            })
            .collect::<Result<Vec<_>, tokio_postgres::Error>>()
            .map_err(|e| Error::introspection(Engine::Postgres, e.to_string()))
    }

    async fn execute(&self, sql: &str) -> Result<u64, OperationError> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| OperationError::new(e.to_string()))?;
        traced::execute(Engine::Postgres, sql, client.execute(sql, &[]))
            .await
            .map_err(operation_error)
    }
}
