use super::{DatabaseAdapter, sqlx_error, sqlx_operation_error};
use crate::error::{Error, OperationError};
use crate::traced;
use async_trait::async_trait;
use mend_schema::{Engine, LiveColumn};
use sqlx::Row;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};

// information_schema columns come back as binary strings on some servers;
// CAST AS CHAR keeps them decodable as String.
const TABLES_SQL: &str = "SELECT CAST(TABLE_NAME AS CHAR) AS table_name \
     FROM information_schema.TABLES \
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' \
     ORDER BY TABLE_NAME";

const COLUMNS_SQL: &str = "SELECT CAST(COLUMN_NAME AS CHAR) AS column_name, \
     CAST(DATA_TYPE AS CHAR) AS data_type \
     FROM information_schema.COLUMNS \
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
     ORDER BY ORDINAL_POSITION";

/// MySQL / MariaDB, through a sqlx pool.
#[derive(Clone)]
pub struct MySqlAdapter {
    pool: MySqlPool,
}

impl MySqlAdapter {
    pub async fn connect(url: &str, max_connections: usize) -> Result<Self, Error> {
        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections.max(1) as u32)
            .connect(url)
            .await
            .map_err(|e| Error::connection(Engine::MySql, e.to_string()))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl DatabaseAdapter for MySqlAdapter {
    fn engine(&self) -> Engine {
        Engine::MySql
    }

    async fn table_names(&self) -> Result<Vec<String>, Error> {
        let rows = traced::query(
            Engine::MySql,
            TABLES_SQL,
            0,
            sqlx::query(TABLES_SQL).fetch_all(&self.pool),
        )
        .await
        .map_err(|e| sqlx_error(Engine::MySql, e))?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("table_name"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| sqlx_error(Engine::MySql, e))
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<LiveColumn>, Error> {
        let rows = traced::query(
            Engine::MySql,
            COLUMNS_SQL,
            1,
            sqlx::query(COLUMNS_SQL).bind(table).fetch_all(&self.pool),
        )
        .await
        .map_err(|e| sqlx_error(Engine::MySql, e))?;

        rows.iter()
            .map(|row| {
                Ok(LiveColumn::new(
                    row.try_get::<String, _>("column_name")?,
                    row.try_get::<String, _>("data_type")?,
                ))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| sqlx_error(Engine::MySql, e))
    }

    async fn execute(&self, sql: &str) -> Result<u64, OperationError> {
        let result = traced::execute(Engine::MySql, sql, async {
            sqlx::raw_sql(sql)
                .execute(&self.pool)
                .await
                .map(|r| r.rows_affected())
        })
        .await;
        result.map_err(sqlx_operation_error)
    }
}
