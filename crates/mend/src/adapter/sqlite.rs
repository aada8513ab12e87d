use super::{DatabaseAdapter, sqlx_error, sqlx_operation_error};
use crate::error::{Error, OperationError};
use crate::traced;
use async_trait::async_trait;
use mend_schema::{Engine, LiveColumn};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

const TABLES_SQL: &str = "SELECT name FROM sqlite_master \
     WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
     ORDER BY name";

const COLUMNS_SQL: &str = "SELECT name, type FROM pragma_table_info(?) ORDER BY cid";

/// SQLite, through a sqlx pool. Database files are created when missing.
#[derive(Clone)]
pub struct SqliteAdapter {
    pool: SqlitePool,
}

impl SqliteAdapter {
    /// Open `url` (`sqlite:path`, `sqlite://path` or `sqlite::memory:`).
    ///
    /// Every connection to `:memory:` opens a fresh database, so in-memory
    /// pools hold exactly one connection that is never recycled.
    pub async fn connect(url: &str, max_connections: usize) -> Result<Self, Error> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| Error::connection(Engine::Sqlite, e.to_string()))?
            .create_if_missing(true)
            .foreign_keys(true);

        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1) as u32)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| Error::connection(Engine::Sqlite, e.to_string()))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl DatabaseAdapter for SqliteAdapter {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    async fn table_names(&self) -> Result<Vec<String>, Error> {
        let rows = traced::query(
            Engine::Sqlite,
            TABLES_SQL,
            0,
            sqlx::query(TABLES_SQL).fetch_all(&self.pool),
        )
        .await
        .map_err(|e| sqlx_error(Engine::Sqlite, e))?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("name"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| sqlx_error(Engine::Sqlite, e))
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<LiveColumn>, Error> {
        let rows = traced::query(
            Engine::Sqlite,
            COLUMNS_SQL,
            1,
            sqlx::query(COLUMNS_SQL).bind(table).fetch_all(&self.pool),
        )
        .await
        .map_err(|e| sqlx_error(Engine::Sqlite, e))?;

        rows.iter()
            .map(|row| {
                Ok(LiveColumn::new(
                    row.try_get::<String, _>("name")?,
                    row.try_get::<String, _>("type")?,
                ))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| sqlx_error(Engine::Sqlite, e))
    }

    async fn execute(&self, sql: &str) -> Result<u64, OperationError> {
        let result = traced::execute(Engine::Sqlite, sql, async {
            sqlx::raw_sql(sql)
                .execute(&self.pool)
                .await
                .map(|r| r.rows_affected())
        })
        .await;
        result.map_err(sqlx_operation_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory() -> SqliteAdapter {
        SqliteAdapter::connect("sqlite::memory:", 4).await.unwrap()
    }

    #[tokio::test]
    async fn test_lists_user_tables_only() {
        let db = memory().await;
        db.execute("CREATE TABLE \"zeta\" (\"id\" integer PRIMARY KEY AUTOINCREMENT)")
            .await
            .unwrap();
        db.execute("CREATE TABLE \"alpha\" (\"id\" text)").await.unwrap();

        // AUTOINCREMENT creates sqlite_sequence, which must not show up
        assert_eq!(db.table_names().await.unwrap(), vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn test_columns_report_declared_types() {
        let db = memory().await;
        db.execute("CREATE TABLE \"user\" (\"id\" TEXT NOT NULL, \"age\" integer, \"emailVerified\" boolean)")
            .await
            .unwrap();

        let columns = db.table_columns("user").await.unwrap();
        assert_eq!(
            columns,
            vec![
                LiveColumn::new("id", "TEXT"),
                LiveColumn::new("age", "integer"),
                LiveColumn::new("emailVerified", "boolean"),
            ]
        );
        assert!(db.table_columns("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_statement_is_an_operation_error() {
        let db = memory().await;
        db.execute("CREATE TABLE \"t\" (\"id\" text)").await.unwrap();
        let err = db
            .execute("CREATE TABLE \"t\" (\"id\" text)")
            .await
            .unwrap_err();
        assert!(err.message.contains("already exists"), "{}", err.message);
    }
}
