//! Read the live schema through a [`DatabaseAdapter`].

use crate::adapter::DatabaseAdapter;
use crate::error::Error;
use mend_schema::LiveTable;

/// Snapshots the tables and columns of a database.
pub struct Introspector<'a> {
    adapter: &'a dyn DatabaseAdapter,
}

impl<'a> Introspector<'a> {
    pub fn new(adapter: &'a dyn DatabaseAdapter) -> Self {
        Self { adapter }
    }

    /// List every user table with its columns, sorted by table name.
    ///
    /// A database without tables yields an empty list. Unreachable databases
    /// fail with [`Error::Connection`]; catalog rows that can't be understood
    /// fail with [`Error::Introspection`].
    pub async fn list_live_tables(&self) -> Result<Vec<LiveTable>, Error> {
        let engine = self.adapter.engine();
        let mut names = self.adapter.table_names().await?;
        names.sort();
        names.dedup();

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            if name.is_empty() {
                return Err(Error::introspection(engine, "catalog returned an unnamed table"));
            }
            let columns = self.adapter.table_columns(&name).await?;
            if let Some(column) = columns.iter().find(|c| c.name.is_empty()) {
                return Err(Error::introspection(
                    engine,
                    format!(
                        "catalog returned an unnamed column of type '{}' in table {}",
                        column.data_type, name
                    ),
                ));
            }
            tables.push(LiveTable::new(name, columns));
        }

        tracing::debug!("introspected {} tables from {}", tables.len(), engine);
        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockAdapter;
    use mend_schema::{Engine, LiveColumn};

    #[tokio::test]
    async fn test_empty_database_is_not_an_error() {
        let adapter = MockAdapter::new(Engine::Sqlite);
        let tables = Introspector::new(&adapter).list_live_tables().await.unwrap();
        assert!(tables.is_empty());
    }

    #[tokio::test]
    async fn test_tables_are_sorted_and_deduplicated() {
        let adapter = MockAdapter::new(Engine::Postgres)
            .with_table(LiveTable::new("user", vec![LiveColumn::new("id", "text")]))
            .with_table(LiveTable::new("account", vec![]))
            .with_table(LiveTable::new("user", vec![]));

        let tables = Introspector::new(&adapter).list_live_tables().await.unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["account", "user"]);
        assert_eq!(tables[1].columns, vec![LiveColumn::new("id", "text")]);
    }

    #[tokio::test]
    async fn test_unnamed_column_is_fatal() {
        let adapter = MockAdapter::new(Engine::MySql).with_table(LiveTable::new(
            "user",
            vec![LiveColumn::new("", "int")],
        ));

        let err = Introspector::new(&adapter).list_live_tables().await.unwrap_err();
        assert!(matches!(err, Error::Introspection { engine: Engine::MySql, .. }));
    }

    #[tokio::test]
    async fn test_typeless_column_is_accepted() {
        let adapter = MockAdapter::new(Engine::Sqlite)
            .with_table(LiveTable::new("blob", vec![LiveColumn::new("data", "")]));

        let tables = Introspector::new(&adapter).list_live_tables().await.unwrap();
        assert_eq!(tables[0].columns[0].data_type, "");
    }
}
