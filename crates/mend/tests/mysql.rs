//! Integration test against a real MySQL.
//!
//! Requires Docker. Run with: cargo test -p mend --test mysql -- --ignored

use mend::{
    DatabaseAdapter, FieldType, LogicalField, LogicalSchema, LogicalTable, MigrationOperation,
    Reconciler,
};
use std::time::Duration;
use testcontainers_modules::mysql::Mysql;
use testcontainers_modules::testcontainers::runners::AsyncRunner;

fn team_schema() -> LogicalSchema {
    LogicalSchema::from_fragments([
        LogicalTable::new("team")
            .with_field(LogicalField::new("id", FieldType::String).primary_key())
            .with_field(LogicalField::new("slug", FieldType::String).unique())
            .with_field(LogicalField::new("ownerId", FieldType::String).optional().references("member", "id")),
        LogicalTable::new("member")
            .with_field(LogicalField::new("id", FieldType::String).primary_key())
            .with_field(LogicalField::new("teamId", FieldType::String).references("team", "id"))
            .with_field(LogicalField::new("joinedAt", FieldType::Date))
            .with_field(LogicalField::new("score", FieldType::Number).optional())
            .with_field(LogicalField::new("active", FieldType::Boolean)),
    ])
}

async fn connect(url: &str) -> Reconciler {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match Reconciler::connect(url, 4).await {
            Ok(reconciler) => return reconciler,
            Err(e) if attempts < 20 => {
                tracing::debug!("connection attempt {} failed: {}, retrying", attempts, e);
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            Err(e) => panic!("failed to connect to mysql after {} attempts: {}", attempts, e),
        }
    }
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_reconcile_on_mysql() {
    let container = Mysql::default()
        .start()
        .await
        .expect("failed to start mysql container");
    let port = container
        .get_host_port_ipv4(3306)
        .await
        .expect("mysql port not available");
    let url = format!("mysql://root@127.0.0.1:{port}/test");

    let reconciler = connect(&url).await;
    let schema = team_schema();

    let report = reconciler.run(&schema).await.unwrap();
    assert!(report.is_success(), "{}", report.execution);
    assert_eq!(report.execution.tables_created(), 2);
    assert_eq!(report.execution.foreign_keys_attached(), 1);

    let last = report.plan.stages.last().unwrap();
    assert!(
        last.operations
            .iter()
            .all(|op| matches!(op, MigrationOperation::AddForeignKey { .. }))
    );

    // Catalog types read back through information_schema match the logical ones
    let adapter = reconciler.adapter();
    assert_eq!(adapter.table_names().await.unwrap(), vec!["member", "team"]);
    let again = reconciler.prepare(&schema).await.unwrap();
    assert!(again.is_empty());
    assert!(again.warnings().is_empty(), "{:?}", again.warnings());

    // A referencing column added to an existing table, constraint in the same statement
    let mut extended = team_schema();
    extended.merge(
        LogicalTable::new("member")
            .with_field(LogicalField::new("invitedBy", FieldType::String).optional().references("member", "id")),
    );
    let report = reconciler.run(&extended).await.unwrap();
    assert!(report.is_success(), "{}", report.execution);
    assert_eq!(report.execution.columns_added(), 1);
    let sql = report.execution.outcomes[0].sql.as_deref().unwrap();
    assert!(sql.contains(", ADD CONSTRAINT `fk_member_invitedBy`"), "{}", sql);

    let columns = adapter.table_columns("member").await.unwrap();
    assert!(columns.iter().any(|c| c.name == "invitedBy" && c.data_type == "varchar"));
    assert!(reconciler.prepare(&extended).await.unwrap().is_empty());
}
