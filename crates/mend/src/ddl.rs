//! DDL synthesis per engine.
//!
//! Statements are returned without a trailing `;` so they can be sent to the
//! database as-is; [`MigrationPlan::to_sql`](crate::MigrationPlan::to_sql)
//! adds terminators when rendering a script.

use crate::typemap::{TypeMapper, type_mapper};
use mend_schema::{Engine, FieldReference, LogicalField};
use mend_sql::{Ident, foreign_key_name, unique_index_name};

/// Renders DDL statements for one engine.
pub trait DdlBuilder: Send + Sync {
    fn engine(&self) -> Engine;

    /// Whether the engine checks that a foreign key's target table exists
    /// when the DDL runs (as opposed to when rows are written).
    fn validates_references_eagerly(&self) -> bool;

    /// Whether `ADD COLUMN` may carry a `UNIQUE` constraint. When it can't,
    /// the planner follows the column with an `AddUniqueIndex`.
    fn adds_unique_columns_inline(&self) -> bool {
        true
    }

    fn types(&self) -> &'static dyn TypeMapper {
        type_mapper(self.engine())
    }

    /// `"name" type [PRIMARY KEY] [NOT NULL] [UNIQUE]`
    fn column_definition(&self, field: &LogicalField, inline_primary_key: bool) -> String {
        let engine = self.engine();
        let mut def = format!(
            "{} {}",
            Ident(engine, &field.name),
            self.types().column_type(field.field_type)
        );

        if field.primary_key && inline_primary_key {
            def.push_str(" PRIMARY KEY");
        }

        // Inline PRIMARY KEY already implies NOT NULL
        if field.required && !(field.primary_key && inline_primary_key) {
            def.push_str(" NOT NULL");
        }

        if field.unique && !field.primary_key {
            def.push_str(" UNIQUE");
        }

        def
    }

    /// `CONSTRAINT "fk_t_c" FOREIGN KEY ("c") REFERENCES "u" ("id")`
    fn foreign_key_clause(&self, table: &str, field: &str, reference: &FieldReference) -> String {
        let engine = self.engine();
        format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            Ident(engine, foreign_key_name(engine, table, field)),
            Ident(engine, field),
            Ident(engine, &reference.table),
            Ident(engine, &reference.field),
        )
    }

    /// `CREATE TABLE` with column constraints, a table-level primary key when
    /// more than one field is a key, and one named constraint per reference.
    fn create_table(&self, name: &str, fields: &[LogicalField]) -> String {
        let engine = self.engine();
        let pk_columns: Vec<&str> = fields
            .iter()
            .filter(|f| f.primary_key)
            .map(|f| f.name.as_str())
            .collect();
        let composite_pk = pk_columns.len() > 1;

        let mut parts: Vec<String> = fields
            .iter()
            .map(|f| format!("    {}", self.column_definition(f, !composite_pk)))
            .collect();

        if composite_pk {
            let quoted: Vec<String> = pk_columns
                .iter()
                .map(|c| Ident(engine, c).to_string())
                .collect();
            parts.push(format!("    PRIMARY KEY ({})", quoted.join(", ")));
        }

        for field in fields {
            if let Some(reference) = &field.reference {
                parts.push(format!(
                    "    {}",
                    self.foreign_key_clause(name, &field.name, reference)
                ));
            }
        }

        format!(
            "CREATE TABLE {} (\n{}\n)",
            Ident(engine, name),
            parts.join(",\n")
        )
    }

    /// `ALTER TABLE ... ADD COLUMN`, attaching the field's foreign key in the
    /// same statement. Never declares a primary key.
    fn add_column(&self, table: &str, field: &LogicalField) -> String {
        let mut sql = format!(
            "ALTER TABLE {} ADD COLUMN {}",
            Ident(self.engine(), table),
            self.column_definition(field, false)
        );
        if let Some(reference) = &field.reference {
            sql.push_str(", ADD ");
            sql.push_str(&self.foreign_key_clause(table, &field.name, reference));
        }
        sql
    }

    /// `CREATE UNIQUE INDEX "uq_t_c" ON "t" ("c")`
    fn add_unique_index(&self, table: &str, field: &str) -> String {
        let engine = self.engine();
        format!(
            "CREATE UNIQUE INDEX {} ON {} ({})",
            Ident(engine, unique_index_name(engine, table, field)),
            Ident(engine, table),
            Ident(engine, field)
        )
    }

    /// `ALTER TABLE ... ADD CONSTRAINT ... FOREIGN KEY`, or `None` when the
    /// engine cannot add constraints to existing tables.
    fn add_foreign_key(
        &self,
        table: &str,
        field: &str,
        reference: &FieldReference,
    ) -> Option<String> {
        Some(format!(
            "ALTER TABLE {} ADD {}",
            Ident(self.engine(), table),
            self.foreign_key_clause(table, field, reference)
        ))
    }
}

pub struct PostgresDdl;

impl DdlBuilder for PostgresDdl {
    fn engine(&self) -> Engine {
        Engine::Postgres
    }

    fn validates_references_eagerly(&self) -> bool {
        true
    }
}

pub struct MySqlDdl;

impl DdlBuilder for MySqlDdl {
    fn engine(&self) -> Engine {
        Engine::MySql
    }

    fn validates_references_eagerly(&self) -> bool {
        true
    }
}

/// SQLite only supports a single `ADD COLUMN` per `ALTER TABLE` and cannot add
/// constraints to existing tables, so references are always inline and
/// uniqueness comes from a separate index.
pub struct SqliteDdl;

impl DdlBuilder for SqliteDdl {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    fn validates_references_eagerly(&self) -> bool {
        false
    }

    fn adds_unique_columns_inline(&self) -> bool {
        false
    }

    fn add_column(&self, table: &str, field: &LogicalField) -> String {
        let engine = self.engine();
        let column = LogicalField {
            unique: false,
            ..field.clone()
        };
        let mut sql = format!(
            "ALTER TABLE {} ADD COLUMN {}",
            Ident(engine, table),
            self.column_definition(&column, false)
        );
        if let Some(reference) = &field.reference {
            sql.push_str(&format!(
                " REFERENCES {} ({})",
                Ident(engine, &reference.table),
                Ident(engine, &reference.field)
            ));
        }
        sql
    }

    fn add_foreign_key(&self, _: &str, _: &str, _: &FieldReference) -> Option<String> {
        None
    }
}

static POSTGRES: PostgresDdl = PostgresDdl;
static MYSQL: MySqlDdl = MySqlDdl;
static SQLITE: SqliteDdl = SqliteDdl;

/// The DDL builder for an engine.
pub fn builder(engine: Engine) -> &'static dyn DdlBuilder {
    match engine {
        Engine::Postgres => &POSTGRES,
        Engine::MySql => &MYSQL,
        Engine::Sqlite => &SQLITE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mend_schema::FieldType;

    fn account_fields() -> Vec<LogicalField> {
        vec![
            LogicalField::new("id", FieldType::String).primary_key(),
            LogicalField::new("accountId", FieldType::String),
            LogicalField::new("userId", FieldType::String).references("user", "id"),
            LogicalField::new("accessToken", FieldType::String).optional(),
            LogicalField::new("expiresAt", FieldType::Date).optional(),
        ]
    }

    #[test]
    fn snapshot_create_table_postgres() {
        insta::assert_snapshot!(builder(Engine::Postgres).create_table("account", &account_fields()), @r#"
        CREATE TABLE "account" (
            "id" text PRIMARY KEY,
            "accountId" text NOT NULL,
            "userId" text NOT NULL,
            "accessToken" text,
            "expiresAt" date,
            CONSTRAINT "fk_account_userId" FOREIGN KEY ("userId") REFERENCES "user" ("id")
        )
        "#);
    }

    #[test]
    fn snapshot_create_table_mysql() {
        insta::assert_snapshot!(builder(Engine::MySql).create_table("account", &account_fields()), @r"
        CREATE TABLE `account` (
            `id` varchar(255) PRIMARY KEY,
            `accountId` varchar(255) NOT NULL,
            `userId` varchar(255) NOT NULL,
            `accessToken` varchar(255),
            `expiresAt` date,
            CONSTRAINT `fk_account_userId` FOREIGN KEY (`userId`) REFERENCES `user` (`id`)
        )
        ");
    }

    #[test]
    fn snapshot_composite_primary_key() {
        let fields = vec![
            LogicalField::new("postId", FieldType::Number).primary_key(),
            LogicalField::new("tagId", FieldType::Number).primary_key(),
            LogicalField::new("pinned", FieldType::Boolean).unique(),
        ];
        insta::assert_snapshot!(builder(Engine::Sqlite).create_table("post_tag", &fields), @r#"
        CREATE TABLE "post_tag" (
            "postId" integer NOT NULL,
            "tagId" integer NOT NULL,
            "pinned" boolean NOT NULL UNIQUE,
            PRIMARY KEY ("postId", "tagId")
        )
        "#);
    }

    #[test]
    fn test_add_column() {
        let optional = LogicalField::new("image", FieldType::String).optional();
        assert_eq!(
            builder(Engine::Postgres).add_column("user", &optional),
            r#"ALTER TABLE "user" ADD COLUMN "image" text"#
        );
        assert_eq!(
            builder(Engine::MySql).add_column("user", &optional),
            "ALTER TABLE `user` ADD COLUMN `image` varchar(255)"
        );

        let required = LogicalField::new("age", FieldType::Number);
        assert_eq!(
            builder(Engine::Sqlite).add_column("user", &required),
            r#"ALTER TABLE "user" ADD COLUMN "age" integer NOT NULL"#
        );
    }

    #[test]
    fn test_add_column_with_reference() {
        let field = LogicalField::new("orgId", FieldType::String)
            .optional()
            .references("organization", "id");
        assert_eq!(
            builder(Engine::Postgres).add_column("member", &field),
            r#"ALTER TABLE "member" ADD COLUMN "orgId" text, ADD CONSTRAINT "fk_member_orgId" FOREIGN KEY ("orgId") REFERENCES "organization" ("id")"#
        );
        assert_eq!(
            builder(Engine::Sqlite).add_column("member", &field),
            r#"ALTER TABLE "member" ADD COLUMN "orgId" text REFERENCES "organization" ("id")"#
        );
    }

    #[test]
    fn test_add_unique_column() {
        let field = LogicalField::new("username", FieldType::String)
            .optional()
            .unique();
        assert_eq!(
            builder(Engine::Postgres).add_column("user", &field),
            r#"ALTER TABLE "user" ADD COLUMN "username" text UNIQUE"#
        );
        assert_eq!(
            builder(Engine::Sqlite).add_column("user", &field),
            r#"ALTER TABLE "user" ADD COLUMN "username" text"#
        );
        assert_eq!(
            builder(Engine::Sqlite).add_unique_index("user", "username"),
            r#"CREATE UNIQUE INDEX "uq_user_username" ON "user" ("username")"#
        );
        assert!(builder(Engine::MySql).adds_unique_columns_inline());
        assert!(!builder(Engine::Sqlite).adds_unique_columns_inline());
    }

    #[test]
    fn test_add_column_never_declares_a_primary_key() {
        let field = LogicalField::new("code", FieldType::String).primary_key();
        for engine in Engine::ALL {
            let sql = builder(engine).add_column("team", &field);
            assert!(!sql.contains("PRIMARY KEY"), "{}", sql);
            assert!(sql.ends_with("NOT NULL"), "{}", sql);
        }
    }

    #[test]
    fn test_add_foreign_key() {
        let reference = FieldReference::new("member", "id");
        assert_eq!(
            builder(Engine::MySql).add_foreign_key("team", "ownerId", &reference),
            Some(
                "ALTER TABLE `team` ADD CONSTRAINT `fk_team_ownerId` FOREIGN KEY (`ownerId`) REFERENCES `member` (`id`)"
                    .to_string()
            )
        );
        assert_eq!(
            builder(Engine::Sqlite).add_foreign_key("team", "ownerId", &reference),
            None
        );
    }

    #[test]
    fn test_reserved_words_are_quoted() {
        let fields = vec![LogicalField::new("order", FieldType::Number)];
        let sql = builder(Engine::Postgres).create_table("group", &fields);
        assert!(sql.starts_with(r#"CREATE TABLE "group" ("#));
        assert!(sql.contains(r#""order" integer NOT NULL"#));
    }

    #[test]
    fn test_eager_reference_validation() {
        assert!(builder(Engine::Postgres).validates_references_eagerly());
        assert!(builder(Engine::MySql).validates_references_eagerly());
        assert!(!builder(Engine::Sqlite).validates_references_eagerly());
        for engine in Engine::ALL {
            assert_eq!(builder(engine).engine(), engine);
        }
    }
}
