//! Logical field types vs. native column types, per engine.

use mend_schema::{Engine, FieldType};

/// Maps logical field types to the native types of one engine.
pub trait TypeMapper: Send + Sync {
    fn engine(&self) -> Engine;

    /// Native type names (lower-case, no length suffix) that satisfy `field_type`.
    fn acceptable_native_types(&self, field_type: FieldType) -> &'static [&'static str];

    /// The engine-independent type name used to describe a field.
    fn canonical_native_type(&self, field_type: FieldType) -> &'static str {
        canonical_native_type(field_type)
    }

    /// The type spelled in `CREATE TABLE` / `ADD COLUMN`.
    fn column_type(&self, field_type: FieldType) -> &'static str {
        self.canonical_native_type(field_type)
    }

    /// Whether a native type reported by the database satisfies `field_type`.
    fn matches(&self, native: &str, field_type: FieldType) -> bool {
        let native = normalize_native_type(native);
        self.acceptable_native_types(field_type)
            .iter()
            .any(|t| *t == native)
    }
}

/// Engine-independent canonical names.
pub fn canonical_native_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::String => "text",
        FieldType::Number => "integer",
        FieldType::Boolean => "boolean",
        FieldType::Date => "date",
    }
}

/// Lower-case a native type name and drop any parenthesised length or
/// precision, e.g. `VARCHAR(255)` -> `varchar`,
/// `timestamp(3) with time zone` -> `timestamp with time zone`.
pub fn normalize_native_type(native: &str) -> String {
    let mut stripped = String::with_capacity(native.len());
    let mut depth = 0usize;
    for c in native.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => stripped.push(c),
            _ => {}
        }
    }
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub struct PostgresTypes;

impl TypeMapper for PostgresTypes {
    fn engine(&self) -> Engine {
        Engine::Postgres
    }

    fn acceptable_native_types(&self, field_type: FieldType) -> &'static [&'static str] {
        match field_type {
            FieldType::String => &["character varying", "varchar", "text"],
            FieldType::Number => &[
                "integer",
                "bigint",
                "smallint",
                "numeric",
                "real",
                "double precision",
            ],
            FieldType::Boolean => &["boolean"],
            FieldType::Date => &[
                "timestamp",
                "timestamp without time zone",
                "timestamp with time zone",
                "date",
            ],
        }
    }
}

pub struct MySqlTypes;

impl TypeMapper for MySqlTypes {
    fn engine(&self) -> Engine {
        Engine::MySql
    }

    fn acceptable_native_types(&self, field_type: FieldType) -> &'static [&'static str] {
        match field_type {
            FieldType::String => &["varchar", "text"],
            FieldType::Number => &[
                "integer", "int", "bigint", "smallint", "decimal", "float", "double",
            ],
            FieldType::Boolean => &["boolean", "tinyint"],
            FieldType::Date => &["date", "datetime", "timestamp"],
        }
    }

    // TEXT columns cannot be indexed without a prefix length, which rules them
    // out for primary keys, unique constraints and foreign keys.
    fn column_type(&self, field_type: FieldType) -> &'static str {
        match field_type {
            FieldType::String => "varchar(255)",
            other => canonical_native_type(other),
        }
    }
}

pub struct SqliteTypes;

impl TypeMapper for SqliteTypes {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    fn acceptable_native_types(&self, field_type: FieldType) -> &'static [&'static str] {
        match field_type {
            FieldType::String => &["text", "varchar"],
            FieldType::Number => &["integer", "real"],
            FieldType::Boolean => &["integer", "boolean"],
            FieldType::Date => &["date", "integer"],
        }
    }
}

static POSTGRES: PostgresTypes = PostgresTypes;
static MYSQL: MySqlTypes = MySqlTypes;
static SQLITE: SqliteTypes = SqliteTypes;

/// The type mapper for an engine.
pub fn type_mapper(engine: Engine) -> &'static dyn TypeMapper {
    match engine {
        Engine::Postgres => &POSTGRES,
        Engine::MySql => &MYSQL,
        Engine::Sqlite => &SQLITE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_native_type() {
        assert_eq!(normalize_native_type("VARCHAR(255)"), "varchar");
        assert_eq!(normalize_native_type("  Text "), "text");
        assert_eq!(
            normalize_native_type("timestamp(3) WITH  time zone"),
            "timestamp with time zone"
        );
        assert_eq!(normalize_native_type("numeric(10, 2)"), "numeric");
    }

    #[test]
    fn test_canonical_and_column_types_match_on_every_engine() {
        for engine in Engine::ALL {
            let mapper = type_mapper(engine);
            assert_eq!(mapper.engine(), engine);
            for field_type in FieldType::ALL {
                let canonical = mapper.canonical_native_type(field_type);
                assert!(
                    mapper.matches(canonical, field_type),
                    "{engine}: canonical {canonical} does not match {field_type}"
                );
                let column = mapper.column_type(field_type);
                assert!(
                    mapper.matches(column, field_type),
                    "{engine}: column type {column} does not match {field_type}"
                );
            }
        }
    }

    #[test]
    fn test_integer_backed_booleans() {
        assert!(type_mapper(Engine::MySql).matches("tinyint", FieldType::Boolean));
        assert!(type_mapper(Engine::MySql).matches("TINYINT(1)", FieldType::Boolean));
        assert!(type_mapper(Engine::Sqlite).matches("INTEGER", FieldType::Boolean));
        assert!(!type_mapper(Engine::Postgres).matches("integer", FieldType::Boolean));
    }

    #[test]
    fn test_mismatches() {
        let pg = type_mapper(Engine::Postgres);
        assert!(!pg.matches("text", FieldType::Number));
        assert!(!pg.matches("jsonb", FieldType::String));
        assert!(pg.matches("character varying(64)", FieldType::String));
        assert!(pg.matches("timestamp with time zone", FieldType::Date));
        assert!(!type_mapper(Engine::MySql).matches("character varying", FieldType::String));
    }

    #[test]
    fn test_mysql_spells_strings_as_varchar() {
        assert_eq!(type_mapper(Engine::MySql).column_type(FieldType::String), "varchar(255)");
        assert_eq!(type_mapper(Engine::MySql).canonical_native_type(FieldType::String), "text");
        assert_eq!(type_mapper(Engine::Postgres).column_type(FieldType::String), "text");
    }

    fn engine_strategy() -> impl Strategy<Value = Engine> {
        prop::sample::select(Engine::ALL.to_vec())
    }

    fn field_type_strategy() -> impl Strategy<Value = FieldType> {
        prop::sample::select(FieldType::ALL.to_vec())
    }

    proptest! {
        /// Any acceptable type still matches after arbitrary case changes,
        /// padding and a length suffix.
        #[test]
        fn prop_matching_ignores_case_and_suffix(
            engine in engine_strategy(),
            field_type in field_type_strategy(),
            pick in any::<prop::sample::Index>(),
            upper in prop::collection::vec(any::<bool>(), 32),
            len in 1u32..1000,
        ) {
            let mapper = type_mapper(engine);
            let accepted = mapper.acceptable_native_types(field_type);
            let base = accepted[pick.index(accepted.len())];
            let cased: String = base
                .chars()
                .enumerate()
                .map(|(i, c)| if upper[i % upper.len()] { c.to_ascii_uppercase() } else { c })
                .collect();
            let native = format!(" {cased}({len}) ");
            prop_assert!(mapper.matches(&native, field_type));
        }
    }
}
