//! SQL text helpers shared by the DDL builders.
//!
//! Identifiers are always quoted, using the engine's quote character, to avoid
//! trouble with reserved words like `user`, `order` or `group`.

use mend_schema::Engine;

/// An identifier wrapper for a given engine.
///
/// Display writes the value quoted, doubling any embedded quote character.
///
/// # Example
/// ```
/// use mend_schema::Engine;
/// use mend_sql::Ident;
/// assert_eq!(format!("{}", Ident(Engine::Postgres, "user")), "\"user\"");
/// assert_eq!(format!("{}", Ident(Engine::MySql, "user")), "`user`");
/// assert_eq!(format!("{}", Ident(Engine::Sqlite, "bla\"h")), "\"bla\"\"h\"");
/// ```
pub struct Ident<T: AsRef<str>>(pub Engine, pub T);

impl<T: AsRef<str>> std::fmt::Display for Ident<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let quote = quote_char(self.0);
        write!(f, "{}", quote)?;
        for c in self.1.as_ref().chars() {
            if c == quote {
                write!(f, "{}{}", quote, quote)?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "{}", quote)
    }
}

/// The identifier quote character of an engine.
pub fn quote_char(engine: Engine) -> char {
    match engine {
        Engine::MySql => '`',
        Engine::Postgres | Engine::Sqlite => '"',
    }
}

/// Quote an identifier for the given engine.
pub fn quote_ident(engine: Engine, name: &str) -> String {
    format!("{}", Ident(engine, name))
}

/// Maximum identifier length, if the engine enforces one.
pub fn max_ident_len(engine: Engine) -> Option<usize> {
    match engine {
        Engine::Postgres => Some(63),
        Engine::MySql => Some(64),
        Engine::Sqlite => None,
    }
}

/// Generate a deterministic foreign-key constraint name.
///
/// Uses the convention `fk_{table}_{column}`. Names that would exceed the
/// engine's identifier limit are truncated and suffixed with a stable hash of
/// the full name so that distinct constraints keep distinct names.
///
/// # Examples
///
/// ```
/// use mend_schema::Engine;
/// assert_eq!(mend_sql::foreign_key_name(Engine::Postgres, "session", "user_id"), "fk_session_user_id");
/// ```
pub fn foreign_key_name(engine: Engine, table: &str, column: &str) -> String {
    object_name(engine, "fk", table, column)
}

/// Generate a deterministic unique index name, `uq_{table}_{column}`,
/// shortened like [`foreign_key_name`].
pub fn unique_index_name(engine: Engine, table: &str, column: &str) -> String {
    object_name(engine, "uq", table, column)
}

fn object_name(engine: Engine, prefix: &str, table: &str, column: &str) -> String {
    let full = format!("{}_{}_{}", prefix, table, column);
    let Some(max_len) = max_ident_len(engine) else {
        return full;
    };
    if full.len() <= max_len {
        return full;
    }

    let hex = blake3::hash(full.as_bytes()).to_hex().to_string();
    let suffix = &hex[..12];
    // "_" between the truncated prefix and the hash
    let mut len = max_len.saturating_sub(suffix.len() + 1).min(full.len());
    while len > 0 && !full.is_char_boundary(len) {
        len -= 1;
    }
    format!("{}_{}", &full[..len], suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_escapes_quote_char() {
        assert_eq!(quote_ident(Engine::MySql, "we`ird"), "`we``ird`");
        assert_eq!(quote_ident(Engine::Postgres, "we`ird"), "\"we`ird\"");
    }

    #[test]
    fn test_foreign_key_name_short() {
        assert_eq!(
            foreign_key_name(Engine::MySql, "account", "userId"),
            "fk_account_userId"
        );
    }

    #[test]
    fn test_unique_index_name() {
        assert_eq!(
            unique_index_name(Engine::Sqlite, "user", "username"),
            "uq_user_username"
        );
        let long = unique_index_name(Engine::Postgres, &"a".repeat(70), "b");
        assert_eq!(long.len(), 63);
        assert!(long.starts_with("uq_aaa"));
    }

    #[test]
    fn test_foreign_key_name_truncates_long_names() {
        let table = "a".repeat(50);
        let column = "b".repeat(30);

        let pg = foreign_key_name(Engine::Postgres, &table, &column);
        assert_eq!(pg.len(), 63);
        assert!(pg.starts_with("fk_aaa"));

        let mysql = foreign_key_name(Engine::MySql, &table, &column);
        assert_eq!(mysql.len(), 64);

        // Deterministic
        assert_eq!(pg, foreign_key_name(Engine::Postgres, &table, &column));

        // SQLite has no limit
        let sqlite = foreign_key_name(Engine::Sqlite, &table, &column);
        assert_eq!(sqlite, format!("fk_{}_{}", table, column));
    }

    #[test]
    fn test_foreign_key_name_distinct_after_truncation() {
        let table = "t".repeat(60);
        let a = foreign_key_name(Engine::Postgres, &table, "first_column");
        let b = foreign_key_name(Engine::Postgres, &table, "second_column");
        assert_ne!(a, b);
    }
}
