//! Target dialect identity and capabilities.
//!
//! Behavior that varies by database system is expressed as a capability
//! descriptor computed once per connection. The planner and executor branch
//! on capabilities, never on dialect names, so supporting a new dialect is a
//! data addition rather than scattered string comparisons.

use serde::{Deserialize, Serialize};

use crate::error::{CorrectError, Result};

/// What a dialect can and cannot do, as far as plan generation cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialectCaps {
    /// Foreign keys can be added to an existing table via ALTER TABLE.
    pub alter_add_foreign_key: bool,
    /// Session-level lock/statement timeouts can be set before executing.
    pub session_timeouts: bool,
    /// New foreign keys accept a deferred-validation clause (`NOT VALID`).
    pub deferred_fk_validation: bool,
}

/// A supported database dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dialect {
    /// PostgreSQL-family databases.
    Postgres,
    /// SQLite-family databases.
    Sqlite,
}

impl Dialect {
    /// Resolves the dialect from a connection URL scheme.
    ///
    /// # Errors
    ///
    /// Returns [`CorrectError::UnsupportedUrl`] when the scheme matches no
    /// supported dialect.
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url.split(':').next().unwrap_or_default();
        match scheme {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "sqlite" => Ok(Self::Sqlite),
            _ => Err(CorrectError::UnsupportedUrl {
                url: url.to_string(),
            }),
        }
    }

    /// Returns the dialect name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }

    /// Returns the capability descriptor for this dialect.
    #[must_use]
    pub fn caps(&self) -> DialectCaps {
        match self {
            Self::Postgres => DialectCaps {
                alter_add_foreign_key: true,
                session_timeouts: true,
                deferred_fk_validation: true,
            },
            Self::Sqlite => DialectCaps {
                alter_add_foreign_key: false,
                session_timeouts: false,
                deferred_fk_validation: false,
            },
        }
    }

    /// Quotes an identifier (table, column, index or constraint name).
    #[must_use]
    pub fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Returns whether a configured schema name applies to this dialect.
    ///
    /// SQLite has no schemas in the PostgreSQL sense; a configured schema
    /// name is accepted but ignored there.
    #[must_use]
    pub fn uses_schemas(&self) -> bool {
        matches!(self, Self::Postgres)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_url() {
        assert_eq!(
            Dialect::from_url("postgres://localhost/db").unwrap(),
            Dialect::Postgres
        );
        assert_eq!(
            Dialect::from_url("postgresql://localhost/db").unwrap(),
            Dialect::Postgres
        );
        assert_eq!(
            Dialect::from_url("sqlite:db.sqlite3").unwrap(),
            Dialect::Sqlite
        );
        assert!(matches!(
            Dialect::from_url("mysql://localhost/db"),
            Err(CorrectError::UnsupportedUrl { .. })
        ));
    }

    #[test]
    fn test_caps() {
        let pg = Dialect::Postgres.caps();
        assert!(pg.alter_add_foreign_key);
        assert!(pg.session_timeouts);
        assert!(pg.deferred_fk_validation);

        let lite = Dialect::Sqlite.caps();
        assert!(!lite.alter_add_foreign_key);
        assert!(!lite.session_timeouts);
        assert!(!lite.deferred_fk_validation);
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(Dialect::Postgres.quote_identifier("users"), "\"users\"");
        assert_eq!(
            Dialect::Sqlite.quote_identifier("we\"ird"),
            "\"we\"\"ird\""
        );
    }
}
