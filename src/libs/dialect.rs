//! Per-backend SQL differences: placeholders, identifier quoting, text casts
//! and the catalog queries used for introspection.

use crate::libs::error::{Error, Result};
use crate::libs::schema::{ColumnSchema, ValueKind};
use serde::Serialize;
use std::fmt;
use url::Url;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    Postgres,
    MySql,
    Sqlite,
}

impl DatabaseKind {
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(DatabaseKind::Postgres),
            "mysql" | "mariadb" => Ok(DatabaseKind::MySql),
            "sqlite" | "sqlite3" => Ok(DatabaseKind::Sqlite),
            _ => Err(Error::UnsupportedDatabase(tag.to_string())),
        }
    }

    pub fn from_url(url: &str) -> Result<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| Error::Config(format!("database_url is not a valid URL: {e}")))?;
        Self::from_tag(parsed.scheme())
    }

    pub fn placeholder(self, n: usize) -> String {
        match self {
            DatabaseKind::Postgres => format!("${n}"),
            DatabaseKind::MySql | DatabaseKind::Sqlite => "?".to_string(),
        }
    }

    pub fn quote_ident(self, name: &str) -> String {
        match self {
            DatabaseKind::MySql => format!("`{}`", name.replace('`', "``")),
            DatabaseKind::Postgres | DatabaseKind::Sqlite => {
                format!("\"{}\"", name.replace('"', "\"\""))
            }
        }
    }

    /// Select-list entry for a column. Values the generic driver cannot
    /// decode are cast to text and aliased back to the column name.
    pub fn select_expr(self, column: &ColumnSchema) -> String {
        let ident = self.quote_ident(&column.name);
        match (self, column.kind) {
            (DatabaseKind::Postgres, ValueKind::Other) => format!("CAST({ident} AS TEXT) AS {ident}"),
            (DatabaseKind::MySql, ValueKind::Other) => format!("CAST({ident} AS CHAR) AS {ident}"),
            _ => ident,
        }
    }

    /// Parameter expression for a value bound against `column`.
    pub fn bind_expr(self, n: usize, column: &ColumnSchema) -> String {
        let placeholder = self.placeholder(n);
        match (self, column.kind) {
            (DatabaseKind::Postgres, ValueKind::Other) => {
                format!("CAST({placeholder} AS {})", column.data_type)
            }
            _ => placeholder,
        }
    }

    /// Expression used when a column takes part in a text search.
    pub fn text_expr(self, column: &ColumnSchema) -> String {
        let ident = self.quote_ident(&column.name);
        match (self, column.kind) {
            (_, ValueKind::Text) => ident,
            (DatabaseKind::Postgres, _) => format!("CAST({ident} AS TEXT)"),
            (DatabaseKind::MySql, _) => format!("CAST({ident} AS CHAR)"),
            (DatabaseKind::Sqlite, _) => ident,
        }
    }

    pub fn like_operator(self) -> &'static str {
        match self {
            DatabaseKind::Postgres => "ILIKE",
            DatabaseKind::MySql | DatabaseKind::Sqlite => "LIKE",
        }
    }

    /// ESCAPE clause appended to every LIKE. MySQL already escapes with a
    /// backslash and would read `'\'` as an unterminated literal.
    pub fn like_escape(self) -> &'static str {
        match self {
            DatabaseKind::Postgres | DatabaseKind::Sqlite => " ESCAPE '\\'",
            DatabaseKind::MySql => "",
        }
    }

    pub fn list_tables_sql(self) -> &'static str {
        match self {
            DatabaseKind::Postgres => {
                "SELECT CAST(table_name AS TEXT) AS name FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
                 ORDER BY table_name"
            }
            DatabaseKind::MySql => {
                "SELECT CAST(TABLE_NAME AS CHAR) AS name FROM information_schema.TABLES \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' \
                 ORDER BY TABLE_NAME"
            }
            DatabaseKind::Sqlite => {
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
                 ORDER BY name"
            }
        }
    }

    /// Column catalog query. Takes the table name as its only parameter and
    /// yields `name, data_type, nullable, default_value, primary_key`.
    pub fn list_columns_sql(self) -> &'static str {
        match self {
            DatabaseKind::Postgres => {
                "SELECT CAST(a.attname AS TEXT) AS name, \
                 format_type(a.atttypid, a.atttypmod) AS data_type, \
                 NOT a.attnotnull AS nullable, \
                 pg_get_expr(d.adbin, d.adrelid) AS default_value, \
                 COALESCE(i.indisprimary, false) AS primary_key \
                 FROM pg_attribute a \
                 JOIN pg_class c ON c.oid = a.attrelid \
                 JOIN pg_namespace n ON n.oid = c.relnamespace \
                 LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum \
                 LEFT JOIN pg_index i ON i.indrelid = a.attrelid AND i.indisprimary \
                 AND a.attnum = ANY(i.indkey) \
                 WHERE c.relname = $1 AND n.nspname = current_schema() \
                 AND a.attnum > 0 AND NOT a.attisdropped \
                 ORDER BY a.attnum"
            }
            DatabaseKind::MySql => {
                "SELECT CAST(COLUMN_NAME AS CHAR) AS name, \
                 CAST(COLUMN_TYPE AS CHAR) AS data_type, \
                 IS_NULLABLE = 'YES' AS nullable, \
                 CAST(COLUMN_DEFAULT AS CHAR) AS default_value, \
                 COLUMN_KEY = 'PRI' AS primary_key \
                 FROM information_schema.COLUMNS \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
                 ORDER BY ORDINAL_POSITION"
            }
            DatabaseKind::Sqlite => {
                "SELECT name, type AS data_type, \"notnull\" = 0 AS nullable, \
                 dflt_value AS default_value, pk > 0 AS primary_key \
                 FROM pragma_table_info(?) ORDER BY cid"
            }
        }
    }
}

/// Escape the LIKE wildcards in a user search term so it matches literally.
pub fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DatabaseKind::Postgres => "postgres",
            DatabaseKind::MySql => "mysql",
            DatabaseKind::Sqlite => "sqlite",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{DatabaseKind, escape_like};
    use crate::libs::error::Error;
    use crate::libs::schema::ColumnSchema;

    #[test]
    fn tags_and_aliases() {
        assert_eq!(DatabaseKind::from_tag("PostgreSQL").unwrap(), DatabaseKind::Postgres);
        assert_eq!(DatabaseKind::from_tag("pg").unwrap(), DatabaseKind::Postgres);
        assert_eq!(DatabaseKind::from_tag("mariadb").unwrap(), DatabaseKind::MySql);
        assert_eq!(DatabaseKind::from_tag(" sqlite3 ").unwrap(), DatabaseKind::Sqlite);
        assert!(matches!(
            DatabaseKind::from_tag("oracle"),
            Err(Error::UnsupportedDatabase(tag)) if tag == "oracle"
        ));
    }

    #[test]
    fn kind_from_url_scheme() {
        assert_eq!(
            DatabaseKind::from_url("postgres://postgres@localhost:5432/app").unwrap(),
            DatabaseKind::Postgres
        );
        assert_eq!(
            DatabaseKind::from_url("mysql://root@localhost/app").unwrap(),
            DatabaseKind::MySql
        );
        assert_eq!(
            DatabaseKind::from_url("sqlite://data.db?mode=rwc").unwrap(),
            DatabaseKind::Sqlite
        );
        assert_eq!(DatabaseKind::from_url("sqlite::memory:").unwrap(), DatabaseKind::Sqlite);
        assert!(matches!(DatabaseKind::from_url("data.db"), Err(Error::Config(_))));
        assert!(matches!(
            DatabaseKind::from_url("oracle://scott@db/orcl"),
            Err(Error::UnsupportedDatabase(_))
        ));
    }

    #[test]
    fn placeholders_per_backend() {
        assert_eq!(DatabaseKind::Postgres.placeholder(3), "$3");
        assert_eq!(DatabaseKind::MySql.placeholder(3), "?");
        assert_eq!(DatabaseKind::Sqlite.placeholder(1), "?");
    }

    #[test]
    fn quoting_escapes_delimiters() {
        assert_eq!(DatabaseKind::Postgres.quote_ident("user"), "\"user\"");
        assert_eq!(DatabaseKind::Sqlite.quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(DatabaseKind::MySql.quote_ident("or`der"), "`or``der`");
    }

    #[test]
    fn casts_only_where_the_driver_needs_text() {
        let created = ColumnSchema::new("created_at", "timestamp without time zone");
        let id = ColumnSchema::new("id", "integer");
        assert_eq!(
            DatabaseKind::Postgres.select_expr(&created),
            "CAST(\"created_at\" AS TEXT) AS \"created_at\""
        );
        assert_eq!(
            DatabaseKind::MySql.select_expr(&created),
            "CAST(`created_at` AS CHAR) AS `created_at`"
        );
        assert_eq!(DatabaseKind::Sqlite.select_expr(&created), "\"created_at\"");
        assert_eq!(DatabaseKind::Postgres.select_expr(&id), "\"id\"");
        assert_eq!(
            DatabaseKind::Postgres.bind_expr(2, &created),
            "CAST($2 AS timestamp without time zone)"
        );
        assert_eq!(DatabaseKind::Postgres.bind_expr(2, &id), "$2");
        assert_eq!(DatabaseKind::MySql.bind_expr(2, &created), "?");
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("ada"), "ada");
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a_b\\c"), "a\\_b\\\\c");
        assert_eq!(DatabaseKind::Sqlite.like_escape(), " ESCAPE '\\'");
        assert_eq!(DatabaseKind::MySql.like_escape(), "");
    }
}
