use crate::libs::config::AppConfig;
use crate::libs::dialect::DatabaseKind;
use crate::libs::error::{Error, Result};
use crate::libs::query_builder::QueryBuilder;
use crate::libs::record::{Record, bind_value, decode_flag, decode_row};
use crate::libs::schema::{ColumnSchema, TableSchema, ValueKind};
use serde_json::Value;
use sqlx::any::{Any, AnyArguments, AnyPoolOptions, AnyQueryResult};
use sqlx::query::Query;
use sqlx::{AnyPool, Row};
use url::Url;
use uuid::Uuid;

/// Connection handle shared by every request. Cloning is cheap: the pool is
/// reference counted.
#[derive(Clone)]
pub struct OrmStruct {
    pub database_url: String,
    kind: DatabaseKind,
    pool: AnyPool,
}

impl OrmStruct {
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let kind = config.database_kind()?;
        sqlx::any::install_default_drivers();
        tracing::info!(%kind, max_connections = config.max_connections, "connecting");
        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .map_err(|source| Error::Connection {
                url: redact(&config.database_url),
                source,
            })?;
        Ok(Self {
            database_url: config.database_url.clone(),
            kind,
            pool,
        })
    }

    pub fn kind(&self) -> DatabaseKind {
        self.kind
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // -------- Introspection --------
    pub async fn tables(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(self.kind.list_tables_sql())
            .fetch_all(&self.pool)
            .await?;
        let mut names = Vec::with_capacity(rows.len());
        for row in rows {
            names.push(row.try_get::<String, _>(0)?);
        }
        Ok(names)
    }

    pub async fn table_schema(&self, table: &str) -> Result<TableSchema> {
        let rows = sqlx::query(self.kind.list_columns_sql())
            .bind(table.to_string())
            .fetch_all(&self.pool)
            .await?;
        if rows.is_empty() {
            return Err(Error::not_found(format!("table `{table}`")));
        }
        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get(0)?;
            let data_type: Option<String> = row.try_get(1)?;
            let default_value: Option<String> = row.try_get(3)?;
            let data_type = data_type.unwrap_or_default();
            columns.push(ColumnSchema {
                name,
                kind: ValueKind::classify(&data_type),
                data_type,
                nullable: decode_flag(&row, 2),
                primary: decode_flag(&row, 4),
                default_value,
            });
        }
        tracing::debug!(table, columns = columns.len(), "introspected");
        Ok(TableSchema::new(table, columns))
    }

    pub fn query<'a>(&'a self, schema: &'a TableSchema) -> QueryBuilder<'a> {
        QueryBuilder::new(schema, self.kind, &self.pool)
    }

    fn key_of(schema: &TableSchema) -> Result<&ColumnSchema> {
        schema.key_column().ok_or_else(|| {
            Error::invalid(format!(
                "table `{}` has no single-column primary key",
                schema.name
            ))
        })
    }

    // -------- Read --------
    pub async fn first(
        &self,
        schema: &TableSchema,
        column: &str,
        value: Value,
    ) -> Result<Option<Record>> {
        match self.query(schema).where_eq(column, value)?.fetch_one().await {
            Ok(record) => Ok(Some(record)),
            Err(Error::Sql(sqlx::Error::RowNotFound)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn get_all(&self, schema: &TableSchema) -> Result<Vec<Record>> {
        self.query(schema).fetch_all().await
    }

    pub async fn exists(&self, schema: &TableSchema, key: &Value) -> Result<bool> {
        let key_col = Self::key_of(schema)?;
        let total = self
            .query(schema)
            .where_eq(&key_col.name, key.clone())?
            .count()
            .await?;
        Ok(total > 0)
    }

    // -------- Insert a record --------
    /// Insert `record` and return its key when it can be determined.
    pub async fn insert(&self, schema: &TableSchema, record: &Record) -> Result<Option<Value>> {
        let mut record = record.clone();
        if let Some(key_col) = schema.key_column() {
            let missing = record.get(&key_col.name).is_none_or(Value::is_null);
            if missing && key_col.is_textual() {
                record.insert(
                    key_col.name.clone(),
                    Value::String(Uuid::new_v4().to_string()),
                );
            }
        }

        let plan = insert_statement(self.kind, schema, &record)?;
        tracing::debug!(sql = %plan.statement.sql, "insert");
        let query = plan.statement.query();
        if plan.returning {
            let row = query.fetch_one(&self.pool).await?;
            return Ok(decode_row(&row).into_iter().next().map(|(_, v)| v));
        }
        let result = query.execute(&self.pool).await?;

        let key = match plan.known_key {
            Some(v) => Some(v),
            None if schema.key_column().is_some() => result.last_insert_id().map(Value::from),
            None => None,
        };
        Ok(key)
    }

    // -------- Update record --------
    pub async fn update(&self, schema: &TableSchema, key: &Value, record: &Record) -> Result<()> {
        let statement = update_statement(self.kind, schema, key, record)?;
        tracing::debug!(sql = %statement.sql, "update");
        let result = statement.query().execute(&self.pool).await?;
        // MySQL reports changed rows, so an identical update affects zero
        if result.rows_affected() == 0 && !self.exists(schema, key).await? {
            return Err(Error::not_found(format!("row {key} in `{}`", schema.name)));
        }
        Ok(())
    }

    // -------- Delete record --------
    pub async fn delete(&self, schema: &TableSchema, key: &Value) -> Result<()> {
        let statement = delete_statement(self.kind, schema, key)?;
        tracing::debug!(sql = %statement.sql, "delete");
        let result = statement.query().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("row {key} in `{}`", schema.name)));
        }
        Ok(())
    }

    // -------- Execute raw SQL --------
    pub async fn raw(&self, sql: &str) -> Result<AnyQueryResult> {
        Ok(sqlx::query(sql).execute(&self.pool).await?)
    }
}

/// SQL text plus its parameters, each tagged with the kind of the column it
/// is bound against.
#[derive(Debug, Clone, PartialEq)]
struct Statement {
    sql: String,
    params: Vec<(ValueKind, Value)>,
}

impl Statement {
    fn query(&self) -> Query<'_, Any, AnyArguments<'_>> {
        let mut query = sqlx::query(&self.sql);
        for (kind, value) in &self.params {
            query = bind_value(query, *kind, value);
        }
        query
    }
}

#[derive(Debug)]
struct InsertPlan {
    statement: Statement,
    /// The generated key comes back as a row (Postgres `RETURNING`).
    returning: bool,
    /// Key supplied by the caller, if any.
    known_key: Option<Value>,
}

fn check_columns(schema: &TableSchema, record: &Record) -> Result<()> {
    match record.keys().find(|name| schema.column(name).is_none()) {
        Some(name) => Err(Error::InvalidIdentifier(name.to_string())),
        None => Ok(()),
    }
}

fn insert_statement(
    kind: DatabaseKind,
    schema: &TableSchema,
    record: &Record,
) -> Result<InsertPlan> {
    check_columns(schema, record)?;
    let mut cols = Vec::new();
    let mut exprs = Vec::new();
    let mut params = Vec::new();
    for c in &schema.columns {
        if let Some(v) = record.get(&c.name) {
            // leave NULL keys to the database's own sequence
            if c.primary && v.is_null() {
                continue;
            }
            cols.push(kind.quote_ident(&c.name));
            exprs.push(kind.bind_expr(params.len() + 1, c));
            params.push((c.kind, v.clone()));
        }
    }

    let table = kind.quote_ident(&schema.name);
    let mut sql = if cols.is_empty() {
        match kind {
            DatabaseKind::MySql => format!("INSERT INTO {table} () VALUES ()"),
            DatabaseKind::Postgres | DatabaseKind::Sqlite => {
                format!("INSERT INTO {table} DEFAULT VALUES")
            }
        }
    } else {
        format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            cols.join(", "),
            exprs.join(", ")
        )
    };

    let key_col = schema.key_column();
    let known_key = key_col
        .and_then(|c| record.get(&c.name))
        .filter(|v| !v.is_null())
        .cloned();
    // Postgres has no last insert id; ask for the generated key instead
    let returning = match (kind, key_col, &known_key) {
        (DatabaseKind::Postgres, Some(key_col), None) => {
            sql = format!("{sql} RETURNING {}", kind.select_expr(key_col));
            true
        }
        _ => false,
    };
    Ok(InsertPlan {
        statement: Statement { sql, params },
        returning,
        known_key,
    })
}

fn update_statement(
    kind: DatabaseKind,
    schema: &TableSchema,
    key: &Value,
    record: &Record,
) -> Result<Statement> {
    let key_col = OrmStruct::key_of(schema)?;
    check_columns(schema, record)?;
    let mut sets = Vec::new();
    let mut params = Vec::new();
    for col in &schema.columns {
        if let Some(value) = record.get(&col.name) {
            sets.push(format!(
                "{} = {}",
                kind.quote_ident(&col.name),
                kind.bind_expr(params.len() + 1, col)
            ));
            params.push((col.kind, value.clone()));
        }
    }
    if sets.is_empty() {
        return Err(Error::invalid("nothing to update"));
    }
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = {}",
        kind.quote_ident(&schema.name),
        sets.join(", "),
        kind.quote_ident(&key_col.name),
        kind.bind_expr(params.len() + 1, key_col)
    );
    params.push((key_col.kind, key.clone()));
    Ok(Statement { sql, params })
}

fn delete_statement(kind: DatabaseKind, schema: &TableSchema, key: &Value) -> Result<Statement> {
    let key_col = OrmStruct::key_of(schema)?;
    Ok(Statement {
        sql: format!(
            "DELETE FROM {} WHERE {} = {}",
            kind.quote_ident(&schema.name),
            kind.quote_ident(&key_col.name),
            kind.bind_expr(1, key_col)
        ),
        params: vec![(key_col.kind, key.clone())],
    })
}

/// Hide credentials in a connection string before it reaches logs or error
/// messages: the userinfo password and password-like query parameters.
pub fn redact(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return "<unparseable database url>".to_string();
    };
    if parsed.password().is_some() {
        let _ = parsed.set_password(Some("***"));
    }
    let secret = |name: &str| {
        matches!(
            name.to_ascii_lowercase().as_str(),
            "password" | "pass" | "pwd" | "sslpassword"
        )
    };
    if parsed.query_pairs().any(|(name, _)| secret(&name)) {
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(name, value)| {
                let value = if secret(&name) {
                    "***".to_string()
                } else {
                    value.into_owned()
                };
                (name.into_owned(), value)
            })
            .collect();
        parsed
            .query_pairs_mut()
            .clear()
            .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    parsed.to_string()
}
