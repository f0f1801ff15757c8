use crate::libs::dialect::{DatabaseKind, escape_like};
use crate::libs::error::{Error, Result};
use crate::libs::record::{Record, bind_value, decode_row};
use crate::libs::schema::{ColumnSchema, TableSchema, ValueKind};
use serde_json::Value;
use sqlx::{AnyPool, Row};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            _ => Err(Error::invalid(format!("sort direction must be asc or desc, got `{raw}`"))),
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// SELECT builder over one introspected table. Column names are checked
/// against the schema and values are always bound.
pub struct QueryBuilder<'a> {
    schema: &'a TableSchema,
    kind: DatabaseKind,
    pool: &'a AnyPool,
    selects: Vec<&'a ColumnSchema>,
    wheres: Vec<String>,
    order_clause: Option<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    params: Vec<(ValueKind, Value)>,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(schema: &'a TableSchema, kind: DatabaseKind, pool: &'a AnyPool) -> Self {
        Self {
            schema,
            kind,
            pool,
            selects: schema.columns.iter().collect(),
            wheres: vec![],
            order_clause: None,
            limit: None,
            offset: None,
            params: Vec::new(),
        }
    }

    fn column(&self, name: &str) -> Result<&'a ColumnSchema> {
        self.schema
            .column(name)
            .ok_or_else(|| Error::InvalidIdentifier(name.to_string()))
    }

    pub fn select(mut self, columns: &[&str]) -> Result<Self> {
        let mut selects = Vec::with_capacity(columns.len());
        for name in columns {
            selects.push(self.column(name)?);
        }
        self.selects = selects;
        Ok(self)
    }

    pub fn where_eq(mut self, column: &str, value: Value) -> Result<Self> {
        let col = self.column(column)?;
        let expr = self.kind.bind_expr(self.params.len() + 1, col);
        self.wheres
            .push(format!("{} = {}", self.kind.quote_ident(&col.name), expr));
        self.params.push((col.kind, value));
        Ok(self)
    }

    /// Match `term` anywhere inside any of `columns`.
    pub fn search(mut self, columns: &[&ColumnSchema], term: &str) -> Self {
        if columns.is_empty() || term.is_empty() {
            return self;
        }
        let pattern = format!("%{}%", escape_like(term));
        let mut conds = Vec::with_capacity(columns.len());
        for col in columns {
            conds.push(format!(
                "{} {} {}{}",
                self.kind.text_expr(col),
                self.kind.like_operator(),
                self.kind.placeholder(self.params.len() + 1),
                self.kind.like_escape()
            ));
            self.params.push((ValueKind::Text, Value::String(pattern.clone())));
        }
        self.wheres.push(format!("({})", conds.join(" OR ")));
        self
    }

    pub fn order_by(mut self, column: &str, direction: Direction) -> Result<Self> {
        let col = self.column(column)?;
        self.order_clause = Some(format!(
            "ORDER BY {} {}",
            self.kind.quote_ident(&col.name),
            direction.as_sql()
        ));
        Ok(self)
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    fn where_sql(&self) -> String {
        if self.wheres.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.wheres.join(" AND "))
        }
    }

    pub fn build_sql(&self) -> String {
        let selects: Vec<String> = self
            .selects
            .iter()
            .map(|c| self.kind.select_expr(c))
            .collect();
        let mut sql = format!(
            "SELECT {} FROM {}",
            selects.join(", "),
            self.kind.quote_ident(&self.schema.name)
        );
        sql += &self.where_sql();
        if let Some(order) = &self.order_clause {
            sql += &format!(" {order}");
        }
        // backends reject LIMIT and OFFSET values past a signed 64-bit integer
        let clamp = |n: u64| n.min(i64::MAX as u64);
        match (self.limit.map(clamp), self.offset.map(clamp)) {
            (Some(limit), Some(offset)) => sql += &format!(" LIMIT {limit} OFFSET {offset}"),
            (Some(limit), None) => sql += &format!(" LIMIT {limit}"),
            // MySQL and SQLite reject OFFSET without LIMIT
            (None, Some(offset)) => sql += &format!(" LIMIT {} OFFSET {offset}", i64::MAX),
            (None, None) => {}
        }
        sql
    }

    pub fn build_count_sql(&self) -> String {
        format!(
            "SELECT COUNT(*) AS total FROM {}{}",
            self.kind.quote_ident(&self.schema.name),
            self.where_sql()
        )
    }

    pub async fn fetch_all(&self) -> Result<Vec<Record>> {
        let sql = self.build_sql();
        tracing::debug!(%sql, params = self.params.len(), "select");
        let mut query = sqlx::query(&sql);
        for (kind, value) in &self.params {
            query = bind_value(query, *kind, value);
        }
        let rows = query.fetch_all(self.pool).await?;
        Ok(rows.iter().map(decode_row).collect())
    }

    pub async fn fetch_one(self) -> Result<Record> {
        self.limit(1)
            .fetch_all()
            .await?
            .into_iter()
            .next()
            .ok_or(Error::Sql(sqlx::Error::RowNotFound))
    }

    pub async fn count(&self) -> Result<u64> {
        let sql = self.build_count_sql();
        tracing::debug!(%sql, params = self.params.len(), "count");
        let mut query = sqlx::query(&sql);
        for (kind, value) in &self.params {
            query = bind_value(query, *kind, value);
        }
        let row = query.fetch_one(self.pool).await?;
        let total: i64 = row.try_get(0)?;
        Ok(total.max(0) as u64)
    }
}
