use crate::libs::error::{Error, Result};
use crate::libs::orm::OrmStruct;
use crate::libs::query_builder::Direction;
use crate::libs::record::{Record, coerce_input};
use crate::libs::schema::{ColumnSchema, TableSchema, ValueKind};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Form field carrying the key of the row being edited.
pub const ORIGINAL_KEY_FIELD: &str = "__key";

#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub page: u64,
    pub per_page: u64,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub dir: Direction,
}

#[derive(Debug, Clone, Serialize)]
pub struct RowPage {
    pub table: String,
    pub columns: Vec<ColumnSchema>,
    pub key_column: Option<String>,
    pub rows: Vec<Record>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
    pub descending: bool,
}

impl RowPage {
    pub fn page_count(&self) -> u64 {
        self.total.div_ceil(self.per_page.max(1)).max(1)
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.page_count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RowForm {
    pub table: String,
    pub columns: Vec<ColumnSchema>,
    pub values: Record,
    /// Key of the row being edited; `None` for a blank create form.
    pub key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Inserted(Option<Value>),
    Updated(Value),
}

impl UpsertOutcome {
    pub fn key(&self) -> Option<&Value> {
        match self {
            UpsertOutcome::Inserted(key) => key.as_ref(),
            UpsertOutcome::Updated(key) => Some(key),
        }
    }
}

/// CRUD over one table whose columns were discovered at runtime.
pub struct Table {
    orm: OrmStruct,
    schema: TableSchema,
}

impl Table {
    /// Introspect `name` and bind it to `orm`. Unknown tables are `NotFound`.
    pub async fn open(orm: &OrmStruct, name: &str) -> Result<Self> {
        let known = orm.tables().await?;
        if !known.iter().any(|t| t == name) {
            return Err(Error::not_found(format!("table `{name}`")));
        }
        let schema = orm.table_schema(name).await?;
        Ok(Self::with_schema(orm.clone(), schema))
    }

    pub fn with_schema(orm: OrmStruct, schema: TableSchema) -> Self {
        Self { orm, schema }
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.schema.columns
    }

    /// Parse a key from a URL or form into the value bound against the key
    /// column.
    pub fn parse_key(&self, raw: &str) -> Result<Value> {
        let key_col = self.schema.key_column().ok_or_else(|| {
            Error::invalid(format!(
                "table `{}` has no single-column primary key",
                self.schema.name
            ))
        })?;
        if raw.is_empty() {
            return Err(Error::invalid("key must not be empty"));
        }
        coerce_input(key_col, raw)
    }

    pub async fn list(&self, params: &ListParams) -> Result<RowPage> {
        let page = params.page.max(1);
        let per_page = params.per_page.max(1);
        let search = params
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let mut query = self.orm.query(&self.schema);
        if let Some(term) = search {
            query = query.search(&self.schema.columns.iter().collect::<Vec<_>>(), term);
        }
        let total = query.count().await?;

        let sort = match &params.sort {
            Some(column) if !column.is_empty() => Some(column.clone()),
            _ => self.schema.key_column().map(|c| c.name.clone()),
        };
        if let Some(column) = &sort {
            query = query.order_by(column, params.dir)?;
        }
        let rows = query
            .limit(per_page)
            .offset((page - 1).saturating_mul(per_page))
            .fetch_all()
            .await?;

        Ok(RowPage {
            table: self.schema.name.clone(),
            columns: self.schema.columns.clone(),
            key_column: self.schema.key_column().map(|c| c.name.clone()),
            rows,
            page,
            per_page,
            total,
            search: search.map(str::to_string),
            sort,
            descending: params.dir == Direction::Desc,
        })
    }

    pub async fn get(&self, key: &str) -> Result<Record> {
        let key_value = self.parse_key(key)?;
        let key_col = self
            .schema
            .key_column()
            .map(|c| c.name.clone())
            .unwrap_or_default();
        self.orm
            .first(&self.schema, &key_col, key_value)
            .await?
            .ok_or_else(|| Error::not_found(format!("row {key} in `{}`", self.schema.name)))
    }

    /// Values for the create form (`key == None`) or the edit form.
    pub async fn form(&self, key: Option<&str>) -> Result<RowForm> {
        let (values, key) = match key.filter(|k| !k.is_empty()) {
            Some(key) => (self.get(key).await?, Some(key.to_string())),
            None => (Record::new(), None),
        };
        Ok(RowForm {
            table: self.schema.name.clone(),
            columns: self.schema.columns.clone(),
            values,
            key,
        })
    }

    /// Turn submitted form fields into a typed record. Unchecked checkboxes
    /// are absent from a form body, so booleans default to false. An empty
    /// primary key field counts as absent: the key is then generated on
    /// insert and left alone on update.
    pub fn record_from_input(&self, input: &BTreeMap<String, String>) -> Result<Record> {
        let mut record = Record::new();
        for (name, raw) in input {
            if name == ORIGINAL_KEY_FIELD {
                continue;
            }
            let column = self
                .schema
                .column(name)
                .ok_or_else(|| Error::invalid(format!("unknown column `{name}`")))?;
            if column.primary && raw.trim().is_empty() {
                continue;
            }
            record.insert(name.clone(), coerce_input(column, raw)?);
        }
        for column in &self.schema.columns {
            if column.kind == ValueKind::Boolean
                && !column.primary
                && !record.contains_key(&column.name)
            {
                record.insert(column.name.clone(), Value::Bool(false));
            }
        }
        Ok(record)
    }

    /// Update the row named by `__key` (or by the submitted key when that row
    /// exists), otherwise insert a new one.
    pub async fn upsert(&self, input: &BTreeMap<String, String>) -> Result<UpsertOutcome> {
        let record = self.record_from_input(input)?;
        let Some(key_col) = self.schema.key_column() else {
            let key = self.orm.insert(&self.schema, &record).await?;
            return Ok(UpsertOutcome::Inserted(key));
        };

        let original = match input.get(ORIGINAL_KEY_FIELD).filter(|k| !k.is_empty()) {
            Some(raw) => Some(self.parse_key(raw)?),
            None => match record.get(&key_col.name).filter(|v| !v.is_null()) {
                Some(v) => {
                    if self.orm.exists(&self.schema, v).await? {
                        Some(v.clone())
                    } else {
                        None
                    }
                }
                None => None,
            },
        };

        match original {
            Some(key) => {
                self.orm.update(&self.schema, &key, &record).await?;
                let new_key = record
                    .get(&key_col.name)
                    .filter(|v| !v.is_null())
                    .cloned()
                    .unwrap_or(key);
                tracing::info!(table = %self.schema.name, key = %new_key, "row updated");
                Ok(UpsertOutcome::Updated(new_key))
            }
            None => {
                let key = self.orm.insert(&self.schema, &record).await?;
                tracing::info!(table = %self.schema.name, key = ?key, "row inserted");
                Ok(UpsertOutcome::Inserted(key))
            }
        }
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        let key_value = self.parse_key(key)?;
        self.orm.delete(&self.schema, &key_value).await?;
        tracing::info!(table = %self.schema.name, key, "row deleted");
        Ok(())
    }
}
