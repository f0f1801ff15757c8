use serde::Serialize;

/// How a column's values travel through the generic driver.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Integer,
    Float,
    Boolean,
    Text,
    /// Dates, decimals, json, enums and anything else the generic driver
    /// cannot decode natively. Carried as text.
    Other,
}

impl ValueKind {
    /// Classify a declared column type such as `integer`, `varchar(255)` or
    /// `timestamp without time zone`.
    pub fn classify(data_type: &str) -> Self {
        let t = data_type.trim().to_ascii_lowercase();
        if t.is_empty() {
            // SQLite columns declared without a type
            return ValueKind::Other;
        }
        if t == "tinyint(1)" || t.starts_with("bool") || t == "bit(1)" {
            return ValueKind::Boolean;
        }
        if t.contains("interval") || t.contains("point") || t.ends_with("[]") {
            return ValueKind::Other;
        }
        if t.contains("int") || t.contains("serial") {
            return ValueKind::Integer;
        }
        if t.starts_with("real")
            || t.starts_with("double")
            || t.starts_with("float")
        {
            return ValueKind::Float;
        }
        if t.contains("char") || t.contains("text") || t.contains("clob") || t == "name" {
            return ValueKind::Text;
        }
        ValueKind::Other
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub kind: ValueKind,
    pub nullable: bool,
    pub primary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let data_type = data_type.into();
        Self {
            name: name.into(),
            kind: ValueKind::classify(&data_type),
            data_type,
            nullable: true,
            primary: false,
            default_value: None,
        }
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }

    pub fn is_textual(&self) -> bool {
        self.kind == ValueKind::Text
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSchema>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The single primary key column. Tables without a key, or with a
    /// composite one, cannot be edited row by row.
    pub fn key_column(&self) -> Option<&ColumnSchema> {
        let mut keys = self.columns.iter().filter(|c| c.primary);
        match (keys.next(), keys.next()) {
            (Some(key), None) => Some(key),
            _ => None,
        }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn text_columns(&self) -> Vec<&ColumnSchema> {
        self.columns.iter().filter(|c| c.is_textual()).collect()
    }
}
