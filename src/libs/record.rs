use crate::libs::error::{Error, Result};
use crate::libs::schema::{ColumnSchema, ValueKind};
use serde_json::{Map, Number, Value};
use sqlx::any::{Any, AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{Column, Row};

/// A row whose shape is only known at runtime: column name to value.
pub type Record = Map<String, Value>;

/// Decode every column of a row into a [`Record`].
pub fn decode_row(row: &AnyRow) -> Record {
    let mut map = Map::new();
    for col in row.columns() {
        let idx = col.ordinal();
        map.insert(col.name().to_string(), decode_value(row, idx));
    }
    map
}

fn decode_value(row: &AnyRow, idx: usize) -> Value {
    match row.try_get::<Option<i64>, _>(idx) {
        Ok(Some(v)) => return Value::from(v),
        Ok(None) => return Value::Null,
        Err(_) => {}
    }
    match row.try_get::<Option<f64>, _>(idx) {
        Ok(Some(v)) => return Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null),
        Ok(None) => return Value::Null,
        Err(_) => {}
    }
    match row.try_get::<Option<bool>, _>(idx) {
        Ok(Some(v)) => return Value::from(v),
        Ok(None) => return Value::Null,
        Err(_) => {}
    }
    match row.try_get::<Option<String>, _>(idx) {
        Ok(Some(v)) => return Value::from(v),
        Ok(None) => return Value::Null,
        Err(_) => {}
    }
    match row.try_get::<Option<Vec<u8>>, _>(idx) {
        Ok(Some(v)) => Value::from(String::from_utf8_lossy(&v).into_owned()),
        _ => Value::Null,
    }
}

/// Read a catalog flag that some backends return as a boolean and others as
/// an integer.
pub fn decode_flag(row: &AnyRow, idx: usize) -> bool {
    match decode_value(row, idx) {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_i64().is_some_and(|v| v != 0),
        Value::String(s) => matches!(s.as_str(), "1" | "t" | "true" | "YES"),
        _ => false,
    }
}

/// Convert a raw form field into the typed value bound for `column`.
pub fn coerce_input(column: &ColumnSchema, raw: &str) -> Result<Value> {
    if raw.is_empty() && (column.nullable || column.kind != ValueKind::Text) {
        return Ok(Value::Null);
    }
    let trimmed = raw.trim();
    match column.kind {
        ValueKind::Integer => trimmed
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| Error::invalid(format!("`{}` expects an integer, got `{raw}`", column.name))),
        ValueKind::Float => trimmed
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| Error::invalid(format!("`{}` expects a number, got `{raw}`", column.name))),
        ValueKind::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "1" | "on" | "yes" | "t" => Ok(Value::Bool(true)),
            "false" | "0" | "off" | "no" | "f" => Ok(Value::Bool(false)),
            _ => Err(Error::invalid(format!(
                "`{}` expects a boolean, got `{raw}`",
                column.name
            ))),
        },
        ValueKind::Text | ValueKind::Other => Ok(Value::String(raw.to_string())),
    }
}

/// Rust type a NULL is bound as. Postgres refuses an untyped text NULL for a
/// numeric or boolean column.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NullType {
    BigInt,
    Double,
    Bool,
    Text,
}

impl NullType {
    pub fn for_kind(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Integer => NullType::BigInt,
            ValueKind::Float => NullType::Double,
            ValueKind::Boolean => NullType::Bool,
            // `Other` columns are bound through a cast from text
            ValueKind::Text | ValueKind::Other => NullType::Text,
        }
    }
}

/// Bind a JSON value with the Rust type matching its shape. NULLs take the
/// type of the column they are bound against.
pub fn bind_value<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    kind: ValueKind,
    value: &Value,
) -> Query<'q, Any, AnyArguments<'q>> {
    match value {
        Value::Null => match NullType::for_kind(kind) {
            NullType::BigInt => query.bind(None::<i64>),
            NullType::Double => query.bind(None::<f64>),
            NullType::Bool => query.bind(None::<bool>),
            NullType::Text => query.bind(None::<String>),
        },
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

/// Render a key value as the string used in URLs and forms.
pub fn key_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{NullType, coerce_input, key_to_string};
    use crate::libs::error::Error;
    use crate::libs::schema::{ColumnSchema, ValueKind};
    use serde_json::{Value, json};

    #[test]
    fn integers_and_floats_parse() {
        let age = ColumnSchema::new("age", "INTEGER");
        assert_eq!(coerce_input(&age, " 42 ").unwrap(), json!(42));
        assert!(matches!(coerce_input(&age, "forty"), Err(Error::InvalidInput(_))));

        let price = ColumnSchema::new("price", "REAL");
        assert_eq!(coerce_input(&price, "9.5").unwrap(), json!(9.5));
        assert!(coerce_input(&price, "NaN").is_err());
    }

    #[test]
    fn booleans_accept_form_spellings() {
        let active = ColumnSchema::new("active", "boolean");
        for raw in ["on", "true", "1", "YES"] {
            assert_eq!(coerce_input(&active, raw).unwrap(), Value::Bool(true), "{raw}");
        }
        for raw in ["off", "false", "0", "no"] {
            assert_eq!(coerce_input(&active, raw).unwrap(), Value::Bool(false), "{raw}");
        }
        assert!(coerce_input(&active, "maybe").is_err());
    }

    #[test]
    fn empty_input_becomes_null_unless_required_text() {
        let nickname = ColumnSchema::new("nickname", "TEXT");
        assert_eq!(coerce_input(&nickname, "").unwrap(), Value::Null);

        let name = ColumnSchema::new("name", "TEXT").not_null();
        assert_eq!(coerce_input(&name, "").unwrap(), json!(""));

        let count = ColumnSchema::new("count", "INTEGER").not_null();
        assert_eq!(coerce_input(&count, "").unwrap(), Value::Null);
    }

    #[test]
    fn other_kinds_stay_text() {
        let created = ColumnSchema::new("created_at", "timestamp");
        assert_eq!(
            coerce_input(&created, "2024-01-02 03:04:05").unwrap(),
            json!("2024-01-02 03:04:05")
        );
    }

    #[test]
    fn keys_render_without_quotes() {
        assert_eq!(key_to_string(&json!(7)).as_deref(), Some("7"));
        assert_eq!(key_to_string(&json!("abc")).as_deref(), Some("abc"));
        assert_eq!(key_to_string(&Value::Null), None);
    }

    #[test]
    fn nulls_bind_with_the_column_type() {
        let cases = [
            ("age", "integer", NullType::BigInt),
            ("score", "double precision", NullType::Double),
            ("active", "boolean", NullType::Bool),
            ("name", "varchar(40)", NullType::Text),
            ("joined", "date", NullType::Text),
        ];
        for (name, data_type, expected) in cases {
            let column = ColumnSchema::new(name, data_type);
            assert_eq!(NullType::for_kind(column.kind), expected, "{data_type}");
        }
        assert_eq!(NullType::for_kind(ValueKind::Other), NullType::Text);
    }
}
