use serde_json::{Value, json};
use std::collections::BTreeMap;
use tabledesk::{
    AppConfig, DatabaseKind, Direction, Error, ErrorKind, ListParams, OrmStruct, Table, UpsertOutcome, ValueKind,
};
use tempfile::TempDir;

async fn fixture() -> (TempDir, OrmStruct) {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("app.db").display());
    let orm = OrmStruct::connect(&AppConfig::for_url(url))
        .await
        .expect("connect sqlite");
    for sql in [
        "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, \
         email TEXT UNIQUE, age INTEGER, score REAL DEFAULT 0, active BOOLEAN NOT NULL DEFAULT 1)",
        "CREATE TABLE tags (slug TEXT PRIMARY KEY, label TEXT)",
        "CREATE TABLE audit_log (line TEXT)",
        "CREATE TABLE slugs (slug TEXT PRIMARY KEY NOT NULL, label TEXT)",
        "INSERT INTO users (name, email, age, score, active) VALUES ('Ada', 'ada@mail.com', 36, 9.5, 1)",
        "INSERT INTO users (name, email, age, score, active) VALUES ('Grace', 'grace@mail.com', 45, 8.0, 0)",
        "INSERT INTO users (name, email, age, score, active) VALUES ('Linus', 'linus@mail.com', 28, 7.25, 1)",
        "INSERT INTO audit_log (line) VALUES ('boot')",
    ] {
        orm.raw(sql).await.expect("seed");
    }
    (dir, orm)
}

fn form(fields: &[(&str, &str)]) -> BTreeMap<String, String> {
    fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// SQLite stores booleans as integers
fn truthy(value: &Value) -> bool {
    *value == json!(true) || *value == json!(1)
}

fn params(page: u64, per_page: u64) -> ListParams {
    ListParams {
        page,
        per_page,
        ..ListParams::default()
    }
}

#[tokio::test]
async fn introspects_tables_and_columns() {
    let (_dir, orm) = fixture().await;
    assert_eq!(orm.kind(), DatabaseKind::Sqlite);
    assert_eq!(
        orm.tables().await.unwrap(),
        vec!["audit_log", "slugs", "tags", "users"]
    );

    let schema = orm.table_schema("users").await.unwrap();
    assert_eq!(
        schema.column_names(),
        vec!["id", "name", "email", "age", "score", "active"]
    );
    assert_eq!(schema.key_column().map(|c| c.name.as_str()), Some("id"));
    let name = schema.column("name").unwrap();
    assert!(!name.nullable);
    assert_eq!(name.kind, ValueKind::Text);
    assert_eq!(schema.column("score").unwrap().kind, ValueKind::Float);
    assert_eq!(schema.column("score").unwrap().default_value.as_deref(), Some("0"));
    assert_eq!(schema.column("active").unwrap().kind, ValueKind::Boolean);

    let err = orm.table_schema("missing").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(matches!(Table::open(&orm, "missing").await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn lists_with_paging_search_and_sort() {
    let (_dir, orm) = fixture().await;
    let users = Table::open(&orm, "users").await.unwrap();

    let page = users.list(&params(1, 2)).await.unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.rows.len(), 2);
    assert_eq!(page.rows[0]["name"], json!("Ada"));
    assert_eq!(page.rows[0]["age"], json!(36));
    assert_eq!(page.rows[0]["score"], json!(9.5));
    assert!(page.has_next());

    let page = users.list(&params(2, 2)).await.unwrap();
    assert_eq!(page.rows.len(), 1);
    assert_eq!(page.rows[0]["name"], json!("Linus"));
    assert!(!page.has_next());

    let sorted = users
        .list(&ListParams {
            sort: Some("age".into()),
            dir: Direction::Desc,
            ..params(1, 10)
        })
        .await
        .unwrap();
    let names: Vec<&Value> = sorted.rows.iter().map(|r| &r["name"]).collect();
    assert_eq!(names, vec!["Grace", "Ada", "Linus"]);

    let found = users
        .list(&ListParams {
            search: Some("grace@".into()),
            ..params(1, 10)
        })
        .await
        .unwrap();
    assert_eq!(found.total, 1);
    assert_eq!(found.rows[0]["email"], json!("grace@mail.com"));

    // wildcards in the term match literally
    for term in ["%", "_", "a%e"] {
        let found = users
            .list(&ListParams {
                search: Some(term.into()),
                ..params(1, 10)
            })
            .await
            .unwrap();
        assert_eq!(found.total, 0, "{term}");
    }

    let past_the_end = users.list(&params(u64::MAX / 2, 50)).await.unwrap();
    assert_eq!(past_the_end.total, 3);
    assert!(past_the_end.rows.is_empty());

    let err = users
        .list(&ListParams {
            sort: Some("password".into()),
            ..params(1, 10)
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);
}

#[tokio::test]
async fn upsert_inserts_then_updates() {
    let (_dir, orm) = fixture().await;
    let users = Table::open(&orm, "users").await.unwrap();

    let outcome = users
        .upsert(&form(&[
            ("id", ""),
            ("name", "Barbara"),
            ("email", "barbara@mail.com"),
            ("age", "52"),
            ("active", "on"),
        ]))
        .await
        .unwrap();
    assert_eq!(outcome, UpsertOutcome::Inserted(Some(json!(4))));

    let row = users.get("4").await.unwrap();
    assert_eq!(row["name"], json!("Barbara"));
    assert!(truthy(&row["active"]));
    assert_eq!(row["score"], json!(0.0));

    let outcome = users
        .upsert(&form(&[
            ("__key", "4"),
            ("id", "4"),
            ("name", "Barbara Liskov"),
            ("email", "barbara@mail.com"),
            ("age", "53"),
        ]))
        .await
        .unwrap();
    assert_eq!(outcome, UpsertOutcome::Updated(json!(4)));
    let row = users.get("4").await.unwrap();
    assert_eq!(row["name"], json!("Barbara Liskov"));
    assert_eq!(row["age"], json!(53));
    // unchecked checkbox
    assert!(!truthy(&row["active"]));

    // an existing key without __key still updates
    let outcome = users
        .upsert(&form(&[("id", "1"), ("name", "Ada Lovelace"), ("active", "true")]))
        .await
        .unwrap();
    assert_eq!(outcome, UpsertOutcome::Updated(json!(1)));
    assert_eq!(users.get("1").await.unwrap()["name"], json!("Ada Lovelace"));
    assert_eq!(users.list(&params(1, 50)).await.unwrap().total, 4);
}

#[tokio::test]
async fn text_keys_are_generated_when_missing() {
    let (_dir, orm) = fixture().await;
    let tags = Table::open(&orm, "tags").await.unwrap();

    let outcome = tags.upsert(&form(&[("label", "Rust")])).await.unwrap();
    let Some(Value::String(slug)) = outcome.key().cloned() else {
        panic!("expected generated key, got {outcome:?}");
    };
    assert_eq!(slug.len(), 36);
    assert_eq!(tags.get(&slug).await.unwrap()["label"], json!("Rust"));

    let outcome = tags
        .upsert(&form(&[("slug", "sql"), ("label", "SQL")]))
        .await
        .unwrap();
    assert_eq!(outcome, UpsertOutcome::Inserted(Some(json!("sql"))));
}

#[tokio::test]
async fn empty_required_text_keys_are_generated_not_reused() {
    let (_dir, orm) = fixture().await;
    let slugs = Table::open(&orm, "slugs").await.unwrap();
    assert!(!slugs.schema().key_column().unwrap().nullable);

    let first = slugs
        .upsert(&form(&[("slug", ""), ("label", "Rust")]))
        .await
        .unwrap();
    let second = slugs
        .upsert(&form(&[("slug", ""), ("label", "SQL")]))
        .await
        .unwrap();
    let (UpsertOutcome::Inserted(Some(a)), UpsertOutcome::Inserted(Some(b))) = (&first, &second)
    else {
        panic!("expected two inserts, got {first:?} and {second:?}");
    };
    assert_ne!(a, b);
    assert_eq!(a.as_str().map(str::len), Some(36));

    let page = slugs.list(&params(1, 10)).await.unwrap();
    assert_eq!(page.total, 2);
    assert!(page.rows.iter().all(|r| r["slug"] != json!("")));

    // editing with an empty key field keeps the stored key
    let key = a.as_str().unwrap();
    let outcome = slugs
        .upsert(&form(&[("__key", key), ("slug", ""), ("label", "Rust 2024")]))
        .await
        .unwrap();
    assert_eq!(outcome, UpsertOutcome::Updated(json!(key)));
    assert_eq!(slugs.get(key).await.unwrap()["label"], json!("Rust 2024"));
}

#[tokio::test]
async fn form_loads_existing_rows() {
    let (_dir, orm) = fixture().await;
    let users = Table::open(&orm, "users").await.unwrap();

    let edit = users.form(Some("2")).await.unwrap();
    assert_eq!(edit.key.as_deref(), Some("2"));
    assert_eq!(edit.values["name"], json!("Grace"));
    assert_eq!(edit.columns.len(), 6);

    let blank = users.form(None).await.unwrap();
    assert!(blank.key.is_none());
    assert!(blank.values.is_empty());

    let err = users.form(Some("99")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn delete_removes_rows_once() {
    let (_dir, orm) = fixture().await;
    let users = Table::open(&orm, "users").await.unwrap();

    users.delete("3").await.unwrap();
    assert_eq!(users.list(&params(1, 50)).await.unwrap().total, 2);
    let err = users.delete("3").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = users.delete("three").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);
}

#[tokio::test]
async fn bad_input_is_rejected() {
    let (_dir, orm) = fixture().await;
    let users = Table::open(&orm, "users").await.unwrap();

    let err = users
        .upsert(&form(&[("name", "Eve"), ("password", "hunter2")]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let err = users
        .upsert(&form(&[("name", "Eve"), ("age", "old")]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);

    let err = users
        .upsert(&form(&[("name", "Ada 2"), ("email", "ada@mail.com")]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn keyless_tables_only_append() {
    let (_dir, orm) = fixture().await;
    let log = Table::open(&orm, "audit_log").await.unwrap();

    let outcome = log.upsert(&form(&[("line", "shutdown")])).await.unwrap();
    assert_eq!(outcome, UpsertOutcome::Inserted(None));
    assert_eq!(log.list(&params(1, 50)).await.unwrap().total, 2);
    let lines = orm.get_all(log.schema()).await.unwrap();
    assert!(lines.iter().any(|r| r["line"] == json!("shutdown")));

    let err = log.delete("boot").await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}
