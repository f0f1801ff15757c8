//! Axum routes over [`Table`]: HTML fragments for browsers, JSON for scripts.
//!
//! Mutating routes and `/api/*` failures answer with an [`Envelope`]; HTML
//! routes answer with an error fragment when something goes wrong.

use crate::libs::config::AppConfig;
use crate::libs::error::{Error, ErrorKind, Result};
use crate::libs::orm::{OrmStruct, redact};
use crate::libs::query_builder::Direction;
use crate::libs::render::{Envelope, error_fragment, form_fragment, rows_fragment, tables_page};
use crate::libs::table::{ListParams, Table, UpsertOutcome};
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

pub struct AppState {
    pub orm: OrmStruct,
    pub page_size: u32,
    pub max_page_size: u32,
    pub read_only: bool,
}

impl AppState {
    pub fn new(orm: OrmStruct, config: &AppConfig) -> Self {
        Self {
            orm,
            page_size: config.page_size,
            max_page_size: config.max_page_size,
            read_only: config.read_only,
        }
    }

    fn ensure_writable(&self, action: &'static str) -> Result<()> {
        if self.read_only {
            Err(Error::ReadOnly(action))
        } else {
            Ok(())
        }
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/", get(index))
        .route("/tables/:table", get(list_rows_html))
        .route("/tables/:table/form", get(show_form))
        .route("/tables/:table/upsert", post(upsert_row))
        .route("/tables/:table/delete", post(delete_row_form))
        .route("/tables/:table/rows/:key", delete(delete_row))
        .route("/api/tables", get(list_tables_json))
        .route("/api/tables/:table/columns", get(columns_json))
        .route("/api/tables/:table/rows", get(list_rows_json))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Connect, then serve until Ctrl-C or SIGTERM.
pub async fn serve(config: AppConfig) -> Result<()> {
    config.validate()?;
    let orm = OrmStruct::connect(&config).await?;
    let state = Arc::new(AppState::new(orm.clone(), &config));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        database = %redact(&orm.database_url),
        read_only = config.read_only,
        "listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    orm.close().await;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(%err, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    page: Option<u64>,
    per_page: Option<u64>,
    q: Option<String>,
    sort: Option<String>,
    dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FormQuery {
    key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeleteRequest {
    key: String,
}

impl ListQuery {
    fn into_params(self, page_size: u32, max_page_size: u32) -> Result<ListParams> {
        let per_page = self
            .per_page
            .unwrap_or(u64::from(page_size))
            .clamp(1, u64::from(max_page_size));
        let dir = match self.dir.as_deref() {
            Some(raw) if !raw.is_empty() => Direction::parse(raw)?,
            _ => Direction::Asc,
        };
        Ok(ListParams {
            page: self.page.unwrap_or(1).max(1),
            per_page,
            search: self.q,
            sort: self.sort.filter(|s| !s.is_empty()),
            dir,
        })
    }
}

fn status_for(err: &Error) -> StatusCode {
    match err.kind() {
        ErrorKind::Usage => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn log_failure(err: &Error, status: StatusCode) {
    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    } else {
        tracing::debug!(error = %err, %status, "request rejected");
    }
}

fn html_error(err: Error) -> Response {
    let status = status_for(&err);
    log_failure(&err, status);
    (status, Html(error_fragment(&err.to_string()))).into_response()
}

fn envelope_error(err: Error) -> Response {
    let status = status_for(&err);
    log_failure(&err, status);
    (status, Json(Envelope::failure(err.to_string()))).into_response()
}

async fn healthz() -> Response {
    Json(json!({ "ok": true })).into_response()
}

async fn index(State(state): State<Arc<AppState>>) -> Response {
    match state.orm.tables().await {
        Ok(names) => Html(tables_page(&names)).into_response(),
        Err(err) => html_error(err),
    }
}

async fn list_rows_html(
    State(state): State<Arc<AppState>>,
    AxumPath(table): AxumPath<String>,
    Query(query): Query<ListQuery>,
) -> Response {
    let result = async {
        let params = query.into_params(state.page_size, state.max_page_size)?;
        let table = Table::open(&state.orm, &table).await?;
        table.list(&params).await
    }
    .await;
    match result {
        Ok(page) => Html(rows_fragment(&page)).into_response(),
        Err(err) => html_error(err),
    }
}

async fn show_form(
    State(state): State<Arc<AppState>>,
    AxumPath(table): AxumPath<String>,
    Query(query): Query<FormQuery>,
) -> Response {
    let result = async {
        let table = Table::open(&state.orm, &table).await?;
        table.form(query.key.as_deref()).await
    }
    .await;
    match result {
        Ok(form) => Html(form_fragment(&form)).into_response(),
        Err(err) => html_error(err),
    }
}

async fn upsert_row(
    State(state): State<Arc<AppState>>,
    AxumPath(table): AxumPath<String>,
    Form(input): Form<BTreeMap<String, String>>,
) -> Response {
    let result = async {
        state.ensure_writable("upsert")?;
        let table = Table::open(&state.orm, &table).await?;
        table.upsert(&input).await
    }
    .await;
    match result {
        Ok(UpsertOutcome::Inserted(key)) => {
            Json(Envelope::ok("row inserted").with_key(key)).into_response()
        }
        Ok(UpsertOutcome::Updated(key)) => {
            Json(Envelope::ok("row updated").with_key(Some(key))).into_response()
        }
        Err(err) => envelope_error(err),
    }
}

async fn remove_row(state: &AppState, table: &str, key: &str) -> Result<()> {
    state.ensure_writable("delete")?;
    let table = Table::open(&state.orm, table).await?;
    table.delete(key).await
}

async fn delete_row_form(
    State(state): State<Arc<AppState>>,
    AxumPath(table): AxumPath<String>,
    Form(payload): Form<DeleteRequest>,
) -> Response {
    match remove_row(&state, &table, &payload.key).await {
        Ok(()) => Json(Envelope::ok("row deleted")).into_response(),
        Err(err) => envelope_error(err),
    }
}

async fn delete_row(
    State(state): State<Arc<AppState>>,
    AxumPath((table, key)): AxumPath<(String, String)>,
) -> Response {
    match remove_row(&state, &table, &key).await {
        Ok(()) => Json(Envelope::ok("row deleted")).into_response(),
        Err(err) => envelope_error(err),
    }
}

async fn list_tables_json(State(state): State<Arc<AppState>>) -> Response {
    match state.orm.tables().await {
        Ok(names) => Json(json!({ "tables": names })).into_response(),
        Err(err) => envelope_error(err),
    }
}

async fn columns_json(
    State(state): State<Arc<AppState>>,
    AxumPath(table): AxumPath<String>,
) -> Response {
    match Table::open(&state.orm, &table).await {
        Ok(table) => Json(json!({
            "table": table.name(),
            "key_column": table.schema().key_column().map(|c| c.name.as_str()),
            "columns": table.columns(),
        }))
        .into_response(),
        Err(err) => envelope_error(err),
    }
}

async fn list_rows_json(
    State(state): State<Arc<AppState>>,
    AxumPath(table): AxumPath<String>,
    Query(query): Query<ListQuery>,
) -> Response {
    let result = async {
        let params = query.into_params(state.page_size, state.max_page_size)?;
        let table = Table::open(&state.orm, &table).await?;
        table.list(&params).await
    }
    .await;
    match result {
        Ok(page) => Json(page).into_response(),
        Err(err) => envelope_error(err),
    }
}
