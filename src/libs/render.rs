//! HTML fragments and JSON envelopes returned by the HTTP layer.
//!
//! Fragments are small enough to assemble with `format!`; every value that
//! comes from the database or the request goes through [`escape_html`].

use crate::libs::record::key_to_string;
use crate::libs::schema::{ColumnSchema, ValueKind};
use crate::libs::table::{ORIGINAL_KEY_FIELD, RowForm, RowPage};
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write;

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Percent-encode a path segment or query value.
pub fn encode_component(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Status body for mutating routes.
#[derive(Debug, Serialize, PartialEq)]
pub struct Envelope {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<Value>,
}

impl Envelope {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            key: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            key: None,
        }
    }

    pub fn with_key(mut self, key: Option<Value>) -> Self {
        self.key = key;
        self
    }
}

pub fn tables_page(names: &[String]) -> String {
    let mut items = String::new();
    for name in names {
        let _ = write!(
            items,
            "<li><a href=\"/tables/{href}\" hx-get=\"/tables/{href}\" hx-target=\"#content\">{label}</a></li>",
            href = encode_component(name),
            label = escape_html(name)
        );
    }
    if names.is_empty() {
        items.push_str("<li class=\"empty\">No tables found</li>");
    }
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>tabledesk</title>\n\
         <script src=\"https://unpkg.com/htmx.org@1.9.12\"></script>\n</head>\n<body>\n\
         <nav><ul class=\"tables\">{items}</ul></nav>\n<main id=\"content\"></main>\n</body>\n</html>\n"
    )
}

fn list_href(page: &RowPage, number: u64) -> String {
    let mut href = format!(
        "/tables/{}?page={number}&per_page={}",
        encode_component(&page.table),
        page.per_page
    );
    if let Some(q) = &page.search {
        let _ = write!(href, "&q={}", encode_component(q));
    }
    if let Some(sort) = &page.sort {
        let _ = write!(
            href,
            "&sort={}&dir={}",
            encode_component(sort),
            if page.descending { "desc" } else { "asc" }
        );
    }
    href
}

pub fn rows_fragment(page: &RowPage) -> String {
    let table = encode_component(&page.table);
    let editable = page.key_column.is_some();
    let mut html = String::new();
    let _ = write!(
        html,
        "<div class=\"rows\" data-table=\"{}\">\n<div class=\"toolbar\">\
         <a href=\"/tables/{table}/form\" hx-get=\"/tables/{table}/form\" hx-target=\"#content\">New row</a>\
         <span class=\"count\">{} rows</span></div>\n<table>\n<thead><tr>",
        escape_html(&page.table),
        page.total
    );
    for column in &page.columns {
        let _ = write!(html, "<th>{}</th>", escape_html(&column.name));
    }
    if editable {
        html.push_str("<th></th>");
    }
    html.push_str("</tr></thead>\n<tbody>\n");

    for row in &page.rows {
        html.push_str("<tr>");
        for column in &page.columns {
            let value = row.get(&column.name).unwrap_or(&Value::Null);
            let _ = write!(html, "<td>{}</td>", escape_html(&display_value(value)));
        }
        let key = page
            .key_column
            .as_ref()
            .and_then(|k| row.get(k))
            .and_then(key_to_string);
        if let Some(key) = key {
            let key = encode_component(&key);
            let _ = write!(
                html,
                "<td class=\"actions\">\
                 <a href=\"/tables/{table}/form?key={key}\" hx-get=\"/tables/{table}/form?key={key}\" hx-target=\"#content\">Edit</a> \
                 <a href=\"#\" hx-delete=\"/tables/{table}/rows/{key}\" hx-confirm=\"Delete this row?\">Delete</a></td>"
            );
        } else if editable {
            html.push_str("<td></td>");
        }
        html.push_str("</tr>\n");
    }
    if page.rows.is_empty() {
        let span = page.columns.len() + usize::from(editable);
        let _ = write!(html, "<tr><td colspan=\"{span}\" class=\"empty\">No rows</td></tr>\n");
    }
    html.push_str("</tbody>\n</table>\n<div class=\"pager\">");
    if page.has_previous() {
        let href = escape_html(&list_href(page, page.page - 1));
        let _ = write!(html, "<a rel=\"prev\" href=\"{href}\" hx-get=\"{href}\" hx-target=\"#content\">Previous</a>");
    }
    let _ = write!(html, "<span>Page {} of {}</span>", page.page, page.page_count());
    if page.has_next() {
        let href = escape_html(&list_href(page, page.page + 1));
        let _ = write!(html, "<a rel=\"next\" href=\"{href}\" hx-get=\"{href}\" hx-target=\"#content\">Next</a>");
    }
    html.push_str("</div>\n</div>\n");
    html
}

fn input_for(column: &ColumnSchema, value: Option<&Value>) -> String {
    let name = escape_html(&column.name);
    let value = value.map(display_value).unwrap_or_default();
    let required = if column.nullable || column.default_value.is_some() || column.primary {
        ""
    } else {
        " required"
    };
    let placeholder = column
        .default_value
        .as_deref()
        .map(|d| format!(" placeholder=\"{}\"", escape_html(d)))
        .unwrap_or_default();
    match column.kind {
        ValueKind::Boolean => {
            let checked = matches!(value.as_str(), "true" | "1" | "t");
            format!(
                "<input type=\"checkbox\" name=\"{name}\" value=\"true\"{}>",
                if checked { " checked" } else { "" }
            )
        }
        ValueKind::Integer => format!(
            "<input type=\"number\" step=\"1\" name=\"{name}\" value=\"{}\"{placeholder}{required}>",
            escape_html(&value)
        ),
        ValueKind::Float => format!(
            "<input type=\"number\" step=\"any\" name=\"{name}\" value=\"{}\"{placeholder}{required}>",
            escape_html(&value)
        ),
        ValueKind::Text | ValueKind::Other => format!(
            "<input type=\"text\" name=\"{name}\" value=\"{}\"{placeholder}{required}>",
            escape_html(&value)
        ),
    }
}

pub fn form_fragment(form: &RowForm) -> String {
    let table = encode_component(&form.table);
    let mut html = format!(
        "<form class=\"row-form\" method=\"post\" action=\"/tables/{table}/upsert\" hx-post=\"/tables/{table}/upsert\">\n"
    );
    if let Some(key) = &form.key {
        let _ = writeln!(
            html,
            "<input type=\"hidden\" name=\"{ORIGINAL_KEY_FIELD}\" value=\"{}\">",
            escape_html(key)
        );
    }
    for column in &form.columns {
        let _ = writeln!(
            html,
            "<label>{label} <small>{ty}</small> {input}</label>",
            label = escape_html(&column.name),
            ty = escape_html(&column.data_type),
            input = input_for(column, form.values.get(&column.name))
        );
    }
    let action = if form.key.is_some() { "Save" } else { "Create" };
    let _ = write!(
        html,
        "<button type=\"submit\">{action}</button>\n\
         <a href=\"/tables/{table}\" hx-get=\"/tables/{table}\" hx-target=\"#content\">Cancel</a>\n</form>\n"
    );
    html
}

pub fn error_fragment(message: &str) -> String {
    format!("<div class=\"error\" role=\"alert\">{}</div>\n", escape_html(message))
}
