use crate::grades::{Actor, Semester};
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

/// Trimmed string param; numbers are accepted and rendered as text.
/// Blank strings count as missing.
pub fn opt_str(req: &Request, key: &str) -> Option<String> {
    value_text(req.params.get(key)?)
}

pub fn req_str(req: &Request, key: &str) -> Result<String, HandlerErr> {
    opt_str(req, key).ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn opt_i64(req: &Request, key: &str) -> Result<Option<i64>, HandlerErr> {
    match req.params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or_else(|| {
            HandlerErr::bad_params(format!("{} must be an integer", key))
                .with_details(json!({ key: v }))
        }),
    }
}

pub fn value_text(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => {
            let t = s.trim();
            (!t.is_empty()).then(|| t.to_string())
        }
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Like [`value_text`] but keeps the text exactly as submitted.
pub fn value_raw_text(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn semester_param(state: &AppState, req: &Request) -> Result<Semester, HandlerErr> {
    match opt_str(req, "semester") {
        None => Ok(state.config.default_semester),
        Some(raw) => Semester::parse(&raw).ok_or_else(|| {
            HandlerErr::bad_params("semester must be one of: Ganjil, Genap")
                .with_details(json!({ "semester": raw }))
        }),
    }
}

pub fn academic_year_param(state: &AppState, req: &Request) -> String {
    opt_str(req, "academicYear").unwrap_or_else(|| state.config.default_academic_year.clone())
}

pub fn actor_param(req: &Request) -> Actor {
    Actor {
        id: opt_str(req, "actorId"),
        name: opt_str(req, "actorName").unwrap_or_default(),
    }
}

pub fn ensure_exists(
    conn: &Connection,
    table: &'static str,
    id: &str,
    what: &str,
) -> Result<(), HandlerErr> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    let found: Option<i64> = conn
        .query_row(&sql, [id], |r| r.get(0))
        .optional()
        .map_err(HandlerErr::query)?;
    if found.is_none() {
        return Err(HandlerErr::new("not_found", format!("{} not found", what))
            .with_details(json!({ "id": id })));
    }
    Ok(())
}
