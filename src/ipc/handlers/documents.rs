use crate::documents::{self, DocumentKind};
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{actor_param, ensure_exists, req_str, require_db};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn issue_document(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let raw_kind = req_str(req, "kind")?;
    let Some(kind) = DocumentKind::parse(&raw_kind) else {
        return Err(HandlerErr::bad_params("kind must be one of: rapor, cv")
            .with_details(json!({ "kind": raw_kind })));
    };
    let student_id = req_str(req, "studentId")?;
    ensure_exists(conn, "students", &student_id, "student")?;

    let doc = documents::issue(conn, kind, &student_id, &actor_param(req)).map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "documents" }))
    })?;
    Ok(json!(doc))
}

fn verify_document(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let token = req_str(req, "token")?;
    match documents::verify(conn, &token).map_err(HandlerErr::query)? {
        Some(doc) => Ok(json!({
            "valid": true,
            "kind": doc.kind,
            "studentName": doc.student_name,
            "issuedAt": doc.issued_at,
            "token": doc.token
        })),
        None => Ok(json!({ "valid": false })),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "documents.issue" => issue_document(state, req),
        "documents.verify" => verify_document(state, req),
        _ => return None,
    };
    Some(match res {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
