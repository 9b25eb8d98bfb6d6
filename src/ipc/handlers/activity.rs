use crate::activity;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{opt_i64, require_db};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

const ACTIVITY_LIST_MAX: i64 = 500;

fn list_activity(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let limit = opt_i64(req, "limit")?
        .unwrap_or(activity::RECENT_ACTIVITY_LIMIT)
        .clamp(1, ACTIVITY_LIST_MAX);
    let entries = activity::list_recent(conn, limit).map_err(HandlerErr::query)?;
    Ok(json!({ "entries": entries }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "activity.list" => Some(match list_activity(state, req) {
            Ok(v) => ok(&req.id, v),
            Err(e) => e.response(&req.id),
        }),
        _ => None,
    }
}
