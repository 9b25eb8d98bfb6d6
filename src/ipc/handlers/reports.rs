use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{academic_year_param, req_str, require_db, semester_param};
use crate::ipc::types::{AppState, Request};
use crate::reports;
use serde_json::json;

fn student_not_found(student_id: &str) -> HandlerErr {
    HandlerErr::new("not_found", "student not found").with_details(json!({ "studentId": student_id }))
}

fn report_card(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = req_str(req, "studentId")?;
    let semester = semester_param(state, req)?;
    let academic_year = academic_year_param(state, req);

    match reports::report_card(conn, &student_id, semester, &academic_year)
        .map_err(HandlerErr::query)?
    {
        Some(card) => Ok(json!(card)),
        None => Err(student_not_found(&student_id)),
    }
}

fn admin_dashboard(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let dash = reports::admin_dashboard(conn).map_err(HandlerErr::query)?;
    Ok(json!(dash))
}

fn teacher_dashboard(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let teacher_id = req_str(req, "teacherId")?;
    let dash = reports::teacher_dashboard(conn, &teacher_id).map_err(HandlerErr::query)?;
    Ok(json!(dash))
}

fn student_dashboard(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = req_str(req, "studentId")?;
    match reports::student_dashboard(conn, &student_id).map_err(HandlerErr::query)? {
        Some(dash) => Ok(json!(dash)),
        None => Err(student_not_found(&student_id)),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "reports.reportCard" => report_card(state, req),
        "dashboard.admin" => admin_dashboard(state),
        "dashboard.teacher" => teacher_dashboard(state, req),
        "dashboard.student" => student_dashboard(state, req),
        _ => return None,
    };
    Some(match res {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
