use crate::activity;
use crate::db::now_timestamp;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{
    academic_year_param, actor_param, ensure_exists, opt_i64, opt_str, req_str, require_db,
    semester_param,
};
use crate::ipc::types::{AppState, Request};
use crate::reports;
use serde_json::json;
use uuid::Uuid;

fn count_param(req: &Request, key: &str) -> Result<i64, HandlerErr> {
    let v = opt_i64(req, key)?.unwrap_or(0);
    if v < 0 {
        return Err(HandlerErr::bad_params(format!("{} must be >= 0", key))
            .with_details(json!({ key: v })));
    }
    Ok(v)
}

fn get_attendance(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = req_str(req, "studentId")?;
    let semester = semester_param(state, req)?;
    let academic_year = academic_year_param(state, req);
    let attendance = reports::load_attendance(conn, &student_id, semester, &academic_year)
        .map_err(HandlerErr::query)?;
    Ok(json!({ "attendance": attendance }))
}

fn set_attendance(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = req_str(req, "studentId")?;
    ensure_exists(conn, "students", &student_id, "student")?;
    let semester = semester_param(state, req)?;
    let academic_year = academic_year_param(state, req);
    let sick = count_param(req, "sick")?;
    let permitted = count_param(req, "permitted")?;
    let unexcused = count_param(req, "unexcused")?;

    conn.execute(
        "INSERT INTO attendance(student_id, semester, academic_year, sick, permitted, unexcused, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, semester, academic_year) DO UPDATE SET
           sick = excluded.sick,
           permitted = excluded.permitted,
           unexcused = excluded.unexcused,
           updated_at = excluded.updated_at",
        (
            &student_id,
            semester.as_str(),
            &academic_year,
            sick,
            permitted,
            unexcused,
            now_timestamp(),
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "attendance" }))
    })?;

    activity::append_best_effort(
        conn,
        &actor_param(req),
        "attendance updated",
        &format!(
            "Attendance for {} ({} {}): sick {}, permitted {}, unexcused {}",
            student_id,
            semester.as_str(),
            academic_year,
            sick,
            permitted,
            unexcused
        ),
    );
    Ok(json!({ "ok": true }))
}

fn add_extracurricular(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = req_str(req, "studentId")?;
    ensure_exists(conn, "students", &student_id, "student")?;
    let name = req_str(req, "name")?;
    let grade = opt_str(req, "grade");
    let remark = opt_str(req, "remark");
    let semester = semester_param(state, req)?;
    let academic_year = academic_year_param(state, req);

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO extracurriculars(id, student_id, name, grade, remark, semester, academic_year)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &student_id,
            &name,
            &grade,
            &remark,
            semester.as_str(),
            &academic_year,
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "extracurriculars" }))
    })?;
    Ok(json!({ "extracurricularId": id }))
}

fn list_extracurriculars(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = req_str(req, "studentId")?;
    let semester = semester_param(state, req)?;
    let academic_year = academic_year_param(state, req);
    let items = reports::list_extracurriculars(conn, &student_id, semester, &academic_year)
        .map_err(HandlerErr::query)?;
    Ok(json!({ "extracurriculars": items }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "attendance.get" => get_attendance(state, req),
        "attendance.set" => set_attendance(state, req),
        "extracurriculars.add" => add_extracurricular(state, req),
        "extracurriculars.list" => list_extracurriculars(state, req),
        _ => return None,
    };
    Some(match res {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
