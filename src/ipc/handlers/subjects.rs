use crate::activity;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{actor_param, ensure_exists, opt_i64, opt_str, req_str, require_db};
use crate::ipc::types::{AppState, Request};
use crate::reports::DEFAULT_KKM;
use serde_json::json;
use uuid::Uuid;

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "subjects": [] }));
    };
    let teacher_filter = opt_str(req, "teacherId");

    let mut stmt = match conn.prepare(
        "SELECT m.id, m.name, m.code, m.kkm, m.teacher_id, t.full_name, m.class_id
         FROM subjects m
         LEFT JOIN teachers t ON t.id = m.teacher_id
         WHERE ?1 IS NULL OR m.teacher_id = ?1 OR m.teacher_id IS NULL
         ORDER BY m.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&teacher_filter], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let code: String = row.get(2)?;
            let kkm: i64 = row.get(3)?;
            let teacher_id: Option<String> = row.get(4)?;
            let teacher_name: Option<String> = row.get(5)?;
            let class_id: Option<String> = row.get(6)?;
            Ok(json!({
                "id": id,
                "name": name,
                "code": code,
                "kkm": kkm,
                "teacherId": teacher_id,
                "teacherName": teacher_name,
                "classId": class_id
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(subjects) => ok(&req.id, json!({ "subjects": subjects })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn create_subject(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let name = req_str(req, "name")?;
    let code = req_str(req, "code")?;
    let kkm = opt_i64(req, "kkm")?.unwrap_or(DEFAULT_KKM);
    if !(0..=100).contains(&kkm) {
        return Err(HandlerErr::bad_params("kkm must be between 0 and 100")
            .with_details(json!({ "kkm": kkm })));
    }
    let teacher_id = opt_str(req, "teacherId");
    if let Some(tid) = teacher_id.as_deref() {
        ensure_exists(conn, "teachers", tid, "teacher")?;
    }
    let class_id = opt_str(req, "classId");
    if let Some(cid) = class_id.as_deref() {
        ensure_exists(conn, "classes", cid, "class")?;
    }

    let subject_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO subjects(id, name, code, kkm, teacher_id, class_id)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&subject_id, &name, &code, kkm, &teacher_id, &class_id),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "subjects" }))
    })?;

    activity::append_best_effort(
        conn,
        &actor_param(req),
        "subject created",
        &format!("Added subject: {} ({})", name, code),
    );
    Ok(json!({ "subjectId": subject_id, "name": name, "code": code, "kkm": kkm }))
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    match create_subject(state, req) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "subjects.create" => Some(handle_subjects_create(state, req)),
        _ => None,
    }
}
