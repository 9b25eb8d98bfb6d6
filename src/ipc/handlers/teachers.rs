use crate::activity;
use crate::db::now_timestamp;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{actor_param, opt_str, req_str, require_db};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn handle_teachers_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "teachers": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT
           t.id,
           t.full_name,
           t.nip,
           t.subject_area,
           t.phone,
           (SELECT COUNT(*) FROM subjects m WHERE m.teacher_id = t.id) AS subject_count
         FROM teachers t
         ORDER BY t.full_name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let full_name: String = row.get(1)?;
            let nip: Option<String> = row.get(2)?;
            let subject_area: Option<String> = row.get(3)?;
            let phone: Option<String> = row.get(4)?;
            let subject_count: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "fullName": full_name,
                "nip": nip,
                "subjectArea": subject_area,
                "phone": phone,
                "subjectCount": subject_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(teachers) => ok(&req.id, json!({ "teachers": teachers })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn create_teacher(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let full_name = req_str(req, "fullName")?;
    let nip = opt_str(req, "nip");
    let subject_area = opt_str(req, "subjectArea");
    let phone = opt_str(req, "phone");

    let teacher_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO teachers(id, full_name, nip, subject_area, phone, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &teacher_id,
            &full_name,
            &nip,
            &subject_area,
            &phone,
            now_timestamp(),
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "teachers" }))
    })?;

    activity::append_best_effort(
        conn,
        &actor_param(req),
        "teacher created",
        &format!("Added teacher: {}", full_name),
    );
    Ok(json!({ "teacherId": teacher_id, "fullName": full_name }))
}

fn handle_teachers_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    match create_teacher(state, req) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.list" => Some(handle_teachers_list(state, req)),
        "teachers.create" => Some(handle_teachers_create(state, req)),
        _ => None,
    }
}
