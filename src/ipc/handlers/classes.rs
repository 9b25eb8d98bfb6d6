use crate::activity;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{actor_param, ensure_exists, opt_str, req_str, require_db};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "classes": [] }));
    };

    // Correlated subqueries avoid double-counting from joins.
    let mut stmt = match conn.prepare(
        "SELECT
           c.id,
           c.name,
           c.major,
           c.academic_year,
           c.homeroom_teacher_id,
           t.full_name,
           (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id) AS student_count,
           (SELECT COUNT(*) FROM subjects m WHERE m.class_id = c.id) AS subject_count
         FROM classes c
         LEFT JOIN teachers t ON t.id = c.homeroom_teacher_id
         ORDER BY c.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let major: Option<String> = row.get(2)?;
            let academic_year: String = row.get(3)?;
            let homeroom_teacher_id: Option<String> = row.get(4)?;
            let homeroom_teacher: Option<String> = row.get(5)?;
            let student_count: i64 = row.get(6)?;
            let subject_count: i64 = row.get(7)?;
            Ok(json!({
                "id": id,
                "name": name,
                "major": major,
                "academicYear": academic_year,
                "homeroomTeacherId": homeroom_teacher_id,
                "homeroomTeacher": homeroom_teacher,
                "studentCount": student_count,
                "subjectCount": subject_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(classes) => ok(&req.id, json!({ "classes": classes })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn create_class(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let name = req_str(req, "name")?;
    let major = opt_str(req, "major");
    let academic_year =
        opt_str(req, "academicYear").unwrap_or_else(|| state.config.default_academic_year.clone());
    let homeroom_teacher_id = opt_str(req, "homeroomTeacherId");
    if let Some(tid) = homeroom_teacher_id.as_deref() {
        ensure_exists(conn, "teachers", tid, "teacher")?;
    }

    let class_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, name, major, academic_year, homeroom_teacher_id)
         VALUES(?, ?, ?, ?, ?)",
        (&class_id, &name, &major, &academic_year, &homeroom_teacher_id),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string()).with_details(json!({ "table": "classes" }))
    })?;

    activity::append_best_effort(
        conn,
        &actor_param(req),
        "class created",
        &format!("Added class: {}", name),
    );
    Ok(json!({ "classId": class_id, "name": name, "academicYear": academic_year }))
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    match create_class(state, req) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.create" => Some(handle_classes_create(state, req)),
        _ => None,
    }
}
