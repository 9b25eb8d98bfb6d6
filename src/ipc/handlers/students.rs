use crate::activity;
use crate::db::now_timestamp;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{actor_param, ensure_exists, opt_str, req_str, require_db};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "students": [] }));
    };
    let class_filter = opt_str(req, "classId");

    let mut stmt = match conn.prepare(
        "SELECT s.id, s.full_name, s.nisn, s.class_id, c.name,
                s.gender, s.birth_place, s.birth_date
         FROM students s
         LEFT JOIN classes c ON c.id = s.class_id
         WHERE ?1 IS NULL OR s.class_id = ?1
         ORDER BY s.full_name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&class_filter], |row| {
            let id: String = row.get(0)?;
            let full_name: String = row.get(1)?;
            let nisn: String = row.get(2)?;
            let class_id: Option<String> = row.get(3)?;
            let class_name: Option<String> = row.get(4)?;
            let gender: Option<String> = row.get(5)?;
            let birth_place: Option<String> = row.get(6)?;
            let birth_date: Option<String> = row.get(7)?;
            Ok(json!({
                "id": id,
                "fullName": full_name,
                "nisn": nisn,
                "classId": class_id,
                "className": class_name,
                "gender": gender,
                "birthPlace": birth_place,
                "birthDate": birth_date
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn create_student(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let full_name = req_str(req, "fullName")?;
    let nisn = req_str(req, "nisn")?;
    let class_id = opt_str(req, "classId");
    if let Some(cid) = class_id.as_deref() {
        ensure_exists(conn, "classes", cid, "class")?;
    }
    let gender = match opt_str(req, "gender").map(|g| g.to_ascii_uppercase()) {
        None => None,
        Some(g) if g == "L" || g == "P" => Some(g),
        Some(other) => {
            return Err(HandlerErr::bad_params("gender must be one of: L, P")
                .with_details(json!({ "gender": other })))
        }
    };
    let birth_place = opt_str(req, "birthPlace");
    let birth_date = opt_str(req, "birthDate");

    let student_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, class_id, full_name, nisn, birth_place, birth_date, gender, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &student_id,
            &class_id,
            &full_name,
            &nisn,
            &birth_place,
            &birth_date,
            &gender,
            now_timestamp(),
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "students" }))
    })?;

    activity::append_best_effort(
        conn,
        &actor_param(req),
        "student created",
        &format!("Added student: {}", full_name),
    );
    Ok(json!({ "studentId": student_id, "fullName": full_name, "nisn": nisn }))
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    match create_student(state, req) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

// Dependent rows first; there is no ON DELETE CASCADE.
const STUDENT_DEPENDENT_TABLES: [&str; 5] = [
    "grades",
    "attendance",
    "extracurriculars",
    "cv_profiles",
    "documents",
];

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match req_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = ensure_exists(conn, "students", &student_id, "student") {
        return e.response(&req.id);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    for table in STUDENT_DEPENDENT_TABLES {
        let sql = format!("DELETE FROM {} WHERE student_id = ?", table);
        if let Err(e) = tx.execute(&sql, [&student_id]) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": table })),
            );
        }
    }
    if let Err(e) = tx.execute("DELETE FROM students WHERE id = ?", [&student_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }

    activity::append_best_effort(
        conn,
        &actor_param(req),
        "student deleted",
        &format!("Deleted student ID: {}", student_id),
    );
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
