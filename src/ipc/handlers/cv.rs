use crate::activity;
use crate::db::now_timestamp;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{actor_param, ensure_exists, opt_str, req_str, require_db};
use crate::ipc::types::{AppState, Request};
use crate::reports;
use rusqlite::OptionalExtension;
use serde_json::json;

const DEFAULT_TEMPLATE: &str = "modern";

fn get_cv(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = req_str(req, "studentId")?;
    ensure_exists(conn, "students", &student_id, "student")?;

    let profile = conn
        .query_row(
            "SELECT template, target_job, about, experience_title, experience_desc,
                    organizations, updated_at
             FROM cv_profiles WHERE student_id = ?",
            [&student_id],
            |row| {
                let template: String = row.get(0)?;
                let target_job: Option<String> = row.get(1)?;
                let about: Option<String> = row.get(2)?;
                let experience_title: Option<String> = row.get(3)?;
                let experience_desc: Option<String> = row.get(4)?;
                let organizations: Option<String> = row.get(5)?;
                let updated_at: String = row.get(6)?;
                Ok(json!({
                    "template": template,
                    "targetJob": target_job,
                    "about": about,
                    "experienceTitle": experience_title,
                    "experienceDesc": experience_desc,
                    "organizations": organizations,
                    "updatedAt": updated_at
                }))
            },
        )
        .optional()
        .map_err(HandlerErr::query)?;

    let top_skills = reports::top_skills(conn, &student_id).map_err(HandlerErr::query)?;
    Ok(json!({ "profile": profile, "topSkills": top_skills }))
}

fn save_cv(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = req_str(req, "studentId")?;
    ensure_exists(conn, "students", &student_id, "student")?;
    let template = opt_str(req, "template").unwrap_or_else(|| DEFAULT_TEMPLATE.to_string());

    conn.execute(
        "INSERT INTO cv_profiles(student_id, template, target_job, about, experience_title,
           experience_desc, organizations, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id) DO UPDATE SET
           template = excluded.template,
           target_job = excluded.target_job,
           about = excluded.about,
           experience_title = excluded.experience_title,
           experience_desc = excluded.experience_desc,
           organizations = excluded.organizations,
           updated_at = excluded.updated_at",
        (
            &student_id,
            &template,
            opt_str(req, "targetJob"),
            opt_str(req, "about"),
            opt_str(req, "experienceTitle"),
            opt_str(req, "experienceDesc"),
            opt_str(req, "organizations"),
            now_timestamp(),
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "cv_profiles" }))
    })?;

    let actor = actor_param(req);
    activity::append_best_effort(
        conn,
        &actor,
        "cv updated",
        &format!("{} updated CV data.", actor.name),
    );
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "cv.get" => get_cv(state, req),
        "cv.save" => save_cv(state, req),
        _ => return None,
    };
    Some(match res {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
