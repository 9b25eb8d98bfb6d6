use crate::activity::SqliteActivityLog;
use crate::grades::{
    reconcile_batch, BatchContext, GradeEntry, GradeError, GradeKey, GradeStore, SqliteGradeStore,
};
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{
    academic_year_param, actor_param, ensure_exists, req_str, require_db, semester_param,
    value_raw_text, value_text,
};
use crate::ipc::types::{AppState, Request};
use crate::reports;
use serde_json::json;

const GRADE_BATCH_MAX_ENTRIES: usize = 2000;

fn entry_from_object(index: usize, raw: &serde_json::Value) -> Result<GradeEntry, HandlerErr> {
    let Some(obj) = raw.as_object() else {
        return Err(
            HandlerErr::bad_params(format!("entry at index {} must be an object", index))
                .with_details(json!({ "index": index })),
        );
    };
    let Some(student_id) = obj.get("studentId").and_then(value_text) else {
        return Err(
            HandlerErr::bad_params(format!("entry at index {} missing studentId", index))
                .with_details(json!({ "index": index })),
        );
    };
    Ok(GradeEntry {
        student_id,
        knowledge_score: obj.get("knowledgeScore").and_then(value_text),
        skill_score: obj.get("skillScore").and_then(value_text),
        note: obj.get("note").and_then(value_raw_text).unwrap_or_default(),
    })
}

/// A lone scalar becomes a one-element list; a missing field an empty one.
fn as_list(v: Option<&serde_json::Value>) -> Vec<serde_json::Value> {
    match v {
        None | Some(serde_json::Value::Null) => Vec::new(),
        Some(serde_json::Value::Array(items)) => items.clone(),
        Some(scalar) => vec![scalar.clone()],
    }
}

fn entries_from_parallel_arrays(
    params: &serde_json::Value,
) -> Result<Vec<GradeEntry>, HandlerErr> {
    let student_ids = as_list(params.get("studentIds"));
    let knowledge = as_list(params.get("knowledgeScores"));
    let skill = as_list(params.get("skillScores"));
    let notes = as_list(params.get("notes"));

    if knowledge.len() != student_ids.len() || skill.len() != student_ids.len() {
        return Err(
            HandlerErr::bad_params("studentIds, knowledgeScores and skillScores must have equal length")
                .with_details(json!({
                    "studentIds": student_ids.len(),
                    "knowledgeScores": knowledge.len(),
                    "skillScores": skill.len()
                })),
        );
    }

    let mut entries = Vec::with_capacity(student_ids.len());
    for (i, raw_id) in student_ids.iter().enumerate() {
        let Some(student_id) = value_text(raw_id) else {
            return Err(
                HandlerErr::bad_params(format!("studentIds[{}] is missing or blank", i))
                    .with_details(json!({ "index": i })),
            );
        };
        entries.push(GradeEntry {
            student_id,
            knowledge_score: value_text(&knowledge[i]),
            skill_score: value_text(&skill[i]),
            note: notes.get(i).and_then(value_raw_text).unwrap_or_default(),
        });
    }
    Ok(entries)
}

fn collect_entries(params: &serde_json::Value) -> Result<Vec<GradeEntry>, HandlerErr> {
    let entries = if let Some(arr) = params.get("entries").and_then(|v| v.as_array()) {
        arr.iter()
            .enumerate()
            .map(|(i, raw)| entry_from_object(i, raw))
            .collect::<Result<Vec<_>, _>>()?
    } else if params.get("studentIds").is_some() {
        entries_from_parallel_arrays(params)?
    } else {
        return Err(HandlerErr::bad_params("missing entries[]"));
    };

    if entries.len() > GRADE_BATCH_MAX_ENTRIES {
        return Err(HandlerErr::bad_params(format!(
            "batch exceeds max entries: {} > {}",
            entries.len(),
            GRADE_BATCH_MAX_ENTRIES
        )));
    }
    Ok(entries)
}

fn submit_batch(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let subject_id = req_str(req, "subjectId")?;
    let ctx = BatchContext {
        subject_id,
        semester: semester_param(state, req)?,
        academic_year: academic_year_param(state, req),
    };
    let entries = collect_entries(&req.params)?;
    ensure_exists(conn, "subjects", &ctx.subject_id, "subject")?;

    let actor = actor_param(req);
    let mut store = SqliteGradeStore::new(conn);
    let audit = SqliteActivityLog::new(conn);

    match reconcile_batch(&mut store, &audit, &actor, &ctx, &entries) {
        Ok(outcome) => serde_json::to_value(&outcome)
            .map_err(|e| HandlerErr::new("internal", e.to_string())),
        Err(GradeError::InvalidEntry { index, message }) => {
            Err(HandlerErr::bad_params(message).with_details(json!({ "index": index })))
        }
        Err(e) => {
            tracing::warn!(error = %e, subject_id = %ctx.subject_id, "grade batch rejected");
            Err(HandlerErr::new(
                "grade_batch_failed",
                format!("failed to save grades: {}", e),
            ))
        }
    }
}

fn get_grade(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let key = GradeKey {
        student_id: req_str(req, "studentId")?,
        subject_id: req_str(req, "subjectId")?,
        semester: semester_param(state, req)?,
        academic_year: academic_year_param(state, req),
    };
    let store = SqliteGradeStore::new(conn);
    match store.get_grade(&key).map_err(HandlerErr::query)? {
        Some(record) => Ok(json!({ "grade": record })),
        None => Err(HandlerErr::new("not_found", "grade not found").with_details(json!(key))),
    }
}

fn grade_sheet(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = req_str(req, "classId")?;
    let subject_id = req_str(req, "subjectId")?;
    let semester = semester_param(state, req)?;
    let academic_year = academic_year_param(state, req);

    let sheet = reports::grade_sheet(conn, &class_id, &subject_id, semester, &academic_year)
        .map_err(HandlerErr::query)?;
    match sheet {
        Some(sheet) => Ok(json!(sheet)),
        None => Err(HandlerErr::new("not_found", "subject not found")
            .with_details(json!({ "subjectId": subject_id }))),
    }
}

fn respond(req: &Request, res: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match res {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.submitBatch" => Some(respond(req, submit_batch(state, req))),
        "grades.get" => Some(respond(req, get_grade(state, req))),
        "grades.sheet" => Some(respond(req, grade_sheet(state, req))),
        _ => None,
    }
}
