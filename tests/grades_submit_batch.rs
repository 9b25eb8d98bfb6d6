mod common;

use common::{seed_school, str_field, Sidecar};
use serde_json::json;

fn grade_count(sc: &mut Sidecar, class_id: &str, subject_id: &str) -> usize {
    let sheet = sc.ok(
        "grades.sheet",
        json!({ "classId": class_id, "subjectId": subject_id }),
    );
    sheet["rows"]
        .as_array()
        .expect("rows")
        .iter()
        .filter(|r| !r["gradeId"].is_null())
        .count()
}

#[test]
fn resubmitting_same_batch_keeps_one_record_per_student() {
    let mut sc = Sidecar::start();
    let school = seed_school(&mut sc, 3);

    let batch = json!({
        "subjectId": school.subject_id,
        "semester": "Ganjil",
        "academicYear": "2024/2025",
        "actorId": school.teacher_id,
        "actorName": "Budi",
        "entries": [
            { "studentId": school.student_ids[0], "knowledgeScore": 90, "skillScore": 86, "note": "Baik" },
            { "studentId": school.student_ids[1], "knowledgeScore": "65", "skillScore": "62" },
            { "studentId": school.student_ids[2], "knowledgeScore": "", "skillScore": "" }
        ]
    });

    let first = sc.ok("grades.submitBatch", batch.clone());
    assert_eq!(first["inserted"], json!(3));
    assert_eq!(first["updated"], json!(0));

    let second = sc.ok("grades.submitBatch", batch);
    assert_eq!(second["inserted"], json!(0));
    assert_eq!(second["updated"], json!(3));

    assert_eq!(grade_count(&mut sc, &school.class_id, &school.subject_id), 3);

    for (a, b) in first["records"]
        .as_array()
        .expect("records")
        .iter()
        .zip(second["records"].as_array().expect("records"))
    {
        assert_eq!(a["id"], b["id"]);
        assert_eq!(a["knowledgeScore"], b["knowledgeScore"]);
        assert_eq!(a["skillScore"], b["skillScore"]);
        assert_eq!(a["derivedGrade"], b["derivedGrade"]);
        assert_eq!(a["note"], b["note"]);
    }

    let grades: Vec<_> = second["records"]
        .as_array()
        .expect("records")
        .iter()
        .map(|r| r["derivedGrade"].as_str().unwrap_or("").to_string())
        .collect();
    assert_eq!(grades, vec!["A", "C", "-"]);
}

#[test]
fn resubmission_with_new_scores_updates_in_place() {
    let mut sc = Sidecar::start();
    let school = seed_school(&mut sc, 1);
    let sid = school.student_ids[0].clone();

    let first = sc.ok(
        "grades.submitBatch",
        json!({
            "subjectId": school.subject_id,
            "entries": [{ "studentId": sid, "knowledgeScore": 60, "skillScore": 64 }]
        }),
    );
    let record = &first["records"][0];
    let id = str_field(record, "id");
    let first_updated = str_field(record, "updatedAt");
    assert_eq!(record["derivedGrade"], json!("C"));
    assert_eq!(record["status"], json!("published"));
    assert_eq!(record["semester"], json!("Ganjil"));
    assert_eq!(record["academicYear"], json!("2024/2025"));

    sc.ok(
        "grades.submitBatch",
        json!({
            "subjectId": school.subject_id,
            "entries": [{ "studentId": sid, "knowledgeScore": 95, "skillScore": 91, "note": "Meningkat" }]
        }),
    );

    let got = sc.ok(
        "grades.get",
        json!({ "studentId": sid, "subjectId": school.subject_id }),
    );
    let grade = &got["grade"];
    assert_eq!(str_field(grade, "id"), id);
    assert_eq!(grade["knowledgeScore"], json!(95));
    assert_eq!(grade["skillScore"], json!(91));
    assert_eq!(grade["derivedGrade"], json!("A"));
    assert_eq!(grade["note"], json!("Meningkat"));
    assert!(str_field(grade, "updatedAt") >= first_updated);
    assert_eq!(grade["createdAt"], record["createdAt"]);
}

#[test]
fn blank_knowledge_score_is_stored_as_absent() {
    let mut sc = Sidecar::start();
    let school = seed_school(&mut sc, 1);

    let out = sc.ok(
        "grades.submitBatch",
        json!({
            "subjectId": school.subject_id,
            "entries": [{ "studentId": school.student_ids[0], "knowledgeScore": "", "skillScore": 90 }]
        }),
    );
    let record = &out["records"][0];
    assert!(record["knowledgeScore"].is_null());
    assert_eq!(record["skillScore"], json!(90));
    assert_eq!(record["derivedGrade"], json!("A"));
}

#[test]
fn zero_score_is_treated_as_not_entered() {
    let mut sc = Sidecar::start();
    let school = seed_school(&mut sc, 1);

    let out = sc.ok(
        "grades.submitBatch",
        json!({
            "subjectId": school.subject_id,
            "entries": [{ "studentId": school.student_ids[0], "knowledgeScore": 0, "skillScore": "0" }]
        }),
    );
    let record = &out["records"][0];
    assert!(record["knowledgeScore"].is_null());
    assert!(record["skillScore"].is_null());
    assert_eq!(record["derivedGrade"], json!("-"));
}

#[test]
fn failing_entry_rolls_back_whole_batch() {
    let mut sc = Sidecar::start();
    let school = seed_school(&mut sc, 4);

    sc.ok(
        "grades.submitBatch",
        json!({
            "subjectId": school.subject_id,
            "entries": [{ "studentId": school.student_ids[0], "knowledgeScore": 50, "skillScore": 50 }]
        }),
    );
    let before = sc.ok(
        "grades.sheet",
        json!({ "classId": school.class_id, "subjectId": school.subject_id }),
    );

    // The 4th entry references a student that does not exist.
    let e = sc.fail(
        "grades.submitBatch",
        json!({
            "subjectId": school.subject_id,
            "entries": [
                { "studentId": school.student_ids[0], "knowledgeScore": 99, "skillScore": 99 },
                { "studentId": school.student_ids[1], "knowledgeScore": 80, "skillScore": 80 },
                { "studentId": school.student_ids[2], "knowledgeScore": 70, "skillScore": 70 },
                { "studentId": "no-such-student", "knowledgeScore": 60, "skillScore": 60 },
                { "studentId": school.student_ids[3], "knowledgeScore": 90, "skillScore": 90 }
            ]
        }),
    );
    assert_eq!(e["code"], json!("grade_batch_failed"));
    let message = str_field(&e, "message");
    assert!(message.starts_with("failed to save grades:"), "{}", message);
    assert!(message.contains("FOREIGN KEY"), "{}", message);

    let after = sc.ok(
        "grades.sheet",
        json!({ "classId": school.class_id, "subjectId": school.subject_id }),
    );
    assert_eq!(before, after);
}

#[test]
fn legacy_parallel_arrays_are_accepted() {
    let mut sc = Sidecar::start();
    let school = seed_school(&mut sc, 2);

    let out = sc.ok(
        "grades.submitBatch",
        json!({
            "subjectId": school.subject_id,
            "semester": "genap",
            "academicYear": "2024/2025",
            "studentIds": [school.student_ids[0], school.student_ids[1]],
            "knowledgeScores": ["88", "61"],
            "skillScores": ["", "62"],
            "notes": ["Sangat baik"]
        }),
    );
    assert_eq!(out["inserted"], json!(2));
    assert_eq!(out["records"][0]["derivedGrade"], json!("A"));
    assert_eq!(out["records"][0]["semester"], json!("Genap"));
    assert_eq!(out["records"][1]["derivedGrade"], json!("D"));
    assert_eq!(out["records"][1]["note"], json!(""));

    let scalar = sc.ok(
        "grades.submitBatch",
        json!({
            "subjectId": school.subject_id,
            "semester": "Genap",
            "studentIds": school.student_ids[1],
            "knowledgeScores": 75,
            "skillScores": 75
        }),
    );
    assert_eq!(scalar["updated"], json!(1));
    assert_eq!(scalar["records"][0]["derivedGrade"], json!("B"));
}

#[test]
fn malformed_batches_are_rejected_without_writes() {
    let mut sc = Sidecar::start();
    let school = seed_school(&mut sc, 2);

    let e = sc.fail(
        "grades.submitBatch",
        json!({
            "subjectId": school.subject_id,
            "studentIds": [school.student_ids[0], school.student_ids[1]],
            "knowledgeScores": [80],
            "skillScores": [80, 70]
        }),
    );
    assert_eq!(e["code"], json!("bad_params"));

    let e = sc.fail(
        "grades.submitBatch",
        json!({
            "subjectId": school.subject_id,
            "entries": [
                { "studentId": school.student_ids[0], "knowledgeScore": 80 },
                { "studentId": school.student_ids[1], "skillScore": 140 }
            ]
        }),
    );
    assert_eq!(e["code"], json!("bad_params"));
    assert_eq!(e["details"]["index"], json!(1));

    let e = sc.fail(
        "grades.submitBatch",
        json!({
            "subjectId": school.subject_id,
            "semester": "Summer",
            "entries": []
        }),
    );
    assert_eq!(e["code"], json!("bad_params"));

    let e = sc.fail(
        "grades.submitBatch",
        json!({
            "subjectId": "missing-subject",
            "entries": [{ "studentId": school.student_ids[0], "knowledgeScore": 80 }]
        }),
    );
    assert_eq!(e["code"], json!("not_found"));

    assert_eq!(grade_count(&mut sc, &school.class_id, &school.subject_id), 0);
}

#[test]
fn grade_batches_are_audited() {
    let mut sc = Sidecar::start();
    let school = seed_school(&mut sc, 1);

    sc.ok(
        "grades.submitBatch",
        json!({
            "subjectId": school.subject_id,
            "actorId": school.teacher_id,
            "actorName": "Budi",
            "entries": [{ "studentId": school.student_ids[0], "knowledgeScore": 80 }]
        }),
    );

    let log = sc.ok("activity.list", json!({ "limit": 1 }));
    let entry = &log["entries"][0];
    assert_eq!(entry["action"], json!("grade batch submitted"));
    assert_eq!(entry["actorId"], json!(school.teacher_id));
    assert_eq!(entry["actorName"], json!("Bpk. Budi Santoso, S.Pd"));
    assert!(str_field(entry, "detail").contains("saved 1 grade(s)"));
}

#[test]
fn oversized_score_rejects_batch() {
    let mut sc = Sidecar::start();
    let school = seed_school(&mut sc, 1);

    let e = sc.fail(
        "grades.submitBatch",
        json!({
            "subjectId": school.subject_id,
            "entries": [{
                "studentId": school.student_ids[0],
                "knowledgeScore": "99999999999999999999",
                "skillScore": "90"
            }]
        }),
    );
    assert_eq!(e["code"], json!("bad_params"));
    assert_eq!(e["details"]["index"], json!(0));
    assert_eq!(grade_count(&mut sc, &school.class_id, &school.subject_id), 0);
}

#[test]
fn notes_are_stored_verbatim_and_anonymous_batches_are_attributed() {
    let mut sc = Sidecar::start();
    let school = seed_school(&mut sc, 1);

    let out = sc.ok(
        "grades.submitBatch",
        json!({
            "subjectId": school.subject_id,
            "entries": [{ "studentId": school.student_ids[0], "knowledgeScore": 80, "note": "  tingkatkan  " }]
        }),
    );
    assert_eq!(out["records"][0]["note"], json!("  tingkatkan  "));

    let log = sc.ok("activity.list", json!({ "limit": 1 }));
    let detail = str_field(&log["entries"][0], "detail");
    assert!(detail.starts_with("unknown saved 1 grade(s)"), "{}", detail);
}
