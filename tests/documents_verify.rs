mod common;

use common::{seed_school, str_field, Sidecar};
use serde_json::json;

#[test]
fn issued_documents_verify_by_token() {
    let mut sc = Sidecar::start();
    let school = seed_school(&mut sc, 1);
    let sid = school.student_ids[0].clone();

    let rapor = sc.ok(
        "documents.issue",
        json!({ "kind": "rapor", "studentId": sid, "actorId": sid, "actorName": "Siswa 01" }),
    );
    let token = str_field(&rapor, "token");
    assert_eq!(token.len(), 32);
    assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(rapor["kind"], json!("rapor"));

    let cv = sc.ok("documents.issue", json!({ "kind": "CV", "studentId": sid }));
    assert_ne!(str_field(&cv, "token"), token);

    let verified = sc.ok("documents.verify", json!({ "token": token }));
    assert_eq!(verified["valid"], json!(true));
    assert_eq!(verified["kind"], json!("rapor"));
    assert_eq!(verified["studentName"], json!("Siswa 01"));
    assert_eq!(verified["issuedAt"], rapor["issuedAt"]);

    let log = sc.ok("activity.list", json!({ "limit": 2 }));
    let actions: Vec<_> = log["entries"]
        .as_array()
        .expect("entries")
        .iter()
        .map(|e| str_field(e, "action"))
        .collect();
    assert_eq!(actions, vec!["cv generated", "report card downloaded"]);
}

#[test]
fn unknown_tokens_are_reported_invalid() {
    let mut sc = Sidecar::start();
    seed_school(&mut sc, 1);

    let res = sc.ok(
        "documents.verify",
        json!({ "token": "0123456789abcdef0123456789abcdef" }),
    );
    assert_eq!(res, json!({ "valid": false }));

    let e = sc.fail("documents.verify", json!({ "token": "  " }));
    assert_eq!(e["code"], json!("bad_params"));
}

#[test]
fn issue_validates_kind_and_student() {
    let mut sc = Sidecar::start();
    let school = seed_school(&mut sc, 1);

    let e = sc.fail(
        "documents.issue",
        json!({ "kind": "ijazah", "studentId": school.student_ids[0] }),
    );
    assert_eq!(e["code"], json!("bad_params"));

    let e = sc.fail(
        "documents.issue",
        json!({ "kind": "rapor", "studentId": "ghost" }),
    );
    assert_eq!(e["code"], json!("not_found"));
}
