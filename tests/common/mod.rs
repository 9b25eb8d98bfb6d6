#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tempfile::TempDir;

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
    pub workspace: TempDir,
}

impl Sidecar {
    /// Spawns the daemon and selects a fresh temp workspace.
    pub fn start() -> Self {
        let mut sidecar = Self::spawn_with_env(&[]);
        let path = sidecar.workspace.path().to_string_lossy().to_string();
        sidecar.ok("workspace.select", json!({ "path": path }));
        sidecar
    }

    pub fn spawn_with_env(env: &[(&str, &str)]) -> Self {
        let workspace = TempDir::new().expect("create temp workspace");
        let exe = env!("CARGO_BIN_EXE_rapord");
        let mut cmd = Command::new(exe);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .env_remove("RAPORD_WORKSPACE")
            .env_remove("RAPORD_DEFAULT_SEMESTER")
            .env_remove("RAPORD_DEFAULT_ACADEMIC_YEAR");
        for (k, v) in env {
            cmd.env(k, v);
        }
        let mut child = cmd.spawn().expect("spawn rapord");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
            workspace,
        }
    }

    pub fn send_line(&mut self, line: &str) -> serde_json::Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");

        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn request(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        let value = self.send_line(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    /// Asserts failure and returns the error object.
    pub fn fail(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value.get("error").cloned().unwrap_or_else(|| json!({}))
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn str_field(v: &serde_json::Value, key: &str) -> String {
    v.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", key, v))
        .to_string()
}

pub struct School {
    pub class_id: String,
    pub teacher_id: String,
    pub subject_id: String,
    pub student_ids: Vec<String>,
}

/// One class, one teacher teaching one subject, and `students` students.
pub fn seed_school(sc: &mut Sidecar, students: usize) -> School {
    let teacher = sc.ok(
        "teachers.create",
        json!({ "fullName": "Bpk. Budi Santoso, S.Pd", "nip": "198501012010011001" }),
    );
    let teacher_id = str_field(&teacher, "teacherId");

    let class = sc.ok(
        "classes.create",
        json!({
            "name": "XII-IPA 1",
            "major": "IPA",
            "academicYear": "2024/2025",
            "homeroomTeacherId": teacher_id
        }),
    );
    let class_id = str_field(&class, "classId");

    let subject = sc.ok(
        "subjects.create",
        json!({
            "name": "Matematika Wajib",
            "code": "MAT-01",
            "kkm": 75,
            "teacherId": teacher_id,
            "classId": class_id
        }),
    );
    let subject_id = str_field(&subject, "subjectId");

    let mut student_ids = Vec::with_capacity(students);
    for i in 0..students {
        let student = sc.ok(
            "students.create",
            json!({
                "fullName": format!("Siswa {:02}", i + 1),
                "nisn": format!("00567812{:02}", 34 + i),
                "classId": class_id,
                "gender": if i % 2 == 0 { "L" } else { "P" }
            }),
        );
        student_ids.push(str_field(&student, "studentId"));
    }

    School {
        class_id,
        teacher_id,
        subject_id,
        student_ids,
    }
}
