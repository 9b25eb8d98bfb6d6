use crate::activity;
use crate::db::now_timestamp;
use crate::grades::Actor;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Rapor,
    Cv,
}

impl DocumentKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "rapor" => Some(Self::Rapor),
            "cv" => Some(Self::Cv),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rapor => "rapor",
            Self::Cv => "cv",
        }
    }

    fn action_label(self) -> &'static str {
        match self {
            Self::Rapor => "report card downloaded",
            Self::Cv => "cv generated",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedDocument {
    pub id: String,
    pub kind: DocumentKind,
    pub student_id: String,
    pub token: String,
    pub issued_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedDocument {
    pub kind: String,
    pub student_name: String,
    pub issued_at: String,
    pub token: String,
}

/// 128 random bits as 32 lowercase hex characters.
pub fn new_verification_token() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn issue(
    conn: &Connection,
    kind: DocumentKind,
    student_id: &str,
    actor: &Actor,
) -> anyhow::Result<IssuedDocument> {
    let doc = IssuedDocument {
        id: Uuid::new_v4().to_string(),
        kind,
        student_id: student_id.to_string(),
        token: new_verification_token(),
        issued_at: now_timestamp(),
    };
    conn.execute(
        "INSERT INTO documents(id, kind, student_id, verification_token, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (
            &doc.id,
            kind.as_str(),
            &doc.student_id,
            &doc.token,
            &doc.issued_at,
        ),
    )?;
    activity::append_best_effort(
        conn,
        actor,
        kind.action_label(),
        &format!("{} issued {} document. Token: {}", actor.name, kind.as_str(), doc.token),
    );
    Ok(doc)
}

pub fn verify(conn: &Connection, token: &str) -> anyhow::Result<Option<VerifiedDocument>> {
    let doc = conn
        .query_row(
            "SELECT d.kind, s.full_name, d.created_at, d.verification_token
             FROM documents d
             JOIN students s ON s.id = d.student_id
             WHERE d.verification_token = ?",
            [token.trim()],
            |row| {
                Ok(VerifiedDocument {
                    kind: row.get(0)?,
                    student_name: row.get(1)?,
                    issued_at: row.get(2)?,
                    token: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(doc)
}
