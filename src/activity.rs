use crate::db::now_timestamp;
use crate::grades::{Actor, AuditSink};
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

pub const RECENT_ACTIVITY_LIMIT: i64 = 20;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: String,
    pub actor_id: Option<String>,
    pub actor_name: Option<String>,
    pub action: String,
    pub detail: Option<String>,
    pub created_at: String,
}

pub fn append(conn: &Connection, actor: &Actor, action: &str, detail: &str) -> anyhow::Result<()> {
    let name = Some(actor.name.trim()).filter(|n| !n.is_empty());
    conn.execute(
        "INSERT INTO activity_log(id, actor_id, actor_name, action, detail, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            actor.id.as_deref(),
            name,
            action,
            detail,
            now_timestamp(),
        ),
    )?;
    Ok(())
}

/// Appends like [`append`] but only logs a failure; used after the main
/// write of a request has already succeeded.
pub fn append_best_effort(conn: &Connection, actor: &Actor, action: &str, detail: &str) {
    if let Err(e) = append(conn, actor, action, detail) {
        tracing::warn!(error = %e, action, "failed to append activity entry");
    }
}

/// Newest first. The actor name prefers the current teacher/student record
/// over the name captured at write time.
pub fn list_recent(conn: &Connection, limit: i64) -> anyhow::Result<Vec<ActivityEntry>> {
    let mut stmt = conn.prepare(
        "SELECT
           a.id,
           a.actor_id,
           COALESCE(t.full_name, s.full_name, a.actor_name),
           a.action,
           a.detail,
           a.created_at
         FROM activity_log a
         LEFT JOIN teachers t ON t.id = a.actor_id
         LEFT JOIN students s ON s.id = a.actor_id
         ORDER BY a.created_at DESC, a.rowid DESC
         LIMIT ?",
    )?;
    let rows = stmt
        .query_map([limit], |row| {
            Ok(ActivityEntry {
                id: row.get(0)?,
                actor_id: row.get(1)?,
                actor_name: row.get(2)?,
                action: row.get(3)?,
                detail: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct SqliteActivityLog<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteActivityLog<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl AuditSink for SqliteActivityLog<'_> {
    fn record(&self, actor: &Actor, action: &str, detail: &str) -> anyhow::Result<()> {
        append(self.conn, actor, action, detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        crate::db::init_schema(&conn).expect("schema");
        conn
    }

    #[test]
    fn list_returns_newest_first_and_resolves_names() {
        let conn = memory_db();
        conn.execute(
            "INSERT INTO teachers(id, full_name, created_at) VALUES('t1', 'Siti Aminah', 'now')",
            [],
        )
        .expect("teacher");

        let admin = Actor {
            id: Some("admin".to_string()),
            name: "Administrator".to_string(),
        };
        let teacher = Actor {
            id: Some("t1".to_string()),
            name: "stale name".to_string(),
        };
        append(&conn, &admin, "class created", "XII-IPA 1").expect("first");
        append(&conn, &teacher, "grade batch submitted", "2 grades").expect("second");

        let entries = list_recent(&conn, 10).expect("list");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "grade batch submitted");
        assert_eq!(entries[0].actor_name.as_deref(), Some("Siti Aminah"));
        assert_eq!(entries[1].actor_name.as_deref(), Some("Administrator"));
    }

    #[test]
    fn limit_is_respected() {
        let conn = memory_db();
        let sink = SqliteActivityLog::new(&conn);
        for i in 0..5 {
            sink.record(&Actor::default(), "tick", &i.to_string())
                .expect("record");
        }
        assert_eq!(list_recent(&conn, 3).expect("list").len(), 3);
        let anon = list_recent(&conn, 1).expect("list");
        assert_eq!(anon[0].actor_name, None);
    }
}
