//! Grade reconciliation: turns a batch of per-student score submissions into
//! published grade records, one per (student, subject, semester, year).

use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const MIN_SCORE: i64 = 0;
pub const MAX_SCORE: i64 = 100;
pub const AUDIT_ACTION_GRADE_BATCH: &str = "grade batch submitted";

#[derive(Error, Debug)]
pub enum GradeError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("store rejected write: {0}")]
    Store(String),

    #[error("entry {index}: {message}")]
    InvalidEntry { index: usize, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Semester {
    Ganjil,
    Genap,
}

impl Semester {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ganjil" => Some(Self::Ganjil),
            "genap" => Some(Self::Genap),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ganjil => "Ganjil",
            Self::Genap => "Genap",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GradeStatus {
    Draft,
    Published,
}

impl GradeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }

    fn from_db(raw: &str) -> Self {
        if raw == "published" {
            Self::Published
        } else {
            Self::Draft
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DerivedGrade {
    A,
    B,
    C,
    D,
    #[serde(rename = "-")]
    Unassigned,
}

impl DerivedGrade {
    /// Classifies a mean score. A mean of exactly 0 means no score was present.
    pub fn from_mean(mean: f64) -> Self {
        if mean >= 88.0 {
            Self::A
        } else if mean >= 75.0 {
            Self::B
        } else if mean >= 62.0 {
            Self::C
        } else if mean > 0.0 {
            Self::D
        } else {
            Self::Unassigned
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::Unassigned => "-",
        }
    }

    fn from_db(raw: &str) -> Self {
        match raw {
            "A" => Self::A,
            "B" => Self::B,
            "C" => Self::C,
            "D" => Self::D,
            _ => Self::Unassigned,
        }
    }
}

/// Integer-prefix parse of a submitted score. Leading whitespace and an
/// optional sign are accepted, parsing stops at the first non-digit.
///
/// A parsed 0 is reported as absent: a genuine zero cannot be told apart
/// from "not entered yet". A digit run too long for `i64` saturates so the
/// range check still rejects it.
pub fn parse_score(raw: Option<&str>) -> Option<i64> {
    let s = raw?.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let magnitude: i64 = digits[..end].parse().unwrap_or(i64::MAX);
    let value = if negative { -magnitude } else { magnitude };
    if value == 0 {
        None
    } else {
        Some(value)
    }
}

/// Mean of whichever scores are present; 0 when none are.
pub fn mean_of_present(knowledge: Option<i64>, skill: Option<i64>) -> f64 {
    let present: Vec<i64> = [knowledge, skill].into_iter().flatten().collect();
    if present.is_empty() {
        return 0.0;
    }
    present.iter().sum::<i64>() as f64 / present.len() as f64
}

pub fn derive_grade(knowledge: Option<i64>, skill: Option<i64>) -> DerivedGrade {
    DerivedGrade::from_mean(mean_of_present(knowledge, skill))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeKey {
    pub student_id: String,
    pub subject_id: String,
    pub semester: Semester,
    pub academic_year: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRecord {
    /// `None` until the record has been stored.
    pub id: Option<String>,
    #[serde(flatten)]
    pub key: GradeKey,
    pub knowledge_score: Option<i64>,
    pub skill_score: Option<i64>,
    pub derived_grade: DerivedGrade,
    pub note: String,
    pub status: GradeStatus,
    pub created_at: Option<String>,
    pub updated_at: String,
}

/// Shared period and subject for every entry of a batch.
#[derive(Debug, Clone)]
pub struct BatchContext {
    pub subject_id: String,
    pub semester: Semester,
    pub academic_year: String,
}

impl BatchContext {
    fn key_for(&self, student_id: &str) -> GradeKey {
        GradeKey {
            student_id: student_id.to_string(),
            subject_id: self.subject_id.clone(),
            semester: self.semester,
            academic_year: self.academic_year.clone(),
        }
    }
}

/// One student's submission, scores still in their submitted text form.
#[derive(Debug, Clone, Default)]
pub struct GradeEntry {
    pub student_id: String,
    pub knowledge_score: Option<String>,
    pub skill_score: Option<String>,
    pub note: String,
}

#[derive(Debug, Clone, Default)]
pub struct Actor {
    pub id: Option<String>,
    pub name: String,
}

impl Actor {
    /// Name for audit text: the trimmed name, else the id, else "unknown".
    pub fn display_name(&self) -> &str {
        let name = self.name.trim();
        if !name.is_empty() {
            return name;
        }
        self.id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or("unknown")
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub records: Vec<GradeRecord>,
}

pub trait GradeStore {
    fn get_grade(&self, key: &GradeKey) -> Result<Option<GradeRecord>, GradeError>;

    /// Updates by primary key when `record.id` is set, inserts otherwise.
    /// Returns the stored record.
    fn upsert_grade(&mut self, record: GradeRecord) -> Result<GradeRecord, GradeError>;

    /// Runs `f` so that either every write it makes is committed or none is.
    fn run_atomic<T, F>(&mut self, f: F) -> Result<T, GradeError>
    where
        F: FnOnce(&mut Self) -> Result<T, GradeError>;
}

/// Receives one notification per committed batch. Failures are logged by the
/// caller and never undo the batch.
pub trait AuditSink {
    fn record(&self, actor: &Actor, action: &str, detail: &str) -> anyhow::Result<()>;
}

struct ParsedEntry {
    student_id: String,
    knowledge_score: Option<i64>,
    skill_score: Option<i64>,
    note: String,
}

fn parse_entries(entries: &[GradeEntry]) -> Result<Vec<ParsedEntry>, GradeError> {
    let mut parsed = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let student_id = entry.student_id.trim();
        if student_id.is_empty() {
            return Err(GradeError::InvalidEntry {
                index,
                message: "missing student id".to_string(),
            });
        }
        let knowledge_score = parse_score(entry.knowledge_score.as_deref());
        let skill_score = parse_score(entry.skill_score.as_deref());
        for (label, score) in [("knowledge", knowledge_score), ("skill", skill_score)] {
            if let Some(v) = score {
                if !(MIN_SCORE..=MAX_SCORE).contains(&v) {
                    return Err(GradeError::InvalidEntry {
                        index,
                        message: format!(
                            "{label} score {v} is outside {MIN_SCORE}..={MAX_SCORE}"
                        ),
                    });
                }
            }
        }
        parsed.push(ParsedEntry {
            student_id: student_id.to_string(),
            knowledge_score,
            skill_score,
            note: entry.note.clone(),
        });
    }
    Ok(parsed)
}

pub fn reconcile_batch<S: GradeStore>(
    store: &mut S,
    audit: &dyn AuditSink,
    actor: &Actor,
    ctx: &BatchContext,
    entries: &[GradeEntry],
) -> Result<BatchOutcome, GradeError> {
    let now = crate::db::now_timestamp();
    reconcile_batch_at(store, audit, actor, ctx, entries, &now)
}

/// Same as [`reconcile_batch`] with an explicit write timestamp.
pub fn reconcile_batch_at<S: GradeStore>(
    store: &mut S,
    audit: &dyn AuditSink,
    actor: &Actor,
    ctx: &BatchContext,
    entries: &[GradeEntry],
    now: &str,
) -> Result<BatchOutcome, GradeError> {
    let parsed = parse_entries(entries)?;

    let outcome = store.run_atomic(|store| {
        let mut outcome = BatchOutcome {
            inserted: 0,
            updated: 0,
            records: Vec::with_capacity(parsed.len()),
        };
        for entry in &parsed {
            let key = ctx.key_for(&entry.student_id);
            let derived_grade = derive_grade(entry.knowledge_score, entry.skill_score);
            let record = match store.get_grade(&key)? {
                Some(existing) => {
                    outcome.updated += 1;
                    GradeRecord {
                        knowledge_score: entry.knowledge_score,
                        skill_score: entry.skill_score,
                        derived_grade,
                        note: entry.note.clone(),
                        status: GradeStatus::Published,
                        updated_at: now.to_string(),
                        ..existing
                    }
                }
                None => {
                    outcome.inserted += 1;
                    GradeRecord {
                        id: None,
                        key,
                        knowledge_score: entry.knowledge_score,
                        skill_score: entry.skill_score,
                        derived_grade,
                        note: entry.note.clone(),
                        status: GradeStatus::Published,
                        created_at: Some(now.to_string()),
                        updated_at: now.to_string(),
                    }
                }
            };
            debug!(
                student_id = %entry.student_id,
                grade = derived_grade.as_str(),
                "reconciling grade"
            );
            outcome.records.push(store.upsert_grade(record)?);
        }
        Ok(outcome)
    })?;

    info!(
        subject_id = %ctx.subject_id,
        semester = ctx.semester.as_str(),
        academic_year = %ctx.academic_year,
        inserted = outcome.inserted,
        updated = outcome.updated,
        "grade batch committed"
    );

    let detail = format!(
        "{} saved {} grade(s) for subject {} ({} {})",
        actor.display_name(),
        outcome.records.len(),
        ctx.subject_id,
        ctx.semester.as_str(),
        ctx.academic_year
    );
    if let Err(e) = audit.record(actor, AUDIT_ACTION_GRADE_BATCH, &detail) {
        warn!(error = %e, "failed to append grade batch audit entry");
    }

    Ok(outcome)
}

const GRADE_COLUMNS: &str = "id, student_id, subject_id, semester, academic_year,
    knowledge_score, skill_score, derived_grade, note, status, created_at, updated_at";

fn grade_from_row(row: &Row<'_>) -> rusqlite::Result<GradeRecord> {
    let semester_raw: String = row.get(3)?;
    let semester = Semester::parse(&semester_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown semester {semester_raw:?}").into(),
        )
    })?;
    let derived: String = row.get(7)?;
    let status: String = row.get(9)?;
    Ok(GradeRecord {
        id: Some(row.get(0)?),
        key: GradeKey {
            student_id: row.get(1)?,
            subject_id: row.get(2)?,
            semester,
            academic_year: row.get(4)?,
        },
        knowledge_score: row.get(5)?,
        skill_score: row.get(6)?,
        derived_grade: DerivedGrade::from_db(&derived),
        note: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
        status: GradeStatus::from_db(&status),
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

pub struct SqliteGradeStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteGradeStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl GradeStore for SqliteGradeStore<'_> {
    fn get_grade(&self, key: &GradeKey) -> Result<Option<GradeRecord>, GradeError> {
        let sql = format!(
            "SELECT {GRADE_COLUMNS} FROM grades
             WHERE student_id = ? AND subject_id = ? AND semester = ? AND academic_year = ?"
        );
        let record = self
            .conn
            .query_row(
                &sql,
                (
                    &key.student_id,
                    &key.subject_id,
                    key.semester.as_str(),
                    &key.academic_year,
                ),
                grade_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn upsert_grade(&mut self, mut record: GradeRecord) -> Result<GradeRecord, GradeError> {
        match record.id.clone() {
            Some(id) => {
                let changed = self.conn.execute(
                    "UPDATE grades SET
                       knowledge_score = ?, skill_score = ?, derived_grade = ?,
                       note = ?, status = ?, updated_at = ?
                     WHERE id = ?",
                    (
                        record.knowledge_score,
                        record.skill_score,
                        record.derived_grade.as_str(),
                        &record.note,
                        record.status.as_str(),
                        &record.updated_at,
                        &id,
                    ),
                )?;
                if changed != 1 {
                    return Err(GradeError::Store(format!("grade {id} no longer exists")));
                }
            }
            None => {
                let id = Uuid::new_v4().to_string();
                let created_at = record
                    .created_at
                    .clone()
                    .unwrap_or_else(|| record.updated_at.clone());
                self.conn.execute(
                    "INSERT INTO grades(id, student_id, subject_id, semester, academic_year,
                       knowledge_score, skill_score, derived_grade, note, status, created_at, updated_at)
                     VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    rusqlite::params![
                        &id,
                        &record.key.student_id,
                        &record.key.subject_id,
                        record.key.semester.as_str(),
                        &record.key.academic_year,
                        record.knowledge_score,
                        record.skill_score,
                        record.derived_grade.as_str(),
                        &record.note,
                        record.status.as_str(),
                        &created_at,
                        &record.updated_at,
                    ],
                )?;
                record.id = Some(id);
                record.created_at = Some(created_at);
            }
        }
        Ok(record)
    }

    fn run_atomic<T, F>(&mut self, f: F) -> Result<T, GradeError>
    where
        F: FnOnce(&mut Self) -> Result<T, GradeError>,
    {
        let conn: &Connection = self.conn;
        // Dropping the transaction without commit rolls it back.
        let tx = conn.unchecked_transaction()?;
        let out = f(self)?;
        tx.commit()?;
        Ok(out)
    }
}
