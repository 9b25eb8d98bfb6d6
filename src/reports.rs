//! Read models for the report card, grade-entry sheet and dashboards.

use crate::activity::{self, ActivityEntry, RECENT_ACTIVITY_LIMIT};
use crate::grades::{mean_of_present, Semester};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

pub const DEFAULT_KKM: i64 = 75;
pub const TOP_SKILLS_LIMIT: i64 = 5;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub id: String,
    pub full_name: String,
    pub nisn: String,
    pub class_id: Option<String>,
    pub birth_place: Option<String>,
    pub birth_date: Option<String>,
    pub gender: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSummary {
    pub id: String,
    pub name: String,
    pub major: Option<String>,
    pub academic_year: String,
    pub homeroom_teacher: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportLine {
    pub subject_id: String,
    pub subject_name: String,
    pub subject_code: String,
    pub kkm: i64,
    pub knowledge_score: Option<i64>,
    pub skill_score: Option<i64>,
    pub final_score: f64,
    pub derived_grade: String,
    pub passed: bool,
    pub note: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub sick: i64,
    pub permitted: i64,
    pub unexcused: i64,
}

impl Attendance {
    pub fn total_absences(&self) -> i64 {
        self.sick + self.permitted + self.unexcused
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Extracurricular {
    pub id: String,
    pub name: String,
    pub grade: Option<String>,
    pub remark: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCard {
    pub student: StudentSummary,
    pub class: Option<ClassSummary>,
    pub semester: Semester,
    pub academic_year: String,
    pub grades: Vec<ReportLine>,
    pub attendance: Attendance,
    pub extracurriculars: Vec<Extracurricular>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetRow {
    pub student_id: String,
    pub full_name: String,
    pub nisn: String,
    pub grade_id: Option<String>,
    pub knowledge_score: Option<i64>,
    pub skill_score: Option<i64>,
    pub derived_grade: Option<String>,
    pub note: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSheet {
    pub class_id: String,
    pub subject_id: String,
    pub kkm: i64,
    pub semester: Semester,
    pub academic_year: String,
    pub rows: Vec<SheetRow>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminDashboard {
    pub total_students: i64,
    pub total_teachers: i64,
    pub total_classes: i64,
    pub total_subjects: i64,
    pub recent_activity: Vec<ActivityEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherDashboard {
    pub total_students: i64,
    pub total_subjects: i64,
    pub grades_entered: i64,
    pub total_classes: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDashboard {
    pub student: StudentSummary,
    pub class: Option<ClassSummary>,
    pub grade_index: String,
    pub attendance_percent: i64,
    pub published_grades: i64,
}

pub fn load_student(conn: &Connection, student_id: &str) -> anyhow::Result<Option<StudentSummary>> {
    let student = conn
        .query_row(
            "SELECT id, full_name, nisn, class_id, birth_place, birth_date, gender
             FROM students WHERE id = ?",
            [student_id],
            |row| {
                Ok(StudentSummary {
                    id: row.get(0)?,
                    full_name: row.get(1)?,
                    nisn: row.get(2)?,
                    class_id: row.get(3)?,
                    birth_place: row.get(4)?,
                    birth_date: row.get(5)?,
                    gender: row.get(6)?,
                })
            },
        )
        .optional()?;
    Ok(student)
}

fn load_class(conn: &Connection, class_id: Option<&str>) -> anyhow::Result<Option<ClassSummary>> {
    let Some(class_id) = class_id else {
        return Ok(None);
    };
    let class = conn
        .query_row(
            "SELECT c.id, c.name, c.major, c.academic_year, t.full_name
             FROM classes c
             LEFT JOIN teachers t ON t.id = c.homeroom_teacher_id
             WHERE c.id = ?",
            [class_id],
            |row| {
                Ok(ClassSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    major: row.get(2)?,
                    academic_year: row.get(3)?,
                    homeroom_teacher: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(class)
}

pub fn load_attendance(
    conn: &Connection,
    student_id: &str,
    semester: Semester,
    academic_year: &str,
) -> anyhow::Result<Attendance> {
    let attendance = conn
        .query_row(
            "SELECT sick, permitted, unexcused FROM attendance
             WHERE student_id = ? AND semester = ? AND academic_year = ?",
            (student_id, semester.as_str(), academic_year),
            |row| {
                Ok(Attendance {
                    sick: row.get(0)?,
                    permitted: row.get(1)?,
                    unexcused: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(attendance.unwrap_or_default())
}

pub fn list_extracurriculars(
    conn: &Connection,
    student_id: &str,
    semester: Semester,
    academic_year: &str,
) -> anyhow::Result<Vec<Extracurricular>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, grade, remark FROM extracurriculars
         WHERE student_id = ? AND semester = ? AND academic_year = ?
         ORDER BY name",
    )?;
    let rows = stmt
        .query_map((student_id, semester.as_str(), academic_year), |row| {
            Ok(Extracurricular {
                id: row.get(0)?,
                name: row.get(1)?,
                grade: row.get(2)?,
                remark: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// `None` when the student does not exist. Only published grades appear.
pub fn report_card(
    conn: &Connection,
    student_id: &str,
    semester: Semester,
    academic_year: &str,
) -> anyhow::Result<Option<ReportCard>> {
    let Some(student) = load_student(conn, student_id)? else {
        return Ok(None);
    };
    let class = load_class(conn, student.class_id.as_deref())?;

    let mut stmt = conn.prepare(
        "SELECT g.subject_id, m.name, m.code, m.kkm,
                g.knowledge_score, g.skill_score, g.derived_grade, g.note
         FROM grades g
         JOIN subjects m ON m.id = g.subject_id
         WHERE g.student_id = ? AND g.semester = ? AND g.academic_year = ?
           AND g.status = 'published'
         ORDER BY m.name",
    )?;
    let grades = stmt
        .query_map((student_id, semester.as_str(), academic_year), |row| {
            let kkm: i64 = row.get(3)?;
            let knowledge_score: Option<i64> = row.get(4)?;
            let skill_score: Option<i64> = row.get(5)?;
            let final_score = mean_of_present(knowledge_score, skill_score);
            Ok(ReportLine {
                subject_id: row.get(0)?,
                subject_name: row.get(1)?,
                subject_code: row.get(2)?,
                kkm,
                knowledge_score,
                skill_score,
                final_score,
                derived_grade: row.get(6)?,
                passed: final_score >= kkm as f64,
                note: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let attendance = load_attendance(conn, student_id, semester, academic_year)?;
    let extracurriculars = list_extracurriculars(conn, student_id, semester, academic_year)?;

    Ok(Some(ReportCard {
        student,
        class,
        semester,
        academic_year: academic_year.to_string(),
        grades,
        attendance,
        extracurriculars,
    }))
}

/// `None` when the subject does not exist.
pub fn grade_sheet(
    conn: &Connection,
    class_id: &str,
    subject_id: &str,
    semester: Semester,
    academic_year: &str,
) -> anyhow::Result<Option<GradeSheet>> {
    let kkm: Option<i64> = conn
        .query_row("SELECT kkm FROM subjects WHERE id = ?", [subject_id], |r| {
            r.get(0)
        })
        .optional()?;
    let Some(kkm) = kkm else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT s.id, s.full_name, s.nisn,
                g.id, g.knowledge_score, g.skill_score, g.derived_grade, g.note, g.status
         FROM students s
         LEFT JOIN grades g
           ON g.student_id = s.id AND g.subject_id = ?
          AND g.semester = ? AND g.academic_year = ?
         WHERE s.class_id = ?
         ORDER BY s.full_name",
    )?;
    let rows = stmt
        .query_map(
            (subject_id, semester.as_str(), academic_year, class_id),
            |row| {
                Ok(SheetRow {
                    student_id: row.get(0)?,
                    full_name: row.get(1)?,
                    nisn: row.get(2)?,
                    grade_id: row.get(3)?,
                    knowledge_score: row.get(4)?,
                    skill_score: row.get(5)?,
                    derived_grade: row.get(6)?,
                    note: row.get(7)?,
                    status: row.get(8)?,
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(GradeSheet {
        class_id: class_id.to_string(),
        subject_id: subject_id.to_string(),
        kkm,
        semester,
        academic_year: academic_year.to_string(),
        rows,
    }))
}

fn count(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> anyhow::Result<i64> {
    Ok(conn.query_row(sql, params, |r| r.get(0))?)
}

pub fn admin_dashboard(conn: &Connection) -> anyhow::Result<AdminDashboard> {
    Ok(AdminDashboard {
        total_students: count(conn, "SELECT COUNT(*) FROM students", [])?,
        total_teachers: count(conn, "SELECT COUNT(*) FROM teachers", [])?,
        total_classes: count(conn, "SELECT COUNT(*) FROM classes", [])?,
        total_subjects: count(conn, "SELECT COUNT(*) FROM subjects", [])?,
        recent_activity: activity::list_recent(conn, RECENT_ACTIVITY_LIMIT)?,
    })
}

pub fn teacher_dashboard(conn: &Connection, teacher_id: &str) -> anyhow::Result<TeacherDashboard> {
    Ok(TeacherDashboard {
        total_students: count(conn, "SELECT COUNT(*) FROM students", [])?,
        total_subjects: count(
            conn,
            "SELECT COUNT(*) FROM subjects WHERE teacher_id = ?",
            [teacher_id],
        )?,
        grades_entered: count(
            conn,
            "SELECT COUNT(*) FROM grades g
             JOIN subjects m ON m.id = g.subject_id
             WHERE m.teacher_id = ?",
            [teacher_id],
        )?,
        total_classes: count(
            conn,
            "SELECT COUNT(DISTINCT class_id) FROM subjects
             WHERE teacher_id = ? AND class_id IS NOT NULL",
            [teacher_id],
        )?,
    })
}

/// Mean of every present published score on a 4-point scale, two decimals.
pub fn grade_index(scores: &[i64]) -> String {
    if scores.is_empty() {
        return "0.00".to_string();
    }
    let mean = scores.iter().sum::<i64>() as f64 / scores.len() as f64;
    format!("{:.2}", mean / 25.0)
}

/// 100 minus the absences of the most recent period, never below 0.
pub fn attendance_percent(latest: Option<&Attendance>) -> i64 {
    latest.map_or(100, |a| (100 - a.total_absences()).max(0))
}

pub fn student_dashboard(
    conn: &Connection,
    student_id: &str,
) -> anyhow::Result<Option<StudentDashboard>> {
    let Some(student) = load_student(conn, student_id)? else {
        return Ok(None);
    };
    let class = load_class(conn, student.class_id.as_deref())?;

    let mut stmt = conn.prepare(
        "SELECT knowledge_score, skill_score FROM grades
         WHERE student_id = ? AND status = 'published'",
    )?;
    let pairs = stmt
        .query_map([student_id], |row| {
            Ok((row.get::<_, Option<i64>>(0)?, row.get::<_, Option<i64>>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    let published_grades = pairs.len() as i64;
    let scores: Vec<i64> = pairs
        .into_iter()
        .flat_map(|(k, s)| [k, s])
        .flatten()
        .collect();

    let latest: Option<Attendance> = conn
        .query_row(
            "SELECT sick, permitted, unexcused FROM attendance
             WHERE student_id = ?
             ORDER BY academic_year DESC, semester DESC
             LIMIT 1",
            [student_id],
            |row| {
                Ok(Attendance {
                    sick: row.get(0)?,
                    permitted: row.get(1)?,
                    unexcused: row.get(2)?,
                })
            },
        )
        .optional()?;

    Ok(Some(StudentDashboard {
        student,
        class,
        grade_index: grade_index(&scores),
        attendance_percent: attendance_percent(latest.as_ref()),
        published_grades,
    }))
}

/// Best published knowledge scores rendered as "Subject (score)".
pub fn top_skills(conn: &Connection, student_id: &str) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT m.name, g.knowledge_score
         FROM grades g
         JOIN subjects m ON m.id = g.subject_id
         WHERE g.student_id = ? AND g.status = 'published' AND g.knowledge_score IS NOT NULL
         ORDER BY g.knowledge_score DESC, m.name
         LIMIT ?",
    )?;
    let skills = stmt
        .query_map((student_id, TOP_SKILLS_LIMIT), |row| {
            let name: String = row.get(0)?;
            let score: i64 = row.get(1)?;
            Ok(format!("{name} ({score})"))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(skills)
}
