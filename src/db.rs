use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "rapor.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            nip TEXT UNIQUE,
            subject_area TEXT,
            phone TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            major TEXT,
            academic_year TEXT NOT NULL,
            homeroom_teacher_id TEXT,
            FOREIGN KEY(homeroom_teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_id TEXT,
            full_name TEXT NOT NULL,
            nisn TEXT NOT NULL UNIQUE,
            birth_place TEXT,
            birth_date TEXT,
            gender TEXT CHECK(gender IN ('L', 'P')),
            created_at TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT NOT NULL UNIQUE,
            kkm INTEGER NOT NULL DEFAULT 75,
            teacher_id TEXT,
            class_id TEXT,
            FOREIGN KEY(teacher_id) REFERENCES teachers(id),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_teacher ON subjects(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            semester TEXT NOT NULL CHECK(semester IN ('Ganjil', 'Genap')),
            academic_year TEXT NOT NULL,
            knowledge_score INTEGER,
            skill_score INTEGER,
            derived_grade TEXT NOT NULL DEFAULT '-',
            note TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'draft' CHECK(status IN ('draft', 'published')),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    // One grade per student, subject and period.
    ensure_grades_natural_key(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student ON grades(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_subject ON grades(subject_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            student_id TEXT NOT NULL,
            semester TEXT NOT NULL,
            academic_year TEXT NOT NULL,
            sick INTEGER NOT NULL DEFAULT 0,
            permitted INTEGER NOT NULL DEFAULT 0,
            unexcused INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT,
            PRIMARY KEY(student_id, semester, academic_year),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS extracurriculars(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            name TEXT NOT NULL,
            grade TEXT,
            remark TEXT,
            semester TEXT NOT NULL,
            academic_year TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_extracurriculars_student ON extracurriculars(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS cv_profiles(
            student_id TEXT PRIMARY KEY,
            template TEXT NOT NULL DEFAULT 'modern',
            target_job TEXT,
            about TEXT,
            experience_title TEXT,
            experience_desc TEXT,
            organizations TEXT,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS documents(
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL CHECK(kind IN ('rapor', 'cv')),
            student_id TEXT NOT NULL,
            verification_token TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_documents_student ON documents(student_id)",
        [],
    )?;

    // actor_id is deliberately not a foreign key: actors may be admins that
    // have no row in teachers/students.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS activity_log(
            id TEXT PRIMARY KEY,
            actor_id TEXT,
            actor_name TEXT,
            action TEXT NOT NULL,
            detail TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_activity_log_created ON activity_log(created_at)",
        [],
    )?;

    Ok(())
}

fn ensure_grades_natural_key(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_grades_natural_key
         ON grades(student_id, subject_id, semester, academic_year)",
        [],
    )?;
    Ok(())
}

/// RFC 3339 UTC timestamp with millisecond precision, used for every
/// `created_at` / `updated_at` column.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
