use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("results.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classrooms(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            grade_level TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            classroom_id TEXT NOT NULL,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            roll_number TEXT,
            active INTEGER NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(classroom_id) REFERENCES classrooms(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_classroom ON students(classroom_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS examinations(
            id TEXT PRIMARY KEY,
            classroom_id TEXT NOT NULL,
            name TEXT NOT NULL,
            exam_type TEXT NOT NULL,
            exam_date TEXT,
            total_marks REAL NOT NULL,
            pass_marks REAL NOT NULL,
            FOREIGN KEY(classroom_id) REFERENCES classrooms(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_examinations_classroom ON examinations(classroom_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_examinations_type ON examinations(classroom_id, exam_type)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subject_scores(
            id TEXT PRIMARY KEY,
            examination_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            written_marks REAL NOT NULL,
            mcq_marks REAL NOT NULL,
            practical_marks REAL NOT NULL,
            total_obtained REAL NOT NULL,
            grade TEXT NOT NULL,
            gpa REAL NOT NULL,
            is_passed INTEGER NOT NULL,
            remarks TEXT NOT NULL DEFAULT '',
            updated_at TEXT,
            UNIQUE(examination_id, student_id, subject_id),
            FOREIGN KEY(examination_id) REFERENCES examinations(id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subject_scores_exam_student
         ON subject_scores(examination_id, student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subject_scores_student ON subject_scores(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS overall_results(
            id TEXT PRIMARY KEY,
            examination_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            total_obtained REAL NOT NULL,
            total_possible REAL NOT NULL,
            percentage REAL NOT NULL,
            cgpa REAL NOT NULL,
            grade TEXT NOT NULL,
            rank INTEGER,
            is_passed INTEGER NOT NULL,
            computed_at TEXT,
            UNIQUE(examination_id, student_id),
            FOREIGN KEY(examination_id) REFERENCES examinations(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_overall_results_exam ON overall_results(examination_id)",
        [],
    )?;

    Ok(conn)
}
