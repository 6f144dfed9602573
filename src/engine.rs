use crate::grading::{self, GradeError};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct EngineError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl EngineError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<GradeError> for EngineError {
    fn from(e: GradeError) -> Self {
        Self {
            code: e.code,
            message: e.message,
            details: e.details,
        }
    }
}

fn db_err(e: rusqlite::Error) -> EngineError {
    EngineError::new("db_query_failed", e.to_string())
}

#[derive(Debug, Clone)]
pub struct ExamConfig {
    pub id: String,
    pub classroom_id: String,
    pub total_marks: f64,
    pub pass_marks: f64,
}

/// Load the examination an operation is scoped to. An exam row with a
/// non-positive per-subject maximum is a configuration error, never a
/// silent default.
pub fn load_exam(conn: &Connection, exam_id: &str) -> Result<ExamConfig, EngineError> {
    let row: Option<(String, f64, f64)> = conn
        .query_row(
            "SELECT classroom_id, total_marks, pass_marks
             FROM examinations WHERE id = ?",
            [exam_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()
        .map_err(db_err)?;
    let Some((classroom_id, total_marks, pass_marks)) = row else {
        return Err(EngineError::new("not_found", "examination not found")
            .with_details(json!({ "examinationId": exam_id })));
    };
    if total_marks <= 0.0 {
        return Err(
            EngineError::new("exam_config_invalid", "examination total_marks must be positive")
                .with_details(json!({ "examinationId": exam_id, "totalMarks": total_marks })),
        );
    }
    Ok(ExamConfig {
        id: exam_id.to_string(),
        classroom_id,
        total_marks,
        pass_marks,
    })
}

fn ensure_enrolled(
    conn: &Connection,
    exam: &ExamConfig,
    student_id: &str,
) -> Result<(), EngineError> {
    let classroom: Option<String> = conn
        .query_row(
            "SELECT classroom_id FROM students WHERE id = ?",
            [student_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(db_err)?;
    let Some(classroom) = classroom else {
        return Err(EngineError::new("not_found", "student not found")
            .with_details(json!({ "studentId": student_id })));
    };
    if classroom != exam.classroom_id {
        return Err(
            EngineError::new("not_enrolled", "student does not belong to the exam's classroom")
                .with_details(json!({ "studentId": student_id, "classroomId": classroom })),
        );
    }
    Ok(())
}

fn ensure_subject(conn: &Connection, subject_id: &str) -> Result<(), EngineError> {
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM subjects WHERE id = ?", [subject_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(db_err)?;
    if exists.is_none() {
        return Err(EngineError::new("not_found", "subject not found")
            .with_details(json!({ "subjectId": subject_id })));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreInput {
    pub student_id: String,
    pub subject_id: String,
    #[serde(default)]
    pub written_marks: f64,
    #[serde(default)]
    pub mcq_marks: f64,
    #[serde(default)]
    pub practical_marks: f64,
    #[serde(default)]
    pub remarks: String,
}

fn validate_components(input: &ScoreInput, exam: &ExamConfig) -> Result<f64, EngineError> {
    for (name, v) in [
        ("writtenMarks", input.written_marks),
        ("mcqMarks", input.mcq_marks),
        ("practicalMarks", input.practical_marks),
    ] {
        if v < 0.0 {
            return Err(EngineError::new("bad_params", "negative marks are not allowed")
                .with_details(json!({ "field": name, "value": v })));
        }
    }
    let total = input.written_marks + input.mcq_marks + input.practical_marks;
    if total > exam.total_marks {
        return Err(
            EngineError::new("bad_params", "marks exceed the examination's total marks")
                .with_details(json!({ "totalObtained": total, "totalMarks": exam.total_marks })),
        );
    }
    Ok(total)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectScoreRow {
    pub examination_id: String,
    pub student_id: String,
    pub subject_id: String,
    pub written_marks: f64,
    pub mcq_marks: f64,
    pub practical_marks: f64,
    pub total_obtained: f64,
    pub grade: String,
    pub gpa: f64,
    pub is_passed: bool,
    pub remarks: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallResultRow {
    pub examination_id: String,
    pub student_id: String,
    pub student_name: String,
    pub roll_number: Option<String>,
    pub total_obtained: f64,
    pub total_possible: f64,
    pub percentage: f64,
    pub cgpa: f64,
    pub grade: String,
    pub rank: Option<i64>,
    pub is_passed: bool,
}

/// Writes one graded score row. The unique key is looked up first so the
/// caller learns whether this was a create or an update; derived fields are
/// always restamped from the components, never taken from the caller.
fn write_score(
    conn: &Connection,
    exam: &ExamConfig,
    input: &ScoreInput,
    total_obtained: f64,
) -> Result<bool, EngineError> {
    let graded = grading::grade_subject(total_obtained, exam.total_marks, exam.pass_marks)?;
    let now = Utc::now().to_rfc3339();

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM subject_scores
             WHERE examination_id = ? AND student_id = ? AND subject_id = ?",
            (&exam.id, &input.student_id, &input.subject_id),
            |r| r.get(0),
        )
        .optional()
        .map_err(db_err)?;

    match existing {
        Some(score_id) => {
            conn.execute(
                "UPDATE subject_scores SET
                   written_marks = ?, mcq_marks = ?, practical_marks = ?,
                   total_obtained = ?, grade = ?, gpa = ?, is_passed = ?,
                   remarks = ?, updated_at = ?
                 WHERE id = ?",
                (
                    input.written_marks,
                    input.mcq_marks,
                    input.practical_marks,
                    total_obtained,
                    graded.grade,
                    graded.gpa,
                    graded.is_passed as i64,
                    &input.remarks,
                    &now,
                    &score_id,
                ),
            )
            .map_err(|e| {
                EngineError::new("db_update_failed", e.to_string())
                    .with_details(json!({ "table": "subject_scores" }))
            })?;
            Ok(false)
        }
        None => {
            let score_id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO subject_scores(
                   id, examination_id, student_id, subject_id,
                   written_marks, mcq_marks, practical_marks,
                   total_obtained, grade, gpa, is_passed, remarks, updated_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    &score_id,
                    &exam.id,
                    &input.student_id,
                    &input.subject_id,
                    input.written_marks,
                    input.mcq_marks,
                    input.practical_marks,
                    total_obtained,
                    graded.grade,
                    graded.gpa,
                    graded.is_passed as i64,
                    &input.remarks,
                    &now,
                ),
            )
            .map_err(|e| {
                EngineError::new("db_insert_failed", e.to_string())
                    .with_details(json!({ "table": "subject_scores" }))
            })?;
            Ok(true)
        }
    }
}

/// Rebuild the overall result for one (examination, student) pair from the
/// score rows currently on disk. Full recomputation, not an incremental
/// patch: the aggregate is always exactly derivable from subject_scores.
/// Rank is left untouched here; the rerank pass owns it.
fn recompute_overall(
    conn: &Connection,
    exam: &ExamConfig,
    student_id: &str,
) -> Result<(), EngineError> {
    let mut stmt = conn
        .prepare(
            "SELECT total_obtained, gpa, is_passed FROM subject_scores
             WHERE examination_id = ? AND student_id = ?",
        )
        .map_err(db_err)?;
    let rows: Vec<(f64, f64, i64)> = stmt
        .query_map((&exam.id, student_id), |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;

    if rows.is_empty() {
        conn.execute(
            "DELETE FROM overall_results WHERE examination_id = ? AND student_id = ?",
            (&exam.id, student_id),
        )
        .map_err(db_err)?;
        return Ok(());
    }

    let count = rows.len() as f64;
    let total_obtained: f64 = rows.iter().map(|(t, _, _)| t).sum();
    // Possible marks scale with how many subjects have been scored so far,
    // not the exam's full subject roster.
    let total_possible = exam.total_marks * count;
    let percentage = if total_possible > 0.0 {
        total_obtained / total_possible * 100.0
    } else {
        0.0
    };
    let cgpa: f64 = rows.iter().map(|(_, g, _)| g).sum::<f64>() / count;
    let grade = grading::overall_grade(cgpa);
    let is_passed = rows.iter().all(|(_, _, p)| *p != 0);
    let now = Utc::now().to_rfc3339();

    let row_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO overall_results(
           id, examination_id, student_id, total_obtained, total_possible,
           percentage, cgpa, grade, is_passed, computed_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(examination_id, student_id) DO UPDATE SET
           total_obtained = excluded.total_obtained,
           total_possible = excluded.total_possible,
           percentage = excluded.percentage,
           cgpa = excluded.cgpa,
           grade = excluded.grade,
           is_passed = excluded.is_passed,
           computed_at = excluded.computed_at",
        (
            &row_id,
            &exam.id,
            student_id,
            total_obtained,
            total_possible,
            percentage,
            cgpa,
            grade,
            is_passed as i64,
            &now,
        ),
    )
    .map_err(|e| {
        EngineError::new("db_update_failed", e.to_string())
            .with_details(json!({ "table": "overall_results" }))
    })?;
    Ok(())
}

/// Assign 1..N ranks across every overall result of the examination,
/// ordered by CGPA desc, percentage desc, student id asc. Only rows whose
/// rank actually moved are written back.
fn rerank_examination(conn: &Connection, exam_id: &str) -> Result<(), EngineError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, student_id, cgpa, percentage, rank FROM overall_results
             WHERE examination_id = ?",
        )
        .map_err(db_err)?;
    let mut rows: Vec<(String, String, f64, f64, Option<i64>)> = stmt
        .query_map([exam_id], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;

    rows.sort_by(|a, b| {
        b.2.partial_cmp(&a.2)
            .unwrap_or(Ordering::Equal)
            .then(b.3.partial_cmp(&a.3).unwrap_or(Ordering::Equal))
            .then(a.1.cmp(&b.1))
    });

    for (pos, (row_id, _, _, _, current)) in rows.iter().enumerate() {
        let rank = (pos + 1) as i64;
        if *current == Some(rank) {
            continue;
        }
        conn.execute(
            "UPDATE overall_results SET rank = ? WHERE id = ?",
            (rank, row_id),
        )
        .map_err(|e| {
            EngineError::new("db_update_failed", e.to_string())
                .with_details(json!({ "table": "overall_results" }))
        })?;
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertOutcome {
    pub created: bool,
    pub score: SubjectScoreRow,
}

/// Upsert one subject score, then bring the student's overall result and
/// the whole exam's ranks up to date, all in one transaction.
pub fn score_subject(
    conn: &Connection,
    exam_id: &str,
    input: &ScoreInput,
) -> Result<UpsertOutcome, EngineError> {
    let exam = load_exam(conn, exam_id)?;
    ensure_enrolled(conn, &exam, &input.student_id)?;
    ensure_subject(conn, &input.subject_id)?;
    let total_obtained = validate_components(input, &exam)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| EngineError::new("db_tx_failed", e.to_string()))?;
    let created = write_score(&tx, &exam, input, total_obtained)?;
    recompute_overall(&tx, &exam, &input.student_id)?;
    rerank_examination(&tx, exam_id)?;
    tx.commit()
        .map_err(|e| EngineError::new("db_tx_failed", e.to_string()))?;

    let score = fetch_score(conn, exam_id, &input.student_id, &input.subject_id)?;
    Ok(UpsertOutcome { created, score })
}

fn fetch_score(
    conn: &Connection,
    exam_id: &str,
    student_id: &str,
    subject_id: &str,
) -> Result<SubjectScoreRow, EngineError> {
    let row: Option<SubjectScoreRow> = conn
        .query_row(
            "SELECT written_marks, mcq_marks, practical_marks, total_obtained,
                    grade, gpa, is_passed, remarks
             FROM subject_scores
             WHERE examination_id = ? AND student_id = ? AND subject_id = ?",
            (exam_id, student_id, subject_id),
            |r| {
                Ok(SubjectScoreRow {
                    examination_id: exam_id.to_string(),
                    student_id: student_id.to_string(),
                    subject_id: subject_id.to_string(),
                    written_marks: r.get(0)?,
                    mcq_marks: r.get(1)?,
                    practical_marks: r.get(2)?,
                    total_obtained: r.get(3)?,
                    grade: r.get(4)?,
                    gpa: r.get(5)?,
                    is_passed: r.get::<_, i64>(6)? != 0,
                    remarks: r.get(7)?,
                })
            },
        )
        .optional()
        .map_err(db_err)?;
    row.ok_or_else(|| {
        EngineError::new("not_found", "subject score not found").with_details(json!({
            "examinationId": exam_id,
            "studentId": student_id,
            "subjectId": subject_id,
        }))
    })
}

/// Delete one subject score; the owning student's overall result follows
/// (removed entirely when this was their last score) and ranks compress.
pub fn delete_score(
    conn: &Connection,
    exam_id: &str,
    student_id: &str,
    subject_id: &str,
) -> Result<(), EngineError> {
    let exam = load_exam(conn, exam_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| EngineError::new("db_tx_failed", e.to_string()))?;
    let removed = tx
        .execute(
            "DELETE FROM subject_scores
             WHERE examination_id = ? AND student_id = ? AND subject_id = ?",
            (exam_id, student_id, subject_id),
        )
        .map_err(db_err)?;
    if removed == 0 {
        return Err(EngineError::new("not_found", "subject score not found").with_details(json!({
            "examinationId": exam_id,
            "studentId": student_id,
            "subjectId": subject_id,
        })));
    }
    recompute_overall(&tx, &exam, student_id)?;
    rerank_examination(&tx, exam_id)?;
    tx.commit()
        .map_err(|e| EngineError::new("db_tx_failed", e.to_string()))?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemError {
    pub index: usize,
    pub code: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub created: usize,
    pub updated: usize,
    pub errors: Vec<BatchItemError>,
}

/// Bulk score submission for one examination. Each item is validated and
/// written independently; a bad item lands in the error list without
/// aborting the rest. Afterwards every student with at least one
/// successful write is recomputed once, followed by a single rerank pass.
pub fn submit_batch(
    conn: &Connection,
    exam_id: &str,
    items: &[serde_json::Value],
) -> Result<BatchOutcome, EngineError> {
    let exam = load_exam(conn, exam_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| EngineError::new("db_tx_failed", e.to_string()))?;

    let mut created = 0usize;
    let mut updated = 0usize;
    let mut errors: Vec<BatchItemError> = Vec::new();
    let mut affected: BTreeSet<String> = BTreeSet::new();

    for (index, raw) in items.iter().enumerate() {
        let item = (|| -> Result<bool, EngineError> {
            let input: ScoreInput = serde_json::from_value(raw.clone()).map_err(|e| {
                EngineError::new("bad_params", format!("invalid score item: {}", e))
            })?;
            ensure_enrolled(&tx, &exam, &input.student_id)?;
            ensure_subject(&tx, &input.subject_id)?;
            let total_obtained = validate_components(&input, &exam)?;
            let was_created = write_score(&tx, &exam, &input, total_obtained)?;
            affected.insert(input.student_id);
            Ok(was_created)
        })();
        match item {
            Ok(true) => created += 1,
            Ok(false) => updated += 1,
            Err(e) => errors.push(BatchItemError {
                index,
                code: e.code,
                error: e.message,
            }),
        }
    }

    for student_id in &affected {
        recompute_overall(&tx, &exam, student_id)?;
    }
    rerank_examination(&tx, exam_id)?;

    tx.commit()
        .map_err(|e| EngineError::new("db_tx_failed", e.to_string()))?;

    Ok(BatchOutcome {
        created,
        updated,
        errors,
    })
}

pub fn get_overall(
    conn: &Connection,
    exam_id: &str,
    student_id: &str,
) -> Result<OverallResultRow, EngineError> {
    let row: Option<OverallResultRow> = conn
        .query_row(
            "SELECT o.total_obtained, o.total_possible, o.percentage, o.cgpa,
                    o.grade, o.rank, o.is_passed,
                    s.last_name, s.first_name, s.roll_number
             FROM overall_results o
             JOIN students s ON s.id = o.student_id
             WHERE o.examination_id = ? AND o.student_id = ?",
            (exam_id, student_id),
            |r| {
                let last: String = r.get(7)?;
                let first: String = r.get(8)?;
                Ok(OverallResultRow {
                    examination_id: exam_id.to_string(),
                    student_id: student_id.to_string(),
                    student_name: format!("{}, {}", last, first),
                    roll_number: r.get(9)?,
                    total_obtained: r.get(0)?,
                    total_possible: r.get(1)?,
                    percentage: r.get(2)?,
                    cgpa: r.get(3)?,
                    grade: r.get(4)?,
                    rank: r.get(5)?,
                    is_passed: r.get::<_, i64>(6)? != 0,
                })
            },
        )
        .optional()
        .map_err(db_err)?;
    row.ok_or_else(|| {
        EngineError::new("not_found", "overall result not found").with_details(json!({
            "examinationId": exam_id,
            "studentId": student_id,
        }))
    })
}

pub fn leaderboard(conn: &Connection, exam_id: &str) -> Result<Vec<OverallResultRow>, EngineError> {
    load_exam(conn, exam_id)?;
    let mut stmt = conn
        .prepare(
            "SELECT o.student_id, o.total_obtained, o.total_possible, o.percentage,
                    o.cgpa, o.grade, o.rank, o.is_passed,
                    s.last_name, s.first_name, s.roll_number
             FROM overall_results o
             JOIN students s ON s.id = o.student_id
             WHERE o.examination_id = ?
             ORDER BY o.rank",
        )
        .map_err(db_err)?;
    let rows = stmt
        .query_map([exam_id], |r| {
            let last: String = r.get(8)?;
            let first: String = r.get(9)?;
            Ok(OverallResultRow {
                examination_id: exam_id.to_string(),
                student_id: r.get(0)?,
                student_name: format!("{}, {}", last, first),
                roll_number: r.get(10)?,
                total_obtained: r.get(1)?,
                total_possible: r.get(2)?,
                percentage: r.get(3)?,
                cgpa: r.get(4)?,
                grade: r.get(5)?,
                rank: r.get(6)?,
                is_passed: r.get::<_, i64>(7)? != 0,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;
    Ok(rows)
}

pub fn list_scores(
    conn: &Connection,
    exam_id: &str,
    student_id: Option<&str>,
) -> Result<Vec<SubjectScoreRow>, EngineError> {
    load_exam(conn, exam_id)?;
    let sql = "SELECT student_id, subject_id, written_marks, mcq_marks, practical_marks,
                      total_obtained, grade, gpa, is_passed, remarks
               FROM subject_scores
               WHERE examination_id = ?1 AND (?2 IS NULL OR student_id = ?2)
               ORDER BY student_id, subject_id";
    let mut stmt = conn.prepare(sql).map_err(db_err)?;
    let rows = stmt
        .query_map((exam_id, student_id), |r| {
            Ok(SubjectScoreRow {
                examination_id: exam_id.to_string(),
                student_id: r.get(0)?,
                subject_id: r.get(1)?,
                written_marks: r.get(2)?,
                mcq_marks: r.get(3)?,
                practical_marks: r.get(4)?,
                total_obtained: r.get(5)?,
                grade: r.get(6)?,
                gpa: r.get(7)?,
                is_passed: r.get::<_, i64>(8)? != 0,
                remarks: r.get(9)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;
    Ok(rows)
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Render an exam's subject scores as CSV text, one row per score, ordered
/// by student then subject. The caller decides where the bytes go.
pub fn export_csv(conn: &Connection, exam_id: &str) -> Result<String, EngineError> {
    load_exam(conn, exam_id)?;
    let mut stmt = conn
        .prepare(
            "SELECT s.roll_number, s.last_name, s.first_name, j.name,
                    c.written_marks, c.mcq_marks, c.practical_marks,
                    c.total_obtained, c.grade, c.gpa, c.is_passed
             FROM subject_scores c
             JOIN students s ON s.id = c.student_id
             JOIN subjects j ON j.id = c.subject_id
             WHERE c.examination_id = ?
             ORDER BY s.last_name, s.first_name, s.id, j.name",
        )
        .map_err(db_err)?;
    let rows: Vec<(Option<String>, String, String, String, f64, f64, f64, f64, String, f64, i64)> =
        stmt.query_map([exam_id], |r| {
            Ok((
                r.get(0)?,
                r.get(1)?,
                r.get(2)?,
                r.get(3)?,
                r.get(4)?,
                r.get(5)?,
                r.get(6)?,
                r.get(7)?,
                r.get(8)?,
                r.get(9)?,
                r.get(10)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;

    let mut out = String::from(
        "Serial,Roll Number,Student Name,Subject,Written,MCQ,Practical,Total,Grade,GPA,Status\n",
    );
    for (serial, (roll, last, first, subject, written, mcq, practical, total, grade, gpa, passed)) in
        rows.into_iter().enumerate()
    {
        let name = format!("{} {}", first, last);
        let status = if passed != 0 { "Passed" } else { "Failed" };
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{},{}\n",
            serial + 1,
            csv_field(roll.as_deref().unwrap_or("")),
            csv_field(name.trim()),
            csv_field(&subject),
            written,
            mcq,
            practical,
            total,
            grade,
            gpa,
            status,
        ));
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedResult {
    pub student_id: String,
    pub classroom_id: String,
    pub exam_type: String,
    pub exam_count: usize,
    pub total_obtained: f64,
    pub total_possible: f64,
    pub percentage: f64,
    pub cgpa: f64,
    pub grade: String,
    pub is_passed: bool,
    pub rank: Option<i64>,
}

#[derive(Debug, Clone)]
struct CombinedAccumulator {
    obtained: f64,
    possible: f64,
    gpa_sum: f64,
    count: usize,
    all_passed: bool,
}

/// Combine one student's results across every examination of a given type
/// in a classroom: half-yearly plus terminal tests rolled into one report
/// line. Read-only; nothing is persisted. Rank is computed on the fly
/// against classmates with scores in the same exam set.
pub fn combined_by_type(
    conn: &Connection,
    classroom_id: &str,
    exam_type: &str,
    student_id: &str,
) -> Result<CombinedResult, EngineError> {
    let student_classroom: Option<String> = conn
        .query_row(
            "SELECT classroom_id FROM students WHERE id = ?",
            [student_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(db_err)?;
    if student_classroom.is_none() {
        return Err(EngineError::new("not_found", "student not found")
            .with_details(json!({ "studentId": student_id })));
    }

    // One pass over every matching score in the classroom builds both the
    // target student's totals and the standings used for their rank.
    let mut stmt = conn
        .prepare(
            "SELECT c.student_id, c.total_obtained, c.gpa, c.is_passed, e.total_marks
             FROM subject_scores c
             JOIN examinations e ON e.id = c.examination_id
             WHERE e.classroom_id = ? AND e.exam_type = ?",
        )
        .map_err(db_err)?;
    let rows: Vec<(String, f64, f64, i64, f64)> = stmt
        .query_map((classroom_id, exam_type), |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;

    let mut per_student: std::collections::HashMap<String, CombinedAccumulator> =
        std::collections::HashMap::new();
    for (sid, obtained, gpa, passed, exam_total) in rows {
        let acc = per_student.entry(sid).or_insert(CombinedAccumulator {
            obtained: 0.0,
            possible: 0.0,
            gpa_sum: 0.0,
            count: 0,
            all_passed: true,
        });
        acc.obtained += obtained;
        acc.possible += exam_total;
        acc.gpa_sum += gpa;
        acc.count += 1;
        acc.all_passed &= passed != 0;
    }

    let Some(target) = per_student.get(student_id).cloned() else {
        return Err(
            EngineError::new("not_found", "no scores for this student in scope").with_details(
                json!({ "studentId": student_id, "classroomId": classroom_id, "examType": exam_type }),
            ),
        );
    };

    let mut standings: Vec<(String, f64, f64)> = per_student
        .iter()
        .map(|(sid, acc)| {
            let pct = if acc.possible > 0.0 {
                acc.obtained / acc.possible * 100.0
            } else {
                0.0
            };
            (sid.clone(), acc.gpa_sum / acc.count as f64, pct)
        })
        .collect();
    standings.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then(b.2.partial_cmp(&a.2).unwrap_or(Ordering::Equal))
            .then(a.0.cmp(&b.0))
    });
    let rank = standings
        .iter()
        .position(|(sid, _, _)| sid == student_id)
        .map(|p| (p + 1) as i64);

    let exam_count: usize = conn
        .query_row(
            "SELECT COUNT(DISTINCT c.examination_id)
             FROM subject_scores c
             JOIN examinations e ON e.id = c.examination_id
             WHERE e.classroom_id = ? AND e.exam_type = ? AND c.student_id = ?",
            (classroom_id, exam_type, student_id),
            |r| r.get::<_, i64>(0),
        )
        .map_err(db_err)? as usize;

    let cgpa = target.gpa_sum / target.count as f64;
    let percentage = if target.possible > 0.0 {
        target.obtained / target.possible * 100.0
    } else {
        0.0
    };
    Ok(CombinedResult {
        student_id: student_id.to_string(),
        classroom_id: classroom_id.to_string(),
        exam_type: exam_type.to_string(),
        exam_count,
        total_obtained: target.obtained,
        total_possible: target.possible,
        percentage,
        cgpa,
        grade: grading::overall_grade(cgpa).to_string(),
        is_passed: target.all_passed,
        rank,
    })
}
