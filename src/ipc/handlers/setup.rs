use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

const EXAM_TYPES: [&str; 5] = ["half_yearly", "annual", "test", "terminal", "model"];

fn required_str(params: &serde_json::Value, key: &str) -> Result<String, String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| format!("missing {}", key))
}

fn handle_classrooms_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match required_str(&req.params, "name") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let grade_level = req
        .params
        .get("gradeLevel")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO classrooms(id, name, grade_level) VALUES(?, ?, ?)",
        (&id, &name, &grade_level),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "classroomId": id }))
}

fn handle_classrooms_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let mut stmt = match conn.prepare("SELECT id, name, grade_level FROM classrooms ORDER BY name")
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows: Result<Vec<serde_json::Value>, _> = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "gradeLevel": r.get::<_, Option<String>>(2)?,
            }))
        })
        .and_then(|it| it.collect());
    match rows {
        Ok(list) => ok(&req.id, json!({ "classrooms": list })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match required_str(&req.params, "name") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let code = req
        .params
        .get("code")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO subjects(id, name, code) VALUES(?, ?, ?)",
        (&id, &name, &code),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "subjectId": id }))
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let mut stmt = match conn.prepare("SELECT id, name, code FROM subjects ORDER BY name") {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows: Result<Vec<serde_json::Value>, _> = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "code": r.get::<_, Option<String>>(2)?,
            }))
        })
        .and_then(|it| it.collect());
    match rows {
        Ok(list) => ok(&req.id, json!({ "subjects": list })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_exams_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let classroom_id = match required_str(&req.params, "classroomId") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let name = match required_str(&req.params, "name") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let exam_type = req
        .params
        .get("examType")
        .and_then(|v| v.as_str())
        .unwrap_or("test")
        .to_string();
    if !EXAM_TYPES.contains(&exam_type.as_str()) {
        return err(
            &req.id,
            "bad_params",
            "examType must be one of: half_yearly, annual, test, terminal, model",
            Some(json!({ "examType": exam_type })),
        );
    }
    let exam_date = req
        .params
        .get("examDate")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let total_marks = req
        .params
        .get("totalMarks")
        .and_then(|v| v.as_f64())
        .unwrap_or(100.0);
    let pass_marks = req
        .params
        .get("passMarks")
        .and_then(|v| v.as_f64())
        .unwrap_or(33.0);

    // A misconfigured exam would poison every grade computed against it.
    // Reject at creation time instead of defaulting later.
    if total_marks <= 0.0 {
        return err(
            &req.id,
            "exam_config_invalid",
            "totalMarks must be positive",
            Some(json!({ "totalMarks": total_marks })),
        );
    }
    if pass_marks < 0.0 || pass_marks > total_marks {
        return err(
            &req.id,
            "exam_config_invalid",
            "passMarks must be between 0 and totalMarks",
            Some(json!({ "passMarks": pass_marks, "totalMarks": total_marks })),
        );
    }

    let classroom_exists = conn
        .query_row(
            "SELECT 1 FROM classrooms WHERE id = ?",
            [&classroom_id],
            |r| r.get::<_, i64>(0),
        )
        .optional();
    match classroom_exists {
        Ok(Some(_)) => {}
        Ok(None) => {
            return err(
                &req.id,
                "not_found",
                "classroom not found",
                Some(json!({ "classroomId": classroom_id })),
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO examinations(id, classroom_id, name, exam_type, exam_date, total_marks, pass_marks)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (&id, &classroom_id, &name, &exam_type, &exam_date, total_marks, pass_marks),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "examinationId": id }))
}

fn handle_exams_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let classroom_id = req.params.get("classroomId").and_then(|v| v.as_str());
    let exam_type = req.params.get("examType").and_then(|v| v.as_str());

    let mut stmt = match conn.prepare(
        "SELECT id, classroom_id, name, exam_type, exam_date, total_marks, pass_marks
         FROM examinations
         WHERE (?1 IS NULL OR classroom_id = ?1) AND (?2 IS NULL OR exam_type = ?2)
         ORDER BY exam_date DESC, name",
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows: Result<Vec<serde_json::Value>, _> = stmt
        .query_map((classroom_id, exam_type), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "classroomId": r.get::<_, String>(1)?,
                "name": r.get::<_, String>(2)?,
                "examType": r.get::<_, String>(3)?,
                "examDate": r.get::<_, Option<String>>(4)?,
                "totalMarks": r.get::<_, f64>(5)?,
                "passMarks": r.get::<_, f64>(6)?,
            }))
        })
        .and_then(|it| it.collect());
    match rows {
        Ok(list) => ok(&req.id, json!({ "examinations": list })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classrooms.create" => Some(handle_classrooms_create(state, req)),
        "classrooms.list" => Some(handle_classrooms_list(state, req)),
        "subjects.create" => Some(handle_subjects_create(state, req)),
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "exams.create" => Some(handle_exams_create(state, req)),
        "exams.list" => Some(handle_exams_list(state, req)),
        _ => None,
    }
}
