use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let classroom_id = match req.params.get("classroomId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classroomId", None),
    };
    let last_name = match req.params.get("lastName").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing lastName", None),
    };
    let first_name = match req.params.get("firstName").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing firstName", None),
    };
    let roll_number = req
        .params
        .get("rollNumber")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let classroom = conn
        .query_row(
            "SELECT 1 FROM classrooms WHERE id = ?",
            [&classroom_id],
            |r| r.get::<_, i64>(0),
        )
        .optional();
    match classroom {
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
    let now = Utc::now().to_rfc3339();
    if let Err(e) = conn.execute(
        "INSERT INTO students(id, classroom_id, last_name, first_name, roll_number, active, updated_at)
         VALUES(?, ?, ?, ?, ?, 1, ?)",
        (&id, &classroom_id, &last_name, &first_name, &roll_number, &now),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "studentId": id }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let classroom_id = match req.params.get("classroomId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classroomId", None),
    };

    let mut stmt = match conn.prepare(
        "SELECT id, last_name, first_name, roll_number, active
         FROM students
         WHERE classroom_id = ?
         ORDER BY last_name, first_name",
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows: Result<Vec<serde_json::Value>, _> = stmt
        .query_map([&classroom_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "lastName": r.get::<_, String>(1)?,
                "firstName": r.get::<_, String>(2)?,
                "rollNumber": r.get::<_, Option<String>>(3)?,
                "active": r.get::<_, i64>(4)? != 0,
            }))
        })
        .and_then(|it| it.collect());
    match rows {
        Ok(list) => ok(&req.id, json!({ "students": list })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(handle_students_create(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        _ => None,
    }
}
