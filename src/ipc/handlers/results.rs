use crate::engine;
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_overall(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let exam_id = match req.params.get("examinationId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing examinationId", None),
    };
    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };

    match engine::get_overall(conn, &exam_id, &student_id) {
        Ok(row) => ok(&req.id, json!({ "overall": row })),
        Err(e) => engine_err(&req.id, e),
    }
}

fn handle_leaderboard(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let exam_id = match req.params.get("examinationId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing examinationId", None),
    };

    match engine::leaderboard(conn, &exam_id) {
        Ok(rows) => ok(&req.id, json!({ "leaderboard": rows })),
        Err(e) => engine_err(&req.id, e),
    }
}

fn handle_combined_by_type(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let classroom_id = match req.params.get("classroomId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classroomId", None),
    };
    let exam_type = match req.params.get("examType").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing examType", None),
    };
    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };

    match engine::combined_by_type(conn, &classroom_id, &exam_type, &student_id) {
        Ok(combined) => ok(&req.id, json!({ "combined": combined })),
        Err(e) => engine_err(&req.id, e),
    }
}

fn handle_export_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let exam_id = match req.params.get("examinationId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing examinationId", None),
    };

    match engine::export_csv(conn, &exam_id) {
        Ok(csv) => ok(&req.id, json!({ "csv": csv })),
        Err(e) => engine_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "results.overall" => Some(handle_overall(state, req)),
        "results.leaderboard" => Some(handle_leaderboard(state, req)),
        "results.combinedByType" => Some(handle_combined_by_type(state, req)),
        "results.exportCsv" => Some(handle_export_csv(state, req)),
        _ => None,
    }
}
