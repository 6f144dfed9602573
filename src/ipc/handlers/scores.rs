use crate::engine::{self, ScoreInput};
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_score_subject(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let exam_id = match req.params.get("examinationId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing examinationId", None),
    };
    let input: ScoreInput = match serde_json::from_value(req.params.clone()) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "bad_params",
                format!("invalid score params: {}", e),
                None,
            )
        }
    };

    match engine::score_subject(conn, &exam_id, &input) {
        Ok(outcome) => ok(
            &req.id,
            json!({
                "created": outcome.created,
                "score": outcome.score,
            }),
        ),
        Err(e) => engine_err(&req.id, e),
    }
}

fn handle_delete_score(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let subject_id = match req.params.get("subjectId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing subjectId", None),
    };

    match engine::delete_score(conn, &exam_id, &student_id, &subject_id) {
        Ok(()) => ok(&req.id, json!({ "deleted": true })),
        Err(e) => engine_err(&req.id, e),
    }
}

fn handle_submit_batch(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let exam_id = match req.params.get("examinationId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing examinationId", None),
    };
    let Some(items) = req.params.get("scores").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing scores array", None);
    };
    if items.is_empty() {
        return err(&req.id, "bad_params", "scores must not be empty", None);
    }

    match engine::submit_batch(conn, &exam_id, items) {
        Ok(outcome) => ok(
            &req.id,
            serde_json::to_value(&outcome).unwrap_or_else(|_| json!({})),
        ),
        Err(e) => engine_err(&req.id, e),
    }
}

fn handle_list_scores(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let exam_id = match req.params.get("examinationId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing examinationId", None),
    };
    let student_id = req.params.get("studentId").and_then(|v| v.as_str());

    match engine::list_scores(conn, &exam_id, student_id) {
        Ok(scores) => ok(&req.id, json!({ "scores": scores })),
        Err(e) => engine_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "results.scoreSubject" => Some(handle_score_subject(state, req)),
        "results.deleteScore" => Some(handle_delete_score(state, req)),
        "results.submitBatch" => Some(handle_submit_batch(state, req)),
        "results.listScores" => Some(handle_list_scores(state, req)),
        _ => None,
    }
}
