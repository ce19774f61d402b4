use crate::ipc::error::{core_err, err};
use crate::ipc::helpers::{actor, db_conn, required_str, respond, round};
use crate::ipc::types::{AppState, Request};
use crate::lifecycle::{self, ScoreEntry};
use crate::model::Round;
use serde_json::json;

fn score_param(req: &Request) -> Result<Option<f64>, serde_json::Value> {
    match req.params.get("score") {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| err(&req.id, "bad_params", "score must be a number or null", None)),
    }
}

fn handle_marks_write(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let actor = match actor(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let round = match round(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let score = match score_param(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(
        req,
        lifecycle::write_score(conn, &state.config, &actor, &student_id, &subject_id, round, score),
    )
}

fn handle_marks_write_batch(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let actor = match actor(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(raw) = req.params.get("entries") else {
        return err(&req.id, "bad_params", "missing entries", None);
    };
    let entries: Vec<ScoreEntry> = match serde_json::from_value(raw.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", format!("invalid entries: {e}"), None),
    };
    match lifecycle::write_scores_batch(conn, &state.config, &actor, &entries) {
        Ok(out) => respond(req, Ok(out)),
        Err(e) => {
            let mut resp = core_err(&req.id, e);
            resp["error"]["code"] = json!("db_tx_failed");
            resp
        }
    }
}

fn handle_marks_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let round = if req.params.get("round").map_or(true, |v| v.is_null()) {
        None
    } else {
        match round(req) {
            Ok(v) => Some(v),
            Err(e) => return e,
        }
    };
    respond(
        req,
        lifecycle::marks_by_subject(conn, &subject_id, round).map(|marks| json!({ "marks": marks })),
    )
}

type RoundTransition = fn(
    &rusqlite::Connection,
    &crate::model::Actor,
    &str,
    Round,
) -> crate::error::CoreResult<lifecycle::TransitionOutcome>;

fn handle_round_transition(
    state: &mut AppState,
    req: &Request,
    transition: RoundTransition,
) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let actor = match actor(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let round = match round(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(req, transition(conn, &actor, &subject_id, round))
}

fn handle_marks_reconcile(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    if let Err(e) = actor(req) {
        return e;
    }
    respond(req, lifecycle::reconcile_zero_scores(conn))
}

fn handle_marks_pending_approvals(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let department = match required_str(req, "department") {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(
        req,
        lifecycle::pending_approvals(conn, &department).map(|groups| json!({ "pending": groups })),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.write" => Some(handle_marks_write(state, req)),
        "marks.writeBatch" => Some(handle_marks_write_batch(state, req)),
        "marks.listBySubject" => Some(handle_marks_list(state, req)),
        "marks.submitRound" => Some(handle_round_transition(state, req, lifecycle::submit_round)),
        "marks.approveRound" => Some(handle_round_transition(state, req, lifecycle::approve_round)),
        "marks.rejectRound" => Some(handle_round_transition(state, req, lifecycle::reject_round)),
        "marks.unlockRound" => Some(handle_round_transition(state, req, lifecycle::unlock_round)),
        "marks.reconcileZeros" => Some(handle_marks_reconcile(state, req)),
        "marks.pendingApprovals" => Some(handle_marks_pending_approvals(state, req)),
        _ => None,
    }
}
