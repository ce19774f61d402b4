use crate::error::CoreResult;
use crate::ipc::error::{core_err, err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::{Actor, Round};
use rusqlite::Connection;
use serde::Serialize;

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Accepts either a JSON array of strings or one comma-separated string.
pub fn string_list(req: &Request, key: &str) -> Vec<String> {
    match req.params.get(key) {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(serde_json::Value::String(s)) => s
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn actor(req: &Request) -> Result<Actor, serde_json::Value> {
    let Some(raw) = req.params.get("actor") else {
        return Err(err(&req.id, "bad_params", "missing actor", None));
    };
    let actor: Actor = serde_json::from_value(raw.clone())
        .map_err(|e| err(&req.id, "bad_params", format!("invalid actor: {e}"), None))?;
    if actor.username.trim().is_empty() {
        return Err(err(&req.id, "bad_params", "actor.username must not be empty", None));
    }
    Ok(actor)
}

pub fn round(req: &Request) -> Result<Round, serde_json::Value> {
    let raw = match req.params.get("round") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => return Err(err(&req.id, "bad_params", "missing round", None)),
    };
    Round::parse(&raw).map_err(|e| core_err(&req.id, e))
}

pub fn to_json<T: Serialize>(req: &Request, value: &T) -> serde_json::Value {
    match serde_json::to_value(value) {
        Ok(v) => ok(&req.id, v),
        Err(e) => err(&req.id, "serialize_failed", e.to_string(), None),
    }
}

pub fn respond<T: Serialize>(req: &Request, result: CoreResult<T>) -> serde_json::Value {
    match result {
        Ok(v) => to_json(req, &v),
        Err(e) => core_err(&req.id, e),
    }
}
