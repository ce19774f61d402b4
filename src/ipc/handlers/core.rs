use crate::config::EngineConfig;
use crate::db;
use crate::ipc::error::{core_err, err, ok};
use crate::ipc::helpers::{db_conn, to_json};
use crate::ipc::types::{AppState, Request};
use crate::lifecycle;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

/// Opens the workspace database, loads engine settings and runs the zero-score pass.
pub fn open_workspace(state: &mut AppState, path: &Path) -> anyhow::Result<serde_json::Value> {
    let conn = db::open_db(path)?;
    let config = EngineConfig::load(&conn)?;
    let reconciled = if config.reconcile_on_open {
        Some(lifecycle::reconcile_zero_scores(&conn)?)
    } else {
        None
    };
    info!(workspace = %path.display(), "workspace opened");

    state.workspace = Some(path.to_path_buf());
    state.db = Some(conn);
    state.config = config;
    Ok(json!({
        "workspacePath": path.to_string_lossy(),
        "reconciled": reconciled,
    }))
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match open_workspace(state, &path) {
        Ok(result) => ok(&req.id, result),
        Err(e) => {
            warn!(workspace = %path.display(), error = %e, "workspace open failed");
            err(&req.id, "db_open_failed", format!("{e:?}"), None)
        }
    }
}

fn handle_settings_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = db_conn(state, req) {
        return e;
    }
    to_json(req, &state.config)
}

fn handle_settings_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(patch) = req.params.get("settings") else {
        return err(&req.id, "bad_params", "missing settings", None);
    };
    let next = match state.config.merged(patch) {
        Ok(v) => v,
        Err(e) => return core_err(&req.id, e),
    };
    if let Err(e) = next.save(conn) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    info!(settings = %patch, "engine settings updated");
    state.config = next;
    to_json(req, &state.config)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "settings.get" => Some(handle_settings_get(state, req)),
        "settings.update" => Some(handle_settings_update(state, req)),
        _ => None,
    }
}
