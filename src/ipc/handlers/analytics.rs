use crate::calc;
use crate::ipc::helpers::{db_conn, required_str, respond};
use crate::ipc::types::{AppState, Request};

fn handle_analytics_department(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let department = match required_str(req, "department") {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(req, calc::department_stats(conn, &state.config, &department))
}

fn handle_analytics_institution(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    respond(req, calc::institution_stats(conn, &state.config))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "analytics.department" => Some(handle_analytics_department(state, req)),
        "analytics.institution" => Some(handle_analytics_institution(state, req)),
        _ => None,
    }
}
