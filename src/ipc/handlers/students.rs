use crate::ipc::error::err;
use crate::ipc::helpers::{db_conn, optional_str, required_str, respond, string_list};
use crate::ipc::types::{AppState, Request};
use crate::lifecycle;
use crate::roster::{self, NewStudent};
use crate::store;
use serde_json::json;

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let department = optional_str(req, "department");
    respond(
        req,
        store::list_students(conn, department.as_deref()).map(|students| json!({ "students": students })),
    )
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let new: NewStudent = match serde_json::from_value(req.params.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    respond(req, roster::create_student(conn, new))
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let reg_no = match required_str(req, "regNo") {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(
        req,
        roster::delete_student(conn, &reg_no).map(|s| json!({ "deleted": s.reg_no })),
    )
}

fn handle_students_delete_bulk(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let reg_nos = string_list(req, "regNos");
    if reg_nos.is_empty() {
        return err(&req.id, "bad_params", "regNos must not be empty", None);
    }
    respond(req, roster::delete_students(conn, &reg_nos))
}

fn handle_students_import_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let department = match required_str(req, "department") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let text = match (req.params.get("csv").and_then(|v| v.as_str()), optional_str(req, "path")) {
        (Some(csv), _) => csv.to_string(),
        (None, Some(path)) => match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) => {
                return err(
                    &req.id,
                    "io_failed",
                    e.to_string(),
                    Some(json!({ "path": path })),
                )
            }
        },
        (None, None) => return err(&req.id, "bad_params", "missing csv or path", None),
    };
    respond(req, roster::import_students_csv(conn, &department, &text))
}

fn handle_students_dashboard(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let reg_no = match required_str(req, "regNo") {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(req, lifecycle::student_dashboard(conn, &reg_no))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        "students.deleteBulk" => Some(handle_students_delete_bulk(state, req)),
        "students.importCsv" => Some(handle_students_import_csv(state, req)),
        "students.dashboard" => Some(handle_students_dashboard(state, req)),
        _ => None,
    }
}
