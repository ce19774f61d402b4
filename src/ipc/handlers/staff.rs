use crate::error::CoreError;
use crate::ipc::error::{core_err, err};
use crate::ipc::helpers::{actor, db_conn, optional_str, required_str, respond, string_list};
use crate::ipc::types::{AppState, Request};
use crate::model::{RequestStatus, StaffRole};
use crate::roster::{self, StaffInput};
use crate::scope::{self, NewRequest};
use crate::store;
use serde_json::json;

fn staff_input(req: &Request) -> Result<StaffInput, serde_json::Value> {
    serde_json::from_value(req.params.clone())
        .map_err(|e| err(&req.id, "bad_params", e.to_string(), None))
}

fn handle_staff_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let role = match optional_str(req, "role").map(|r| StaffRole::parse(&r)).transpose() {
        Ok(v) => v,
        Err(e) => return core_err(&req.id, e),
    };
    let department = optional_str(req, "department");
    respond(
        req,
        store::list_staff(conn, role, department.as_deref()).map(|staff| json!({ "staff": staff })),
    )
}

fn handle_staff_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let input = match staff_input(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(req, roster::create_staff(conn, input))
}

fn handle_staff_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let id = match required_str(req, "staffId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(
        req,
        store::find_staff(conn, &id)
            .and_then(|m| m.ok_or_else(|| CoreError::not_found("staff", id.as_str()))),
    )
}

fn handle_staff_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let id = match required_str(req, "staffId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let input = match staff_input(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(req, roster::update_staff(conn, &id, input))
}

fn handle_faculty_subjects(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let faculty_id = match required_str(req, "facultyId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(
        req,
        scope::subjects_for(conn, &faculty_id).map(|subjects| json!({ "subjects": subjects })),
    )
}

fn handle_faculty_students(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let faculty_id = match required_str(req, "facultyId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let result = scope::scope_for(conn, &faculty_id).and_then(|(_, s)| {
        let unrestricted = s == scope::Scope::Unrestricted;
        scope::students_in_scope(conn, &s)
            .map(|students| json!({ "unrestricted": unrestricted, "students": students }))
    });
    respond(req, result)
}

fn handle_faculty_analytics(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let faculty_id = match required_str(req, "facultyId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(req, scope::class_analytics(conn, &state.config, &faculty_id))
}

fn handle_faculty_for_department(state: &mut AppState, req: &Request) -> serde_json::Value {
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
        scope::faculty_for_department(conn, &department).map(|faculty| json!({ "faculty": faculty })),
    )
}

fn handle_faculty_remove_from_department(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let faculty_id = match required_str(req, "facultyId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let department = match required_str(req, "department") {
        Ok(v) => v,
        Err(e) => return e,
    };
    respond(
        req,
        scope::remove_faculty_from_department(conn, &faculty_id, &department),
    )
}

fn handle_assignments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let faculty_id = match required_str(req, "facultyId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let new = NewRequest {
        faculty_id,
        target_department: optional_str(req, "targetDepartment").unwrap_or_default(),
        subjects: string_list(req, "subjects").into_iter().collect(),
        sections: string_list(req, "sections").into_iter().collect(),
        semester: optional_str(req, "semester"),
    };
    respond(req, scope::create_request(conn, new))
}

fn handle_assignments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let status = match optional_str(req, "status") {
        None => None,
        Some(s) if s.eq_ignore_ascii_case("all") => None,
        Some(s) => match RequestStatus::parse(&s) {
            Ok(v) => Some(v),
            Err(e) => return core_err(&req.id, e),
        },
    };
    let department = optional_str(req, "department");
    let faculty_id = optional_str(req, "facultyId");
    respond(
        req,
        store::list_requests(conn, faculty_id.as_deref(), department.as_deref(), status)
            .map(|requests| json!({ "requests": requests })),
    )
}

fn handle_assignments_decide(state: &mut AppState, req: &Request, approve: bool) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let actor = match actor(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let request_id = match required_str(req, "requestId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if approve {
        respond(req, scope::approve_request(conn, &actor, &request_id))
    } else {
        respond(req, scope::reject_request(conn, &actor, &request_id))
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "staff.list" => Some(handle_staff_list(state, req)),
        "staff.create" => Some(handle_staff_create(state, req)),
        "staff.get" => Some(handle_staff_get(state, req)),
        "staff.update" => Some(handle_staff_update(state, req)),
        "faculty.subjects" => Some(handle_faculty_subjects(state, req)),
        "faculty.students" => Some(handle_faculty_students(state, req)),
        "faculty.analytics" => Some(handle_faculty_analytics(state, req)),
        "faculty.forDepartment" => Some(handle_faculty_for_department(state, req)),
        "faculty.removeFromDepartment" => Some(handle_faculty_remove_from_department(state, req)),
        "assignments.create" => Some(handle_assignments_create(state, req)),
        "assignments.list" => Some(handle_assignments_list(state, req)),
        "assignments.approve" => Some(handle_assignments_decide(state, req, true)),
        "assignments.reject" => Some(handle_assignments_decide(state, req, false)),
        _ => None,
    }
}
