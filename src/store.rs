//! Row mapping and queries over the workspace tables.
//!
//! Comma-separated relation columns are converted to and from sets here and nowhere else.

use crate::error::CoreResult;
use crate::model::{
    AssignmentRequest, MarkRecord, MarkStatus, RequestStatus, StaffMember, StaffRole, Student,
    Subject,
};
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;

pub fn parse_name_set(raw: Option<&str>) -> BTreeSet<String> {
    raw.unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn join_name_set(set: &BTreeSet<String>) -> String {
    set.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

pub fn now_stamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

const STUDENT_COLS: &str =
    "id, reg_no, name, department, semester, section, email, phone, parent_phone";

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        reg_no: r.get(1)?,
        name: r.get(2)?,
        department: r.get(3)?,
        semester: r.get(4)?,
        section: r.get(5)?,
        email: r.get(6)?,
        phone: r.get(7)?,
        parent_phone: r.get(8)?,
    })
}

const SUBJECT_COLS: &str =
    "id, name, code, department, semester, credits, instructor_name, max_marks";

fn subject_from_row(r: &Row<'_>) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: r.get(0)?,
        name: r.get(1)?,
        code: r.get(2)?,
        department: r.get(3)?,
        semester: r.get(4)?,
        credits: r.get(5)?,
        instructor_name: r.get(6)?,
        max_marks: r.get(7)?,
    })
}

const STAFF_COLS: &str = "id, username, full_name, role, department, subjects, sections";

fn staff_from_row(r: &Row<'_>) -> rusqlite::Result<StaffMember> {
    let role: String = r.get(3)?;
    let subjects: Option<String> = r.get(5)?;
    let sections: Option<String> = r.get(6)?;
    Ok(StaffMember {
        id: r.get(0)?,
        username: r.get(1)?,
        full_name: r.get(2)?,
        role: StaffRole::parse(&role).unwrap_or(StaffRole::Faculty),
        department: r.get(4)?,
        subjects: parse_name_set(subjects.as_deref()),
        sections: parse_name_set(sections.as_deref()),
    })
}

const MARK_COLS: &str = "id, student_id, subject_id, round, score, status, updated_by, updated_at";

fn mark_from_row(r: &Row<'_>) -> rusqlite::Result<MarkRecord> {
    let status: Option<String> = r.get(5)?;
    Ok(MarkRecord {
        id: r.get(0)?,
        student_id: r.get(1)?,
        subject_id: r.get(2)?,
        round: r.get(3)?,
        score: r.get(4)?,
        status: MarkStatus::from_db(status.as_deref()),
        updated_by: r.get(6)?,
        updated_at: r.get(7)?,
    })
}

const REQUEST_COLS: &str =
    "id, faculty_id, target_department, subjects, sections, semester, status, created_at";

fn request_from_row(r: &Row<'_>) -> rusqlite::Result<AssignmentRequest> {
    let subjects: Option<String> = r.get(3)?;
    let sections: Option<String> = r.get(4)?;
    let status: String = r.get(6)?;
    Ok(AssignmentRequest {
        id: r.get(0)?,
        faculty_id: r.get(1)?,
        target_department: r.get(2)?,
        subjects: parse_name_set(subjects.as_deref()),
        sections: parse_name_set(sections.as_deref()),
        semester: r.get(5)?,
        status: RequestStatus::parse(&status).unwrap_or(RequestStatus::Pending),
        created_at: r.get(7)?,
    })
}

fn query_all<T>(
    conn: &Connection,
    sql: &str,
    bind: Vec<Value>,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> CoreResult<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind), map)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

// --- students -------------------------------------------------------------

pub fn find_student(conn: &Connection, id: &str) -> CoreResult<Option<Student>> {
    let sql = format!("SELECT {STUDENT_COLS} FROM students WHERE id = ?");
    Ok(conn.query_row(&sql, [id], student_from_row).optional()?)
}

pub fn find_student_by_reg_no(conn: &Connection, reg_no: &str) -> CoreResult<Option<Student>> {
    let sql = format!("SELECT {STUDENT_COLS} FROM students WHERE reg_no = ?");
    Ok(conn.query_row(&sql, [reg_no], student_from_row).optional()?)
}

pub fn list_students(conn: &Connection, department: Option<&str>) -> CoreResult<Vec<Student>> {
    match department {
        Some(d) => query_all(
            conn,
            &format!("SELECT {STUDENT_COLS} FROM students WHERE department = ? ORDER BY reg_no"),
            vec![Value::Text(d.to_string())],
            student_from_row,
        ),
        None => query_all(
            conn,
            &format!("SELECT {STUDENT_COLS} FROM students ORDER BY reg_no"),
            Vec::new(),
            student_from_row,
        ),
    }
}

/// Students whose section is in `sections`, optionally limited to one department.
pub fn insert_student(conn: &Connection, s: &Student) -> CoreResult<()> {
    conn.execute(
        "INSERT INTO students(id, reg_no, name, department, semester, section, email, phone, parent_phone)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &s.id,
            &s.reg_no,
            &s.name,
            &s.department,
            s.semester,
            &s.section,
            &s.email,
            &s.phone,
            &s.parent_phone,
        ),
    )?;
    Ok(())
}

/// Removes a student and every mark it owns. Returns false if the student was absent.
pub fn delete_student_cascade(conn: &Connection, id: &str) -> CoreResult<bool> {
    conn.execute("DELETE FROM cie_marks WHERE student_id = ?", [id])?;
    Ok(conn.execute("DELETE FROM students WHERE id = ?", [id])? > 0)
}

// --- subjects -------------------------------------------------------------

pub fn find_subject(conn: &Connection, id: &str) -> CoreResult<Option<Subject>> {
    let sql = format!("SELECT {SUBJECT_COLS} FROM subjects WHERE id = ?");
    Ok(conn.query_row(&sql, [id], subject_from_row).optional()?)
}

pub fn find_subject_by_code(conn: &Connection, code: &str) -> CoreResult<Option<Subject>> {
    let sql = format!("SELECT {SUBJECT_COLS} FROM subjects WHERE code = ?");
    Ok(conn.query_row(&sql, [code], subject_from_row).optional()?)
}

pub fn list_subjects(conn: &Connection, department: Option<&str>) -> CoreResult<Vec<Subject>> {
    match department {
        Some(d) => query_all(
            conn,
            &format!("SELECT {SUBJECT_COLS} FROM subjects WHERE department = ? ORDER BY name"),
            vec![Value::Text(d.to_string())],
            subject_from_row,
        ),
        None => query_all(
            conn,
            &format!("SELECT {SUBJECT_COLS} FROM subjects ORDER BY department, name"),
            Vec::new(),
            subject_from_row,
        ),
    }
}

pub fn subjects_by_names(conn: &Connection, names: &BTreeSet<String>) -> CoreResult<Vec<Subject>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {SUBJECT_COLS} FROM subjects WHERE name IN ({}) ORDER BY department, name",
        placeholders(names.len())
    );
    query_all(
        conn,
        &sql,
        names.iter().cloned().map(Value::Text).collect(),
        subject_from_row,
    )
}

pub fn insert_subject(conn: &Connection, s: &Subject) -> CoreResult<()> {
    conn.execute(
        "INSERT INTO subjects(id, name, code, department, semester, credits, instructor_name, max_marks)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &s.id,
            &s.name,
            &s.code,
            &s.department,
            s.semester,
            s.credits,
            &s.instructor_name,
            s.max_marks,
        ),
    )?;
    Ok(())
}

pub fn set_instructor(conn: &Connection, subject_id: &str, name: Option<&str>) -> CoreResult<()> {
    conn.execute(
        "UPDATE subjects SET instructor_name = ? WHERE id = ?",
        (name, subject_id),
    )?;
    Ok(())
}

pub fn delete_subject_cascade(conn: &Connection, id: &str) -> CoreResult<bool> {
    conn.execute("DELETE FROM cie_marks WHERE subject_id = ?", [id])?;
    Ok(conn.execute("DELETE FROM subjects WHERE id = ?", [id])? > 0)
}

/// Distinct non-empty department names found on subjects, students and HODs.
pub fn known_departments(conn: &Connection) -> CoreResult<BTreeSet<String>> {
    let mut stmt = conn.prepare(
        "SELECT department FROM subjects
         UNION SELECT department FROM students
         UNION SELECT department FROM staff WHERE role = 'hod'",
    )?;
    let rows = stmt
        .query_map([], |r| r.get::<_, Option<String>>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows
        .into_iter()
        .flatten()
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .collect())
}

// --- staff ----------------------------------------------------------------

pub fn find_staff(conn: &Connection, id: &str) -> CoreResult<Option<StaffMember>> {
    let sql = format!("SELECT {STAFF_COLS} FROM staff WHERE id = ?");
    Ok(conn.query_row(&sql, [id], staff_from_row).optional()?)
}

pub fn list_staff(
    conn: &Connection,
    role: Option<StaffRole>,
    department: Option<&str>,
) -> CoreResult<Vec<StaffMember>> {
    let mut sql = format!("SELECT {STAFF_COLS} FROM staff WHERE 1 = 1");
    let mut bind: Vec<Value> = Vec::new();
    if let Some(r) = role {
        sql.push_str(" AND role = ?");
        bind.push(Value::Text(r.as_str().to_string()));
    }
    if let Some(d) = department {
        sql.push_str(" AND department = ?");
        bind.push(Value::Text(d.to_string()));
    }
    sql.push_str(" ORDER BY full_name");
    query_all(conn, &sql, bind, staff_from_row)
}

pub fn upsert_staff(conn: &Connection, m: &StaffMember) -> CoreResult<()> {
    conn.execute(
        "INSERT INTO staff(id, username, full_name, role, department, subjects, sections)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           username = excluded.username,
           full_name = excluded.full_name,
           role = excluded.role,
           department = excluded.department,
           subjects = excluded.subjects,
           sections = excluded.sections",
        (
            &m.id,
            &m.username,
            &m.full_name,
            m.role.as_str(),
            &m.department,
            join_name_set(&m.subjects),
            join_name_set(&m.sections),
        ),
    )?;
    Ok(())
}

// --- marks ----------------------------------------------------------------

pub fn find_mark(
    conn: &Connection,
    student_id: &str,
    subject_id: &str,
    round: &str,
) -> CoreResult<Option<MarkRecord>> {
    let sql = format!(
        "SELECT {MARK_COLS} FROM cie_marks WHERE student_id = ? AND subject_id = ? AND round = ?"
    );
    Ok(conn
        .query_row(&sql, (student_id, subject_id, round), mark_from_row)
        .optional()?)
}

pub fn marks_for_subject(
    conn: &Connection,
    subject_id: &str,
    round: Option<&str>,
) -> CoreResult<Vec<MarkRecord>> {
    let mut sql = format!("SELECT {MARK_COLS} FROM cie_marks WHERE subject_id = ?");
    let mut bind = vec![Value::Text(subject_id.to_string())];
    if let Some(r) = round {
        sql.push_str(" AND round = ?");
        bind.push(Value::Text(r.to_string()));
    }
    sql.push_str(" ORDER BY round, student_id");
    query_all(conn, &sql, bind, mark_from_row)
}

pub fn marks_for_subjects(conn: &Connection, subject_ids: &[String]) -> CoreResult<Vec<MarkRecord>> {
    if subject_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {MARK_COLS} FROM cie_marks WHERE subject_id IN ({})",
        placeholders(subject_ids.len())
    );
    query_all(
        conn,
        &sql,
        subject_ids.iter().cloned().map(Value::Text).collect(),
        mark_from_row,
    )
}

pub fn marks_for_student(conn: &Connection, student_id: &str) -> CoreResult<Vec<MarkRecord>> {
    query_all(
        conn,
        &format!("SELECT {MARK_COLS} FROM cie_marks WHERE student_id = ? ORDER BY subject_id, round"),
        vec![Value::Text(student_id.to_string())],
        mark_from_row,
    )
}

pub fn all_marks(conn: &Connection) -> CoreResult<Vec<MarkRecord>> {
    query_all(
        conn,
        &format!("SELECT {MARK_COLS} FROM cie_marks"),
        Vec::new(),
        mark_from_row,
    )
}

pub fn insert_mark(conn: &Connection, m: &MarkRecord) -> CoreResult<()> {
    conn.execute(
        "INSERT INTO cie_marks(id, student_id, subject_id, round, score, status, updated_by, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &m.id,
            &m.student_id,
            &m.subject_id,
            &m.round,
            m.score,
            m.status.as_str(),
            &m.updated_by,
            &m.updated_at,
        ),
    )?;
    Ok(())
}

pub fn update_mark(
    conn: &Connection,
    id: &str,
    score: Option<f64>,
    status: MarkStatus,
    updated_by: Option<&str>,
) -> CoreResult<()> {
    conn.execute(
        "UPDATE cie_marks SET score = ?, status = ?, updated_by = ?, updated_at = ? WHERE id = ?",
        (score, status.as_str(), updated_by, now_stamp(), id),
    )?;
    Ok(())
}

pub fn set_mark_status(
    conn: &Connection,
    id: &str,
    status: MarkStatus,
    updated_by: Option<&str>,
) -> CoreResult<()> {
    conn.execute(
        "UPDATE cie_marks SET status = ?, updated_by = ?, updated_at = ? WHERE id = ?",
        (status.as_str(), updated_by, now_stamp(), id),
    )?;
    Ok(())
}

pub fn delete_mark(conn: &Connection, id: &str) -> CoreResult<()> {
    conn.execute("DELETE FROM cie_marks WHERE id = ?", [id])?;
    Ok(())
}

// --- assignment requests --------------------------------------------------

pub fn find_request(conn: &Connection, id: &str) -> CoreResult<Option<AssignmentRequest>> {
    let sql = format!("SELECT {REQUEST_COLS} FROM assignment_requests WHERE id = ?");
    Ok(conn.query_row(&sql, [id], request_from_row).optional()?)
}

pub fn list_requests(
    conn: &Connection,
    faculty_id: Option<&str>,
    department: Option<&str>,
    status: Option<RequestStatus>,
) -> CoreResult<Vec<AssignmentRequest>> {
    let mut sql = format!("SELECT {REQUEST_COLS} FROM assignment_requests WHERE 1 = 1");
    let mut bind: Vec<Value> = Vec::new();
    if let Some(f) = faculty_id {
        sql.push_str(" AND faculty_id = ?");
        bind.push(Value::Text(f.to_string()));
    }
    if let Some(d) = department {
        sql.push_str(" AND target_department = ?");
        bind.push(Value::Text(d.to_string()));
    }
    if let Some(s) = status {
        sql.push_str(" AND status = ?");
        bind.push(Value::Text(s.as_str().to_string()));
    }
    sql.push_str(" ORDER BY created_at DESC");
    query_all(conn, &sql, bind, request_from_row)
}

pub fn insert_request(conn: &Connection, r: &AssignmentRequest) -> CoreResult<()> {
    conn.execute(
        "INSERT INTO assignment_requests(id, faculty_id, target_department, subjects, sections, semester, status, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &r.id,
            &r.faculty_id,
            &r.target_department,
            join_name_set(&r.subjects),
            join_name_set(&r.sections),
            &r.semester,
            r.status.as_str(),
            &r.created_at,
        ),
    )?;
    Ok(())
}

pub fn set_request_status(conn: &Connection, id: &str, status: RequestStatus) -> CoreResult<()> {
    conn.execute(
        "UPDATE assignment_requests SET status = ? WHERE id = ?",
        (status.as_str(), id),
    )?;
    Ok(())
}

pub fn delete_requests_for(
    conn: &Connection,
    faculty_id: &str,
    department: &str,
) -> CoreResult<usize> {
    Ok(conn.execute(
        "DELETE FROM assignment_requests WHERE faculty_id = ? AND target_department = ?",
        (faculty_id, department),
    )?)
}
