use crate::error::{CoreError, CoreResult};
use crate::model::{StaffMember, StaffRole, Student, Subject};
use crate::store;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;
use uuid::Uuid;

fn required(value: &str, field: &str) -> CoreResult<String> {
    let v = value.trim();
    if v.is_empty() {
        return Err(CoreError::Validation(format!("{field} is required")));
    }
    Ok(v.to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewStudent {
    pub reg_no: String,
    pub name: String,
    pub department: Option<String>,
    pub semester: Option<i64>,
    pub section: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub parent_phone: Option<String>,
}

pub fn create_student(conn: &Connection, new: NewStudent) -> CoreResult<Student> {
    let reg_no = required(&new.reg_no, "regNo")?;
    let name = required(&new.name, "name")?;
    if store::find_student_by_reg_no(conn, &reg_no)?.is_some() {
        return Err(CoreError::InvalidState(format!("student {reg_no} already exists")));
    }
    let student = Student {
        id: Uuid::new_v4().to_string(),
        reg_no,
        name,
        department: non_empty(new.department),
        semester: new.semester,
        section: non_empty(new.section),
        email: non_empty(new.email),
        phone: non_empty(new.phone),
        parent_phone: non_empty(new.parent_phone),
    };
    store::insert_student(conn, &student)?;
    Ok(student)
}

/// Deletes a student and its marks.
pub fn delete_student(conn: &Connection, reg_no: &str) -> CoreResult<Student> {
    let student = store::find_student_by_reg_no(conn, reg_no)?
        .ok_or_else(|| CoreError::not_found("student", reg_no))?;
    let tx = conn.unchecked_transaction()?;
    store::delete_student_cascade(&tx, &student.id)?;
    tx.commit()?;
    info!(reg_no, "student deleted");
    Ok(student)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDeleteOutcome {
    pub deleted: usize,
    pub missing: Vec<String>,
}

pub fn delete_students(conn: &Connection, reg_nos: &[String]) -> CoreResult<BulkDeleteOutcome> {
    let tx = conn.unchecked_transaction()?;
    let mut deleted = 0usize;
    let mut missing = Vec::new();
    for reg_no in reg_nos {
        match store::find_student_by_reg_no(&tx, reg_no)? {
            Some(s) => {
                store::delete_student_cascade(&tx, &s.id)?;
                deleted += 1;
            }
            None => missing.push(reg_no.clone()),
        }
    }
    tx.commit()?;
    info!(deleted, missing = missing.len(), "students bulk deleted");
    Ok(BulkDeleteOutcome { deleted, missing })
}

// --- CSV import -----------------------------------------------------------

fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                buf.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => out.push(std::mem::take(&mut buf)),
            _ => buf.push(ch),
        }
    }
    out.push(buf);
    out.into_iter().map(|c| c.trim().to_string()).collect()
}

fn is_header(cols: &[String]) -> bool {
    cols.first()
        .map(|c| c.eq_ignore_ascii_case("regno") || c.eq_ignore_ascii_case("rollno"))
        .unwrap_or(false)
}

/// `RegNo, Name, "Sem / Sec", ParentPhone`.
fn is_compact_layout(cols: &[String]) -> bool {
    cols.len() <= 5
        && cols.len() >= 3
        && cols[0].chars().any(|c| c.is_ascii_digit())
        && (cols[2].contains('/') || cols[2].contains('-'))
}

fn col(cols: &[String], i: usize) -> Option<String> {
    cols.get(i).cloned().filter(|c| !c.is_empty())
}

fn parse_semester(raw: Option<&str>) -> Option<i64> {
    let digits: String = raw?.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn student_from_csv(cols: &[String], department: &str) -> NewStudent {
    let department = Some(department.to_string());
    if is_compact_layout(cols) {
        let mut parts = cols[2].splitn(2, &['/', '-'][..]);
        let semester = parse_semester(parts.next());
        let section = parts.next().map(|s| s.trim().to_string());
        NewStudent {
            reg_no: cols[0].clone(),
            name: cols[1].clone(),
            department,
            semester,
            section,
            email: Some(format!("{}@student.college.edu", cols[0].to_ascii_lowercase())),
            phone: None,
            parent_phone: col(cols, 3),
        }
    } else {
        NewStudent {
            reg_no: cols[0].clone(),
            name: cols[1].clone(),
            department,
            semester: parse_semester(col(cols, 2).as_deref()),
            section: col(cols, 3),
            email: col(cols, 4),
            phone: col(cols, 5),
            parent_phone: col(cols, 6),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRowError {
    pub row: usize,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub added: usize,
    pub skipped: usize,
    pub errors: Vec<ImportRowError>,
}

/// Imports students from CSV text into `department` in one transaction.
///
/// Rows with a missing regNo or name are reported, rows for an existing regNo are skipped.
pub fn import_students_csv(conn: &Connection, department: &str, text: &str) -> CoreResult<ImportOutcome> {
    let department = required(department, "department")?;
    let tx = conn.unchecked_transaction()?;
    let mut out = ImportOutcome {
        added: 0,
        skipped: 0,
        errors: Vec::new(),
    };

    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let cols = parse_csv_record(line);
        if i == 0 && is_header(&cols) {
            continue;
        }
        if cols.len() < 2 {
            continue;
        }
        let row = i + 1;
        if cols[0].is_empty() || cols[1].is_empty() {
            out.errors.push(ImportRowError {
                row,
                message: format!("Row {row}: Missing RegNo or Name"),
            });
            continue;
        }
        if store::find_student_by_reg_no(&tx, &cols[0])?.is_some() {
            out.skipped += 1;
            continue;
        }
        match create_student(&tx, student_from_csv(&cols, &department)) {
            Ok(_) => out.added += 1,
            Err(CoreError::Db(e)) => return Err(CoreError::Db(e)),
            Err(e) => out.errors.push(ImportRowError {
                row,
                message: format!("Row {row}: {e}"),
            }),
        }
    }

    tx.commit()?;
    info!(
        department = %department,
        added = out.added,
        skipped = out.skipped,
        errors = out.errors.len(),
        "student csv imported"
    );
    Ok(out)
}

// --- subjects -------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewSubject {
    pub name: String,
    pub code: String,
    pub department: String,
    pub semester: Option<i64>,
    pub credits: Option<i64>,
    pub instructor_name: Option<String>,
    pub max_marks: Option<f64>,
}

pub fn create_subject(conn: &Connection, new: NewSubject) -> CoreResult<Subject> {
    let name = required(&new.name, "name")?;
    let code = required(&new.code, "code")?;
    let department = required(&new.department, "department")?;
    if let Some(max) = new.max_marks {
        if !(max.is_finite() && max > 0.0) {
            return Err(CoreError::Validation("maxMarks must be positive".into()));
        }
    }
    if store::find_subject_by_code(conn, &code)?.is_some() {
        return Err(CoreError::InvalidState(format!("subject code {code} already exists")));
    }
    if store::list_subjects(conn, Some(&department))?
        .iter()
        .any(|s| s.name == name)
    {
        return Err(CoreError::InvalidState(format!(
            "subject {name} already exists in {department}"
        )));
    }
    let subject = Subject {
        id: Uuid::new_v4().to_string(),
        name,
        code,
        department,
        semester: new.semester,
        credits: new.credits,
        instructor_name: non_empty(new.instructor_name),
        max_marks: new.max_marks,
    };
    store::insert_subject(conn, &subject)?;
    Ok(subject)
}

/// Deletes a subject and its marks.
pub fn delete_subject(conn: &Connection, subject_id: &str) -> CoreResult<()> {
    let tx = conn.unchecked_transaction()?;
    if !store::delete_subject_cascade(&tx, subject_id)? {
        return Err(CoreError::not_found("subject", subject_id));
    }
    tx.commit()?;
    info!(subject_id, "subject deleted");
    Ok(())
}

// --- staff ----------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StaffInput {
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub role: Option<String>,
    pub department: Option<String>,
    pub subjects: Option<Vec<String>>,
    pub sections: Option<Vec<String>>,
}

fn name_set(values: Vec<String>) -> BTreeSet<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

pub fn create_staff(conn: &Connection, input: StaffInput) -> CoreResult<StaffMember> {
    let member = StaffMember {
        id: Uuid::new_v4().to_string(),
        username: required(input.username.as_deref().unwrap_or(""), "username")?,
        full_name: required(input.full_name.as_deref().unwrap_or(""), "fullName")?,
        role: StaffRole::parse(input.role.as_deref().unwrap_or("faculty"))?,
        department: non_empty(input.department),
        subjects: name_set(input.subjects.unwrap_or_default()),
        sections: name_set(input.sections.unwrap_or_default()),
    };
    if store::list_staff(conn, None, None)?
        .iter()
        .any(|m| m.username == member.username)
    {
        return Err(CoreError::InvalidState(format!(
            "username {} already exists",
            member.username
        )));
    }
    store::upsert_staff(conn, &member)?;
    Ok(member)
}

/// Overwrites the fields present in `input`.
pub fn update_staff(conn: &Connection, id: &str, input: StaffInput) -> CoreResult<StaffMember> {
    let mut member = store::find_staff(conn, id)?.ok_or_else(|| CoreError::not_found("staff", id))?;
    if let Some(v) = input.full_name {
        member.full_name = required(&v, "fullName")?;
    }
    if let Some(v) = input.role {
        member.role = StaffRole::parse(&v)?;
    }
    if input.department.is_some() {
        member.department = non_empty(input.department);
    }
    if let Some(v) = input.subjects {
        member.subjects = name_set(v);
    }
    if let Some(v) = input.sections {
        member.sections = name_set(v);
    }
    store::upsert_staff(conn, &member)?;
    Ok(member)
}
