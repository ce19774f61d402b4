use crate::calc::{self, AtRiskStudent, GradeDistribution, Snapshot, SubjectPerformance};
use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};
use crate::model::{
    Actor, AssignmentRequest, MarkStatus, RequestStatus, StaffMember, StaffRole, Student, Subject,
};
use crate::store;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::info;
use uuid::Uuid;

/// What a faculty member may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// No sections configured and no approved cross-department grants.
    Unrestricted,
    Sections {
        home_department: Option<String>,
        sections: BTreeSet<String>,
        cross_departments: BTreeSet<String>,
    },
}

impl Scope {
    pub fn admits(&self, student: &Student) -> bool {
        match self {
            Scope::Unrestricted => true,
            Scope::Sections {
                home_department,
                sections,
                cross_departments,
            } => {
                let dept = student.department.as_deref();
                let in_home_section = student
                    .section
                    .as_ref()
                    .is_some_and(|s| sections.contains(s))
                    && (home_department.is_none() || dept == home_department.as_deref());
                // Grants are department-wide; granted sections are not checked here.
                in_home_section || dept.is_some_and(|d| cross_departments.contains(d))
            }
        }
    }

    /// Section filter used by class analytics: department is not consulted.
    fn section_allowed(&self, student: &Student) -> bool {
        match self {
            Scope::Sections { sections, .. } if !sections.is_empty() => student
                .section
                .as_ref()
                .is_some_and(|s| sections.contains(s)),
            _ => true,
        }
    }
}

pub fn resolve_scope(faculty: &StaffMember, requests: &[AssignmentRequest]) -> Scope {
    let cross_departments: BTreeSet<String> = requests
        .iter()
        .filter(|r| r.faculty_id == faculty.id && r.status == RequestStatus::Approved)
        .map(|r| r.target_department.clone())
        .collect();
    if faculty.sections.is_empty() && cross_departments.is_empty() {
        return Scope::Unrestricted;
    }
    Scope::Sections {
        home_department: faculty.department.clone(),
        sections: faculty.sections.clone(),
        cross_departments,
    }
}

fn load_faculty(conn: &Connection, faculty_id: &str) -> CoreResult<StaffMember> {
    store::find_staff(conn, faculty_id)?.ok_or_else(|| CoreError::not_found("faculty", faculty_id))
}

fn approved_requests(conn: &Connection, faculty_id: &str) -> CoreResult<Vec<AssignmentRequest>> {
    store::list_requests(conn, Some(faculty_id), None, Some(RequestStatus::Approved))
}

pub fn scope_for(conn: &Connection, faculty_id: &str) -> CoreResult<(StaffMember, Scope)> {
    let faculty = load_faculty(conn, faculty_id)?;
    let scope = resolve_scope(&faculty, &approved_requests(conn, faculty_id)?);
    Ok((faculty, scope))
}

/// Subjects named on the profile or granted by an approved request.
pub fn subjects_for(conn: &Connection, faculty_id: &str) -> CoreResult<Vec<Subject>> {
    let faculty = load_faculty(conn, faculty_id)?;
    let mut names = faculty.subjects.clone();
    for r in approved_requests(conn, faculty_id)? {
        names.extend(r.subjects);
    }
    store::subjects_by_names(conn, &names)
}

/// Students a resolved scope admits, ordered by register number.
pub fn students_in_scope(conn: &Connection, scope: &Scope) -> CoreResult<Vec<Student>> {
    let mut students = store::list_students(conn, None)?;
    students.retain(|s| scope.admits(s));
    Ok(students)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LowPerformerRow {
    pub reg_no: String,
    pub name: String,
    pub subject: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacultyAnalytics {
    pub faculty_id: String,
    pub unrestricted: bool,
    pub evaluated: usize,
    pub pending: usize,
    pub avg_score: f64,
    pub low_performers: usize,
    pub top_performers: usize,
    pub total_students: usize,
    pub low_performers_list: Vec<LowPerformerRow>,
    pub cie_trend: BTreeMap<&'static str, f64>,
    pub grade_distribution: GradeDistribution,
    pub subject_perf_list: Vec<SubjectPerformance>,
    pub at_risk_students: Vec<AtRiskStudent>,
}

/// The department pipeline restricted to one faculty member's subjects and sections.
///
/// `evaluated` counts distinct students with any mark record in scope, graded or not.
pub fn class_analytics(
    conn: &Connection,
    cfg: &EngineConfig,
    faculty_id: &str,
) -> CoreResult<FacultyAnalytics> {
    let (_, scope) = scope_for(conn, faculty_id)?;
    let subjects = subjects_for(conn, faculty_id)?;
    let ids: Vec<String> = subjects.iter().map(|s| s.id.clone()).collect();
    let students = store::list_students(conn, None)?;
    let by_id: HashMap<&str, &Student> = students.iter().map(|s| (s.id.as_str(), s)).collect();
    let subject_names: HashMap<&str, &str> =
        subjects.iter().map(|s| (s.id.as_str(), s.name.as_str())).collect();

    let marks: Vec<_> = store::marks_for_subjects(conn, &ids)?
        .into_iter()
        .filter(|m| {
            by_id
                .get(m.student_id.as_str())
                .is_some_and(|s| scope.section_allowed(s))
        })
        .collect();

    let snap = Snapshot {
        subjects: &subjects,
        students: &students,
        marks: &marks,
    };
    let valid = calc::valid_marks(&snap, cfg);
    let graded: Vec<_> = valid.marks.iter().filter(|m| m.score > 0.0).collect();

    let mut sum = 0.0;
    let mut low_performers = 0usize;
    let mut top_performers = 0usize;
    let mut low_list: Vec<LowPerformerRow> = Vec::new();
    for m in &graded {
        sum += m.score;
        if m.score < cfg.pass_mark {
            low_performers += 1;
            if low_list.len() < cfg.faculty_low_performer_limit {
                if let Some(s) = by_id.get(m.student_id) {
                    low_list.push(LowPerformerRow {
                        reg_no: s.reg_no.clone(),
                        name: s.name.clone(),
                        subject: subject_names.get(m.subject_id).unwrap_or(&"").to_string(),
                        score: calc::round_off_1_decimal(m.score),
                    });
                }
            }
        }
        if m.score >= cfg.top_performer_mark {
            top_performers += 1;
        }
    }
    let avg_score = if graded.is_empty() || cfg.max_marks <= 0.0 {
        0.0
    } else {
        calc::round_off_1_decimal(sum / graded.len() as f64 / cfg.max_marks * 100.0)
    };

    let evaluated: BTreeSet<&str> = marks.iter().map(|m| m.student_id.as_str()).collect();
    let pending = marks
        .iter()
        .filter(|m| m.status == MarkStatus::Pending)
        .count();
    let total_students = students_in_scope(conn, &scope)?.len();

    Ok(FacultyAnalytics {
        faculty_id: faculty_id.to_string(),
        unrestricted: scope == Scope::Unrestricted,
        evaluated: evaluated.len(),
        pending,
        avg_score,
        low_performers,
        top_performers,
        total_students,
        low_performers_list: low_list,
        cie_trend: calc::round_trend(&valid.marks),
        grade_distribution: calc::grade_distribution(&valid.marks, cfg),
        subject_perf_list: calc::subject_performance(&subjects, &valid.marks, cfg),
        at_risk_students: calc::at_risk(&students, &valid.marks, cfg),
    })
}

// --- cross-department assignment requests ----------------------------------

pub struct NewRequest {
    pub faculty_id: String,
    pub target_department: String,
    pub subjects: BTreeSet<String>,
    pub sections: BTreeSet<String>,
    pub semester: Option<String>,
}

pub fn create_request(conn: &Connection, new: NewRequest) -> CoreResult<AssignmentRequest> {
    let department = new.target_department.trim().to_string();
    if department.is_empty() {
        return Err(CoreError::Validation("targetDepartment is required".into()));
    }
    if new.subjects.is_empty() {
        return Err(CoreError::Validation("at least one subject is required".into()));
    }
    let faculty = load_faculty(conn, &new.faculty_id)?;
    let duplicate = store::list_requests(
        conn,
        Some(&faculty.id),
        Some(&department),
        Some(RequestStatus::Pending),
    )?;
    if !duplicate.is_empty() {
        return Err(CoreError::InvalidState(format!(
            "a pending request for {department} already exists"
        )));
    }

    let request = AssignmentRequest {
        id: Uuid::new_v4().to_string(),
        faculty_id: faculty.id,
        target_department: department,
        subjects: new.subjects,
        sections: new.sections,
        semester: new.semester,
        status: RequestStatus::Pending,
        created_at: store::now_stamp(),
    };
    store::insert_request(conn, &request)?;
    Ok(request)
}

fn load_pending_request(conn: &Connection, request_id: &str) -> CoreResult<AssignmentRequest> {
    let request = store::find_request(conn, request_id)?
        .ok_or_else(|| CoreError::not_found("assignment request", request_id))?;
    if request.status != RequestStatus::Pending {
        return Err(CoreError::InvalidState(format!(
            "Request is already {}",
            request.status.as_str()
        )));
    }
    Ok(request)
}

/// Grants the request: subjects and sections merge into the faculty profile and the
/// target department's matching subjects name the faculty as instructor.
pub fn approve_request(
    conn: &Connection,
    actor: &Actor,
    request_id: &str,
) -> CoreResult<AssignmentRequest> {
    let mut request = load_pending_request(conn, request_id)?;
    let mut faculty = load_faculty(conn, &request.faculty_id)?;

    let tx = conn.unchecked_transaction()?;
    faculty.subjects.extend(request.subjects.iter().cloned());
    faculty.sections.extend(request.sections.iter().cloned());
    store::upsert_staff(&tx, &faculty)?;
    for subject in store::list_subjects(&tx, Some(&request.target_department))? {
        if request.subjects.contains(&subject.name) {
            store::set_instructor(&tx, &subject.id, Some(&faculty.full_name))?;
        }
    }
    store::set_request_status(&tx, &request.id, RequestStatus::Approved)?;
    tx.commit()?;

    info!(
        request_id,
        faculty = %faculty.username,
        department = %request.target_department,
        actor = %actor.username,
        "assignment request approved"
    );
    request.status = RequestStatus::Approved;
    Ok(request)
}

pub fn reject_request(
    conn: &Connection,
    actor: &Actor,
    request_id: &str,
) -> CoreResult<AssignmentRequest> {
    let mut request = load_pending_request(conn, request_id)?;
    store::set_request_status(conn, &request.id, RequestStatus::Rejected)?;
    info!(request_id, actor = %actor.username, "assignment request rejected");
    request.status = RequestStatus::Rejected;
    Ok(request)
}

/// Home faculty of `department` plus faculty holding an approved grant for it.
pub fn faculty_for_department(conn: &Connection, department: &str) -> CoreResult<Vec<StaffMember>> {
    let mut by_id: BTreeMap<String, StaffMember> = store::list_staff(conn, Some(StaffRole::Faculty), Some(department))?
        .into_iter()
        .map(|m| (m.id.clone(), m))
        .collect();
    for r in store::list_requests(conn, None, Some(department), Some(RequestStatus::Approved))? {
        if by_id.contains_key(&r.faculty_id) {
            continue;
        }
        if let Some(m) = store::find_staff(conn, &r.faculty_id)? {
            by_id.insert(m.id.clone(), m);
        }
    }
    let mut out: Vec<StaffMember> = by_id.into_values().collect();
    out.sort_by(|a, b| a.full_name.cmp(&b.full_name));
    Ok(out)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovalOutcome {
    pub faculty_id: String,
    pub department: String,
    pub removed_subjects: usize,
    pub cleared_instructors: usize,
    pub home_department: bool,
    pub removed_requests: usize,
}

/// Detaches a faculty member from one department's subjects and grants.
pub fn remove_faculty_from_department(
    conn: &Connection,
    faculty_id: &str,
    department: &str,
) -> CoreResult<RemovalOutcome> {
    let mut faculty = load_faculty(conn, faculty_id)?;
    let dept_subjects = store::list_subjects(conn, Some(department))?;
    let names: BTreeSet<&str> = dept_subjects.iter().map(|s| s.name.as_str()).collect();

    let before = faculty.subjects.len();
    faculty.subjects.retain(|s| !names.contains(s.as_str()));
    let removed_subjects = before - faculty.subjects.len();
    let home_department = faculty.department.as_deref() == Some(department);

    let tx = conn.unchecked_transaction()?;
    let mut cleared_instructors = 0usize;
    for s in &dept_subjects {
        if s.instructor_name.as_deref() == Some(faculty.full_name.as_str()) {
            store::set_instructor(&tx, &s.id, None)?;
            cleared_instructors += 1;
        }
    }
    let mut removed_requests = 0usize;
    if home_department {
        faculty.sections.clear();
        faculty.department = None;
    } else {
        removed_requests = store::delete_requests_for(&tx, faculty_id, department)?;
    }
    store::upsert_staff(&tx, &faculty)?;
    tx.commit()?;

    Ok(RemovalOutcome {
        faculty_id: faculty_id.to_string(),
        department: department.to_string(),
        removed_subjects,
        cleared_instructors,
        home_department,
        removed_requests,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn faculty(sections: &[&str]) -> StaffMember {
        StaffMember {
            id: "f1".into(),
            username: "fac1".into(),
            full_name: "Dr. One".into(),
            role: StaffRole::Faculty,
            department: Some("CSE".into()),
            subjects: BTreeSet::new(),
            sections: sections.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn request(dept: &str, status: RequestStatus) -> AssignmentRequest {
        AssignmentRequest {
            id: format!("r-{dept}"),
            faculty_id: "f1".into(),
            target_department: dept.into(),
            subjects: BTreeSet::from(["Maths".to_string()]),
            sections: BTreeSet::from(["B".to_string()]),
            semester: None,
            status,
            created_at: String::new(),
        }
    }

    fn student(dept: &str, section: &str) -> Student {
        Student {
            id: format!("{dept}-{section}"),
            reg_no: format!("{dept}{section}"),
            name: "S".into(),
            department: Some(dept.into()),
            semester: None,
            section: Some(section.into()),
            email: None,
            phone: None,
            parent_phone: None,
        }
    }

    #[test]
    fn unconfigured_faculty_is_unrestricted() {
        let scope = resolve_scope(&faculty(&[]), &[request("ECE", RequestStatus::Pending)]);
        assert_eq!(scope, Scope::Unrestricted);
        assert!(scope.admits(&student("MECH", "Z")));
    }

    #[test]
    fn sections_limit_home_department_only() {
        let scope = resolve_scope(&faculty(&["A"]), &[]);
        assert!(scope.admits(&student("CSE", "A")));
        assert!(!scope.admits(&student("CSE", "B")));
        assert!(!scope.admits(&student("ECE", "A")));
    }

    #[test]
    fn approved_grant_admits_whole_target_department() {
        let scope = resolve_scope(
            &faculty(&[]),
            &[
                request("ECE", RequestStatus::Approved),
                request("MECH", RequestStatus::Rejected),
            ],
        );
        assert!(matches!(scope, Scope::Sections { .. }));
        assert!(scope.admits(&student("ECE", "Q")));
        assert!(!scope.admits(&student("MECH", "B")));
        assert!(!scope.admits(&student("CSE", "A")));
    }

    #[test]
    fn analytics_section_filter_ignores_department() {
        let scope = resolve_scope(&faculty(&["A"]), &[request("ECE", RequestStatus::Approved)]);
        assert!(scope.section_allowed(&student("ECE", "A")));
        assert!(scope.section_allowed(&student("MECH", "A")));
        assert!(!scope.section_allowed(&student("ECE", "D")));
        assert!(!scope.section_allowed(&student("CSE", "B")));

        let grant_only = resolve_scope(&faculty(&[]), &[request("ECE", RequestStatus::Approved)]);
        assert!(grant_only.section_allowed(&student("CSE", "Z")));
    }
}
