use crate::config::EngineConfig;
use crate::error::CoreResult;
use crate::model::{MarkRecord, MarkStatus, Round, RoundMatch, StaffRole, Student, Subject};
use crate::store;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// 1-decimal rounding, half-up: `floor(10*x + 0.5) / 10`.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

pub const GRADE_LABELS: [&str; 5] = ["A (80%+)", "B (60-79%)", "C (40-59%)", "D (20-39%)", "F (<20%)"];

/// Running sum and count for one bucket.
#[derive(Debug, Clone, Copy, Default)]
struct Acc {
    sum: f64,
    count: usize,
}

impl Acc {
    fn push(&mut self, v: f64) {
        self.sum += v;
        self.count += 1;
    }

    fn mean(&self) -> f64 {
        ratio(self.sum, self.count as f64)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct RoundAcc([Acc; 5]);

impl RoundAcc {
    fn push(&mut self, round: Round, v: f64) {
        self.0[usize::from(round.number() - 1)].push(v);
    }

    fn averages(&self) -> BTreeMap<&'static str, f64> {
        Round::ALL
            .iter()
            .map(|r| (r.label(), round_off_1_decimal(self.0[usize::from(r.number() - 1)].mean())))
            .collect()
    }
}

/// Point-in-time inputs for one aggregation.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    pub subjects: &'a [Subject],
    pub students: &'a [Student],
    pub marks: &'a [MarkRecord],
}

/// A graded mark, scaled onto the configured maximum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidMark<'a> {
    pub student_id: &'a str,
    pub subject_id: &'a str,
    pub round: Option<Round>,
    pub round_label: &'a str,
    pub score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ValidSet<'a> {
    pub marks: Vec<ValidMark<'a>>,
    pub heuristic_rounds: usize,
    pub unclassified: usize,
}

/// Stage 1: drops unscored marks, PENDING zeros and marks on subjects outside the snapshot.
pub fn valid_marks<'a>(snap: &Snapshot<'a>, cfg: &EngineConfig) -> ValidSet<'a> {
    let subject_max: HashMap<&str, f64> = snap
        .subjects
        .iter()
        .map(|s| (s.id.as_str(), s.max_marks.unwrap_or(cfg.max_marks)))
        .collect();

    let mut out = ValidSet::default();
    for m in snap.marks {
        let Some(score) = m.score else { continue };
        if score == 0.0 && m.status == MarkStatus::Pending {
            continue;
        }
        let Some(max) = subject_max.get(m.subject_id.as_str()) else {
            continue;
        };
        let round = match Round::classify(&m.round) {
            Some(RoundMatch::Exact(r)) => Some(r),
            Some(RoundMatch::Heuristic(r)) => {
                out.heuristic_rounds += 1;
                Some(r)
            }
            None => {
                out.unclassified += 1;
                None
            }
        };
        out.marks.push(ValidMark {
            student_id: &m.student_id,
            subject_id: &m.subject_id,
            round,
            round_label: &m.round,
            score: score * ratio(cfg.max_marks, *max),
        });
    }
    if out.heuristic_rounds + out.unclassified > 0 {
        warn!(
            heuristic = out.heuristic_rounds,
            unclassified = out.unclassified,
            "non-canonical round labels in mark snapshot"
        );
    }
    out
}

/// Stage 2: average valid score per round.
pub fn round_trend(marks: &[ValidMark<'_>]) -> BTreeMap<&'static str, f64> {
    let mut acc = RoundAcc::default();
    for m in marks {
        if let Some(r) = m.round {
            acc.push(r, m.score);
        }
    }
    acc.averages()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeDistribution {
    pub labels: [&'static str; 5],
    pub data: [usize; 5],
}

pub fn grade_band(score: f64, max: f64) -> usize {
    let percent = ratio(score, max) * 100.0;
    if percent >= 80.0 {
        0
    } else if percent >= 60.0 {
        1
    } else if percent >= 40.0 {
        2
    } else if percent >= 20.0 {
        3
    } else {
        4
    }
}

/// Stage 3: count of valid marks per percentage band.
pub fn grade_distribution(marks: &[ValidMark<'_>], cfg: &EngineConfig) -> GradeDistribution {
    let mut data = [0usize; 5];
    for m in marks {
        data[grade_band(m.score, cfg.max_marks)] += 1;
    }
    GradeDistribution {
        labels: GRADE_LABELS,
        data,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectPerformance {
    pub id: String,
    pub name: String,
    pub code: String,
    pub averages: BTreeMap<&'static str, f64>,
    pub overall: f64,
    pub pass_rate: f64,
    pub mark_count: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct SubjectAcc {
    rounds: RoundAcc,
    passed: usize,
    total: usize,
}

/// Stage 4: per-round averages, overall and pass rate for each subject.
pub fn subject_performance(
    subjects: &[Subject],
    marks: &[ValidMark<'_>],
    cfg: &EngineConfig,
) -> Vec<SubjectPerformance> {
    let mut accs: HashMap<&str, SubjectAcc> = HashMap::new();
    for m in marks {
        let acc = accs.entry(m.subject_id).or_default();
        if let Some(r) = m.round {
            acc.rounds.push(r, m.score);
        }
        acc.total += 1;
        if m.score >= cfg.pass_mark {
            acc.passed += 1;
        }
    }

    subjects
        .iter()
        .map(|s| {
            let acc = accs.get(s.id.as_str()).copied().unwrap_or_default();
            let averages = acc.rounds.averages();
            let graded = averages.values().filter(|v| **v > 0.0).fold(Acc::default(), |mut a, v| {
                a.push(*v);
                a
            });
            SubjectPerformance {
                id: s.id.clone(),
                name: s.name.clone(),
                code: s.code.clone(),
                averages,
                overall: round_off_1_decimal(graded.mean()),
                pass_rate: round_off_1_decimal(ratio(acc.passed as f64 * 100.0, acc.total as f64))
                    .min(100.0),
                mark_count: acc.total,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskSeverity {
    #[serde(rename = "critical")]
    Critical,
    #[serde(rename = "below threshold")]
    BelowThreshold,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AtRiskStudent {
    pub id: String,
    pub roll_no: String,
    pub name: String,
    pub avg_marks: f64,
    pub severity: RiskSeverity,
    pub issue: &'static str,
}

/// Stage 5: students whose mean valid score is below the pass mark.
pub fn at_risk(
    students: &[Student],
    marks: &[ValidMark<'_>],
    cfg: &EngineConfig,
) -> Vec<AtRiskStudent> {
    let mut per_student: BTreeMap<&str, Acc> = BTreeMap::new();
    for m in marks {
        per_student.entry(m.student_id).or_default().push(m.score);
    }
    let by_id: HashMap<&str, &Student> = students.iter().map(|s| (s.id.as_str(), s)).collect();

    let mut out: Vec<AtRiskStudent> = per_student
        .into_iter()
        .filter_map(|(id, acc)| {
            let avg = acc.mean();
            if avg >= cfg.pass_mark {
                return None;
            }
            let s = by_id.get(id)?;
            let severity = if avg < cfg.critical_mark {
                RiskSeverity::Critical
            } else {
                RiskSeverity::BelowThreshold
            };
            Some(AtRiskStudent {
                id: s.id.clone(),
                roll_no: s.reg_no.clone(),
                name: s.name.clone(),
                avg_marks: round_off_1_decimal(avg),
                severity,
                issue: match severity {
                    RiskSeverity::Critical => "Critical - Very Low Marks",
                    RiskSeverity::BelowThreshold => "Below Pass Threshold",
                },
            })
        })
        .collect();
    out.sort_by(|a, b| a.avg_marks.total_cmp(&b.avg_marks).then_with(|| a.roll_no.cmp(&b.roll_no)));
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Critical,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: usize,
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub message: String,
    pub date: String,
}

fn push_alert(out: &mut Vec<Alert>, kind: AlertKind, message: String, date: &str) {
    out.push(Alert {
        id: out.len() + 1,
        kind,
        message,
        date: date.to_string(),
    });
}

/// Stage 6: dashboard alerts, falling back to a single all-clear notice.
pub fn alerts(
    at_risk_count: usize,
    subjects: &[SubjectPerformance],
    pending_count: usize,
    cfg: &EngineConfig,
    today: NaiveDate,
) -> Vec<Alert> {
    let date = today.to_string();
    let mut out: Vec<Alert> = Vec::new();

    if at_risk_count > 0 {
        push_alert(
            &mut out,
            AlertKind::Critical,
            format!("{at_risk_count} students are at risk with below-threshold marks"),
            &date,
        );
    }
    for sp in subjects {
        if sp.overall > 0.0 && sp.overall < cfg.low_average_mark {
            push_alert(
                &mut out,
                AlertKind::Warning,
                format!(
                    "{} has low class average ({}/{})",
                    sp.name, sp.overall, cfg.max_marks
                ),
                &date,
            );
        }
    }
    if pending_count > 0 {
        push_alert(
            &mut out,
            AlertKind::Info,
            format!("{pending_count} mark entries are still pending review"),
            &date,
        );
    }
    if out.is_empty() {
        push_alert(
            &mut out,
            AlertKind::Info,
            "All department metrics are within acceptable range".to_string(),
            &date,
        );
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rollup {
    pub dept_average: f64,
    pub pass_percentage: f64,
    pub subjects_with_data: usize,
}

/// Stage 7: mean of subject overall and pass rate over subjects that have valid marks.
pub fn department_rollup(subjects: &[SubjectPerformance]) -> Rollup {
    let mut avg = Acc::default();
    let mut pass = Acc::default();
    for sp in subjects.iter().filter(|sp| sp.mark_count > 0) {
        avg.push(sp.overall);
        pass.push(sp.pass_rate.min(100.0));
    }
    Rollup {
        dept_average: round_off_1_decimal(avg.mean()),
        pass_percentage: round_off_1_decimal(pass.mean()).min(100.0),
        subjects_with_data: avg.count,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub submitted: usize,
    pub approved: usize,
    pub rejected: usize,
}

impl StatusCounts {
    pub fn from_marks<'a>(marks: impl IntoIterator<Item = &'a MarkRecord>) -> Self {
        let mut c = StatusCounts::default();
        for m in marks {
            match m.status {
                MarkStatus::Pending => c.pending += 1,
                MarkStatus::Submitted => c.submitted += 1,
                MarkStatus::Approved => c.approved += 1,
                MarkStatus::Rejected => c.rejected += 1,
            }
        }
        c
    }

    pub fn total(&self) -> usize {
        self.pending + self.submitted + self.approved + self.rejected
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentStats {
    pub department: String,
    pub total_students: usize,
    pub total_subjects: usize,
    pub faculty_count: usize,
    pub pending_count: usize,
    pub cie_trend: BTreeMap<&'static str, f64>,
    pub grade_distribution: GradeDistribution,
    pub subject_perf_list: Vec<SubjectPerformance>,
    pub at_risk_students: Vec<AtRiskStudent>,
    pub at_risk_count: usize,
    pub alerts: Vec<Alert>,
    pub dept_average: f64,
    pub pass_percentage: f64,
    pub status_counts: StatusCounts,
}

/// Runs the full pipeline over one department's snapshot.
pub fn compute_department_stats(
    department: &str,
    snap: &Snapshot<'_>,
    total_students: usize,
    faculty_count: usize,
    cfg: &EngineConfig,
    today: NaiveDate,
) -> DepartmentStats {
    let valid = valid_marks(snap, cfg);
    let cie_trend = round_trend(&valid.marks);
    let grade_distribution = grade_distribution(&valid.marks, cfg);
    let subject_perf_list = subject_performance(snap.subjects, &valid.marks, cfg);
    let at_risk_students = at_risk(snap.students, &valid.marks, cfg);
    let status_counts = StatusCounts::from_marks(snap.marks);
    let alerts = alerts(
        at_risk_students.len(),
        &subject_perf_list,
        status_counts.pending,
        cfg,
        today,
    );
    let rollup = department_rollup(&subject_perf_list);

    DepartmentStats {
        department: department.to_string(),
        total_students,
        total_subjects: snap.subjects.len(),
        faculty_count,
        pending_count: status_counts.pending,
        cie_trend,
        grade_distribution,
        at_risk_count: at_risk_students.len(),
        subject_perf_list,
        at_risk_students,
        alerts,
        dept_average: rollup.dept_average,
        pass_percentage: rollup.pass_percentage,
        status_counts,
    }
}

pub fn department_stats(
    conn: &Connection,
    cfg: &EngineConfig,
    department: &str,
) -> CoreResult<DepartmentStats> {
    let subjects = store::list_subjects(conn, Some(department))?;
    let ids: Vec<String> = subjects.iter().map(|s| s.id.clone()).collect();
    let marks = store::marks_for_subjects(conn, &ids)?;
    // At-risk rows resolve any student graded in the department's subjects.
    let students = store::list_students(conn, None)?;
    let total_students = students
        .iter()
        .filter(|s| s.department.as_deref() == Some(department))
        .count();
    let faculty_count = store::list_staff(conn, Some(StaffRole::Faculty), Some(department))?.len();

    Ok(compute_department_stats(
        department,
        &Snapshot {
            subjects: &subjects,
            students: &students,
            marks: &marks,
        },
        total_students,
        faculty_count,
        cfg,
        chrono::Local::now().date_naive(),
    ))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentSummary {
    pub department: String,
    pub hod: String,
    pub students: usize,
    pub subjects: usize,
    pub dept_average: f64,
    pub pass_percentage: f64,
    pub at_risk_count: usize,
    pub status_counts: StatusCounts,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkingSummary {
    pub avg_score: f64,
    pub pass_rate: f64,
    pub evaluated: usize,
    pub pending: usize,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CieStats {
    pub conducted: usize,
    pub pending: usize,
    pub graded: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LowPerformer {
    pub student_id: String,
    pub reg_no: String,
    pub name: String,
    pub department: Option<String>,
    pub subject: String,
    pub round: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstitutionStats {
    pub branches: Vec<String>,
    pub branch_performance: BTreeMap<String, f64>,
    pub dept_student_counts: BTreeMap<String, usize>,
    pub departments: Vec<DepartmentSummary>,
    pub faculty_analytics: MarkingSummary,
    pub low_performers: Vec<LowPerformer>,
    pub cie_stats: CieStats,
    pub total_students: usize,
    pub total_subjects: usize,
    pub total_faculty: usize,
}

pub fn institution_stats(conn: &Connection, cfg: &EngineConfig) -> CoreResult<InstitutionStats> {
    let branches: Vec<String> = store::known_departments(conn)?
        .into_iter()
        .filter(|d| !d.eq_ignore_ascii_case("ADMIN"))
        .collect();
    let subjects = store::list_subjects(conn, None)?;
    let students = store::list_students(conn, None)?;
    let marks = store::all_marks(conn)?;
    let hods = store::list_staff(conn, Some(StaffRole::Hod), None)?;
    let total_faculty = store::list_staff(conn, Some(StaffRole::Faculty), None)?.len();
    let today = chrono::Local::now().date_naive();

    let mut branch_performance = BTreeMap::new();
    let mut dept_student_counts = BTreeMap::new();
    let mut departments = Vec::with_capacity(branches.len());
    for dept in &branches {
        let dept_subjects: Vec<Subject> = subjects
            .iter()
            .filter(|s| &s.department == dept)
            .cloned()
            .collect();
        let dept_marks: Vec<MarkRecord> = marks
            .iter()
            .filter(|m| dept_subjects.iter().any(|s| s.id == m.subject_id))
            .cloned()
            .collect();
        let student_count = students
            .iter()
            .filter(|s| s.department.as_deref() == Some(dept.as_str()))
            .count();
        let snap = Snapshot {
            subjects: &dept_subjects,
            students: &students,
            marks: &dept_marks,
        };
        let valid = valid_marks(&snap, cfg);
        let mean = valid.marks.iter().fold(Acc::default(), |mut a, m| {
            a.push(m.score);
            a
        });
        branch_performance.insert(
            dept.clone(),
            round_off_1_decimal(ratio(mean.mean(), cfg.max_marks) * 100.0),
        );
        dept_student_counts.insert(dept.clone(), student_count);

        let stats = compute_department_stats(dept, &snap, student_count, 0, cfg, today);
        departments.push(DepartmentSummary {
            department: dept.clone(),
            hod: hods
                .iter()
                .find(|h| h.department.as_deref() == Some(dept.as_str()))
                .map(|h| h.full_name.clone())
                .unwrap_or_else(|| "Not Assigned".to_string()),
            students: student_count,
            subjects: dept_subjects.len(),
            dept_average: stats.dept_average,
            pass_percentage: stats.pass_percentage,
            at_risk_count: stats.at_risk_count,
            status_counts: stats.status_counts,
        });
    }

    let all = Snapshot {
        subjects: &subjects,
        students: &students,
        marks: &marks,
    };
    let valid = valid_marks(&all, cfg);
    let status = StatusCounts::from_marks(&marks);
    let faculty_analytics = marking_summary(&valid.marks, status, cfg);

    let subject_names: HashMap<&str, &str> =
        subjects.iter().map(|s| (s.id.as_str(), s.name.as_str())).collect();
    let student_by_id: HashMap<&str, &Student> =
        students.iter().map(|s| (s.id.as_str(), s)).collect();
    let low_performers = valid
        .marks
        .iter()
        .filter(|m| m.score < cfg.pass_mark)
        .filter_map(|m| {
            let s = student_by_id.get(m.student_id)?;
            Some(LowPerformer {
                student_id: s.id.clone(),
                reg_no: s.reg_no.clone(),
                name: s.name.clone(),
                department: s.department.clone(),
                subject: subject_names
                    .get(m.subject_id)
                    .map(|n| n.to_string())
                    .unwrap_or_default(),
                round: m.round_label.to_string(),
                score: round_off_1_decimal(m.score),
            })
        })
        .take(cfg.low_performer_limit)
        .collect();

    Ok(InstitutionStats {
        branches,
        branch_performance,
        dept_student_counts,
        departments,
        faculty_analytics,
        low_performers,
        cie_stats: CieStats {
            conducted: status.total(),
            pending: status.pending,
            graded: status.total() - status.pending,
        },
        total_students: students.len(),
        total_subjects: subjects.len(),
        total_faculty,
    })
}

/// Percent average, pass rate and coverage over a set of valid marks.
pub fn marking_summary(
    marks: &[ValidMark<'_>],
    status: StatusCounts,
    cfg: &EngineConfig,
) -> MarkingSummary {
    let mut acc = Acc::default();
    let mut passed = 0usize;
    for m in marks {
        acc.push(m.score);
        if m.score >= cfg.pass_mark {
            passed += 1;
        }
    }
    MarkingSummary {
        avg_score: round_off_1_decimal(ratio(acc.mean(), cfg.max_marks) * 100.0),
        pass_rate: round_off_1_decimal(ratio(passed as f64 * 100.0, acc.count as f64)),
        evaluated: status.total() - status.pending,
        pending: status.pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(id: &str, name: &str, max: Option<f64>) -> Subject {
        Subject {
            id: id.into(),
            name: name.into(),
            code: format!("C-{id}"),
            department: "CSE".into(),
            semester: None,
            credits: None,
            instructor_name: None,
            max_marks: max,
        }
    }

    fn student(id: &str) -> Student {
        Student {
            id: id.into(),
            reg_no: format!("REG-{id}"),
            name: format!("Name {id}"),
            department: Some("CSE".into()),
            semester: None,
            section: None,
            email: None,
            phone: None,
            parent_phone: None,
        }
    }

    fn mark(student: &str, subject: &str, round: &str, score: Option<f64>, status: MarkStatus) -> MarkRecord {
        MarkRecord {
            id: format!("{student}-{subject}-{round}"),
            student_id: student.into(),
            subject_id: subject.into(),
            round: round.into(),
            score,
            status,
            updated_by: None,
            updated_at: None,
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 15).expect("date")
    }

    #[test]
    fn round_off_is_half_up() {
        assert_eq!(round_off_1_decimal(0.0), 0.0);
        assert_eq!(round_off_1_decimal(3.54), 3.5);
        assert_eq!(round_off_1_decimal(3.55), 3.6);
        assert_eq!(round_off_1_decimal(16.666), 16.7);
    }

    #[test]
    fn valid_marks_skip_unscored_and_pending_zero() {
        let subjects = vec![subject("py", "Python", None)];
        let marks = vec![
            mark("a", "py", "CIE1", None, MarkStatus::Pending),
            mark("a", "py", "CIE2", Some(0.0), MarkStatus::Pending),
            mark("a", "py", "CIE3", Some(0.0), MarkStatus::Approved),
            mark("a", "other", "CIE1", Some(30.0), MarkStatus::Approved),
            mark("b", "py", "Test 2", Some(30.0), MarkStatus::Submitted),
        ];
        let snap = Snapshot {
            subjects: &subjects,
            students: &[],
            marks: &marks,
        };
        let valid = valid_marks(&snap, &EngineConfig::default());
        assert_eq!(valid.marks.len(), 2);
        assert_eq!(valid.heuristic_rounds, 1);
        assert_eq!(valid.marks[1].round, Some(Round::Cie2));
    }

    #[test]
    fn subject_max_override_scales_onto_fifty() {
        let subjects = vec![subject("lab", "Lab", Some(100.0))];
        let marks = vec![mark("a", "lab", "CIE1", Some(88.0), MarkStatus::Approved)];
        let snap = Snapshot {
            subjects: &subjects,
            students: &[],
            marks: &marks,
        };
        let valid = valid_marks(&snap, &EngineConfig::default());
        assert_eq!(valid.marks[0].score, 44.0);
    }

    #[test]
    fn grade_bands_follow_percent_of_max() {
        assert_eq!(grade_band(44.0, 50.0), 0);
        assert_eq!(grade_band(40.0, 50.0), 0);
        assert_eq!(grade_band(30.0, 50.0), 1);
        assert_eq!(grade_band(21.0, 50.0), 2);
        assert_eq!(grade_band(10.0, 50.0), 3);
        assert_eq!(grade_band(9.9, 50.0), 4);
    }

    #[test]
    fn at_risk_labels_by_mean() {
        let students = vec![student("x"), student("y"), student("z")];
        let cfg = EngineConfig::default();
        let marks = [
            ValidMark { student_id: "x", subject_id: "py", round: Some(Round::Cie1), round_label: "CIE1", score: 15.0 },
            ValidMark { student_id: "x", subject_id: "py", round: Some(Round::Cie2), round_label: "CIE2", score: 18.0 },
            ValidMark { student_id: "x", subject_id: "db", round: Some(Round::Cie1), round_label: "CIE1", score: 12.0 },
            ValidMark { student_id: "y", subject_id: "py", round: Some(Round::Cie1), round_label: "CIE1", score: 5.0 },
            ValidMark { student_id: "y", subject_id: "py", round: Some(Round::Cie2), round_label: "CIE2", score: 8.0 },
            ValidMark { student_id: "z", subject_id: "py", round: Some(Round::Cie1), round_label: "CIE1", score: 20.0 },
        ];
        let risk = at_risk(&students, &marks, &cfg);
        assert_eq!(risk.len(), 2);
        assert_eq!(risk[0].id, "y");
        assert_eq!(risk[0].avg_marks, 6.5);
        assert_eq!(risk[0].severity, RiskSeverity::Critical);
        assert_eq!(risk[1].id, "x");
        assert_eq!(risk[1].avg_marks, 15.0);
        assert_eq!(risk[1].severity, RiskSeverity::BelowThreshold);
        assert_eq!(risk[1].issue, "Below Pass Threshold");
    }

    #[test]
    fn subject_overall_ignores_empty_rounds() {
        let subjects = vec![subject("py", "Python", None), subject("db", "DBMS", None)];
        let cfg = EngineConfig::default();
        let marks = [
            ValidMark { student_id: "a", subject_id: "py", round: Some(Round::Cie1), round_label: "CIE1", score: 30.0 },
            ValidMark { student_id: "b", subject_id: "py", round: Some(Round::Cie1), round_label: "CIE1", score: 10.0 },
            ValidMark { student_id: "a", subject_id: "py", round: Some(Round::Cie3), round_label: "CIE3", score: 40.0 },
        ];
        let perf = subject_performance(&subjects, &marks, &cfg);
        assert_eq!(perf[0].averages["CIE1"], 20.0);
        assert_eq!(perf[0].averages["CIE2"], 0.0);
        assert_eq!(perf[0].overall, 30.0);
        assert_eq!(perf[0].pass_rate, 66.7);
        assert_eq!(perf[1].mark_count, 0);
        assert_eq!(perf[1].overall, 0.0);

        let rollup = department_rollup(&perf);
        assert_eq!(rollup.subjects_with_data, 1);
        assert_eq!(rollup.dept_average, 30.0);
        assert_eq!(rollup.pass_percentage, 66.7);
    }

    #[test]
    fn empty_department_yields_zeros_and_all_clear() {
        let cfg = EngineConfig::default();
        let stats = compute_department_stats(
            "CSE",
            &Snapshot {
                subjects: &[],
                students: &[],
                marks: &[],
            },
            0,
            0,
            &cfg,
            day(),
        );
        assert_eq!(stats.dept_average, 0.0);
        assert_eq!(stats.pass_percentage, 0.0);
        assert_eq!(stats.at_risk_count, 0);
        assert!(stats.cie_trend.values().all(|v| *v == 0.0));
        assert_eq!(stats.alerts.len(), 1);
        assert_eq!(stats.alerts[0].kind, AlertKind::Info);
        assert_eq!(stats.alerts[0].date, "2026-01-15");
    }

    #[test]
    fn alerts_cover_risk_low_average_and_pending() {
        let cfg = EngineConfig::default();
        let subjects = vec![subject("py", "Python", None)];
        let students = vec![student("a")];
        let marks = vec![
            mark("a", "py", "CIE1", Some(12.0), MarkStatus::Approved),
            mark("a", "py", "CIE2", None, MarkStatus::Pending),
        ];
        let stats = compute_department_stats(
            "CSE",
            &Snapshot {
                subjects: &subjects,
                students: &students,
                marks: &marks,
            },
            1,
            1,
            &cfg,
            day(),
        );
        let kinds: Vec<AlertKind> = stats.alerts.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AlertKind::Critical, AlertKind::Warning, AlertKind::Info]);
        assert_eq!(stats.alerts[1].message, "Python has low class average (12/50)");
        assert_eq!(stats.alerts[2].id, 3);
        assert_eq!(stats.pending_count, 1);
    }
}
