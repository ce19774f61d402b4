use crate::calc::round_off_1_decimal;
use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};
use crate::model::{Actor, MarkEvent, MarkRecord, MarkStatus, Round, Student};
use crate::store;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{info, warn};
use uuid::Uuid;

const ZERO_EPSILON: f64 = 0.001;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOutcome {
    pub affected: usize,
    pub reopened: bool,
    pub mark: Option<MarkRecord>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    pub student_id: String,
    pub subject_id: String,
    pub round: String,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    pub index: usize,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub updated: usize,
    pub rejected: usize,
    pub errors: Vec<RowError>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionOutcome {
    pub subject_id: String,
    pub round: Round,
    pub affected: usize,
    /// Placeholder rows added by an unlock.
    pub created: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    pub cleared: usize,
    pub deleted: usize,
}

fn validate_score(value: f64, max: f64) -> CoreResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(CoreError::Validation(format!(
            "score must be a non-negative number, got {value}"
        )));
    }
    if value > max {
        return Err(CoreError::Validation(format!(
            "score {value} exceeds maximum {max}"
        )));
    }
    Ok(())
}

/// Upserts one score. Any edit leaves the record PENDING.
pub fn write_score(
    conn: &Connection,
    cfg: &EngineConfig,
    actor: &Actor,
    student_id: &str,
    subject_id: &str,
    round: Round,
    value: Option<f64>,
) -> CoreResult<WriteOutcome> {
    let existing = store::find_mark(conn, student_id, subject_id, round.label())?;
    if existing.is_none() && value.is_none() {
        return Ok(WriteOutcome {
            affected: 0,
            reopened: false,
            mark: None,
        });
    }

    let subject = store::find_subject(conn, subject_id)?
        .ok_or_else(|| CoreError::not_found("subject", subject_id))?;
    if let Some(v) = value {
        validate_score(v, subject.max_marks.unwrap_or(cfg.max_marks))?;
    }

    match existing {
        Some(mark) => {
            if mark.status == MarkStatus::Approved && cfg.lock_approved_edits {
                return Err(CoreError::InvalidState(format!(
                    "{} mark for {} is approved; unlock the round before editing",
                    round.label(),
                    subject.name
                )));
            }
            let next = mark
                .status
                .apply(MarkEvent::Edit, value.is_some())
                .unwrap_or(MarkStatus::Pending);
            let reopened = matches!(mark.status, MarkStatus::Submitted | MarkStatus::Approved);
            if reopened {
                warn!(
                    student_id,
                    subject = %subject.name,
                    round = round.label(),
                    previous = mark.status.as_str(),
                    actor = %actor.username,
                    "score edit reopened a locked mark"
                );
            }
            store::update_mark(conn, &mark.id, value, next, Some(&actor.username))?;
            Ok(WriteOutcome {
                affected: 1,
                reopened,
                mark: store::find_mark(conn, student_id, subject_id, round.label())?,
            })
        }
        None => {
            if store::find_student(conn, student_id)?.is_none() {
                return Err(CoreError::not_found("student", student_id));
            }
            let mark = MarkRecord {
                id: Uuid::new_v4().to_string(),
                student_id: student_id.to_string(),
                subject_id: subject_id.to_string(),
                round: round.label().to_string(),
                score: value,
                status: MarkStatus::Pending,
                updated_by: Some(actor.username.clone()),
                updated_at: Some(store::now_stamp()),
            };
            store::insert_mark(conn, &mark)?;
            Ok(WriteOutcome {
                affected: 1,
                reopened: false,
                mark: Some(mark),
            })
        }
    }
}

/// Applies every entry in one transaction. Row-level failures are reported, store
/// failures roll the whole batch back.
pub fn write_scores_batch(
    conn: &Connection,
    cfg: &EngineConfig,
    actor: &Actor,
    entries: &[ScoreEntry],
) -> CoreResult<BatchOutcome> {
    let tx = conn.unchecked_transaction()?;
    let mut updated = 0usize;
    let mut errors: Vec<RowError> = Vec::new();

    for (index, e) in entries.iter().enumerate() {
        let result = Round::parse(&e.round).and_then(|round| {
            write_score(&tx, cfg, actor, &e.student_id, &e.subject_id, round, e.score)
        });
        match result {
            Ok(out) => updated += out.affected,
            Err(CoreError::Db(db)) => return Err(CoreError::Db(db)),
            Err(err) => errors.push(RowError {
                index,
                code: err.code(),
                message: err.to_string(),
            }),
        }
    }

    tx.commit()?;
    info!(
        updated,
        rejected = errors.len(),
        actor = %actor.username,
        "score batch written"
    );
    Ok(BatchOutcome {
        updated,
        rejected: errors.len(),
        errors,
    })
}

fn transition_round(
    conn: &Connection,
    actor: &Actor,
    subject_id: &str,
    round: Round,
    event: MarkEvent,
) -> CoreResult<usize> {
    let marks = store::marks_for_subject(conn, subject_id, Some(round.label()))?;
    let tx = conn.unchecked_transaction()?;
    let mut affected = 0usize;
    for m in &marks {
        if let Some(next) = m.status.apply(event, m.score.is_some()) {
            store::set_mark_status(&tx, &m.id, next, Some(&actor.username))?;
            affected += 1;
        }
    }
    tx.commit()?;
    Ok(affected)
}

fn round_outcome(subject_id: &str, round: Round, affected: usize) -> TransitionOutcome {
    TransitionOutcome {
        subject_id: subject_id.to_string(),
        round,
        affected,
        created: 0,
    }
}

/// PENDING records with a score become SUBMITTED. Unscored rows stay PENDING.
pub fn submit_round(
    conn: &Connection,
    actor: &Actor,
    subject_id: &str,
    round: Round,
) -> CoreResult<TransitionOutcome> {
    let affected = transition_round(conn, actor, subject_id, round, MarkEvent::Submit)?;
    info!(
        subject_id,
        round = round.label(),
        affected,
        actor = %actor.username,
        role = %actor.role,
        "round submitted"
    );
    Ok(round_outcome(subject_id, round, affected))
}

pub fn approve_round(
    conn: &Connection,
    actor: &Actor,
    subject_id: &str,
    round: Round,
) -> CoreResult<TransitionOutcome> {
    let affected = transition_round(conn, actor, subject_id, round, MarkEvent::Approve)?;
    info!(
        subject_id,
        round = round.label(),
        affected,
        actor = %actor.username,
        role = %actor.role,
        "round approved"
    );
    Ok(round_outcome(subject_id, round, affected))
}

pub fn reject_round(
    conn: &Connection,
    actor: &Actor,
    subject_id: &str,
    round: Round,
) -> CoreResult<TransitionOutcome> {
    let affected = transition_round(conn, actor, subject_id, round, MarkEvent::Reject)?;
    info!(
        subject_id,
        round = round.label(),
        affected,
        actor = %actor.username,
        role = %actor.role,
        "round rejected"
    );
    Ok(round_outcome(subject_id, round, affected))
}

/// Reopens every record of the round and adds an empty PENDING row for each student
/// graded in another round of the subject but missing from this one.
pub fn unlock_round(
    conn: &Connection,
    actor: &Actor,
    subject_id: &str,
    round: Round,
) -> CoreResult<TransitionOutcome> {
    let all = store::marks_for_subject(conn, subject_id, None)?;
    let in_round: BTreeSet<&str> = all
        .iter()
        .filter(|m| m.round == round.label())
        .map(|m| m.student_id.as_str())
        .collect();
    let missing: BTreeSet<&str> = all
        .iter()
        .map(|m| m.student_id.as_str())
        .filter(|sid| !in_round.contains(sid))
        .collect();

    let tx = conn.unchecked_transaction()?;
    let mut affected = 0usize;
    for m in all.iter().filter(|m| m.round == round.label()) {
        if let Some(next) = m.status.apply(MarkEvent::Unlock, m.score.is_some()) {
            store::set_mark_status(&tx, &m.id, next, Some(&actor.username))?;
            affected += 1;
        }
    }
    let stamp = store::now_stamp();
    for sid in &missing {
        store::insert_mark(
            &tx,
            &MarkRecord {
                id: Uuid::new_v4().to_string(),
                student_id: sid.to_string(),
                subject_id: subject_id.to_string(),
                round: round.label().to_string(),
                score: None,
                status: MarkStatus::Pending,
                updated_by: Some(actor.username.clone()),
                updated_at: Some(stamp.clone()),
            },
        )?;
    }
    tx.commit()?;

    info!(
        subject_id,
        round = round.label(),
        affected,
        created = missing.len(),
        actor = %actor.username,
        "round unlocked"
    );
    Ok(TransitionOutcome {
        subject_id: subject_id.to_string(),
        round,
        affected: affected + missing.len(),
        created: missing.len(),
    })
}

/// Treats near-zero scores as never entered: open records are cleared, records that
/// already went through review are deleted.
pub fn reconcile_zero_scores(conn: &Connection) -> CoreResult<ReconcileOutcome> {
    let marks = store::all_marks(conn)?;
    let tx = conn.unchecked_transaction()?;
    let mut out = ReconcileOutcome::default();
    for m in &marks {
        let Some(score) = m.score else { continue };
        if score.abs() >= ZERO_EPSILON {
            continue;
        }
        match m.status {
            MarkStatus::Pending | MarkStatus::Rejected => {
                store::update_mark(&tx, &m.id, None, MarkStatus::Pending, m.updated_by.as_deref())?;
                out.cleared += 1;
            }
            MarkStatus::Submitted | MarkStatus::Approved => {
                store::delete_mark(&tx, &m.id)?;
                out.deleted += 1;
            }
        }
    }
    tx.commit()?;
    if out.cleared + out.deleted > 0 {
        warn!(
            cleared = out.cleared,
            deleted = out.deleted,
            "zero-score reconciliation changed marks"
        );
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkView {
    #[serde(flatten)]
    pub mark: MarkRecord,
    pub reg_no: Option<String>,
    pub student_name: Option<String>,
}

pub fn marks_by_subject(
    conn: &Connection,
    subject_id: &str,
    round: Option<Round>,
) -> CoreResult<Vec<MarkView>> {
    if store::find_subject(conn, subject_id)?.is_none() {
        return Err(CoreError::not_found("subject", subject_id));
    }
    let students: HashMap<String, Student> = store::list_students(conn, None)?
        .into_iter()
        .map(|s| (s.id.clone(), s))
        .collect();
    let marks = store::marks_for_subject(conn, subject_id, round.map(Round::label))?;
    Ok(marks
        .into_iter()
        .map(|mark| {
            let s = students.get(&mark.student_id);
            MarkView {
                reg_no: s.map(|s| s.reg_no.clone()),
                student_name: s.map(|s| s.name.clone()),
                mark,
            }
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingApproval {
    pub subject_id: String,
    pub subject_name: String,
    pub subject_code: String,
    pub round: String,
    pub count: usize,
}

/// SUBMITTED marks awaiting an HOD decision, grouped by subject and round.
pub fn pending_approvals(conn: &Connection, department: &str) -> CoreResult<Vec<PendingApproval>> {
    let subjects = store::list_subjects(conn, Some(department))?;
    let ids: Vec<String> = subjects.iter().map(|s| s.id.clone()).collect();
    let mut groups: BTreeMap<(String, String), usize> = BTreeMap::new();
    for m in store::marks_for_subjects(conn, &ids)? {
        if m.status == MarkStatus::Submitted {
            *groups.entry((m.subject_id, m.round)).or_default() += 1;
        }
    }
    let by_id: HashMap<&str, _> = subjects.iter().map(|s| (s.id.as_str(), s)).collect();
    Ok(groups
        .into_iter()
        .filter_map(|((subject_id, round), count)| {
            let s = by_id.get(subject_id.as_str())?;
            Some(PendingApproval {
                subject_name: s.name.clone(),
                subject_code: s.code.clone(),
                subject_id,
                round,
                count,
            })
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSubject {
    pub subject_id: String,
    pub name: String,
    pub code: String,
    pub marks: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDashboard {
    pub student: Student,
    pub subjects: Vec<DashboardSubject>,
    pub approved_count: usize,
    pub average: f64,
}

/// The student-facing view: APPROVED marks only.
pub fn student_dashboard(conn: &Connection, reg_no: &str) -> CoreResult<StudentDashboard> {
    let student = store::find_student_by_reg_no(conn, reg_no)?
        .ok_or_else(|| CoreError::not_found("student", reg_no))?;

    let mut per_subject: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
    let mut sum = 0.0;
    let mut count = 0usize;
    for m in store::marks_for_student(conn, &student.id)? {
        if m.status != MarkStatus::Approved {
            continue;
        }
        let Some(score) = m.score else { continue };
        per_subject
            .entry(m.subject_id)
            .or_default()
            .insert(m.round, score);
        sum += score;
        count += 1;
    }

    let mut subjects = Vec::with_capacity(per_subject.len());
    for (subject_id, marks) in per_subject {
        let Some(s) = store::find_subject(conn, &subject_id)? else {
            continue;
        };
        subjects.push(DashboardSubject {
            subject_id,
            name: s.name,
            code: s.code,
            marks,
        });
    }
    subjects.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(StudentDashboard {
        student,
        subjects,
        approved_count: count,
        average: if count > 0 {
            round_off_1_decimal(sum / count as f64)
        } else {
            0.0
        },
    })
}
