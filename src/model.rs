use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One of the fixed continuous-internal-evaluation checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Round {
    #[serde(rename = "CIE1")]
    Cie1,
    #[serde(rename = "CIE2")]
    Cie2,
    #[serde(rename = "CIE3")]
    Cie3,
    #[serde(rename = "CIE4")]
    Cie4,
    #[serde(rename = "CIE5")]
    Cie5,
}

/// How a stored round label was mapped onto a [`Round`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundMatch {
    Exact(Round),
    Heuristic(Round),
}

impl Round {
    pub const ALL: [Round; 5] = [Round::Cie1, Round::Cie2, Round::Cie3, Round::Cie4, Round::Cie5];

    pub fn number(self) -> u8 {
        match self {
            Round::Cie1 => 1,
            Round::Cie2 => 2,
            Round::Cie3 => 3,
            Round::Cie4 => 4,
            Round::Cie5 => 5,
        }
    }

    pub fn from_number(n: u8) -> Option<Round> {
        Round::ALL.get(usize::from(n).checked_sub(1)?).copied()
    }

    /// Canonical stored label, e.g. `CIE1`.
    pub fn label(self) -> &'static str {
        match self {
            Round::Cie1 => "CIE1",
            Round::Cie2 => "CIE2",
            Round::Cie3 => "CIE3",
            Round::Cie4 => "CIE4",
            Round::Cie5 => "CIE5",
        }
    }

    /// Parses a caller-supplied round identifier.
    ///
    /// Accepts `CIE1`, `cie 1`, `CIE-1`, `round 1`, `Round_1` and a bare `1`.
    pub fn parse(raw: &str) -> CoreResult<Round> {
        let upper = raw.trim().to_ascii_uppercase();
        let rest = upper
            .strip_prefix("CIE")
            .or_else(|| upper.strip_prefix("ROUND"))
            .unwrap_or(&upper);
        let digits = rest.trim_start_matches(&[' ', '-', '_'][..]);
        Some(digits)
            .filter(|d| !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|d| d.parse::<u8>().ok())
            .and_then(Round::from_number)
            .ok_or_else(|| CoreError::Validation(format!("invalid round: {raw:?}")))
    }

    /// Maps a stored label written by any upstream onto a round.
    ///
    /// An exact canonical label wins; otherwise the first of `1`..`5` contained in
    /// the label is used.
    pub fn classify(label: &str) -> Option<RoundMatch> {
        let upper = label.trim().to_ascii_uppercase();
        if let Some(r) = Round::ALL.iter().find(|r| r.label() == upper) {
            return Some(RoundMatch::Exact(*r));
        }
        Round::ALL
            .iter()
            .find(|r| upper.contains(char::from(b'0' + r.number())))
            .map(|r| RoundMatch::Heuristic(*r))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarkStatus {
    Pending,
    Submitted,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkEvent {
    Edit,
    Submit,
    Approve,
    Reject,
    Unlock,
}

impl MarkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MarkStatus::Pending => "PENDING",
            MarkStatus::Submitted => "SUBMITTED",
            MarkStatus::Approved => "APPROVED",
            MarkStatus::Rejected => "REJECTED",
        }
    }

    /// Unknown or missing stored statuses read as PENDING.
    pub fn from_db(raw: Option<&str>) -> MarkStatus {
        match raw.map(|s| s.trim().to_ascii_uppercase()).as_deref() {
            Some("SUBMITTED") => MarkStatus::Submitted,
            Some("APPROVED") => MarkStatus::Approved,
            Some("REJECTED") => MarkStatus::Rejected,
            _ => MarkStatus::Pending,
        }
    }

    /// Next status for `event`, or `None` when the event leaves this record untouched.
    pub fn apply(self, event: MarkEvent, has_score: bool) -> Option<MarkStatus> {
        use MarkStatus::*;
        match (event, self) {
            (MarkEvent::Edit, _) => Some(Pending),
            (MarkEvent::Submit, Pending) if has_score => Some(Submitted),
            (MarkEvent::Approve, Submitted) => Some(Approved),
            (MarkEvent::Reject, Submitted) => Some(Rejected),
            (MarkEvent::Unlock, Submitted | Approved | Rejected) => Some(Pending),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRecord {
    pub id: String,
    pub student_id: String,
    pub subject_id: String,
    /// Stored round label; canonical for rows this daemon writes.
    pub round: String,
    pub score: Option<f64>,
    pub status: MarkStatus,
    pub updated_by: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub reg_no: String,
    pub name: String,
    pub department: Option<String>,
    pub semester: Option<i64>,
    pub section: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub parent_phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub code: String,
    pub department: String,
    pub semester: Option<i64>,
    pub credits: Option<i64>,
    pub instructor_name: Option<String>,
    pub max_marks: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaffRole {
    Faculty,
    Hod,
    Principal,
}

impl StaffRole {
    pub fn as_str(self) -> &'static str {
        match self {
            StaffRole::Faculty => "faculty",
            StaffRole::Hod => "hod",
            StaffRole::Principal => "principal",
        }
    }

    pub fn parse(raw: &str) -> CoreResult<StaffRole> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "faculty" => Ok(StaffRole::Faculty),
            "hod" => Ok(StaffRole::Hod),
            "principal" => Ok(StaffRole::Principal),
            _ => Err(CoreError::Validation(format!("invalid role: {raw:?}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffMember {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub role: StaffRole,
    pub department: Option<String>,
    pub subjects: BTreeSet<String>,
    pub sections: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Approved => "APPROVED",
            RequestStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(raw: &str) -> CoreResult<RequestStatus> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(RequestStatus::Pending),
            "APPROVED" => Ok(RequestStatus::Approved),
            "REJECTED" => Ok(RequestStatus::Rejected),
            _ => Err(CoreError::Validation(format!("invalid request status: {raw:?}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRequest {
    pub id: String,
    pub faculty_id: String,
    pub target_department: String,
    pub subjects: BTreeSet<String>,
    pub sections: BTreeSet<String>,
    pub semester: Option<String>,
    pub status: RequestStatus,
    pub created_at: String,
}

/// Caller identity sent with each mutating request. Trusted as given.
#[derive(Debug, Clone, Deserialize)]
pub struct Actor {
    pub username: String,
    #[serde(default)]
    pub role: String,
}
