use crate::db;
use crate::error::{CoreError, CoreResult};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

const SETTINGS_KEY: &str = "engine";

/// Thresholds and policies used by the lifecycle and analytics engines.
///
/// Stored as JSON in the workspace `settings` table. Missing fields take their defaults,
/// so older workspaces keep working when new knobs are added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Scale every analytics threshold is expressed on.
    pub max_marks: f64,
    pub pass_mark: f64,
    /// Mean below this labels an at-risk student critical.
    pub critical_mark: f64,
    /// Subject overall below this (and above zero) raises a warning alert.
    pub low_average_mark: f64,
    pub low_performer_limit: usize,
    pub faculty_low_performer_limit: usize,
    pub top_performer_mark: f64,
    /// Reject edits to APPROVED marks instead of reopening them.
    pub lock_approved_edits: bool,
    pub reconcile_on_open: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_marks: 50.0,
            pass_mark: 20.0,
            critical_mark: 10.0,
            low_average_mark: 25.0,
            low_performer_limit: 10,
            faculty_low_performer_limit: 5,
            top_performer_mark: 40.0,
            lock_approved_edits: false,
            reconcile_on_open: true,
        }
    }
}

impl EngineConfig {
    pub fn load(conn: &Connection) -> anyhow::Result<Self> {
        match db::settings_get_json(conn, SETTINGS_KEY)? {
            Some(v) => Ok(serde_json::from_value(v)?),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, conn: &Connection) -> anyhow::Result<()> {
        db::settings_set_json(conn, SETTINGS_KEY, &serde_json::to_value(self)?)
    }

    /// Returns a copy with the keys present in `patch` overridden.
    pub fn merged(&self, patch: &serde_json::Value) -> CoreResult<Self> {
        let Some(fields) = patch.as_object() else {
            return Err(CoreError::Validation("settings patch must be an object".into()));
        };
        let mut current = serde_json::to_value(self)
            .map_err(|e| CoreError::Validation(e.to_string()))?;
        if let Some(obj) = current.as_object_mut() {
            for (k, v) in fields {
                if !obj.contains_key(k) {
                    return Err(CoreError::Validation(format!("unknown setting: {k}")));
                }
                obj.insert(k.clone(), v.clone());
            }
        }
        let next: EngineConfig =
            serde_json::from_value(current).map_err(|e| CoreError::Validation(e.to_string()))?;
        next.validate()?;
        Ok(next)
    }

    fn validate(&self) -> CoreResult<()> {
        if !(self.max_marks.is_finite() && self.max_marks > 0.0) {
            return Err(CoreError::Validation("maxMarks must be positive".into()));
        }
        for (name, v) in [
            ("passMark", self.pass_mark),
            ("criticalMark", self.critical_mark),
            ("lowAverageMark", self.low_average_mark),
            ("topPerformerMark", self.top_performer_mark),
        ] {
            if !(v.is_finite() && (0.0..=self.max_marks).contains(&v)) {
                return Err(CoreError::Validation(format!(
                    "{name} must be between 0 and maxMarks"
                )));
            }
        }
        Ok(())
    }
}
