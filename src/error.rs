/// Errors raised by the mark lifecycle, scope resolver and directory operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Validation(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

impl CoreError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity,
            key: key.into(),
        }
    }

    /// Stable code reported on the IPC channel.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::NotFound { .. } => "not_found",
            CoreError::InvalidState(_) => "invalid_state",
            CoreError::Validation(_) => "bad_params",
            CoreError::Db(_) => "db_query_failed",
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_error_kind() {
        assert_eq!(CoreError::not_found("student", "S1").code(), "not_found");
        assert_eq!(
            CoreError::InvalidState("Request is already APPROVED".into()).code(),
            "invalid_state"
        );
        assert_eq!(CoreError::Validation("bad".into()).code(), "bad_params");
        assert_eq!(
            CoreError::not_found("subject", "x").to_string(),
            "subject not found: x"
        );
    }
}
