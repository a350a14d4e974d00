use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid deployment target: {field} {reason}")]
    InvalidTarget { field: &'static str, reason: String },
}

impl CoreError {
    pub fn invalid_target(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidTarget {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
