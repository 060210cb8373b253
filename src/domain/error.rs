use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("domain validation failed: {message}")]
    Validation { message: String },
    #[error("record `{key}` is malformed: field `{field}` {reason}")]
    MalformedRecord {
        key: String,
        field: &'static str,
        reason: String,
    },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn malformed(key: impl Into<String>, field: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            key: key.into(),
            field,
            reason: reason.into(),
        }
    }
}
