use std::error::Error as StdError;

use thiserror::Error;

use crate::{
    application::{purge::PurgeError, seed::SeedError, sync::SyncError},
    cache::RepositoryError,
    domain::error::DomainError,
    infra::error::InfraError,
};

/// Flattened view of an error and its `source()` chain, outermost first.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }

    pub fn render(&self) -> String {
        self.messages.join(": ")
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("sync failed: {0}")]
    Sync(#[from] SyncError),
    #[error("purge failed: {0}")]
    Purge(#[from] PurgeError),
    #[error("seeding failed: {0}")]
    Seed(#[from] SeedError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Validation(_) | AppError::Domain(DomainError::Validation { .. }) => 2,
            AppError::Infra(InfraError::Configuration { .. }) => 78,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::EntityKind;

    #[test]
    fn report_walks_the_source_chain() {
        let err = AppError::from(SyncError::Listing(RepositoryError::not_found(
            EntityKind::User,
            7,
        )));
        let report = ErrorReport::from_error("test", &err);
        assert_eq!(report.messages.len(), 3);
        assert_eq!(report.messages[2], "user `7` not found");
        assert!(report.messages[0].starts_with("sync failed"));
        assert!(report.render().contains("user"));
    }

    #[test]
    fn exit_codes_follow_the_error_class() {
        assert_eq!(AppError::validation("bad").exit_code(), 2);
        assert_eq!(
            AppError::from(InfraError::configuration("missing url")).exit_code(),
            78
        );
        assert_eq!(AppError::unexpected("boom").exit_code(), 1);
    }
}
