use thiserror::Error;

use crate::application::repos::RepoError;
use crate::domain::error::DomainError;
use crate::domain::types::EntityKind;

use super::store::HotStoreError;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{kind} `{id}` not found")]
    NotFound { kind: EntityKind, id: String },
    #[error("`{key}` is already registered")]
    AlreadyRegistered { key: String },
    #[error("cannot purge {kind} `{id}` before it is synced")]
    CannotPurgeNotSynced { kind: EntityKind, id: i64 },
    #[error("invalid credential")]
    InvalidCredential,
    #[error(transparent)]
    HotStore(#[from] HotStoreError),
    #[error("fallback fetch failed: {0}")]
    Fallback(#[from] RepoError),
    #[error(transparent)]
    Record(#[from] DomainError),
}

impl RepositoryError {
    pub fn not_found(kind: EntityKind, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn already_registered(key: impl Into<String>) -> Self {
        Self::AlreadyRegistered { key: key.into() }
    }
}
