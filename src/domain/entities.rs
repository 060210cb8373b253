//! Typed entity records shared by the hot store and the durable store.

use serde::Serialize;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    /// Opaque authentication secret handed to the user at registration.
    pub auth: String,
    #[serde(with = "time::serde::timestamp")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentRecord {
    pub id: i64,
    pub comment: String,
    pub user_id: i64,
    /// Author name, denormalised at post time.
    pub username: String,
    pub likes: i64,
    #[serde(with = "time::serde::timestamp")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub auth: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub comment: String,
    pub user_id: i64,
    pub username: String,
}
