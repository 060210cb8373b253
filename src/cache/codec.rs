//! Conversion between typed records and the hot store's flat string hashes.

use std::collections::HashMap;

use time::OffsetDateTime;

use crate::domain::entities::{CommentRecord, UserRecord};
use crate::domain::error::DomainError;

pub const FIELD_LIKES: &str = "likes";

/// A record stored as one hot-store hash.
pub trait HashRecord: Sized {
    fn id(&self) -> i64;

    fn timestamp(&self) -> OffsetDateTime;

    fn to_fields(&self) -> Vec<(&'static str, String)>;

    fn from_fields(
        id: i64,
        key: &str,
        fields: &HashMap<String, String>,
    ) -> Result<Self, DomainError>;
}

impl HashRecord for UserRecord {
    fn id(&self) -> i64 {
        self.id
    }

    fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    fn to_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("username", self.username.clone()),
            ("auth", self.auth.clone()),
            ("timestamp", self.timestamp.unix_timestamp().to_string()),
        ]
    }

    fn from_fields(
        id: i64,
        key: &str,
        fields: &HashMap<String, String>,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            id,
            username: text(key, fields, "username")?,
            auth: text(key, fields, "auth")?,
            timestamp: timestamp(key, fields, "timestamp")?,
        })
    }
}

impl HashRecord for CommentRecord {
    fn id(&self) -> i64 {
        self.id
    }

    fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    fn to_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("comment", self.comment.clone()),
            ("user_id", self.user_id.to_string()),
            ("username", self.username.clone()),
            (FIELD_LIKES, self.likes.to_string()),
            ("timestamp", self.timestamp.unix_timestamp().to_string()),
        ]
    }

    fn from_fields(
        id: i64,
        key: &str,
        fields: &HashMap<String, String>,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            id,
            comment: text(key, fields, "comment")?,
            user_id: integer(key, fields, "user_id")?,
            username: text(key, fields, "username")?,
            likes: integer(key, fields, FIELD_LIKES)?,
            timestamp: timestamp(key, fields, "timestamp")?,
        })
    }
}

/// Parse an id stored as a sorted-set, set or list member.
pub fn parse_id(key: &str, raw: &str) -> Result<i64, DomainError> {
    raw.parse::<i64>()
        .map_err(|err| DomainError::malformed(key, "member", err.to_string()))
}

fn text(
    key: &str,
    fields: &HashMap<String, String>,
    field: &'static str,
) -> Result<String, DomainError> {
    fields
        .get(field)
        .cloned()
        .ok_or_else(|| DomainError::malformed(key, field, "is missing"))
}

fn integer(
    key: &str,
    fields: &HashMap<String, String>,
    field: &'static str,
) -> Result<i64, DomainError> {
    let raw = fields
        .get(field)
        .ok_or_else(|| DomainError::malformed(key, field, "is missing"))?;
    raw.parse::<i64>()
        .map_err(|err| DomainError::malformed(key, field, err.to_string()))
}

fn timestamp(
    key: &str,
    fields: &HashMap<String, String>,
    field: &'static str,
) -> Result<OffsetDateTime, DomainError> {
    let seconds = integer(key, fields, field)?;
    OffsetDateTime::from_unix_timestamp(seconds)
        .map_err(|err| DomainError::malformed(key, field, err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn comment_fields_use_stored_names() {
        let record = CommentRecord {
            id: 1001,
            comment: "hello".to_string(),
            user_id: 3,
            username: "ada".to_string(),
            likes: 2,
            timestamp: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        };

        let encoded: HashMap<String, String> = record
            .to_fields()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(encoded["timestamp"], "1700000000");
        assert_eq!(encoded["likes"], "2");

        let decoded = CommentRecord::from_fields(1001, "comment:1001", &encoded).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn missing_field_names_the_key_and_field() {
        let err = UserRecord::from_fields(
            5,
            "user:5",
            &fields(&[("username", "ada"), ("timestamp", "10")]),
        )
        .unwrap_err();

        match err {
            DomainError::MalformedRecord { key, field, .. } => {
                assert_eq!(key, "user:5");
                assert_eq!(field, "auth");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_numeric_counter_is_malformed() {
        let err = CommentRecord::from_fields(
            1,
            "comment:1",
            &fields(&[
                ("comment", "x"),
                ("user_id", "1"),
                ("username", "u"),
                ("likes", "lots"),
                ("timestamp", "10"),
            ]),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DomainError::MalformedRecord { field: "likes", .. }
        ));
    }
}
