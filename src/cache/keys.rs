//! Hot store key layout.
//!
//! Every entity kind owns a record hash per id plus four id-keyed indices;
//! comments add the feed list and per-comment like sets, users add the
//! username and secret lookup hashes.

use crate::domain::types::EntityKind;

/// Key names for one entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keyspace {
    kind: EntityKind,
    record_prefix: &'static str,
    update_index: &'static str,
    access_index: &'static str,
    sync_marker: &'static str,
    tombstones: &'static str,
    sequence: &'static str,
}

pub const USERS: Keyspace = Keyspace {
    kind: EntityKind::User,
    record_prefix: "user",
    update_index: "users_update",
    access_index: "users_hit",
    sync_marker: "users_sync",
    tombstones: "users_deleted",
    sequence: "next_user_id",
};

pub const COMMENTS: Keyspace = Keyspace {
    kind: EntityKind::Comment,
    record_prefix: "comment",
    update_index: "comments_update",
    access_index: "comments_hit",
    sync_marker: "comments_sync",
    tombstones: "comments_deleted",
    sequence: "next_comment_id",
};

/// Append-ordered comment ids.
pub const COMMENT_FEED: &str = "comments";
/// Username to user id.
pub const USERNAMES: &str = "users";
/// Authentication secret to user id.
pub const SECRETS: &str = "auths";

impl Keyspace {
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn record(&self, id: i64) -> String {
        format!("{}:{id}", self.record_prefix)
    }

    pub fn update_index(&self) -> &'static str {
        self.update_index
    }

    pub fn access_index(&self) -> &'static str {
        self.access_index
    }

    pub fn sync_marker(&self) -> &'static str {
        self.sync_marker
    }

    pub fn tombstones(&self) -> &'static str {
        self.tombstones
    }

    pub fn sequence(&self) -> &'static str {
        self.sequence
    }
}

pub fn comment_likes(id: i64) -> String {
    format!("comment_like:{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_keys_are_prefixed_by_kind() {
        assert_eq!(USERS.record(7), "user:7");
        assert_eq!(COMMENTS.record(1001), "comment:1001");
        assert_eq!(comment_likes(1001), "comment_like:1001");
    }

    #[test]
    fn keyspaces_do_not_share_index_keys() {
        let users = [
            USERS.update_index(),
            USERS.access_index(),
            USERS.sync_marker(),
            USERS.tombstones(),
            USERS.sequence(),
        ];
        for key in [
            COMMENTS.update_index(),
            COMMENTS.access_index(),
            COMMENTS.sync_marker(),
            COMMENTS.tombstones(),
            COMMENTS.sequence(),
        ] {
            assert!(!users.contains(&key), "{key} is shared");
        }
    }
}
