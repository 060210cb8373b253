use std::sync::Arc;

use murmur::application::clock::ManualClock;
use murmur::application::purge::PurgeService;
use murmur::application::sync::SyncService;
use murmur::cache::{
    CacheConfig, CacheLifecycle, CommentRepository, MemoryHotStore, RepositoryError,
    UserRepository,
};
use murmur::domain::entities::{CommentRecord, NewComment, NewUser};
use murmur::infra::memory::MemoryDurableStore;
use time::{Duration, OffsetDateTime};

const T0: i64 = 1_700_000_000;

struct Harness {
    clock: Arc<ManualClock>,
    users: Arc<UserRepository>,
    comments: Arc<CommentRepository>,
    durable: Arc<MemoryDurableStore>,
    sync: SyncService,
    purge: PurgeService,
}

fn harness() -> Harness {
    harness_on(Arc::new(MemoryDurableStore::new()))
}

/// A fresh hot store in front of `durable`, as after a cache restart.
fn harness_on(durable: Arc<MemoryDurableStore>) -> Harness {
    let clock = Arc::new(ManualClock::at_unix(T0));
    let store = Arc::new(MemoryHotStore::new());
    let config = CacheConfig::default();

    let users = Arc::new(
        UserRepository::new(store.clone(), clock.clone(), &config)
            .with_fallback_fetcher(durable.clone()),
    );
    let comments = Arc::new(
        CommentRepository::new(store, clock.clone(), &config)
            .with_fallback_fetcher(durable.clone()),
    );
    let sync = SyncService::new(
        users.clone(),
        comments.clone(),
        durable.clone(),
        durable.clone(),
        clock.clone(),
    )
    .with_concurrency(8);
    let lifecycles: Vec<Arc<dyn CacheLifecycle>> = vec![
        comments.clone() as Arc<dyn CacheLifecycle>,
        users.clone() as Arc<dyn CacheLifecycle>,
    ];
    let purge = PurgeService::new(lifecycles, clock.clone());

    Harness {
        clock,
        users,
        comments,
        durable,
        sync,
        purge,
    }
}

fn new_user(username: &str, auth: &str) -> NewUser {
    NewUser {
        username: username.to_string(),
        auth: auth.to_string(),
    }
}

fn new_comment(text: &str) -> NewComment {
    NewComment {
        comment: text.to_string(),
        user_id: 1,
        username: "ada".to_string(),
    }
}

#[tokio::test]
async fn grace_window_splits_old_and_recent_writes() {
    let h = harness();
    let a = h.comments.post(new_comment("six minutes old")).await.unwrap();
    h.clock.advance(Duration::minutes(4));
    let b = h.comments.post(new_comment("two minutes old")).await.unwrap();
    h.clock.advance(Duration::minutes(2));

    let report = h.sync.run(5).await.unwrap();

    assert_eq!(report.comments.upserted, 1);
    assert!(h.comments.is_synced(a).await.unwrap());
    assert!(!h.comments.is_synced(b).await.unwrap());
}

#[tokio::test]
async fn staleness_window_evicts_only_old_synced_records() {
    let h = harness();
    let a = h
        .users
        .add_user(NewUser {
            username: "ada".to_string(),
            auth: "a".to_string(),
        })
        .await
        .unwrap();
    let b = h
        .users
        .add_user(NewUser {
            username: "bob".to_string(),
            auth: "b".to_string(),
        })
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(6));
    h.sync.run(5).await.unwrap();

    h.clock.advance(Duration::minutes(3));
    h.users.find(b).await.unwrap();
    h.clock.advance(Duration::minutes(2));

    // a was last touched 11 minutes ago, b 2 minutes ago.
    let report = h.purge.run(10).await.unwrap();
    assert_eq!(report.users.evicted, 1);
    assert_eq!(h.durable.fetch_count(), 0);

    h.users.find(b).await.unwrap();
    assert_eq!(h.durable.fetch_count(), 0);
    h.users.find(a).await.unwrap();
    assert_eq!(h.durable.fetch_count(), 1);
}

#[tokio::test]
async fn purged_comment_is_refilled_with_its_likes() {
    let h = harness();
    let id = h.comments.post(new_comment("liked")).await.unwrap();
    h.comments.like(id, 2).await.unwrap();
    h.comments.like(id, 3).await.unwrap();
    h.clock.advance(Duration::minutes(6));
    h.sync.run(5).await.unwrap();
    let before = h.comments.find(id).await.unwrap();

    h.clock.advance(Duration::minutes(11));
    assert_eq!(h.purge.run(10).await.unwrap().comments.evicted, 1);

    let after = h.comments.find(id).await.unwrap();
    assert_eq!(after, before);
    assert_eq!(h.comments.liked_by(id).await.unwrap(), vec![2, 3]);
    h.comments.find(id).await.unwrap();
    assert_eq!(h.durable.fetch_count(), 1);

    assert!(!h.comments.like(id, 2).await.unwrap());
    assert_eq!(h.comments.find(id).await.unwrap().likes, 2);
}

#[tokio::test]
async fn like_after_sync_is_pushed_on_the_next_run() {
    let h = harness();
    let id = h.comments.post(new_comment("late like")).await.unwrap();
    h.clock.advance(Duration::minutes(6));
    h.sync.run(5).await.unwrap();
    assert!(h.durable.likes(id).is_empty());

    h.comments.like(id, 9).await.unwrap();
    assert!(!h.comments.is_synced(id).await.unwrap());
    assert_eq!(h.sync.run(5).await.unwrap().comments.upserted, 0);

    h.clock.advance(Duration::minutes(6));
    assert_eq!(h.sync.run(5).await.unwrap().comments.upserted, 1);
    assert_eq!(h.durable.likes(id), vec![9]);
    assert_eq!(h.durable.comment(id).unwrap().likes, 1);
}

#[tokio::test]
async fn one_failing_id_does_not_block_the_batch() {
    let h = harness();
    let mut ids = Vec::new();
    for n in 0..4 {
        ids.push(h.comments.post(new_comment(&format!("c{n}"))).await.unwrap());
    }
    h.clock.advance(Duration::minutes(6));
    h.durable.fail_writes_for(ids[2]);

    let report = h.sync.run(5).await.unwrap();
    assert_eq!(report.comments.upserted, 3);
    assert_eq!(report.comments.failed, 1);
    for (n, id) in ids.iter().enumerate() {
        assert_eq!(h.comments.is_synced(*id).await.unwrap(), n != 2);
    }

    // Unsynced records survive purging until the retry succeeds.
    h.clock.advance(Duration::minutes(11));
    let purged = h.purge.run(10).await.unwrap();
    assert_eq!(purged.comments.evicted, 3);
    assert_eq!(purged.comments.skipped_unsynced, 1);
    assert_eq!(h.comments.find(ids[2]).await.unwrap().comment, "c2");

    h.durable.clear_failures();
    assert_eq!(h.sync.run(5).await.unwrap().comments.upserted, 1);
}

#[tokio::test]
async fn tombstone_survives_a_failed_durable_delete() {
    let h = harness();
    let id = h.comments.post(new_comment("doomed")).await.unwrap();
    h.clock.advance(Duration::minutes(6));
    h.sync.run(5).await.unwrap();

    h.comments.delete(id).await.unwrap();
    h.durable.fail_writes_for(id);
    let report = h.sync.run(5).await.unwrap();
    assert_eq!(report.comments.delete_failed, 1);
    assert_eq!(h.comments.fetch_deleted_ids().await.unwrap(), vec![id]);
    assert!(h.durable.comment(id).is_some());

    h.durable.clear_failures();
    let report = h.sync.run(5).await.unwrap();
    assert_eq!(report.comments.deleted, 1);
    assert!(h.comments.fetch_deleted_ids().await.unwrap().is_empty());
    assert!(h.durable.comment(id).is_none());
}

#[tokio::test]
async fn durable_only_records_can_be_deleted() {
    let h = harness();
    h.durable.insert_comment(
        CommentRecord {
            id: 77,
            comment: "archived".to_string(),
            user_id: 1,
            username: "ada".to_string(),
            likes: 0,
            timestamp: OffsetDateTime::from_unix_timestamp(T0 - 86_400).unwrap(),
        },
        &[],
    );

    h.comments.delete(77).await.unwrap();
    assert_eq!(h.comments.fetch_deleted_ids().await.unwrap(), vec![77]);
    h.sync.run(5).await.unwrap();
    assert!(h.durable.comment(77).is_none());
}

#[tokio::test]
async fn resync_keeps_the_original_creation_time() {
    let h = harness();
    let id = h
        .users
        .add_user(NewUser {
            username: "ada".to_string(),
            auth: "a".to_string(),
        })
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(6));
    h.sync.run(5).await.unwrap();
    let first = h.durable.user(id).unwrap();
    assert_eq!(first.timestamp.unix_timestamp(), T0);
    assert_eq!(h.durable.user_updated_at(id).unwrap().unix_timestamp(), T0);

    assert_eq!(h.sync.run(5).await.unwrap().users.upserted, 0);
    assert_eq!(h.durable.upsert_count(), 1);
}

#[tokio::test]
async fn deleted_user_stays_deleted_and_frees_the_username() {
    let h = harness();
    let id = h.users.add_user(new_user("ada", "a")).await.unwrap();
    h.clock.advance(Duration::minutes(6));
    h.sync.run(5).await.unwrap();

    h.users.delete(id).await.unwrap();
    assert!(matches!(
        h.users.find(id).await,
        Err(RepositoryError::NotFound { .. })
    ));
    assert!(!h.users.is_registered("ada").await.unwrap());
    assert!(matches!(
        h.users.user_id_by_secret("a").await,
        Err(RepositoryError::InvalidCredential)
    ));
    assert_eq!(h.durable.fetch_count(), 0);

    assert_eq!(h.sync.run(5).await.unwrap().users.deleted, 1);
    assert!(h.durable.user(id).is_none());
    assert!(h.users.find(id).await.is_err());

    h.clock.advance(Duration::minutes(11));
    h.purge.run(10).await.unwrap();
    assert!(!h.users.is_registered("ada").await.unwrap());

    let again = h.users.add_user(new_user("ada", "a2")).await.unwrap();
    assert_ne!(again, id);
    assert_eq!(h.users.user_id("ada").await.unwrap(), again);
}

#[tokio::test]
async fn deleted_comment_cannot_be_read_or_liked() {
    let h = harness();
    let id = h.comments.post(new_comment("gone soon")).await.unwrap();
    h.clock.advance(Duration::minutes(6));
    h.sync.run(5).await.unwrap();

    h.comments.delete(id).await.unwrap();
    assert!(matches!(
        h.comments.find(id).await,
        Err(RepositoryError::NotFound { .. })
    ));
    assert!(matches!(
        h.comments.like(id, 2).await,
        Err(RepositoryError::NotFound { .. })
    ));
    assert!(h.durable.comment(id).is_some());

    h.sync.run(5).await.unwrap();
    assert!(h.durable.comment(id).is_none());
    assert!(h.comments.find(id).await.is_err());
}

#[tokio::test]
async fn restarted_cache_continues_from_the_durable_store() {
    let durable = Arc::new(MemoryDurableStore::new());
    let first = harness_on(durable.clone());
    let ada = first.users.add_user(new_user("ada", "a")).await.unwrap();
    let hello = first.comments.post(new_comment("hello")).await.unwrap();
    first.clock.advance(Duration::minutes(6));
    first.sync.run(5).await.unwrap();

    let second = harness_on(durable.clone());
    let bob = second.users.add_user(new_user("bob", "b")).await.unwrap();
    assert!(bob > ada);
    assert!(matches!(
        second.users.add_user(new_user("ada", "other")).await,
        Err(RepositoryError::AlreadyRegistered { .. })
    ));
    assert!(matches!(
        second.users.add_user(new_user("eve", "a")).await,
        Err(RepositoryError::AlreadyRegistered { .. })
    ));
    assert_eq!(second.users.user_id_by_secret("a").await.unwrap(), ada);
    let reply = second.comments.post(new_comment("again")).await.unwrap();
    assert!(reply > hello);

    second.clock.advance(Duration::minutes(6));
    second.sync.run(5).await.unwrap();
    assert_eq!(durable.user(ada).unwrap().username, "ada");
    assert_eq!(durable.user(bob).unwrap().username, "bob");
    assert_eq!(durable.comment(hello).unwrap().comment, "hello");
    assert_eq!(durable.comment(reply).unwrap().comment, "again");
}
