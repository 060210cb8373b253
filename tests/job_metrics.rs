use std::collections::HashSet;
use std::sync::Arc;

use metrics_util::debugging::DebuggingRecorder;
use murmur::application::clock::ManualClock;
use murmur::application::purge::PurgeService;
use murmur::application::sync::SyncService;
use murmur::cache::{
    CacheConfig, CacheLifecycle, CommentRepository, MemoryHotStore, UserRepository,
};
use murmur::domain::entities::{NewComment, NewUser};
use murmur::infra::memory::MemoryDurableStore;
use time::Duration;

#[tokio::test]
async fn engine_runs_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let clock = Arc::new(ManualClock::at_unix(1_700_000_000));
    let store = Arc::new(MemoryHotStore::new());
    let durable = Arc::new(MemoryDurableStore::new());
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
    );
    let lifecycles: Vec<Arc<dyn CacheLifecycle>> = vec![
        comments.clone() as Arc<dyn CacheLifecycle>,
        users.clone() as Arc<dyn CacheLifecycle>,
    ];
    let purge = PurgeService::new(lifecycles, clock.clone());

    let author = users
        .add_user(NewUser {
            username: "ada".to_string(),
            auth: "secret".to_string(),
        })
        .await
        .expect("user should register");
    let kept = comments
        .post(NewComment {
            comment: "first".to_string(),
            user_id: author,
            username: "ada".to_string(),
        })
        .await
        .expect("comment should post");
    let doomed = comments
        .post(NewComment {
            comment: "second".to_string(),
            user_id: author,
            username: "ada".to_string(),
        })
        .await
        .expect("comment should post");

    clock.advance(Duration::minutes(6));
    sync.run(config.sync_minutes).await.expect("sync should run");
    comments.delete(doomed).await.expect("delete should succeed");
    sync.run(config.sync_minutes).await.expect("sync should run");

    clock.advance(Duration::minutes(11));
    let report = purge
        .run(config.purge_minutes)
        .await
        .expect("purge should run");
    assert_eq!(report.evicted(), 2);

    comments.find(kept).await.expect("purged comment should refill");
    assert!(comments.find(404).await.is_err());

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "murmur_sync_upserted_total",
        "murmur_sync_deleted_total",
        "murmur_sync_failed_total",
        "murmur_sync_run_ms",
        "murmur_purge_evicted_total",
        "murmur_purge_failed_total",
        "murmur_purge_run_ms",
        "murmur_fallback_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
