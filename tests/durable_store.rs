use murmur::application::repos::{
    CommentFetcher, CommentsWriteRepo, DurableAdminRepo, UserFetcher, UsersWriteRepo,
};
use murmur::domain::entities::{CommentRecord, UserRecord};
use murmur::infra::db::PostgresRepositories;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};

fn created_at() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("valid timestamp")
}

fn user(id: i64, username: &str) -> UserRecord {
    UserRecord {
        id,
        username: username.to_string(),
        auth: format!("secret-{id}"),
        timestamp: created_at(),
    }
}

fn comment(id: i64, text: &str, likes: i64) -> CommentRecord {
    CommentRecord {
        id,
        comment: text.to_string(),
        user_id: 1,
        username: "ada".to_string(),
        likes,
        timestamp: created_at(),
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn user_upsert_keeps_creation_time(pool: PgPool) {
    let repos = PostgresRepositories::new(pool.clone());
    let later = created_at() + Duration::hours(2);

    repos
        .upsert_user(&user(1, "ada"), created_at())
        .await
        .expect("insert should succeed");
    let renamed = UserRecord {
        username: "ada2".to_string(),
        timestamp: later,
        ..user(1, "ada")
    };
    repos
        .upsert_user(&renamed, later)
        .await
        .expect("update should succeed");

    let stored = repos
        .fetch_user(1)
        .await
        .expect("fetch should succeed")
        .expect("user should exist");
    assert_eq!(stored.username, "ada2");
    assert_eq!(stored.timestamp, created_at());

    let updated_at: OffsetDateTime =
        sqlx::query_scalar("SELECT updated_at FROM users WHERE id = 1")
            .fetch_one(&pool)
            .await
            .expect("row should exist");
    assert_eq!(updated_at, later);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn repeated_likes_are_stored_once(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);

    repos
        .upsert_comment(&comment(5, "hello", 2), &[2, 3], created_at())
        .await
        .expect("first upsert should succeed");
    repos
        .upsert_comment(&comment(5, "hello", 3), &[2, 3, 4], created_at())
        .await
        .expect("second upsert should succeed");

    assert_eq!(
        repos.liked_by(5).await.expect("likes should load"),
        vec![2, 3, 4]
    );
    let stored = repos
        .fetch_comment(5)
        .await
        .expect("fetch should succeed")
        .expect("comment should exist");
    assert_eq!(stored.likes, 3);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn deleting_a_comment_drops_its_likes(pool: PgPool) {
    let repos = PostgresRepositories::new(pool.clone());

    repos
        .upsert_comment(&comment(9, "bye", 1), &[7], created_at())
        .await
        .expect("upsert should succeed");
    repos.delete_comment(9).await.expect("delete should succeed");
    repos.delete_comment(9).await.expect("delete is idempotent");

    assert!(repos.fetch_comment(9).await.expect("fetch").is_none());
    let likes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comment_like")
        .fetch_one(&pool)
        .await
        .expect("count should load");
    assert_eq!(likes, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn missing_rows_are_none(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    assert!(repos.fetch_user(42).await.expect("fetch").is_none());
    assert!(repos.fetch_comment(42).await.expect("fetch").is_none());
    assert!(repos.liked_by(42).await.expect("likes").is_empty());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn truncate_clears_every_table(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);

    repos
        .upsert_user(&user(1, "ada"), created_at())
        .await
        .expect("insert user");
    repos
        .upsert_comment(&comment(2, "hi", 1), &[1], created_at())
        .await
        .expect("insert comment");
    repos.truncate_all().await.expect("truncate should succeed");

    assert!(repos.fetch_user(1).await.expect("fetch").is_none());
    assert!(repos.fetch_comment(2).await.expect("fetch").is_none());
    repos.delete_user(1).await.expect("deleting a missing user is fine");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn lookups_find_the_newest_owner_and_highest_ids(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    assert_eq!(repos.max_user_id().await.expect("max"), None);
    assert_eq!(repos.max_comment_id().await.expect("max"), None);

    for (id, name) in [(3, "ada"), (8, "ada"), (5, "grace")] {
        repos
            .upsert_user(&user(id, name), created_at())
            .await
            .expect("insert user");
    }
    repos
        .upsert_comment(&comment(40, "hi", 0), &[], created_at())
        .await
        .expect("insert comment");

    let ada = repos
        .fetch_user_by_username("ada")
        .await
        .expect("lookup")
        .expect("ada should exist");
    assert_eq!(ada.id, 8);
    let grace = repos
        .fetch_user_by_secret("secret-5")
        .await
        .expect("lookup")
        .expect("secret should match");
    assert_eq!(grace.username, "grace");
    assert!(
        repos
            .fetch_user_by_username("linus")
            .await
            .expect("lookup")
            .is_none()
    );
    assert_eq!(repos.max_user_id().await.expect("max"), Some(8));
    assert_eq!(repos.max_comment_id().await.expect("max"), Some(40));
}
