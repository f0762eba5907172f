//! Integration tests for the RefreshToken repository, including the
//! atomic rotation guarantee.

use chrono::{Duration, Utc};
use surrealdb::Surreal;
use surrealdb::engine::local::Mem;
use taskforge_core::models::refresh_token::CreateRefreshToken;
use taskforge_core::repository::RefreshTokenRepository;
use taskforge_db::repository::SurrealRefreshTokenRepository;
use uuid::Uuid;

async fn setup() -> Surreal<surrealdb::engine::local::Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    taskforge_db::run_migrations(&db).await.unwrap();
    db
}

fn token_input(user_id: Uuid, hash: &str) -> CreateRefreshToken {
    CreateRefreshToken {
        id: Uuid::new_v4(),
        user_id,
        token_hash: hash.into(),
        ip_address: Some("127.0.0.1".into()),
        user_agent: Some("TestAgent".into()),
        expires_at: Utc::now() + Duration::days(30),
    }
}

#[tokio::test]
async fn create_and_get_by_hash() {
    let db = setup().await;
    let repo = SurrealRefreshTokenRepository::new(db);
    let user_id = Uuid::new_v4();

    let token = repo.create(token_input(user_id, "hash-1")).await.unwrap();
    assert_eq!(token.user_id, user_id);
    assert_eq!(token.token_hash, "hash-1");
    assert!(token.revoked_at.is_none());
    assert!(token.replaced_by.is_none());

    let fetched = repo.get_by_hash("hash-1").await.unwrap();
    assert_eq!(fetched.id, token.id);
    assert!(fetched.is_active(Utc::now()));

    assert!(repo.get_by_hash("no-such-hash").await.is_err());
}

#[tokio::test]
async fn mark_rotated_wins_only_once() {
    let db = setup().await;
    let repo = SurrealRefreshTokenRepository::new(db);
    let user_id = Uuid::new_v4();

    let token = repo.create(token_input(user_id, "hash-1")).await.unwrap();
    let successor = Uuid::new_v4();

    // First rotation wins.
    assert!(repo.mark_rotated(token.id, successor).await.unwrap());

    // A second attempt observes the token as no longer active.
    assert!(!repo.mark_rotated(token.id, Uuid::new_v4()).await.unwrap());

    // The losing path sees the rotated state, with the successor link.
    let rotated = repo.get_by_hash("hash-1").await.unwrap();
    assert!(rotated.revoked_at.is_some());
    assert_eq!(rotated.replaced_by, Some(successor));
}

#[tokio::test]
async fn revoke_by_hash_is_idempotent() {
    let db = setup().await;
    let repo = SurrealRefreshTokenRepository::new(db);
    let user_id = Uuid::new_v4();

    repo.create(token_input(user_id, "hash-1")).await.unwrap();

    let first = repo.revoke_by_hash("hash-1").await.unwrap();
    assert!(first.is_some());

    // Second call still reports the token, does not error, and the
    // revocation timestamp does not move.
    let second = repo.revoke_by_hash("hash-1").await.unwrap().unwrap();
    let revoked_at = second.revoked_at.expect("revoked");

    let third = repo.revoke_by_hash("hash-1").await.unwrap().unwrap();
    assert_eq!(third.revoked_at, Some(revoked_at));

    // Unknown hashes are a quiet no-op.
    assert!(repo.revoke_by_hash("no-such-hash").await.unwrap().is_none());
}

#[tokio::test]
async fn revoked_token_cannot_be_rotated() {
    let db = setup().await;
    let repo = SurrealRefreshTokenRepository::new(db);
    let user_id = Uuid::new_v4();

    let token = repo.create(token_input(user_id, "hash-1")).await.unwrap();
    repo.revoke_by_hash("hash-1").await.unwrap();

    // Revocation is permanent: no rotation after the fact.
    assert!(!repo.mark_rotated(token.id, Uuid::new_v4()).await.unwrap());
}

#[tokio::test]
async fn revoke_all_for_user_hits_only_active_tokens() {
    let db = setup().await;
    let repo = SurrealRefreshTokenRepository::new(db);
    let user_id = Uuid::new_v4();
    let other_user = Uuid::new_v4();

    repo.create(token_input(user_id, "active-1")).await.unwrap();
    repo.create(token_input(user_id, "active-2")).await.unwrap();
    repo.create(token_input(other_user, "other-active")).await.unwrap();

    // One already revoked, one already expired.
    repo.create(token_input(user_id, "already-revoked")).await.unwrap();
    repo.revoke_by_hash("already-revoked").await.unwrap();
    repo.create(CreateRefreshToken {
        id: Uuid::new_v4(),
        user_id,
        token_hash: "expired".into(),
        ip_address: None,
        user_agent: None,
        expires_at: Utc::now() - Duration::hours(1),
    })
    .await
    .unwrap();

    let revoked = repo.revoke_all_for_user(user_id).await.unwrap();
    assert_eq!(revoked, 2);

    // The other user's token is untouched.
    let other = repo.get_by_hash("other-active").await.unwrap();
    assert!(other.revoked_at.is_none());
}

#[tokio::test]
async fn purge_deletes_only_tokens_past_cutoff() {
    let db = setup().await;
    let repo = SurrealRefreshTokenRepository::new(db);
    let user_id = Uuid::new_v4();

    repo.create(CreateRefreshToken {
        id: Uuid::new_v4(),
        user_id,
        token_hash: "long-expired".into(),
        ip_address: None,
        user_agent: None,
        expires_at: Utc::now() - Duration::days(60),
    })
    .await
    .unwrap();
    repo.create(token_input(user_id, "still-active")).await.unwrap();

    let purged = repo
        .purge_expired_before(Utc::now() - Duration::days(30))
        .await
        .unwrap();
    assert_eq!(purged, 1);

    assert!(repo.get_by_hash("long-expired").await.is_err());
    assert!(repo.get_by_hash("still-active").await.is_ok());
}
