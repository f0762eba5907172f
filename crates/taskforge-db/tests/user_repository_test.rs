//! Integration tests for the User repository using in-memory SurrealDB.

use surrealdb::Surreal;
use surrealdb::engine::local::Mem;
use taskforge_core::models::user::{CreateUser, UpdateUser};
use taskforge_core::repository::UserRepository;
use taskforge_db::repository::{SurrealUserRepository, verify_password};

/// Helper: spin up in-memory DB and run migrations.
async fn setup() -> Surreal<surrealdb::engine::local::Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    taskforge_db::run_migrations(&db).await.unwrap();
    db
}

#[tokio::test]
async fn create_and_get_user() {
    let db = setup().await;
    let repo = SurrealUserRepository::new(db);

    let user = repo
        .create(CreateUser {
            name: "Alice Johnson".into(),
            email: "alice@example.com".into(),
            password: "SuperSecret123!".into(),
        })
        .await
        .unwrap();

    assert_eq!(user.name, "Alice Johnson");
    assert_eq!(user.email, "alice@example.com");
    assert!(!user.mfa_enabled);
    assert!(!user.mfa_confirmed);
    assert!(user.mfa_secret.is_none());
    assert!(user.backup_code_hashes.is_empty());

    // Password should be hashed, not stored in plaintext.
    assert_ne!(user.password_hash, "SuperSecret123!");
    assert!(user.password_hash.starts_with("$argon2id$"));

    // Get by ID should return the same user.
    let fetched = repo.get_by_id(user.id).await.unwrap();
    assert_eq!(fetched.id, user.id);
    assert_eq!(fetched.name, "Alice Johnson");

    // Get by email too.
    let fetched = repo.get_by_email("alice@example.com").await.unwrap();
    assert_eq!(fetched.id, user.id);
}

#[tokio::test]
async fn email_is_unique() {
    let db = setup().await;
    let repo = SurrealUserRepository::new(db);

    repo.create(CreateUser {
        name: "Alice".into(),
        email: "alice@example.com".into(),
        password: "SuperSecret123!".into(),
    })
    .await
    .unwrap();

    let duplicate = repo
        .create(CreateUser {
            name: "Another Alice".into(),
            email: "alice@example.com".into(),
            password: "OtherSecret456!".into(),
        })
        .await;
    assert!(duplicate.is_err());
}

#[tokio::test]
async fn password_verification() {
    let db = setup().await;
    let repo = SurrealUserRepository::new(db);

    let user = repo
        .create(CreateUser {
            name: "Bob".into(),
            email: "bob@example.com".into(),
            password: "MyPassword42!".into(),
        })
        .await
        .unwrap();

    // Correct password should verify.
    assert!(verify_password("MyPassword42!", &user.password_hash, None).unwrap());

    // Wrong password should not verify.
    assert!(!verify_password("WrongPassword", &user.password_hash, None).unwrap());
}

#[tokio::test]
async fn password_with_pepper() {
    let db = setup().await;
    let pepper = "server-secret-pepper".to_string();
    let repo = SurrealUserRepository::with_pepper(db, pepper.clone());

    let user = repo
        .create(CreateUser {
            name: "Carol".into(),
            email: "carol@example.com".into(),
            password: "PepperedPass!".into(),
        })
        .await
        .unwrap();

    assert!(verify_password("PepperedPass!", &user.password_hash, Some(&pepper)).unwrap());
    assert!(!verify_password("PepperedPass!", &user.password_hash, None).unwrap());
}

#[tokio::test]
async fn update_mfa_fields() {
    let db = setup().await;
    let repo = SurrealUserRepository::new(db);

    let user = repo
        .create(CreateUser {
            name: "Dave".into(),
            email: "dave@example.com".into(),
            password: "SuperSecret123!".into(),
        })
        .await
        .unwrap();

    // Store a pending secret.
    let updated = repo
        .update(
            user.id,
            UpdateUser {
                mfa_secret: Some(Some("encrypted-blob".into())),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.mfa_secret.as_deref(), Some("encrypted-blob"));
    assert!(!updated.mfa_enabled);

    // Enable with backup codes.
    let updated = repo
        .update(
            user.id,
            UpdateUser {
                mfa_enabled: Some(true),
                mfa_confirmed: Some(true),
                backup_code_hashes: Some(vec!["hash-a".into(), "hash-b".into()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(updated.mfa_enabled);
    assert!(updated.mfa_confirmed);
    assert_eq!(updated.backup_code_hashes.len(), 2);

    // Clear the secret (Some(None) = clear).
    let updated = repo
        .update(
            user.id,
            UpdateUser {
                mfa_enabled: Some(false),
                mfa_confirmed: Some(false),
                mfa_secret: Some(None),
                backup_code_hashes: Some(Vec::new()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(updated.mfa_secret.is_none());
    assert!(updated.backup_code_hashes.is_empty());
}

#[tokio::test]
async fn password_hash_update_bumps_changed_timestamp() {
    let db = setup().await;
    let repo = SurrealUserRepository::new(db);

    let user = repo
        .create(CreateUser {
            name: "Erin".into(),
            email: "erin@example.com".into(),
            password: "SuperSecret123!".into(),
        })
        .await
        .unwrap();
    let before = user.password_changed_at;

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let updated = repo
        .update(
            user.id,
            UpdateUser {
                password_hash: Some("$argon2id$new-hash".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.password_hash, "$argon2id$new-hash");
    assert!(updated.password_changed_at > before);
}

#[tokio::test]
async fn get_missing_user_is_not_found() {
    let db = setup().await;
    let repo = SurrealUserRepository::new(db);

    assert!(repo.get_by_id(uuid::Uuid::new_v4()).await.is_err());
    assert!(repo.get_by_email("ghost@example.com").await.is_err());
}
