//! Integration tests for the AuthAudit repository.

use chrono::{Duration, Utc};
use serde_json::json;
use surrealdb::Surreal;
use surrealdb::engine::local::Mem;
use taskforge_core::models::audit::{AuthEventKind, CreateAuthAuditEntry};
use taskforge_core::repository::AuthAuditRepository;
use taskforge_db::repository::SurrealAuthAuditRepository;
use uuid::Uuid;

async fn setup() -> Surreal<surrealdb::engine::local::Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    taskforge_db::run_migrations(&db).await.unwrap();
    db
}

fn failed_login(email: &str, ip: &str) -> CreateAuthAuditEntry {
    CreateAuthAuditEntry {
        email: Some(email.into()),
        failure_reason: Some("wrong password".into()),
        ip_address: Some(ip.into()),
        user_agent: Some("TestAgent".into()),
        ..CreateAuthAuditEntry::new(AuthEventKind::LoginFailed, false)
    }
}

#[tokio::test]
async fn append_and_read_back() {
    let db = setup().await;
    let repo = SurrealAuthAuditRepository::new(db);
    let user_id = Uuid::new_v4();

    let entry = repo
        .append(CreateAuthAuditEntry {
            user_id: Some(user_id),
            email: Some("alice@example.com".into()),
            ip_address: Some("127.0.0.1".into()),
            user_agent: Some("TestAgent".into()),
            metadata: Some(json!({ "method": "totp" })),
            location: Some("Berlin, DE".into()),
            ..CreateAuthAuditEntry::new(AuthEventKind::MfaVerified, true)
        })
        .await
        .unwrap();

    assert_eq!(entry.event, AuthEventKind::MfaVerified);
    assert!(entry.success);
    assert_eq!(entry.user_id, Some(user_id));
    assert_eq!(entry.metadata["method"], "totp");
    assert_eq!(entry.location.as_deref(), Some("Berlin, DE"));

    let history = repo.for_user(user_id, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, entry.id);
}

#[tokio::test]
async fn recent_failed_logins_filters_and_orders() {
    let db = setup().await;
    let repo = SurrealAuthAuditRepository::new(db);

    for _ in 0..3 {
        repo.append(failed_login("a@x.com", "1.2.3.4")).await.unwrap();
    }
    // Different email and a success must not show up.
    repo.append(failed_login("b@x.com", "1.2.3.4")).await.unwrap();
    repo.append(CreateAuthAuditEntry {
        email: Some("a@x.com".into()),
        ..CreateAuthAuditEntry::new(AuthEventKind::Login, true)
    })
    .await
    .unwrap();

    let since = Utc::now() - Duration::minutes(15);
    let failures = repo.recent_failed_logins("a@x.com", since).await.unwrap();
    assert_eq!(failures.len(), 3);
    for pair in failures.windows(2) {
        assert!(pair[0].created_at >= pair[1].created_at, "newest first");
    }

    // Outside the window nothing matches.
    let failures = repo
        .recent_failed_logins("a@x.com", Utc::now() + Duration::minutes(1))
        .await
        .unwrap();
    assert!(failures.is_empty());
}

#[tokio::test]
async fn failed_login_emails_by_ip_lists_targets() {
    let db = setup().await;
    let repo = SurrealAuthAuditRepository::new(db);

    repo.append(failed_login("a@x.com", "9.9.9.9")).await.unwrap();
    repo.append(failed_login("b@x.com", "9.9.9.9")).await.unwrap();
    repo.append(failed_login("a@x.com", "9.9.9.9")).await.unwrap();
    repo.append(failed_login("c@x.com", "8.8.8.8")).await.unwrap();

    let since = Utc::now() - Duration::minutes(15);
    let mut emails = repo.failed_login_emails_by_ip("9.9.9.9", since).await.unwrap();
    emails.sort();
    assert_eq!(emails, vec!["a@x.com", "a@x.com", "b@x.com"]);
}

#[tokio::test]
async fn suspicious_existence_queries() {
    let db = setup().await;
    let repo = SurrealAuthAuditRepository::new(db);
    let user_id = Uuid::new_v4();
    let since = Utc::now() - Duration::hours(24);

    assert!(!repo.suspicious_exists_for_email("a@x.com", since).await.unwrap());
    assert!(!repo.suspicious_exists_for_ip("9.9.9.9", since).await.unwrap());
    assert!(!repo.suspicious_exists_for_user(user_id, since).await.unwrap());

    repo.append(CreateAuthAuditEntry {
        user_id: Some(user_id),
        email: Some("a@x.com".into()),
        ip_address: Some("9.9.9.9".into()),
        failure_reason: Some("failed login burst".into()),
        ..CreateAuthAuditEntry::new(AuthEventKind::SuspiciousActivity, false)
    })
    .await
    .unwrap();

    assert!(repo.suspicious_exists_for_email("a@x.com", since).await.unwrap());
    assert!(repo.suspicious_exists_for_ip("9.9.9.9", since).await.unwrap());
    assert!(repo.suspicious_exists_for_user(user_id, since).await.unwrap());

    // Other identities remain clean.
    assert!(!repo.suspicious_exists_for_email("b@x.com", since).await.unwrap());
}

#[tokio::test]
async fn login_ips_only_counts_successful_logins() {
    let db = setup().await;
    let repo = SurrealAuthAuditRepository::new(db);
    let user_id = Uuid::new_v4();
    let since = Utc::now() - Duration::hours(24);

    for ip in ["10.0.0.1", "10.0.0.2", "10.0.0.1"] {
        repo.append(CreateAuthAuditEntry {
            user_id: Some(user_id),
            email: Some("a@x.com".into()),
            ip_address: Some(ip.into()),
            ..CreateAuthAuditEntry::new(AuthEventKind::Login, true)
        })
        .await
        .unwrap();
    }
    // Failures do not contribute to breadth-of-origin.
    repo.append(CreateAuthAuditEntry {
        user_id: Some(user_id),
        email: Some("a@x.com".into()),
        ip_address: Some("10.0.0.3".into()),
        ..CreateAuthAuditEntry::new(AuthEventKind::LoginFailed, false)
    })
    .await
    .unwrap();

    let mut ips = repo.login_ips_for_user(user_id, since).await.unwrap();
    ips.sort();
    assert_eq!(ips, vec!["10.0.0.1", "10.0.0.1", "10.0.0.2"]);
}

#[tokio::test]
async fn for_ip_and_limit() {
    let db = setup().await;
    let repo = SurrealAuthAuditRepository::new(db);

    for _ in 0..5 {
        repo.append(failed_login("a@x.com", "9.9.9.9")).await.unwrap();
    }

    let entries = repo.for_ip("9.9.9.9", 3).await.unwrap();
    assert_eq!(entries.len(), 3);
}

#[tokio::test]
async fn purge_respects_cutoff() {
    let db = setup().await;
    let repo = SurrealAuthAuditRepository::new(db);

    repo.append(failed_login("a@x.com", "1.2.3.4")).await.unwrap();

    // Nothing is older than a cutoff in the past.
    let purged = repo
        .purge_older_than(Utc::now() - Duration::days(365))
        .await
        .unwrap();
    assert_eq!(purged, 0);

    // A future cutoff sweeps everything.
    let purged = repo
        .purge_older_than(Utc::now() + Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(purged, 1);

    let since = Utc::now() - Duration::minutes(15);
    assert!(repo.recent_failed_logins("a@x.com", since).await.unwrap().is_empty());
}
