//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. The credential store behind these
//! traits is a document store with per-record atomicity; the only operation
//! that relies on it is [`RefreshTokenRepository::mark_rotated`], which must
//! be a single conditional update.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::TaskforgeResult;
use crate::models::{
    audit::{AuthAuditEntry, CreateAuthAuditEntry},
    refresh_token::{CreateRefreshToken, RefreshToken},
    user::{CreateUser, UpdateUser, User},
};

pub trait UserRepository: Send + Sync {
    fn create(&self, input: CreateUser) -> impl Future<Output = TaskforgeResult<User>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = TaskforgeResult<User>> + Send;
    fn get_by_email(&self, email: &str) -> impl Future<Output = TaskforgeResult<User>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateUser,
    ) -> impl Future<Output = TaskforgeResult<User>> + Send;
}

pub trait RefreshTokenRepository: Send + Sync {
    fn create(
        &self,
        input: CreateRefreshToken,
    ) -> impl Future<Output = TaskforgeResult<RefreshToken>> + Send;

    fn get_by_hash(
        &self,
        token_hash: &str,
    ) -> impl Future<Output = TaskforgeResult<RefreshToken>> + Send;

    /// Atomically transition a still-active token to rotated, recording the
    /// successor link. Returns `false` when the token was no longer active —
    /// the caller lost a concurrent rotation race and must treat the token
    /// as reused.
    fn mark_rotated(
        &self,
        id: Uuid,
        replaced_by: Uuid,
    ) -> impl Future<Output = TaskforgeResult<bool>> + Send;

    /// Idempotent revocation by token hash. Returns the token if one
    /// existed, whether or not this call changed it.
    fn revoke_by_hash(
        &self,
        token_hash: &str,
    ) -> impl Future<Output = TaskforgeResult<Option<RefreshToken>>> + Send;

    /// Revoke every currently active token for a user. Returns the number
    /// of tokens revoked.
    fn revoke_all_for_user(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = TaskforgeResult<u64>> + Send;

    /// Delete tokens whose expiry lies before `cutoff` (retention sweep).
    /// Returns the number of tokens deleted.
    fn purge_expired_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = TaskforgeResult<u64>> + Send;
}

// ---------------------------------------------------------------------------
// Audit (append-only)
// ---------------------------------------------------------------------------

pub trait AuthAuditRepository: Send + Sync {
    /// Append a new audit entry. No update or delete operations exist
    /// outside the retention purge.
    fn append(
        &self,
        input: CreateAuthAuditEntry,
    ) -> impl Future<Output = TaskforgeResult<AuthAuditEntry>> + Send;

    /// Failed login attempts for an email since `since`, newest first.
    fn recent_failed_logins(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> impl Future<Output = TaskforgeResult<Vec<AuthAuditEntry>>> + Send;

    /// Emails targeted by failed logins from one source IP since `since`
    /// (one element per attempt; the caller deduplicates).
    fn failed_login_emails_by_ip(
        &self,
        ip: &str,
        since: DateTime<Utc>,
    ) -> impl Future<Output = TaskforgeResult<Vec<String>>> + Send;

    fn suspicious_exists_for_email(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> impl Future<Output = TaskforgeResult<bool>> + Send;

    fn suspicious_exists_for_ip(
        &self,
        ip: &str,
        since: DateTime<Utc>,
    ) -> impl Future<Output = TaskforgeResult<bool>> + Send;

    fn suspicious_exists_for_user(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> impl Future<Output = TaskforgeResult<bool>> + Send;

    /// Source IPs of successful logins for a user since `since` (one
    /// element per login; the caller deduplicates).
    fn login_ips_for_user(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> impl Future<Output = TaskforgeResult<Vec<String>>> + Send;

    /// Full history for a user, newest first, capped at `limit`.
    fn for_user(
        &self,
        user_id: Uuid,
        limit: u64,
    ) -> impl Future<Output = TaskforgeResult<Vec<AuthAuditEntry>>> + Send;

    /// Full history for a source IP, newest first, capped at `limit`.
    fn for_ip(
        &self,
        ip: &str,
        limit: u64,
    ) -> impl Future<Output = TaskforgeResult<Vec<AuthAuditEntry>>> + Send;

    /// Delete entries older than `cutoff` (retention sweep). Returns the
    /// number of entries deleted.
    fn purge_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = TaskforgeResult<u64>> + Send;
}
