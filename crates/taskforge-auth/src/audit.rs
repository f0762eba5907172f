//! Append-only audit sink with anomaly heuristics.
//!
//! Recording must never interrupt the caller's primary operation: a
//! persistence failure here is logged at `warn` and swallowed. The
//! authentication decision itself stays fail-closed; only the logging
//! path fails open.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use taskforge_core::error::TaskforgeResult;
use taskforge_core::models::audit::{AuthAuditEntry, AuthEventKind, CreateAuthAuditEntry};
use taskforge_core::repository::AuthAuditRepository;
use tracing::warn;
use uuid::Uuid;

use crate::config::AnomalyThresholds;

/// Audit and anomaly detection service.
#[derive(Clone)]
pub struct AuditService<A: AuthAuditRepository> {
    repo: A,
    thresholds: AnomalyThresholds,
}

impl<A: AuthAuditRepository> AuditService<A> {
    pub fn new(repo: A, thresholds: AnomalyThresholds) -> Self {
        Self { repo, thresholds }
    }

    /// Append one entry with a server-assigned timestamp. `LoginFailed`
    /// entries additionally run the failed-login burst heuristics, which
    /// may synthesize a follow-up `SuspiciousActivity` entry.
    pub async fn record(&self, entry: CreateAuthAuditEntry) {
        let event = entry.event;
        let user_id = entry.user_id;
        let email = entry.email.clone();
        let ip = entry.ip_address.clone();

        if let Err(err) = self.repo.append(entry).await {
            warn!(event = event.as_str(), error = %err, "failed to append audit entry");
            return;
        }

        if event == AuthEventKind::LoginFailed
            && let Err(err) = self
                .detect_failed_login_burst(user_id, email.as_deref(), ip.as_deref())
                .await
        {
            warn!(error = %err, "anomaly detection failed");
        }
    }

    /// Failed-login burst heuristics, evaluated after a `LoginFailed`
    /// append: more than `failed_login_threshold` failures for one email,
    /// or one source IP probing more than `distinct_email_threshold`
    /// distinct emails, inside the trailing window. At most one synthetic
    /// entry is appended per satisfied condition per window — an existing
    /// `SuspiciousActivity` for the same email/IP suppresses duplicates.
    async fn detect_failed_login_burst(
        &self,
        user_id: Option<Uuid>,
        email: Option<&str>,
        ip: Option<&str>,
    ) -> TaskforgeResult<()> {
        let since = Utc::now() - Duration::minutes(self.thresholds.failed_login_window_mins);

        if let Some(email) = email {
            let failures = self.repo.recent_failed_logins(email, since).await?;
            if failures.len() > self.thresholds.failed_login_threshold
                && !self.repo.suspicious_exists_for_email(email, since).await?
            {
                self.repo
                    .append(CreateAuthAuditEntry {
                        user_id,
                        email: Some(email.to_string()),
                        ip_address: ip.map(str::to_string),
                        failure_reason: Some("failed login burst".into()),
                        metadata: Some(json!({
                            "trigger": AuthEventKind::LoginFailed.as_str(),
                            "failed_attempts": failures.len(),
                            "window_mins": self.thresholds.failed_login_window_mins,
                        })),
                        ..CreateAuthAuditEntry::new(AuthEventKind::SuspiciousActivity, false)
                    })
                    .await?;
                return Ok(());
            }
        }

        if let Some(ip) = ip {
            let mut emails = self.repo.failed_login_emails_by_ip(ip, since).await?;
            emails.sort();
            emails.dedup();
            if emails.len() > self.thresholds.distinct_email_threshold
                && !self.repo.suspicious_exists_for_ip(ip, since).await?
            {
                self.repo
                    .append(CreateAuthAuditEntry {
                        ip_address: Some(ip.to_string()),
                        failure_reason: Some("credential probing across accounts".into()),
                        metadata: Some(json!({
                            "trigger": AuthEventKind::LoginFailed.as_str(),
                            "distinct_emails": emails.len(),
                            "window_mins": self.thresholds.failed_login_window_mins,
                        })),
                        ..CreateAuthAuditEntry::new(AuthEventKind::SuspiciousActivity, false)
                    })
                    .await?;
            }
        }

        Ok(())
    }

    /// Whether the user looks compromised: a `SuspiciousActivity` entry
    /// inside the origin window, or successful logins from more than
    /// `distinct_ip_threshold` distinct IPs within it.
    pub async fn has_suspicious_activity(&self, user_id: Uuid) -> TaskforgeResult<bool> {
        let since = Utc::now() - Duration::hours(self.thresholds.origin_window_hours);

        if self.repo.suspicious_exists_for_user(user_id, since).await? {
            return Ok(true);
        }

        let mut ips = self.repo.login_ips_for_user(user_id, since).await?;
        ips.sort();
        ips.dedup();
        Ok(ips.len() > self.thresholds.distinct_ip_threshold)
    }

    /// Failed login attempts for an email inside `window`, newest first.
    pub async fn recent_failed_logins(
        &self,
        email: &str,
        window: Duration,
    ) -> TaskforgeResult<Vec<AuthAuditEntry>> {
        self.repo
            .recent_failed_logins(email, Utc::now() - window)
            .await
    }

    /// History for a user, newest first, capped at `limit`.
    pub async fn user_history(
        &self,
        user_id: Uuid,
        limit: u64,
    ) -> TaskforgeResult<Vec<AuthAuditEntry>> {
        self.repo.for_user(user_id, limit).await
    }

    /// History for a source IP, newest first, capped at `limit`.
    pub async fn by_ip(&self, ip: &str, limit: u64) -> TaskforgeResult<Vec<AuthAuditEntry>> {
        self.repo.for_ip(ip, limit).await
    }

    /// Retention sweep: delete entries older than the configured
    /// retention period. Returns the number of entries deleted.
    pub async fn purge_expired(&self) -> TaskforgeResult<u64> {
        let cutoff = Utc::now() - Duration::days(self.thresholds.audit_retention_days);
        self.repo.purge_older_than(cutoff).await
    }

    /// Delete entries older than an explicit cutoff.
    pub async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> TaskforgeResult<u64> {
        self.repo.purge_older_than(cutoff).await
    }
}
