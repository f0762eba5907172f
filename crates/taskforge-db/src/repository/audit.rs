//! SurrealDB implementation of [`AuthAuditRepository`].
//!
//! Entries are append-only; the only destructive operation is the
//! time-based retention purge. Distinct-counting for the anomaly
//! queries fetches the matching column and deduplicates in Rust.

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use taskforge_core::error::TaskforgeResult;
use taskforge_core::models::audit::{AuthAuditEntry, AuthEventKind, CreateAuthAuditEntry};
use taskforge_core::repository::AuthAuditRepository;
use uuid::Uuid;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct AuditRow {
    event: String,
    success: bool,
    user_id: Option<String>,
    email: Option<String>,
    failure_reason: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    metadata: serde_json::Value,
    location: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct AuditRowWithId {
    record_id: String,
    event: String,
    success: bool,
    user_id: Option<String>,
    email: Option<String>,
    failure_reason: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    metadata: serde_json::Value,
    location: Option<String>,
    created_at: DateTime<Utc>,
}

fn parse_event(s: &str) -> Result<AuthEventKind, DbError> {
    match s {
        "Login" => Ok(AuthEventKind::Login),
        "LoginFailed" => Ok(AuthEventKind::LoginFailed),
        "Logout" => Ok(AuthEventKind::Logout),
        "TokenRefresh" => Ok(AuthEventKind::TokenRefresh),
        "TokenReuseDetected" => Ok(AuthEventKind::TokenReuseDetected),
        "MfaEnabled" => Ok(AuthEventKind::MfaEnabled),
        "MfaDisabled" => Ok(AuthEventKind::MfaDisabled),
        "MfaVerified" => Ok(AuthEventKind::MfaVerified),
        "MfaFailed" => Ok(AuthEventKind::MfaFailed),
        "BackupCodesRegenerated" => Ok(AuthEventKind::BackupCodesRegenerated),
        "PasswordChanged" => Ok(AuthEventKind::PasswordChanged),
        "SuspiciousActivity" => Ok(AuthEventKind::SuspiciousActivity),
        other => Err(DbError::Migration(format!("unknown audit event: {other}"))),
    }
}

fn parse_user_id(raw: Option<String>) -> Result<Option<Uuid>, DbError> {
    raw.map(|s| {
        Uuid::parse_str(&s).map_err(|e| DbError::Migration(format!("invalid user UUID: {e}")))
    })
    .transpose()
}

impl AuditRow {
    fn into_entry(self, id: Uuid) -> Result<AuthAuditEntry, DbError> {
        Ok(AuthAuditEntry {
            id,
            event: parse_event(&self.event)?,
            success: self.success,
            user_id: parse_user_id(self.user_id)?,
            email: self.email,
            failure_reason: self.failure_reason,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            metadata: self.metadata,
            location: self.location,
            created_at: self.created_at,
        })
    }
}

impl AuditRowWithId {
    fn try_into_entry(self) -> Result<AuthAuditEntry, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::Migration(format!("invalid UUID: {e}")))?;
        Ok(AuthAuditEntry {
            id,
            event: parse_event(&self.event)?,
            success: self.success,
            user_id: parse_user_id(self.user_id)?,
            email: self.email,
            failure_reason: self.failure_reason,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            metadata: self.metadata,
            location: self.location,
            created_at: self.created_at,
        })
    }
}

/// Row struct for count queries.
#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

/// Row struct for single-column email projections.
#[derive(Debug, SurrealValue)]
struct EmailRow {
    email: Option<String>,
}

/// Row struct for single-column IP projections.
#[derive(Debug, SurrealValue)]
struct IpRow {
    ip_address: Option<String>,
}

/// SurrealDB implementation of the AuthAudit repository.
#[derive(Clone)]
pub struct SurrealAuthAuditRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAuthAuditRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn exists(&self, query: &str, key: (&'static str, String), since: DateTime<Utc>) -> TaskforgeResult<bool> {
        let mut result = self
            .db
            .query(query)
            .bind(key)
            .bind(("since", since))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0) > 0)
    }
}

impl<C: Connection> AuthAuditRepository for SurrealAuthAuditRepository<C> {
    async fn append(&self, input: CreateAuthAuditEntry) -> TaskforgeResult<AuthAuditEntry> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let metadata = input
            .metadata
            .unwrap_or(serde_json::Value::Object(Default::default()));

        let result = self
            .db
            .query(
                "CREATE type::record('auth_audit', $id) SET \
                 event = $event, \
                 success = $success, \
                 user_id = $user_id, \
                 email = $email, \
                 failure_reason = $failure_reason, \
                 ip_address = $ip_address, \
                 user_agent = $user_agent, \
                 metadata = $metadata, \
                 location = $location",
            )
            .bind(("id", id_str.clone()))
            .bind(("event", input.event.as_str().to_string()))
            .bind(("success", input.success))
            .bind(("user_id", input.user_id.map(|u| u.to_string())))
            .bind(("email", input.email))
            .bind(("failure_reason", input.failure_reason))
            .bind(("ip_address", input.ip_address))
            .bind(("user_agent", input.user_agent))
            .bind(("metadata", metadata))
            .bind(("location", input.location))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<AuditRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "auth_audit".into(),
            id: id_str,
        })?;

        Ok(row.into_entry(id)?)
    }

    async fn recent_failed_logins(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> TaskforgeResult<Vec<AuthAuditEntry>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM auth_audit \
                 WHERE email = $email AND event = 'LoginFailed' \
                 AND created_at > $since \
                 ORDER BY created_at DESC",
            )
            .bind(("email", email.to_string()))
            .bind(("since", since))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AuditRowWithId> = result.take(0).map_err(DbError::from)?;
        let entries = rows
            .into_iter()
            .map(|row| row.try_into_entry())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(entries)
    }

    async fn failed_login_emails_by_ip(
        &self,
        ip: &str,
        since: DateTime<Utc>,
    ) -> TaskforgeResult<Vec<String>> {
        let mut result = self
            .db
            .query(
                "SELECT email FROM auth_audit \
                 WHERE ip_address = $ip AND event = 'LoginFailed' \
                 AND created_at > $since",
            )
            .bind(("ip", ip.to_string()))
            .bind(("since", since))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<EmailRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.into_iter().filter_map(|r| r.email).collect())
    }

    async fn suspicious_exists_for_email(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> TaskforgeResult<bool> {
        self.exists(
            "SELECT count() AS total FROM auth_audit \
             WHERE email = $email AND event = 'SuspiciousActivity' \
             AND created_at > $since GROUP ALL",
            ("email", email.to_string()),
            since,
        )
        .await
    }

    async fn suspicious_exists_for_ip(
        &self,
        ip: &str,
        since: DateTime<Utc>,
    ) -> TaskforgeResult<bool> {
        self.exists(
            "SELECT count() AS total FROM auth_audit \
             WHERE ip_address = $ip AND event = 'SuspiciousActivity' \
             AND created_at > $since GROUP ALL",
            ("ip", ip.to_string()),
            since,
        )
        .await
    }

    async fn suspicious_exists_for_user(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> TaskforgeResult<bool> {
        self.exists(
            "SELECT count() AS total FROM auth_audit \
             WHERE user_id = $user_id AND event = 'SuspiciousActivity' \
             AND created_at > $since GROUP ALL",
            ("user_id", user_id.to_string()),
            since,
        )
        .await
    }

    async fn login_ips_for_user(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> TaskforgeResult<Vec<String>> {
        let mut result = self
            .db
            .query(
                "SELECT ip_address FROM auth_audit \
                 WHERE user_id = $user_id AND event = 'Login' \
                 AND success = true AND created_at > $since",
            )
            .bind(("user_id", user_id.to_string()))
            .bind(("since", since))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<IpRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.into_iter().filter_map(|r| r.ip_address).collect())
    }

    async fn for_user(&self, user_id: Uuid, limit: u64) -> TaskforgeResult<Vec<AuthAuditEntry>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM auth_audit \
                 WHERE user_id = $user_id \
                 ORDER BY created_at DESC LIMIT $limit",
            )
            .bind(("user_id", user_id.to_string()))
            .bind(("limit", limit))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AuditRowWithId> = result.take(0).map_err(DbError::from)?;
        let entries = rows
            .into_iter()
            .map(|row| row.try_into_entry())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(entries)
    }

    async fn for_ip(&self, ip: &str, limit: u64) -> TaskforgeResult<Vec<AuthAuditEntry>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM auth_audit \
                 WHERE ip_address = $ip \
                 ORDER BY created_at DESC LIMIT $limit",
            )
            .bind(("ip", ip.to_string()))
            .bind(("limit", limit))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AuditRowWithId> = result.take(0).map_err(DbError::from)?;
        let entries = rows
            .into_iter()
            .map(|row| row.try_into_entry())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(entries)
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> TaskforgeResult<u64> {
        // Count matching entries first, then delete.
        let mut count_result = self
            .db
            .query(
                "SELECT count() AS total FROM auth_audit \
                 WHERE created_at < $cutoff GROUP ALL",
            )
            .bind(("cutoff", cutoff))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        self.db
            .query("DELETE auth_audit WHERE created_at < $cutoff")
            .bind(("cutoff", cutoff))
            .await
            .map_err(DbError::from)?;

        Ok(total)
    }
}
