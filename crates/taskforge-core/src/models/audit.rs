//! Authentication audit log domain model.
//!
//! The audit log is the system's forensic ledger: append-only, never
//! mutated, pruned only by time-based retention.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The closed set of auditable authentication events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuthEventKind {
    Login,
    LoginFailed,
    Logout,
    TokenRefresh,
    TokenReuseDetected,
    MfaEnabled,
    MfaDisabled,
    MfaVerified,
    MfaFailed,
    BackupCodesRegenerated,
    PasswordChanged,
    SuspiciousActivity,
}

impl AuthEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthEventKind::Login => "Login",
            AuthEventKind::LoginFailed => "LoginFailed",
            AuthEventKind::Logout => "Logout",
            AuthEventKind::TokenRefresh => "TokenRefresh",
            AuthEventKind::TokenReuseDetected => "TokenReuseDetected",
            AuthEventKind::MfaEnabled => "MfaEnabled",
            AuthEventKind::MfaDisabled => "MfaDisabled",
            AuthEventKind::MfaVerified => "MfaVerified",
            AuthEventKind::MfaFailed => "MfaFailed",
            AuthEventKind::BackupCodesRegenerated => "BackupCodesRegenerated",
            AuthEventKind::PasswordChanged => "PasswordChanged",
            AuthEventKind::SuspiciousActivity => "SuspiciousActivity",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthAuditEntry {
    pub id: Uuid,
    pub event: AuthEventKind,
    pub success: bool,
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub failure_reason: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: serde_json::Value,
    /// Coarse location, if the caller resolved one (e.g. "Berlin, DE").
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAuthAuditEntry {
    pub event: AuthEventKind,
    pub success: bool,
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub failure_reason: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub location: Option<String>,
}

impl CreateAuthAuditEntry {
    /// An entry with the given event and outcome and every optional field
    /// unset; call sites fill in what they know via struct update syntax.
    pub fn new(event: AuthEventKind, success: bool) -> Self {
        Self {
            event,
            success,
            user_id: None,
            email: None,
            failure_reason: None,
            ip_address: None,
            user_agent: None,
            metadata: None,
            location: None,
        }
    }
}
