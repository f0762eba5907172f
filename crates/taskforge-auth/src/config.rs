//! Authentication configuration.
//!
//! Every component takes its configuration as an explicit value — nothing
//! here is read from ambient global state, so tests can vary policy freely.

use crate::policy::PasswordPolicy;

/// Configuration for the authentication core.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// PEM-encoded Ed25519 private key for JWT signing.
    pub jwt_private_key_pem: String,
    /// PEM-encoded Ed25519 public key for JWT verification.
    pub jwt_public_key_pem: String,
    /// JWT issuer (`iss` claim).
    pub jwt_issuer: String,
    /// JWT audience (`aud` claim).
    pub jwt_audience: String,
    /// Access token lifetime in seconds (default: 900 = 15 minutes).
    pub access_token_lifetime_secs: u64,
    /// Refresh token lifetime in seconds (default: 2_592_000 = 30 days).
    pub refresh_token_lifetime_secs: u64,
    /// Grace window past expiry before the retention sweep deletes a
    /// refresh token (default: 30 days).
    pub refresh_token_retention_days: i64,
    /// Optional pepper prepended to passwords and backup codes before
    /// Argon2id hashing/verification.
    pub pepper: Option<String>,
    /// 256-bit AES-GCM key for encrypting TOTP secrets at rest.
    /// `None` disables MFA enrollment.
    pub mfa_encryption_key: Option<[u8; 32]>,
    /// Issuer name shown in authenticator apps.
    pub totp_issuer: String,
    /// Number of single-use backup codes issued on MFA enrollment.
    pub backup_code_count: usize,
    /// Password rule set enforced on change/registration.
    pub password_policy: PasswordPolicy,
    /// Anomaly detection thresholds.
    pub anomaly: AnomalyThresholds,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_private_key_pem: String::new(),
            jwt_public_key_pem: String::new(),
            jwt_issuer: "taskforge".into(),
            jwt_audience: "taskforge-api".into(),
            access_token_lifetime_secs: 900,
            refresh_token_lifetime_secs: 2_592_000,
            refresh_token_retention_days: 30,
            pepper: None,
            mfa_encryption_key: None,
            totp_issuer: "Taskforge".into(),
            backup_code_count: 8,
            password_policy: PasswordPolicy::default(),
            anomaly: AnomalyThresholds::default(),
        }
    }
}

/// Threshold constants for the anomaly heuristics.
///
/// These are simple threshold rules, not a learned model; the defaults
/// match the values the heuristics were designed around and are exposed
/// here for tuning.
#[derive(Debug, Clone)]
pub struct AnomalyThresholds {
    /// Failed attempts for one email within the window before a
    /// `SuspiciousActivity` entry is synthesized (strictly more than).
    pub failed_login_threshold: usize,
    /// Trailing window for the failed-login heuristics, in minutes.
    pub failed_login_window_mins: i64,
    /// Distinct emails one source IP may probe within the window
    /// (strictly more than).
    pub distinct_email_threshold: usize,
    /// Distinct successful-login IPs per user within the origin window
    /// (strictly more than).
    pub distinct_ip_threshold: usize,
    /// Trailing window for the breadth-of-origin heuristic, in hours.
    pub origin_window_hours: i64,
    /// Audit entries older than this are removed by the retention sweep.
    pub audit_retention_days: i64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            failed_login_threshold: 5,
            failed_login_window_mins: 15,
            distinct_email_threshold: 3,
            distinct_ip_threshold: 5,
            origin_window_hours: 24,
            audit_retention_days: 365,
        }
    }
}
