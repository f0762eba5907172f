//! User domain model (auth-relevant fields).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub mfa_enabled: bool,
    /// AES-256-GCM encrypted TOTP secret (present during/after MFA setup).
    pub mfa_secret: Option<String>,
    /// Set once the user has confirmed enrollment with a valid code.
    pub mfa_confirmed: bool,
    /// Argon2id hashes of the remaining single-use backup codes.
    pub backup_code_hashes: Vec<String>,
    pub password_changed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub name: String,
    pub email: String,
    /// Raw password (will be hashed with Argon2id before storage).
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub email: Option<String>,
    /// New Argon2id hash; setting it also bumps `password_changed_at`.
    pub password_hash: Option<String>,
    pub mfa_enabled: Option<bool>,
    /// `Some(Some(val))` = set, `Some(None)` = clear, `None` = no change.
    pub mfa_secret: Option<Option<String>>,
    pub mfa_confirmed: Option<bool>,
    pub backup_code_hashes: Option<Vec<String>>,
}
