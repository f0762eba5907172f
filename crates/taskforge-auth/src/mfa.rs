//! MFA engine — TOTP enrollment and verification with single-use backup
//! codes.
//!
//! Per-user state machine: disabled → pending setup (secret stored, not
//! confirmed) → enabled (confirmed, backup codes issued). Leaving the
//! enabled state requires password re-verification.

use rand::Rng;
use serde_json::json;
use taskforge_core::error::TaskforgeResult;
use taskforge_core::models::audit::{AuthEventKind, CreateAuthAuditEntry};
use taskforge_core::models::user::{UpdateUser, User};
use taskforge_core::repository::{AuthAuditRepository, UserRepository};
use uuid::Uuid;

use crate::audit::AuditService;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::{policy, totp};

/// Everything the client needs to finish authenticator enrollment.
#[derive(Debug)]
pub struct MfaSetup {
    /// Raw base32 secret. Returned once, stored only encrypted.
    pub secret_base32: String,
    /// `otpauth://` URI for QR rendering.
    pub provisioning_uri: String,
    /// The secret grouped in blocks of four for manual entry.
    pub manual_entry_secret: String,
}

/// Which credential satisfied an MFA challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MfaMethod {
    Totp,
    BackupCode,
}

impl MfaMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MfaMethod::Totp => "totp",
            MfaMethod::BackupCode => "backup_code",
        }
    }
}

/// Outcome of checking a submitted code against a user's MFA credentials.
/// For a backup code, carries the hashes that remain after consuming the
/// matched one.
pub(crate) enum CodeCheck {
    Totp,
    BackupCode { remaining: Vec<String> },
    NoMatch,
}

/// Check a code against the user's TOTP secret, then their backup codes.
///
/// Pure with respect to storage — the caller is responsible for
/// persisting the remaining backup codes before treating the check as
/// successful, so a matched code cannot be replayed.
pub(crate) fn check_code(
    user: &User,
    code: &str,
    config: &AuthConfig,
) -> Result<CodeCheck, AuthError> {
    let key = config
        .mfa_encryption_key
        .ok_or_else(|| AuthError::Crypto("MFA encryption key not configured".into()))?;
    let encrypted = user
        .mfa_secret
        .as_deref()
        .ok_or(AuthError::MfaNotEnrolled)?;

    let secret_b32 = String::from_utf8(totp::decrypt_secret(&key, encrypted)?)
        .map_err(|e| AuthError::Crypto(format!("secret is not valid base32: {e}")))?;
    let secret_bytes = totp::secret_bytes_from_base32(&secret_b32)?;

    if totp::verify_code(&secret_bytes, code, &config.totp_issuer, &user.email)? {
        return Ok(CodeCheck::Totp);
    }

    for (i, hash) in user.backup_code_hashes.iter().enumerate() {
        if policy::verify_password(code, hash, config.pepper.as_deref())? {
            let mut remaining = user.backup_code_hashes.clone();
            remaining.remove(i);
            return Ok(CodeCheck::BackupCode { remaining });
        }
    }

    Ok(CodeCheck::NoMatch)
}

/// Generate `count` random numeric backup codes (8 digits each).
fn generate_backup_codes(count: usize) -> Vec<String> {
    let mut rng = rand::rng();
    (0..count)
        .map(|_| format!("{:08}", rng.random_range(0..100_000_000u32)))
        .collect()
}

/// MFA service.
///
/// Generic over the repository implementations so that the auth layer
/// has no dependency on the database crate.
pub struct MfaService<U: UserRepository, A: AuthAuditRepository> {
    users: U,
    audit: AuditService<A>,
    config: AuthConfig,
}

impl<U: UserRepository, A: AuthAuditRepository> MfaService<U, A> {
    pub fn new(users: U, audit: AuditService<A>, config: AuthConfig) -> Self {
        Self {
            users,
            audit,
            config,
        }
    }

    /// Start enrollment: generate and store a fresh secret (encrypted,
    /// not yet confirmed) and return the provisioning material.
    ///
    /// Restarting a pending setup is allowed and replaces the secret;
    /// calling this while MFA is already enabled fails.
    pub async fn begin_setup(&self, user_id: Uuid) -> TaskforgeResult<MfaSetup> {
        let user = self.users.get_by_id(user_id).await?;
        if user.mfa_enabled && user.mfa_confirmed {
            return Err(AuthError::MfaAlreadyEnabled.into());
        }

        let key = self
            .config
            .mfa_encryption_key
            .ok_or_else(|| AuthError::Crypto("MFA encryption key not configured".into()))?;

        let (secret_base32, provisioning_uri) =
            totp::generate_enrollment(&self.config.totp_issuer, &user.email)?;
        let encrypted = totp::encrypt_secret(&key, secret_base32.as_bytes())?;

        self.users
            .update(
                user.id,
                UpdateUser {
                    mfa_secret: Some(Some(encrypted)),
                    mfa_enabled: Some(false),
                    mfa_confirmed: Some(false),
                    backup_code_hashes: Some(Vec::new()),
                    ..Default::default()
                },
            )
            .await?;

        Ok(MfaSetup {
            manual_entry_secret: totp::format_manual_entry(&secret_base32),
            secret_base32,
            provisioning_uri,
        })
    }

    /// Confirm a pending setup with a code from the authenticator app.
    ///
    /// On success MFA becomes enabled and the plaintext backup codes are
    /// returned — once; only their hashes are kept.
    pub async fn confirm_setup(&self, user_id: Uuid, code: &str) -> TaskforgeResult<Vec<String>> {
        let user = self.users.get_by_id(user_id).await?;
        if user.mfa_enabled && user.mfa_confirmed {
            return Err(AuthError::MfaAlreadyEnabled.into());
        }
        if user.mfa_secret.is_none() {
            return Err(AuthError::MfaSetupNotPending.into());
        }

        match check_code(&user, code, &self.config)? {
            CodeCheck::Totp => {}
            _ => {
                self.audit
                    .record(CreateAuthAuditEntry {
                        user_id: Some(user.id),
                        email: Some(user.email.clone()),
                        failure_reason: Some("invalid setup confirmation code".into()),
                        ..CreateAuthAuditEntry::new(AuthEventKind::MfaFailed, false)
                    })
                    .await;
                return Err(AuthError::MfaInvalidCode.into());
            }
        }

        let codes = generate_backup_codes(self.config.backup_code_count);
        let hashes = self.hash_backup_codes(&codes)?;

        self.users
            .update(
                user.id,
                UpdateUser {
                    mfa_enabled: Some(true),
                    mfa_confirmed: Some(true),
                    backup_code_hashes: Some(hashes),
                    ..Default::default()
                },
            )
            .await?;

        self.audit
            .record(CreateAuthAuditEntry {
                user_id: Some(user.id),
                email: Some(user.email.clone()),
                ..CreateAuthAuditEntry::new(AuthEventKind::MfaEnabled, true)
            })
            .await;

        Ok(codes)
    }

    /// Verify a TOTP or backup code during login. A matched backup code
    /// is consumed before success is reported, so it cannot be replayed.
    pub async fn verify_login(&self, user: &User, code: &str) -> TaskforgeResult<MfaMethod> {
        if !user.mfa_enabled || !user.mfa_confirmed {
            return Err(AuthError::MfaNotEnrolled.into());
        }

        match check_code(user, code, &self.config)? {
            CodeCheck::Totp => {
                self.record_verified(user, MfaMethod::Totp, user.backup_code_hashes.len())
                    .await;
                Ok(MfaMethod::Totp)
            }
            CodeCheck::BackupCode { remaining } => {
                let left = remaining.len();
                self.users
                    .update(
                        user.id,
                        UpdateUser {
                            backup_code_hashes: Some(remaining),
                            ..Default::default()
                        },
                    )
                    .await?;
                self.record_verified(user, MfaMethod::BackupCode, left).await;
                Ok(MfaMethod::BackupCode)
            }
            CodeCheck::NoMatch => {
                self.audit
                    .record(CreateAuthAuditEntry {
                        user_id: Some(user.id),
                        email: Some(user.email.clone()),
                        failure_reason: Some("invalid MFA code".into()),
                        ..CreateAuthAuditEntry::new(AuthEventKind::MfaFailed, false)
                    })
                    .await;
                Err(AuthError::MfaInvalidCode.into())
            }
        }
    }

    /// Disable MFA. Requires password re-verification; clears the secret,
    /// backup codes, and flags.
    pub async fn disable(&self, user_id: Uuid, password: &str) -> TaskforgeResult<()> {
        let user = self.users.get_by_id(user_id).await?;
        if !user.mfa_enabled {
            return Err(AuthError::MfaNotEnrolled.into());
        }
        self.require_password(&user, password)?;

        self.users
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
            .await?;

        self.audit
            .record(CreateAuthAuditEntry {
                user_id: Some(user.id),
                email: Some(user.email.clone()),
                ..CreateAuthAuditEntry::new(AuthEventKind::MfaDisabled, true)
            })
            .await;

        Ok(())
    }

    /// Invalidate all previous backup codes and issue a fresh set.
    /// Requires password re-verification.
    pub async fn regenerate_backup_codes(
        &self,
        user_id: Uuid,
        password: &str,
    ) -> TaskforgeResult<Vec<String>> {
        let user = self.users.get_by_id(user_id).await?;
        if !user.mfa_enabled || !user.mfa_confirmed {
            return Err(AuthError::MfaNotEnrolled.into());
        }
        self.require_password(&user, password)?;

        let codes = generate_backup_codes(self.config.backup_code_count);
        let hashes = self.hash_backup_codes(&codes)?;

        self.users
            .update(
                user.id,
                UpdateUser {
                    backup_code_hashes: Some(hashes),
                    ..Default::default()
                },
            )
            .await?;

        self.audit
            .record(CreateAuthAuditEntry {
                user_id: Some(user.id),
                email: Some(user.email.clone()),
                ..CreateAuthAuditEntry::new(AuthEventKind::BackupCodesRegenerated, true)
            })
            .await;

        Ok(codes)
    }

    fn require_password(&self, user: &User, password: &str) -> Result<(), AuthError> {
        let valid =
            policy::verify_password(password, &user.password_hash, self.config.pepper.as_deref())?;
        if valid {
            Ok(())
        } else {
            Err(AuthError::WrongPassword)
        }
    }

    fn hash_backup_codes(&self, codes: &[String]) -> Result<Vec<String>, AuthError> {
        codes
            .iter()
            .map(|code| policy::hash_password(code, self.config.pepper.as_deref()))
            .collect()
    }

    async fn record_verified(&self, user: &User, method: MfaMethod, codes_remaining: usize) {
        self.audit
            .record(CreateAuthAuditEntry {
                user_id: Some(user.id),
                email: Some(user.email.clone()),
                metadata: Some(json!({
                    "method": method.as_str(),
                    "backup_codes_remaining": codes_remaining,
                })),
                ..CreateAuthAuditEntry::new(AuthEventKind::MfaVerified, true)
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_codes_are_numeric_and_distinctly_sized() {
        let codes = generate_backup_codes(8);
        assert_eq!(codes.len(), 8);
        for code in &codes {
            assert_eq!(code.len(), 8);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
