//! Authentication service — login, refresh-token rotation, and session
//! revocation orchestration.

use chrono::{Duration, Utc};
use serde_json::json;
use taskforge_core::error::{TaskforgeError, TaskforgeResult};
use taskforge_core::models::audit::{AuthEventKind, CreateAuthAuditEntry};
use taskforge_core::models::refresh_token::{CreateRefreshToken, RefreshToken};
use taskforge_core::models::user::{UpdateUser, User};
use taskforge_core::repository::{AuthAuditRepository, RefreshTokenRepository, UserRepository};
use uuid::Uuid;

use crate::audit::AuditService;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::mfa::{self, CodeCheck};
use crate::{policy, token};

/// Input for the login flow.
#[derive(Debug)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
    /// TOTP or backup code; required once the user has MFA enabled.
    pub mfa_code: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Successful login/refresh result.
#[derive(Debug)]
pub struct LoginOutput {
    /// Signed JWT access token.
    pub access_token: String,
    /// Raw opaque refresh token (returned to the client, never stored).
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

/// Input for the refresh token rotation flow.
#[derive(Debug)]
pub struct RefreshInput {
    pub raw_refresh_token: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Authentication service.
///
/// Generic over repository implementations so that the auth layer
/// has no dependency on the database crate.
pub struct AuthService<U, S, A>
where
    U: UserRepository,
    S: RefreshTokenRepository,
    A: AuthAuditRepository,
{
    users: U,
    tokens: S,
    audit: AuditService<A>,
    config: AuthConfig,
}

impl<U, S, A> AuthService<U, S, A>
where
    U: UserRepository,
    S: RefreshTokenRepository,
    A: AuthAuditRepository,
{
    pub fn new(users: U, tokens: S, audit: AuditService<A>, config: AuthConfig) -> Self {
        Self {
            users,
            tokens,
            audit,
            config,
        }
    }

    /// The audit read side, for account-security views.
    pub fn audit(&self) -> &AuditService<A> {
        &self.audit
    }

    /// Authenticate a user with email + password (+ MFA code where
    /// enabled) and issue a token pair.
    pub async fn login(&self, input: LoginInput) -> TaskforgeResult<LoginOutput> {
        // 1. Look up the user. Unknown emails and wrong passwords are
        //    audited distinctly but surface as the same error.
        let user = match self.users.get_by_email(&input.email).await {
            Ok(u) => u,
            Err(TaskforgeError::NotFound { .. }) => {
                self.record_login_failed(None, &input, "unknown email").await;
                return Err(AuthError::InvalidCredentials.into());
            }
            Err(e) => return Err(e),
        };

        // 2. Verify password.
        let valid = policy::verify_password(
            &input.password,
            &user.password_hash,
            self.config.pepper.as_deref(),
        )?;
        if !valid {
            self.record_login_failed(Some(&user), &input, "wrong password")
                .await;
            return Err(AuthError::InvalidCredentials.into());
        }

        // 3. Password expiry gate.
        if self.config.password_policy.is_expired(&user) {
            self.record_login_failed(Some(&user), &input, "password expired")
                .await;
            return Err(AuthError::PasswordExpired.into());
        }

        // 4. MFA gate — token issuance is deferred until a valid code is
        //    presented.
        if user.mfa_enabled && user.mfa_confirmed {
            let Some(code) = input.mfa_code.as_deref() else {
                return Err(AuthError::MfaRequired.into());
            };
            self.verify_mfa_code(&user, code, &input).await?;
        }

        // 5. Issue the pair and record the login.
        let output = self
            .issue_pair(&user, input.ip_address.clone(), input.user_agent.clone())
            .await?;

        self.audit
            .record(CreateAuthAuditEntry {
                user_id: Some(user.id),
                email: Some(user.email.clone()),
                ip_address: input.ip_address.clone(),
                user_agent: input.user_agent.clone(),
                ..CreateAuthAuditEntry::new(AuthEventKind::Login, true)
            })
            .await;

        Ok(output)
    }

    /// Rotate a refresh token: atomically consume the presented link and
    /// issue a new pair.
    ///
    /// Presenting a link that was already rotated or revoked is treated
    /// as a theft indicator: the user's entire token family is revoked.
    /// Not-found, reused, and expired tokens are logged distinctly but
    /// all surface as the same generic re-authentication error.
    pub async fn refresh(&self, input: RefreshInput) -> TaskforgeResult<LoginOutput> {
        let token_hash = token::hash_refresh_token(&input.raw_refresh_token);
        let current = match self.tokens.get_by_hash(&token_hash).await {
            Ok(t) => t,
            Err(TaskforgeError::NotFound { .. }) => {
                self.audit
                    .record(CreateAuthAuditEntry {
                        failure_reason: Some("unknown refresh token".into()),
                        ip_address: input.ip_address.clone(),
                        user_agent: input.user_agent.clone(),
                        ..CreateAuthAuditEntry::new(AuthEventKind::TokenRefresh, false)
                    })
                    .await;
                return Err(AuthError::ReauthenticationRequired.into());
            }
            Err(e) => return Err(e),
        };

        // Already rotated or revoked — reuse.
        if current.revoked_at.is_some() {
            return self.handle_reuse(&current, &input).await;
        }

        if current.is_expired(Utc::now()) {
            self.audit
                .record(CreateAuthAuditEntry {
                    user_id: Some(current.user_id),
                    failure_reason: Some("refresh token expired".into()),
                    ip_address: input.ip_address.clone(),
                    user_agent: input.user_agent.clone(),
                    ..CreateAuthAuditEntry::new(AuthEventKind::TokenRefresh, false)
                })
                .await;
            return Err(AuthError::ReauthenticationRequired.into());
        }

        let user = self.users.get_by_id(current.user_id).await?;

        // Only one concurrent caller may rotate a given link. The loser
        // observes it as already rotated and takes the reuse path.
        let next_id = Uuid::new_v4();
        if !self.tokens.mark_rotated(current.id, next_id).await? {
            return self.handle_reuse(&current, &input).await;
        }

        let raw_refresh = token::generate_refresh_token();
        let new_hash = token::hash_refresh_token(&raw_refresh);
        let expires_at =
            Utc::now() + Duration::seconds(self.config.refresh_token_lifetime_secs as i64);

        self.tokens
            .create(CreateRefreshToken {
                id: next_id,
                user_id: user.id,
                token_hash: new_hash,
                ip_address: input.ip_address.clone(),
                user_agent: input.user_agent.clone(),
                expires_at,
            })
            .await?;

        let access_token = token::issue_access_token(user.id, &self.config)?;

        self.audit
            .record(CreateAuthAuditEntry {
                user_id: Some(user.id),
                email: Some(user.email.clone()),
                ip_address: input.ip_address.clone(),
                user_agent: input.user_agent.clone(),
                ..CreateAuthAuditEntry::new(AuthEventKind::TokenRefresh, true)
            })
            .await;

        Ok(LoginOutput {
            access_token,
            refresh_token: raw_refresh,
            expires_in: self.config.access_token_lifetime_secs,
        })
    }

    /// Validate an access token (signature, issuer, audience, expiry) and
    /// return the authenticated user ID. Stateless — no database lookup.
    pub fn validate_access(&self, access_token: &str) -> TaskforgeResult<Uuid> {
        let validated = token::validate_access_token(access_token, &self.config)?;
        Uuid::parse_str(&validated.0.sub)
            .map_err(|e| AuthError::TokenInvalid(format!("bad subject: {e}")).into())
    }

    /// Revoke a single refresh token (logout). Idempotent; unknown tokens
    /// are ignored.
    pub async fn logout(&self, input: RefreshInput) -> TaskforgeResult<()> {
        let hash = token::hash_refresh_token(&input.raw_refresh_token);
        if let Some(revoked) = self.tokens.revoke_by_hash(&hash).await? {
            self.audit
                .record(CreateAuthAuditEntry {
                    user_id: Some(revoked.user_id),
                    ip_address: input.ip_address.clone(),
                    user_agent: input.user_agent.clone(),
                    ..CreateAuthAuditEntry::new(AuthEventKind::Logout, true)
                })
                .await;
        }
        Ok(())
    }

    /// Revoke every active token for a user (logout-everywhere, password
    /// change, suspected compromise). Returns the number revoked.
    pub async fn revoke_all_sessions(&self, user_id: Uuid) -> TaskforgeResult<u64> {
        let revoked = self.tokens.revoke_all_for_user(user_id).await?;
        self.audit
            .record(CreateAuthAuditEntry {
                user_id: Some(user_id),
                metadata: Some(json!({
                    "scope": "all_sessions",
                    "tokens_revoked": revoked,
                })),
                ..CreateAuthAuditEntry::new(AuthEventKind::Logout, true)
            })
            .await;
        Ok(revoked)
    }

    /// Change the user's password: re-verify the current one, enforce the
    /// policy on the new one (all violations reported at once), rehash,
    /// and revoke every outstanding session.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> TaskforgeResult<()> {
        let user = self.users.get_by_id(user_id).await?;

        let valid = policy::verify_password(
            current_password,
            &user.password_hash,
            self.config.pepper.as_deref(),
        )?;
        if !valid {
            return Err(AuthError::WrongPassword.into());
        }

        let violations = self
            .config
            .password_policy
            .validate(new_password, Some(&user));
        if !violations.is_empty() {
            return Err(AuthError::PolicyViolation(violations).into());
        }

        let hash = policy::hash_password(new_password, self.config.pepper.as_deref())?;
        self.users
            .update(
                user.id,
                UpdateUser {
                    password_hash: Some(hash),
                    ..Default::default()
                },
            )
            .await?;

        let revoked = self.tokens.revoke_all_for_user(user.id).await?;

        self.audit
            .record(CreateAuthAuditEntry {
                user_id: Some(user.id),
                email: Some(user.email.clone()),
                metadata: Some(json!({ "tokens_revoked": revoked })),
                ..CreateAuthAuditEntry::new(AuthEventKind::PasswordChanged, true)
            })
            .await;

        Ok(())
    }

    /// Retention sweep: delete refresh tokens expired longer ago than the
    /// configured grace window. A maintenance path, not a hot path.
    pub async fn purge_expired_tokens(&self) -> TaskforgeResult<u64> {
        let cutoff = Utc::now() - Duration::days(self.config.refresh_token_retention_days);
        self.tokens.purge_expired_before(cutoff).await
    }

    async fn verify_mfa_code(
        &self,
        user: &User,
        code: &str,
        input: &LoginInput,
    ) -> TaskforgeResult<()> {
        match mfa::check_code(user, code, &self.config)? {
            CodeCheck::Totp => {
                self.record_mfa_verified(user, "totp", input).await;
                Ok(())
            }
            CodeCheck::BackupCode { remaining } => {
                // Consume the backup code before issuing tokens, so it
                // cannot be replayed.
                self.users
                    .update(
                        user.id,
                        UpdateUser {
                            backup_code_hashes: Some(remaining),
                            ..Default::default()
                        },
                    )
                    .await?;
                self.record_mfa_verified(user, "backup_code", input).await;
                Ok(())
            }
            CodeCheck::NoMatch => {
                self.audit
                    .record(CreateAuthAuditEntry {
                        user_id: Some(user.id),
                        email: Some(user.email.clone()),
                        failure_reason: Some("invalid MFA code".into()),
                        ip_address: input.ip_address.clone(),
                        user_agent: input.user_agent.clone(),
                        ..CreateAuthAuditEntry::new(AuthEventKind::MfaFailed, false)
                    })
                    .await;
                Err(AuthError::MfaInvalidCode.into())
            }
        }
    }

    async fn record_mfa_verified(&self, user: &User, method: &str, input: &LoginInput) {
        self.audit
            .record(CreateAuthAuditEntry {
                user_id: Some(user.id),
                email: Some(user.email.clone()),
                ip_address: input.ip_address.clone(),
                user_agent: input.user_agent.clone(),
                metadata: Some(json!({ "method": method })),
                ..CreateAuthAuditEntry::new(AuthEventKind::MfaVerified, true)
            })
            .await;
    }

    async fn record_login_failed(&self, user: Option<&User>, input: &LoginInput, reason: &str) {
        self.audit
            .record(CreateAuthAuditEntry {
                user_id: user.map(|u| u.id),
                email: Some(input.email.clone()),
                failure_reason: Some(reason.into()),
                ip_address: input.ip_address.clone(),
                user_agent: input.user_agent.clone(),
                ..CreateAuthAuditEntry::new(AuthEventKind::LoginFailed, false)
            })
            .await;
    }

    async fn issue_pair(
        &self,
        user: &User,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> TaskforgeResult<LoginOutput> {
        let raw_refresh = token::generate_refresh_token();
        let token_hash = token::hash_refresh_token(&raw_refresh);
        let expires_at =
            Utc::now() + Duration::seconds(self.config.refresh_token_lifetime_secs as i64);

        self.tokens
            .create(CreateRefreshToken {
                id: Uuid::new_v4(),
                user_id: user.id,
                token_hash,
                ip_address,
                user_agent,
                expires_at,
            })
            .await?;

        let access_token = token::issue_access_token(user.id, &self.config)?;

        Ok(LoginOutput {
            access_token,
            refresh_token: raw_refresh,
            expires_in: self.config.access_token_lifetime_secs,
        })
    }

    /// Revoke the user's whole token family and record the reuse. The
    /// caller-visible error stays generic; the forced logout is the only
    /// externally observable side effect.
    async fn handle_reuse(
        &self,
        current: &RefreshToken,
        input: &RefreshInput,
    ) -> TaskforgeResult<LoginOutput> {
        let revoked = self.tokens.revoke_all_for_user(current.user_id).await?;

        self.audit
            .record(CreateAuthAuditEntry {
                user_id: Some(current.user_id),
                failure_reason: Some("refresh token replayed".into()),
                ip_address: input.ip_address.clone(),
                user_agent: input.user_agent.clone(),
                metadata: Some(json!({
                    "token_id": current.id,
                    "tokens_revoked": revoked,
                })),
                ..CreateAuthAuditEntry::new(AuthEventKind::TokenReuseDetected, false)
            })
            .await;

        Err(AuthError::ReauthenticationRequired.into())
    }
}
