//! Authentication error types.

use taskforge_core::error::TaskforgeError;
use thiserror::Error;

use crate::policy::PolicyViolation;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("password has expired")]
    PasswordExpired,

    #[error("MFA code required")]
    MfaRequired,

    #[error("invalid MFA code")]
    MfaInvalidCode,

    #[error("MFA is not enrolled for this user")]
    MfaNotEnrolled,

    #[error("MFA is already enabled")]
    MfaAlreadyEnabled,

    #[error("no MFA setup is pending")]
    MfaSetupNotPending,

    #[error("wrong password")]
    WrongPassword,

    #[error("password policy violation")]
    PolicyViolation(Vec<PolicyViolation>),

    #[error("refresh failed, please re-authenticate")]
    ReauthenticationRequired,

    #[error("token has expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    #[error("cryptography error: {0}")]
    Crypto(String),
}

impl From<AuthError> for TaskforgeError {
    fn from(err: AuthError) -> Self {
        match err {
            // Collapsed so a caller cannot tell an unknown email from a
            // wrong password.
            AuthError::InvalidCredentials => TaskforgeError::AuthenticationFailed {
                reason: "invalid email or password".into(),
            },
            // Malformed, expired, and bad-signature tokens all read the
            // same from the outside.
            AuthError::TokenExpired | AuthError::TokenInvalid(_) => {
                TaskforgeError::AuthenticationFailed {
                    reason: "invalid or expired token".into(),
                }
            }
            // Not-found, reused, and expired refresh tokens are logged
            // distinctly but surface identically.
            AuthError::ReauthenticationRequired => TaskforgeError::AuthenticationFailed {
                reason: "refresh failed, please re-authenticate".into(),
            },
            // Policy failures are the one case that enumerates everything
            // back to the caller, so the user can fix all rules at once.
            AuthError::PolicyViolation(violations) => TaskforgeError::Validation {
                message: violations
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            },
            AuthError::Crypto(msg) => TaskforgeError::Crypto(msg),
            other => TaskforgeError::AuthenticationFailed {
                reason: other.to_string(),
            },
        }
    }
}
