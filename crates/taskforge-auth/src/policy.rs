//! Password policy enforcement, Argon2id hashing, and secure generation.
//!
//! Validation is cumulative: every failing rule is reported, so a caller
//! can show the user the complete list at once instead of one rule per
//! round trip.

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{Duration, Utc};
use rand::seq::{IndexedRandom, SliceRandom};
use taskforge_core::models::user::User;
use thiserror::Error;

use crate::error::AuthError;

/// Passwords nobody should be allowed to keep. A deliberately small
/// embedded list; swap in a larger corpus when one is available.
const COMMON_PASSWORDS: &[&str] = &[
    "123456",
    "password",
    "123456789",
    "12345678",
    "qwerty",
    "abc123",
    "football",
    "monkey",
    "letmein",
    "dragon",
    "111111",
    "baseball",
    "iloveyou",
    "trustno1",
    "sunshine",
    "master",
    "welcome",
    "shadow",
    "superman",
    "michael",
    "ninja",
    "mustang",
    "password1",
    "password123",
    "123123",
    "admin",
    "qwerty123",
    "1q2w3e4r",
    "000000",
    "batman",
    "zaq12wsx",
    "login",
    "starwars",
    "hello",
    "freedom",
    "whatever",
    "princess",
    "charlie",
];

/// Configurable password rule set.
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
    /// The alphabet counted as "special" characters.
    pub special_chars: String,
    /// Longest allowed run of identical consecutive characters.
    pub max_repeat_run: usize,
    /// Reject passwords from the common-password list.
    pub reject_common: bool,
    /// Reject passwords containing fragments of the user's name or email.
    pub reject_personal_info: bool,
    /// Days until a password expires; zero or negative disables expiry.
    pub expiration_days: i64,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 12,
            max_length: 128,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: true,
            special_chars: "!@#$%^&*()-_=+[]{};:,.<>?".into(),
            max_repeat_run: 3,
            reject_common: true,
            reject_personal_info: true,
            expiration_days: 0,
        }
    }
}

/// One failed password rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("password must be at least {min} characters")]
    TooShort { min: usize },

    #[error("password must be at most {max} characters")]
    TooLong { max: usize },

    #[error("password must contain an uppercase letter")]
    MissingUppercase,

    #[error("password must contain a lowercase letter")]
    MissingLowercase,

    #[error("password must contain a digit")]
    MissingDigit,

    #[error("password must contain a special character")]
    MissingSpecial,

    #[error("password may not repeat one character more than {max_run} times in a row")]
    RepeatedCharacters { max_run: usize },

    #[error("password is too common")]
    CommonPassword,

    #[error("password may not contain parts of your name or email")]
    ContainsPersonalInfo,
}

impl PasswordPolicy {
    /// Check a candidate password against every rule. Rules are evaluated
    /// independently (no short-circuiting); an empty result means the
    /// password is acceptable.
    pub fn validate(&self, password: &str, user: Option<&User>) -> Vec<PolicyViolation> {
        let mut violations = Vec::new();
        let length = password.chars().count();

        if length < self.min_length {
            violations.push(PolicyViolation::TooShort {
                min: self.min_length,
            });
        }
        if length > self.max_length {
            violations.push(PolicyViolation::TooLong {
                max: self.max_length,
            });
        }

        if self.require_uppercase && !password.chars().any(|c| c.is_ascii_uppercase()) {
            violations.push(PolicyViolation::MissingUppercase);
        }
        if self.require_lowercase && !password.chars().any(|c| c.is_ascii_lowercase()) {
            violations.push(PolicyViolation::MissingLowercase);
        }
        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            violations.push(PolicyViolation::MissingDigit);
        }
        if self.require_special && !password.chars().any(|c| self.special_chars.contains(c)) {
            violations.push(PolicyViolation::MissingSpecial);
        }

        if self.has_repeat_run(password) {
            violations.push(PolicyViolation::RepeatedCharacters {
                max_run: self.max_repeat_run,
            });
        }

        let lowered = password.to_lowercase();
        if self.reject_common && COMMON_PASSWORDS.contains(&lowered.as_str()) {
            violations.push(PolicyViolation::CommonPassword);
        }

        if self.reject_personal_info
            && let Some(user) = user
            && personal_tokens(user).iter().any(|t| lowered.contains(t))
        {
            violations.push(PolicyViolation::ContainsPersonalInfo);
        }

        violations
    }

    fn has_repeat_run(&self, password: &str) -> bool {
        let mut run = 0usize;
        let mut prev = None;
        for c in password.chars() {
            if prev == Some(c) {
                run += 1;
                if run > self.max_repeat_run {
                    return true;
                }
            } else {
                run = 1;
            }
            prev = Some(c);
        }
        false
    }

    /// Whether the user's password has passed the configured expiration
    /// period. Expiry is disabled when the period is zero or negative.
    pub fn is_expired(&self, user: &User) -> bool {
        if self.expiration_days <= 0 {
            return false;
        }
        Utc::now() > user.password_changed_at + Duration::days(self.expiration_days)
    }

    /// Generate a password satisfying every required character class plus
    /// the minimum length: one guaranteed character per required class,
    /// the remainder drawn from the full allowed alphabet, then shuffled.
    /// All randomness comes from the CSPRNG.
    pub fn generate(&self) -> String {
        let mut rng = rand::rng();

        let upper: Vec<char> = ('A'..='Z').collect();
        let lower: Vec<char> = ('a'..='z').collect();
        let digits: Vec<char> = ('0'..='9').collect();
        let special: Vec<char> = self.special_chars.chars().collect();

        let mut required: Vec<&[char]> = Vec::new();
        if self.require_uppercase {
            required.push(&upper);
        }
        if self.require_lowercase {
            required.push(&lower);
        }
        if self.require_digit {
            required.push(&digits);
        }
        if self.require_special && !special.is_empty() {
            required.push(&special);
        }

        let mut alphabet: Vec<char> = Vec::new();
        alphabet.extend(&upper);
        alphabet.extend(&lower);
        alphabet.extend(&digits);
        alphabet.extend(&special);

        let mut chars: Vec<char> = required
            .iter()
            .filter_map(|class| class.choose(&mut rng).copied())
            .collect();
        while chars.len() < self.min_length {
            if let Some(c) = alphabet.choose(&mut rng) {
                chars.push(*c);
            }
        }
        chars.shuffle(&mut rng);

        chars.into_iter().collect()
    }
}

/// Lowercased fragments of the user's name and email local part that a
/// password may not contain. Fragments of four characters or fewer are
/// ignored (too easy to hit by accident).
fn personal_tokens(user: &User) -> Vec<String> {
    let mut tokens: Vec<String> = user
        .name
        .split_whitespace()
        .map(str::to_lowercase)
        .collect();
    let local_part = user.email.split('@').next().unwrap_or("");
    tokens.extend(
        local_part
            .split(['.', '_', '-', '+'])
            .map(str::to_lowercase),
    );
    tokens.retain(|t| t.len() > 3);
    tokens
}

/// Hash a password (or backup code) with Argon2id using
/// OWASP-recommended parameters (memory: 19 MiB, iterations: 2,
/// parallelism: 1). Salt is randomly generated per hash.
///
/// If a pepper is provided, it is prepended to the password before
/// hashing.
pub fn hash_password(password: &str, pepper: Option<&str>) -> Result<String, AuthError> {
    let params = argon2::Params::new(19456, 2, 1, None)
        .map_err(|e| AuthError::Crypto(format!("argon2 params error: {e}")))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let peppered: String;
    let input = match pepper {
        Some(p) => {
            peppered = format!("{p}{password}");
            peppered.as_bytes()
        }
        None => password.as_bytes(),
    };

    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    let hash = argon2
        .hash_password(input, &salt)
        .map_err(|e| AuthError::Crypto(format!("password hash error: {e}")))?;

    Ok(hash.to_string())
}

/// Verify a plaintext password against an Argon2id PHC-format hash.
///
/// If `pepper` is provided it is prepended to the password before
/// verification — this must match the pepper used during hashing.
///
/// Returns `Ok(true)` on match, `Ok(false)` on mismatch, or
/// `Err(AuthError::Crypto)` if the stored hash is malformed.
pub fn verify_password(
    password: &str,
    hash: &str,
    pepper: Option<&str>,
) -> Result<bool, AuthError> {
    let peppered: String;
    let input = match pepper {
        Some(p) => {
            peppered = format!("{p}{password}");
            peppered.as_bytes()
        }
        None => password.as_bytes(),
    };

    let parsed_hash = argon2::PasswordHash::new(hash)
        .map_err(|e| AuthError::Crypto(format!("invalid hash format: {e}")))?;

    let argon2 = Argon2::default();
    match argon2.verify_password(input, &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Crypto(format!("verify error: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn test_user(name: &str, email: &str) -> User {
        User {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            password_hash: String::new(),
            mfa_enabled: false,
            mfa_secret: None,
            mfa_confirmed: false,
            backup_code_hashes: Vec::new(),
            password_changed_at: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn acceptable_password_has_no_violations() {
        let policy = PasswordPolicy::default();
        assert!(policy.validate("Tr0ub4dor&Horse!", None).is_empty());
    }

    #[test]
    fn violations_are_cumulative() {
        let policy = PasswordPolicy::default();
        // Too short AND missing uppercase, digit, and special character.
        let violations = policy.validate("abc", None);
        assert!(violations.contains(&PolicyViolation::TooShort { min: 12 }));
        assert!(violations.contains(&PolicyViolation::MissingUppercase));
        assert!(violations.contains(&PolicyViolation::MissingDigit));
        assert!(violations.contains(&PolicyViolation::MissingSpecial));
        assert_eq!(violations.len(), 4);
    }

    #[test]
    fn repeated_run_is_flagged() {
        let policy = PasswordPolicy::default();
        let violations = policy.validate("Gooood-Pass4aaaa!", None);
        assert!(violations.contains(&PolicyViolation::RepeatedCharacters { max_run: 3 }));

        // Exactly at the limit is fine.
        assert!(policy.validate("Goood-Passw0rd!", None).is_empty());
    }

    #[test]
    fn common_password_is_flagged() {
        let policy = PasswordPolicy {
            min_length: 6,
            require_uppercase: false,
            require_digit: false,
            require_special: false,
            ..PasswordPolicy::default()
        };
        let violations = policy.validate("letmein", None);
        assert!(violations.contains(&PolicyViolation::CommonPassword));
    }

    #[test]
    fn personal_info_is_flagged() {
        let policy = PasswordPolicy::default();
        let user = test_user("Alice Johnson", "alice.johnson@example.com");

        let violations = policy.validate("Xjohnson77&!Qz", Some(&user));
        assert!(violations.contains(&PolicyViolation::ContainsPersonalInfo));

        // Short name tokens (<= 3 chars after splitting) are ignored.
        let user = test_user("Al B", "al@example.com");
        assert!(policy.validate("SomAl3thing!x", Some(&user)).is_empty());
    }

    #[test]
    fn hash_verify_roundtrip() {
        let hash = hash_password("hunter2-but-long", None).unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("hunter2-but-long", &hash, None).unwrap());
        assert!(!verify_password("wrong", &hash, None).unwrap());
    }

    #[test]
    fn pepper_is_applied() {
        let hash = hash_password("hunter2", Some("pepper!")).unwrap();
        assert!(verify_password("hunter2", &hash, Some("pepper!")).unwrap());
        // Without pepper should fail.
        assert!(!verify_password("hunter2", &hash, None).unwrap());
    }

    #[test]
    fn malformed_hash_returns_error() {
        assert!(verify_password("pw", "not-a-hash", None).is_err());
    }

    #[test]
    fn expiry_disabled_by_default() {
        let policy = PasswordPolicy::default();
        let mut user = test_user("Bob", "bob@example.com");
        user.password_changed_at = Utc::now() - Duration::days(3650);
        assert!(!policy.is_expired(&user));
    }

    #[test]
    fn expiry_honours_configured_period() {
        let policy = PasswordPolicy {
            expiration_days: 90,
            ..PasswordPolicy::default()
        };
        let mut user = test_user("Bob", "bob@example.com");

        user.password_changed_at = Utc::now() - Duration::days(10);
        assert!(!policy.is_expired(&user));

        user.password_changed_at = Utc::now() - Duration::days(91);
        assert!(policy.is_expired(&user));
    }

    #[test]
    fn generated_password_satisfies_policy() {
        let policy = PasswordPolicy::default();
        for _ in 0..20 {
            let password = policy.generate();
            assert_eq!(password.chars().count(), policy.min_length);
            assert!(
                policy.validate(&password, None).is_empty(),
                "generated password violated policy: {password}"
            );
        }
    }
}
