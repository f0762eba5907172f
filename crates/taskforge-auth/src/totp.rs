//! TOTP generation, verification, and AES-256-GCM secret encryption.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::error::AuthError;

/// Encrypt a TOTP secret with AES-256-GCM.
///
/// Returns `base64(nonce || ciphertext || tag)`.
pub fn encrypt_secret(key: &[u8; 32], plaintext: &[u8]) -> Result<String, AuthError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| AuthError::Crypto(format!("AES-GCM encrypt: {e}")))?;

    let mut combined = nonce_bytes.to_vec();
    combined.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(combined))
}

/// Decrypt an AES-256-GCM encrypted TOTP secret.
pub fn decrypt_secret(key: &[u8; 32], encoded: &str) -> Result<Vec<u8>, AuthError> {
    let combined = STANDARD
        .decode(encoded)
        .map_err(|e| AuthError::Crypto(format!("base64 decode: {e}")))?;

    if combined.len() < 13 {
        return Err(AuthError::Crypto("ciphertext too short".into()));
    }

    let (nonce_bytes, ciphertext) = combined.split_at(12);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| AuthError::Crypto(format!("AES-GCM decrypt: {e}")))
}

/// Generate a TOTP enrollment: fresh random secret (160 bits) plus the
/// otpauth URI consumed by authenticator apps.
///
/// Returns `(base32_secret, otpauth_uri)`.
pub fn generate_enrollment(issuer: &str, account: &str) -> Result<(String, String), AuthError> {
    let secret = Secret::generate_secret();
    let secret_bytes = secret
        .to_bytes()
        .map_err(|e| AuthError::Crypto(format!("secret bytes: {e}")))?;

    let totp = build_totp(secret_bytes, issuer, account)?;

    let base32 = secret.to_encoded().to_string();
    let uri = totp.get_url();

    Ok((base32, uri))
}

/// Decode a base32 secret back into raw bytes.
pub fn secret_bytes_from_base32(base32: &str) -> Result<Vec<u8>, AuthError> {
    Secret::Encoded(base32.to_string())
        .to_bytes()
        .map_err(|e| AuthError::Crypto(format!("secret decode: {e}")))
}

/// Group a base32 secret into blocks of four for manual entry.
pub fn format_manual_entry(base32: &str) -> String {
    base32
        .chars()
        .collect::<Vec<_>>()
        .chunks(4)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Verify a TOTP code against a raw secret at the current time,
/// tolerating one step of clock skew in either direction.
pub fn verify_code(
    secret_bytes: &[u8],
    code: &str,
    issuer: &str,
    account: &str,
) -> Result<bool, AuthError> {
    let totp = build_totp(secret_bytes.to_vec(), issuer, account)?;

    totp.check_current(code)
        .map_err(|e| AuthError::Crypto(format!("TOTP check: {e}")))
}

fn build_totp(secret_bytes: Vec<u8>, issuer: &str, account: &str) -> Result<TOTP, AuthError> {
    TOTP::new(
        Algorithm::SHA1, // RFC 6238 default
        6,               // digits
        1,               // skew (±1 step)
        30,              // step seconds
        secret_bytes,
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|e| AuthError::Crypto(format!("TOTP init: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = [42u8; 32];
        let plaintext = b"totp-secret-bytes";
        let encrypted = encrypt_secret(&key, plaintext).unwrap();
        let decrypted = decrypt_secret(&key, &encrypted).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn wrong_key_fails_decrypt() {
        let key1 = [42u8; 32];
        let key2 = [99u8; 32];
        let encrypted = encrypt_secret(&key1, b"secret").unwrap();
        assert!(decrypt_secret(&key2, &encrypted).is_err());
    }

    #[test]
    fn enrollment_produces_valid_uri() {
        let (base32, uri) = generate_enrollment("Taskforge", "alice@example.com").unwrap();
        assert!(!base32.is_empty());
        assert!(uri.starts_with("otpauth://totp/"));
        assert!(uri.contains("Taskforge"));
        assert!(uri.contains("alice"));
        assert!(uri.contains(&format!("secret={base32}")));
    }

    #[test]
    fn base32_roundtrip() {
        let (base32, _) = generate_enrollment("Taskforge", "a@b.com").unwrap();
        let bytes = secret_bytes_from_base32(&base32).unwrap();
        // 160-bit secret.
        assert_eq!(bytes.len(), 20);
    }

    #[test]
    fn manual_entry_is_grouped() {
        assert_eq!(format_manual_entry("ABCDEFGHIJ"), "ABCD EFGH IJ");
    }

    #[test]
    fn verify_code_with_valid_totp() {
        let secret = Secret::generate_secret();
        let secret_bytes = secret.to_bytes().unwrap();

        let totp = build_totp(secret_bytes.clone(), "Taskforge", "test@test.com").unwrap();
        let code = totp.generate_current().unwrap();
        assert!(verify_code(&secret_bytes, &code, "Taskforge", "test@test.com").unwrap());
    }

    #[test]
    fn skew_window_accepts_adjacent_steps() {
        let secret = Secret::generate_secret();
        let secret_bytes = secret.to_bytes().unwrap();
        let totp = build_totp(secret_bytes, "Taskforge", "test@test.com").unwrap();

        // Pinned timestamp keeps the test independent of the wall clock.
        let t = 1_700_000_000u64;
        assert!(totp.check(&totp.generate(t - 30), t));
        assert!(totp.check(&totp.generate(t + 30), t));
    }

    #[test]
    fn skew_window_rejects_two_steps_away() {
        let secret = Secret::generate_secret();
        let secret_bytes = secret.to_bytes().unwrap();
        let totp = build_totp(secret_bytes, "Taskforge", "test@test.com").unwrap();

        let t = 1_700_000_000u64;
        assert!(!totp.check(&totp.generate(t - 60), t));
        assert!(!totp.check(&totp.generate(t + 60), t));
    }

    #[test]
    fn verify_code_wrong_code() {
        let secret = Secret::generate_secret();
        let secret_bytes = secret.to_bytes().unwrap();
        assert!(!verify_code(&secret_bytes, "000000", "Taskforge", "test@test.com").unwrap());
    }
}
