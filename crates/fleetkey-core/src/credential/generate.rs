use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use rand::rngs::OsRng;

const API_KEY_BYTES: usize = 32;
const OTA_PASSWORD_BYTES: usize = 16;
const FALLBACK_PASSWORD_LEN: usize = 12;

/// 32 bytes from the OS RNG, padded base64. Always 44 characters ending in `=`.
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; API_KEY_BYTES];
    OsRng.fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

/// 16 bytes from the OS RNG, lowercase hex. Always 32 characters.
pub fn generate_ota_password() -> String {
    let mut bytes = [0u8; OTA_PASSWORD_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Exactly 12 alphanumeric characters.
///
/// Base64 output is drawn repeatedly and stripped of `+`, `/` and `=` until
/// enough characters remain.
pub fn generate_fallback_password() -> String {
    let mut password = String::with_capacity(FALLBACK_PASSWORD_LEN);
    while password.len() < FALLBACK_PASSWORD_LEN {
        let mut bytes = [0u8; OTA_PASSWORD_BYTES];
        OsRng.fill_bytes(&mut bytes);
        password.extend(
            STANDARD
                .encode(bytes)
                .chars()
                .filter(char::is_ascii_alphanumeric),
        );
    }
    password.truncate(FALLBACK_PASSWORD_LEN);
    password
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::credential::Blocklist;
    use crate::credential::CredentialKind;

    #[test]
    fn api_keys_decode_to_32_bytes() {
        let blocklist = Blocklist::default();
        for _ in 0..200 {
            let key = generate_api_key();
            assert_eq!(key.len(), 44);
            assert!(key.ends_with('='));
            assert_eq!(STANDARD.decode(&key).unwrap().len(), 32);
            assert!(!blocklist.contains(CredentialKind::ApiKey, &key));
        }
    }

    #[test]
    fn ota_passwords_are_32_hex_chars() {
        let blocklist = Blocklist::default();
        for _ in 0..200 {
            let pw = generate_ota_password();
            assert_eq!(pw.len(), 32);
            assert!(pw.chars().all(|c| c.is_ascii_hexdigit()));
            assert!(!blocklist.contains(CredentialKind::OtaPassword, &pw));
        }
    }

    #[test]
    fn fallback_passwords_are_12_alphanumerics() {
        let blocklist = Blocklist::default();
        for _ in 0..500 {
            let pw = generate_fallback_password();
            assert_eq!(pw.len(), 12);
            assert!(pw.chars().all(|c| c.is_ascii_alphanumeric()), "{pw}");
            assert!(!blocklist.contains(CredentialKind::FallbackPassword, &pw));
        }
    }

    #[test]
    fn values_differ_between_calls() {
        assert_ne!(generate_api_key(), generate_api_key());
        assert_ne!(generate_ota_password(), generate_ota_password());
        assert_ne!(generate_fallback_password(), generate_fallback_password());
    }
}
