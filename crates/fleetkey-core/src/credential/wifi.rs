use std::sync::LazyLock;

use regex::Regex;

const SSID_MAX_LEN: usize = 32;
const PASSWORD_MIN_LEN: usize = 8;
const PASSWORD_MAX_LEN: usize = 63;

static DOMAIN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid regex")
});

/// Check WiFi network credentials. Returns one message per problem; an
/// empty list means valid. The domain is optional.
pub fn validate_wifi(ssid: &str, password: &str, domain: &str) -> Vec<String> {
    let mut errors = Vec::new();

    if ssid.is_empty() {
        errors.push("WiFi SSID not found".to_owned());
    } else if ssid.chars().count() > SSID_MAX_LEN {
        errors.push(format!("WiFi SSID too long (max {SSID_MAX_LEN} characters)"));
    }

    let password_len = password.chars().count();
    if password.is_empty() {
        errors.push("WiFi password not found".to_owned());
    } else if !(PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&password_len) {
        errors.push(format!(
            "WiFi password length invalid (must be {PASSWORD_MIN_LEN}-{PASSWORD_MAX_LEN} characters)"
        ));
    }

    if !domain.is_empty() && !DOMAIN_PATTERN.is_match(domain) {
        errors.push("WiFi domain format may be invalid".to_owned());
    }

    errors
}
