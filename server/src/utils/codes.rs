//! Redemption codes: bearer credentials printed on tickets.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

const CODE_BYTES: usize = 32;

/// Length of an encoded code (32 bytes, unpadded base64).
pub const CODE_LEN: usize = 43;

pub fn generate_redemption_code() -> String {
    let mut bytes = [0u8; CODE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Trims a scanned or typed code and returns it if it has the shape of an
/// issued code. Every lookup by code goes through here.
pub fn normalize(code: &str) -> Option<&str> {
    let code = code.trim();
    is_well_formed(code).then_some(code)
}

fn is_well_formed(code: &str) -> bool {
    code.len() == CODE_LEN
        && code
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_codes_are_well_formed_and_distinct() {
        let codes: HashSet<String> = (0..1000).map(|_| generate_redemption_code()).collect();
        assert_eq!(codes.len(), 1000);
        assert!(codes.iter().all(|code| is_well_formed(code)));
    }

    #[test]
    fn malformed_codes_are_rejected() {
        assert!(!is_well_formed(""));
        assert!(!is_well_formed("short"));
        assert!(!is_well_formed(&"a".repeat(CODE_LEN + 1)));
        assert!(!is_well_formed(&format!("{}=", "a".repeat(CODE_LEN - 1))));
    }

    #[test]
    fn normalize_strips_surrounding_whitespace() {
        let code = generate_redemption_code();
        assert_eq!(normalize(&format!("  {}\n", code)), Some(code.as_str()));
        assert_eq!(normalize("   "), None);
        assert_eq!(normalize(&format!("{} x", code)), None);
    }
}
