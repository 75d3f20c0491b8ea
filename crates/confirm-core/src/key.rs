use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;

use crate::error::{CoreError, Result};

/// Number of random bytes behind every confirmation key.
pub const KEY_BYTES: usize = 24;

/// Generates a fresh URL-safe confirmation key (24 random bytes, base64url).
pub fn generate_key() -> String {
    let mut bytes = [0u8; KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Checks that a key has the shape produced by [`generate_key`].
pub fn validate_key(key: &str) -> Result<()> {
    match URL_SAFE_NO_PAD.decode(key) {
        Ok(bytes) if bytes.len() == KEY_BYTES => Ok(()),
        _ => Err(CoreError::invalid_key(key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_keys_are_url_safe_and_valid() {
        let key = generate_key();
        assert_eq!(key.len(), 32);
        assert!(
            key.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert!(validate_key(&key).is_ok());
    }

    #[test]
    fn generated_keys_do_not_repeat() {
        let keys: HashSet<String> = (0..1000).map(|_| generate_key()).collect();
        assert_eq!(keys.len(), 1000);
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(validate_key("").is_err());
        assert!(validate_key("short").is_err());
        assert!(validate_key("not/a+valid=key-because-of-charset!").is_err());
    }
}
