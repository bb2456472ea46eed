//! Stable content hashing for signature-cache keys.

use sha2::{Digest, Sha256};

/// Hash arbitrary text to a stable hex digest, used as the `textHash`
/// component of a signature cache key.
#[must_use]
pub fn text_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Derive a stable conversation-key seed from system + first-user text, used
/// when no explicit conversation/session id is present in the request body.
#[must_use]
pub fn seed_conversation_key(system_text: &str, first_user_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(system_text.as_bytes());
    hasher.update(b"|");
    hasher.update(first_user_text.as_bytes());
    let digest = hasher.finalize();
    format!("seed-{}", &hex::encode(digest)[..16])
}

// Minimal inline hex encoder so this crate doesn't need to pull in the `hex`
// crate just for this.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        let bytes = bytes.as_ref();
        let mut out = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            out.push_str(&format!("{b:02x}"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_hash_is_deterministic() {
        assert_eq!(text_hash("hello"), text_hash("hello"));
    }

    #[test]
    fn text_hash_differs_for_different_input() {
        assert_ne!(text_hash("hello"), text_hash("world"));
    }

    #[test]
    fn seed_key_equal_for_equal_inputs() {
        assert_eq!(
            seed_conversation_key("sys", "first"),
            seed_conversation_key("sys", "first")
        );
    }

    #[test]
    fn seed_key_differs_on_first_user_text() {
        assert_ne!(
            seed_conversation_key("sys", "first"),
            seed_conversation_key("sys", "second")
        );
    }

    #[test]
    fn seed_key_has_expected_prefix_and_length() {
        let k = seed_conversation_key("a", "b");
        assert!(k.starts_with("seed-"));
        assert_eq!(k.len(), "seed-".len() + 16);
    }
}
