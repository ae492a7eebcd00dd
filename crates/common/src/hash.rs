// Content-addressed hashing for breadcrumbs and chunk sets.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest.
pub type ContentHash = String;

/// Compute the SHA-256 hash of the given bytes, returned as a lowercase hex string.
pub fn sha256_hex(content: &[u8]) -> ContentHash {
    let digest = Sha256::digest(content);
    hex_encode(&digest)
}

/// Hash a sequence of fields so that `["ab", "c"]` and `["a", "bc"]` differ.
pub fn sha256_fields<'a>(fields: impl IntoIterator<Item = &'a str>) -> ContentHash {
    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_known_input() {
        assert_eq!(
            sha256_hex(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn field_hash_is_boundary_sensitive() {
        assert_ne!(sha256_fields(["ab", "c"]), sha256_fields(["a", "bc"]));
        assert_eq!(sha256_fields(["a", "b"]), sha256_fields(["a", "b"]));
    }
}
