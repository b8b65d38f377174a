//! SHA-256 fingerprints

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of raw bytes
pub fn sha256_hex(bytes: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(bytes.as_ref()))
}

/// Incremental hasher over a sequence of fields
///
/// Each field is length-prefixed so `("ab", "c")` and `("a", "bc")` differ.
pub struct Fingerprinter {
    hasher: Sha256,
}

impl Fingerprinter {
    pub fn new(domain: &str) -> Self {
        let mut fp = Self {
            hasher: Sha256::new(),
        };
        fp.field(domain);
        fp
    }

    pub fn field(&mut self, value: &str) -> &mut Self {
        self.hasher.update((value.len() as u64).to_le_bytes());
        self.hasher.update(value.as_bytes());
        self
    }

    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_known_value() {
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_fields_are_delimited() {
        let mut a = Fingerprinter::new("t");
        a.field("ab").field("c");
        let mut b = Fingerprinter::new("t");
        b.field("a").field("bc");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn test_domain_separates() {
        let mut a = Fingerprinter::new("exports");
        a.field("x");
        let mut b = Fingerprinter::new("deps");
        b.field("x");
        assert_ne!(a.finish(), b.finish());
    }
}
