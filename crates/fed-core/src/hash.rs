//! Content hashing for query deduplication.
//!
//! Query bodies are stored once per distinct hash; every `Query` row refers
//! to its body through the hash-addressed `query_contents` table.

use sha3::{Digest, Sha3_256};

use crate::errors::CoreError;

/// Computes the content hash of serialized query bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryHashCalculator;

impl QueryHashCalculator {
    /// SHA3-256 over the UTF-8 bytes of `body`, as lowercase hex.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if `body` is `None` or empty.
    /// A missing body is a caller bug, not something to hash silently.
    pub fn calculate_hash(&self, body: Option<&str>) -> Result<String, CoreError> {
        let body = body.filter(|b| !b.is_empty()).ok_or_else(|| CoreError::InvalidArgument {
            name: "query_body".to_string(),
            reason: "query body must be present to calculate its hash".to_string(),
        })?;
        Ok(hex::encode(Sha3_256::digest(body.as_bytes())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn known_digest() {
        // SHA3-256("abc") from FIPS 202 test vectors.
        let hash = QueryHashCalculator.calculate_hash(Some("abc")).unwrap();
        assert_eq!(
            hash,
            "3a985da74fe225b2045c172d6bd390bd855f086e3e9d525b46bfe24511431532"
        );
    }

    #[test]
    fn identical_bodies_hash_identically() {
        let calc = QueryHashCalculator;
        let body = r#"{"version":"http://to_be_decided.com/draft-1/schema#"}"#;
        assert_eq!(
            calc.calculate_hash(Some(body)).unwrap(),
            calc.calculate_hash(Some(body)).unwrap()
        );
        assert_ne!(
            calc.calculate_hash(Some(body)).unwrap(),
            calc.calculate_hash(Some("{}")).unwrap()
        );
    }

    #[test]
    fn missing_body_is_invalid_argument() {
        let err = QueryHashCalculator.calculate_hash(None).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument { .. }));
    }

    #[test]
    fn empty_body_is_invalid_argument() {
        let err = QueryHashCalculator.calculate_hash(Some("")).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument { .. }));
    }

    #[test]
    fn output_is_lowercase_hex_of_expected_length() {
        let hash = QueryHashCalculator.calculate_hash(Some("x")).unwrap();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }
}
