//! Per-query tokenization of site names.
//!
//! Non-privileged callers see a stable pseudonym instead of the real site
//! name. The token is deterministic for a `(query_id, site_name)` pair so
//! repeated polls render the same rows, and differs between queries so two
//! result sets cannot be joined on site.

use sha3::{Digest, Sha3_256};

/// Hex characters kept from the digest.
///
/// With roughly 2000 possible sites and a 16^10 token space, the birthday
/// bound puts the chance of any collision within one query near 2e-6.
pub const SITE_TOKEN_LENGTH: usize = 10;

/// Derives site-name tokens for result snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryResultObfuscator;

impl QueryResultObfuscator {
    /// Token for `site_name` within the result set of `query_id`.
    ///
    /// The seed is the raw digest of the query id followed by the raw digest
    /// of the site name; the site name is then hashed under that seed.
    #[must_use]
    pub fn tokenize_site_name(&self, query_id: &str, site_name: &str) -> String {
        let query_digest = Sha3_256::digest(query_id.as_bytes());
        let site_digest = Sha3_256::digest(site_name.as_bytes());

        let mut hasher = Sha3_256::new();
        hasher.update(query_digest);
        hasher.update(site_digest);
        hasher.update(site_name.as_bytes());

        let mut token = hex::encode(hasher.finalize());
        token.truncate(SITE_TOKEN_LENGTH);
        token
    }
}
