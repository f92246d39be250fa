//! ID prefix constants.
//!
//! Every durable entity ID is `<prefix>-<8 hex chars>`, generated by the
//! database layer (see `fed_db::FedDb::generate_id`).

pub const PREFIX_QUERY: &str = "qry";
pub const PREFIX_QUERY_CONTENT: &str = "qct";
pub const PREFIX_SITE: &str = "sit";
pub const PREFIX_RESULT: &str = "res";

/// Every known prefix, used by tests and ID validation.
pub const ALL_PREFIXES: &[&str] = &[
    PREFIX_QUERY,
    PREFIX_QUERY_CONTENT,
    PREFIX_SITE,
    PREFIX_RESULT,
];

/// Check whether `id` looks like `<known prefix>-<8 hex chars>`.
#[must_use]
pub fn is_valid_id(id: &str) -> bool {
    let Some((prefix, hex_part)) = id.split_once('-') else {
        return false;
    };
    ALL_PREFIXES.contains(&prefix)
        && hex_part.len() == 8
        && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}
