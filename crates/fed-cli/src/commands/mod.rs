pub mod config;
pub mod hash;
pub mod submit;

use std::path::Path;

use anyhow::Context;
use fed_core::entities::StructuredQuery;

/// Read and parse a structured query file.
fn read_query(path: &Path) -> anyhow::Result<StructuredQuery> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read query file {}", path.display()))?;
    StructuredQuery::from_body(&body)
        .with_context(|| format!("query file {} is not valid JSON", path.display()))
}
