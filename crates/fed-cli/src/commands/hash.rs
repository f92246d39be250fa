use fed_core::hash::QueryHashCalculator;
use serde::Serialize;

use crate::cli::{GlobalFlags, HashArgs};
use crate::output::output;

#[derive(Debug, Serialize)]
struct HashResponse {
    file: String,
    hash: String,
}

/// Print the hash a query file is deduplicated under.
pub fn handle(args: &HashArgs, flags: &GlobalFlags) -> anyhow::Result<()> {
    let query = super::read_query(&args.file)?;
    let body = query.to_body()?;
    let hash = QueryHashCalculator.calculate_hash(Some(body.as_str()))?;
    output(
        &HashResponse {
            file: args.file.display().to_string(),
            hash,
        },
        flags.format,
    )
}
