use fed_config::FedConfig;

use crate::cli::GlobalFlags;
use crate::output::output;

pub fn handle(flags: &GlobalFlags, config: &FedConfig) -> anyhow::Result<()> {
    output(&config.redacted(), flags.format)
}
