use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Top-level CLI parser for the `fedq` binary.
#[derive(Debug, Parser)]
#[command(name = "fedq", version, about = "Federated feasibility queries")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: json, table
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    #[must_use]
    pub const fn global_flags(&self) -> GlobalFlags {
        GlobalFlags {
            format: self.format,
            quiet: self.quiet,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
}

/// Global flags passed to command handlers.
#[derive(Clone, Copy, Debug)]
pub struct GlobalFlags {
    pub format: OutputFormat,
    pub quiet: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Enqueue a structured query, dispatch it, and wait for site results
    Submit(SubmitArgs),
    /// Print the content hash of a structured query file
    Hash(HashArgs),
    /// Print the resolved configuration with secrets redacted
    Config,
}

#[derive(Debug, Args)]
pub struct SubmitArgs {
    /// Structured query JSON file
    pub file: PathBuf,

    /// Seconds to wait for site results
    #[arg(short, long, default_value_t = 30)]
    pub wait: u64,

    /// Replace site names with per-query tokens
    #[arg(long)]
    pub obfuscate: bool,

    /// Creator recorded with the query
    #[arg(long, default_value = "fedq")]
    pub created_by: String,

    /// Precompiled CQL library sent to brokers that need CQL
    #[arg(long)]
    pub cql: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct HashArgs {
    /// Structured query JSON file
    pub file: PathBuf,
}
