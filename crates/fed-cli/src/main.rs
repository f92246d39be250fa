use clap::Parser;

mod cli;
mod commands;
mod output;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("fedq error: {error:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;

    let flags = cli.global_flags();
    let config = fed_config::FedConfig::load_with_dotenv()?;

    match &cli.command {
        cli::Commands::Submit(args) => commands::submit::handle(args, &flags, &config).await,
        cli::Commands::Hash(args) => commands::hash::handle(args, &flags),
        cli::Commands::Config => commands::config::handle(&flags, &config),
    }
}

fn init_tracing(quiet: bool, verbose: bool) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("FEDQ_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
