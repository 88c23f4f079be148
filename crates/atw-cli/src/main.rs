//! AllTheWebhooks CLI
//!
//! A stand-in host that feeds game events to the dispatch pipeline, plus the
//! administrative commands: validate a configuration, fire a test event and
//! list the event catalog.

mod commands;

use clap::{Parser, Subcommand};
use commands::{EventsCommand, FireCommand, RunCommand, ValidateCommand};
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "ATW_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(long, default_value = "compact", env = "ATW_LOG_FORMAT", global = true)]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dispatch newline-delimited JSON host events read from stdin
    Run(RunCommand),
    /// Check a configuration file and report warnings
    Validate(ValidateCommand),
    /// Fire a synthetic event through the pipeline
    Fire(FireCommand),
    /// List the events that can be subscribed to
    Events(EventsCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // If RUST_LOG is set, use it directly; otherwise use our default filter
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()?
    } else {
        tracing_subscriber::EnvFilter::try_new(format!(
            "atw_cli={level},\
             atw_core={level},\
             atw_config={level},\
             atw_events={level},\
             atw_webhooks={level},\
             h2=warn,\
             hyper=warn,\
             reqwest=warn,\
             rustls=warn",
            level = cli.log_level
        ))?
    };

    let fmt_layer = match cli.log_format.as_str() {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(std::io::stderr)
            .boxed(),
        _ => tracing_subscriber::fmt::layer() // "compact" or any other value
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run(run_cmd) => run_cmd.execute(),
        Commands::Validate(validate_cmd) => validate_cmd.execute(),
        Commands::Fire(fire_cmd) => fire_cmd.execute(),
        Commands::Events(events_cmd) => events_cmd.execute(),
    }
}
