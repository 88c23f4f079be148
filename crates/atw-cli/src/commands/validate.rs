use super::load_config;
use atw_events::Normalizer;
use atw_webhooks::RegistrySnapshot;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use tracing::debug;

#[derive(Args)]
pub struct ValidateCommand {
    /// Path to the webhooks configuration file
    #[arg(long, short, env = "ATW_CONFIG")]
    pub config: PathBuf,

    /// Treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

impl ValidateCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        debug!("Validating {}", self.config.display());
        let config = load_config(&self.config)?;
        let snapshot = RegistrySnapshot::build(&config, &Normalizer::with_defaults())?;

        println!();
        for target in snapshot.targets() {
            println!(
                "{} {} {}",
                "•".bright_green(),
                target.id().bright_white().bold(),
                target.masked_url().bright_cyan()
            );
            println!("    events: {}", target.event_kinds().join(", "));
            println!("    template: {}", target.template().source());
        }
        if snapshot.targets().is_empty() {
            println!("{}", "No webhooks configured".bright_yellow());
        }

        let warnings = snapshot.warnings();
        if !warnings.is_empty() {
            println!();
            for warning in warnings {
                println!("{} {}", "⚠️ ".bright_yellow(), warning);
            }
        }
        println!();

        if self.strict && !warnings.is_empty() {
            anyhow::bail!("{} warning(s) in strict mode", warnings.len());
        }
        println!(
            "{}",
            format!(
                "✅ Configuration is valid ({} webhook(s))",
                snapshot.targets().len()
            )
            .bright_green()
        );
        Ok(())
    }
}
