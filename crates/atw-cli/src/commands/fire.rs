use super::load_config;
use atw_core::{AttributeValue, Attributes};
use atw_events::Normalizer;
use atw_webhooks::{HttpTransport, OutcomeStatus, WebhookDispatcher};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Args)]
pub struct FireCommand {
    /// Path to the webhooks configuration file
    #[arg(long, short, env = "ATW_CONFIG")]
    pub config: PathBuf,

    /// Event kind to fire, e.g. player.join
    pub kind: String,

    /// Attribute values as key=value
    #[arg(value_parser = parse_attribute)]
    pub attributes: Vec<(String, String)>,

    /// Only deliver to this webhook
    #[arg(long)]
    pub target: Option<String>,

    /// Render payloads without sending anything
    #[arg(long)]
    pub dry_run: bool,

    /// How long to wait for deliveries to finish
    #[arg(long, default_value = "30")]
    pub wait_secs: u64,
}

fn parse_attribute(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    if key.is_empty() {
        return Err(format!("empty attribute name in '{}'", raw));
    }
    Ok((key.to_string(), value.to_string()))
}

impl FireCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.run())
    }

    async fn run(self) -> anyhow::Result<()> {
        let config = load_config(&self.config)?;
        let normalizer = Arc::new(Normalizer::with_defaults());
        if !normalizer.is_known_kind(&self.kind) {
            warn!("{} is not a registered event kind", self.kind);
        }

        let overrides: Attributes = self
            .attributes
            .into_iter()
            .map(|(key, value)| (key, AttributeValue::Text(value)))
            .collect();
        let event = normalizer.synthetic(&self.kind, overrides);

        let dispatcher = WebhookDispatcher::from_config(
            &config,
            normalizer,
            Arc::new(HttpTransport::new()?),
        )?;
        let mut outcomes = dispatcher.subscribe_outcomes();

        let report = dispatcher.dispatch_with_report(event, self.target.as_deref(), self.dry_run)?;
        println!();
        for line in &report {
            println!("  {}", line);
        }
        println!();

        if self.dry_run {
            println!("{}", "Dry run, nothing was sent".bright_yellow());
            return Ok(());
        }

        let expected: u64 = dispatcher
            .stats()
            .targets
            .iter()
            .map(|entry| entry.stats.enqueued)
            .sum();
        dispatcher.start()?;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(self.wait_secs);
        let mut delivered = 0;
        for _ in 0..expected {
            match tokio::time::timeout_at(deadline, outcomes.recv()).await {
                Ok(Ok(outcome)) => {
                    let line = format!(
                        "{}: {:?} after {} attempt(s)",
                        outcome.target_id, outcome.status, outcome.attempts
                    );
                    if matches!(outcome.status, OutcomeStatus::Delivered { .. }) {
                        delivered += 1;
                        println!("{} {}", "✅".bright_green(), line);
                    } else {
                        println!("{} {}", "❌".bright_red(), line.bright_red());
                    }
                }
                Ok(Err(e)) => {
                    warn!("Lost delivery outcomes: {}", e);
                    break;
                }
                Err(_) => {
                    println!(
                        "{}",
                        format!("Gave up waiting after {}s", self.wait_secs).bright_yellow()
                    );
                    break;
                }
            }
        }

        dispatcher.stop().await;
        println!();
        println!("{}/{} delivered", delivered, expected);
        Ok(())
    }
}
