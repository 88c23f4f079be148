use super::load_config;
use atw_events::{HostEvent, Normalizer};
use atw_webhooks::{HttpTransport, WebhookDispatcher};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Args)]
pub struct RunCommand {
    /// Path to the webhooks configuration file
    #[arg(long, short, env = "ATW_CONFIG")]
    pub config: PathBuf,
}

impl RunCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.run())
    }

    async fn run(self) -> anyhow::Result<()> {
        let config = load_config(&self.config)?;
        let dispatcher = Arc::new(WebhookDispatcher::from_config(
            &config,
            Arc::new(Normalizer::with_defaults()),
            Arc::new(HttpTransport::new()?),
        )?);
        dispatcher.start()?;

        let reloader = spawn_reload_on_hangup(dispatcher.clone(), self.config.clone())?;

        info!("Reading host events from stdin");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) => handle_line(&dispatcher, &line),
                    None => {
                        info!("End of input");
                        break;
                    }
                },
                result = &mut ctrl_c => {
                    result?;
                    info!("Received Ctrl-C, shutting down");
                    break;
                }
            }
        }

        if let Some(reloader) = reloader {
            reloader.abort();
        }
        dispatcher.stop().await;

        let summary = serde_json::json!({
            "stats": dispatcher.stats(),
            "health": dispatcher.health(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        Ok(())
    }
}

fn handle_line(dispatcher: &WebhookDispatcher, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    match serde_json::from_str::<HostEvent>(line) {
        Ok(event) => {
            debug!("Received host event {}", event.host_type());
            dispatcher.handle_event(&event);
        }
        Err(e) => warn!("Skipping malformed event line: {}", e),
    }
}

#[cfg(unix)]
fn spawn_reload_on_hangup(
    dispatcher: Arc<WebhookDispatcher>,
    path: PathBuf,
) -> anyhow::Result<Option<JoinHandle<()>>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    Ok(Some(tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!("Received SIGHUP, reloading {}", path.display());
            let reloaded = load_config(&path)
                .and_then(|config| dispatcher.reload_from_config(&config).map_err(Into::into));
            match reloaded {
                Ok(warnings) => info!(
                    "✅ Configuration reloaded with {} warning(s)",
                    warnings.len()
                ),
                Err(e) => error!("Reload failed, keeping previous configuration: {:#}", e),
            }
        }
    })))
}

#[cfg(not(unix))]
fn spawn_reload_on_hangup(
    _dispatcher: Arc<WebhookDispatcher>,
    _path: PathBuf,
) -> anyhow::Result<Option<JoinHandle<()>>> {
    Ok(None)
}
