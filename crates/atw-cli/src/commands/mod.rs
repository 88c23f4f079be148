pub mod events;
pub mod fire;
pub mod run;
pub mod validate;

pub use events::EventsCommand;
pub use fire::FireCommand;
pub use run::RunCommand;
pub use validate::ValidateCommand;

use anyhow::Context;
use atw_config::WebhooksConfig;
use std::path::Path;

pub(crate) fn load_config(path: &Path) -> anyhow::Result<WebhooksConfig> {
    WebhooksConfig::load_from_path(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}
