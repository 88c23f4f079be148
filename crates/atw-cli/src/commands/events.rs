use atw_events::Normalizer;
use clap::Args;
use colored::Colorize;

#[derive(Args)]
pub struct EventsCommand {
    /// Print the catalog as markdown
    #[arg(long)]
    pub markdown: bool,
}

impl EventsCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let normalizer = Normalizer::with_defaults();
        if self.markdown {
            print!("{}", normalizer.catalog_markdown());
            return Ok(());
        }

        for definition in normalizer.definitions() {
            println!(
                "{} {} {}",
                definition.kind.bright_white().bold(),
                format!("({})", definition.category).bright_black(),
                definition.description
            );
            for (name, kind) in definition.attributes {
                println!("    {} {}", name.bright_cyan(), kind);
            }
        }
        Ok(())
    }
}
