mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use multi_thumbnails_lib::config::Settings;
use multi_thumbnails_lib::security::generate_salt;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "multi_thumbnails_lib=info,multi_thumbnails=info,tower_http=info";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::resolve(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Serve { bind: None }) {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                settings.server.bind = bind;
            }
            multi_thumbnails_lib::run(settings).await
        }
        Commands::Slots { json } => {
            let registry = multi_thumbnails_lib::build_registry(&settings)?;
            if json {
                println!("{}", serde_json::to_string_pretty(registry.bindings())?);
                return Ok(());
            }
            for binding in registry.bindings() {
                println!(
                    "{:<16} {:<32} {}/{} #{}",
                    binding.point.as_str(),
                    binding.name,
                    binding.content_type,
                    binding.slot_id,
                    binding.activation
                );
            }
            Ok(())
        }
        Commands::Import { file, item } => {
            let db = multi_thumbnails_lib::open_database(&settings)?;
            let asset = db.import_asset(&file, item)?;
            println!("{}\t{}\t{}", asset.id, asset.mime_type, asset.file_path);
            Ok(())
        }
        Commands::GenSalt => {
            println!("{}", hex::encode(generate_salt()));
            Ok(())
        }
    }
}
