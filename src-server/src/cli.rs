use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Named featured-image slots for content items
#[derive(Parser)]
#[command(name = "multi-thumbnails")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// TOML settings file (falls back to $MULTI_THUMBNAILS_CONFIG)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the admin and action endpoints (default)
    Serve {
        /// Override the configured bind address
        #[arg(short, long)]
        bind: Option<std::net::SocketAddr>,
    },
    /// Print the extension points bound by the configured slots
    Slots {
        /// Emit the binding table as JSON
        #[arg(long)]
        json: bool,
    },
    /// Copy an image into the upload directory and record it as an asset
    Import {
        /// File to import
        file: PathBuf,
        /// Content item the asset is attached to
        #[arg(short, long)]
        item: Option<i64>,
    },
    /// Print a fresh hex salt for `security.salt`
    GenSalt,
}
