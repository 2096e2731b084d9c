use crate::models::{ImageSize, SlotDefinition};
use crate::render::DEFAULT_PREVIEW_SIZE;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub const CONFIG_ENV: &str = "MULTI_THUMBNAILS_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub security: SecuritySettings,
    #[serde(default)]
    pub media: MediaSettings,
    #[serde(default)]
    pub slots: Vec<SlotDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSettings {
    /// SQLite file; `:memory:` keeps everything in process.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("thumbnails.db")
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            upload_dir: default_upload_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecuritySettings {
    /// Secret the token MAC key is derived from. Unset: random per process.
    #[serde(default)]
    pub secret: Option<String>,
    /// Hex-encoded PBKDF2 salt; required when `secret` is set.
    #[serde(default)]
    pub salt: Option<String>,
    #[serde(default = "default_nonce_lifetime")]
    pub nonce_lifetime_secs: i64,
}

fn default_nonce_lifetime() -> i64 {
    24 * 3600
}

impl Default for SecuritySettings {
    fn default() -> Self {
        SecuritySettings {
            secret: None,
            salt: None,
            nonce_lifetime_secs: default_nonce_lifetime(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MediaSettings {
    /// Media selection surface opened by the "Set ..." links.
    #[serde(default = "default_upload_url")]
    pub upload_url: String,
    /// URL prefix the upload directory is served under.
    #[serde(default = "default_asset_base_url")]
    pub asset_base_url: String,
    /// Side of the square admin preview box.
    #[serde(default = "default_preview_size")]
    pub preview_size: u32,
    #[serde(default)]
    pub image_sizes: Vec<ImageSize>,
    /// Template size per slot, e.g. `"post-hero" = "600x300"` or `"medium"`.
    #[serde(default)]
    pub template_sizes: BTreeMap<String, String>,
}

fn default_upload_url() -> String {
    "/media-upload".to_string()
}

fn default_asset_base_url() -> String {
    "/uploads".to_string()
}

fn default_preview_size() -> u32 {
    DEFAULT_PREVIEW_SIZE
}

impl Default for MediaSettings {
    fn default() -> Self {
        MediaSettings {
            upload_url: default_upload_url(),
            asset_base_url: default_asset_base_url(),
            preview_size: default_preview_size(),
            image_sizes: Vec::new(),
            template_sizes: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_toml(&text)?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Explicit path, then `$MULTI_THUMBNAILS_CONFIG`, then defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => match std::env::var_os(CONFIG_ENV) {
                Some(p) => Self::load(Path::new(&p)),
                None => {
                    info!("No config file given; using defaults");
                    Ok(Self::default())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;

    #[test]
    fn empty_file_gives_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings.server.bind.port(), 8080);
        assert_eq!(settings.database.path, PathBuf::from("thumbnails.db"));
        assert_eq!(settings.security.nonce_lifetime_secs, 86_400);
        assert_eq!(settings.media.preview_size, 266);
        assert!(settings.slots.is_empty());
    }

    #[test]
    fn parses_slots_and_sizes() {
        let settings = Settings::from_toml(
            r#"
            [server]
            bind = "0.0.0.0:9000"

            [media]
            preview_size = 200

            [[media.image_sizes]]
            name = "post-hero-thumbnail"
            width = 800
            height = 400

            [media.template_sizes]
            "post-hero" = "600x300"

            [[slots]]
            slot_id = "hero"
            label = "Hero Image"

            [[slots]]
            content_type = "page"
            slot_id = "banner"
            label = "Banner"
            priority = "high"
            "#,
        )
        .unwrap();
        assert_eq!(settings.server.bind.port(), 9000);
        assert_eq!(settings.media.preview_size, 200);
        assert_eq!(settings.media.image_sizes[0].width, 800);
        assert_eq!(settings.media.template_sizes["post-hero"], "600x300");
        assert_eq!(settings.slots.len(), 2);
        assert_eq!(settings.slots[0].content_type, None);
        assert_eq!(settings.slots[1].priority, Some(Priority::High));
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(Settings::from_toml("[server]\nport = 1\n").is_err());
        assert!(Settings::from_toml("[[slots]]\nslot_id = \"a\"\nlabel = \"A\"\ncolour = \"red\"\n").is_err());
        assert!(Settings::from_toml("[[slots]]\nslot_id = \"a\"\npriority = \"urgent\"\n").is_err());
    }
}
