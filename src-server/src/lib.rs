pub mod actions;
pub mod config;
pub mod database;
pub mod host;
pub mod models;
pub mod registry;
pub mod render;
pub mod security;
pub mod server;
pub mod state;
pub mod store;
pub mod thumbnails;

use crate::config::{ConfigError, Settings};
use crate::database::{ContentDatabase, DbError};
use crate::registry::{RegistrationError, SlotRegistry};
use crate::render::Renderer;
use crate::security::{NonceIssuer, SecurityError};
use crate::state::AppState;
use crate::thumbnails::SlotTemplateSizes;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Security(#[from] SecurityError),
    #[error("slot registration failed: {0}")]
    Registration(#[from] RegistrationError),
}

/// Registers the configured slots. Any rejected definition aborts startup.
pub fn build_registry(settings: &Settings) -> Result<SlotRegistry, StartupError> {
    let mut registry = SlotRegistry::new();
    for definition in &settings.slots {
        registry.register(definition.clone())?;
    }
    Ok(registry)
}

/// Opens the configured database with its URLs and image sizes applied.
pub fn open_database(settings: &Settings) -> Result<ContentDatabase, StartupError> {
    let db_settings = &settings.database;
    let db = if db_settings.path == Path::new(":memory:") {
        ContentDatabase::open_in_memory(&db_settings.upload_dir)?
    } else {
        ContentDatabase::open(&db_settings.path, &db_settings.upload_dir)?
    };
    let mut db = db.with_urls(&settings.media.asset_base_url, &settings.media.upload_url);
    for size in &settings.media.image_sizes {
        db.add_image_size(size.clone());
    }
    Ok(db)
}

pub fn build_state(settings: &Settings) -> Result<AppState, StartupError> {
    let db = open_database(settings)?;
    let registry = build_registry(settings)?;
    let tokens = NonceIssuer::from_secret(
        settings.security.secret.as_deref(),
        settings.security.salt.as_deref(),
        settings.security.nonce_lifetime_secs,
    )?;
    let renderer = Renderer::new(settings.media.preview_size);

    info!("{} thumbnail slot(s) registered", registry.slots().len());
    let template_sizes = SlotTemplateSizes::from_config(&settings.media.template_sizes);
    Ok(AppState::new(db, registry, tokens, renderer).with_template_sizes(template_sizes))
}

pub async fn run(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let state = build_state(&settings)?;
    server::serve(state, settings.server.bind).await
}
