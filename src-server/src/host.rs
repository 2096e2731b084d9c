//! Interfaces to the host platform. The core modules only ever talk to the
//! host through these traits; `database` and `security` provide the
//! reference implementations.

use crate::models::{Attrs, ImageSize, MediaAsset, SizeSpec, ThumbnailSlot};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("metadata write rejected for item {item_id} key {key}: {reason}")]
    WriteRejected {
        item_id: i64,
        key: String,
        reason: String,
    },
    #[error("metadata store unavailable: {0}")]
    Unavailable(String),
}

/// Per-item key/value metadata.
pub trait MetadataStore {
    fn get_meta(&self, item_id: i64, key: &str) -> Result<Option<String>, StoreError>;
    fn set_meta(&self, item_id: i64, key: &str, value: &str) -> Result<(), StoreError>;
    /// Removes the key. Removing a missing key is not an error.
    fn delete_meta(&self, item_id: i64, key: &str) -> Result<(), StoreError>;
}

pub trait MediaLibrary {
    fn resolve_asset(&self, asset_id: i64) -> Option<MediaAsset>;
    /// Returns an empty string when the asset cannot be rendered as an image.
    fn render_asset_markup(&self, asset_id: i64, size: &SizeSpec, attrs: &Attrs) -> String;
    fn registered_size(&self, name: &str) -> Option<ImageSize>;
    /// URL of the media selection surface for an item.
    fn upload_surface_url(&self, item_id: i64) -> String;
}

pub trait PermissionChecker {
    fn can_edit(&self, user_id: i64, item_id: i64) -> bool;
}

pub trait TokenIssuer {
    fn mint(&self, scope: &str) -> String;
    fn verify(&self, token: &str, scope: &str) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelBinding {
    pub panel_id: String,
    pub label: String,
    pub content_type: String,
    pub placement: Placement,
    pub slot: ThumbnailSlot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Side,
    Normal,
}

impl Placement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Placement::Side => "side",
            Placement::Normal => "normal",
        }
    }
}

/// Receives the extension points of registered slots at startup.
pub trait ExtensionHost {
    fn add_panel(&mut self, panel: PanelBinding);
    fn add_media_fields(&mut self, slot: &ThumbnailSlot);
    fn add_action(&mut self, action: &str, slot: &ThumbnailSlot);
}

/// Everything a request needs from the host, passed explicitly.
#[derive(Clone, Copy)]
pub struct HostServices<'a> {
    pub store: &'a dyn MetadataStore,
    pub media: &'a dyn MediaLibrary,
    pub permissions: &'a dyn PermissionChecker,
    pub tokens: &'a dyn TokenIssuer,
}
