use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_CONTENT_TYPE: &str = "post";

/// Admin panel ordering hint. Variants are declared in display order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Core,
    Default,
    #[default]
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Core => "core",
            Priority::Default => "default",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unvalidated registration input, as written by an integrator or read from
/// the `[[slots]]` table of the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlotDefinition {
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub slot_id: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

impl SlotDefinition {
    pub fn new(slot_id: &str, label: &str) -> Self {
        SlotDefinition {
            slot_id: Some(slot_id.to_string()),
            label: Some(label.to_string()),
            ..Default::default()
        }
    }

    pub fn content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailSlot {
    pub content_type: String,
    pub slot_id: String,
    pub label: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailAssociation {
    pub content_item_id: i64,
    pub slot_key: String,
    pub media_asset_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: i64,
    pub content_type: String,
    pub title: String,
    pub author_id: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: i64,
    pub parent_item_id: Option<i64>,
    pub file_path: String,
    pub original_name: String,
    pub mime_type: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub created_at: String,
}

impl MediaAsset {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Administrator,
    Editor,
    Author,
    Subscriber,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrator => "administrator",
            Role::Editor => "editor",
            Role::Author => "author",
            Role::Subscriber => "subscriber",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "administrator" => Some(Role::Administrator),
            "editor" => Some(Role::Editor),
            "author" => Some(Role::Author),
            "subscriber" => Some(Role::Subscriber),
            _ => None,
        }
    }

    /// Administrators and editors may edit any item.
    pub fn edits_others(&self) -> bool {
        matches!(self, Role::Administrator | Role::Editor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageSize {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

/// How an asset should be sized when rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeSpec {
    /// A size registered with the media library by name.
    Named(String),
    /// A bounding box in pixels.
    Dimensions(u32, u32),
}

impl SizeSpec {
    pub fn named(name: &str) -> Self {
        SizeSpec::Named(name.to_string())
    }

    pub fn square(side: u32) -> Self {
        SizeSpec::Dimensions(side, side)
    }

    /// `150x150` is a bounding box, anything else a registered size name.
    pub fn parse(size: &str) -> Self {
        size.split_once('x')
            .and_then(|(w, h)| Some(SizeSpec::Dimensions(w.parse().ok()?, h.parse().ok()?)))
            .unwrap_or_else(|| SizeSpec::named(size))
    }
}

/// Extra HTML attributes for rendered images, in a stable order.
pub type Attrs = BTreeMap<String, String>;

/// One entry spliced into the media picker for an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaField {
    pub key: String,
    pub label: String,
    pub html: String,
}
