use crate::host::{MediaLibrary, TokenIssuer};
use crate::models::{Attrs, MediaField, SizeSpec, ThumbnailSlot};
use crate::registry::{action_name, image_size_name, nonce_scope};

pub const DEFAULT_PREVIEW_SIZE: u32 = 266;

/// Builds the admin markup for slots. Holds no per-request state; every call
/// re-resolves the asset and mints new tokens.
#[derive(Debug, Clone)]
pub struct Renderer {
    preview_size: u32,
}

impl Default for Renderer {
    fn default() -> Self {
        Renderer::new(DEFAULT_PREVIEW_SIZE)
    }
}

impl Renderer {
    pub fn new(preview_size: u32) -> Self {
        Renderer { preview_size }
    }

    /// Admin panel body for one slot on one item.
    pub fn render_panel(
        &self,
        slot: &ThumbnailSlot,
        association: Option<i64>,
        item_id: i64,
        media: &dyn MediaLibrary,
        tokens: &dyn TokenIssuer,
    ) -> String {
        let preview = association.and_then(|asset_id| self.preview(slot, asset_id, media));

        let Some(preview_html) = preview else {
            let label = escape_html(&format!("Set {}", slot.label));
            return set_link(slot, item_id, media, &label);
        };

        let nonce = tokens.mint(&nonce_scope(&slot.content_type, &slot.slot_id, item_id));
        let mut out = set_link(slot, item_id, media, &preview_html);
        out.push_str(&format!(
            r##"<p class="hide-if-no-js"><a href="#" id="remove-{ct}-{id}-thumbnail" class="remove-thumbnail"{data} data-asset-id="-1" data-nonce="{nonce}">{text}</a></p>"##,
            ct = escape_html(&slot.content_type),
            id = escape_html(&slot.slot_id),
            data = data_attrs(slot, item_id),
            nonce = escape_html(&nonce),
            text = escape_html(&format!("Remove {}", slot.label)),
        ));
        out
    }

    /// The "Set as ..." entry spliced into the media picker for an asset.
    pub fn render_media_field(
        &self,
        slot: &ThumbnailSlot,
        asset_id: i64,
        calling_item_id: i64,
        tokens: &dyn TokenIssuer,
    ) -> MediaField {
        let nonce = tokens.mint(&nonce_scope(
            &slot.content_type,
            &slot.slot_id,
            calling_item_id,
        ));
        let html = format!(
            r##"<a id="{ct}-{id}-thumbnail-{asset_id}" class="{id}-thumbnail" href="#"{data} data-asset-id="{asset_id}" data-nonce="{nonce}">{text}</a>"##,
            ct = escape_html(&slot.content_type),
            id = escape_html(&slot.slot_id),
            data = data_attrs(slot, calling_item_id),
            nonce = escape_html(&nonce),
            text = escape_html(&format!("Set as {}", slot.label)),
        );
        MediaField {
            key: image_size_name(&slot.content_type, &slot.slot_id),
            label: slot.label.clone(),
            html,
        }
    }

    /// Preview image markup, or `None` when the asset no longer resolves or
    /// cannot be rendered.
    fn preview(&self, slot: &ThumbnailSlot, asset_id: i64, media: &dyn MediaLibrary) -> Option<String> {
        media.resolve_asset(asset_id)?;
        let html = media.render_asset_markup(asset_id, &self.preview_size(slot, media), &Attrs::new());
        if html.is_empty() {
            None
        } else {
            Some(html)
        }
    }

    /// Slot-specific host size when registered, otherwise a square box.
    pub fn preview_size(&self, slot: &ThumbnailSlot, media: &dyn MediaLibrary) -> SizeSpec {
        let name = image_size_name(&slot.content_type, &slot.slot_id);
        match media.registered_size(&name) {
            Some(size) => SizeSpec::Named(size.name),
            None => SizeSpec::square(self.preview_size),
        }
    }
}

fn set_link(slot: &ThumbnailSlot, item_id: i64, media: &dyn MediaLibrary, inner: &str) -> String {
    format!(
        r#"<p class="hide-if-no-js"><a title="{title}" href="{href}" id="set-{ct}-{id}-thumbnail" class="thickbox"{data}>{inner}</a></p>"#,
        title = escape_html(&format!("Set {}", slot.label)),
        href = escape_html(&media.upload_surface_url(item_id)),
        ct = escape_html(&slot.content_type),
        id = escape_html(&slot.slot_id),
        data = data_attrs(slot, item_id),
    )
}

fn data_attrs(slot: &ThumbnailSlot, item_id: i64) -> String {
    format!(
        r#" data-action="{action}" data-content-type="{ct}" data-slot-id="{id}" data-item-id="{item_id}""#,
        action = escape_html(&action_name(&slot.content_type, &slot.slot_id)),
        ct = escape_html(&slot.content_type),
        id = escape_html(&slot.slot_id),
    )
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}
