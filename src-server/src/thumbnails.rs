//! Template-facing accessors for slot thumbnails.

use crate::host::{MediaLibrary, MetadataStore};
use crate::models::{Attrs, SizeSpec};
use crate::registry::panel_id;
use crate::store::AssociationStore;
use std::collections::HashMap;
use tracing::trace;

/// Size used by `render_association` when the caller passes none.
pub const DEFAULT_TEMPLATE_SIZE: &str = "post-thumbnail";

/// One template fetch of a slot image, as seen by [`TemplateHooks`].
#[derive(Debug, Clone, Copy)]
pub struct Fetch<'a> {
    pub content_type: &'a str,
    pub slot_id: &'a str,
    pub item_id: i64,
    pub asset_id: i64,
    pub size: &'a SizeSpec,
    pub attrs: &'a Attrs,
}

/// Per-slot override points around template rendering. Every method
/// defaults to leaving the output alone.
pub trait TemplateHooks {
    /// Replaces the size requested for a slot before the fetch starts.
    fn filter_size(&self, _content_type: &str, _slot_id: &str, size: SizeSpec) -> SizeSpec {
        size
    }

    /// Rewrites the rendered markup. Also runs when the markup is empty.
    fn filter_html(&self, _fetch: &Fetch<'_>, html: String) -> String {
        html
    }

    fn begin_fetch(&self, _fetch: &Fetch<'_>) {}

    fn end_fetch(&self, _fetch: &Fetch<'_>) {}
}

/// Fixed template sizes per slot, keyed by `{content_type}-{slot_id}`.
#[derive(Debug, Clone, Default)]
pub struct SlotTemplateSizes {
    sizes: HashMap<String, SizeSpec>,
}

impl SlotTemplateSizes {
    pub fn insert(&mut self, content_type: &str, slot_id: &str, size: SizeSpec) {
        self.sizes.insert(panel_id(content_type, slot_id), size);
    }

    /// Builds the table from `slot → size` strings such as `"post-hero" = "600x300"`.
    pub fn from_config<'a>(entries: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        SlotTemplateSizes {
            sizes: entries
                .into_iter()
                .map(|(slot, size)| (slot.clone(), SizeSpec::parse(size)))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }
}

impl TemplateHooks for SlotTemplateSizes {
    fn filter_size(&self, content_type: &str, slot_id: &str, size: SizeSpec) -> SizeSpec {
        self.sizes
            .get(&panel_id(content_type, slot_id))
            .cloned()
            .unwrap_or(size)
    }
}

/// The item a template is currently rendering, if any, and the hooks that
/// apply to it. Passed explicitly to the accessors.
#[derive(Clone, Copy, Default)]
pub struct RenderContext<'a> {
    pub current_item: Option<i64>,
    pub hooks: Option<&'a dyn TemplateHooks>,
}

impl<'a> RenderContext<'a> {
    pub fn for_item(item_id: i64) -> Self {
        RenderContext {
            current_item: Some(item_id),
            hooks: None,
        }
    }

    pub fn with_hooks(mut self, hooks: &'a dyn TemplateHooks) -> Self {
        self.hooks = Some(hooks);
        self
    }

    fn resolve(&self, item_id: Option<i64>) -> Option<i64> {
        item_id.or(self.current_item).filter(|id| *id > 0)
    }
}

pub fn get_association_id(
    store: &dyn MetadataStore,
    content_type: &str,
    slot_id: &str,
    item_id: i64,
) -> Option<i64> {
    AssociationStore::new(store).get(content_type, slot_id, item_id)
}

/// Whether the item has a thumbnail stored for the slot. No item → `false`.
pub fn has_association(
    store: &dyn MetadataStore,
    ctx: &RenderContext<'_>,
    content_type: &str,
    slot_id: &str,
    item_id: Option<i64>,
) -> bool {
    ctx.resolve(item_id)
        .and_then(|id| get_association_id(store, content_type, slot_id, id))
        .is_some()
}

/// Image markup for the slot's thumbnail on an item, or an empty string.
#[allow(clippy::too_many_arguments)]
pub fn render_association(
    store: &dyn MetadataStore,
    media: &dyn MediaLibrary,
    ctx: &RenderContext<'_>,
    content_type: &str,
    slot_id: &str,
    item_id: Option<i64>,
    size: Option<&SizeSpec>,
    attrs: Option<&Attrs>,
) -> String {
    let Some(item_id) = ctx.resolve(item_id) else {
        return String::new();
    };
    let Some(asset_id) = get_association_id(store, content_type, slot_id, item_id) else {
        return String::new();
    };
    let size = size
        .cloned()
        .unwrap_or_else(|| SizeSpec::named(DEFAULT_TEMPLATE_SIZE));
    let empty = Attrs::new();
    let attrs = attrs.unwrap_or(&empty);
    trace!(item_id, asset_id, "Rendering {} {} thumbnail", content_type, slot_id);

    let Some(hooks) = ctx.hooks else {
        return media.render_asset_markup(asset_id, &size, attrs);
    };
    let size = hooks.filter_size(content_type, slot_id, size);
    let fetch = Fetch {
        content_type,
        slot_id,
        item_id,
        asset_id,
        size: &size,
        attrs,
    };
    hooks.begin_fetch(&fetch);
    let html = media.render_asset_markup(asset_id, &size, attrs);
    hooks.end_fetch(&fetch);
    hooks.filter_html(&fetch, html)
}
