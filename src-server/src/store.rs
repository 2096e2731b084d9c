use crate::host::{MetadataStore, StoreError};
use crate::models::ThumbnailAssociation;
use crate::registry::slot_key;
use tracing::debug;

/// Reads and writes slot associations through the host metadata store.
#[derive(Clone, Copy)]
pub struct AssociationStore<'a> {
    meta: &'a dyn MetadataStore,
}

impl<'a> AssociationStore<'a> {
    pub fn new(meta: &'a dyn MetadataStore) -> Self {
        AssociationStore { meta }
    }

    /// The attached asset id, if any. Read failures are reported as absent.
    pub fn get(&self, content_type: &str, slot_id: &str, item_id: i64) -> Option<i64> {
        let key = slot_key(content_type, slot_id);
        match self.meta.get_meta(item_id, &key) {
            Ok(value) => value.as_deref().and_then(parse_asset_id),
            Err(e) => {
                debug!("Metadata read failed for item {} key {}: {}", item_id, key, e);
                None
            }
        }
    }

    pub fn association(
        &self,
        content_type: &str,
        slot_id: &str,
        item_id: i64,
    ) -> ThumbnailAssociation {
        ThumbnailAssociation {
            content_item_id: item_id,
            slot_key: slot_key(content_type, slot_id),
            media_asset_id: self.get(content_type, slot_id, item_id),
        }
    }

    /// Overwrites any previous association.
    pub fn set(
        &self,
        content_type: &str,
        slot_id: &str,
        item_id: i64,
        media_asset_id: i64,
    ) -> Result<(), StoreError> {
        let key = slot_key(content_type, slot_id);
        self.meta
            .set_meta(item_id, &key, &media_asset_id.to_string())
    }

    /// Deletes the association key. Succeeds when nothing is stored.
    pub fn remove(&self, content_type: &str, slot_id: &str, item_id: i64) -> Result<(), StoreError> {
        let key = slot_key(content_type, slot_id);
        self.meta.delete_meta(item_id, &key)
    }
}

/// Stored values that are empty, zero or not integers mean "no thumbnail".
fn parse_asset_id(value: &str) -> Option<i64> {
    match value.trim().parse::<i64>() {
        Ok(id) if id > 0 => Some(id),
        _ => None,
    }
}
