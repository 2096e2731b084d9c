use crate::host::{ExtensionHost, PanelBinding, Placement};
use crate::models::{Priority, SlotDefinition, ThumbnailSlot, DEFAULT_CONTENT_TYPE};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("the 'label' value of a thumbnail slot is required")]
    MissingLabel,
    #[error("the 'slot_id' value of a thumbnail slot is required")]
    MissingSlotId,
    #[error("slot id {0:?} may only contain letters, digits and hyphens")]
    InvalidSlotId(String),
    #[error("content type {0:?} is not a valid identifier")]
    InvalidContentType(String),
    #[error("slot {content_type}/{slot_id} derives action {action:?}, already bound to {owner}")]
    ActionNameTaken {
        content_type: String,
        slot_id: String,
        action: String,
        owner: String,
    },
}

/// Metadata key holding the asset id of a slot on a content item.
pub fn slot_key(content_type: &str, slot_id: &str) -> String {
    format!("{content_type}_{slot_id}_thumbnail_id")
}

pub fn panel_id(content_type: &str, slot_id: &str) -> String {
    format!("{content_type}-{slot_id}")
}

/// Name of the host image size used for the admin preview, when registered.
/// Also the key of the slot's media picker field.
pub fn image_size_name(content_type: &str, slot_id: &str) -> String {
    format!("{content_type}-{slot_id}-thumbnail")
}

pub fn action_name(content_type: &str, slot_id: &str) -> String {
    format!("set-{content_type}-{slot_id}-thumbnail")
}

pub fn nonce_scope(content_type: &str, slot_id: &str, item_id: i64) -> String {
    format!("set_post_thumbnail-{content_type}-{slot_id}-{item_id}")
}

fn is_slot_fragment(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn is_content_type(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredSlot {
    pub slot: Arc<ThumbnailSlot>,
    pub slot_key: String,
}

impl RegisteredSlot {
    pub fn action_name(&self) -> String {
        action_name(&self.slot.content_type, &self.slot.slot_id)
    }

    pub fn panel_id(&self) -> String {
        panel_id(&self.slot.content_type, &self.slot.slot_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionPoint {
    AdminPanel,
    MediaFields,
    ActionEndpoint,
}

impl ExtensionPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtensionPoint::AdminPanel => "admin_panel",
            ExtensionPoint::MediaFields => "media_fields",
            ExtensionPoint::ActionEndpoint => "action_endpoint",
        }
    }
}

/// One activated integration point of a registered slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub point: ExtensionPoint,
    /// Panel id, media field key or action name, depending on `point`.
    pub name: String,
    pub content_type: String,
    pub slot_id: String,
    pub activation: usize,
}

#[derive(Debug, Default)]
pub struct SlotRegistry {
    slots: Vec<RegisteredSlot>,
    bindings: Vec<Binding>,
}

impl SlotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates `definition` and activates its three extension points.
    ///
    /// Registering the same `(content_type, slot_id)` twice is accepted and
    /// yields a second activation writing to the same metadata key.
    pub fn register(
        &mut self,
        definition: SlotDefinition,
    ) -> Result<RegisteredSlot, RegistrationError> {
        let slot = match validate(definition).and_then(|slot| self.check_names(slot)) {
            Ok(slot) => slot,
            Err(e) => {
                error!("Thumbnail slot rejected: {}", e);
                return Err(e);
            }
        };

        if self.find(&slot.content_type, &slot.slot_id).is_some() {
            warn!(
                content_type = %slot.content_type,
                slot_id = %slot.slot_id,
                "Thumbnail slot registered more than once; activations share one metadata key"
            );
        }

        let registered = RegisteredSlot {
            slot_key: slot_key(&slot.content_type, &slot.slot_id),
            slot: Arc::new(slot),
        };
        let activation = self.slots.len();
        let ct = &registered.slot.content_type;
        let id = &registered.slot.slot_id;
        for (point, name) in [
            (ExtensionPoint::AdminPanel, panel_id(ct, id)),
            (ExtensionPoint::MediaFields, image_size_name(ct, id)),
            (ExtensionPoint::ActionEndpoint, action_name(ct, id)),
        ] {
            self.bindings.push(Binding {
                point,
                name,
                content_type: ct.clone(),
                slot_id: id.clone(),
                activation,
            });
        }

        info!(
            content_type = %ct,
            slot_id = %id,
            priority = %registered.slot.priority,
            "Registered thumbnail slot"
        );
        self.slots.push(registered.clone());
        Ok(registered)
    }

    /// Derived names are joined with `-`, so `(a-b, c)` and `(a, b-c)` map to
    /// one action. Only the same pair may share them.
    fn check_names(&self, slot: ThumbnailSlot) -> Result<ThumbnailSlot, RegistrationError> {
        let action = action_name(&slot.content_type, &slot.slot_id);
        let clash = self.slots.iter().find(|r| {
            r.action_name() == action
                && (r.slot.content_type != slot.content_type || r.slot.slot_id != slot.slot_id)
        });
        match clash {
            Some(owner) => Err(RegistrationError::ActionNameTaken {
                content_type: slot.content_type,
                slot_id: slot.slot_id,
                action,
                owner: format!("{}/{}", owner.slot.content_type, owner.slot.slot_id),
            }),
            None => Ok(slot),
        }
    }

    pub fn slots(&self) -> &[RegisteredSlot] {
        &self.slots
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// First activation for the pair.
    pub fn find(&self, content_type: &str, slot_id: &str) -> Option<&RegisteredSlot> {
        self.slots
            .iter()
            .find(|s| s.slot.content_type == content_type && s.slot.slot_id == slot_id)
    }

    /// Resolves an action endpoint name to the slot that handles it.
    pub fn action(&self, name: &str) -> Option<&RegisteredSlot> {
        self.bindings
            .iter()
            .find(|b| b.point == ExtensionPoint::ActionEndpoint && b.name == name)
            .and_then(|b| self.slots.get(b.activation))
    }

    /// Admin panels of a content type in display order.
    pub fn panels_for(&self, content_type: &str) -> Vec<&RegisteredSlot> {
        let mut panels: Vec<&RegisteredSlot> = self
            .slots
            .iter()
            .filter(|s| s.slot.content_type == content_type)
            .collect();
        panels.sort_by_key(|s| s.slot.priority);
        panels
    }

    /// Slots contributing media picker fields, in registration order.
    pub fn media_field_slots(&self) -> impl Iterator<Item = &RegisteredSlot> + '_ {
        self.bindings
            .iter()
            .filter(|b| b.point == ExtensionPoint::MediaFields)
            .filter_map(|b| self.slots.get(b.activation))
    }

    /// Replays the binding table into a host.
    pub fn bind_all(&self, host: &mut impl ExtensionHost) {
        for binding in &self.bindings {
            let Some(registered) = self.slots.get(binding.activation) else {
                continue;
            };
            let slot = registered.slot.as_ref();
            match binding.point {
                ExtensionPoint::AdminPanel => host.add_panel(PanelBinding {
                    panel_id: binding.name.clone(),
                    label: slot.label.clone(),
                    content_type: slot.content_type.clone(),
                    placement: Placement::Side,
                    slot: slot.clone(),
                }),
                ExtensionPoint::MediaFields => host.add_media_fields(slot),
                ExtensionPoint::ActionEndpoint => host.add_action(&binding.name, slot),
            }
        }
    }
}

fn validate(definition: SlotDefinition) -> Result<ThumbnailSlot, RegistrationError> {
    let label = definition
        .label
        .filter(|l| !l.trim().is_empty())
        .ok_or(RegistrationError::MissingLabel)?;
    let slot_id = definition
        .slot_id
        .filter(|s| !s.is_empty())
        .ok_or(RegistrationError::MissingSlotId)?;
    if !is_slot_fragment(&slot_id) {
        return Err(RegistrationError::InvalidSlotId(slot_id));
    }
    let content_type = definition
        .content_type
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
    if !is_content_type(&content_type) {
        return Err(RegistrationError::InvalidContentType(content_type));
    }

    Ok(ThumbnailSlot {
        content_type,
        slot_id,
        label,
        priority: definition.priority.unwrap_or(Priority::Low),
    })
}
