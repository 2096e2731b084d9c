use crate::host::{HostServices, StoreError};
use crate::models::{Attrs, SizeSpec, ThumbnailSlot};
use crate::registry::nonce_scope;
use crate::render::Renderer;
use crate::store::AssociationStore;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// `media_asset_id` value that removes the association.
pub const REMOVE_SENTINEL: i64 = -1;
/// Size an asset must render at to be accepted as a thumbnail.
pub const ACCEPT_SIZE: &str = "thumbnail";

#[derive(Error, Debug)]
pub enum ActionError {
    #[error("user {user_id:?} may not edit item {item_id}")]
    PermissionDenied { user_id: Option<i64>, item_id: i64 },
    #[error("anti-forgery token rejected for item {0}")]
    InvalidToken(i64),
    #[error("media asset {0} does not resolve to an image")]
    AssetNotFound(i64),
    #[error("store write failed: {0}")]
    StoreWriteFailure(#[from] StoreError),
}

/// Form body of `POST /ajax/{action}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionForm {
    #[serde(default)]
    pub item_id: String,
    #[serde(default)]
    pub media_asset_id: String,
    #[serde(default)]
    pub nonce: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    pub user_id: Option<i64>,
    pub item_id: i64,
    pub media_asset_id: i64,
    pub nonce: String,
}

impl ActionRequest {
    /// Unparseable ids become 0, which no check accepts.
    pub fn from_form(user_id: Option<i64>, form: &ActionForm) -> Self {
        ActionRequest {
            user_id,
            item_id: form.item_id.trim().parse().unwrap_or(0),
            media_asset_id: form.media_asset_id.trim().parse().unwrap_or(0),
            nonce: form.nonce.clone(),
        }
    }
}

#[derive(Debug)]
pub enum ActionOutcome {
    Markup(String),
    Failed(ActionError),
}

impl ActionOutcome {
    /// Response body: markup, `-1` for rejected callers, `0` otherwise.
    pub fn body(&self) -> String {
        match self {
            ActionOutcome::Markup(html) => html.clone(),
            ActionOutcome::Failed(ActionError::PermissionDenied { .. })
            | ActionOutcome::Failed(ActionError::InvalidToken(_)) => "-1".to_string(),
            ActionOutcome::Failed(_) => "0".to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ActionOutcome::Markup(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Validating,
    ApplyingSet,
    ApplyingRemove,
    Responded,
}

/// Handles the set/remove action of one slot. Carries no state between
/// requests.
pub struct ActionHandler<'a> {
    slot: &'a ThumbnailSlot,
    host: HostServices<'a>,
    renderer: &'a Renderer,
}

impl<'a> ActionHandler<'a> {
    pub fn new(slot: &'a ThumbnailSlot, host: HostServices<'a>, renderer: &'a Renderer) -> Self {
        ActionHandler { slot, host, renderer }
    }

    pub fn handle(&self, request: &ActionRequest) -> ActionOutcome {
        let mut phase = Phase::Idle;
        let outcome = match self.run(request, &mut phase) {
            Ok(html) => ActionOutcome::Markup(html),
            Err(e) => {
                warn!(
                    content_type = %self.slot.content_type,
                    slot_id = %self.slot.slot_id,
                    "Thumbnail action aborted: {}", e
                );
                ActionOutcome::Failed(e)
            }
        };
        transition(&mut phase, Phase::Responded);
        outcome
    }

    fn run(&self, request: &ActionRequest, phase: &mut Phase) -> Result<String, ActionError> {
        let slot = self.slot;
        let item_id = request.item_id;

        transition(phase, Phase::Validating);
        let allowed = request
            .user_id
            .is_some_and(|user| self.host.permissions.can_edit(user, item_id));
        if !allowed {
            return Err(ActionError::PermissionDenied {
                user_id: request.user_id,
                item_id,
            });
        }
        let scope = nonce_scope(&slot.content_type, &slot.slot_id, item_id);
        if !self.host.tokens.verify(&request.nonce, &scope) {
            return Err(ActionError::InvalidToken(item_id));
        }

        let store = AssociationStore::new(self.host.store);
        if request.media_asset_id == REMOVE_SENTINEL {
            transition(phase, Phase::ApplyingRemove);
            store.remove(&slot.content_type, &slot.slot_id, item_id)?;
            info!(item_id, slot_id = %slot.slot_id, "Removed thumbnail");
            return Ok(self.render(None, item_id));
        }

        transition(phase, Phase::ApplyingSet);
        let asset_id = request.media_asset_id;
        if !self.accepts(asset_id) {
            return Err(ActionError::AssetNotFound(asset_id));
        }
        store.set(&slot.content_type, &slot.slot_id, item_id, asset_id)?;
        info!(item_id, asset_id, slot_id = %slot.slot_id, "Set thumbnail");
        Ok(self.render(Some(asset_id), item_id))
    }

    /// The asset must exist and render as an image.
    fn accepts(&self, asset_id: i64) -> bool {
        if asset_id <= 0 || self.host.media.resolve_asset(asset_id).is_none() {
            return false;
        }
        !self
            .host
            .media
            .render_asset_markup(asset_id, &SizeSpec::named(ACCEPT_SIZE), &Attrs::new())
            .is_empty()
    }

    fn render(&self, association: Option<i64>, item_id: i64) -> String {
        self.renderer.render_panel(
            self.slot,
            association,
            item_id,
            self.host.media,
            self.host.tokens,
        )
    }
}

fn transition(phase: &mut Phase, next: Phase) {
    debug!("thumbnail action {:?} -> {:?}", phase, next);
    *phase = next;
}
