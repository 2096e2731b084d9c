use crate::actions::{ActionError, ActionForm, ActionHandler, ActionOutcome, ActionRequest};
use crate::database::ContentDatabase;
use crate::host::{ExtensionHost, HostServices, MediaLibrary, PanelBinding, PermissionChecker};
use crate::models::{MediaField, SizeSpec, ThumbnailSlot};
use crate::render::escape_html;
use crate::state::AppState;
use crate::store::AssociationStore;
use crate::thumbnails::{has_association, render_association, RenderContext};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::MutexGuard;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Header carrying the authenticated user id, set by the fronting auth layer.
pub const USER_HEADER: &str = "x-user-id";

const HTML: &str = "text/html; charset=utf-8";

/// Extension points bound by the slot registry at startup.
#[derive(Debug, Default)]
pub struct AdminRoutes {
    panels: HashMap<String, Vec<PanelBinding>>,
    media_fields: Vec<ThumbnailSlot>,
    actions: HashMap<String, ThumbnailSlot>,
}

impl AdminRoutes {
    /// Panels of a content type, ordered by priority then binding order.
    pub fn panels(&self, content_type: &str) -> Vec<&PanelBinding> {
        let mut panels: Vec<&PanelBinding> = self
            .panels
            .get(content_type)
            .map(|p| p.iter().collect())
            .unwrap_or_default();
        panels.sort_by_key(|p| p.slot.priority);
        panels
    }

    pub fn media_fields(&self) -> &[ThumbnailSlot] {
        &self.media_fields
    }

    pub fn action(&self, name: &str) -> Option<&ThumbnailSlot> {
        self.actions.get(name)
    }
}

impl ExtensionHost for AdminRoutes {
    fn add_panel(&mut self, panel: PanelBinding) {
        self.panels
            .entry(panel.content_type.clone())
            .or_default()
            .push(panel);
    }

    fn add_media_fields(&mut self, slot: &ThumbnailSlot) {
        self.media_fields.push(slot.clone());
    }

    fn add_action(&mut self, action: &str, slot: &ThumbnailSlot) {
        // the first activation of an action name handles every request
        self.actions
            .entry(action.to_string())
            .or_insert_with(|| slot.clone());
    }
}

pub fn router(app_state: AppState) -> Router {
    let uploads = ServeDir::new(&app_state.upload_dir);

    Router::new()
        .route("/ajax/:action", post(thumbnail_action))
        .route("/admin/:content_type/:item_id/panels", get(admin_panels))
        .route("/media/:asset_id/fields", get(media_fields))
        .route(
            "/items/:item_id/thumbnails/:content_type/:slot_id",
            get(item_thumbnail),
        )
        .route("/slots", get(list_slots))
        .nest_service("/uploads", uploads)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

pub async fn serve(app_state: AppState, addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(app_state);
    let listener = TcpListener::bind(addr).await?;
    info!("Thumbnail server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

fn current_user(headers: &HeaderMap) -> Option<i64> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn lock_db(state: &AppState) -> Result<MutexGuard<'_, ContentDatabase>, Response> {
    state.db.lock().map_err(|_| {
        error!("Content database lock poisoned");
        (StatusCode::INTERNAL_SERVER_ERROR, "0").into_response()
    })
}

fn html(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, HTML)], body).into_response()
}

async fn thumbnail_action(
    State(state): State<AppState>,
    Path(action): Path<String>,
    headers: HeaderMap,
    Form(form): Form<ActionForm>,
) -> Response {
    let Some(slot) = state.routes.action(&action) else {
        warn!("Unknown thumbnail action: {}", action);
        return (StatusCode::BAD_REQUEST, "0").into_response();
    };
    let request = ActionRequest::from_form(current_user(&headers), &form);

    let outcome = {
        let db = match lock_db(&state) {
            Ok(db) => db,
            Err(resp) => return resp,
        };
        let host = HostServices {
            store: &*db,
            media: &*db,
            permissions: &*db,
            tokens: state.tokens.as_ref(),
        };
        ActionHandler::new(slot, host, &state.renderer).handle(&request)
    };

    let status = match &outcome {
        ActionOutcome::Markup(_) => StatusCode::OK,
        ActionOutcome::Failed(ActionError::PermissionDenied { .. })
        | ActionOutcome::Failed(ActionError::InvalidToken(_)) => StatusCode::FORBIDDEN,
        ActionOutcome::Failed(ActionError::AssetNotFound(_)) => StatusCode::NOT_FOUND,
        ActionOutcome::Failed(ActionError::StoreWriteFailure(_)) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    html(status, outcome.body())
}

async fn admin_panels(
    State(state): State<AppState>,
    Path((content_type, item_id)): Path<(String, i64)>,
    headers: HeaderMap,
) -> Response {
    let db = match lock_db(&state) {
        Ok(db) => db,
        Err(resp) => return resp,
    };

    match db.get_content_item(item_id) {
        Ok(Some(item)) if item.content_type == content_type => {}
        Ok(_) => return (StatusCode::NOT_FOUND, "0").into_response(),
        Err(e) => {
            error!("Failed to load item {}: {}", item_id, e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "0").into_response();
        }
    }
    let allowed = current_user(&headers).is_some_and(|user| db.can_edit(user, item_id));
    if !allowed {
        return (StatusCode::FORBIDDEN, "-1").into_response();
    }

    let store = AssociationStore::new(&*db);
    let mut body = String::new();
    for panel in state.routes.panels(&content_type) {
        let slot = &panel.slot;
        let association = store.get(&slot.content_type, &slot.slot_id, item_id);
        let inner = state
            .renderer
            .render_panel(slot, association, item_id, &*db, state.tokens.as_ref());
        body.push_str(&format!(
            r#"<div id="{id}" class="postbox" data-context="{context}" data-priority="{priority}"><h2 class="hndle">{label}</h2><div class="inside">{inner}</div></div>"#,
            id = escape_html(&panel.panel_id),
            context = panel.placement.as_str(),
            priority = slot.priority,
            label = escape_html(&panel.label),
        ));
    }
    html(StatusCode::OK, body)
}

#[derive(Debug, Deserialize)]
struct FieldsQuery {
    item_id: Option<i64>,
}

async fn media_fields(
    State(state): State<AppState>,
    Path(asset_id): Path<i64>,
    Query(query): Query<FieldsQuery>,
    headers: HeaderMap,
) -> Response {
    if current_user(&headers).is_none() {
        return (StatusCode::FORBIDDEN, "-1").into_response();
    }
    let db = match lock_db(&state) {
        Ok(db) => db,
        Err(resp) => return resp,
    };
    let Some(asset) = db.resolve_asset(asset_id) else {
        return (StatusCode::NOT_FOUND, "0").into_response();
    };
    let calling_item = query.item_id.or(asset.parent_item_id).unwrap_or(0);

    let fields: Vec<MediaField> = state
        .routes
        .media_fields()
        .iter()
        .map(|slot| {
            state
                .renderer
                .render_media_field(slot, asset.id, calling_item, state.tokens.as_ref())
        })
        .collect();
    Json(fields).into_response()
}

#[derive(Debug, Deserialize)]
struct ThumbnailQuery {
    size: Option<String>,
}

/// Public template rendering of one slot; 204 when nothing renders.
async fn item_thumbnail(
    State(state): State<AppState>,
    Path((item_id, content_type, slot_id)): Path<(i64, String, String)>,
    Query(query): Query<ThumbnailQuery>,
) -> Response {
    let db = match lock_db(&state) {
        Ok(db) => db,
        Err(resp) => return resp,
    };
    let ctx = RenderContext::for_item(item_id).with_hooks(state.template_sizes.as_ref());
    if !has_association(&*db, &ctx, &content_type, &slot_id, None) {
        return StatusCode::NO_CONTENT.into_response();
    }
    let size = query.size.as_deref().map(SizeSpec::parse);
    let markup = render_association(
        &*db,
        &*db,
        &ctx,
        &content_type,
        &slot_id,
        None,
        size.as_ref(),
        None,
    );
    // dangling or non-image references render nothing
    if markup.is_empty() {
        return StatusCode::NO_CONTENT.into_response();
    }
    html(StatusCode::OK, markup)
}

async fn list_slots(State(state): State<AppState>) -> Response {
    Json(state.registry.bindings().to_vec()).into_response()
}
