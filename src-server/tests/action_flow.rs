use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use multi_thumbnails_lib::config::Settings;
use multi_thumbnails_lib::database::ContentDatabase;
use multi_thumbnails_lib::actions::{ActionHandler, ActionRequest};
use multi_thumbnails_lib::host::{HostServices, MetadataStore, TokenIssuer};
use multi_thumbnails_lib::models::{Role, SizeSpec, SlotDefinition};
use multi_thumbnails_lib::registry::{nonce_scope, RegisteredSlot, SlotRegistry};
use multi_thumbnails_lib::render::Renderer;
use multi_thumbnails_lib::security::NonceIssuer;
use multi_thumbnails_lib::server::{router, USER_HEADER};
use multi_thumbnails_lib::state::AppState;
use multi_thumbnails_lib::store::AssociationStore;
use multi_thumbnails_lib::thumbnails::SlotTemplateSizes;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    _dir: TempDir,
    state: AppState,
    editor: i64,
    author: i64,
    post: i64,
    page: i64,
    image: i64,
}

fn setup(definitions: Vec<SlotDefinition>) -> TestApp {
    let dir = TempDir::new().unwrap();
    let db = ContentDatabase::open_in_memory(&dir.path().join("uploads")).unwrap();
    let editor = db.create_user("ed", Role::Editor).unwrap().id;
    let author = db.create_user("au", Role::Author).unwrap().id;
    let post = db.create_content_item("post", "Hello", Some(editor)).unwrap().id;
    let page = db.create_content_item("page", "About", Some(editor)).unwrap().id;
    let image = db
        .insert_asset(Some(post), "hero.png", "hero", "image/png", Some(800), Some(400))
        .unwrap()
        .id;

    let mut registry = SlotRegistry::new();
    for definition in definitions {
        registry.register(definition).unwrap();
    }
    let tokens = NonceIssuer::new(b"integration-test-key", 3600).unwrap();
    let state = AppState::new(db, registry, tokens, Renderer::default());

    TestApp {
        _dir: dir,
        state,
        editor,
        author,
        post,
        page,
        image,
    }
}

impl TestApp {
    fn app(&self) -> Router {
        router(self.state.clone())
    }

    fn nonce(&self, content_type: &str, slot_id: &str, item_id: i64) -> String {
        self.state
            .tokens
            .mint(&nonce_scope(content_type, slot_id, item_id))
    }

    fn stored(&self, content_type: &str, slot_id: &str, item_id: i64) -> Option<i64> {
        let db = self.state.db.lock().unwrap();
        AssociationStore::new(&*db).get(content_type, slot_id, item_id)
    }

    async fn post_action(
        &self,
        action: &str,
        user: Option<i64>,
        item_id: i64,
        asset_id: i64,
        nonce: &str,
    ) -> (StatusCode, String) {
        let mut req = Request::builder()
            .method("POST")
            .uri(format!("/ajax/{action}"))
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(user) = user {
            req = req.header(USER_HEADER, user.to_string());
        }
        let body = format!("item_id={item_id}&media_asset_id={asset_id}&nonce={nonce}");
        send(self.app(), req.body(Body::from(body)).unwrap()).await
    }

    async fn get(&self, uri: &str, user: Option<i64>) -> (StatusCode, String) {
        let mut req = Request::builder().uri(uri);
        if let Some(user) = user {
            req = req.header(USER_HEADER, user.to_string());
        }
        send(self.app(), req.body(Body::empty()).unwrap()).await
    }
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, String) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn hero() -> SlotDefinition {
    SlotDefinition::new("hero", "Hero Image")
}

#[tokio::test]
async fn set_then_remove_round_trip() {
    let t = setup(vec![hero()]);
    let nonce = t.nonce("post", "hero", t.post);

    let (status, body) = t
        .post_action("set-post-hero-thumbnail", Some(t.editor), t.post, t.image, &nonce)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<img"));
    assert!(body.contains(r#"id="remove-post-hero-thumbnail""#));
    assert_eq!(t.stored("post", "hero", t.post), Some(t.image));
    {
        let db = t.state.db.lock().unwrap();
        assert_eq!(
            db.get_meta(t.post, "post_hero_thumbnail_id").unwrap(),
            Some(t.image.to_string())
        );
    }

    let (status, body) = t
        .post_action("set-post-hero-thumbnail", Some(t.editor), t.post, -1, &nonce)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Set Hero Image"));
    assert!(!body.contains("<img"));
    assert_eq!(t.stored("post", "hero", t.post), None);
}

#[tokio::test]
async fn unresolvable_asset_leaves_store_untouched() {
    let t = setup(vec![hero()]);
    let nonce = t.nonce("post", "hero", t.post);
    t.post_action("set-post-hero-thumbnail", Some(t.editor), t.post, t.image, &nonce)
        .await;

    let (status, body) = t
        .post_action("set-post-hero-thumbnail", Some(t.editor), t.post, 9999, &nonce)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "0");
    assert_eq!(t.stored("post", "hero", t.post), Some(t.image));
}

#[tokio::test]
async fn rejects_callers_without_permission_or_token() {
    let t = setup(vec![hero()]);
    let nonce = t.nonce("post", "hero", t.post);

    // authors only edit their own items
    let (status, body) = t
        .post_action("set-post-hero-thumbnail", Some(t.author), t.post, t.image, &nonce)
        .await;
    assert_eq!((status, body.as_str()), (StatusCode::FORBIDDEN, "-1"));

    let (status, body) = t
        .post_action("set-post-hero-thumbnail", None, t.post, t.image, &nonce)
        .await;
    assert_eq!((status, body.as_str()), (StatusCode::FORBIDDEN, "-1"));

    let foreign = t.nonce("post", "banner", t.post);
    let (status, body) = t
        .post_action("set-post-hero-thumbnail", Some(t.editor), t.post, t.image, &foreign)
        .await;
    assert_eq!((status, body.as_str()), (StatusCode::FORBIDDEN, "-1"));

    let (status, body) = t
        .post_action("set-post-hero-thumbnail", Some(t.editor), t.post, t.image, "")
        .await;
    assert_eq!((status, body.as_str()), (StatusCode::FORBIDDEN, "-1"));

    assert_eq!(t.stored("post", "hero", t.post), None);
}

#[tokio::test]
async fn unknown_action_is_a_bad_request() {
    let t = setup(vec![hero()]);
    let nonce = t.nonce("post", "hero", t.post);
    let (status, body) = t
        .post_action("set-post-nope-thumbnail", Some(t.editor), t.post, t.image, &nonce)
        .await;
    assert_eq!((status, body.as_str()), (StatusCode::BAD_REQUEST, "0"));
}

#[tokio::test]
async fn same_slot_id_on_two_content_types_stays_separate() {
    let t = setup(vec![hero(), hero().content_type("page")]);

    let nonce = t.nonce("page", "hero", t.page);
    let (status, _) = t
        .post_action("set-page-hero-thumbnail", Some(t.editor), t.page, t.image, &nonce)
        .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(t.stored("page", "hero", t.page), Some(t.image));
    assert_eq!(t.stored("post", "hero", t.page), None);
    let db = t.state.db.lock().unwrap();
    assert!(db.get_meta(t.page, "page_hero_thumbnail_id").unwrap().is_some());
    assert!(db.get_meta(t.page, "post_hero_thumbnail_id").unwrap().is_none());
}

#[tokio::test]
async fn duplicate_registration_shares_the_stored_value() {
    let dir = TempDir::new().unwrap();
    let db = ContentDatabase::open_in_memory(&dir.path().join("uploads")).unwrap();
    let editor = db.create_user("ed", Role::Editor).unwrap().id;
    let post = db.create_content_item("post", "Hello", Some(editor)).unwrap().id;
    let first_image = db
        .insert_asset(Some(post), "a.png", "a", "image/png", Some(80), Some(80))
        .unwrap()
        .id;
    let second_image = db
        .insert_asset(Some(post), "b.png", "b", "image/png", Some(80), Some(80))
        .unwrap()
        .id;
    let tokens = NonceIssuer::new(b"integration-test-key", 3600).unwrap();
    let renderer = Renderer::default();
    let scope = nonce_scope("post", "hero", post);
    let request = |asset: i64| ActionRequest {
        user_id: Some(editor),
        item_id: post,
        media_asset_id: asset,
        nonce: tokens.mint(&scope),
    };

    let mut registry = SlotRegistry::new();
    let first = registry.register(hero()).unwrap();
    {
        let host = HostServices {
            store: &db,
            media: &db,
            permissions: &db,
            tokens: &tokens,
        };
        let outcome = ActionHandler::new(&first.slot, host, &renderer).handle(&request(first_image));
        assert!(outcome.is_success());
    }

    let second = registry
        .register(SlotDefinition::new("hero", "Hero again"))
        .unwrap();
    assert_eq!(first.slot_key, second.slot_key);
    let store = AssociationStore::new(&db);
    let read = |slot: &RegisteredSlot| store.get(&slot.slot.content_type, &slot.slot.slot_id, post);
    assert_eq!(read(&first), Some(first_image));
    assert_eq!(read(&second), Some(first_image));

    {
        let host = HostServices {
            store: &db,
            media: &db,
            permissions: &db,
            tokens: &tokens,
        };
        let outcome = ActionHandler::new(&second.slot, host, &renderer).handle(&request(second_image));
        assert!(outcome.body().contains("Hero again"));
    }
    assert_eq!(read(&first), Some(second_image));

    // both activations render the shared value in the admin screen
    let state = AppState::new(db, registry, tokens, renderer);
    let t = TestApp {
        _dir: dir,
        state,
        editor,
        author: editor,
        post,
        page: post,
        image: second_image,
    };
    let (status, body) = t.get(&format!("/admin/post/{post}/panels"), Some(editor)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.matches(r#"src="/uploads/b.png""#).count(), 2);
    assert_eq!(t.stored("post", "hero", post), Some(t.image));
}

#[tokio::test]
async fn admin_panels_render_per_content_type() {
    let t = setup(vec![hero(), SlotDefinition::new("banner", "Banner").content_type("page")]);

    let uri = format!("/admin/post/{}/panels", t.post);
    let (status, body) = t.get(&uri, Some(t.editor)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#"<div id="post-hero" class="postbox" data-context="side" data-priority="low">"#));
    assert!(body.contains(r#"<h2 class="hndle">Hero Image</h2>"#));
    assert!(body.contains(r#"id="set-post-hero-thumbnail""#));
    assert!(!body.contains("page-banner"));

    let (status, body) = t.get(&uri, Some(t.author)).await;
    assert_eq!((status, body.as_str()), (StatusCode::FORBIDDEN, "-1"));

    let (status, _) = t.get(&format!("/admin/page/{}/panels", t.post), Some(t.editor)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn media_fields_carry_a_scoped_token() {
    let t = setup(vec![hero(), SlotDefinition::new("banner", "Banner")]);

    let (status, body) = t
        .get(&format!("/media/{}/fields?item_id={}", t.image, t.post), Some(t.editor))
        .await;
    assert_eq!(status, StatusCode::OK);
    let fields: serde_json::Value = serde_json::from_str(&body).unwrap();
    let fields = fields.as_array().unwrap();
    assert_eq!(fields.len(), 2);
    assert_eq!(fields[0]["key"], "post-hero-thumbnail");
    assert_eq!(fields[1]["key"], "post-banner-thumbnail");
    let html = fields[0]["html"].as_str().unwrap();
    assert!(html.contains("Set as Hero Image"));
    assert!(html.contains(&format!(r#"data-item-id="{}""#, t.post)));

    let (status, _) = t.get("/media/9999/fields", Some(t.editor)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = t.get(&format!("/media/{}/fields", t.image), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn template_route_renders_the_stored_image() {
    let t = setup(vec![hero()]);
    let uri = format!("/items/{}/thumbnails/post/hero", t.post);
    let (status, body) = t.get(&uri, None).await;
    assert_eq!((status, body.as_str()), (StatusCode::NO_CONTENT, ""));

    let nonce = t.nonce("post", "hero", t.post);
    t.post_action("set-post-hero-thumbnail", Some(t.editor), t.post, t.image, &nonce)
        .await;

    let (status, body) = t.get(&uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#"class="attachment-post-thumbnail""#));
    assert!(body.contains(r#"src="/uploads/hero.png""#));

    let (_, body) = t.get(&format!("{uri}?size=100x100"), None).await;
    assert!(body.contains(r#"width="100" height="50""#));

    // a stored id whose asset is gone renders as absent
    t.state.db.lock().unwrap().delete_asset(t.image).unwrap();
    assert_eq!(t.stored("post", "hero", t.post), Some(t.image));
    let (status, body) = t.get(&uri, None).await;
    assert_eq!((status, body.as_str()), (StatusCode::NO_CONTENT, ""));
}

#[tokio::test]
async fn template_route_applies_configured_slot_sizes() {
    let t = setup(vec![hero(), SlotDefinition::new("banner", "Banner")]);
    let mut sizes = SlotTemplateSizes::default();
    sizes.insert("post", "hero", SizeSpec::parse("200x200"));
    let t = TestApp {
        state: t.state.with_template_sizes(sizes),
        ..t
    };
    let nonce = t.nonce("post", "hero", t.post);
    t.post_action("set-post-hero-thumbnail", Some(t.editor), t.post, t.image, &nonce)
        .await;
    let nonce = t.nonce("post", "banner", t.post);
    t.post_action("set-post-banner-thumbnail", Some(t.editor), t.post, t.image, &nonce)
        .await;

    let (_, hero) = t.get(&format!("/items/{}/thumbnails/post/hero", t.post), None).await;
    assert!(hero.contains(r#"width="200" height="100""#));
    let (_, banner) = t.get(&format!("/items/{}/thumbnails/post/banner", t.post), None).await;
    assert!(banner.contains(r#"width="150" height="75""#));
}

#[tokio::test]
async fn slots_endpoint_lists_bindings() {
    let t = setup(vec![hero()]);
    let (status, body) = t.get("/slots", None).await;
    assert_eq!(status, StatusCode::OK);
    let bindings: serde_json::Value = serde_json::from_str(&body).unwrap();
    let points: Vec<&str> = bindings
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["point"].as_str().unwrap())
        .collect();
    assert_eq!(points, ["admin_panel", "media_fields", "action_endpoint"]);
    assert_eq!(bindings[2]["name"], "set-post-hero-thumbnail");
}

#[test]
fn startup_rejects_invalid_slot_config() {
    let dir = TempDir::new().unwrap();
    let settings = Settings::from_toml(&format!(
        r#"
        [database]
        path = ":memory:"
        upload_dir = "{}"

        [[slots]]
        slot_id = "hero"
        "#,
        dir.path().join("uploads").display()
    ))
    .unwrap();
    assert!(multi_thumbnails_lib::build_state(&settings).is_err());

    let settings = Settings::from_toml(&format!(
        r#"
        [database]
        path = ":memory:"
        upload_dir = "{}"

        [[slots]]
        slot_id = "hero"
        label = "Hero"
        "#,
        dir.path().join("uploads").display()
    ))
    .unwrap();
    let state = multi_thumbnails_lib::build_state(&settings).unwrap();
    assert_eq!(state.registry.slots().len(), 1);
    assert!(state.routes.action("set-post-hero-thumbnail").is_some());
}

#[test]
fn startup_rejects_colliding_action_names_and_unsalted_secrets() {
    let dir = TempDir::new().unwrap();
    let base = format!(
        "[database]\npath = \":memory:\"\nupload_dir = \"{}\"\n",
        dir.path().join("uploads").display()
    );

    let colliding = format!(
        "{base}\n[[slots]]\ncontent_type = \"a-b\"\nslot_id = \"c\"\nlabel = \"First\"\n\n[[slots]]\ncontent_type = \"a\"\nslot_id = \"b-c\"\nlabel = \"Second\"\n"
    );
    let settings = Settings::from_toml(&colliding).unwrap();
    assert!(matches!(
        multi_thumbnails_lib::build_state(&settings),
        Err(multi_thumbnails_lib::StartupError::Registration(_))
    ));

    let unsalted = format!("{base}\n[security]\nsecret = \"hunter2\"\n");
    let settings = Settings::from_toml(&unsalted).unwrap();
    assert!(matches!(
        multi_thumbnails_lib::build_state(&settings),
        Err(multi_thumbnails_lib::StartupError::Security(_))
    ));
}
