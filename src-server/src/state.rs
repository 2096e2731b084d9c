use crate::database::ContentDatabase;
use crate::registry::SlotRegistry;
use crate::render::Renderer;
use crate::security::NonceIssuer;
use crate::server::AdminRoutes;
use crate::thumbnails::SlotTemplateSizes;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<ContentDatabase>>,
    pub registry: Arc<SlotRegistry>,
    pub routes: Arc<AdminRoutes>,
    pub tokens: Arc<NonceIssuer>,
    pub renderer: Arc<Renderer>,
    pub upload_dir: PathBuf,
    pub template_sizes: Arc<SlotTemplateSizes>,
}

impl AppState {
    /// Binds the registry's extension points and freezes it.
    pub fn new(
        db: ContentDatabase,
        registry: SlotRegistry,
        tokens: NonceIssuer,
        renderer: Renderer,
    ) -> Self {
        let mut routes = AdminRoutes::default();
        registry.bind_all(&mut routes);
        let upload_dir = db.upload_dir.clone();
        AppState {
            db: Arc::new(Mutex::new(db)),
            registry: Arc::new(registry),
            routes: Arc::new(routes),
            tokens: Arc::new(tokens),
            renderer: Arc::new(renderer),
            upload_dir,
            template_sizes: Arc::new(SlotTemplateSizes::default()),
        }
    }

    pub fn with_template_sizes(mut self, sizes: SlotTemplateSizes) -> Self {
        self.template_sizes = Arc::new(sizes);
        self
    }
}
