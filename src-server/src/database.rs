use crate::host::{MediaLibrary, MetadataStore, PermissionChecker, StoreError};
use crate::models::{Attrs, ContentItem, ImageSize, MediaAsset, Role, SizeSpec, User};
use crate::render::escape_html;
use rusqlite::{Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    DbError(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Unknown role: {0}")]
    UnknownRole(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    role TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS content_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content_type TEXT NOT NULL,
    title TEXT NOT NULL,
    author_id INTEGER,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS assets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_item_id INTEGER,
    file_path TEXT NOT NULL,
    original_name TEXT NOT NULL,
    mime_type TEXT NOT NULL,
    width INTEGER,
    height INTEGER,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS item_meta (
    item_id INTEGER NOT NULL,
    meta_key TEXT NOT NULL,
    meta_value TEXT NOT NULL,
    PRIMARY KEY (item_id, meta_key)
);
";

/// Sizes every install knows about; config may override them.
pub fn builtin_image_sizes() -> Vec<ImageSize> {
    [
        ("thumbnail", 150, 150),
        ("medium", 300, 300),
        ("large", 1024, 1024),
        ("post-thumbnail", 150, 150),
    ]
    .into_iter()
    .map(|(name, width, height)| ImageSize {
        name: name.to_string(),
        width,
        height,
    })
    .collect()
}

/// SQLite-backed host: content items, users, media assets and item metadata.
pub struct ContentDatabase {
    pub db_path: Option<PathBuf>,
    pub upload_dir: PathBuf,
    asset_base_url: String,
    upload_url: String,
    image_sizes: HashMap<String, ImageSize>,
    conn: Connection,
}

impl ContentDatabase {
    pub fn open(db_path: &Path, upload_dir: &Path) -> Result<Self, DbError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;

        // Optimize for local performance
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        info!("Opened content database at {}", db_path.display());
        Self::init(conn, Some(db_path.to_path_buf()), upload_dir)
    }

    pub fn open_in_memory(upload_dir: &Path) -> Result<Self, DbError> {
        Self::init(Connection::open_in_memory()?, None, upload_dir)
    }

    fn init(conn: Connection, db_path: Option<PathBuf>, upload_dir: &Path) -> Result<Self, DbError> {
        fs::create_dir_all(upload_dir)?;
        conn.execute_batch(SCHEMA)?;

        let image_sizes = builtin_image_sizes()
            .into_iter()
            .map(|s| (s.name.clone(), s))
            .collect();

        Ok(ContentDatabase {
            db_path,
            upload_dir: upload_dir.to_path_buf(),
            asset_base_url: "/uploads".to_string(),
            upload_url: "/media-upload".to_string(),
            image_sizes,
            conn,
        })
    }

    pub fn with_urls(mut self, asset_base_url: &str, upload_url: &str) -> Self {
        self.asset_base_url = asset_base_url.trim_end_matches('/').to_string();
        self.upload_url = upload_url.to_string();
        self
    }

    /// Registers (or replaces) a named image size.
    pub fn add_image_size(&mut self, size: ImageSize) {
        debug!("Image size {} = {}x{}", size.name, size.width, size.height);
        self.image_sizes.insert(size.name.clone(), size);
    }

    pub fn create_user(&self, name: &str, role: Role) -> Result<User, DbError> {
        self.conn.execute(
            "INSERT INTO users (name, role) VALUES (?1, ?2)",
            (name, role.as_str()),
        )?;
        Ok(User {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            role,
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>, DbError> {
        let row: Option<(String, String)> = self
            .conn
            .query_row("SELECT name, role FROM users WHERE id = ?1", [id], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()?;
        match row {
            Some((name, role)) => {
                let role = Role::parse(&role).ok_or(DbError::UnknownRole(role))?;
                Ok(Some(User { id, name, role }))
            }
            None => Ok(None),
        }
    }

    pub fn create_content_item(
        &self,
        content_type: &str,
        title: &str,
        author_id: Option<i64>,
    ) -> Result<ContentItem, DbError> {
        let now = chrono::Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO content_items (content_type, title, author_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            (content_type, title, author_id, &now),
        )?;
        Ok(ContentItem {
            id: self.conn.last_insert_rowid(),
            content_type: content_type.to_string(),
            title: title.to_string(),
            author_id,
            created_at: now,
        })
    }

    pub fn get_content_item(&self, id: i64) -> Result<Option<ContentItem>, DbError> {
        let item = self
            .conn
            .query_row(
                "SELECT id, content_type, title, author_id, created_at FROM content_items WHERE id = ?1",
                [id],
                |row| {
                    Ok(ContentItem {
                        id: row.get(0)?,
                        content_type: row.get(1)?,
                        title: row.get(2)?,
                        author_id: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(item)
    }

    /// Copies a file into the upload directory and records it as an asset.
    pub fn import_asset(
        &self,
        source_path: &Path,
        parent_item_id: Option<i64>,
    ) -> Result<MediaAsset, DbError> {
        if !source_path.exists() {
            return Err(DbError::NotFound(source_path.display().to_string()));
        }

        let original_name = source_path
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let extension = source_path
            .extension()
            .unwrap_or_default()
            .to_string_lossy()
            .to_lowercase();
        let mime_type = guess_mime(&extension);

        let dest_filename = format!("{}.{}", Uuid::new_v4(), extension);
        fs::copy(source_path, self.upload_dir.join(&dest_filename))?;

        let (width, height) = match image::image_dimensions(source_path) {
            Ok((w, h)) => (Some(w), Some(h)),
            Err(e) => {
                debug!("No dimensions for {}: {}", source_path.display(), e);
                (None, None)
            }
        };

        let asset = self.insert_asset(
            parent_item_id,
            &dest_filename,
            &original_name,
            mime_type,
            width,
            height,
        )?;
        info!("Imported asset {} as {}", asset.id, dest_filename);
        Ok(asset)
    }

    /// Records a file already present in the upload directory.
    pub fn insert_asset(
        &self,
        parent_item_id: Option<i64>,
        file_path: &str,
        original_name: &str,
        mime_type: &str,
        width: Option<u32>,
        height: Option<u32>,
    ) -> Result<MediaAsset, DbError> {
        let now = chrono::Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO assets (parent_item_id, file_path, original_name, mime_type, width, height, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            (parent_item_id, file_path, original_name, mime_type, width, height, &now),
        )?;
        Ok(MediaAsset {
            id: self.conn.last_insert_rowid(),
            parent_item_id,
            file_path: file_path.to_string(),
            original_name: original_name.to_string(),
            mime_type: mime_type.to_string(),
            width,
            height,
            created_at: now,
        })
    }

    pub fn get_asset(&self, id: i64) -> Result<Option<MediaAsset>, DbError> {
        let asset = self
            .conn
            .query_row(
                "SELECT id, parent_item_id, file_path, original_name, mime_type, width, height, created_at
                 FROM assets WHERE id = ?1",
                [id],
                asset_from_row,
            )
            .optional()?;
        Ok(asset)
    }

    /// Deletes an asset and its file. Slot associations pointing at it are
    /// left in place and render as absent.
    pub fn delete_asset(&self, id: i64) -> Result<(), DbError> {
        let Some(asset) = self.get_asset(id)? else {
            return Ok(());
        };
        let full_path = self.upload_dir.join(&asset.file_path);
        if full_path.exists() {
            if let Err(e) = fs::remove_file(&full_path) {
                warn!("Failed to remove {}: {}", full_path.display(), e);
            }
        }
        self.conn.execute("DELETE FROM assets WHERE id = ?1", [id])?;
        Ok(())
    }

    fn box_for(&self, size: &SizeSpec) -> Option<(u32, u32)> {
        match size {
            SizeSpec::Named(name) => self.image_sizes.get(name).map(|s| (s.width, s.height)),
            SizeSpec::Dimensions(w, h) => Some((*w, *h)),
        }
    }
}

fn asset_from_row(row: &Row<'_>) -> rusqlite::Result<MediaAsset> {
    Ok(MediaAsset {
        id: row.get(0)?,
        parent_item_id: row.get(1)?,
        file_path: row.get(2)?,
        original_name: row.get(3)?,
        mime_type: row.get(4)?,
        width: row.get(5)?,
        height: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn guess_mime(extension: &str) -> &'static str {
    match extension {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Scales `(width, height)` down to fit the box, keeping the aspect ratio.
/// Unknown intrinsic dimensions take the box itself.
pub fn fit_within(intrinsic: Option<(u32, u32)>, bounds: (u32, u32)) -> (u32, u32) {
    let Some((w, h)) = intrinsic.filter(|(w, h)| *w > 0 && *h > 0) else {
        return bounds;
    };
    let (max_w, max_h) = bounds;
    let scale = (max_w as f64 / w as f64)
        .min(max_h as f64 / h as f64)
        .min(1.0);
    let fit_w = ((w as f64 * scale).round() as u32).max(1);
    let fit_h = ((h as f64 * scale).round() as u32).max(1);
    (fit_w, fit_h)
}

impl MetadataStore for ContentDatabase {
    fn get_meta(&self, item_id: i64, key: &str) -> Result<Option<String>, StoreError> {
        self.conn
            .query_row(
                "SELECT meta_value FROM item_meta WHERE item_id = ?1 AND meta_key = ?2",
                (item_id, key),
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    fn set_meta(&self, item_id: i64, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO item_meta (item_id, meta_key, meta_value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(item_id, meta_key) DO UPDATE SET meta_value = excluded.meta_value",
                (item_id, key, value),
            )
            .map(|_| ())
            .map_err(|e| StoreError::WriteRejected {
                item_id,
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    fn delete_meta(&self, item_id: i64, key: &str) -> Result<(), StoreError> {
        self.conn
            .execute(
                "DELETE FROM item_meta WHERE item_id = ?1 AND meta_key = ?2",
                (item_id, key),
            )
            .map(|_| ())
            .map_err(|e| StoreError::WriteRejected {
                item_id,
                key: key.to_string(),
                reason: e.to_string(),
            })
    }
}

impl MediaLibrary for ContentDatabase {
    fn resolve_asset(&self, asset_id: i64) -> Option<MediaAsset> {
        match self.get_asset(asset_id) {
            Ok(asset) => asset,
            Err(e) => {
                warn!("Asset lookup failed for {}: {}", asset_id, e);
                None
            }
        }
    }

    fn render_asset_markup(&self, asset_id: i64, size: &SizeSpec, attrs: &Attrs) -> String {
        let Some(asset) = self.resolve_asset(asset_id).filter(|a| a.is_image()) else {
            return String::new();
        };
        let intrinsic = asset.width.zip(asset.height);
        let (width, height) = match self.box_for(size) {
            Some(bounds) => fit_within(intrinsic, bounds),
            // unknown size names render at full size
            None => intrinsic.unwrap_or((0, 0)),
        };
        let size_class = match size {
            SizeSpec::Named(name) => name.clone(),
            SizeSpec::Dimensions(w, h) => format!("{w}x{h}"),
        };

        let mut all = Attrs::new();
        all.insert(
            "src".into(),
            format!("{}/{}", self.asset_base_url, asset.file_path),
        );
        all.insert("class".into(), format!("attachment-{size_class}"));
        all.insert("alt".into(), asset.original_name.clone());
        all.insert("title".into(), asset.original_name.clone());
        for (k, v) in attrs {
            all.insert(k.clone(), v.clone());
        }

        let mut html = String::from("<img");
        if width > 0 && height > 0 {
            html.push_str(&format!(r#" width="{width}" height="{height}""#));
        }
        for (k, v) in &all {
            html.push_str(&format!(r#" {}="{}""#, escape_html(k), escape_html(v)));
        }
        html.push_str(" />");
        html
    }

    fn registered_size(&self, name: &str) -> Option<ImageSize> {
        self.image_sizes.get(name).cloned()
    }

    fn upload_surface_url(&self, item_id: i64) -> String {
        format!(
            "{}?item_id={}&type=image&TB_iframe=1",
            self.upload_url, item_id
        )
    }
}

impl PermissionChecker for ContentDatabase {
    fn can_edit(&self, user_id: i64, item_id: i64) -> bool {
        let user = match self.get_user(user_id) {
            Ok(Some(user)) => user,
            Ok(None) => return false,
            Err(e) => {
                warn!("Permission lookup failed for user {}: {}", user_id, e);
                return false;
            }
        };
        let item = match self.get_content_item(item_id) {
            Ok(Some(item)) => item,
            _ => return false,
        };
        if user.role.edits_others() {
            return true;
        }
        user.role == Role::Author && item.author_id == Some(user.id)
    }
}
