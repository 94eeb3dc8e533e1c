use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::Result;
use libsql::Value;
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::api::{JsonApiResource, identifier};
use crate::db::{Database, NOW};
use crate::error::ValidationErrors;

use super::Storage;
use super::storage::store_path;

/// Files up to this size are hashed while the upload is saved.
pub const CHECKSUM_THRESHOLD: u64 = 100 * 1024 * 1024;

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "tiff", "ico", "webp"];

/// Default `mounted_as` for avatar uploads.
pub const AVATAR_MOUNT: &str = "avatar";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModelType {
    Book,
    User,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Book => "Book",
            ModelType::User => "User",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            ModelType::Book => "books",
            ModelType::User => "users",
        }
    }

    /// Path segment used by the store layout.
    pub fn snake(&self) -> &'static str {
        match self {
            ModelType::Book => "book",
            ModelType::User => "user",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "Book" | "book" | "books" => Some(ModelType::Book),
            "User" | "user" | "users" => Some(ModelType::User),
            _ => None,
        }
    }
}

/// Polymorphic owner of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelRef {
    pub model_type: ModelType,
    pub id: i64,
}

impl ModelRef {
    pub fn new(model_type: ModelType, id: i64) -> Self {
        ModelRef { model_type, id }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploaderKind {
    File,
    Avatar,
}

impl UploaderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploaderKind::File => "FileUploader",
            UploaderKind::Avatar => "AvatarUploader",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "FileUploader" => Some(UploaderKind::File),
            "AvatarUploader" => Some(UploaderKind::Avatar),
            _ => None,
        }
    }

    /// Directory, relative to the store root, that holds a model's files.
    pub fn store_dir(&self, model: &ModelRef, mounted_as: Option<&str>) -> String {
        match self {
            UploaderKind::File => format!("{}/{}", model.model_type.snake(), model.id),
            UploaderKind::Avatar => format!(
                "-/system/{}/{}/{}",
                model.model_type.snake(),
                mounted_as.unwrap_or(AVATAR_MOUNT),
                model.id
            ),
        }
    }
}

/// Reduces a client-supplied name to a safe basename. `None` when nothing
/// usable is left.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn extension(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// SHA-256 of a file, hex encoded. The file is streamed, never loaded whole.
pub fn hexdigest(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[derive(Debug, Clone, Serialize)]
pub struct Upload {
    #[serde(skip_serializing)]
    pub id: i64,
    pub size: i64,
    pub path: String,
    pub checksum: Option<String>,
    pub model_type: String,
    pub model_id: i64,
    pub uploader: String,
    pub mount_point: Option<String>,
    pub created_at: String,
}

impl JsonApiResource for Upload {
    const TYPE: &'static str = "uploads";

    fn id(&self) -> i64 {
        self.id
    }

    fn relationships(&self) -> Option<serde_json::Value> {
        let kind = ModelType::parse(&self.model_type)?;
        Some(json!({
            "model": { "data": identifier(kind.table(), self.model_id) }
        }))
    }
}

impl Upload {
    pub fn absolute_path(&self, root: &Path) -> io::Result<PathBuf> {
        store_path(root, &self.path)
    }

    pub fn filename(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn owner(&self) -> Option<ModelRef> {
        ModelType::parse(&self.model_type).map(|t| ModelRef::new(t, self.model_id))
    }
}

/// An upload that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUpload {
    pub size: Option<i64>,
    pub path: Option<String>,
    pub checksum: Option<String>,
    pub model: Option<ModelRef>,
    pub uploader: Option<UploaderKind>,
    pub mount_point: Option<String>,
}

impl NewUpload {
    /// Record for a file already at `<store_dir>/<filename>`.
    pub fn for_file(uploader: UploaderKind, model: ModelRef, mounted_as: Option<&str>, filename: &str, size: i64) -> Self {
        let mount_point = match uploader {
            UploaderKind::Avatar => Some(mounted_as.unwrap_or(AVATAR_MOUNT).to_string()),
            UploaderKind::File => mounted_as.map(str::to_string),
        };
        NewUpload {
            size: Some(size),
            path: Some(format!("{}/{filename}", uploader.store_dir(&model, mounted_as))),
            checksum: None,
            model: Some(model),
            uploader: Some(uploader),
            mount_point,
        }
    }

    pub fn absolute_path(&self, root: &Path) -> Option<PathBuf> {
        self.path.as_deref().and_then(|p| store_path(root, p).ok())
    }

    pub fn exists(&self, root: &Path) -> bool {
        self.absolute_path(root).is_some_and(|p| p.is_file())
    }

    /// Clears the checksum, then recomputes it if the file is there.
    pub fn calculate_checksum(&mut self, root: &Path) -> io::Result<()> {
        self.checksum = None;
        if let Some(path) = self.absolute_path(root).filter(|p| p.is_file()) {
            self.checksum = Some(hexdigest(&path)?);
        }
        Ok(())
    }

    pub fn foreground_checksummable(&self, root: &Path) -> bool {
        self.checksum.is_none()
            && self.size.is_some_and(|s| s >= 0 && (s as u64) <= CHECKSUM_THRESHOLD)
            && self.exists(root)
    }

    pub fn validate(&self, errors: &mut ValidationErrors) {
        if self.size.is_none() {
            errors.add("size", "can't be blank");
        }
        if self.path.as_deref().is_none_or(|p| p.trim().is_empty()) {
            errors.add("path", "can't be blank");
        }
        if self.model.is_none() {
            errors.add("model", "can't be blank");
        }
        if self.uploader.is_none() {
            errors.add("uploader", "can't be blank");
        }

        if self.uploader == Some(UploaderKind::Avatar) {
            let is_image = self
                .path
                .as_deref()
                .and_then(extension)
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()));
            if !is_image {
                errors.add(
                    "file",
                    format!("must be one of the following types: {}", IMAGE_EXTENSIONS.join(", ")),
                );
            }
            if self.model.is_some_and(|m| m.model_type != ModelType::User) {
                errors.add("model", "must be a User for avatar uploads");
            }
            if self.mount_point.as_deref().is_some_and(|m| m != AVATAR_MOUNT) {
                errors.add("mounted_as", "is not included in the list");
            }
        }
    }
}

const UPLOAD_COLUMNS: &str = "id, size, path, checksum, model_type, model_id, uploader, mount_point, created_at";

pub struct Uploads<'a> {
    db: &'a Database,
    storage: &'a Storage,
}

impl<'a> Uploads<'a> {
    pub fn new(db: &'a Database, storage: &'a Storage) -> Self {
        Self { db, storage }
    }

    /// Owner rows must exist before anything is attached to them.
    pub async fn missing_owner(&self, upload: &NewUpload) -> Result<ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(model) = upload.model {
            if !self.db.exists(model.model_type.table(), model.id).await? {
                errors.add("model", "must exist");
            }
        }
        Ok(errors)
    }

    /// Persists the record, hashing the file first when it is small enough.
    /// An existing upload with the same uploader and path is replaced.
    pub async fn save(&self, mut upload: NewUpload) -> Result<Upload> {
        let root = self.storage.root().to_path_buf();
        if upload.foreground_checksummable(&root) {
            upload = tokio::task::spawn_blocking(move || {
                upload.calculate_checksum(&root)?;
                Ok::<_, io::Error>(upload)
            })
            .await??;
        }

        let (Some(size), Some(path), Some(model), Some(uploader)) =
            (upload.size, upload.path.as_deref(), upload.model, upload.uploader)
        else {
            anyhow::bail!("upload is missing required fields");
        };

        let query = format!(
            "INSERT INTO uploads (size, path, checksum, model_type, model_id, uploader, mount_point)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (uploader, path) DO UPDATE SET
                size = excluded.size,
                checksum = excluded.checksum,
                model_type = excluded.model_type,
                model_id = excluded.model_id,
                mount_point = excluded.mount_point,
                created_at = {NOW}
             RETURNING {UPLOAD_COLUMNS}"
        );

        let mut rows = self
            .db
            .connection()
            .query(
                &query,
                libsql::params![
                    size,
                    path,
                    upload.checksum.clone(),
                    model.model_type.as_str(),
                    model.id,
                    uploader.as_str(),
                    upload.mount_point.clone()
                ],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let saved = row_to_upload(&row)?;
                tracing::debug!(
                    upload_id = saved.id,
                    size,
                    deferred = saved.checksum.is_none(),
                    "saved upload"
                );
                Ok(saved)
            }
            None => anyhow::bail!("Failed to save upload"),
        }
    }

    pub async fn get(&self, id: i64) -> Result<Option<Upload>> {
        let query = format!("SELECT {UPLOAD_COLUMNS} FROM uploads WHERE id = ?");
        let mut rows = self.db.connection().query(&query, libsql::params![id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_upload(&row)?)),
            None => Ok(None),
        }
    }

    /// Removes the record and its file.
    pub async fn destroy(&self, upload: &Upload) -> Result<()> {
        self.db
            .connection()
            .execute("DELETE FROM uploads WHERE id = ?", libsql::params![upload.id])
            .await?;

        if !self.storage.remove(&upload.path).await? {
            tracing::warn!(upload_id = upload.id, path = %upload.path, "upload file was already gone");
        }
        Ok(())
    }

    pub async fn destroy_for_model(&self, model: &ModelRef) -> Result<usize> {
        let uploads = self.for_model(model).await?;
        for upload in &uploads {
            self.destroy(upload).await?;
        }
        Ok(uploads.len())
    }

    /// Destroys the model's other avatar uploads once `keep_id` took their
    /// place.
    pub async fn replace_avatar(&self, model: &ModelRef, keep_id: i64) -> Result<usize> {
        let previous: Vec<Upload> = self
            .for_model(model)
            .await?
            .into_iter()
            .filter(|u| u.id != keep_id && u.uploader == UploaderKind::Avatar.as_str())
            .collect();
        for upload in &previous {
            self.destroy(upload).await?;
        }
        Ok(previous.len())
    }

    pub async fn for_model(&self, model: &ModelRef) -> Result<Vec<Upload>> {
        let query = format!("SELECT {UPLOAD_COLUMNS} FROM uploads WHERE model_type = ? AND model_id = ? ORDER BY id");
        let mut rows = self
            .db
            .connection()
            .query(&query, libsql::params![model.model_type.as_str(), model.id])
            .await?;

        let mut uploads = Vec::new();
        while let Some(row) = rows.next().await? {
            uploads.push(row_to_upload(&row)?);
        }
        Ok(uploads)
    }

    /// One query for any number of paths of a single model class.
    pub async fn find_by_paths(
        &self,
        model_type: ModelType,
        uploader: UploaderKind,
        paths: &[String],
    ) -> Result<Vec<Upload>> {
        if paths.is_empty() {
            return Ok(vec![]);
        }

        let placeholders = vec!["?"; paths.len()].join(", ");
        let query = format!(
            "SELECT {UPLOAD_COLUMNS} FROM uploads
             WHERE uploader = ? AND model_type = ? AND path IN ({placeholders})"
        );

        let mut params = vec![
            Value::Text(uploader.as_str().to_string()),
            Value::Text(model_type.as_str().to_string()),
        ];
        params.extend(paths.iter().map(|p| Value::Text(p.clone())));

        let mut rows = self.db.connection().query(&query, params).await?;
        let mut uploads = Vec::new();
        while let Some(row) = rows.next().await? {
            uploads.push(row_to_upload(&row)?);
        }
        Ok(uploads)
    }

    /// Uploads still waiting for a checksum, oldest first, after `after_id`.
    pub async fn pending_checksums(&self, after_id: i64, limit: u32) -> Result<Vec<Upload>> {
        let query = format!(
            "SELECT {UPLOAD_COLUMNS} FROM uploads
             WHERE checksum IS NULL AND id > ?
             ORDER BY id ASC
             LIMIT ?"
        );
        let mut rows = self
            .db
            .connection()
            .query(&query, libsql::params![after_id, limit as i64])
            .await?;

        let mut uploads = Vec::new();
        while let Some(row) = rows.next().await? {
            uploads.push(row_to_upload(&row)?);
        }
        Ok(uploads)
    }

    pub async fn set_checksum(&self, id: i64, checksum: &str) -> Result<()> {
        self.db
            .connection()
            .execute(
                "UPDATE uploads SET checksum = ? WHERE id = ? AND checksum IS NULL",
                libsql::params![checksum, id],
            )
            .await?;
        Ok(())
    }
}

fn row_to_upload(row: &libsql::Row) -> Result<Upload> {
    Ok(Upload {
        id: row.get(0)?,
        size: row.get(1)?,
        path: row.get(2)?,
        checksum: row.get(3)?,
        model_type: row.get(4)?,
        model_id: row.get(5)?,
        uploader: row.get(6)?,
        mount_point: row.get(7)?,
        created_at: row.get(8)?,
    })
}
