use std::collections::{BTreeMap, HashMap};

use anyhow::Result;

use super::User;
use crate::config;
use crate::uploads::{AVATAR_MOUNT, ModelRef, ModelType, Upload, UploaderKind, Uploads};

impl User {
    pub fn model_ref(&self) -> ModelRef {
        ModelRef::new(ModelType::User, self.id)
    }

    /// Store directory of this user's avatar, relative to the store root.
    pub fn avatar_store_dir(&self) -> String {
        UploaderKind::Avatar.store_dir(&self.model_ref(), Some(AVATAR_MOUNT))
    }

    /// Public location of the avatar. Absolute unless `only_path`; a
    /// non-zero `size` is passed on as `?width=`.
    pub fn avatar_path(&self, app: &config::App, only_path: bool, size: u32) -> Option<String> {
        let identifier = self.avatar.as_deref().filter(|s| !s.is_empty())?;

        let mut url = String::new();
        if !only_path {
            url.push_str(app.base_url.trim_end_matches('/'));
        }
        url.push_str(app.relative_url_root.trim_end_matches('/'));
        url.push_str(&format!("/uploads/{}/{identifier}", self.avatar_store_dir()));
        if size > 0 {
            url.push_str(&format!("?width={size}"));
        }
        Some(url)
    }

    /// Paths an avatar with this identifier may have been persisted under.
    /// Only the local store exists, so there is exactly one.
    pub fn upload_paths(&self, identifier: &str) -> Vec<String> {
        vec![format!("{}/{identifier}", self.avatar_store_dir())]
    }
}

/// Request-scoped loader that resolves many avatar uploads at once.
///
/// Lookups are queued per owning model class and resolved with one
/// `uploader = 'AvatarUploader' AND path IN (...)` query per class.
#[derive(Debug, Default)]
pub struct AvatarBatch {
    queued: BTreeMap<ModelType, Vec<(i64, String, Vec<String>)>>,
}

/// Uploads found by [`AvatarBatch::load`], keyed by owner and identifier.
#[derive(Debug, Default)]
pub struct LoadedAvatars {
    uploads: HashMap<(ModelType, i64, String), Upload>,
    pub queries: usize,
}

impl LoadedAvatars {
    pub fn get(&self, model: &ModelRef, identifier: &str) -> Option<&Upload> {
        self.uploads.get(&(model.model_type, model.id, identifier.to_string()))
    }
}

impl AvatarBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&mut self, model: ModelRef, identifier: &str, paths: Vec<String>) {
        self.queued
            .entry(model.model_type)
            .or_default()
            .push((model.id, identifier.to_string(), paths));
    }

    /// Queues every user that has an avatar.
    pub fn queue_users(&mut self, users: &[User]) {
        for user in users {
            if let Some(identifier) = user.avatar.as_deref().filter(|s| !s.is_empty()) {
                self.queue(user.model_ref(), identifier, user.upload_paths(identifier));
            }
        }
    }

    pub async fn load(self, uploads: &Uploads<'_>) -> Result<LoadedAvatars> {
        let mut loaded = LoadedAvatars::default();

        for (model_type, requests) in self.queued {
            let mut paths: Vec<String> = requests.iter().flat_map(|(_, _, paths)| paths.iter().cloned()).collect();
            paths.sort();
            paths.dedup();

            let found = uploads.find_by_paths(model_type, UploaderKind::Avatar, &paths).await?;
            loaded.queries += 1;

            for upload in found {
                let identifier = upload.filename().to_string();
                let wanted = requests
                    .iter()
                    .any(|(id, ident, _)| *id == upload.model_id && *ident == identifier);
                if wanted {
                    loaded.uploads.insert((model_type, upload.model_id, identifier), upload);
                }
            }
        }

        Ok(loaded)
    }
}

/// Fills `avatar_url` and `avatar_checksum` on every user from one batch.
pub async fn attach_avatars(users: &mut [User], uploads: &Uploads<'_>, app: &config::App) -> Result<usize> {
    let mut batch = AvatarBatch::new();
    batch.queue_users(users);
    let loaded = batch.load(uploads).await?;

    for user in users.iter_mut() {
        let Some(identifier) = user.avatar.clone() else {
            continue;
        };
        if let Some(upload) = loaded.get(&user.model_ref(), &identifier) {
            user.avatar_url = user.avatar_path(app, false, 0);
            user.avatar_checksum = upload.checksum.clone();
        }
    }

    Ok(loaded.queries)
}
