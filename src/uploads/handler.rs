use std::path::PathBuf;

use axum::{
    extract::{Multipart, Path, State},
    response::Response,
};
use tokio::io::AsyncWriteExt;

use super::{ModelRef, ModelType, NewUpload, Storage, UploaderKind, Uploads, sanitize_filename};
use crate::api::{self, parse_id};
use crate::error::{AppError, AppResult, ValidationErrors};
use crate::handler::AppState;
use crate::users::Users;

/// Multipart fields of `POST /uploads`, the file already staged on disk.
#[derive(Debug, Default)]
struct UploadParts {
    model_type: Option<String>,
    model_id: Option<String>,
    uploader: Option<String>,
    mounted_as: Option<String>,
    filename: Option<String>,
    staged: Option<(PathBuf, i64)>,
}

/// Reads every field. Whatever was staged is removed again if the body turns
/// out to be unreadable.
async fn read_parts(storage: &Storage, multipart: Multipart) -> AppResult<UploadParts> {
    let mut parts = UploadParts::default();
    match read_fields(storage, multipart, &mut parts).await {
        Ok(()) => Ok(parts),
        Err(e) => {
            if let Some((staged, _)) = parts.staged.take() {
                let _ = tokio::fs::remove_file(staged).await;
            }
            Err(e)
        }
    }
}

async fn read_fields(storage: &Storage, mut multipart: Multipart, parts: &mut UploadParts) -> AppResult<()> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            parts.filename = field.file_name().map(str::to_string);

            // only the last file part is kept
            if let Some((previous, _)) = parts.staged.take() {
                let _ = tokio::fs::remove_file(previous).await;
            }
            let (path, mut file) = storage.stage().await?;
            parts.staged = Some((path, 0));

            let mut size = 0i64;
            while let Some(chunk) = field.chunk().await.map_err(|e| AppError::BadRequest(e.body_text()))? {
                size += chunk.len() as i64;
                Storage::append(&mut file, &chunk).await?;
            }
            file.flush().await?;
            drop(file);

            tracing::debug!(bytes = size, "staged upload body");
            if let Some((_, staged_size)) = parts.staged.as_mut() {
                *staged_size = size;
            }
            continue;
        }

        let value = field.text().await.map_err(|e| AppError::BadRequest(e.body_text()))?;
        match name.as_str() {
            "model_type" => parts.model_type = Some(value),
            "model_id" => parts.model_id = Some(value),
            "uploader" => parts.uploader = Some(value),
            "mounted_as" => parts.mounted_as = Some(value).filter(|v| !v.trim().is_empty()),
            other => tracing::debug!(field = other, "ignoring multipart field"),
        }
    }

    Ok(())
}

fn build_upload(parts: &UploadParts, errors: &mut ValidationErrors) -> (NewUpload, Option<String>) {
    let model_type = match parts.model_type.as_deref() {
        Some(raw) => ModelType::parse(raw).or_else(|| {
            errors.add("model_type", "is not included in the list");
            None
        }),
        None => None,
    };
    let model_id = match parts.model_id.as_deref().map(str::trim) {
        Some(raw) => raw.parse::<i64>().ok().or_else(|| {
            errors.add("model_id", "is not a number");
            None
        }),
        None => None,
    };
    let uploader = match parts.uploader.as_deref() {
        None => Some(UploaderKind::File),
        Some(raw) => UploaderKind::parse(raw).or_else(|| {
            errors.add("uploader", "is not included in the list");
            None
        }),
    };

    let filename = parts.filename.as_deref().and_then(sanitize_filename);
    if parts.staged.is_none() {
        errors.add("file", "can't be blank");
    } else if filename.is_none() {
        errors.add("file", "has an invalid name");
    }

    let model = match (model_type, model_id) {
        (Some(t), Some(id)) => Some(ModelRef::new(t, id)),
        _ => None,
    };

    let upload = match (uploader, model, &filename, &parts.staged) {
        (Some(uploader), Some(model), Some(filename), Some((_, size))) => {
            NewUpload::for_file(uploader, model, parts.mounted_as.as_deref(), filename, *size)
        }
        _ => NewUpload {
            size: parts.staged.as_ref().map(|(_, size)| *size),
            path: None,
            checksum: None,
            model,
            uploader,
            mount_point: parts.mounted_as.clone(),
        },
    };

    (upload, filename)
}

pub async fn create_upload(State(state): State<AppState>, multipart: Multipart) -> AppResult<Response> {
    let parts = read_parts(&state.storage, multipart).await?;
    let uploads = Uploads::new(&state.db, &state.storage);

    let mut errors = ValidationErrors::new();
    let (upload, filename) = build_upload(&parts, &mut errors);
    upload.validate(&mut errors);
    errors.merge(uploads.missing_owner(&upload).await?);

    let (staged, path) = match (errors.into_result(), &parts.staged, &upload.path) {
        (Ok(()), Some((staged, _)), Some(path)) => (staged, path),
        (result, staged, _) => {
            if let Some((staged, _)) = staged {
                let _ = tokio::fs::remove_file(staged).await;
            }
            result?;
            return Err(AppError::BadRequest("file is missing".to_string()));
        }
    };

    if let Err(e) = state.storage.promote(staged, path).await {
        let _ = tokio::fs::remove_file(staged).await;
        return Err(e.into());
    }
    let saved = uploads.save(upload.clone()).await?;

    if let (Some(UploaderKind::Avatar), Some(model), Some(identifier)) = (upload.uploader, upload.model, filename) {
        let replaced = uploads.replace_avatar(&model, saved.id).await?;
        Users::new(&state.db).set_avatar(model.id, Some(&identifier)).await?;
        if replaced > 0 {
            tracing::info!(user_id = model.id, replaced, "replaced previous avatar");
        }
    }

    tracing::info!(
        upload_id = saved.id,
        uploader = %saved.uploader,
        model_type = %saved.model_type,
        model_id = saved.model_id,
        size = saved.size,
        "stored upload"
    );
    Ok(api::created(&saved))
}

pub async fn get_upload(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Response> {
    let id = parse_id(&id, "Upload")?;

    match Uploads::new(&state.db, &state.storage).get(id).await? {
        Some(upload) => Ok(api::success(&upload)),
        None => Err(AppError::not_found("Upload")),
    }
}

pub async fn delete_upload(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Response> {
    let id = parse_id(&id, "Upload")?;
    let uploads = Uploads::new(&state.db, &state.storage);
    let upload = uploads.get(id).await?.ok_or_else(|| AppError::not_found("Upload"))?;

    uploads.destroy(&upload).await?;

    if upload.uploader == UploaderKind::Avatar.as_str() {
        if let Some(owner) = upload.owner().filter(|o| o.model_type == ModelType::User) {
            Users::new(&state.db).clear_avatar(owner.id, upload.filename()).await?;
        }
    }

    tracing::info!(upload_id = id, "deleted upload");
    Ok(api::no_content())
}
