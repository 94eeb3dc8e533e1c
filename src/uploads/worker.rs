//! Background task that fills in checksums deferred at save time.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{Storage, Uploads, hexdigest};
use crate::config;
use crate::db::Database;

/// Outcome of one pass over the pending uploads.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Pass {
    pub checksummed: usize,
    pub missing: usize,
    /// Highest id looked at; the next pass resumes after it.
    pub last_id: i64,
}

/// Hashes up to `batch` uploads with no checksum and an id above `after_id`.
/// Uploads whose file is gone are skipped and counted as missing.
pub async fn checksum_pending(db: &Database, storage: &Storage, after_id: i64, batch: u32) -> Result<Pass> {
    let uploads = Uploads::new(db, storage);
    let pending = uploads.pending_checksums(after_id, batch).await?;

    let mut pass = Pass {
        last_id: after_id,
        ..Default::default()
    };

    for upload in pending {
        pass.last_id = upload.id;

        let path = match upload.absolute_path(storage.root()) {
            Ok(path) if path.is_file() => path,
            _ => {
                tracing::warn!(upload_id = upload.id, path = %upload.path, "upload file missing, checksum skipped");
                pass.missing += 1;
                continue;
            }
        };

        let digest = tokio::task::spawn_blocking(move || hexdigest(&path)).await??;
        uploads.set_checksum(upload.id, &digest).await?;
        pass.checksummed += 1;
    }

    Ok(pass)
}

/// Runs [`checksum_pending`] every `checksum_interval_seconds` until the
/// token is cancelled. The cursor wraps to the start once a pass comes up
/// short so files that reappear are retried.
pub fn spawn_checksum_worker(
    db: Arc<Database>,
    storage: Arc<Storage>,
    cfg: &config::Uploads,
    token: CancellationToken,
) -> JoinHandle<()> {
    let period = Duration::from_secs(cfg.checksum_interval_seconds.max(1));
    let batch = cfg.checksum_batch_size.max(1);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        let mut cursor = 0;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match checksum_pending(&db, &storage, cursor, batch).await {
                        Ok(pass) => {
                            if pass.checksummed > 0 || pass.missing > 0 {
                                tracing::info!(
                                    checksummed = pass.checksummed,
                                    missing = pass.missing,
                                    "deferred checksum pass"
                                );
                            }
                            let seen = pass.checksummed + pass.missing;
                            cursor = if seen < batch as usize { 0 } else { pass.last_id };
                        }
                        Err(e) => {
                            tracing::warn!(error = %crate::unpack_error(e.as_ref()), "deferred checksum pass failed");
                        }
                    }
                }
                _ = token.cancelled() => {
                    tracing::info!("checksum worker shutting down");
                    break;
                }
            }
        }
    })
}
