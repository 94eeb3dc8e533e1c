use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Joins a stored path onto `root`. Paths that climb out with `..` are
/// refused.
pub fn store_path(root: &Path, path: &str) -> io::Result<PathBuf> {
    let p = Path::new(path);
    if p.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("upload path escapes the store: {path}"),
        ));
    }
    Ok(if p.is_absolute() { p.to_path_buf() } else { root.join(p) })
}

/// Local disk store rooted at `uploads.store_dir`.
#[derive(Debug)]
pub struct Storage {
    root: PathBuf,
    staged: AtomicU64,
}

impl Storage {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Storage {
            root: root.as_ref().to_path_buf(),
            staged: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a stored path; absolute paths are returned as they are.
    pub fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        store_path(&self.root, path)
    }

    /// Opens a fresh file under `<root>/.incoming` for a body that is still
    /// streaming in. Move it into place with [`Storage::promote`].
    pub async fn stage(&self) -> io::Result<(PathBuf, fs::File)> {
        let dir = self.root.join(".incoming");
        fs::create_dir_all(&dir).await?;

        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let seq = self.staged.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!("{nanos}-{}-{seq}", std::process::id()));
        let file = fs::File::create(&path).await?;
        Ok((path, file))
    }

    pub async fn append(file: &mut fs::File, chunk: &[u8]) -> io::Result<()> {
        file.write_all(chunk).await
    }

    pub async fn promote(&self, staged: &Path, relative: &str) -> io::Result<PathBuf> {
        let target = self.resolve(relative)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(staged, &target).await?;
        Ok(target)
    }

    /// `Ok(false)` when there was nothing to remove.
    pub async fn remove(&self, path: &str) -> io::Result<bool> {
        match fs::remove_file(self.resolve(path)?).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}
