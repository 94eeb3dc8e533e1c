//! Uploads Module
//!
//! Files attached to books (`FileUploader`) and user avatars
//! (`AvatarUploader`), stored on local disk under `uploads.store_dir`.
//!
//! Every upload carries a SHA-256 checksum. Files up to
//! [`CHECKSUM_THRESHOLD`] are hashed while the record is saved; larger ones
//! are saved without a checksum and picked up by the background task in
//! [`worker`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use booky::uploads::{self, Storage, Uploads};
//!
//! let storage = Storage::new("uploads");
//! let upload = Uploads::new(&db, &storage).save(new_upload).await?;
//!
//! let token = CancellationToken::new();
//! uploads::spawn_checksum_worker(db.clone(), storage.clone(), &cfg.uploads, token.clone());
//! ```

mod handler;
mod lib;
mod routes;
mod storage;
pub mod worker;

pub use lib::*;
pub use storage::Storage;
pub use worker::{checksum_pending, spawn_checksum_worker};

pub use routes::routes;

pub fn migrations() -> &'static [(&'static str, &'static str)] {
    &[("uploads_001_schema.sql", include_str!("migrations/001_schema.sql"))]
}
