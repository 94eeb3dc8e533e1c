//! Catalog Module
//!
//! Authors, books and the name-only records around them (publishers, shops,
//! genres). Books belong to a publisher and are linked many-to-many to
//! authors and genres; shops are linked to books through `retail` stocks.
//!
//! # Usage
//!
//! ```rust,ignore
//! use booky::catalog::{self, Catalog};
//!
//! let app = Router::new()
//!     .nest("/api/v1/admin", catalog::routes())
//!     .with_state(app_state);
//!
//! let catalog = Catalog::new(&db);
//! let author = catalog.create_author(&form).await?;
//! ```
//!
//! The schema lives in the crate-level migrations since every other module
//! references these tables.

mod authors;
mod books;
mod handler;
mod lib;
mod named;
mod routes;

pub use authors::*;
pub use books::*;
pub use lib::*;
pub use named::*;

pub use routes::routes;
