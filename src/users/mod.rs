//! Users Module
//!
//! Accounts that can own an avatar upload. The `avatar` column holds the
//! file name of the current avatar; the matching upload record lives under
//! the `AvatarUploader` store directory for the user.
//!
//! Collections resolve every user's avatar upload through [`AvatarBatch`],
//! one query per owning model class.

mod avatar;
mod handler;
mod lib;
mod routes;

pub use avatar::*;
pub use lib::*;

pub use routes::routes;

pub fn migrations() -> &'static [(&'static str, &'static str)] {
    &[("users_001_schema.sql", include_str!("migrations/001_schema.sql"))]
}
