use crate::db::Database;

/// Repository over the catalog tables. Borrows the shared database so that
/// multi-statement writes can take its transaction lock.
pub struct Catalog<'a> {
    pub(super) db: &'a Database,
}

impl<'a> Catalog<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }
}
