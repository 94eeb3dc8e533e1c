//! Publishers, shops and genres: records that are nothing but a name.

use anyhow::Result;
use libsql::Value;
use serde::Serialize;
use std::marker::PhantomData;

use super::Catalog;
use crate::api::{Attributes, JsonApiResource, Page, is_blank, require_present};
use crate::db::{Filter, NOW, like_pattern};
use crate::error::ValidationErrors;
use crate::sort::SortOrder;

pub const NAMED_SORT_KEYS: &[(&str, &str)] = &[("name", "name")];

pub trait NamedKind: Send + Sync + 'static {
    const TABLE: &'static str;
    const LABEL: &'static str;
    /// Restricts the collection to records related to a given book.
    const BOOK_FILTER: &'static str;
    /// Rows that must be gone before a record can be deleted.
    const DEPENDENTS: Option<(&'static str, &'static str)> = None;
}

#[derive(Debug, Clone, Copy)]
pub struct PublisherKind;

impl NamedKind for PublisherKind {
    const TABLE: &'static str = "publishers";
    const LABEL: &'static str = "Publisher";
    const BOOK_FILTER: &'static str =
        "EXISTS (SELECT 1 FROM books WHERE books.publisher_id = publishers.id AND books.id = ?)";
    const DEPENDENTS: Option<(&'static str, &'static str)> =
        Some(("SELECT 1 FROM books WHERE publisher_id = ? LIMIT 1", "books"));
}

#[derive(Debug, Clone, Copy)]
pub struct ShopKind;

impl NamedKind for ShopKind {
    const TABLE: &'static str = "shops";
    const LABEL: &'static str = "Shop";
    const BOOK_FILTER: &'static str =
        "EXISTS (SELECT 1 FROM stocks WHERE stocks.shop_id = shops.id AND stocks.book_id = ?)";
}

#[derive(Debug, Clone, Copy)]
pub struct GenreKind;

impl NamedKind for GenreKind {
    const TABLE: &'static str = "genres";
    const LABEL: &'static str = "Genre";
    const BOOK_FILTER: &'static str =
        "EXISTS (SELECT 1 FROM books_genres WHERE books_genres.genre_id = genres.id AND books_genres.book_id = ?)";
}

#[derive(Debug, Clone, Serialize)]
pub struct NamedRecord<K> {
    #[serde(skip_serializing)]
    pub id: i64,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip)]
    kind: PhantomData<fn() -> K>,
}

pub type Publisher = NamedRecord<PublisherKind>;
pub type Shop = NamedRecord<ShopKind>;
pub type Genre = NamedRecord<GenreKind>;

impl<K: NamedKind> JsonApiResource for NamedRecord<K> {
    const TYPE: &'static str = K::TABLE;

    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedForm {
    pub name: Option<String>,
}

impl<K> From<&NamedRecord<K>> for NamedForm {
    fn from(record: &NamedRecord<K>) -> Self {
        NamedForm {
            name: Some(record.name.clone()),
        }
    }
}

impl NamedForm {
    pub fn assign(&mut self, attrs: &Attributes, errors: &mut ValidationErrors) {
        if let Some(v) = attrs.string("name", errors) {
            self.name = v;
        }
    }

    pub fn validate(&self, errors: &mut ValidationErrors) {
        require_present(errors, "name", !is_blank(&self.name));
    }
}

#[derive(Debug, Default)]
pub struct NamedFilter {
    pub search: Option<String>,
    pub book_id: Option<i64>,
}

impl NamedFilter {
    fn to_filter<K: NamedKind>(&self) -> Filter {
        let mut filter = Filter::new();
        if let Some(term) = &self.search {
            filter.push(format!(r"LOWER({}.name) LIKE ? ESCAPE '\'", K::TABLE), [like_pattern(term)]);
        }
        if let Some(book_id) = self.book_id {
            filter.push(K::BOOK_FILTER, [Value::Integer(book_id)]);
        }
        filter
    }
}

impl<'a> Catalog<'a> {
    pub async fn list_named<K: NamedKind>(
        &self,
        filter: &NamedFilter,
        order: SortOrder,
        page: &Page,
    ) -> Result<(Vec<NamedRecord<K>>, i64)> {
        let filter = filter.to_filter::<K>();
        let table = K::TABLE;
        let query = format!(
            "SELECT {table}.id, {table}.name, {table}.created_at, {table}.updated_at FROM {table} {} {} LIMIT ? OFFSET ?",
            filter.where_sql(),
            order.to_sql(table)
        );

        let mut params = filter.params();
        params.push(Value::Integer(page.limit as i64));
        params.push(Value::Integer(page.offset as i64));

        let mut rows = self.db.connection().query(&query, params).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(row_to_named(&row)?);
        }

        let total = self
            .db
            .count(
                &format!("SELECT COUNT(*) FROM {table} {}", filter.where_sql()),
                filter.params(),
            )
            .await?;

        Ok((records, total))
    }

    pub async fn get_named<K: NamedKind>(&self, id: i64) -> Result<Option<NamedRecord<K>>> {
        let query = format!("SELECT id, name, created_at, updated_at FROM {} WHERE id = ?", K::TABLE);
        let mut rows = self.db.connection().query(&query, libsql::params![id]).await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(row_to_named(&row)?))
        } else {
            Ok(None)
        }
    }

    pub async fn create_named<K: NamedKind>(&self, form: &NamedForm) -> Result<NamedRecord<K>> {
        let query = format!(
            "INSERT INTO {} (name) VALUES (?) RETURNING id, name, created_at, updated_at",
            K::TABLE
        );
        let mut rows = self
            .db
            .connection()
            .query(&query, libsql::params![form.name.clone()])
            .await?;

        if let Some(row) = rows.next().await? {
            row_to_named(&row)
        } else {
            anyhow::bail!("Failed to create {}", K::LABEL)
        }
    }

    pub async fn update_named<K: NamedKind>(&self, id: i64, form: &NamedForm) -> Result<bool> {
        let query = format!("UPDATE {} SET name = ?, updated_at = {NOW} WHERE id = ?", K::TABLE);
        let changed = self
            .db
            .connection()
            .execute(&query, libsql::params![form.name.clone(), id])
            .await?;
        Ok(changed > 0)
    }

    /// Errors recorded here keep the record in place (422 rather than a
    /// foreign key failure).
    pub async fn named_dependents<K: NamedKind>(&self, id: i64) -> Result<ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some((query, dependents)) = K::DEPENDENTS {
            let mut rows = self.db.connection().query(query, libsql::params![id]).await?;
            if rows.next().await?.is_some() {
                errors.add("base", format!("cannot delete record because dependent {dependents} exist"));
            }
        }
        Ok(errors)
    }

    pub async fn delete_named<K: NamedKind>(&self, id: i64) -> Result<bool> {
        let query = format!("DELETE FROM {} WHERE id = ?", K::TABLE);
        let result = self.db.connection().execute(&query, libsql::params![id]).await?;
        Ok(result > 0)
    }
}

fn row_to_named<K>(row: &libsql::Row) -> Result<NamedRecord<K>> {
    Ok(NamedRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
        updated_at: row.get(3)?,
        kind: PhantomData,
    })
}
