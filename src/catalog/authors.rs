use anyhow::Result;
use libsql::Value;
use serde::Serialize;

use super::Catalog;
use crate::api::{Attributes, JsonApiResource, Page, is_blank, parse_date, require_present};
use crate::db::{Filter, NOW, like_pattern};
use crate::error::ValidationErrors;
use crate::sort::SortOrder;

pub const AUTHOR_SORT_KEYS: &[(&str, &str)] = &[("first_name", "first_name"), ("last_name", "last_name")];

#[derive(Debug, Clone, Serialize)]
pub struct Author {
    #[serde(skip_serializing)]
    pub id: i64,
    pub biography: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub born_in: Option<String>,
    pub died_in: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl JsonApiResource for Author {
    const TYPE: &'static str = "authors";

    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthorForm {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub biography: Option<String>,
    pub born_in: Option<String>,
    pub died_in: Option<String>,
}

impl From<&Author> for AuthorForm {
    fn from(author: &Author) -> Self {
        AuthorForm {
            first_name: Some(author.first_name.clone()),
            last_name: Some(author.last_name.clone()),
            biography: author.biography.clone(),
            born_in: author.born_in.clone(),
            died_in: author.died_in.clone(),
        }
    }
}

impl AuthorForm {
    /// Copies the attributes present in the request onto the form.
    pub fn assign(&mut self, attrs: &Attributes, errors: &mut ValidationErrors) {
        if let Some(v) = attrs.string("first_name", errors) {
            self.first_name = v;
        }
        if let Some(v) = attrs.string("last_name", errors) {
            self.last_name = v;
        }
        if let Some(v) = attrs.string("biography", errors) {
            self.biography = v.filter(|s| !s.trim().is_empty());
        }
        if let Some(v) = attrs.date("born_in", errors) {
            self.born_in = v;
        }
        if let Some(v) = attrs.date("died_in", errors) {
            self.died_in = v;
        }
    }

    pub fn validate(&self, errors: &mut ValidationErrors) {
        require_present(errors, "first_name", !is_blank(&self.first_name));
        require_present(errors, "last_name", !is_blank(&self.last_name));

        let born = self.born_in.as_deref().and_then(parse_date);
        let died = self.died_in.as_deref().and_then(parse_date);
        if let (Some(born), Some(died)) = (born, died) {
            if died < born {
                errors.add("died_in", "must be on or after born_in");
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct AuthorFilter {
    pub search: Option<String>,
    pub book_id: Option<i64>,
}

impl AuthorFilter {
    fn to_filter(&self) -> Filter {
        let mut filter = Filter::new();
        if let Some(term) = &self.search {
            let pattern = like_pattern(term);
            filter.push(
                r"(LOWER(authors.first_name) LIKE ? ESCAPE '\' OR LOWER(authors.last_name) LIKE ? ESCAPE '\')",
                [pattern.clone(), pattern],
            );
        }
        if let Some(book_id) = self.book_id {
            filter.push(
                "EXISTS (SELECT 1 FROM authors_books WHERE authors_books.author_id = authors.id AND authors_books.book_id = ?)",
                [Value::Integer(book_id)],
            );
        }
        filter
    }
}

const AUTHOR_COLUMNS: &str = "authors.id, authors.biography, authors.first_name, authors.last_name, authors.born_in, authors.died_in, authors.created_at, authors.updated_at";

impl<'a> Catalog<'a> {
    pub async fn list_authors(
        &self,
        filter: &AuthorFilter,
        order: SortOrder,
        page: &Page,
    ) -> Result<(Vec<Author>, i64)> {
        let filter = filter.to_filter();
        let query = format!(
            "SELECT {AUTHOR_COLUMNS} FROM authors {} {} LIMIT ? OFFSET ?",
            filter.where_sql(),
            order.to_sql("authors")
        );

        let mut params = filter.params();
        params.push(Value::Integer(page.limit as i64));
        params.push(Value::Integer(page.offset as i64));

        let mut rows = self.db.connection().query(&query, params).await?;
        let mut authors = Vec::new();
        while let Some(row) = rows.next().await? {
            authors.push(row_to_author(&row)?);
        }

        let total = self
            .db
            .count(
                &format!("SELECT COUNT(*) FROM authors {}", filter.where_sql()),
                filter.params(),
            )
            .await?;

        Ok((authors, total))
    }

    pub async fn get_author(&self, id: i64) -> Result<Option<Author>> {
        let query = format!("SELECT {AUTHOR_COLUMNS} FROM authors WHERE authors.id = ?");
        let mut rows = self.db.connection().query(&query, libsql::params![id]).await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(row_to_author(&row)?))
        } else {
            Ok(None)
        }
    }

    pub async fn create_author(&self, form: &AuthorForm) -> Result<Author> {
        let query = format!(
            "INSERT INTO authors (first_name, last_name, biography, born_in, died_in)
             VALUES (?, ?, ?, ?, ?)
             RETURNING {AUTHOR_COLUMNS}"
        );

        let mut rows = self
            .db
            .connection()
            .query(
                &query,
                libsql::params![
                    form.first_name.clone(),
                    form.last_name.clone(),
                    form.biography.clone(),
                    form.born_in.clone(),
                    form.died_in.clone()
                ],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            row_to_author(&row)
        } else {
            anyhow::bail!("Failed to create author")
        }
    }

    pub async fn update_author(&self, id: i64, form: &AuthorForm) -> Result<bool> {
        let query = format!(
            "UPDATE authors
             SET first_name = ?, last_name = ?, biography = ?, born_in = ?, died_in = ?, updated_at = {NOW}
             WHERE id = ?"
        );

        let changed = self
            .db
            .connection()
            .execute(
                &query,
                libsql::params![
                    form.first_name.clone(),
                    form.last_name.clone(),
                    form.biography.clone(),
                    form.born_in.clone(),
                    form.died_in.clone(),
                    id
                ],
            )
            .await?;
        Ok(changed > 0)
    }

    pub async fn delete_author(&self, id: i64) -> Result<bool> {
        let result = self
            .db
            .connection()
            .execute("DELETE FROM authors WHERE id = ?", libsql::params![id])
            .await?;
        Ok(result > 0)
    }
}

fn row_to_author(row: &libsql::Row) -> Result<Author> {
    Ok(Author {
        id: row.get(0)?,
        biography: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        born_in: row.get(4)?,
        died_in: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}
