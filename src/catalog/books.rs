use anyhow::Result;
use libsql::Value;
use serde::Serialize;
use serde_json::json;

use super::Catalog;
use crate::api::{Attributes, JsonApiResource, Page, identifier, is_blank, require_present};
use crate::db::{Filter, NOW, like_pattern, split_ids};
use crate::error::{AppError, ValidationErrors};
use crate::sort::SortOrder;

pub const BOOK_SORT_KEYS: &[(&str, &str)] = &[
    ("title", "title"),
    ("published", "published_at"),
    ("pages", "pages_count"),
];

#[derive(Debug, Clone, Serialize)]
pub struct Book {
    #[serde(skip_serializing)]
    pub id: i64,
    pub title: String,
    pub pages_count: i64,
    pub published_at: String,
    pub isbn_10: Option<String>,
    pub isbn_13: Option<String>,
    pub weight: Option<f64>,
    pub publisher_id: i64,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing)]
    pub author_ids: Vec<i64>,
    #[serde(skip_serializing)]
    pub genre_ids: Vec<i64>,
}

impl JsonApiResource for Book {
    const TYPE: &'static str = "books";

    fn id(&self) -> i64 {
        self.id
    }

    fn relationships(&self) -> Option<serde_json::Value> {
        Some(json!({
            "publisher": { "data": identifier("publishers", self.publisher_id) },
            "authors": {
                "data": self.author_ids.iter().map(|id| identifier("authors", *id)).collect::<Vec<_>>()
            },
            "genres": {
                "data": self.genre_ids.iter().map(|id| identifier("genres", *id)).collect::<Vec<_>>()
            },
        }))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookForm {
    pub title: Option<String>,
    pub pages_count: Option<i64>,
    pub published_at: Option<String>,
    pub isbn_10: Option<String>,
    pub isbn_13: Option<String>,
    pub weight: Option<f64>,
    pub publisher_id: Option<i64>,
    /// `None` leaves the existing links untouched on update.
    pub author_ids: Option<Vec<i64>>,
    pub genre_ids: Option<Vec<i64>>,
}

impl From<&Book> for BookForm {
    fn from(book: &Book) -> Self {
        BookForm {
            title: Some(book.title.clone()),
            pages_count: Some(book.pages_count),
            published_at: Some(book.published_at.clone()),
            isbn_10: book.isbn_10.clone(),
            isbn_13: book.isbn_13.clone(),
            weight: book.weight,
            publisher_id: Some(book.publisher_id),
            author_ids: None,
            genre_ids: None,
        }
    }
}

impl BookForm {
    pub fn assign(&mut self, attrs: &Attributes, errors: &mut ValidationErrors) {
        if let Some(v) = attrs.string("title", errors) {
            self.title = v;
        }
        if let Some(v) = attrs.integer("pages_count", errors) {
            self.pages_count = v;
        }
        if let Some(v) = attrs.date("published_at", errors) {
            self.published_at = v;
        }
        if let Some(v) = attrs.string("isbn_10", errors) {
            self.isbn_10 = v.filter(|s| !s.trim().is_empty());
        }
        if let Some(v) = attrs.string("isbn_13", errors) {
            self.isbn_13 = v.filter(|s| !s.trim().is_empty());
        }
        if let Some(v) = attrs.number("weight", errors) {
            self.weight = v;
        }
        if let Some(v) = attrs.integer("publisher_id", errors) {
            self.publisher_id = v;
        }
        if let Some(v) = attrs.ids("author_ids", errors) {
            self.author_ids = Some(v);
        }
        if let Some(v) = attrs.ids("genre_ids", errors) {
            self.genre_ids = Some(v);
        }
    }

    /// Checks that need no database access.
    pub fn validate(&self, errors: &mut ValidationErrors) {
        require_present(errors, "title", !is_blank(&self.title));
        require_present(errors, "published_at", self.published_at.is_some());
        require_present(errors, "publisher", self.publisher_id.is_some() || errors.has("publisher_id"));

        match self.pages_count {
            None => require_present(errors, "pages_count", false),
            Some(n) if n < 1 => errors.add("pages_count", "must be greater than or equal to 1"),
            Some(_) => {}
        }

        if let Some(weight) = self.weight {
            if weight < 0.0 {
                errors.add("weight", "must be greater than or equal to 0.0");
            }
        }

        for (field, expected, value) in [("isbn_10", 10, &self.isbn_10), ("isbn_13", 13, &self.isbn_13)] {
            if let Some(isbn) = value {
                if isbn.chars().count() != expected {
                    errors.add(field, format!("is the wrong length (should be {expected} characters)"));
                }
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct BookFilter {
    pub search: Option<String>,
    pub publisher_id: Option<i64>,
    pub author_id: Option<i64>,
    pub genre_id: Option<i64>,
    pub shop_id: Option<i64>,
}

impl BookFilter {
    fn to_filter(&self) -> Filter {
        let mut filter = Filter::new();
        if let Some(term) = &self.search {
            filter.push(r"LOWER(books.title) LIKE ? ESCAPE '\'", [like_pattern(term)]);
        }
        if let Some(id) = self.publisher_id {
            filter.push("books.publisher_id = ?", [Value::Integer(id)]);
        }
        if let Some(id) = self.author_id {
            filter.push(
                "EXISTS (SELECT 1 FROM authors_books WHERE authors_books.book_id = books.id AND authors_books.author_id = ?)",
                [Value::Integer(id)],
            );
        }
        if let Some(id) = self.genre_id {
            filter.push(
                "EXISTS (SELECT 1 FROM books_genres WHERE books_genres.book_id = books.id AND books_genres.genre_id = ?)",
                [Value::Integer(id)],
            );
        }
        if let Some(id) = self.shop_id {
            filter.push(
                "EXISTS (SELECT 1 FROM stocks WHERE stocks.book_id = books.id AND stocks.shop_id = ?)",
                [Value::Integer(id)],
            );
        }
        filter
    }
}

const BOOK_COLUMNS: &str = r#"
    books.id,
    books.title,
    books.pages_count,
    books.published_at,
    books.isbn_10,
    books.isbn_13,
    books.weight,
    books.publisher_id,
    books.created_at,
    books.updated_at,
    (SELECT GROUP_CONCAT(author_id) FROM authors_books WHERE authors_books.book_id = books.id) AS author_ids,
    (SELECT GROUP_CONCAT(genre_id) FROM books_genres WHERE books_genres.book_id = books.id) AS genre_ids
"#;

impl<'a> Catalog<'a> {
    pub async fn list_books(&self, filter: &BookFilter, order: SortOrder, page: &Page) -> Result<(Vec<Book>, i64)> {
        let filter = filter.to_filter();
        let query = format!(
            "SELECT {BOOK_COLUMNS} FROM books {} {} LIMIT ? OFFSET ?",
            filter.where_sql(),
            order.to_sql("books")
        );

        let mut params = filter.params();
        params.push(Value::Integer(page.limit as i64));
        params.push(Value::Integer(page.offset as i64));

        let mut rows = self.db.connection().query(&query, params).await?;
        let mut books = Vec::new();
        while let Some(row) = rows.next().await? {
            books.push(row_to_book(&row)?);
        }

        let total = self
            .db
            .count(
                &format!("SELECT COUNT(*) FROM books {}", filter.where_sql()),
                filter.params(),
            )
            .await?;

        Ok((books, total))
    }

    pub async fn get_book(&self, id: i64) -> Result<Option<Book>> {
        let query = format!("SELECT {BOOK_COLUMNS} FROM books WHERE books.id = ?");
        let mut rows = self.db.connection().query(&query, libsql::params![id]).await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(row_to_book(&row)?))
        } else {
            Ok(None)
        }
    }

    /// Checks that need the database: referenced rows exist and ISBNs are
    /// unique regardless of case. `book_id` is the record being updated.
    pub async fn book_conflicts(&self, form: &BookForm, book_id: Option<i64>) -> Result<ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Some(publisher_id) = form.publisher_id {
            if !self.db.exists("publishers", publisher_id).await? {
                errors.add("publisher", "must exist");
            }
        }

        for (field, value) in [("isbn_10", &form.isbn_10), ("isbn_13", &form.isbn_13)] {
            let Some(isbn) = value else { continue };
            let query = format!("SELECT 1 FROM books WHERE LOWER({field}) = LOWER(?) AND id != ? LIMIT 1");
            let mut rows = self
                .db
                .connection()
                .query(&query, libsql::params![isbn.clone(), book_id.unwrap_or(0)])
                .await?;
            if rows.next().await?.is_some() {
                errors.add(field, "has already been taken");
            }
        }

        for (field, table, ids) in [("author_ids", "authors", &form.author_ids), ("genre_ids", "genres", &form.genre_ids)] {
            for id in ids.iter().flatten() {
                if !self.db.exists(table, *id).await? {
                    errors.add(field, format!("references a missing record ({id})"));
                }
            }
        }

        Ok(errors)
    }

    pub async fn create_book(&self, form: &BookForm) -> Result<Book> {
        let _guard = self.db.lock().await;
        self.db.begin().await?;

        let result = self.create_book_internal(form).await;
        let book_id = self.db.finish(result).await?;

        match self.get_book(book_id).await? {
            Some(book) => Ok(book),
            None => anyhow::bail!("Failed to create book"),
        }
    }

    async fn create_book_internal(&self, form: &BookForm) -> Result<i64> {
        let insert_book = r#"
            INSERT INTO books (title, pages_count, published_at, isbn_10, isbn_13, weight, publisher_id)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
        "#;

        let mut rows = self
            .db
            .connection()
            .query(
                insert_book,
                libsql::params![
                    form.title.clone(),
                    form.pages_count,
                    form.published_at.clone(),
                    form.isbn_10.clone(),
                    form.isbn_13.clone(),
                    form.weight,
                    form.publisher_id
                ],
            )
            .await?;

        let book_id: i64 = if let Some(row) = rows.next().await? {
            row.get(0)?
        } else {
            anyhow::bail!("Failed to create book")
        };

        self.link_book(book_id, form).await?;
        Ok(book_id)
    }

    pub async fn update_book(&self, book_id: i64, form: &BookForm) -> Result<bool> {
        let _guard = self.db.lock().await;
        self.db.begin().await?;

        let result = self.update_book_internal(book_id, form).await;
        self.db.finish(result).await
    }

    async fn update_book_internal(&self, book_id: i64, form: &BookForm) -> Result<bool> {
        let query = format!(
            "UPDATE books
             SET title = ?, pages_count = ?, published_at = ?, isbn_10 = ?, isbn_13 = ?, weight = ?,
                 publisher_id = ?, updated_at = {NOW}
             WHERE id = ?"
        );

        let changed = self
            .db
            .connection()
            .execute(
                &query,
                libsql::params![
                    form.title.clone(),
                    form.pages_count,
                    form.published_at.clone(),
                    form.isbn_10.clone(),
                    form.isbn_13.clone(),
                    form.weight,
                    form.publisher_id,
                    book_id
                ],
            )
            .await?;

        if changed == 0 {
            return Ok(false);
        }

        self.link_book(book_id, form).await?;
        Ok(true)
    }

    /// Replaces the author/genre links named on the form.
    async fn link_book(&self, book_id: i64, form: &BookForm) -> Result<()> {
        let conn = self.db.connection();

        if let Some(author_ids) = &form.author_ids {
            conn.execute("DELETE FROM authors_books WHERE book_id = ?", libsql::params![book_id])
                .await?;
            for author_id in author_ids {
                conn.execute(
                    "INSERT OR IGNORE INTO authors_books (author_id, book_id) VALUES (?, ?)",
                    libsql::params![*author_id, book_id],
                )
                .await?;
            }
        }

        if let Some(genre_ids) = &form.genre_ids {
            conn.execute("DELETE FROM books_genres WHERE book_id = ?", libsql::params![book_id])
                .await?;
            for genre_id in genre_ids {
                conn.execute(
                    "INSERT OR IGNORE INTO books_genres (book_id, genre_id) VALUES (?, ?)",
                    libsql::params![book_id, *genre_id],
                )
                .await?;
            }
        }

        Ok(())
    }

    /// Join rows, stocks and sales go with the book through cascading keys.
    pub async fn delete_book(&self, book_id: i64) -> Result<bool> {
        let result = self
            .db
            .connection()
            .execute("DELETE FROM books WHERE id = ?", libsql::params![book_id])
            .await?;
        Ok(result > 0)
    }
}

fn row_to_book(row: &libsql::Row) -> Result<Book> {
    Ok(Book {
        id: row.get(0)?,
        title: row.get(1)?,
        pages_count: row.get(2)?,
        published_at: row.get(3)?,
        isbn_10: row.get(4)?,
        isbn_13: row.get(5)?,
        weight: row.get(6)?,
        publisher_id: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        author_ids: split_ids(row.get(10)?),
        genre_ids: split_ids(row.get(11)?),
    })
}

/// Turns a unique-index failure on an ISBN into the validation error
/// [`Catalog::book_conflicts`] would have reported. Two writers can both pass
/// that check before either one inserts.
pub fn isbn_conflict(err: anyhow::Error) -> AppError {
    for field in ["isbn_10", "isbn_13"] {
        let index = format!("index_books_on_lower_{field}");
        if err.chain().any(|e| e.to_string().contains(&index)) {
            let mut errors = ValidationErrors::new();
            errors.add(field, "has already been taken");
            return AppError::Validation(errors);
        }
    }
    AppError::Internal(err)
}
