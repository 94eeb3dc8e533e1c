//! HTTP handlers for authors, books, publishers, shops and genres.

use axum::{
    extract::{Path, Query, State},
    response::Response,
};

use super::{
    AUTHOR_SORT_KEYS, AuthorFilter, AuthorForm, BOOK_SORT_KEYS, BookFilter, BookForm, Catalog, NAMED_SORT_KEYS,
    NamedFilter, NamedForm, NamedKind, isbn_conflict,
};
use crate::api::{self, Attributes, QueryParams, parse_id};
use crate::error::{AppError, AppResult, ValidationErrors};
use crate::handler::AppState;
use crate::sort::SortOrder;
use crate::uploads::{ModelRef, ModelType, Uploads};

// ============================================================================
// Author Handlers
// ============================================================================

pub async fn list_authors(State(state): State<AppState>, Query(params): Query<QueryParams>) -> AppResult<Response> {
    let page = params.page(&state.cfg.pagination)?;
    let filter = AuthorFilter {
        search: params.search().map(str::to_string),
        book_id: params.id_filter("book_id")?,
    };
    let order = SortOrder::parse(params.sort.as_deref(), AUTHOR_SORT_KEYS);

    let (authors, total) = Catalog::new(&state.db).list_authors(&filter, order, &page).await?;
    Ok(api::collection(&authors, &page, total))
}

pub async fn get_author(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Response> {
    let id = parse_id(&id, "Author")?;

    match Catalog::new(&state.db).get_author(id).await? {
        Some(author) => Ok(api::success(&author)),
        None => Err(AppError::not_found("Author")),
    }
}

pub async fn create_author(State(state): State<AppState>, attrs: Attributes) -> AppResult<Response> {
    let mut errors = ValidationErrors::new();
    let mut form = AuthorForm::default();
    form.assign(&attrs, &mut errors);
    form.validate(&mut errors);
    errors.into_result()?;

    let author = Catalog::new(&state.db).create_author(&form).await?;
    tracing::info!(author_id = author.id, "created author");
    Ok(api::created(&author))
}

pub async fn update_author(
    State(state): State<AppState>,
    Path(id): Path<String>,
    attrs: Attributes,
) -> AppResult<Response> {
    let id = parse_id(&id, "Author")?;
    let catalog = Catalog::new(&state.db);
    let author = catalog.get_author(id).await?.ok_or_else(|| AppError::not_found("Author"))?;

    let mut errors = ValidationErrors::new();
    let mut form = AuthorForm::from(&author);
    form.assign(&attrs, &mut errors);
    form.validate(&mut errors);
    errors.into_result()?;

    catalog.update_author(id, &form).await?;
    tracing::info!(author_id = id, "updated author");
    Ok(api::no_content())
}

pub async fn delete_author(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Response> {
    let id = parse_id(&id, "Author")?;

    if Catalog::new(&state.db).delete_author(id).await? {
        tracing::info!(author_id = id, "deleted author");
        Ok(api::no_content())
    } else {
        Err(AppError::not_found("Author"))
    }
}

// ============================================================================
// Book Handlers
// ============================================================================

pub async fn list_books(State(state): State<AppState>, Query(params): Query<QueryParams>) -> AppResult<Response> {
    let page = params.page(&state.cfg.pagination)?;
    let filter = BookFilter {
        search: params.search().map(str::to_string),
        publisher_id: params.id_filter("publisher_id")?,
        author_id: params.id_filter("author_id")?,
        genre_id: params.id_filter("genre_id")?,
        shop_id: params.id_filter("shop_id")?,
    };
    let order = SortOrder::parse(params.sort.as_deref(), BOOK_SORT_KEYS);

    let (books, total) = Catalog::new(&state.db).list_books(&filter, order, &page).await?;
    Ok(api::collection(&books, &page, total))
}

pub async fn get_book(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Response> {
    let id = parse_id(&id, "Book")?;

    match Catalog::new(&state.db).get_book(id).await? {
        Some(book) => Ok(api::success(&book)),
        None => Err(AppError::not_found("Book")),
    }
}

pub async fn create_book(State(state): State<AppState>, attrs: Attributes) -> AppResult<Response> {
    let catalog = Catalog::new(&state.db);

    let mut errors = ValidationErrors::new();
    let mut form = BookForm::default();
    form.assign(&attrs, &mut errors);
    form.validate(&mut errors);
    errors.merge(catalog.book_conflicts(&form, None).await?);
    errors.into_result()?;

    let book = catalog.create_book(&form).await.map_err(isbn_conflict)?;
    tracing::info!(book_id = book.id, "created book");
    Ok(api::created(&book))
}

pub async fn update_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
    attrs: Attributes,
) -> AppResult<Response> {
    let id = parse_id(&id, "Book")?;
    let catalog = Catalog::new(&state.db);
    let book = catalog.get_book(id).await?.ok_or_else(|| AppError::not_found("Book"))?;

    let mut errors = ValidationErrors::new();
    let mut form = BookForm::from(&book);
    form.assign(&attrs, &mut errors);
    form.validate(&mut errors);
    errors.merge(catalog.book_conflicts(&form, Some(id)).await?);
    errors.into_result()?;

    catalog.update_book(id, &form).await.map_err(isbn_conflict)?;
    tracing::info!(book_id = id, "updated book");
    Ok(api::no_content())
}

pub async fn delete_book(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Response> {
    let id = parse_id(&id, "Book")?;
    let catalog = Catalog::new(&state.db);

    if catalog.get_book(id).await?.is_none() {
        return Err(AppError::not_found("Book"));
    }

    catalog.delete_book(id).await?;
    let owner = ModelRef::new(ModelType::Book, id);
    let removed = Uploads::new(&state.db, &state.storage).destroy_for_model(&owner).await?;

    tracing::info!(book_id = id, uploads_removed = removed, "deleted book");
    Ok(api::no_content())
}

// ============================================================================
// Publisher / Shop / Genre Handlers
// ============================================================================

pub async fn list_named<K: NamedKind>(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> AppResult<Response> {
    let page = params.page(&state.cfg.pagination)?;
    let filter = NamedFilter {
        search: params.search().map(str::to_string),
        book_id: params.id_filter("book_id")?,
    };
    let order = SortOrder::parse(params.sort.as_deref(), NAMED_SORT_KEYS);

    let (records, total) = Catalog::new(&state.db).list_named::<K>(&filter, order, &page).await?;
    Ok(api::collection(&records, &page, total))
}

pub async fn get_named<K: NamedKind>(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Response> {
    let id = parse_id(&id, K::LABEL)?;

    match Catalog::new(&state.db).get_named::<K>(id).await? {
        Some(record) => Ok(api::success(&record)),
        None => Err(AppError::not_found(K::LABEL)),
    }
}

pub async fn create_named<K: NamedKind>(State(state): State<AppState>, attrs: Attributes) -> AppResult<Response> {
    let mut errors = ValidationErrors::new();
    let mut form = NamedForm::default();
    form.assign(&attrs, &mut errors);
    form.validate(&mut errors);
    errors.into_result()?;

    let record = Catalog::new(&state.db).create_named::<K>(&form).await?;
    tracing::info!(table = K::TABLE, id = record.id, "created record");
    Ok(api::created(&record))
}

pub async fn update_named<K: NamedKind>(
    State(state): State<AppState>,
    Path(id): Path<String>,
    attrs: Attributes,
) -> AppResult<Response> {
    let id = parse_id(&id, K::LABEL)?;
    let catalog = Catalog::new(&state.db);
    let record = catalog
        .get_named::<K>(id)
        .await?
        .ok_or_else(|| AppError::not_found(K::LABEL))?;

    let mut errors = ValidationErrors::new();
    let mut form = NamedForm::from(&record);
    form.assign(&attrs, &mut errors);
    form.validate(&mut errors);
    errors.into_result()?;

    catalog.update_named::<K>(id, &form).await?;
    tracing::info!(table = K::TABLE, id, "updated record");
    Ok(api::no_content())
}

pub async fn delete_named<K: NamedKind>(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Response> {
    let id = parse_id(&id, K::LABEL)?;
    let catalog = Catalog::new(&state.db);

    if catalog.get_named::<K>(id).await?.is_none() {
        return Err(AppError::not_found(K::LABEL));
    }
    catalog.named_dependents::<K>(id).await?.into_result()?;

    catalog.delete_named::<K>(id).await?;
    tracing::info!(table = K::TABLE, id, "deleted record");
    Ok(api::no_content())
}
