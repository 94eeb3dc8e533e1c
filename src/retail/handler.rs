use axum::{
    extract::{Path, Query, State},
    response::Response,
};

use super::{QuantityForm, Retail};
use crate::api::{self, Attributes, QueryParams, parse_id};
use crate::error::{AppError, AppResult, ValidationErrors};
use crate::handler::AppState;

async fn shop_id(state: &AppState, raw: &str) -> AppResult<i64> {
    let id = parse_id(raw, "Shop")?;
    if !state.db.exists("shops", id).await? {
        return Err(AppError::not_found("Shop"));
    }
    Ok(id)
}

fn read_form(attrs: &Attributes, minimum: i64) -> (QuantityForm, ValidationErrors) {
    let mut errors = ValidationErrors::new();
    let mut form = QuantityForm::default();
    form.assign(attrs, &mut errors);
    form.validate(minimum, &mut errors);
    (form, errors)
}

pub async fn list_stocks(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<QueryParams>,
) -> AppResult<Response> {
    let shop_id = shop_id(&state, &id).await?;
    let page = params.page(&state.cfg.pagination)?;

    let (stocks, total) = Retail::new(&state.db).list_stocks(shop_id, &page).await?;
    Ok(api::collection(&stocks, &page, total))
}

pub async fn set_stock(
    State(state): State<AppState>,
    Path(id): Path<String>,
    attrs: Attributes,
) -> AppResult<Response> {
    let shop_id = shop_id(&state, &id).await?;
    let retail = Retail::new(&state.db);

    let (form, mut errors) = read_form(&attrs, 0);
    errors.merge(retail.book_missing(&form).await?);
    errors.into_result()?;

    let (Some(book_id), Some(quantity)) = (form.book_id, form.quantity) else {
        return Err(AppError::BadRequest("book_id and quantity are required".to_string()));
    };

    let stock = retail.set_stock(shop_id, book_id, quantity).await?;
    tracing::info!(shop_id, book_id, quantity, "set stock");
    Ok(api::success(&stock))
}

pub async fn list_sales(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<QueryParams>,
) -> AppResult<Response> {
    let shop_id = shop_id(&state, &id).await?;
    let page = params.page(&state.cfg.pagination)?;

    let (sales, total) = Retail::new(&state.db).list_sales(shop_id, &page).await?;
    Ok(api::collection(&sales, &page, total))
}

pub async fn create_sale(
    State(state): State<AppState>,
    Path(id): Path<String>,
    attrs: Attributes,
) -> AppResult<Response> {
    let shop_id = shop_id(&state, &id).await?;
    let retail = Retail::new(&state.db);

    let (form, mut errors) = read_form(&attrs, 1);
    errors.merge(retail.book_missing(&form).await?);
    errors.into_result()?;

    let (Some(book_id), Some(quantity)) = (form.book_id, form.quantity) else {
        return Err(AppError::BadRequest("book_id and quantity are required".to_string()));
    };

    let sale = retail
        .sell(shop_id, book_id, quantity)
        .await?
        .map_err(AppError::Validation)?;
    tracing::info!(shop_id, book_id, quantity, sale_id = sale.id, "recorded sale");
    Ok(api::created(&sale))
}
