use axum::{
    extract::{Path, Query, State},
    response::Response,
};

use super::{USER_SORT_KEYS, UserFilter, UserForm, Users, attach_avatars};
use crate::api::{self, Attributes, QueryParams, parse_id};
use crate::error::{AppError, AppResult, ValidationErrors};
use crate::handler::AppState;
use crate::sort::SortOrder;
use crate::uploads::Uploads;

pub async fn list_users(State(state): State<AppState>, Query(params): Query<QueryParams>) -> AppResult<Response> {
    let page = params.page(&state.cfg.pagination)?;
    let filter = UserFilter {
        search: params.search().map(str::to_string),
    };
    let order = SortOrder::parse(params.sort.as_deref(), USER_SORT_KEYS);

    let (mut users, total) = Users::new(&state.db).list_users(&filter, order, &page).await?;
    let queries = attach_avatars(&mut users, &Uploads::new(&state.db, &state.storage), &state.cfg.app).await?;
    tracing::debug!(users = users.len(), avatar_queries = queries, "listed users");

    Ok(api::collection(&users, &page, total))
}

pub async fn get_user(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Response> {
    let id = parse_id(&id, "User")?;
    let user = Users::new(&state.db)
        .get_user(id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    let mut users = [user];
    attach_avatars(&mut users, &Uploads::new(&state.db, &state.storage), &state.cfg.app).await?;
    let [user] = users;
    Ok(api::success(&user))
}

pub async fn create_user(State(state): State<AppState>, attrs: Attributes) -> AppResult<Response> {
    let users = Users::new(&state.db);

    let mut errors = ValidationErrors::new();
    let mut form = UserForm::default();
    form.assign(&attrs, &mut errors);
    form.validate(&mut errors);
    if let Some(username) = form.username.as_deref().filter(|s| !s.is_empty()) {
        errors.merge(users.username_taken(username, None).await?);
    }
    errors.into_result()?;

    let user = users.create_user(&form).await?;
    tracing::info!(user_id = user.id, "created user");
    Ok(api::created(&user))
}

pub async fn delete_user(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Response> {
    let id = parse_id(&id, "User")?;
    let users = Users::new(&state.db);
    let user = users.get_user(id).await?.ok_or_else(|| AppError::not_found("User"))?;

    users.delete_user(id).await?;
    let removed = Uploads::new(&state.db, &state.storage)
        .destroy_for_model(&user.model_ref())
        .await?;

    tracing::info!(user_id = id, uploads_removed = removed, "deleted user");
    Ok(api::no_content())
}
