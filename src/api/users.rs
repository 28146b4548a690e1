use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use super::error::ApiResult;
use crate::intake::UserService;
use crate::models::{AddressPatch, AddressRecord, NewAddress, NewUser, UserPatch, UserRecord};

pub fn router(service: Arc<UserService>) -> Router {
    Router::new()
        .route("/api/submit-user", post(submit_user))
        .route("/api/users", get(list_users))
        .route(
            "/api/users/{id}",
            get(get_user).put(edit_user).delete(delete_user),
        )
        .route(
            "/api/users/{id}/addresses",
            get(list_addresses).post(add_address),
        )
        .route(
            "/api/users/{id}/addresses/{address_id}",
            put(edit_address).delete(delete_address),
        )
        .route("/api/user-stats", get(users_in_month))
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub struct EditUserRequest {
    #[serde(default)]
    pub user: UserPatch,
    #[serde(default)]
    pub addresses: Vec<NewAddress>,
}

#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    pub year: String,
    pub month: String,
}

async fn submit_user(
    State(service): State<Arc<UserService>>,
    Json(user): Json<NewUser>,
) -> ApiResult<impl IntoResponse> {
    let created = service.submit(user).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_users(State(service): State<Arc<UserService>>) -> ApiResult<Json<Vec<UserRecord>>> {
    Ok(Json(service.list().await?))
}

async fn get_user(
    State(service): State<Arc<UserService>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UserRecord>> {
    Ok(Json(service.get(id).await?))
}

async fn edit_user(
    State(service): State<Arc<UserService>>,
    Path(id): Path<Uuid>,
    Json(request): Json<EditUserRequest>,
) -> ApiResult<Json<UserRecord>> {
    Ok(Json(service.edit(id, request.user, request.addresses).await?))
}

async fn delete_user(
    State(service): State<Arc<UserService>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_addresses(
    State(service): State<Arc<UserService>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<AddressRecord>>> {
    Ok(Json(service.addresses_of(id).await?))
}

async fn add_address(
    State(service): State<Arc<UserService>>,
    Path(id): Path<Uuid>,
    Json(address): Json<NewAddress>,
) -> ApiResult<impl IntoResponse> {
    let created = service.add_address(id, address).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn edit_address(
    State(service): State<Arc<UserService>>,
    Path((id, address_id)): Path<(Uuid, Uuid)>,
    Json(patch): Json<AddressPatch>,
) -> ApiResult<Json<AddressRecord>> {
    Ok(Json(service.edit_address(id, address_id, patch).await?))
}

async fn delete_address(
    State(service): State<Arc<UserService>>,
    Path((id, address_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    service.delete_address(id, address_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn users_in_month(
    State(service): State<Arc<UserService>>,
    Query(query): Query<MonthQuery>,
) -> ApiResult<Json<Vec<UserRecord>>> {
    Ok(Json(service.users_in_month(&query.year, &query.month).await?))
}
