//! Favourite locations per user.
//!
//! - GET /api/v1/favourites
//! - PUT /api/v1/favourites/:location_id
//! - DELETE /api/v1/favourites/:location_id
//!
//! The caller is identified by the `X-User-Id` header, set by the identity
//! layer in front of this service.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;
use sqlx::PgPool;
use utoipa::ToSchema;

use crate::db::queries;
use crate::errors::{AppError, ErrorResponse};

pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Serialize, ToSchema)]
pub struct FavouritesResponse {
    pub location_ids: Vec<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FavouriteChange {
    pub location_id: i32,
    /// False when the request did not change anything (already present / absent)
    pub changed: bool,
}

fn user_id(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::Unauthorized("Missing X-User-Id header".to_string()))
}

/// List the caller's favourite locations.
#[utoipa::path(
    get,
    path = "/api/v1/favourites",
    tag = "Favourites",
    params(("X-User-Id" = String, Header, description = "Caller identity")),
    responses(
        (status = 200, description = "Favourite location ids", body = FavouritesResponse),
        (status = 401, description = "Missing identity", body = ErrorResponse),
    )
)]
pub async fn list_favourites(
    State(pool): State<PgPool>,
    headers: HeaderMap,
) -> Result<Json<FavouritesResponse>, AppError> {
    let user = user_id(&headers)?;
    let location_ids = queries::list_favourites(&pool, &user).await?;
    Ok(Json(FavouritesResponse { location_ids }))
}

/// Add a favourite. Adding an existing favourite is a no-op.
#[utoipa::path(
    put,
    path = "/api/v1/favourites/{location_id}",
    tag = "Favourites",
    params(
        ("location_id" = i32, Path, description = "Location identifier"),
        ("X-User-Id" = String, Header, description = "Caller identity"),
    ),
    responses(
        (status = 200, description = "Favourite stored", body = FavouriteChange),
        (status = 401, description = "Missing identity", body = ErrorResponse),
    )
)]
pub async fn add_favourite(
    State(pool): State<PgPool>,
    Path(location_id): Path<i32>,
    headers: HeaderMap,
) -> Result<Json<FavouriteChange>, AppError> {
    let user = user_id(&headers)?;
    let changed = queries::add_favourite(&pool, &user, location_id).await?;
    Ok(Json(FavouriteChange {
        location_id,
        changed,
    }))
}

/// Remove a favourite. Removing an absent favourite is a no-op.
#[utoipa::path(
    delete,
    path = "/api/v1/favourites/{location_id}",
    tag = "Favourites",
    params(
        ("location_id" = i32, Path, description = "Location identifier"),
        ("X-User-Id" = String, Header, description = "Caller identity"),
    ),
    responses(
        (status = 200, description = "Favourite removed", body = FavouriteChange),
        (status = 401, description = "Missing identity", body = ErrorResponse),
    )
)]
pub async fn remove_favourite(
    State(pool): State<PgPool>,
    Path(location_id): Path<i32>,
    headers: HeaderMap,
) -> Result<Json<FavouriteChange>, AppError> {
    let user = user_id(&headers)?;
    let changed = queries::remove_favourite(&pool, &user, location_id).await?;
    Ok(Json(FavouriteChange {
        location_id,
        changed,
    }))
}
