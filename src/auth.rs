use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use sea_orm::EntityTrait;

use crate::{
    AppState,
    entities::user,
    error::AppError,
};

/// The authenticated caller. Token verification happens upstream; the
/// gateway forwards the resolved account id in `x-user-id`.
pub struct CurrentUser(pub user::Model);

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let id: i32 = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .ok_or(AppError::Unauthorized)?;

        let account = user::Entity::find_by_id(id)
            .one(&state.db)
            .await?
            .ok_or(AppError::not_found("user", id))?;

        Ok(Self(account))
    }
}
