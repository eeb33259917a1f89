use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tracing::instrument;

use crate::{error::AppError, state::AppState};

use super::repo::{PublicUser, User};

pub fn user_routes() -> Router<AppState> {
    Router::new().route("/users", get(list_users))
}

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub users: Vec<PublicUser>,
}

#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>) -> Result<Json<UsersResponse>, AppError> {
    let users = User::list_public(&state.db).await?;
    Ok(Json(UsersResponse { users }))
}
