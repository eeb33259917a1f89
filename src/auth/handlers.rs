use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    error::{AppError, FieldError},
    state::AppState,
    users::repo::User,
};

use super::{
    dto::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse},
    jwt::JwtKeys,
    password::{hash_password, verify_password},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let email = payload.email.trim().to_lowercase();

    let mut details = Vec::new();
    if payload.name.trim().is_empty() {
        details.push(FieldError::new("name", "Required"));
    }
    if !is_valid_email(&email) {
        details.push(FieldError::new("email", "Invalid email"));
    }
    if payload.password.is_empty() {
        details.push(FieldError::new("password", "Required"));
    }
    if !details.is_empty() {
        warn!("register payload failed validation");
        return Err(AppError::Validation(details));
    }

    if User::find_by_email(&state.db, &email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::Conflict(
            "E-mail already in use. Please choose another one.".into(),
        ));
    }

    let hash = hash_password(&payload.password)?;
    let user = User::create(&state.db, payload.name.trim(), &email, &hash).await?;

    info!(user_id = user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: user.public(),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let email = payload.email.trim().to_lowercase();

    let Some(user) = User::find_by_email(&state.db, &email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(AppError::BadRequest("Invalid email or password".into()));
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = user.id, "login invalid password");
        return Err(AppError::BadRequest("Invalid email or password".into()));
    }

    let token = JwtKeys::from_ref(&state).sign(&user)?;
    info!(user_id = user.id, "user logged in");
    Ok(Json(LoginResponse { token }))
}
