use std::time::Duration;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};

use crate::{
    config::JwtConfig,
    error::AppError,
    state::AppState,
    users::repo::{Role, User},
};

/// Claim bundle carried by every issued token. Stateless: expiry is the only
/// invalidation mechanism, logout is client-side discard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub iat: usize,
    pub exp: usize,
}

/// HS256 signing and verification keys derived from configuration.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let JwtConfig {
            secret,
            ttl_minutes,
        } = state.config.jwt.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::from_secs((ttl_minutes as u64) * 60),
        }
    }
}

impl JwtKeys {
    /// Issue a token embedding the user's identity and role.
    pub fn sign(&self, user: &User) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            user_id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = user.id, role = ?user.role, "jwt signed");
        Ok(token)
    }

    /// Check signature integrity and expiry, returning the decoded claims.
    /// Expiry is exact: no clock leeway, an elapsed token never verifies.
    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(user_id = data.claims.user_id, "jwt verified");
        Ok(data.claims)
    }
}

/// Authentication gate: extracts and verifies the bearer token, handing the
/// decoded claims to the handler as a typed value.
#[derive(Debug)]
pub struct AuthClaims(pub Claims);

#[async_trait]
impl<S> FromRequestParts<S> for AuthClaims
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Unauthorized("Authorization token is required".to_string())
            })?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Unauthorized("Invalid or expired token".to_string())
        })?;

        match keys.verify(token) {
            Ok(claims) => Ok(AuthClaims(claims)),
            Err(_) => {
                warn!("invalid or expired token");
                Err(AppError::Unauthorized(
                    "Invalid or expired token".to_string(),
                ))
            }
        }
    }
}

/// Authorization gate: authenticated ADMIN or MANAGER. Authentication runs
/// first; a valid MEMBER token gets 403, anything else gets 401.
#[derive(Debug)]
pub struct Staff(pub Claims);

#[async_trait]
impl<S> FromRequestParts<S> for Staff
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthClaims(claims) = AuthClaims::from_request_parts(parts, state).await?;
        if !claims.role.is_staff() {
            warn!(user_id = claims.user_id, role = ?claims.role, "staff route denied");
            return Err(AppError::Forbidden);
        }
        Ok(Staff(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    // Keys built straight from a secret: usable from synchronous tests,
    // no pool behind them.
    fn make_keys() -> JwtKeys {
        let secret = b"test-secret";
        JwtKeys {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: Duration::from_secs(300),
        }
    }

    fn make_user(role: Role) -> User {
        User {
            id: 7,
            name: "Alice".into(),
            email: "alice@example.com".into(),
            password_hash: "irrelevant".into(),
            role,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn bearer_parts(token: &str) -> Parts {
        let (parts, ()) = Request::builder()
            .uri("/events")
            .header(
                axum::http::header::AUTHORIZATION,
                format!("Bearer {token}"),
            )
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let keys = make_keys();
        let user = make_user(Role::Member);
        let token = keys.sign(&user).expect("sign");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.role, Role::Member);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn verify_rejects_tampered_token() {
        let keys = make_keys();
        let mut token = keys.sign(&make_user(Role::Admin)).unwrap();
        let last = token.pop().unwrap();
        token.push(if last == 'A' { 'B' } else { 'A' });
        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let keys = make_keys();
        let other = JwtKeys {
            encoding: EncodingKey::from_secret(b"different-secret"),
            decoding: DecodingKey::from_secret(b"different-secret"),
            ttl: Duration::from_secs(300),
        };
        let token = keys.sign(&make_user(Role::Admin)).unwrap();
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_expired_token() {
        let keys = make_keys();
        let now = OffsetDateTime::now_utc().unix_timestamp() as usize;
        // An expiry even seconds in the past must fail: exact, zero leeway.
        for elapsed in [30, 3600] {
            let claims = Claims {
                user_id: 7,
                name: "Alice".into(),
                email: "alice@example.com".into(),
                role: Role::Admin,
                iat: now - elapsed - 60,
                exp: now - elapsed,
            };
            let token = encode(&Header::default(), &claims, &keys.encoding).unwrap();
            assert!(
                keys.verify(&token).is_err(),
                "token {elapsed}s past expiry was accepted"
            );
        }
    }

    #[tokio::test]
    async fn missing_header_is_unauthorized() {
        let state = AppState::fake();
        let (mut parts, ()) = Request::builder()
            .uri("/events")
            .body(())
            .unwrap()
            .into_parts();
        let err = AuthClaims::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        match err {
            AppError::Unauthorized(msg) => {
                assert_eq!(msg, "Authorization token is required")
            }
            other => panic!("expected Unauthorized, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_token_is_unauthorized() {
        let state = AppState::fake();
        let mut parts = bearer_parts("not-a-jwt");
        let err = AuthClaims::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        match err {
            AppError::Unauthorized(msg) => assert_eq!(msg, "Invalid or expired token"),
            other => panic!("expected Unauthorized, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn staff_gate_rejects_member_with_forbidden() {
        let state = AppState::fake();
        let token = JwtKeys::from_ref(&state)
            .sign(&make_user(Role::Member))
            .unwrap();
        let mut parts = bearer_parts(&token);
        let err = Staff::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }

    #[tokio::test]
    async fn staff_gate_admits_admin_and_manager() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        for role in [Role::Admin, Role::Manager] {
            let token = keys.sign(&make_user(role)).unwrap();
            let mut parts = bearer_parts(&token);
            let Staff(claims) = Staff::from_request_parts(&mut parts, &state)
                .await
                .expect("staff role should pass");
            assert_eq!(claims.role, role);
        }
    }
}
