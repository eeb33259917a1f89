use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    /// Directory uploaded event images are written to.
    pub upload_dir: String,
    /// URL prefix under which the upload directory is served.
    pub public_prefix: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        // The signing secret is injected configuration, never a source literal.
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            ttl_minutes: parse_ttl_minutes(std::env::var("JWT_TTL_MINUTES").ok())?,
        };
        let upload_dir = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "public/uploads".into());
        let public_prefix = std::env::var("PUBLIC_PREFIX").unwrap_or_else(|_| "/public".into());
        Ok(Self {
            database_url,
            jwt,
            upload_dir,
            public_prefix,
        })
    }
}

/// Token lifetime in minutes; unset defaults to an hour. A zero or negative
/// value would issue already-expired or effectively eternal tokens, so
/// startup fails instead.
fn parse_ttl_minutes(raw: Option<String>) -> anyhow::Result<i64> {
    let Some(raw) = raw else {
        return Ok(60);
    };
    let ttl = raw
        .trim()
        .parse::<i64>()
        .context("JWT_TTL_MINUTES must be an integer")?;
    anyhow::ensure!(ttl > 0, "JWT_TTL_MINUTES must be positive");
    Ok(ttl)
}
