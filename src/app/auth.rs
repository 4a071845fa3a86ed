use anyhow::{anyhow, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use pasetors::claims::{Claims, ClaimsValidationRules};
use pasetors::keys::SymmetricKey;
use pasetors::token::UntrustedToken;
use pasetors::{local, version4::V4, Local};
use sqlx::Row;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::domain::user::User;
use crate::infra::db::Db;

const TOKEN_ISSUER: &str = "quill";

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct AuthService {
    db: Db,
    token_key: [u8; 32],
    token_ttl_hours: u64,
}

impl AuthService {
    pub fn new(db: Db, token_key: [u8; 32], token_ttl_hours: u64) -> Self {
        Self {
            db,
            token_key,
            token_ttl_hours,
        }
    }

    /// Create an account. Uniqueness of the username is enforced by the
    /// store; the caller translates the constraint violation.
    pub async fn register(&self, username: String, email: String, password: String) -> Result<User> {
        let password_hash = hash_password(&password)?;
        let row = sqlx::query(
            "INSERT INTO users (username, email, password_hash) \
             VALUES ($1, $2, $3) \
             RETURNING id, username, email, created_at",
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .fetch_one(self.db.pool())
        .await?;

        Ok(User {
            id: row.get("id"),
            username: row.get("username"),
            email: row.get("email"),
            created_at: row.get("created_at"),
        })
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Option<IssuedToken>> {
        let row = sqlx::query("SELECT id, password_hash FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(self.db.pool())
            .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let user_id: Uuid = row.get("id");
        let password_hash: String = row.get("password_hash");
        if !verify_password(password, &password_hash)? {
            return Ok(None);
        }

        let token = issue_access_token(&self.token_key, user_id, self.token_ttl_hours)?;
        Ok(Some(token))
    }

    /// Resolve a bearer token to an identity. Malformed, forged, and expired
    /// tokens all come back as `None`, never as an error.
    pub fn authenticate(&self, token: &str) -> Result<Option<AuthSession>> {
        verify_access_token(&self.token_key, token)
    }
}

pub fn issue_access_token(
    key_bytes: &[u8; 32],
    user_id: Uuid,
    ttl_hours: u64,
) -> Result<IssuedToken> {
    let duration = std::time::Duration::from_secs(ttl_hours * 60 * 60);
    let mut claims = Claims::new_expires_in(&duration)?;
    claims.issuer(TOKEN_ISSUER)?;
    claims.audience(TOKEN_ISSUER)?;
    claims.subject(&user_id.to_string())?;
    claims.add_additional("typ", "access")?;

    let key = SymmetricKey::<V4>::from(key_bytes)?;
    let token = local::encrypt(&key, &claims, None, None)?;
    let expires_at = OffsetDateTime::now_utc() + Duration::hours(ttl_hours as i64);

    Ok(IssuedToken { token, expires_at })
}

pub fn verify_access_token(key_bytes: &[u8; 32], token: &str) -> Result<Option<AuthSession>> {
    let key = SymmetricKey::<V4>::from(key_bytes)?;
    let mut rules = ClaimsValidationRules::new();
    rules.validate_issuer_with(TOKEN_ISSUER);
    rules.validate_audience_with(TOKEN_ISSUER);

    let untrusted = match UntrustedToken::<Local, V4>::try_from(token) {
        Ok(token) => token,
        Err(_) => return Ok(None),
    };
    let trusted = match local::decrypt(&key, &untrusted, &rules, None, None) {
        Ok(token) => token,
        Err(_) => return Ok(None),
    };
    let claims = match trusted.payload_claims() {
        Some(claims) => claims,
        None => return Ok(None),
    };

    let is_access = claims
        .get_claim("typ")
        .and_then(|value| value.as_str())
        .map(|value| value == "access")
        .unwrap_or(false);
    if !is_access {
        return Ok(None);
    }

    let user_id = claims
        .get_claim("sub")
        .and_then(|value| value.as_str())
        .ok_or_else(|| anyhow!("missing sub claim"))?;
    let user_id = Uuid::parse_str(user_id)?;

    Ok(Some(AuthSession { user_id }))
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {}", err))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|err| anyhow!("failed to parse password hash: {}", err))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
