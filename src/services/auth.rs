use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};

use crate::config::database::{PgResource, StorageError};

const SESSION_COOKIES: [&str; 2] = [
    "better-auth.session_token",
    "__Secure-better-auth.session_token",
];

const SELECT_SESSION_OWNER: &str = r#"
    SELECT user_id
    FROM session
    WHERE token = $1 AND expires_at > now()
    LIMIT 1
"#;

/// An identity the auth layer has already vouched for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerId(String);

impl OwnerId {
    /// Returns `None` for blank identities so callers fail closed.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps request credentials to an owner. `Ok(None)` means unauthenticated.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<OwnerId>, StorageError>;
}

pub struct PgSessionResolver {
    db: Arc<PgResource>,
}

impl PgSessionResolver {
    pub fn new(db: Arc<PgResource>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionResolver for PgSessionResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<OwnerId>, StorageError> {
        let Some(token) = session_token(headers) else {
            return Ok(None);
        };

        let mut conn = self.db.acquire().await?;
        let user_id: Option<String> = sqlx::query_scalar(SELECT_SESSION_OWNER)
            .bind(&token)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(user_id.and_then(OwnerId::new))
    }
}

/// Pulls the session token from the auth cookie or a bearer header.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    cookie_token(headers).or_else(|| bearer_token(headers))
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| SESSION_COOKIES.contains(name))
        .and_then(|(_, value)| unsign(value))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, token)| token.trim())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

// Signed cookies look like `<token>.<signature>`.
fn unsign(value: &str) -> Option<String> {
    let value = value.trim().trim_matches('"');
    let token = value.split('.').next().unwrap_or(value);
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn owner_id_rejects_blank() {
        assert!(OwnerId::new("").is_none());
        assert!(OwnerId::new("   ").is_none());
        assert_eq!(OwnerId::new(" u1 ").unwrap().as_str(), "u1");
    }

    #[test]
    fn reads_signed_session_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; better-auth.session_token=abc123.c2lnbmF0dXJl"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn reads_secure_cookie_variant() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("__Secure-better-auth.session_token=tok"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("tok"));
    }

    #[test]
    fn falls_back_to_bearer_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(session_token(&headers).as_deref(), Some("xyz"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(session_token(&headers), None);
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        for value in ["bearer abc", "BEARER abc", "BeArEr   abc "] {
            headers.insert(header::AUTHORIZATION, HeaderValue::from_static(value));
            assert_eq!(session_token(&headers).as_deref(), Some("abc"));
        }

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer"));
        assert_eq!(session_token(&headers), None);
    }
}
