use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{auth::config::Config, domain::models::User};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    /// Makes every issued refresh token distinct, even within one second.
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl Keys {
    fn new(secret: &str, ttl: Duration) -> Self {
        Keys {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }
}

/// Issues and verifies the HS256 tokens that authenticate API callers.
///
/// Access and refresh tokens are signed with separate secrets, so one kind
/// never verifies as the other.
pub struct TokenService {
    access: Keys,
    refresh: Keys,
    validation: Validation,
}

impl TokenService {
    pub fn new(
        access_secret: &str,
        access_ttl: Duration,
        refresh_secret: &str,
        refresh_ttl: Duration,
    ) -> Self {
        TokenService {
            access: Keys::new(access_secret, access_ttl),
            refresh: Keys::new(refresh_secret, refresh_ttl),
            validation: Validation::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.access_token_secret,
            Duration::seconds(config.access_token_ttl_secs),
            &config.refresh_token_secret,
            Duration::seconds(config.refresh_token_ttl_secs),
        )
    }

    pub fn issue_pair(&self, user: &User) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue_access(user)?,
            refresh_token: self.issue_refresh(user.id)?,
        })
    }

    pub fn issue_access(&self, user: &User) -> Result<String> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: user.id,
            email: user.email.clone(),
            iat: now.timestamp(),
            exp: (now + self.access.ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.access.encoding)
            .context("Failed to sign access token")
    }

    pub fn issue_refresh(&self, user_id: Uuid) -> Result<String> {
        let now = Utc::now();
        let claims = RefreshClaims {
            sub: user_id,
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: (now + self.refresh.ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.refresh.encoding)
            .context("Failed to sign refresh token")
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, jsonwebtoken::errors::Error> {
        decode::<AccessClaims>(token, &self.access.decoding, &self.validation).map(|d| d.claims)
    }

    pub fn verify_refresh(
        &self,
        token: &str,
    ) -> Result<RefreshClaims, jsonwebtoken::errors::Error> {
        decode::<RefreshClaims>(token, &self.refresh.decoding, &self.validation).map(|d| d.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(ttl: Duration) -> TokenService {
        TokenService::new("access-secret", ttl, "refresh-secret", ttl)
    }

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "ada@example.com".to_string(),
            full_name: "Ada".to_string(),
            password_hash: String::new(),
            refresh_token: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_access_token_round_trip() {
        let tokens = service(Duration::hours(1));
        let user = user();
        let token = tokens.issue_access(&user).unwrap();

        let claims = tokens.verify_access(&token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.email, user.email);
    }

    #[test]
    fn test_token_kinds_are_not_interchangeable() {
        let tokens = service(Duration::hours(1));
        let user = user();
        let pair = tokens.issue_pair(&user).unwrap();

        assert!(tokens.verify_access(&pair.refresh_token).is_err());
        assert!(tokens.verify_refresh(&pair.access_token).is_err());
        assert_eq!(tokens.verify_refresh(&pair.refresh_token).unwrap().sub, user.id);
    }

    #[test]
    fn test_refresh_tokens_are_unique() {
        let tokens = service(Duration::hours(1));
        let id = Uuid::new_v4();
        assert_ne!(
            tokens.issue_refresh(id).unwrap(),
            tokens.issue_refresh(id).unwrap()
        );
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let tokens = service(Duration::hours(-2));
        let token = tokens.issue_access(&user()).unwrap();
        assert!(tokens.verify_access(&token).is_err());
    }

    #[test]
    fn test_foreign_secret_is_rejected() {
        let ours = service(Duration::hours(1));
        let theirs = TokenService::new("other", Duration::hours(1), "other", Duration::hours(1));
        let token = theirs.issue_access(&user()).unwrap();
        assert!(ours.verify_access(&token).is_err());
    }
}
