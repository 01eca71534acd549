use actix_web::web;
use anyhow::anyhow;
use uuid::Uuid;

use crate::{
    auth::{
        password::{hash_password, verify_password},
        token::TokenPair,
    },
    domain::{
        error::DomainError,
        models::{NewUser, User},
        repository::Store,
    },
    usecase::Usecase,
};

const MIN_PASSWORD_LENGTH: usize = 8;

/// A signed-in user together with freshly issued tokens.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub tokens: TokenPair,
}

fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

/// Runs argon2 on the blocking pool so it never stalls an HTTP worker.
async fn run_blocking<T, F>(f: F) -> Result<T, DomainError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let result = web::block(f)
        .await
        .map_err(|e| DomainError::Internal(anyhow!("Password task was cancelled: {}", e)))?;
    Ok(result?)
}

impl<R: Store> Usecase<R> {
    pub async fn register(
        &self,
        email: &str,
        full_name: &str,
        password: &str,
    ) -> Result<User, DomainError> {
        let email = email.trim().to_lowercase();
        let full_name = full_name.trim();
        if email.is_empty() || full_name.is_empty() || password.trim().is_empty() {
            return Err(DomainError::invalid("All fields are required"));
        }
        if !is_plausible_email(&email) {
            return Err(DomainError::invalid("Invalid email address"));
        }
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(DomainError::invalid(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        let password = password.to_string();
        let password_hash = run_blocking(move || hash_password(&password)).await?;
        let user = self
            .repo
            .create_user(NewUser {
                email,
                full_name: full_name.to_string(),
                password_hash,
            })
            .await
            .map_err(|e| match e {
                DomainError::Conflict(_) => {
                    DomainError::Conflict("User with email already exists".to_string())
                }
                other => other,
            })?;

        tracing::info!(event = "user_registered", user_id = %user.id);
        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, DomainError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || password.is_empty() {
            return Err(DomainError::invalid("Email and password are required"));
        }

        let user = self
            .repo
            .find_user_by_email(&email)
            .await?
            .ok_or_else(|| DomainError::not_found("User does not exist"))?;

        let password = password.to_string();
        let hash = user.password_hash.clone();
        if !run_blocking(move || verify_password(&password, &hash)).await? {
            return Err(DomainError::unauthorized("Invalid user credentials"));
        }

        let session = self.start_session(user).await?;
        tracing::info!(event = "user_logged_in", user_id = %session.user.id);
        Ok(session)
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<Session, DomainError> {
        let claims = self
            .tokens
            .verify_refresh(refresh_token)
            .map_err(|_| DomainError::unauthorized("Invalid refresh token"))?;

        let mut user = self
            .repo
            .find_user_by_id(claims.sub)
            .await?
            .ok_or_else(|| DomainError::unauthorized("Invalid refresh token"))?;

        let tokens = self.tokens.issue_pair(&user)?;
        let rotated = self
            .repo
            .rotate_refresh_token(user.id, refresh_token, &tokens.refresh_token)
            .await?;
        if !rotated {
            return Err(DomainError::unauthorized("Refresh token is expired or used"));
        }
        user.refresh_token = Some(tokens.refresh_token.clone());
        Ok(Session { user, tokens })
    }

    pub async fn logout(&self, user_id: Uuid) -> Result<(), DomainError> {
        self.repo.set_refresh_token(user_id, None).await
    }

    /// Resolves the subject of a verified access token to a live account.
    pub async fn current_user(&self, user_id: Uuid) -> Result<User, DomainError> {
        self.repo
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| DomainError::unauthorized("Invalid Access Token"))
    }

    async fn start_session(&self, mut user: User) -> Result<Session, DomainError> {
        let tokens = self.tokens.issue_pair(&user)?;
        self.repo
            .set_refresh_token(user.id, Some(&tokens.refresh_token))
            .await?;
        user.refresh_token = Some(tokens.refresh_token.clone());
        Ok(Session { user, tokens })
    }
}
