use anyhow::anyhow;
use chrono::{DateTime, Utc};
use url::Url;
use uuid::Uuid;

use crate::{
    domain::{
        error::DomainError,
        id::ShortCode,
        models::{NewShortLink, ShortLink},
        repository::Store,
    },
    usecase::Usecase,
};

/// Generated codes come from a sequence, so a collision only happens when a
/// custom alias already took the encoded value.
const MAX_GENERATE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct CreateLink {
    pub original_link: String,
    pub creation_date: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub custom_code: Option<String>,
}

/// Parses the target and returns its serialized form. The parser drops tabs
/// and newlines and percent-encodes non-ASCII, so the result is always a
/// valid `Location` header value.
fn check_target(raw: &str) -> Result<String, DomainError> {
    let invalid = || DomainError::invalid("Original link must be an absolute http(s) URL");
    let url = Url::parse(raw).map_err(|_| invalid())?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(url.into()),
        _ => Err(invalid()),
    }
}

impl<R: Store> Usecase<R> {
    pub async fn create_link(
        &self,
        owner: Uuid,
        request: CreateLink,
        now: DateTime<Utc>,
    ) -> Result<ShortLink, DomainError> {
        let original = request.original_link.trim();
        if original.is_empty() {
            return Err(DomainError::invalid("Original link is required"));
        }
        let target = check_target(original)?;

        if let Some(expiry) = request.expiry_date {
            if expiry <= now {
                return Err(DomainError::invalid("Expiry date must be in the future"));
            }
        }

        let new_link = |short_link: ShortCode| NewShortLink {
            original_link: target.clone(),
            short_link,
            creation_date: request.creation_date.unwrap_or(now),
            expiry_date: request.expiry_date,
            user_id: owner,
        };

        let link = match request.custom_code.as_deref().map(str::trim) {
            Some(custom) if !custom.is_empty() => {
                let code = ShortCode::custom(custom)?;
                self.repo
                    .create_link(new_link(code))
                    .await
                    .map_err(|e| match e {
                        DomainError::Conflict(_) => {
                            DomainError::Conflict("Short link is already taken".to_string())
                        }
                        other => other,
                    })?
            }
            _ => self.create_generated(new_link).await?,
        };

        tracing::info!(
            event = "short_link_created",
            id = %link.id,
            short_link = link.short_link.as_str(),
            user_id = %owner,
            original_link = link.original_link.as_str()
        );
        Ok(link)
    }

    async fn create_generated(
        &self,
        new_link: impl Fn(ShortCode) -> NewShortLink,
    ) -> Result<ShortLink, DomainError> {
        for _ in 0..MAX_GENERATE_ATTEMPTS {
            let seq = self.repo.next_sequence().await?;
            let code = ShortCode::generate(seq)?;
            match self.repo.create_link(new_link(code)).await {
                Err(DomainError::Conflict(msg)) => {
                    tracing::debug!(seq, %msg, "Generated short link collided, retrying");
                }
                other => return other,
            }
        }
        Err(DomainError::Internal(anyhow!(
            "Could not allocate a unique short link after {} attempts",
            MAX_GENERATE_ATTEMPTS
        )))
    }

    pub async fn list_links(&self, owner: Uuid) -> Result<Vec<ShortLink>, DomainError> {
        self.repo.list_links_by_owner(owner).await
    }

    pub async fn delete_link(&self, owner: Uuid, link_id: &str) -> Result<ShortLink, DomainError> {
        let not_found = || DomainError::not_found("Link not found");
        let id = Uuid::parse_str(link_id).map_err(|_| not_found())?;

        let link = self.repo.find_link_by_id(id).await?.ok_or_else(not_found)?;
        if link.user_id != owner {
            return Err(DomainError::Forbidden(
                "This link is not created by you".to_string(),
            ));
        }

        let deleted = self.repo.delete_link(id).await?.ok_or_else(not_found)?;
        tracing::info!(event = "short_link_deleted", id = %deleted.id, user_id = %owner);
        Ok(deleted)
    }

    /// Looks up a code for redirection and counts the visit.
    pub async fn resolve(&self, code: &str, now: DateTime<Utc>) -> Result<ShortLink, DomainError> {
        let code = ShortCode::new(code);

        let Some(mut link) = self.repo.find_link_by_code(&code).await? else {
            tracing::info!(
                event = "short_link_access",
                short_link = code.as_str(),
                status_code = 404
            );
            return Err(DomainError::not_found("Link not found"));
        };
        if link.is_expired_at(now) {
            tracing::info!(
                event = "short_link_access",
                short_link = code.as_str(),
                status_code = 404,
                expired = true
            );
            return Err(DomainError::not_found("Link expired"));
        }

        self.repo.increment_visits(link.id).await?;
        link.visits += 1;
        tracing::info!(
            event = "short_link_access",
            short_link = code.as_str(),
            status_code = 302
        );
        Ok(link)
    }
}
