use crate::domain::{
    error::DomainError,
    id::ShortCode,
    models::{NewShortLink, NewUser, ShortLink, User},
};
use uuid::Uuid;

/// Persistence of user accounts. A duplicate email yields
/// [`DomainError::Conflict`].
pub trait UserRepository {
    async fn create_user(&self, user: NewUser) -> Result<User, DomainError>;

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, DomainError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DomainError>;

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<(), DomainError>;

    /// Replaces the stored refresh token with `next` only while it still
    /// equals `current`. Returns whether the swap happened.
    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        current: &str,
        next: &str,
    ) -> Result<bool, DomainError>;
}

/// Persistence of short links. A duplicate short code yields
/// [`DomainError::Conflict`].
pub trait ShortLinkRepository {
    /// Next value of the sequence generated codes are derived from.
    async fn next_sequence(&self) -> Result<u64, DomainError>;

    async fn create_link(&self, link: NewShortLink) -> Result<ShortLink, DomainError>;

    async fn find_link_by_id(&self, id: Uuid) -> Result<Option<ShortLink>, DomainError>;

    async fn find_link_by_code(&self, code: &ShortCode) -> Result<Option<ShortLink>, DomainError>;

    /// Links owned by `owner`, newest first.
    async fn list_links_by_owner(&self, owner: Uuid) -> Result<Vec<ShortLink>, DomainError>;

    async fn delete_link(&self, id: Uuid) -> Result<Option<ShortLink>, DomainError>;

    async fn increment_visits(&self, id: Uuid) -> Result<(), DomainError>;
}

pub trait Store: UserRepository + ShortLinkRepository {
    async fn ping(&self) -> Result<(), DomainError>;
}
