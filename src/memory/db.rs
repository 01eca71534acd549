use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use chrono::Utc;
use dashmap::{DashMap, mapref::entry::Entry};
use uuid::Uuid;

use crate::domain::{
    error::DomainError,
    id::ShortCode,
    models::{NewShortLink, NewUser, ShortLink, User},
    repository::{ShortLinkRepository, Store, UserRepository},
};

/// Process-local store. Uniqueness of emails and short codes is enforced by
/// claiming the key in an index map before the record is inserted.
#[derive(Default)]
pub struct DB {
    users: DashMap<Uuid, User>,
    users_by_email: DashMap<String, Uuid>,
    links: DashMap<Uuid, ShortLink>,
    links_by_code: DashMap<ShortCode, Uuid>,
    seq: AtomicU64,
}

impl DB {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fully formed link, bypassing creation-time validation.
    pub fn insert_link(&self, link: ShortLink) -> Result<(), DomainError> {
        match self.links_by_code.entry(link.short_link.clone()) {
            Entry::Occupied(_) => Err(DomainError::Conflict(format!(
                "short link '{}' already exists",
                link.short_link
            ))),
            Entry::Vacant(slot) => {
                slot.insert(link.id);
                self.links.insert(link.id, link);
                Ok(())
            }
        }
    }
}

impl UserRepository for Arc<DB> {
    async fn create_user(&self, user: NewUser) -> Result<User, DomainError> {
        match self.users_by_email.entry(user.email.clone()) {
            Entry::Occupied(_) => Err(DomainError::Conflict(format!(
                "user '{}' already exists",
                user.email
            ))),
            Entry::Vacant(slot) => {
                let created = User {
                    id: Uuid::new_v4(),
                    email: user.email,
                    full_name: user.full_name,
                    password_hash: user.password_hash,
                    refresh_token: None,
                    created_at: Utc::now(),
                };
                slot.insert(created.id);
                self.users.insert(created.id, created.clone());
                Ok(created)
            }
        }
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, DomainError> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DomainError> {
        let Some(id) = self.users_by_email.get(email).map(|id| *id) else {
            return Ok(None);
        };
        self.find_user_by_id(id).await
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<(), DomainError> {
        if let Some(mut user) = self.users.get_mut(&id) {
            user.refresh_token = token.map(str::to_string);
        }
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        id: Uuid,
        current: &str,
        next: &str,
    ) -> Result<bool, DomainError> {
        // The shard lock is held across compare and swap.
        let Some(mut user) = self.users.get_mut(&id) else {
            return Ok(false);
        };
        if user.refresh_token.as_deref() != Some(current) {
            return Ok(false);
        }
        user.refresh_token = Some(next.to_string());
        Ok(true)
    }
}

impl ShortLinkRepository for Arc<DB> {
    async fn next_sequence(&self) -> Result<u64, DomainError> {
        Ok(self.seq.fetch_add(1, Ordering::Relaxed) + 1)
    }

    async fn create_link(&self, link: NewShortLink) -> Result<ShortLink, DomainError> {
        let created = ShortLink {
            id: Uuid::new_v4(),
            original_link: link.original_link,
            short_link: link.short_link,
            creation_date: link.creation_date,
            expiry_date: link.expiry_date,
            user_id: link.user_id,
            visits: 0,
        };
        self.insert_link(created.clone())?;
        Ok(created)
    }

    async fn find_link_by_id(&self, id: Uuid) -> Result<Option<ShortLink>, DomainError> {
        Ok(self.links.get(&id).map(|l| l.clone()))
    }

    async fn find_link_by_code(&self, code: &ShortCode) -> Result<Option<ShortLink>, DomainError> {
        let Some(id) = self.links_by_code.get(code).map(|id| *id) else {
            return Ok(None);
        };
        self.find_link_by_id(id).await
    }

    async fn list_links_by_owner(&self, owner: Uuid) -> Result<Vec<ShortLink>, DomainError> {
        let mut links: Vec<ShortLink> = self
            .links
            .iter()
            .filter(|l| l.user_id == owner)
            .map(|l| l.clone())
            .collect();
        links.sort_by(|a, b| b.creation_date.cmp(&a.creation_date));
        Ok(links)
    }

    async fn delete_link(&self, id: Uuid) -> Result<Option<ShortLink>, DomainError> {
        let Some((_, link)) = self.links.remove(&id) else {
            return Ok(None);
        };
        self.links_by_code.remove(&link.short_link);
        Ok(Some(link))
    }

    async fn increment_visits(&self, id: Uuid) -> Result<(), DomainError> {
        if let Some(mut link) = self.links.get_mut(&id) {
            link.visits += 1;
        }
        Ok(())
    }
}

impl Store for Arc<DB> {
    async fn ping(&self) -> Result<(), DomainError> {
        Ok(())
    }
}
