mod accounts;
mod links;

use std::sync::Arc;

pub use accounts::Session;
pub use links::CreateLink;

use crate::{auth::token::TokenService, domain::repository::Store};

/// Application logic shared by every transport; generic over the store so
/// the same rules run against Postgres and the in-memory backend.
pub struct Usecase<R: Store> {
    repo: R,
    tokens: Arc<TokenService>,
}

impl<R: Store> Usecase<R> {
    pub fn new(repo: R, tokens: Arc<TokenService>) -> Self {
        Usecase { repo, tokens }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub async fn ping(&self) -> Result<(), crate::domain::error::DomainError> {
        self.repo.ping().await
    }
}
