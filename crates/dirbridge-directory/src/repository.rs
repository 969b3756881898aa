//! In-memory user repository, keyed by username

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use dirbridge_core::{DirectoryUser, Result, UserRepository};

#[derive(Debug, Default)]
pub struct InMemoryUserRepository<U> {
    users: RwLock<HashMap<String, U>>,
}

impl<U> InMemoryUserRepository<U>
where
    U: DirectoryUser + Clone,
{
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Seed the repository with existing users
    pub fn with_users(users: impl IntoIterator<Item = U>) -> Self {
        let users = users
            .into_iter()
            .map(|user| (user.username().to_string(), user))
            .collect();
        Self {
            users: RwLock::new(users),
        }
    }

    pub async fn all(&self) -> Vec<U> {
        self.users.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }
}

#[async_trait]
impl<U> UserRepository<U> for InMemoryUserRepository<U>
where
    U: DirectoryUser + Clone + 'static,
{
    async fn find_by_username(&self, username: &str) -> Result<Option<U>> {
        Ok(self.users.read().await.get(username).cloned())
    }

    async fn save(&self, user: &U) -> Result<()> {
        self.users
            .write()
            .await
            .insert(user.username().to_string(), user.clone());
        Ok(())
    }
}
