use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Backend(String),
}

/// Key/value store with per-entry TTL.
///
/// `delete` of an absent key is a success, never an error; invalidation
/// callers fire deletes without checking whether the key was ever populated.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Process-local cache backend.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .await
            .get(key)
            .filter(|(_, deadline)| *deadline > now)
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Cache key layout. The exact strings are a contract shared with anything
/// else that reads or invalidates the same store, so they are built in one
/// place only.
pub mod keys {
    use sea_orm::prelude::Uuid;

    /// Organization ids visible to a user, the base set behind every
    /// feed query.
    pub fn visible_orgs(user_id: Uuid) -> String {
        format!("feed_queryset_user_{user_id}")
    }

    /// A user's combined recent feed across all their organizations.
    pub fn my_feed(user_id: Uuid) -> String {
        format!("my_feed_user_{user_id}")
    }

    /// First page of the paginated feed listing. Later pages are never
    /// cached.
    pub fn feed_list_page1(user_id: Uuid) -> String {
        format!("feed_list_user_{user_id}_page_1")
    }

    pub fn org_feed(organization_id: Uuid, user_id: Uuid) -> String {
        format!("org_feed_{organization_id}_user_{user_id}")
    }

    pub fn project_feed(project_id: Uuid, user_id: Uuid) -> String {
        format!("project_feed_{project_id}_user_{user_id}")
    }

    pub fn user_profile(user_id: Uuid) -> String {
        format!("user_profile_{user_id}")
    }
}
