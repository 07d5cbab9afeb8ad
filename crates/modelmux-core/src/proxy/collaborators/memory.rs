use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use modelmux_types::{Billing, User};

use super::{UsageEvent, UsageStore, UserDirectory};

/// Process-local user store: token lookup plus billing persistence.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: DashMap<String, User>,
    tokens: DashMap<String, String>,
    token_requests: DashMap<String, u64>,
}

impl InMemoryUserStore {
    pub fn new(users: Vec<User>) -> Self {
        let store = Self::default();
        for user in users {
            store.upsert(user);
        }
        store
    }

    /// Insert or replace a user and index its tokens.
    pub fn upsert(&self, user: User) {
        for key in &user.api_keys {
            let key = key.trim();
            if !key.is_empty() {
                self.tokens.insert(key.to_string(), user.id.clone());
            }
        }
        self.users.insert(user.id.clone(), user);
    }

    pub fn user(&self, id: &str) -> Option<User> {
        self.users.get(id).map(|u| u.value().clone())
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn token_request_count(&self, token: &str) -> u64 {
        self.token_requests.get(token).map_or(0, |c| *c)
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserStore {
    async fn find_by_token(&self, token: &str) -> Option<User> {
        let id = self.tokens.get(token)?.value().clone();
        self.user(&id)
    }
}

#[async_trait]
impl UsageStore for InMemoryUserStore {
    async fn load_billing(&self, user_id: &str) -> Option<Billing> {
        self.users.get(user_id).map(|u| u.billing.clone())
    }

    async fn save_billing(&self, user_id: &str, billing: &Billing) {
        if let Some(mut user) = self.users.get_mut(user_id) {
            user.billing = billing.clone();
        }
    }

    async fn record_user_usage(&self, user_id: &str, token: &str, event: &UsageEvent) {
        let mut count = self.token_requests.entry(token.to_string()).or_insert(0);
        *count += 1;
        debug!(
            user_id = %user_id,
            provider = %event.provider,
            model = %event.model,
            token_requests = *count,
            "Recorded token usage"
        );
    }
}
