use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

const TOKEN_LEN: usize = 48;

/// Identity bound to a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionUser {
    pub user_id: Uuid,
    pub username: String,
}

struct Entry {
    user: SessionUser,
    last_seen: Instant,
}

/// In-process session store keyed by an opaque random token.
///
/// Sessions expire after `idle_ttl` without a lookup; every successful lookup
/// refreshes the clock. State lives only as long as the process, so losing it
/// just forces a re-login.
pub struct SessionStore {
    idle_ttl: Duration,
    entries: RwLock<HashMap<String, Entry>>,
}

impl SessionStore {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            idle_ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create(&self, user: SessionUser) -> String {
        let token: String = OsRng
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect();
        let mut entries = self.entries.write().await;
        // Abandoned tokens are never looked up again, so sweep them here to
        // keep the map bounded by the set of live sessions.
        entries.retain(|_, e| e.last_seen.elapsed() < self.idle_ttl);
        entries.insert(
            token.clone(),
            Entry {
                user,
                last_seen: Instant::now(),
            },
        );
        token
    }

    /// Look up the identity behind a token, refreshing its idle clock.
    /// Expired entries are evicted on the way out.
    pub async fn get(&self, token: &str) -> Option<SessionUser> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(token) {
            Some(entry) if entry.last_seen.elapsed() < self.idle_ttl => {
                entry.last_seen = Instant::now();
                Some(entry.user.clone())
            }
            Some(_) => {
                entries.remove(token);
                None
            }
            None => None,
        }
    }

    /// Drop all state for a token. Unknown tokens are a no-op, so logout is
    /// idempotent.
    pub async fn destroy(&self, token: &str) {
        self.entries.write().await.remove(token);
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> SessionUser {
        SessionUser {
            user_id: Uuid::new_v4(),
            username: name.to_string(),
        }
    }

    #[tokio::test]
    async fn create_then_get_returns_identity() {
        let store = SessionStore::new(Duration::from_secs(60));
        let alice = user("alice");
        let token = store.create(alice.clone()).await;
        assert_eq!(token.len(), TOKEN_LEN);
        assert_eq!(store.get(&token).await, Some(alice));
    }

    #[tokio::test]
    async fn tokens_are_unique_per_session() {
        let store = SessionStore::new(Duration::from_secs(60));
        let a = store.create(user("a")).await;
        let b = store.create(user("a")).await;
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn unknown_token_is_anonymous() {
        let store = SessionStore::new(Duration::from_secs(60));
        assert_eq!(store.get("no-such-token").await, None);
    }

    #[tokio::test]
    async fn idle_sessions_expire() {
        let store = SessionStore::new(Duration::from_millis(20));
        let token = store.create(user("sleepy")).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get(&token).await, None);
    }

    #[tokio::test]
    async fn lookups_refresh_the_idle_clock() {
        let store = SessionStore::new(Duration::from_millis(80));
        let token = store.create(user("busy")).await;
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(40)).await;
            assert!(store.get(&token).await.is_some(), "session expired early");
        }
    }

    #[tokio::test]
    async fn create_sweeps_abandoned_sessions() {
        let store = SessionStore::new(Duration::from_millis(25));
        let abandoned = store.create(user("gone")).await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        let live = store.create(user("here")).await;
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(&abandoned).await, None);
        assert!(store.get(&live).await.is_some());
    }

    #[tokio::test]
    async fn destroy_is_idempotent() {
        let store = SessionStore::new(Duration::from_secs(60));
        let token = store.create(user("leaving")).await;
        store.destroy(&token).await;
        assert_eq!(store.get(&token).await, None);
        // Second destroy, and destroying a token that never existed, are fine.
        store.destroy(&token).await;
        store.destroy("never-existed").await;
    }
}
