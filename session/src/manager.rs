//! In-memory session set keyed by opaque token.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use tokio::sync::Mutex;

use store::Role;

use crate::model::AuthSession;

/// Manages the live set of login sessions. Tokens are 32 random bytes,
/// hex-encoded; expiry is a fixed TTL from creation.
pub struct SessionManager {
    sessions: Arc<Mutex<HashMap<String, AuthSession>>>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            ttl: Duration::seconds(ttl_seconds as i64),
        }
    }

    /// Issue a session for an authenticated user.
    pub async fn create(&self, username: &str, role: Role, now: DateTime<Utc>) -> AuthSession {
        let session = AuthSession {
            token: new_token(),
            username: username.to_string(),
            role,
            created_at: now,
            expires_at: now + self.ttl,
        };

        let mut guard = self.sessions.lock().await;
        guard.insert(session.token.clone(), session.clone());
        session
    }

    /// Resolve a presented token, refusing expired sessions.
    pub async fn resolve(&self, token: &str, now: DateTime<Utc>) -> Option<AuthSession> {
        let guard = self.sessions.lock().await;
        guard
            .get(token)
            .filter(|s| !s.is_expired(now))
            .cloned()
    }

    pub async fn revoke(&self, token: &str) {
        self.sessions.lock().await.remove(token);
    }

    /// Drop every session belonging to `username` (account deletion).
    pub async fn revoke_user(&self, username: &str) {
        self.sessions
            .lock()
            .await
            .retain(|_, s| s.username != username);
    }

    /// Sweep expired sessions; returns how many were removed.
    pub async fn gc(&self, now: DateTime<Utc>) -> usize {
        let mut guard = self.sessions.lock().await;
        let before = guard.len();
        guard.retain(|_, s| !s.is_expired(now));
        let removed = before - guard.len();
        if removed > 0 {
            tracing::debug!(removed, "expired sessions swept");
        }
        removed
    }
}

fn new_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
