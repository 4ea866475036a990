//! Administrative mutations: user CRUD, budget updates, reset.
//!
//! Password hashing happens at the caller; the engine only stores the
//! prepared hash and salt.

use store::{Role, User};

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};

impl Engine {
    /// Create a user with a fresh balance equal to their weekly budget.
    pub async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        salt: &str,
        role: Role,
        weekly_budget: u32,
    ) -> EngineResult<()> {
        let username = username.to_string();
        let user = User {
            password_hash: password_hash.to_string(),
            salt: salt.to_string(),
            role,
            weekly_budget,
            balance: weekly_budget.into(),
            rollover_applied_for_day: None,
            extra: Default::default(),
        };

        self.mutate(move |doc, _clock| {
            if doc.users.contains_key(&username) {
                return Err(EngineError::Conflict(format!(
                    "user {username} already exists"
                )));
            }
            doc.users.insert(username, user);
            Ok(())
        })
        .await
    }

    pub async fn delete_user(&self, username: &str) -> EngineResult<()> {
        self.mutate(|doc, _clock| {
            if doc.users.remove(username).is_none() {
                return Err(EngineError::UnknownUser(username.to_string()));
            }
            doc.notifications.remove(username);
            Ok(())
        })
        .await
    }

    pub async fn set_budget(&self, username: &str, weekly_budget: u32) -> EngineResult<()> {
        self.mutate(|doc, _clock| {
            let user = doc
                .users
                .get_mut(username)
                .ok_or_else(|| EngineError::UnknownUser(username.to_string()))?;
            user.weekly_budget = weekly_budget;
            Ok(())
        })
        .await
    }

    pub async fn set_password(
        &self,
        username: &str,
        password_hash: &str,
        salt: &str,
    ) -> EngineResult<()> {
        self.mutate(|doc, _clock| {
            let user = doc
                .users
                .get_mut(username)
                .ok_or_else(|| EngineError::UnknownUser(username.to_string()))?;
            user.password_hash = password_hash.to_string();
            user.salt = salt.to_string();
            Ok(())
        })
        .await
    }

    /// Wipe days, samples and notifications; users and config stay. The
    /// next tick rebuilds the planning window.
    pub async fn reset(&self) -> EngineResult<()> {
        self.mutate(|doc, _clock| {
            doc.days.clear();
            doc.usage_samples.clear();
            doc.notifications.clear();
            Ok(())
        })
        .await
    }
}
