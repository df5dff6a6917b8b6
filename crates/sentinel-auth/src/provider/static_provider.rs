//! Identity provider backed by hashes in configuration.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, warn};

use sentinel_core::AppResult;
use sentinel_core::config::AuthConfig;
use sentinel_core::types::UserId;

use super::IdentityProvider;
use crate::password::PasswordHasher;

/// Verifies secrets against per-user Argon2 hashes, falling back to an
/// optional shared development password.
#[derive(Debug, Clone)]
pub struct StaticIdentityProvider {
    hasher: PasswordHasher,
    users: HashMap<UserId, String>,
    fallback_hash: Option<String>,
}

impl StaticIdentityProvider {
    /// Build from the `[auth]` configuration section.
    ///
    /// The development password, if set, is hashed once here so it never sits
    /// in memory as plaintext after startup.
    pub fn from_config(config: &AuthConfig) -> AppResult<Self> {
        let hasher = PasswordHasher::new();
        let fallback_hash = match config.dev_password.as_deref() {
            Some(password) => {
                warn!("auth.dev_password is set; any unlisted user may reauthenticate with it");
                Some(hasher.hash_password(password)?)
            }
            None => None,
        };

        let users = config
            .users
            .iter()
            .map(|(user, hash)| (UserId::new(user.clone()), hash.clone()))
            .collect();

        Ok(Self {
            hasher,
            users,
            fallback_hash,
        })
    }

    /// Number of users with a dedicated hash.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn verify_secret(&self, user_id: &UserId, secret: &str) -> AppResult<bool> {
        let hash = match self.users.get(user_id).or(self.fallback_hash.as_ref()) {
            Some(hash) => hash,
            None => {
                debug!(user_id = %user_id, "No credential on record");
                return Ok(false);
            }
        };
        self.hasher.verify_password(secret, hash)
    }
}
