//! Identity provider configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Static identity provider configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// User id to Argon2 PHC password hash.
    #[serde(default)]
    pub users: HashMap<String, String>,
    /// Shared password accepted for any user not listed in `users`.
    ///
    /// Development only; hashed once at startup.
    #[serde(default)]
    pub dev_password: Option<String>,
}
