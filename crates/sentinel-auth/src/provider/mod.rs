//! The identity provider seam.

pub mod static_provider;

use async_trait::async_trait;

use sentinel_core::AppResult;
use sentinel_core::types::UserId;

pub use static_provider::StaticIdentityProvider;

/// External collaborator that validates a user's secret.
///
/// Implementations may call out to a remote identity service; the hub only
/// needs a yes/no answer. Transport failures are errors, wrong secrets are
/// `Ok(false)`.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Verify `secret` for `user_id`.
    async fn verify_secret(&self, user_id: &UserId, secret: &str) -> AppResult<bool>;
}
