//! Route handlers.

pub mod health;
pub mod reauth;
pub mod risk;
pub mod sessions;
pub mod ws;

use sentinel_core::error::AppError;
use sentinel_core::types::UserId;

/// Parse a `{user_id}` path segment.
pub(crate) fn user_from_path(raw: String) -> Result<UserId, AppError> {
    let user_id = UserId::from(raw);
    if user_id.is_empty() {
        return Err(AppError::validation("user_id must not be empty"));
    }
    Ok(user_id)
}
