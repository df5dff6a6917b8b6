//! Convenience result type alias for Session Sentinel.

use crate::error::AppError;

/// A specialized `Result` type for Sentinel operations.
pub type AppResult<T> = Result<T, AppError>;
