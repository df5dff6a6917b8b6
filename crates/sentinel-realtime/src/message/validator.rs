//! Inbound frame validation.

use sentinel_core::error::AppError;

use super::types::InboundMessage;

/// Check raw frame size and emptiness before parsing.
pub fn validate_frame(raw: &str, max_bytes: usize) -> Result<(), AppError> {
    if raw.len() > max_bytes {
        return Err(AppError::protocol(format!(
            "Message exceeds maximum size of {max_bytes} bytes"
        )));
    }

    if raw.trim().is_empty() {
        return Err(AppError::protocol("Empty message"));
    }

    Ok(())
}

/// Parse a validated frame.
pub fn parse_inbound(raw: &str) -> Result<InboundMessage, AppError> {
    let message: InboundMessage = serde_json::from_str(raw)
        .map_err(|e| AppError::protocol(format!("Malformed message: {e}")))?;

    if message.user_id().is_empty() {
        return Err(AppError::protocol("user_id must not be empty"));
    }

    Ok(message)
}
