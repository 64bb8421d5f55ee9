// crates/rollout-core/src/core/validation.rs
// ============================================================================
// Module: Rollout Input Validation
// Description: Shared structural validation helpers.
// Purpose: Reject malformed caller input before it reaches storage.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Validation is purely structural: lengths, required fields, and URI shape.
//! Semantic checks (does the deployment exist, is the transition legal) live
//! in the orchestration engine.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Structural validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    /// Creates a validation error with the provided message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Requires a non-blank string whose character count is within `[min, max]`.
///
/// # Errors
///
/// Returns [`ValidationError`] naming `field` when the value is out of range.
pub fn require_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), ValidationError> {
    if min > 0 && value.trim().is_empty() {
        return Err(ValidationError(format!("{field}: cannot be blank")));
    }
    let length = value.chars().count();
    if length < min || length > max {
        return Err(ValidationError(format!(
            "{field}: the length must be between {min} and {max}"
        )));
    }
    Ok(())
}

/// Validates an optional string against `[min, max]` when present.
///
/// # Errors
///
/// Returns [`ValidationError`] when the value is present and out of range.
pub fn optional_length(
    field: &str,
    value: Option<&str>,
    min: usize,
    max: usize,
) -> Result<(), ValidationError> {
    value.map_or(Ok(()), |value| require_length(field, value, min, max))
}

/// Requires an absolute `http://` or `https://` URI of bounded length.
///
/// # Errors
///
/// Returns [`ValidationError`] when the value is malformed.
pub fn require_http_uri(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
    require_length(field, value, 3, max)?;
    let trimmed = value.trim();
    if !(trimmed.starts_with("https://") || trimmed.starts_with("http://")) {
        return Err(ValidationError(format!("{field}: must include http:// or https://")));
    }
    Ok(())
}
