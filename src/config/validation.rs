//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, non-empty names)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use crate::config::schema::AppConfig;

/// A single semantic problem with a loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.host.is_empty() {
        errors.push(ValidationError::Empty("server.host"));
    }
    if config.session.key.is_empty() {
        errors.push(ValidationError::Empty("session.key"));
    }
    if config.session.secret.is_empty() {
        errors.push(ValidationError::Empty("session.secret"));
    }
    if config.upload.dest.is_empty() {
        errors.push(ValidationError::Empty("upload.dest"));
    }
    if config.upload.limit_bytes == 0 {
        errors.push(ValidationError::Zero("upload.limit_bytes"));
    }
    if config.body.limit_bytes == 0 {
        errors.push(ValidationError::Zero("body.limit_bytes"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
