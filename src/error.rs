//! Error types for tcoctl
//!
//! This module defines the error handling strategy for tcoctl. There are two
//! error types: `TcoError` (main error enum) and `ConfigError` (configuration-specific).
//!
//! ## Error Handling Philosophy
//!
//! Library code uses `crate::error::Result<T>` which returns `TcoError`.
//! CLI code uses `anyhow::Result<T>` for top-level error handling. The conversion
//! happens at the CLI boundary using `anyhow::Error::from` to preserve error chains.
//!
//! ## Per-VM failures
//!
//! A cost run never aborts because one VM failed. `Input` and
//! `PricingUnavailable` are produced per VM and collected by the calculator
//! into the report's error list (see `types::VmCostError`). Only
//! configuration, I/O and cache persistence errors surface from a run.
//!
//! ## Retry Awareness
//!
//! Errors implement `IsRetryable` to indicate whether an operation should be retried.
//! The `RetryPolicy` in `src/retry.rs` uses this to determine retry behavior.
//! Only `Provider`, `Io`, and `Retryable` variants are retryable.
//!
//! ## When to Use Which Error
//!
//! - `ConfigError`: Configuration parsing and validation issues
//!   - Automatically converted to `TcoError::Config` via `#[from]`
//!
//! - `Input`: a single inventory record is malformed (negative sizes, unknown OS)
//!
//! - `Provider`: remote pricing API timeout, throttling or transport failure
//!   - Retryable; exhaustion falls through to the fallback pricing tier
//!
//! - `PricingUnavailable`: no cache entry, no remote answer and no anchor rate
//!   for a fallback derivation. Never replaced by a zero price.
//!
//! - `Validation`: CLI / parameter validation failures

use thiserror::Error;

/// Main error type for tcoctl
#[derive(Error, Debug)]
pub enum TcoError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid VM profile '{vm_name}': {reason}")]
    Input { vm_name: String, reason: String },

    #[error("Validation error: {field} - {reason}")]
    Validation { field: String, reason: String },

    #[error("Pricing unavailable for {key}: {reason}")]
    PricingUnavailable { key: String, reason: String },

    #[error("Pricing provider error: {provider} - {message}")]
    Provider {
        provider: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Retryable error (attempt {attempt}/{max_attempts}): {reason}")]
    Retryable {
        attempt: u32,
        max_attempts: u32,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Price cache error: {0}")]
    Cache(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Failed to parse config: {0}")]
    ParseError(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, TcoError>;

/// Trait for determining if an error is retryable
///
/// Used by `RetryPolicy` implementations to determine whether an error
/// should trigger a retry attempt.
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for TcoError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            TcoError::Retryable { .. } | TcoError::Provider { .. } | TcoError::Io(_)
        )
    }
}

impl TcoError {
    /// Shorthand for a provider failure without an underlying source error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        TcoError::Provider {
            provider: provider.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for an unresolvable price
    pub fn pricing_unavailable(key: impl ToString, reason: impl Into<String>) -> Self {
        TcoError::PricingUnavailable {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}
