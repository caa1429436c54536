//! Exit code standardization for tcoctl
//!
//! - `0` = Success
//! - `1` = User error (invalid input, validation failure)
//! - `2` = System error (pricing API failure, I/O, cache persistence)
//! - `3` = Configuration error (missing config, config parse error)

use crate::error::TcoError;

/// Standard exit codes for tcoctl
pub mod codes {
    /// Success
    pub const SUCCESS: i32 = 0;
    /// User error (invalid input, validation failure)
    pub const USER_ERROR: i32 = 1;
    /// System error (pricing API failure, I/O)
    pub const SYSTEM_ERROR: i32 = 2;
    /// Configuration error
    pub const CONFIG_ERROR: i32 = 3;
}

/// Map a TcoError to an appropriate exit code
pub fn exit_code_for_error(error: &TcoError) -> i32 {
    use TcoError::*;
    match error {
        Config(_) => codes::CONFIG_ERROR,

        Input { .. } => codes::USER_ERROR,
        Validation { .. } => codes::USER_ERROR,
        Cancelled => codes::USER_ERROR,

        PricingUnavailable { .. } => codes::SYSTEM_ERROR,
        Provider { .. } => codes::SYSTEM_ERROR,
        Retryable { .. } => codes::SYSTEM_ERROR,
        Cache(_) => codes::SYSTEM_ERROR,
        Io(_) => codes::SYSTEM_ERROR,
        Json(_) => codes::SYSTEM_ERROR,
    }
}

/// Exit code for an anyhow error coming out of `main`
///
/// Falls back to `SYSTEM_ERROR` when the chain holds no `TcoError`.
pub fn exit_code_for_anyhow(error: &anyhow::Error) -> i32 {
    error
        .chain()
        .find_map(|e| e.downcast_ref::<TcoError>())
        .map(exit_code_for_error)
        .unwrap_or(codes::SYSTEM_ERROR)
}
