//! Centralized error handling for the guide service
//!
//! # Error Categories
//!
//! - **Fetch Errors**: network failures, timeouts, non-success status codes
//! - **Decode Errors**: decompression, UTF-8 and XML structure failures
//! - **Malformed Records**: single playlist records or schedule entries; these
//!   are always absorbed by dropping the record and never reach a caller
//! - **Configuration Errors**: invalid settings, recovered through defaults
//!
//! A refresh that is skipped because another one is running is not an error;
//! see [`crate::cache::RefreshOutcome`].
//!
//! # Usage
//!
//! ```rust
//! use iptv_guide::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     Ok("success".to_string())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;
