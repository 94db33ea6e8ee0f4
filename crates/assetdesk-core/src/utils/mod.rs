//! Utility functions for timestamps and token expiry.

pub mod time;

// Re-export commonly used functions at module level
pub use time::{default_expiry, format_timestamp, parse_timestamp, resolve_expiry};
