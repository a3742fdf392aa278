//! Logging setup shared by every piwi binary and test harness.

pub mod tracing;

pub use self::tracing::{init, LogFormat, ParseLogFormatError};
