//! Construction-time failures.
//!
//! Everything discovered once the interpreter is already consuming data is a
//! stream anomaly and flows into the status bitmask (see [`crate::status`]),
//! never into a `Result`. This enum only covers the configuration problems
//! that must be caught before a single word is processed.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("unsupported trigger data format {0}; only format 2 is implemented")]
    UnsupportedTriggerFormat(u8),

    #[error("active_planes must name at least one plane in 1..=6, got {0:?}")]
    NoActivePlanes(Vec<u8>),

    #[error("plane id {0} is out of range; valid plane ids are 1..=6")]
    PlaneIdOutOfRange(u8),
}
