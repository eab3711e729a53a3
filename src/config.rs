//! Construction-time configuration.
//!
//! Plain data, no parsing: command-line glue is an external collaborator
//! (see the crate-level docs). A consuming binary is expected to build one
//! of these from whatever argument parser it likes and hand it to
//! [`crate::TelescopeInterpreter::new`].

use crate::error::ConfigError;

/// Only format 2 (15-bit timestamp in bits 16..30, 16-bit trigger number in
/// bits 0..15) is supported; see [`crate::trigger`].
pub const TRIGGER_DATA_FORMAT_2: u8 = 2;

pub const DEFAULT_TIMING_OFFSET: i64 = -112;

#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// Plane IDs to interpret; IDs outside this set are dropped silently.
    /// Defaults to all six planes.
    pub active_planes: Vec<u8>,
    /// Only `TRIGGER_DATA_FORMAT_2` is accepted.
    pub trigger_data_format: u8,
    /// Synthesize placeholder events for gaps in the trigger number
    /// sequence instead of just flagging them.
    pub add_missing_events: bool,
    /// Empirical offset between the Mimosa26 clock and the 40 MHz readout
    /// clock, in 40 MHz ticks.
    pub timing_offset: i64,
    /// Informational only; the core does not chunk on its own behalf.
    pub chunk_size: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            active_planes: vec![1, 2, 3, 4, 5, 6],
            trigger_data_format: TRIGGER_DATA_FORMAT_2,
            add_missing_events: false,
            timing_offset: DEFAULT_TIMING_OFFSET,
            chunk_size: 0,
        }
    }
}

impl InterpreterConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.trigger_data_format != TRIGGER_DATA_FORMAT_2 {
            return Err(ConfigError::UnsupportedTriggerFormat(
                self.trigger_data_format,
            ));
        }
        if self.active_planes.is_empty() {
            return Err(ConfigError::NoActivePlanes(self.active_planes.clone()));
        }
        for &plane_id in &self.active_planes {
            if !(1..=6).contains(&plane_id) {
                return Err(ConfigError::PlaneIdOutOfRange(plane_id));
            }
        }
        Ok(())
    }

    pub(crate) fn is_active(&self, plane_id: u8) -> bool {
        self.active_planes.contains(&plane_id)
    }
}
