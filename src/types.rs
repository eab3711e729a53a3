//! The data model shared across the pipeline: hits the frame decoder
//! produces, triggers the trigger decoder produces, and the hit records the
//! event builder hands back to the caller.

use serde::{Deserialize, Serialize};

/// A pixel hit produced by the per-plane frame decoder, before it has been
/// attributed to any trigger. Lives in the telescope buffer until the event
/// builder consumes it, the retention window drops it, or a
/// `build_all_events` flush forces it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelescopeHit {
    pub plane_id: u8,
    pub m26_timestamp: i64,
    pub frame_id: i64,
    pub column: u16,
    pub row: u16,
    pub frame_status: u32,
}

/// A trigger word after 63-bit timestamp/number reconstruction. Lives in the
/// trigger buffer until every plane's readout window is known to lie
/// strictly after its timestamp, or until a `build_all_events` flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerRecord {
    pub event_number: i64,
    pub trigger_number: i64,
    pub trigger_timestamp: i64,
    pub trigger_status: u32,
}

/// One pixel hit attributed to a trigger event. This is the only type that
/// crosses the crate boundary in bulk; a hit table is just `Vec<HitRecord>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitRecord {
    pub plane: u8,
    pub event_number: i64,
    pub trigger_number: i64,
    pub trigger_timestamp: i64,
    pub row_timestamp: i64,
    pub frame_id: i64,
    pub column: u16,
    pub row: u16,
    pub event_status: u32,
}

/// Summary counters returned alongside the hit table from
/// [`crate::TelescopeInterpreter::interpret_raw_data`], so a caller doesn't
/// need to reconstruct basic throughput numbers by re-scanning the hit
/// table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpreterStats {
    pub hits_emitted: u64,
    pub triggers_seen: u64,
    pub frames_completed: u64,
    pub frames_poisoned: u64,
}
