//! Status/error bits OR-ed into [`crate::types::HitRecord::event_status`].
//!
//! These mirror the raw-stream anomaly taxonomy: every detected problem is
//! folded into this mask rather than raised as an error (see
//! [`crate::error`] for the construction-time failures that *do* return
//! `Result`).

/// Trigger number did not increase by exactly 1 over the previous trigger.
pub const TRIGGER_NUMBER_ERROR: u32 = 0x0001;
/// This event was synthesized to fill a gap in trigger numbers; it has no
/// matching raw trigger word and carries no hits.
pub const NO_TRIGGER_WORD_ERROR: u32 = 0x0002;
/// The 15-bit trigger timestamp field wrapped and was compensated.
pub const TRIGGER_TIMESTAMP_OVERFLOW: u32 = 0x0004;
/// The 16-bit trigger number field wrapped and was compensated.
pub const TRIGGER_NUMBER_OVERFLOW: u32 = 0x0008;
/// Any per-plane frame-structure violation (bad trailer, length mismatch,
/// row/column out of range, overlong payload, truncated frame, unknown
/// word).
pub const DATA_ERROR: u32 = 0x0010;
/// The 32-bit Mimosa26 frame timestamp wrapped and was compensated.
pub const TIMESTAMP_OVERFLOW: u32 = 0x0020;
/// The 32-bit Mimosa26 frame counter wrapped and was compensated.
pub const FRAME_ID_OVERFLOW: u32 = 0x0040;
/// The detector-side row overflow flag (bit 15 of a row-status word) was
/// set.
pub const OVERFLOW_FLAG: u32 = 0x0080;
