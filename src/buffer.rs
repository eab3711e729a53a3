//! Buffer Manager: the two append-only arrays the event builder reads from.
//!
//! Both buffers only ever grow at the tail (pushed to by the frame/trigger
//! decoders) and shrink at the head (dropped by [`BufferManager::compact`]).
//! Plain `Vec` already grows geometrically on its own, so there is no custom
//! growth bookkeeping here — the interesting part is deciding what is safe to
//! drop.

use crate::types::{TelescopeHit, TriggerRecord};

/// Per-plane current timestamp, indexed by plane id (1..=6, index 0 unused).
pub type PlaneTimestamps = [i64; 7];

/// 5 seconds at the 40 MHz readout clock.
pub const MAX_BUFFER_TIME_SLIP_TICKS: i64 = 5 * 40_000_000;

pub struct BufferManager {
    telescope_data: Vec<TelescopeHit>,
    trigger_data: Vec<TriggerRecord>,
}

impl BufferManager {
    pub fn new() -> Self {
        Self {
            telescope_data: Vec::new(),
            trigger_data: Vec::new(),
        }
    }

    pub fn push_hit(&mut self, hit: TelescopeHit) {
        self.telescope_data.push(hit);
    }

    pub fn push_trigger(&mut self, trigger: TriggerRecord) {
        self.trigger_data.push(trigger);
    }

    pub fn telescope_data(&self) -> &[TelescopeHit] {
        &self.telescope_data
    }

    pub fn trigger_data(&self) -> &[TriggerRecord] {
        &self.trigger_data
    }

    /// Drop every telescope hit that is either dead (its window can never
    /// match the current or any later trigger, per `finished_before[plane]`,
    /// a per-plane count of hits at the front of this plane's run that the
    /// event builder has established are unmatchable) or stale (its plane
    /// has moved on more than [`MAX_BUFFER_TIME_SLIP_TICKS`] ahead of it, a
    /// safety bound against an unbounded gap between triggers).
    ///
    /// Run after every event-building pass rather than tied to `Vec`
    /// reallocation: the retention/compaction test property requires
    /// chunk-size-independent output, which a capacity-triggered purge could
    /// violate since capacity growth timing depends on how the caller split
    /// the stream into chunks.
    pub fn compact(&mut self, finished_before: &[usize; 7], current_timestamps: &PlaneTimestamps) {
        let mut seen = [0usize; 7];
        let before = self.telescope_data.len();
        self.telescope_data.retain(|hit| {
            let plane = hit.plane_id as usize;
            let index = seen[plane];
            seen[plane] += 1;
            let dead = index < finished_before[plane];
            let stale = current_timestamps[plane] - hit.m26_timestamp > MAX_BUFFER_TIME_SLIP_TICKS;
            !dead && !stale
        });
        let dropped = before - self.telescope_data.len();
        if dropped > 0 {
            log::debug!("compacted {dropped} telescope hits out of the buffer");
        }
    }

    pub fn drop_sealed_triggers(&mut self, sealed_count: usize) {
        if sealed_count > 0 {
            self.trigger_data.drain(0..sealed_count);
        }
    }
}

impl Default for BufferManager {
    fn default() -> Self {
        Self::new()
    }
}
