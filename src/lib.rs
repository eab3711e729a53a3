//! A streaming interpreter and event builder for a Mimosa26/TLU pixel
//! telescope raw-data stream.
//!
//! The pipeline is four components wired together by [`TelescopeInterpreter`]:
//! the [`word`] classifier splits a raw word stream by its tag bits, each
//! active plane's [`plane::PlaneState`] turns its words into completed
//! frames, the [`trigger`] decoder reconstructs trigger identity from the
//! TLU's narrower wire fields, and [`event_builder`] matches buffered hits
//! against buffered triggers by windowed timestamp containment.
//!
//! Nothing in this crate raises on a malformed stream — anomalies fold into
//! the `event_status` bitmask on whatever output they affect (see
//! [`status`]) so a caller can keep decoding a noisy or truncated run.
//! File I/O, histogramming, plotting, and downstream format conversion are
//! left to callers; this crate only turns words into a hit table.

pub mod buffer;
pub mod config;
pub mod error;
pub mod event_builder;
pub mod plane;
pub mod status;
pub mod trigger;
pub mod types;
pub mod word;

pub use config::InterpreterConfig;
pub use error::ConfigError;
pub use plane::PlaneState;
pub use types::{HitRecord, InterpreterStats, TelescopeHit, TriggerRecord};

use buffer::BufferManager;
use plane::PlaneState as Plane;
use trigger::TriggerDecoder;
use word::Word;

/// Owns one state machine per active plane, the trigger decoder, and the
/// shared hit/trigger buffers; [`interpret_raw_data`](Self::interpret_raw_data)
/// is the only entry point a caller needs.
pub struct TelescopeInterpreter {
    config: InterpreterConfig,
    planes: [Option<Plane>; 7],
    trigger_decoder: TriggerDecoder,
    buffer: BufferManager,
    stats: InterpreterStats,
}

impl TelescopeInterpreter {
    pub fn new(config: InterpreterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut planes: [Option<Plane>; 7] = [None, None, None, None, None, None, None];
        for &plane_id in &config.active_planes {
            planes[plane_id as usize] = Some(Plane::new(plane_id));
        }
        Ok(Self {
            config,
            planes,
            trigger_decoder: TriggerDecoder::new(),
            buffer: BufferManager::new(),
            stats: InterpreterStats::default(),
        })
    }

    /// Introspection accessor for a single active plane's decoder state.
    /// Returns `None` for an inactive plane or an out-of-range id.
    pub fn plane_state(&self, plane_id: u8) -> Option<&PlaneState> {
        if !(1..=6).contains(&plane_id) {
            return None;
        }
        self.planes[plane_id as usize].as_ref()
    }

    /// Cumulative counters since this interpreter was constructed.
    pub fn stats(&self) -> InterpreterStats {
        self.stats
    }

    /// Feed one chunk of raw words through the pipeline, returning every hit
    /// the event builder could seal with the data buffered so far, plus the
    /// cumulative stats snapshot after this call.
    ///
    /// Chunk size never affects the hit table: the same stream fed as one
    /// chunk or as many produces byte-identical output, since unsealed
    /// triggers and their plane data simply stay buffered across calls.
    ///
    /// `build_all_events` forces every currently buffered trigger to seal
    /// against whatever data exists, even if a plane's window hasn't
    /// naturally closed yet, and force-flushes every plane's in-flight
    /// frame first (tagged `DATA_ERROR` if it never reached a valid
    /// trailer). Intended for the end of a run, where no further data will
    /// ever arrive to complete a pending window.
    pub fn interpret_raw_data(
        &mut self,
        words: &[u32],
        build_all_events: bool,
    ) -> (Vec<HitRecord>, InterpreterStats) {
        for &word in words {
            match word::classify(word) {
                Word::M26 { plane_id, payload } => self.handle_m26_word(plane_id, payload),
                Word::Trigger { payload } => self.handle_trigger_word(payload),
                Word::Unknown(raw) => self.handle_unknown_word(raw),
            }
        }

        if build_all_events {
            for &plane_id in &self.config.active_planes {
                if let Some(plane) = self.planes[plane_id as usize].as_mut() {
                    for hit in plane.force_flush_incomplete() {
                        self.buffer.push_hit(hit);
                    }
                }
            }
        }

        let last_completed_frame_id = self.last_completed_frame_ids();
        let current_timestamps = self.current_timestamps();
        let hits = event_builder::build_events(
            &mut self.buffer,
            &self.config.active_planes,
            &last_completed_frame_id,
            self.config.timing_offset,
            &current_timestamps,
            build_all_events,
        );
        self.stats.hits_emitted += hits.len() as u64;
        (hits, self.stats)
    }

    fn handle_m26_word(&mut self, plane_id: u8, payload: u32) {
        if !self.config.is_active(plane_id) {
            return;
        }
        let Some(plane) = self.planes[plane_id as usize].as_mut() else {
            return;
        };
        let outcome = plane.process_word(payload);
        if outcome.newly_poisoned {
            self.stats.frames_poisoned += 1;
        }
        if outcome.frame_completed {
            self.stats.frames_completed += 1;
        }
        for hit in outcome.completed_hits {
            self.buffer.push_hit(hit);
        }
    }

    fn handle_trigger_word(&mut self, payload: u32) {
        let planes_max_m26_timestamp = self
            .config
            .active_planes
            .iter()
            .filter_map(|&id| self.planes[id as usize].as_ref())
            .map(Plane::last_m26_timestamp)
            .max()
            .unwrap_or(0);
        let records =
            self.trigger_decoder
                .decode(payload, planes_max_m26_timestamp, self.config.add_missing_events);
        self.stats.triggers_seen += records.len() as u64;
        for record in records {
            self.buffer.push_trigger(record);
        }
    }

    /// The Word Classifier found a word matching neither the M26 nor the
    /// trigger pattern: every active plane is poisoned (spec §4.1).
    fn handle_unknown_word(&mut self, raw: u32) {
        log::warn!("unrecognized word {raw:#010x} in stream; poisoning all active planes");
        for &plane_id in &self.config.active_planes {
            if let Some(plane) = self.planes[plane_id as usize].as_mut() {
                if plane.poison_due_to_unknown_word() {
                    self.stats.frames_poisoned += 1;
                }
            }
        }
    }

    fn last_completed_frame_ids(&self) -> [i64; 7] {
        let mut ids = [0i64; 7];
        for &plane_id in &self.config.active_planes {
            if let Some(plane) = self.planes[plane_id as usize].as_ref() {
                ids[plane_id as usize] = plane.last_completed_frame_id();
            }
        }
        ids
    }

    fn current_timestamps(&self) -> buffer::PlaneTimestamps {
        let mut timestamps = [0i64; 7];
        for &plane_id in &self.config.active_planes {
            if let Some(plane) = self.planes[plane_id as usize].as_ref() {
                timestamps[plane_id as usize] = plane.m26_timestamp();
            }
        }
        timestamps
    }
}
