//! Per-Plane Frame Decoder: one independent state machine per active plane,
//! consuming the low 16 bits of each M26-tagged word and producing
//! finalized frames. See the module-level docs on [`FrameState`] for the
//! word-by-word layout this machine walks.
//!
//! A frame's hits are staged locally until the frame's trailers are
//! validated, then flushed to the shared telescope buffer in one shot with
//! the frame's final accumulated status applied uniformly to every hit (this
//! is why [`FrameState::Poisoned`]/truncation never needs to retroactively
//! rewrite anything already visible outside this module — nothing becomes
//! visible until the frame is either completed or force-flushed).

use log::warn;

use crate::status;
use crate::types::TelescopeHit;
use crate::word::{DATA_LOSS_MASK, FRAME_HEADER_MASK};

const MAX_ROW: u16 = 575;
const MAX_COLUMN: u16 = 1151;
const MAX_PAYLOAD_WORDS: u16 = 570;

/// Where the decoder is within the canonical frame layout (see spec §4.2):
/// header, timestamp/counter/length prelude, alternating row/column payload,
/// two trailer words, then back to awaiting the next header.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FrameState {
    AwaitHeader,
    /// Dropping words until the next header-bearing word, due to a prior
    /// protocol violation or a data-loss marker.
    Poisoned,
    AwaitTsMsb,
    AwaitCounterLsb,
    AwaitCounterMsb,
    AwaitLength,
    AwaitLengthRepeat { length: u16 },
    NeedRowStatus,
    NeedColumnState { row: u16, hits_remaining: u8 },
    /// Exactly one unaccounted word remains before the declared frame
    /// length is reached; ignore its content.
    Filler,
    AwaitTrailer0,
    AwaitTrailer1,
}

pub struct PlaneState {
    plane_id: u8,
    state: FrameState,
    m26_timestamp: i64,
    /// `m26_timestamp` as of just before the current (possibly still
    /// in-progress, unvalidated) frame's header overwrote it. This is the
    /// reference the Trigger Decoder needs, not the live accumulator —
    /// see [`PlaneState::last_m26_timestamp`].
    last_m26_timestamp: i64,
    frame_id: i64,
    last_completed_frame_id: i64,
    pending_ts_lsb: u16,
    pending_counter_lsb: u16,
    declared_length: u16,
    payload_index: u16,
    frame_status: u32,
    staged_hits: Vec<TelescopeHit>,
}

/// What happened while processing one word.
#[derive(Debug, Default)]
pub struct StepOutcome {
    /// The frame's hits, ready to enter the shared telescope buffer, if a
    /// frame was just completed by a valid trailer pair.
    pub completed_hits: Vec<TelescopeHit>,
    /// Whether this word caused the plane to enter (or re-enter) the
    /// poisoned sub-state.
    pub newly_poisoned: bool,
    /// Whether a frame was validated and flushed by this word. Distinct from
    /// `!completed_hits.is_empty()`, since a zero-length frame completes
    /// with no hits at all.
    pub frame_completed: bool,
}

impl PlaneState {
    pub fn new(plane_id: u8) -> Self {
        Self {
            plane_id,
            state: FrameState::AwaitHeader,
            m26_timestamp: 0,
            last_m26_timestamp: 0,
            frame_id: -1,
            last_completed_frame_id: -1,
            pending_ts_lsb: 0,
            pending_counter_lsb: 0,
            declared_length: 0,
            payload_index: 0,
            frame_status: 0,
            staged_hits: Vec::new(),
        }
    }

    pub fn plane_id(&self) -> u8 {
        self.plane_id
    }

    pub fn m26_timestamp(&self) -> i64 {
        self.m26_timestamp
    }

    /// The timestamp of this plane's last header-started frame as of just
    /// before the *current* frame's header overwrote it. This is the value
    /// the Trigger Decoder's high-bit reference must use (spec §4.3):
    /// reusing the live, still-streaming `m26_timestamp` could hand the
    /// trigger decoder a timestamp up to one `FRAME_UNIT_CYCLE` ahead of the
    /// last validated frame, which is wider than the 15-bit trigger
    /// timestamp's own rollover window and would pick the wrong era.
    pub fn last_m26_timestamp(&self) -> i64 {
        self.last_m26_timestamp
    }

    pub fn last_completed_frame_id(&self) -> i64 {
        self.last_completed_frame_id
    }

    pub fn is_poisoned(&self) -> bool {
        matches!(self.state, FrameState::Poisoned)
    }

    fn poison(&mut self, reason: &str) -> bool {
        let was_poisoned = matches!(self.state, FrameState::Poisoned | FrameState::AwaitHeader);
        if !was_poisoned {
            warn!(
                "plane {}: poisoning in-progress frame {} ({reason})",
                self.plane_id, self.frame_id
            );
        }
        self.state = FrameState::Poisoned;
        self.staged_hits.clear();
        !was_poisoned
    }

    /// The Word Classifier hit an unknown pattern. Every active plane is
    /// poisoned, per spec §4.1.
    pub fn poison_due_to_unknown_word(&mut self) -> bool {
        self.poison("unknown word in stream")
    }

    fn begin_frame(&mut self, ts_lsb: u16) {
        self.last_m26_timestamp = self.m26_timestamp;
        self.state = FrameState::AwaitTsMsb;
        self.pending_ts_lsb = ts_lsb;
        self.frame_status = 0;
        self.staged_hits.clear();
        self.payload_index = 0;
    }

    /// Process one raw word already known to belong to this plane.
    pub fn process_word(&mut self, word: u32) -> StepOutcome {
        let mut outcome = StepOutcome::default();

        if word & DATA_LOSS_MASK != 0 {
            outcome.newly_poisoned = self.poison("data-loss marker set");
            return outcome;
        }

        let is_header = word & FRAME_HEADER_MASK != 0;
        let low16 = (word & 0xFFFF) as u16;

        if is_header && !matches!(self.state, FrameState::AwaitHeader | FrameState::Poisoned) {
            // A new header arrived before this frame's trailers: the
            // in-progress frame is truncated. Its staged hits never made it
            // to the shared buffer, so there is nothing to retroactively
            // correct there (see module docs / DESIGN.md open-question
            // resolution) — we just drop them unless a later
            // `force_flush_incomplete` pulls them out under
            // `build_all_events`.
            outcome.newly_poisoned = self.poison("header arrived before trailer");
        }

        // Matching on a cloned enum (rather than `&mut self.state`) keeps
        // every arm free to call `&mut self` helpers like `self.poison()`
        // without fighting the borrow checker over a live sub-borrow.
        match self.state.clone() {
            FrameState::AwaitHeader | FrameState::Poisoned => {
                if is_header {
                    self.begin_frame(low16);
                } else {
                    warn!(
                        "plane {}: expected a frame header, got {word:#010x}",
                        self.plane_id
                    );
                }
            }
            FrameState::AwaitTsMsb => {
                let raw_ts = ((low16 as u32) << 16) | self.pending_ts_lsb as u32;
                let prev_msb = (self.m26_timestamp as u32 >> 16) as u16;
                if low16 < prev_msb {
                    self.m26_timestamp += 1i64 << 32;
                    self.frame_status |= status::TIMESTAMP_OVERFLOW;
                }
                self.m26_timestamp = (self.m26_timestamp & !0xFFFF_FFFFi64) | raw_ts as i64;
                self.state = FrameState::AwaitCounterLsb;
            }
            FrameState::AwaitCounterLsb => {
                self.pending_counter_lsb = low16;
                self.state = FrameState::AwaitCounterMsb;
            }
            FrameState::AwaitCounterMsb => {
                let raw_counter = ((low16 as u32) << 16) | self.pending_counter_lsb as u32;
                let prev_low32 = self.frame_id as u32;
                if self.frame_id < 0 {
                    // First frame this plane has ever seen: nothing to wrap
                    // against yet.
                    self.frame_id = raw_counter as i64;
                } else if raw_counter < prev_low32 {
                    self.frame_id += 1i64 << 32;
                    self.frame_status |= status::FRAME_ID_OVERFLOW;
                    self.frame_id = (self.frame_id & !0xFFFF_FFFFi64) | raw_counter as i64;
                } else {
                    self.frame_id = (self.frame_id & !0xFFFF_FFFFi64) | raw_counter as i64;
                }
                self.state = FrameState::AwaitLength;
            }
            FrameState::AwaitLength => {
                self.state = FrameState::AwaitLengthRepeat { length: low16 };
            }
            FrameState::AwaitLengthRepeat { length } => {
                if low16 != length {
                    outcome.newly_poisoned = self.poison("frame length mismatch");
                } else if length > MAX_PAYLOAD_WORDS {
                    outcome.newly_poisoned = self.poison("declared frame length too large");
                } else {
                    self.declared_length = length;
                    self.payload_index = 0;
                    self.state = if length == 0 {
                        FrameState::AwaitTrailer0
                    } else {
                        FrameState::NeedRowStatus
                    };
                }
            }
            FrameState::NeedRowStatus => {
                let n_words = (low16 & 0xF) as u8;
                let row = (low16 >> 4) & 0x7FF;
                let overflow_flag = low16 & 0x8000 != 0;
                if row > MAX_ROW {
                    outcome.newly_poisoned = self.poison("row index out of range");
                    return outcome;
                }
                if overflow_flag {
                    self.frame_status |= status::OVERFLOW_FLAG;
                }
                self.payload_index += 1;
                if n_words == 0 {
                    self.advance_past_row(&mut outcome);
                } else {
                    self.state = FrameState::NeedColumnState {
                        row,
                        hits_remaining: n_words,
                    };
                }
            }
            FrameState::NeedColumnState { row, hits_remaining } => {
                let n_hits = (low16 & 0x3) as u16;
                let column = (low16 >> 2) & 0x7FF;
                if column + n_hits > MAX_COLUMN {
                    outcome.newly_poisoned = self.poison("column index out of range");
                    return outcome;
                }
                for offset in 0..=n_hits {
                    self.staged_hits.push(TelescopeHit {
                        plane_id: self.plane_id,
                        m26_timestamp: self.m26_timestamp,
                        frame_id: self.frame_id,
                        column: column + offset,
                        row,
                        frame_status: 0, // overwritten with the final status at flush time
                    });
                }
                self.payload_index += 1;
                let hits_remaining = hits_remaining - 1;
                if hits_remaining == 0 {
                    self.advance_past_row(&mut outcome);
                } else {
                    self.state = FrameState::NeedColumnState { row, hits_remaining };
                }
            }
            FrameState::Filler => {
                self.payload_index += 1;
                self.state = FrameState::AwaitTrailer0;
            }
            FrameState::AwaitTrailer0 => {
                if low16 != 0xAA50 {
                    outcome.newly_poisoned = self.poison("trailer0 mismatch");
                } else {
                    self.state = FrameState::AwaitTrailer1;
                }
            }
            FrameState::AwaitTrailer1 => {
                let expected = 0xAA50 | self.plane_id as u16;
                if low16 != expected {
                    outcome.newly_poisoned = self.poison("trailer1 mismatch");
                } else {
                    self.last_completed_frame_id = self.frame_id;
                    for hit in &mut self.staged_hits {
                        hit.frame_status = self.frame_status;
                    }
                    outcome.completed_hits = std::mem::take(&mut self.staged_hits);
                    outcome.frame_completed = true;
                    self.state = FrameState::AwaitHeader;
                }
            }
        }

        outcome
    }

    /// Having just finished a row (`hits_remaining` reached zero, or the row
    /// carried zero column words to begin with), decide whether more rows
    /// follow, whether we've reached the declared length, or whether
    /// exactly one filler word remains (spec §4.2: "if the row counter
    /// reaches zero while an odd trailing filler word remains, the decoder
    /// ignores that filler").
    fn advance_past_row(&mut self, outcome: &mut StepOutcome) {
        let remaining = self.declared_length as i32 - self.payload_index as i32;
        self.state = match remaining.cmp(&0) {
            std::cmp::Ordering::Equal => FrameState::AwaitTrailer0,
            std::cmp::Ordering::Less => {
                outcome.newly_poisoned = self.poison("payload overran declared length");
                return;
            }
            std::cmp::Ordering::Greater if remaining == 1 => FrameState::Filler,
            std::cmp::Ordering::Greater => FrameState::NeedRowStatus,
        };
    }

    /// Forcibly flush whatever this plane has staged, tagging it
    /// `DATA_ERROR` if the frame had not actually completed. Used only by
    /// `build_all_events`. Resets the plane to await the next header.
    pub fn force_flush_incomplete(&mut self) -> Vec<TelescopeHit> {
        if self.staged_hits.is_empty() {
            return Vec::new();
        }
        let incomplete = !matches!(self.state, FrameState::AwaitHeader);
        let mut hits = std::mem::take(&mut self.staged_hits);
        if incomplete {
            for hit in &mut hits {
                hit.frame_status = self.frame_status | status::DATA_ERROR;
            }
        }
        hits
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn header(plane_id: u8, ts_lsb: u16) -> u32 {
        0x2001_0000 | ((plane_id as u32) << 20) | ts_lsb as u32
    }

    fn m26_word(plane_id: u8, low16: u16) -> u32 {
        0x2000_0000 | ((plane_id as u32) << 20) | low16 as u32
    }

    fn row_status(row: u16, n_words: u8, overflow: bool) -> u16 {
        let mut v = (row << 4) | n_words as u16;
        if overflow {
            v |= 0x8000;
        }
        v
    }

    fn column_state(column: u16, n_hits: u16) -> u16 {
        (column << 2) | n_hits
    }

    /// Feed a single, well-formed frame (frame_id 100, ts 0, one row with
    /// one pixel) and return the completed hits.
    fn feed_clean_frame(plane: &mut PlaneState, plane_id: u8) -> Vec<TelescopeHit> {
        let mut hits = Vec::new();
        let mut push = |word: u32, hits: &mut Vec<TelescopeHit>| {
            let out = plane.process_word(word);
            hits.extend(out.completed_hits);
        };
        push(header(plane_id, 0), &mut hits);
        push(m26_word(plane_id, 0), &mut hits); // ts msb
        push(m26_word(plane_id, 100), &mut hits); // counter lsb
        push(m26_word(plane_id, 0), &mut hits); // counter msb
        push(m26_word(plane_id, 2), &mut hits); // length
        push(m26_word(plane_id, 2), &mut hits); // length repeat
        push(m26_word(plane_id, row_status(10, 1, false)), &mut hits);
        push(m26_word(plane_id, column_state(200, 0)), &mut hits);
        push(m26_word(plane_id, 0xAA50), &mut hits);
        push(m26_word(plane_id, 0xAA50 | plane_id as u16), &mut hits);
        hits
    }

    #[test]
    fn clean_frame_yields_one_hit() {
        let mut plane = PlaneState::new(1);
        let hits = feed_clean_frame(&mut plane, 1);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].column, 200);
        assert_eq!(hits[0].row, 10);
        assert_eq!(hits[0].frame_id, 100);
        assert_eq!(hits[0].frame_status, 0);
        assert_eq!(plane.last_completed_frame_id(), 100);
    }

    /// Poisoning logs a `warn!`; routing it through `env_logger` lets
    /// `cargo test -- --nocapture` show what the decoder saw.
    fn init_logger() {
        let _ = env_logger::try_init();
    }

    #[test]
    fn data_loss_marker_abandons_frame() {
        init_logger();
        let mut plane = PlaneState::new(3);
        plane.process_word(header(3, 0));
        plane.process_word(m26_word(3, 0));
        plane.process_word(m26_word(3, 100));
        plane.process_word(m26_word(3, 0));
        plane.process_word(m26_word(3, 2));
        let out = plane.process_word(m26_word(3, 2) | DATA_LOSS_MASK);
        assert!(out.newly_poisoned);
        assert!(plane.is_poisoned());
        // Frame never completes; no hits are ever emitted for it.
        let hits = feed_clean_frame(&mut plane, 3);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].frame_id, 100);
    }

    #[test]
    fn bad_trailer_poisons_until_next_header() {
        init_logger();
        let mut plane = PlaneState::new(1);
        plane.process_word(header(1, 0));
        plane.process_word(m26_word(1, 0));
        plane.process_word(m26_word(1, 100));
        plane.process_word(m26_word(1, 0));
        plane.process_word(m26_word(1, 0)); // length 0
        plane.process_word(m26_word(1, 0)); // length repeat 0
        let out = plane.process_word(m26_word(1, 0xAA50));
        assert!(!out.newly_poisoned);
        let out = plane.process_word(m26_word(1, 0xBEEF));
        assert!(out.newly_poisoned);
        assert!(out.completed_hits.is_empty());
        assert_eq!(plane.last_completed_frame_id(), -1);
    }

    #[test]
    fn frame_counter_wrap_sets_overflow_flag() {
        let mut plane = PlaneState::new(1);
        // First frame: counter 0xFFFFFFFF.
        plane.process_word(header(1, 0));
        plane.process_word(m26_word(1, 0));
        plane.process_word(m26_word(1, 0xFFFF));
        plane.process_word(m26_word(1, 0xFFFF));
        plane.process_word(m26_word(1, 0));
        plane.process_word(m26_word(1, 0));
        plane.process_word(m26_word(1, 0xAA50));
        let out = plane.process_word(m26_word(1, 0xAA50 | 1));
        assert_eq!(out.completed_hits.len(), 0);
        assert_eq!(plane.last_completed_frame_id(), 0xFFFF_FFFFu32 as i64);

        // Second frame: counter wraps to 0.
        plane.process_word(header(1, 0));
        plane.process_word(m26_word(1, 0));
        plane.process_word(m26_word(1, 0));
        let out = plane.process_word(m26_word(1, 0));
        assert!(!out.newly_poisoned);
        plane.process_word(m26_word(1, 0));
        plane.process_word(m26_word(1, 0));
        plane.process_word(m26_word(1, 0xAA50));
        let out = plane.process_word(m26_word(1, 0xAA50 | 1));
        assert_eq!(plane.last_completed_frame_id(), 1i64 << 32);
    }

    #[test]
    fn row_overflow_flag_propagates_to_all_hits_in_frame() {
        let mut plane = PlaneState::new(2);
        plane.process_word(header(2, 0));
        plane.process_word(m26_word(2, 0));
        plane.process_word(m26_word(2, 1));
        plane.process_word(m26_word(2, 0));
        plane.process_word(m26_word(2, 2));
        plane.process_word(m26_word(2, 2));
        plane.process_word(m26_word(2, row_status(10, 1, true)));
        let out = plane.process_word(m26_word(2, column_state(5, 0)));
        assert!(out.completed_hits.is_empty());
        plane.process_word(m26_word(2, 0xAA50));
        let out = plane.process_word(m26_word(2, 0xAA50 | 2));
        assert_eq!(out.completed_hits.len(), 1);
        assert_eq!(out.completed_hits[0].frame_status & status::OVERFLOW_FLAG, status::OVERFLOW_FLAG);
    }

    #[test]
    fn last_m26_timestamp_lags_one_frame_behind_the_live_accumulator() {
        let mut plane = PlaneState::new(1);
        assert_eq!(plane.last_m26_timestamp(), 0);

        // First frame: timestamp 1000. Still in progress (no trailer yet),
        // the live accumulator already reflects it, but `last_m26_timestamp`
        // must still read the pre-frame value (0).
        plane.process_word(header(1, 1000));
        plane.process_word(m26_word(1, 0)); // ts msb
        assert_eq!(plane.m26_timestamp(), 1000);
        assert_eq!(plane.last_m26_timestamp(), 0);

        plane.process_word(m26_word(1, 0)); // counter lsb
        plane.process_word(m26_word(1, 0)); // counter msb
        plane.process_word(m26_word(1, 0)); // length
        plane.process_word(m26_word(1, 0)); // length repeat
        plane.process_word(m26_word(1, 0xAA50));
        plane.process_word(m26_word(1, 0xAA50 | 1));

        // Second frame begins: `last_m26_timestamp` now captures the first
        // frame's timestamp (1000), even though the live accumulator is
        // about to move again.
        plane.process_word(header(1, 5000));
        assert_eq!(plane.last_m26_timestamp(), 1000);
        plane.process_word(m26_word(1, 0)); // ts msb
        assert_eq!(plane.m26_timestamp(), 5000);
        assert_eq!(plane.last_m26_timestamp(), 1000);
    }

    #[test]
    fn force_flush_tags_data_error_on_incomplete_frame() {
        let mut plane = PlaneState::new(1);
        plane.process_word(header(1, 0));
        plane.process_word(m26_word(1, 0));
        plane.process_word(m26_word(1, 50));
        plane.process_word(m26_word(1, 0));
        plane.process_word(m26_word(1, 2));
        plane.process_word(m26_word(1, 2));
        plane.process_word(m26_word(1, row_status(1, 1, false)));
        plane.process_word(m26_word(1, column_state(9, 0)));
        // No trailer seen yet.
        let hits = plane.force_flush_incomplete();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].frame_status & status::DATA_ERROR, status::DATA_ERROR);
    }
}
