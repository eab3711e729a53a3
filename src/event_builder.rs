//! Event Builder: matches buffered pixel hits against buffered triggers by
//! windowed containment (spec §4.5), sealing an event only once every active
//! plane has either matched or provably passed each of its buffered hits.

use crate::buffer::{BufferManager, PlaneTimestamps};
use crate::status;
use crate::types::HitRecord;

const FRAME_UNIT_CYCLE: i64 = 4608;
const ROW_UNIT_CYCLE: i64 = 8;

/// Run one event-building pass over whatever is currently buffered.
///
/// `last_completed_frame_id` gates matching against a plane's in-flight
/// (not yet trailer-validated) frame: such hits are skipped — and, absent
/// `build_all_events`, the whole pass pauses — since an in-flight frame
/// could still be poisoned and never reach the buffer at all.
pub fn build_events(
    buffer: &mut BufferManager,
    active_planes: &[u8],
    last_completed_frame_id: &[i64; 7],
    timing_offset: i64,
    current_timestamps: &PlaneTimestamps,
    build_all_events: bool,
) -> Vec<HitRecord> {
    let (output, plane_finished, sealed_triggers) = {
        let telescope_data = buffer.telescope_data();
        let trigger_data = buffer.trigger_data();

        let mut per_plane_indices: [Vec<usize>; 7] =
            [Vec::new(), Vec::new(), Vec::new(), Vec::new(), Vec::new(), Vec::new(), Vec::new()];
        for (index, hit) in telescope_data.iter().enumerate() {
            per_plane_indices[hit.plane_id as usize].push(index);
        }

        let mut plane_finished = [0usize; 7];
        let mut output = Vec::new();
        let mut sealed_triggers = 0usize;

        'trigger_loop: for trigger in trigger_data {
            // A synthesized gap placeholder has no corresponding wire data;
            // it seals immediately with zero hits.
            if trigger.trigger_status & status::NO_TRIGGER_WORD_ERROR != 0 {
                sealed_triggers += 1;
                continue;
            }

            let t = trigger.trigger_timestamp;
            let mut matched = Vec::new();

            for &plane_id in active_planes {
                let indices = &per_plane_indices[plane_id as usize];
                let mut idx = plane_finished[plane_id as usize];
                loop {
                    if idx >= indices.len() {
                        if build_all_events {
                            break;
                        } else {
                            break 'trigger_loop;
                        }
                    }
                    let hit = &telescope_data[indices[idx]];
                    if !build_all_events && hit.frame_id > last_completed_frame_id[plane_id as usize] {
                        break 'trigger_loop;
                    }
                    let row_ts_start = hit.m26_timestamp + hit.row as i64 * ROW_UNIT_CYCLE
                        - 2 * FRAME_UNIT_CYCLE
                        - timing_offset;
                    let row_ts_stop = row_ts_start + FRAME_UNIT_CYCLE + ROW_UNIT_CYCLE;
                    if row_ts_start <= t && t < row_ts_stop {
                        matched.push((indices[idx], row_ts_start));
                        idx += 1;
                    } else if row_ts_start > t {
                        break;
                    } else {
                        idx += 1;
                        plane_finished[plane_id as usize] = idx;
                    }
                }
            }

            for (index, row_timestamp) in matched {
                let hit = &telescope_data[index];
                output.push(HitRecord {
                    plane: hit.plane_id,
                    event_number: trigger.event_number,
                    trigger_number: trigger.trigger_number,
                    trigger_timestamp: trigger.trigger_timestamp,
                    row_timestamp,
                    frame_id: hit.frame_id,
                    column: hit.column,
                    row: hit.row,
                    event_status: trigger.trigger_status | hit.frame_status,
                });
            }
            sealed_triggers += 1;
        }

        (output, plane_finished, sealed_triggers)
    };

    buffer.drop_sealed_triggers(sealed_triggers);
    buffer.compact(&plane_finished, current_timestamps);
    output
}
