//! Frames and the keep-latest analyzer slot.
//!
//! - `Frame`: one camera capture. Pixels are private and move out exactly once,
//!   into the preprocessor. No `Clone`: a frame is owned by whichever stage holds it.
//! - `FrameSlot`: single-slot handoff between the camera and the analysis worker.
//!   A newer frame replaces an undelivered one; nothing is ever queued.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::camera::Facing;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One RGBA capture plus the metadata needed to orient it.
pub struct Frame {
    /// RGBA8888 pixels, row-major, no padding.
    data: Vec<u8>,

    pub width: u32,
    pub height: u32,

    /// Clockwise rotation that brings the sensor image upright.
    pub rotation_degrees: u32,

    /// Facing of the binding that produced this frame.
    pub facing: Facing,

    /// Capture counter, monotonic within one binding.
    pub sequence: u64,
}

// Explicitly NOT implementing Clone.

impl Frame {
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        rotation_degrees: u32,
        facing: Facing,
        sequence: u64,
    ) -> Self {
        Self {
            data,
            width,
            height,
            rotation_degrees,
            facing,
            sequence,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Hand the pixel buffer to the next stage. The frame is consumed.
    pub(crate) fn into_pixels(self) -> Vec<u8> {
        self.data
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("rotation_degrees", &self.rotation_degrees)
            .field("facing", &self.facing)
            .field("sequence", &self.sequence)
            .field("bytes", &self.data.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// FrameSlot: keep-only-latest backpressure
// ----------------------------------------------------------------------------

/// What happened to a frame offered to the slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Offer {
    /// Slot was empty; the frame waits for the worker.
    Accepted,
    /// An undelivered frame was discarded in favour of this one.
    Replaced,
    /// Slot is closed, or the frame is older than one already seen.
    Rejected,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SlotStats {
    pub offered: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub rejected: u64,
}

#[derive(Default)]
struct SlotState {
    latest: Option<Frame>,
    /// Highest sequence accepted for the current facing session.
    high_water: Option<(Facing, u64)>,
    closed: bool,
    stats: SlotStats,
}

/// Single-slot frame handoff with keep-latest semantics.
///
/// The camera side calls `offer`; the worker blocks in `take`. Once closed the
/// slot rejects every offer and `take` returns `None`, which is the worker's
/// signal to stop.
#[derive(Default)]
pub struct FrameSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn offer(&self, frame: Frame) -> Offer {
        let mut state = self.lock();
        state.stats.offered += 1;
        if state.closed {
            state.stats.rejected += 1;
            return Offer::Rejected;
        }
        if let Some((facing, seq)) = state.high_water {
            if facing == frame.facing && frame.sequence <= seq {
                state.stats.rejected += 1;
                return Offer::Rejected;
            }
        }
        state.high_water = Some((frame.facing, frame.sequence));

        let outcome = match state.latest.replace(frame) {
            Some(stale) => {
                state.stats.dropped += 1;
                log::debug!("frame slot: dropped undelivered frame #{}", stale.sequence);
                Offer::Replaced
            }
            None => Offer::Accepted,
        };
        drop(state);
        self.ready.notify_one();
        outcome
    }

    /// Block until a frame is available or the slot is closed.
    pub fn take(&self) -> Option<Frame> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(frame) = state.latest.take() {
                state.stats.delivered += 1;
                return Some(frame);
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like `take`, but gives up after `timeout`.
    pub fn take_timeout(&self, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(frame) = state.latest.take() {
                state.stats.delivered += 1;
                return Some(frame);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            state = self
                .ready
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Discard any pending frame and forget the facing session (used on rebind).
    pub fn clear(&self) {
        let mut state = self.lock();
        if state.latest.take().is_some() {
            state.stats.dropped += 1;
        }
        state.high_water = None;
    }

    /// Stop accepting frames and wake the worker. Idempotent.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.latest = None;
        drop(state);
        self.ready.notify_all();
    }

    pub fn has_pending(&self) -> bool {
        self.lock().latest.is_some()
    }

    pub fn stats(&self) -> SlotStats {
        self.lock().stats
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn frame(seq: u64, facing: Facing) -> Frame {
        Frame::new(vec![0u8; 4 * 4 * 4], 4, 4, 0, facing, seq)
    }

    #[test]
    fn newer_frame_replaces_undelivered_one() {
        let slot = FrameSlot::new();
        assert_eq!(slot.offer(frame(1, Facing::Front)), Offer::Accepted);
        assert_eq!(slot.offer(frame(2, Facing::Front)), Offer::Replaced);
        assert_eq!(slot.offer(frame(3, Facing::Front)), Offer::Replaced);

        let taken = slot.take().expect("pending frame");
        assert_eq!(taken.sequence, 3);
        assert!(!slot.has_pending());

        let stats = slot.stats();
        assert_eq!(stats.dropped, 2);
        assert_eq!(stats.delivered, 1);
    }

    #[test]
    fn out_of_order_frames_are_rejected_within_a_facing_session() {
        let slot = FrameSlot::new();
        slot.offer(frame(5, Facing::Back));
        assert_eq!(slot.offer(frame(4, Facing::Back)), Offer::Rejected);

        // A new facing session starts its own sequence.
        assert_eq!(slot.offer(frame(1, Facing::Front)), Offer::Replaced);
    }

    #[test]
    fn clear_resets_the_session() {
        let slot = FrameSlot::new();
        slot.offer(frame(9, Facing::Front));
        slot.clear();
        assert!(!slot.has_pending());
        assert_eq!(slot.offer(frame(1, Facing::Front)), Offer::Accepted);
    }

    #[test]
    fn closed_slot_rejects_and_wakes_taker() {
        let slot = Arc::new(FrameSlot::new());
        let taker = {
            let slot = Arc::clone(&slot);
            std::thread::spawn(move || slot.take())
        };
        std::thread::sleep(Duration::from_millis(20));
        slot.close();
        assert!(taker.join().expect("taker thread").is_none());
        assert_eq!(slot.offer(frame(1, Facing::Front)), Offer::Rejected);
        assert_eq!(slot.stats().rejected, 1);
    }

    #[test]
    fn take_timeout_returns_none_when_idle() {
        let slot = FrameSlot::new();
        assert!(slot.take_timeout(Duration::from_millis(10)).is_none());
    }
}
