//! Newest-wins single-slot hand-off between the camera thread and the
//! render loop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::frame::PackedFrame;

#[derive(Debug, Default)]
struct SlotState {
    frame: PackedFrame,
    unread: bool,
}

/// Counters describing slot traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotStats {
    /// Frames written by the producer.
    pub published: u64,
    /// Frames overwritten before anyone claimed them.
    pub overwritten: u64,
    /// Frames handed to a consumer.
    pub claimed: u64,
}

/// Holds at most one unread [`PackedFrame`].
///
/// Neither side ever waits for the other: a publish replaces whatever is in
/// the slot and a claim returns `false` when nothing new arrived. The lock is
/// only held for a buffer swap or copy.
#[derive(Debug, Default)]
pub struct FrameSlot {
    state: Mutex<SlotState>,
    published: AtomicU64,
    overwritten: AtomicU64,
    claimed: AtomicU64,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        // state is plain bytes plus a flag, so poisoning is ignored
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish `frame` as the newest frame.
    ///
    /// The slot takes `frame`'s buffer and hands its previous storage back
    /// through `frame`, so the producer can convert into it next time.
    pub fn publish(&self, frame: &mut PackedFrame) {
        let mut state = self.lock();
        self.swap_in(&mut state, frame);
    }

    /// Publish `frame` only while `running` is set.
    ///
    /// The flag is read under the slot lock, so a session that was stopped
    /// before this call cannot overwrite a frame from the session after it.
    /// Returns `false` and leaves `frame` alone when the flag is cleared.
    pub fn publish_if(&self, frame: &mut PackedFrame, running: &AtomicBool) -> bool {
        let mut state = self.lock();
        if !running.load(Ordering::Acquire) {
            return false;
        }
        self.swap_in(&mut state, frame);
        true
    }

    fn swap_in(&self, state: &mut SlotState, frame: &mut PackedFrame) {
        core::mem::swap(&mut state.frame, frame);
        if state.unread {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
        state.unread = true;
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the unread frame into `out` and mark it read.
    ///
    /// Returns `false` without touching `out` when there is no new frame.
    /// The slot keeps its storage either way.
    pub fn claim(&self, out: &mut PackedFrame) -> bool {
        let mut state = self.lock();
        if !state.unread {
            return false;
        }
        out.clone_from(&state.frame);
        state.unread = false;
        drop(state);
        self.claimed.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Claim into a fresh buffer.
    pub fn take_latest(&self) -> Option<PackedFrame> {
        let mut out = PackedFrame::default();
        self.claim(&mut out).then_some(out)
    }

    pub fn has_unread(&self) -> bool {
        self.lock().unread
    }

    /// Drop any unread frame, e.g. when the session that produced it ends.
    pub fn discard(&self) {
        self.lock().unread = false;
    }

    pub fn stats(&self) -> SlotStats {
        SlotStats {
            published: self.published.load(Ordering::Relaxed),
            overwritten: self.overwritten.load(Ordering::Relaxed),
            claimed: self.claimed.load(Ordering::Relaxed),
        }
    }
}

/// Something the render loop can pull the newest frame from.
pub trait FrameSource {
    /// Copy the newest unread frame into `out`; `false` if there is none.
    fn claim_latest(&self, out: &mut PackedFrame) -> bool;
}

impl FrameSource for FrameSlot {
    fn claim_latest(&self, out: &mut PackedFrame) -> bool {
        self.claim(out)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::types::Size;

    fn solid(size: Size, value: u8) -> PackedFrame {
        let mut frame = PackedFrame::new(size);
        frame.pixels_mut().fill(value);
        frame
    }

    #[test]
    fn empty_slot_has_nothing_to_claim() {
        let slot = FrameSlot::new();
        let mut out = solid(Size::new(1, 1), 7);
        assert!(!slot.claim(&mut out));
        assert_eq!(out.pixels(), &[7, 7, 7, 7]);
    }

    #[test]
    fn newest_frame_wins() {
        let slot = FrameSlot::new();
        for n in 1..=5u8 {
            let mut frame = solid(Size::new(2, 1), n);
            slot.publish(&mut frame);
        }
        let latest = slot.take_latest().unwrap();
        assert!(latest.pixels().iter().all(|&b| b == 5));
        assert!(slot.take_latest().is_none());

        let stats = slot.stats();
        assert_eq!(stats.published, 5);
        assert_eq!(stats.overwritten, 4);
        assert_eq!(stats.claimed, 1);
    }

    #[test]
    fn publish_recycles_previous_storage() {
        let slot = FrameSlot::new();
        let mut scratch = solid(Size::new(2, 2), 1);
        slot.publish(&mut scratch);
        // first publish hands back the slot's empty default storage
        assert!(scratch.is_empty());

        let mut next = solid(Size::new(2, 2), 2);
        slot.publish(&mut next);
        assert_eq!(next, solid(Size::new(2, 2), 1));
    }

    #[test]
    fn claim_keeps_storage_for_reads_after_new_writes() {
        let slot = FrameSlot::new();
        slot.publish(&mut solid(Size::new(1, 1), 3));
        let mut out = PackedFrame::default();
        assert!(slot.claim(&mut out));
        assert!(!slot.has_unread());
        slot.publish(&mut solid(Size::new(1, 1), 4));
        assert!(slot.claim(&mut out));
        assert_eq!(out.pixels(), &[4, 4, 4, 4]);
    }

    #[test]
    fn publish_if_respects_cleared_flag() {
        let slot = FrameSlot::new();
        let running = AtomicBool::new(true);
        assert!(slot.publish_if(&mut solid(Size::new(1, 1), 3), &running));

        running.store(false, Ordering::Release);
        let mut late = solid(Size::new(1, 1), 9);
        assert!(!slot.publish_if(&mut late, &running));
        assert_eq!(late.pixels(), &[9, 9, 9, 9]);
        assert_eq!(slot.take_latest().unwrap().pixels(), &[3, 3, 3, 3]);
        assert_eq!(slot.stats().published, 1);
    }

    #[test]
    fn discard_drops_unread_frame() {
        let slot = FrameSlot::new();
        slot.publish(&mut solid(Size::new(1, 1), 3));
        slot.discard();
        assert!(slot.take_latest().is_none());
    }

    #[test]
    fn concurrent_writers_never_tear_frames() {
        let slot = Arc::new(FrameSlot::new());
        let producer = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || {
                let mut frame = PackedFrame::new(Size::new(16, 16));
                for n in 0..500u32 {
                    frame.resize(Size::new(16, 16));
                    frame.pixels_mut().fill(n as u8);
                    slot.publish(&mut frame);
                }
            })
        };

        let mut out = PackedFrame::default();
        let mut seen = 0;
        while !producer.is_finished() || slot.has_unread() {
            if slot.claim(&mut out) {
                let first = out.pixels()[0];
                assert!(out.pixels().iter().all(|&b| b == first));
                seen += 1;
            }
        }
        producer.join().unwrap();
        assert!(seen >= 1);
    }
}
