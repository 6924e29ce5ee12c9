//! Bounded frame buffer between the driver context and the encode worker

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam::utils::CachePadded;

use crate::capture::Frame;

/// Fixed-capacity frame holding area.
///
/// `push` never blocks: when full, the oldest resident frame is evicted.
/// `pop_latest` hands out the most recently pushed frame, so under overload
/// the worker sees bursts of recent frames rather than arrival order.
pub struct FrameBuffer {
    slots: Mutex<VecDeque<Frame>>,
    capacity: usize,

    /// Statistics
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    frames_pushed: AtomicUsize,
    frames_popped: AtomicUsize,
    frames_evicted: AtomicUsize,
    max_resident: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub pushed: usize,
    pub popped: usize,
    pub evicted: usize,
    /// Highest resident count ever observed
    pub max_resident: usize,
}

impl FrameBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            stats: CachePadded::new(Stats::default()),
        }
    }

    // Every push/pop leaves the deque valid, so a poisoned lock is still usable.
    fn slots(&self) -> MutexGuard<'_, VecDeque<Frame>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Producer: push frame, evicting the oldest if full. Returns true on eviction.
    pub fn push(&self, frame: Frame) -> bool {
        let mut slots = self.slots();

        let evicted = if slots.len() >= self.capacity {
            slots.pop_front();
            self.stats.frames_evicted.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("depthlog_frames_evicted").increment(1);
            true
        } else {
            false
        };

        slots.push_back(frame);
        self.stats.frames_pushed.fetch_add(1, Ordering::Relaxed);
        self.stats
            .max_resident
            .fetch_max(slots.len(), Ordering::Relaxed);
        evicted
    }

    /// Consumer: pop the most recently pushed frame
    pub fn pop_latest(&self) -> Option<Frame> {
        let frame = self.slots().pop_back()?;
        self.stats.frames_popped.fetch_add(1, Ordering::Relaxed);
        Some(frame)
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            pushed: self.stats.frames_pushed.load(Ordering::Relaxed),
            popped: self.stats.frames_popped.load(Ordering::Relaxed),
            evicted: self.stats.frames_evicted.load(Ordering::Relaxed),
            max_resident: self.stats.max_resident.load(Ordering::Relaxed),
        }
    }
}
