//! Producer-side rate gate

/// Accepts a frame when at least `1000 / target_fps` ms have passed since the
/// last accepted one. Owned by the single producer context, so no locking.
///
/// A clock that steps backwards past the last accepted time restarts the
/// window at the new reading instead of stalling until it catches up.
#[derive(Debug, Clone)]
pub struct Throttle {
    min_interval_ms: Option<f64>,
    last_accepted_ms: Option<u64>,
}

impl Throttle {
    /// `target_fps == 0` means unlimited.
    pub fn new(target_fps: u32) -> Self {
        let min_interval_ms = (target_fps > 0).then(|| 1000.0 / f64::from(target_fps));
        Self {
            min_interval_ms,
            last_accepted_ms: None,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0)
    }

    pub fn accept(&mut self, now_ms: u64) -> bool {
        let accepted = match (self.min_interval_ms, self.last_accepted_ms) {
            (None, _) | (_, None) => true,
            (Some(_), Some(last)) if now_ms < last => true,
            (Some(interval), Some(last)) => (now_ms - last) as f64 >= interval,
        };

        if accepted {
            self.last_accepted_ms = Some(now_ms);
        }
        accepted
    }

    pub fn last_accepted_ms(&self) -> Option<u64> {
        self.last_accepted_ms
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::unlimited()
    }
}
