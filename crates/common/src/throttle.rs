//! Render throttling.
//!
//! Viewport changes and stroke samples arrive at input-event rate, which can
//! be far above the display refresh rate. [`RenderThrottle`] coalesces those
//! invalidations so a surface repaints at most once per frame interval while
//! never dropping the final state.

/// Frame-interval gate for re-renders.
///
/// Timestamps are caller-supplied monotonic nanoseconds so the gate can be
/// driven by an animation-frame clock or by tests.
#[derive(Debug, Clone)]
pub struct RenderThrottle {
    interval_ns: u64,
    last_render_ns: Option<u64>,
    pending: bool,
}

impl RenderThrottle {
    /// Create a throttle targeting the given frames per second.
    pub fn new(fps: u32) -> Self {
        Self {
            interval_ns: 1_000_000_000 / fps.max(1) as u64,
            last_render_ns: None,
            pending: false,
        }
    }

    /// Mark the surface dirty.
    pub fn invalidate(&mut self) {
        self.pending = true;
    }

    /// Whether a render is owed.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Returns true if a pending render may run at `now_ns`.
    ///
    /// A `true` result consumes the pending flag and starts a new frame
    /// interval. A `false` result keeps the flag so the next tick retries.
    pub fn poll(&mut self, now_ns: u64) -> bool {
        if !self.pending {
            return false;
        }
        let due = match self.last_render_ns {
            None => true,
            Some(last) => now_ns >= last.saturating_add(self.interval_ns),
        };
        if due {
            self.pending = false;
            self.last_render_ns = Some(now_ns);
        }
        due
    }

    /// Frame interval in nanoseconds.
    pub fn interval_ns(&self) -> u64 {
        self.interval_ns
    }
}

impl Default for RenderThrottle {
    fn default() -> Self {
        Self::new(60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_throttle_never_fires() {
        let mut throttle = RenderThrottle::new(60);
        assert!(!throttle.poll(0));
        assert!(!throttle.poll(1_000_000_000));
    }

    #[test]
    fn test_bursts_coalesce_within_frame() {
        let mut throttle = RenderThrottle::new(60);
        throttle.invalidate();
        assert!(throttle.poll(0)); // first frame fires immediately

        throttle.invalidate();
        throttle.invalidate();
        assert!(!throttle.poll(1_000_000)); // 1ms later, too soon
        assert!(throttle.is_pending()); // but not forgotten
        assert!(throttle.poll(17_000_000)); // ~17ms later (60Hz ~ 16.67ms)
        assert!(!throttle.poll(40_000_000)); // nothing new since
    }

    #[test]
    fn test_zero_fps_is_clamped() {
        let throttle = RenderThrottle::new(0);
        assert_eq!(throttle.interval_ns(), 1_000_000_000);
    }
}
