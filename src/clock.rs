//! Frame timing for the render loop

use std::time::Instant;

/// Per-frame delta clock.
///
/// Holds the timestamp of the previous frame, if any. The first call to
/// [`advance`](Self::advance) is a priming step: the callback timestamp has
/// no predecessor, so no elapsed time is meaningful yet and no delta is
/// produced. Every subsequent call yields the elapsed seconds since the
/// previous frame.
#[derive(Debug, Default)]
pub struct FrameClock {
    previous: Option<Instant>,
}

impl FrameClock {
    /// Create a clock with no previous frame recorded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `now` as the latest frame timestamp and return the elapsed
    /// seconds since the previous one.
    ///
    /// Returns `None` on the priming call; `Some(elapsed_seconds)` after.
    pub fn advance(&mut self, now: Instant) -> Option<f32> {
        let elapsed = self
            .previous
            .map(|previous| now.duration_since(previous).as_secs_f32());
        self.previous = Some(now);
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_first_advance_yields_no_delta() {
        let mut clock = FrameClock::new();
        assert_eq!(clock.advance(Instant::now()), None);
    }

    #[test]
    fn test_16ms_frame_yields_0016_seconds() {
        let mut clock = FrameClock::new();
        let start = Instant::now();
        clock.advance(start);

        let elapsed = clock.advance(start + Duration::from_millis(16));
        assert_eq!(elapsed, Some(0.016));
    }

    #[test]
    fn test_previous_timestamp_updates_every_advance() {
        let mut clock = FrameClock::new();
        let start = Instant::now();
        clock.advance(start);
        clock.advance(start + Duration::from_millis(16));

        // Delta is measured from the latest frame, not the first
        let elapsed = clock.advance(start + Duration::from_millis(48));
        assert_eq!(elapsed, Some(0.032));
    }

    #[test]
    fn test_identical_timestamps_yield_zero_elapsed() {
        let mut clock = FrameClock::new();
        let now = Instant::now();
        clock.advance(now);
        assert_eq!(clock.advance(now), Some(0.0));
    }
}
