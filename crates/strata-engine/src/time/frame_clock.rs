use std::time::{Duration, Instant};

/// Step reported for the very first frame, when there is no previous timestamp.
pub const FIRST_FRAME_DT: f32 = 0.02;

/// Frame timing snapshot.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Time step for this frame, in seconds.
    pub dt: f32,

    /// Timestamp taken at the tick.
    pub now: Instant,

    /// Monotonic frame counter.
    pub frame_index: u64,
}

/// Produces [`FrameTime`] snapshots from externally supplied timestamps.
///
/// With a fixed timestep every frame reports exactly that step. Otherwise the
/// step is `now - last`, clamped so that a stall (debugger, minimized window)
/// does not produce a pathological value.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Option<Instant>,
    frame_index: u64,
    fixed_timestep: Option<Duration>,
    dt_min: Duration,
    dt_max: Duration,
}

impl FrameClock {
    pub fn new(fixed_timestep: Option<Duration>) -> Self {
        Self::with_clamps(
            fixed_timestep,
            Duration::from_micros(100),
            Duration::from_millis(250),
        )
    }

    pub fn with_clamps(fixed_timestep: Option<Duration>, dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        Self {
            last: None,
            frame_index: 0,
            fixed_timestep,
            dt_min,
            dt_max,
        }
    }

    pub fn fixed_timestep(&self) -> Option<Duration> {
        self.fixed_timestep
    }

    /// Forgets the previous timestamp; the next tick is treated as a first frame.
    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Advances the clock to `now` and returns the frame snapshot.
    pub fn tick(&mut self, now: Instant) -> FrameTime {
        let dt = match (self.fixed_timestep, self.last) {
            (Some(step), _) => step.as_secs_f32(),
            (None, None) => FIRST_FRAME_DT,
            (None, Some(last)) => now
                .saturating_duration_since(last)
                .clamp(self.dt_min, self.dt_max)
                .as_secs_f32(),
        };

        self.last = Some(now);

        let ft = FrameTime {
            dt,
            now,
            frame_index: self.frame_index,
        };
        self.frame_index = self.frame_index.wrapping_add(1);
        ft
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{Clock, ManualClock};

    #[test]
    fn first_frame_uses_default_step() {
        let clock = ManualClock::new();
        let mut fc = FrameClock::default();
        let ft = fc.tick(clock.now());
        assert_eq!(ft.dt, FIRST_FRAME_DT);
        assert_eq!(ft.frame_index, 0);
    }

    #[test]
    fn variable_step_follows_clock() {
        let clock = ManualClock::new();
        let mut fc = FrameClock::default();
        fc.tick(clock.now());
        clock.advance(Duration::from_millis(16));
        let ft = fc.tick(clock.now());
        assert!((ft.dt - 0.016).abs() < 1e-6);
        assert_eq!(ft.frame_index, 1);
    }

    #[test]
    fn stalls_are_clamped() {
        let clock = ManualClock::new();
        let mut fc = FrameClock::default();
        fc.tick(clock.now());
        clock.advance(Duration::from_secs(5));
        assert!((fc.tick(clock.now()).dt - 0.25).abs() < 1e-6);
    }

    #[test]
    fn fixed_timestep_overrides_clock() {
        let clock = ManualClock::new();
        let mut fc = FrameClock::new(Some(Duration::from_millis(10)));
        assert!((fc.tick(clock.now()).dt - 0.01).abs() < 1e-6);
        clock.advance(Duration::from_secs(1));
        assert!((fc.tick(clock.now()).dt - 0.01).abs() < 1e-6);
    }

    #[test]
    fn reset_restarts_first_frame() {
        let clock = ManualClock::new();
        let mut fc = FrameClock::default();
        fc.tick(clock.now());
        clock.advance(Duration::from_millis(40));
        fc.reset();
        assert_eq!(fc.tick(clock.now()).dt, FIRST_FRAME_DT);
    }
}
