//! Kinematic profiles for the simulated subsystems.
//!
//! The plant drives every axis at constant speed: azimuth at its configured
//! `vmax`, shutters and louvers at their fixed percent-per-second rates.
//! Jerk and acceleration limits are carried by the configuration layer for
//! validation only.

use std::f64::consts::{PI, TAU};

/// Wrap an angle into `[0, 2*pi)`.
pub fn wrap_nonnegative(angle: f64) -> f64 {
    let wrapped = angle % TAU;
    if wrapped < 0.0 {
        wrapped + TAU
    } else {
        wrapped
    }
}

/// Signed shortest rotation from `from` to `to`, in `(-pi, pi]`. A tie of
/// exactly half a turn resolves clockwise (positive).
pub fn shortest_delta(from: f64, to: f64) -> f64 {
    let mut delta = wrap_nonnegative(to) - wrap_nonnegative(from);
    if delta > PI {
        delta -= TAU;
    } else if delta <= -PI {
        delta += TAU;
    }
    delta
}

/// Phase of a motion profile at a sampled instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionPhase {
    Accelerating,
    Cruising,
    Decelerating,
    Done,
}

/// Azimuth motion: constant velocity along the shortest wrap direction to
/// the target, then an optional endless crawl.
#[derive(Debug, Clone, Copy)]
pub struct AzimuthProfile {
    start_position: f64,
    /// Unwrapped target, i.e. `start_position + shortest_delta`.
    unwrapped_target: f64,
    velocity: f64,
    crawl_velocity: f64,
    start_tai: f64,
    duration: f64,
}

impl AzimuthProfile {
    pub fn new(
        start_position: f64,
        target_position: f64,
        max_velocity: f64,
        crawl_velocity: f64,
        start_tai: f64,
    ) -> Self {
        let delta = shortest_delta(start_position, target_position);
        let duration = delta.abs() / max_velocity;
        let velocity = if delta >= 0.0 { max_velocity } else { -max_velocity };
        Self {
            start_position,
            unwrapped_target: start_position + delta,
            velocity,
            crawl_velocity,
            start_tai,
            duration,
        }
    }

    /// Estimated time to reach the target [s].
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn start_tai(&self) -> f64 {
        self.start_tai
    }

    pub fn crawl_velocity(&self) -> f64 {
        self.crawl_velocity
    }

    /// Position [rad, wrapped], velocity [rad/s] and phase at `tai`.
    pub fn sample(&self, tai: f64) -> (f64, f64, MotionPhase) {
        let elapsed = tai - self.start_tai;
        if elapsed < self.duration {
            let position = wrap_nonnegative(self.start_position + self.velocity * elapsed);
            (position, self.velocity, MotionPhase::Cruising)
        } else {
            let overshoot = elapsed - self.duration;
            let position =
                wrap_nonnegative(self.unwrapped_target + self.crawl_velocity * overshoot);
            (position, self.crawl_velocity, MotionPhase::Done)
        }
    }
}

/// Linear motion between two positions at fixed speed, clamped to a range.
/// Used for the shutters and louvers (percent) and the windscreen (radians).
#[derive(Debug, Clone, Copy)]
pub struct LinearProfile {
    start_position: f64,
    target_position: f64,
    speed: f64,
    start_tai: f64,
}

impl LinearProfile {
    pub fn new(start_position: f64, target_position: f64, speed: f64, start_tai: f64) -> Self {
        Self {
            start_position,
            target_position,
            speed,
            start_tai,
        }
    }

    pub fn duration(&self) -> f64 {
        (self.target_position - self.start_position).abs() / self.speed
    }

    pub fn start_tai(&self) -> f64 {
        self.start_tai
    }

    pub fn target(&self) -> f64 {
        self.target_position
    }

    /// Position and phase at `tai`. The position never passes the target.
    pub fn sample(&self, tai: f64) -> (f64, MotionPhase) {
        let elapsed = tai - self.start_tai;
        if elapsed >= self.duration() {
            return (self.target_position, MotionPhase::Done);
        }
        let direction = if self.target_position >= self.start_position {
            1.0
        } else {
            -1.0
        };
        (
            self.start_position + direction * self.speed * elapsed,
            MotionPhase::Cruising,
        )
    }
}

/// Endless crawl within a closed range. The position clamps at a range end
/// and `sample` reports when the end has been hit.
#[derive(Debug, Clone, Copy)]
pub struct CrawlProfile {
    start_position: f64,
    velocity: f64,
    start_tai: f64,
    min_position: f64,
    max_position: f64,
    /// Wrap instead of clamping at the range ends (azimuth).
    wraps: bool,
}

impl CrawlProfile {
    pub fn wrapping(start_position: f64, velocity: f64, start_tai: f64) -> Self {
        Self {
            start_position,
            velocity,
            start_tai,
            min_position: 0.0,
            max_position: TAU,
            wraps: true,
        }
    }

    pub fn clamped(
        start_position: f64,
        velocity: f64,
        start_tai: f64,
        min_position: f64,
        max_position: f64,
    ) -> Self {
        Self {
            start_position,
            velocity,
            start_tai,
            min_position,
            max_position,
            wraps: false,
        }
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    /// Position at `tai` and whether the crawl is still in progress.
    pub fn sample(&self, tai: f64) -> (f64, bool) {
        let raw = self.start_position + self.velocity * (tai - self.start_tai);
        if self.wraps {
            (wrap_nonnegative(raw), true)
        } else if raw <= self.min_position {
            (self.min_position, false)
        } else if raw >= self.max_position {
            (self.max_position, false)
        } else {
            (raw, true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEG: f64 = PI / 180.0;

    #[test]
    fn test_wrap_nonnegative() {
        assert!((wrap_nonnegative(-0.5 * DEG) - 359.5 * DEG).abs() < 1e-12);
        assert!((wrap_nonnegative(361.0 * DEG) - 1.0 * DEG).abs() < 1e-12);
        assert_eq!(wrap_nonnegative(0.0), 0.0);
    }

    #[test]
    fn test_shortest_delta_picks_short_way_round() {
        // 10 -> 350 goes backwards through zero.
        let delta = shortest_delta(10.0 * DEG, 350.0 * DEG);
        assert!((delta + 20.0 * DEG).abs() < 1e-12);
        // 350 -> 10 goes forwards through zero.
        let delta = shortest_delta(350.0 * DEG, 10.0 * DEG);
        assert!((delta - 20.0 * DEG).abs() < 1e-12);
        // A half-turn tie resolves clockwise.
        let delta = shortest_delta(0.0, PI);
        assert!((delta - PI).abs() < 1e-12);
    }

    #[test]
    fn test_azimuth_profile_move_then_crawl() {
        let profile = AzimuthProfile::new(0.0, 10.0 * DEG, 4.0 * DEG, 0.1 * DEG, 10001.0);
        assert!((profile.duration() - 2.5).abs() < 1e-9);
        let (pos, vel, phase) = profile.sample(10002.0);
        assert!((pos - 4.0 * DEG).abs() < 1e-9);
        assert!((vel - 4.0 * DEG).abs() < 1e-12);
        assert_eq!(phase, MotionPhase::Cruising);
        let (pos, vel, phase) = profile.sample(10005.0);
        assert!((pos - 10.15 * DEG).abs() < 1e-9);
        assert!((vel - 0.1 * DEG).abs() < 1e-12);
        assert_eq!(phase, MotionPhase::Done);
    }

    #[test]
    fn test_azimuth_profile_wraps_across_zero() {
        let profile = AzimuthProfile::new(350.0 * DEG, 10.0 * DEG, 4.0 * DEG, 0.0, 0.0);
        assert!((profile.duration() - 5.0).abs() < 1e-9);
        let (pos, _, _) = profile.sample(3.0);
        assert!((pos - 2.0 * DEG).abs() < 1e-9);
    }

    #[test]
    fn test_linear_profile_clamps_at_target() {
        let profile = LinearProfile::new(0.0, 100.0, 10.0, 100.0);
        assert!((profile.duration() - 10.0).abs() < 1e-12);
        let (pos, phase) = profile.sample(104.0);
        assert!((pos - 40.0).abs() < 1e-12);
        assert_eq!(phase, MotionPhase::Cruising);
        let (pos, phase) = profile.sample(115.0);
        assert!((pos - 100.0).abs() < 1e-12);
        assert_eq!(phase, MotionPhase::Done);
    }

    #[test]
    fn test_crawl_profile_clamps_at_range_end() {
        let profile = CrawlProfile::clamped(1.0, -0.5, 0.0, 0.0, PI / 2.0);
        let (pos, moving) = profile.sample(1.0);
        assert!((pos - 0.5).abs() < 1e-12);
        assert!(moving);
        let (pos, moving) = profile.sample(10.0);
        assert_eq!(pos, 0.0);
        assert!(!moving);
    }

    #[test]
    fn test_crawl_profile_wraps() {
        let profile = CrawlProfile::wrapping(350.0 * DEG, 1.0 * DEG, 0.0);
        let (pos, moving) = profile.sample(11.0);
        assert!((pos - 1.0 * DEG).abs() < 1e-9);
        assert!(moving);
    }
}
