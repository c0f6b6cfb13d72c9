use std::collections::VecDeque;

/// Rolling health score derived from probe outcomes.
///
/// The score is `ceiling * successes / samples` over the most recent
/// `window` probes, and equals the ceiling before the first probe.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthTracker {
    window: usize,
    ceiling: f32,
    outcomes: VecDeque<bool>,
}

impl HealthTracker {
    /// Creates a tracker. `ceiling` is clamped to `[0, 1]`.
    #[must_use]
    pub fn new(window: usize, ceiling: f32) -> Self {
        let window = window.max(1);
        Self {
            window,
            ceiling: ceiling.clamp(0.0, 1.0),
            outcomes: VecDeque::with_capacity(window),
        }
    }

    /// Records a probe outcome and returns the updated score.
    pub fn record(&mut self, success: bool) -> f32 {
        if self.outcomes.len() == self.window {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(success);
        self.score()
    }

    /// Current score.
    #[must_use]
    pub fn score(&self) -> f32 {
        if self.outcomes.is_empty() {
            return self.ceiling;
        }
        let successes = self.outcomes.iter().filter(|ok| **ok).count();
        #[allow(clippy::cast_precision_loss)]
        let ratio = successes as f32 / self.outcomes.len() as f32;
        self.ceiling * ratio
    }

    /// Upper bound of the score.
    #[must_use]
    pub const fn ceiling(&self) -> f32 {
        self.ceiling
    }

    /// Number of outcomes currently retained.
    #[must_use]
    pub fn samples(&self) -> usize {
        self.outcomes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_ceiling() {
        let tracker = HealthTracker::new(4, 0.8);
        assert!((tracker.score() - 0.8).abs() < f32::EPSILON);
        assert_eq!(tracker.samples(), 0);
    }

    #[test]
    fn window_forgets_old_failures() {
        let mut tracker = HealthTracker::new(2, 1.0);
        assert!((tracker.record(false) - 0.0).abs() < f32::EPSILON);
        assert!((tracker.record(true) - 0.5).abs() < f32::EPSILON);
        assert!((tracker.record(true) - 1.0).abs() < f32::EPSILON);
        assert_eq!(tracker.samples(), 2);
    }

    #[test]
    fn ceiling_is_clamped() {
        let tracker = HealthTracker::new(0, 3.0);
        assert!((tracker.ceiling() - 1.0).abs() < f32::EPSILON);
    }
}
