//! Smoothed head-movement estimation from consecutive landmark sets.
//!
//! Raw per-frame landmark displacement is noisy — the mesh model jitters
//! by a fraction of the liveness threshold even on a static image. A
//! short rolling mean absorbs single-frame spikes without hiding real
//! head motion.

use std::collections::VecDeque;

use crate::landmarks::LandmarkSet;

/// Rolling-window capacity for movement smoothing.
pub const HISTORY_CAPACITY: usize = 5;

/// Tracks recent landmark displacement magnitudes for one session.
#[derive(Debug, Default)]
pub struct MovementTracker {
    history: VecDeque<f32>,
}

impl MovementTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the current landmark set and return the smoothed movement
    /// magnitude.
    ///
    /// With no previous set there is nothing to compare against: returns
    /// 0.0 and leaves the history untouched. Otherwise the mean absolute
    /// per-coordinate difference is appended (oldest entry evicted at
    /// capacity) and the mean of the window is returned.
    pub fn update(&mut self, current: &LandmarkSet, previous: Option<&LandmarkSet>) -> f32 {
        let Some(previous) = previous else {
            return 0.0;
        };

        let displacement = mean_abs_delta(current, previous);
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(displacement);

        self.history.iter().sum::<f32>() / self.history.len() as f32
    }
}

fn mean_abs_delta(current: &LandmarkSet, previous: &LandmarkSet) -> f32 {
    let mut sum = 0.0f32;
    for (c, p) in current.iter().zip(previous.iter()) {
        sum += (c.x - p.x).abs() + (c.y - p.y).abs() + (c.z - p.z).abs();
    }
    sum / (current.len() * 3) as f32
}
