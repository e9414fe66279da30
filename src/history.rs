//! Bounded sample history for charts.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Fixed-capacity FIFO, oldest sample first.
#[derive(Debug, Clone)]
pub struct RollingHistory<T> {
    samples: VecDeque<T>,
    capacity: usize,
}

impl<T> RollingHistory<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: T) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.samples.iter()
    }

    pub fn latest(&self) -> Option<&T> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn values(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.samples.iter().cloned().collect()
    }
}

/// Raw samples paired with their 0-100 projection onto a display range.
#[derive(Debug, Clone)]
pub struct ScaledHistory {
    raw: RollingHistory<f64>,
    normalized: RollingHistory<f64>,
    min: f64,
    max: f64,
}

impl ScaledHistory {
    pub fn new(capacity: usize, min: f64, max: f64) -> Self {
        Self {
            raw: RollingHistory::new(capacity),
            normalized: RollingHistory::new(capacity),
            min,
            max,
        }
    }

    pub fn push(&mut self, value: f64) {
        self.raw.push(value);
        self.normalized.push(normalize(value, self.min, self.max));
    }

    /// Change the display range and re-project every retained sample.
    pub fn set_range(&mut self, min: f64, max: f64) {
        self.min = min;
        self.max = max;

        self.normalized.clear();
        for value in self.raw.iter() {
            self.normalized.push(normalize(*value, min, max));
        }
    }

    /// Grow or shrink the upper bound to the retained peak, never below `floor`.
    pub fn fit_to_peak(&mut self, floor: f64) {
        let peak = self.raw.iter().copied().fold(floor, f64::max);
        if peak != self.max {
            self.set_range(self.min, peak);
        }
    }

    pub fn range(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    pub fn raw(&self) -> &RollingHistory<f64> {
        &self.raw
    }

    pub fn normalized(&self) -> &RollingHistory<f64> {
        &self.normalized
    }

    pub fn snapshot(&self, unit: &str) -> ChartSnapshot {
        ChartSnapshot {
            min: self.min,
            max: self.max,
            unit: unit.to_string(),
            raw: self.raw.values(),
            normalized: self.normalized.values(),
        }
    }
}

/// Clamp into `[min, max]`, then map onto `[0, 100]`.
pub fn normalize(value: f64, min: f64, max: f64) -> f64 {
    if max <= min {
        return 0.0;
    }
    let clamped = value.clamp(min, max);
    (clamped - min) / (max - min) * 100.0
}

/// Chart data shipped with each published update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSnapshot {
    pub min: f64,
    pub max: f64,
    pub unit: String,
    /// Values as sampled, oldest first
    pub raw: Vec<f64>,
    /// Values projected onto 0-100, oldest first
    pub normalized: Vec<f64>,
}
