//! Bounded history of CPU utilization samples.

use std::collections::VecDeque;

use serde::Serialize;

/// Time-ordered sequence of `(time, utilization)` samples keeping at most `max_size` latest entries.
#[derive(Clone, Debug, Serialize)]
pub struct UtilizationHistory {
    samples: VecDeque<(f64, f64)>,
    max_size: usize,
}

impl UtilizationHistory {
    pub fn new(max_size: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_size),
            max_size: max_size.max(1),
        }
    }

    /// Appends a sample. A sample for the same time as the latest one replaces it.
    pub fn add(&mut self, time: f64, utilization: f64) {
        if let Some(last) = self.samples.back_mut() {
            if last.0 == time {
                last.1 = utilization;
                return;
            }
        }
        self.samples.push_back((time, utilization));
        while self.samples.len() > self.max_size {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn latest(&self) -> Option<f64> {
        self.samples.back().map(|s| s.1)
    }

    /// Returns utilization values starting from the most recent one.
    pub fn values_newest_first(&self) -> Vec<f64> {
        self.samples.iter().rev().map(|s| s.1).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(f64, f64)> {
        self.samples.iter()
    }
}
