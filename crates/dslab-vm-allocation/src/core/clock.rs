//! Simulation clock consumed by the allocation subsystem.

use std::cell::Cell;

/// Source of the current simulation time.
///
/// The allocation subsystem never advances time by itself. It is driven by an external discrete-event simulation
/// which invokes it on each scheduling interval and exposes the current time through this trait.
pub trait Clock {
    fn time(&self) -> f64;
}

/// Clock whose time is set explicitly by the caller.
#[derive(Default)]
pub struct ManualClock {
    time: Cell<f64>,
}

impl ManualClock {
    pub fn new(time: f64) -> Self {
        Self { time: Cell::new(time) }
    }

    pub fn set_time(&self, time: f64) {
        self.time.set(time);
    }

    pub fn advance(&self, duration: f64) {
        self.time.set(self.time.get() + duration);
    }
}

impl Clock for ManualClock {
    fn time(&self) -> f64 {
        self.time.get()
    }
}
