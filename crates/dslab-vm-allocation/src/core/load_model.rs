//! VM CPU load models.

use dyn_clone::{clone_trait_object, DynClone};

/// A load model is a function which defines the fraction of VM CPU capacity in use at the moment.
/// `time` is the current simulation time, `time_from_start` is the time since the VM was created
/// which allows to model load peaks at the beginning of VM lifecycle.
pub trait LoadModel: DynClone + Send + Sync {
    fn get_resource_load(&self, time: f64, time_from_start: f64) -> f64;
}

clone_trait_object!(LoadModel);

/// The simplest load model, the constant load.
#[derive(Clone)]
pub struct ConstantLoadModel {
    load: f64,
}

impl ConstantLoadModel {
    pub fn new(load: f64) -> Self {
        Self { load }
    }
}

impl LoadModel for ConstantLoadModel {
    fn get_resource_load(&self, _time: f64, _time_from_start: f64) -> f64 {
        self.load
    }
}

/// Piecewise-constant load replayed from `(time, load)` samples sorted by time.
///
/// Before the first sample the first load value is used.
#[derive(Clone)]
pub struct TraceLoadModel {
    samples: Vec<(f64, f64)>,
}

impl TraceLoadModel {
    pub fn new(mut samples: Vec<(f64, f64)>) -> Self {
        samples.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { samples }
    }
}

impl LoadModel for TraceLoadModel {
    fn get_resource_load(&self, time: f64, _time_from_start: f64) -> f64 {
        let idx = self.samples.partition_point(|(t, _)| *t <= time);
        if idx == 0 {
            self.samples.first().map(|s| s.1).unwrap_or(0.)
        } else {
            self.samples[idx - 1].1
        }
    }
}
