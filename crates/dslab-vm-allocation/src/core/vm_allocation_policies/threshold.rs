//! Host over-utilization thresholds.

use std::str::FromStr;

use dyn_clone::{clone_trait_object, DynClone};

use crate::core::error::{check_fraction, check_non_negative, check_positive_size, ConfigError};
use crate::core::host::Host;
use crate::core::stats::{iqr, mad};

/// Computes the CPU utilization above which the host is considered overloaded.
pub trait UpperThreshold: DynClone + Send + Sync {
    fn over_utilization_threshold(&self, host: &Host) -> f64;
}

clone_trait_object!(UpperThreshold);

/// Fixed threshold.
#[derive(Clone, Debug)]
pub struct StaticThreshold {
    threshold: f64,
}

impl StaticThreshold {
    pub fn new(threshold: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            threshold: check_fraction("over_utilization_threshold", threshold)?,
        })
    }
}

impl UpperThreshold for StaticThreshold {
    fn over_utilization_threshold(&self, _host: &Host) -> f64 {
        self.threshold
    }
}

/// Measure of utilization variability.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UtilizationMeasure {
    /// Median absolute deviation.
    Mad,
    /// Interquartile range.
    Iqr,
}

impl FromStr for UtilizationMeasure {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Mad" => Ok(Self::Mad),
            "Iqr" => Ok(Self::Iqr),
            _ => Err(ConfigError::UnknownName {
                kind: "utilization measure",
                name: s.to_string(),
            }),
        }
    }
}

/// Threshold adapted to the recent host utilization: `1 - safety_parameter * measure(history)`.
///
/// The more the host utilization varies, the lower the threshold is. If the host history is too short
/// to compute the measure, the fallback threshold is used.
#[derive(Clone)]
pub struct DynamicUpperThreshold {
    measure: UtilizationMeasure,
    safety_parameter: f64,
    min_history_size: usize,
    fallback: Box<dyn UpperThreshold>,
}

impl DynamicUpperThreshold {
    pub fn new(
        measure: UtilizationMeasure,
        safety_parameter: f64,
        min_history_size: usize,
        fallback: Box<dyn UpperThreshold>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            measure,
            safety_parameter: check_non_negative("safety_parameter", safety_parameter)?,
            min_history_size: check_positive_size("min_history_size_for_measure", min_history_size)?,
            fallback,
        })
    }

    /// Returns the utilization measure of the host or `None` if the host history is too short.
    pub fn utilization_measure(&self, host: &Host) -> Option<f64> {
        let history = host.utilization_history().values_newest_first();
        if history.len() < self.min_history_size {
            return None;
        }
        Some(match self.measure {
            UtilizationMeasure::Mad => mad(&history),
            UtilizationMeasure::Iqr => iqr(&history),
        })
    }
}

impl UpperThreshold for DynamicUpperThreshold {
    fn over_utilization_threshold(&self, host: &Host) -> f64 {
        match self.utilization_measure(host) {
            Some(measure) => 1. - self.safety_parameter * measure,
            None => self.fallback.over_utilization_threshold(host),
        }
    }
}
