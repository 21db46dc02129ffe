use serde::{Deserialize, Serialize};

/// Streaming summary of a series of values.
///
/// Mean and variance are updated with Welford's algorithm.
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: usize,
    mean: f64,
    sq_dev_sum: f64,
    min: f64,
    max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    /// Standard error of the mean, ignoring autocorrelation.
    pub sem: f64,
    pub min: f64,
    pub max: f64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, val: f64) {
        if self.count == 0 {
            self.min = val;
            self.max = val;
        } else {
            self.min = self.min.min(val);
            self.max = self.max.max(val);
        }
        self.count += 1;

        let delta = val - self.mean;
        self.mean += delta / self.count as f64;
        self.sq_dev_sum += delta * (val - self.mean);
    }

    pub fn report(&self) -> StatsReport {
        let (mean, min, max) = if self.count == 0 {
            (f64::NAN, f64::NAN, f64::NAN)
        } else {
            (self.mean, self.min, self.max)
        };
        let std_dev = if self.count > 1 {
            (self.sq_dev_sum / (self.count - 1) as f64).sqrt()
        } else {
            f64::NAN
        };
        StatsReport {
            count: self.count,
            mean,
            std_dev,
            sem: std_dev / (self.count as f64).sqrt(),
            min,
            max,
        }
    }
}
