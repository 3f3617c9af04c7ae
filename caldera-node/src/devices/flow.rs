//! Hall-effect flow sensor with pulse-count lookback
//!
//! The edge source calls `tick()` on every pulse; revolutions are bucketed
//! into fixed intervals and `read()` averages the recent window into a
//! calibrated flow rate.

use super::Readable;
use caldera_core::{temp, ControlError};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::trace;

const DEFAULT_HISTORY: usize = 100;
const CALIBRATION_CONSTANT: f64 = 0.1;

struct FlowWindow {
    buckets: VecDeque<u32>,
    current: u32,
    last_roll: Instant,
}

pub struct FlowSensor {
    name: String,
    bucket_interval: Duration,
    window: Mutex<FlowWindow>,
    lookback_buckets: usize,
}

impl FlowSensor {
    pub fn new(name: &str, bucket_interval_secs: u64, lookback_buckets: usize) -> Self {
        Self {
            name: name.to_string(),
            bucket_interval: Duration::from_secs(bucket_interval_secs.max(1)),
            window: Mutex::new(FlowWindow {
                buckets: VecDeque::with_capacity(DEFAULT_HISTORY),
                current: 0,
                last_roll: Instant::now(),
            }),
            lookback_buckets: lookback_buckets.max(1),
        }
    }

    /// Called by the pin edge source on every detected pulse
    pub fn tick(&self) {
        let mut window = self.window.lock().unwrap();
        self.roll_if_due(&mut window);
        window.current += 1;
    }

    fn roll_if_due(&self, window: &mut FlowWindow) {
        while window.last_roll.elapsed() >= self.bucket_interval {
            let finished = window.current;
            trace!("{} finished a bucket with {} revs", self.name, finished);
            window.buckets.push_back(finished);
            while window.buckets.len() > DEFAULT_HISTORY {
                window.buckets.pop_front();
            }
            window.current = 0;
            window.last_roll += self.bucket_interval;
        }
    }
}

impl Readable for FlowSensor {
    fn read(&self) -> Result<f64, ControlError> {
        let mut window = self.window.lock().unwrap();
        self.roll_if_due(&mut window);

        let take = self.lookback_buckets.min(window.buckets.len().max(1));
        let selected: Vec<u32> = window
            .buckets
            .iter()
            .rev()
            .take(take)
            .copied()
            .collect();
        // no finished bucket yet: fall back to the live count
        let (sum, count) = if selected.is_empty() {
            (window.current as f64, 1.0)
        } else {
            (selected.iter().map(|v| *v as f64).sum(), selected.len() as f64)
        };
        Ok(temp::round4((sum / count) * CALIBRATION_CONSTANT))
    }
}
