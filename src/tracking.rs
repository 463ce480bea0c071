// src/tracking.rs - Per-frame driver around the depth filter
use std::collections::VecDeque;
use std::time::Instant;

use tracing::{debug, warn};

use crate::config::FilterConfig;
use crate::error::{ConfigError, FilterError};
use crate::features::PoseFeatures;
use crate::filter::DepthFilter;
use crate::skeleton::DepthVector;
use crate::transition::MeasurementFrame;

const METRICS_WINDOW: usize = 30;

#[derive(Debug, Clone, Default)]
pub struct PerformanceMetrics {
    /// Mean processing time over the last few frames, in seconds.
    pub avg_processing_time: f32,
    pub frames_processed: u64,
    pub frames_lost: u64,
    pub updates_skipped: u64,
    frame_times: VecDeque<f32>,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self {
            frame_times: VecDeque::with_capacity(METRICS_WINDOW),
            ..Self::default()
        }
    }

    fn record(&mut self, elapsed: f32) {
        self.frame_times.push_front(elapsed);
        if self.frame_times.len() > METRICS_WINDOW {
            self.frame_times.pop_back();
        }
        self.avg_processing_time =
            self.frame_times.iter().sum::<f32>() / self.frame_times.len() as f32;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackingResult {
    pub frame: u64,
    pub timestamp: f64,
    /// No usable skeleton this frame; `depths` repeats the last estimate.
    pub tracking_lost: bool,
    /// `P + R` was singular; `depths` is the prediction only.
    pub update_skipped: bool,
    pub depths: DepthVector,
    pub features: Option<PoseFeatures>,
}

pub struct DepthTracker {
    filter: DepthFilter,
    time_step: f64,
    compute_features: bool,
    frame_counter: u64,
    metrics: PerformanceMetrics,
}

impl DepthTracker {
    pub fn new(config: &FilterConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            filter: DepthFilter::from_config(config)?,
            time_step: config.time_step,
            compute_features: false,
            frame_counter: 0,
            metrics: PerformanceMetrics::new(),
        })
    }

    /// Also extract the normalised feature row for every tracked frame.
    pub fn with_features(mut self, enabled: bool) -> Self {
        self.compute_features = enabled;
        self
    }

    pub fn depths(&self) -> &DepthVector {
        self.filter.depths()
    }

    pub fn filter(&self) -> &DepthFilter {
        &self.filter
    }

    pub fn metrics(&self) -> &PerformanceMetrics {
        &self.metrics
    }

    /// One predict/update cycle. `None` means the detector found no skeleton;
    /// the filter is then left where it was.
    pub fn process_frame(&mut self, frame: Option<&MeasurementFrame>, timestamp: f64) -> TrackingResult {
        let start = Instant::now();
        let index = self.frame_counter;
        self.frame_counter += 1;

        let mut result = TrackingResult {
            frame: index,
            timestamp,
            tracking_lost: true,
            update_skipped: false,
            depths: *self.filter.depths(),
            features: None,
        };

        let Some(frame) = frame else {
            debug!(frame = index, "no skeleton, filter not advanced");
            self.metrics.frames_lost += 1;
            return result;
        };

        if let Err(err) = self.filter.predict(frame, self.time_step) {
            warn!(frame = index, %err, "frame rejected");
            self.metrics.frames_lost += 1;
            return result;
        }

        match self.filter.update(&frame.raw_depths()) {
            Ok(()) => {}
            Err(FilterError::SingularInnovation) => {
                result.update_skipped = true;
                self.metrics.updates_skipped += 1;
            }
            Err(err) => warn!(frame = index, %err, "unexpected update failure"),
        }

        result.tracking_lost = false;
        result.depths = *self.filter.depths();
        if self.compute_features {
            result.features = Some(PoseFeatures::extract(frame, &result.depths));
        }

        self.metrics.frames_processed += 1;
        self.metrics.record(start.elapsed().as_secs_f32());
        result
    }
}
