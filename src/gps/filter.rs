// src/gps/filter.rs
//! Sampling policy: keep a fix on significant movement or after an interval

use super::data::LocationSample;
use super::provider::WatchOptions;
use crate::metrics::haversine_meters;

pub struct SampleFilter {
    min_distance: f64,      // meters
    min_interval: chrono::Duration,
    last: Option<LocationSample>,
}

impl SampleFilter {
    pub fn new(options: &WatchOptions) -> Self {
        Self {
            min_distance: options.min_distance_m,
            min_interval: chrono::Duration::from_std(options.min_interval)
                .unwrap_or_else(|_| chrono::Duration::seconds(1)),
            last: None,
        }
    }

    /// Decide whether a fix should be delivered, whichever threshold is met first
    pub fn accept(&mut self, sample: &LocationSample) -> bool {
        let keep = match &self.last {
            None => true,
            Some(last) => {
                let moved = haversine_meters(&last.coordinate, &sample.coordinate);
                let elapsed = sample.timestamp.signed_duration_since(last.timestamp);
                moved >= self.min_distance || elapsed >= self.min_interval
            }
        };

        if keep {
            self.last = Some(sample.clone());
        }
        keep
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gps::provider::Accuracy;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn options() -> WatchOptions {
        WatchOptions {
            accuracy: Accuracy::High,
            min_distance_m: 3.0,
            min_interval: Duration::from_secs(1),
        }
    }

    fn at(lat: f64, lon: f64, millis: i64) -> LocationSample {
        LocationSample::new(lat, lon).with_timestamp(Utc.timestamp_millis_opt(millis).unwrap())
    }

    #[test]
    fn test_first_sample_accepted() {
        let mut filter = SampleFilter::new(&options());
        assert!(filter.accept(&at(0.0, 0.0, 0)));
    }

    #[test]
    fn test_small_quick_move_rejected() {
        let mut filter = SampleFilter::new(&options());
        assert!(filter.accept(&at(0.0, 0.0, 0)));
        // ~1.1m after 200ms
        assert!(!filter.accept(&at(0.0, 0.00001, 200)));
    }

    #[test]
    fn test_distance_threshold_wins() {
        let mut filter = SampleFilter::new(&options());
        assert!(filter.accept(&at(0.0, 0.0, 0)));
        // ~5.5m after 200ms
        assert!(filter.accept(&at(0.0, 0.00005, 200)));
    }

    #[test]
    fn test_interval_threshold_wins() {
        let mut filter = SampleFilter::new(&options());
        assert!(filter.accept(&at(0.0, 0.0, 0)));
        // Standing still for a second still yields a sample
        assert!(filter.accept(&at(0.0, 0.0, 1000)));
    }
}
