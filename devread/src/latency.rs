//! Optional per-read latency recording.

use std::{collections::BTreeMap, time::Duration};

use itertools::Itertools;

pub const LATENCY_PERCENTILES: [f64; 4] = [50.0, 90.0, 99.0, 99.9];

pub(crate) struct LatencyRecorder {
    histo: hdrhistogram::Histogram<u64>,
}

impl LatencyRecorder {
    pub(crate) fn new() -> Self {
        LatencyRecorder {
            // 1ns..1s at 3 significant digits; slower reads saturate.
            histo: hdrhistogram::Histogram::new_with_bounds(1, 1_000_000_000, 3)
                .expect("constant histogram bounds are valid"),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.histo.clear();
    }

    pub(crate) fn record(&mut self, latency: Duration) {
        let nanos = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        self.histo.saturating_record(nanos.max(1));
    }

    pub(crate) fn summary(&self) -> Option<LatencySummary> {
        if self.histo.is_empty() {
            return None;
        }
        let us = |nanos: u64| nanos as f64 / 1000.0;
        Some(LatencySummary {
            count: self.histo.len(),
            min_us: us(self.histo.min()),
            mean_us: self.histo.mean() / 1000.0,
            max_us: us(self.histo.max()),
            percentiles_us: LATENCY_PERCENTILES
                .iter()
                .map(|p| (format!("p{p}"), us(self.histo.value_at_percentile(*p))))
                .collect(),
        })
    }
}

/// Read latency distribution of one block size iteration, in microseconds.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct LatencySummary {
    pub count: u64,
    pub min_us: f64,
    pub mean_us: f64,
    pub max_us: f64,
    pub percentiles_us: BTreeMap<String, f64>,
}

impl std::fmt::Display for LatencySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "LAT(us): n={} min={:.1} mean={:.1} max={:.1} {}",
            self.count,
            self.min_us,
            self.mean_us,
            self.max_us,
            LATENCY_PERCENTILES
                .iter()
                .filter_map(|p| {
                    let key = format!("p{p}");
                    self.percentiles_us.get(&key).map(|v| format!("{key}={v:.1}"))
                })
                .join(" "),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_has_no_summary() {
        assert!(LatencyRecorder::new().summary().is_none());
    }

    #[test]
    fn summary_of_recorded_reads() {
        let mut rec = LatencyRecorder::new();
        for micros in 1..=100u64 {
            rec.record(Duration::from_micros(micros));
        }
        rec.record(Duration::from_secs(5)); // saturates
        let summary = rec.summary().unwrap();
        assert_eq!(summary.count, 101);
        assert!((summary.min_us - 1.0).abs() < 0.01);
        assert!(summary.max_us <= 1_000_000.0 * 1.001);
        let p50 = summary.percentiles_us["p50"];
        assert!((49.0..=52.0).contains(&p50), "p50={p50}");
        let line = summary.to_string();
        assert!(line.starts_with("LAT(us): n=101 min=1.0"), "{line}");
        assert!(line.contains("p99.9="), "{line}");
    }
}
