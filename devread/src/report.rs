//! Per-iteration output.
//!
//! [`format_line`] produces the stable `done: block=...` line that log
//! scrapers depend on; keep its layout unchanged.

use std::{io, time::Duration};

use devread_common::DeviceSize;
use serde_with::serde_as;

use crate::{driver::IterationResult, latency::LatencySummary, timing::Rates};

/// Printed in place of a rate that can't be computed.
pub const INDETERMINATE: &str = "n/a";

/// Consumes iteration results as they are produced.
pub trait Reporter {
    /// Called once before the sweep starts.
    fn begin(&mut self, _device: &str, _device_size: DeviceSize) -> io::Result<()> {
        Ok(())
    }

    fn report(&mut self, result: &IterationResult) -> io::Result<()>;
}

impl<R: Reporter + ?Sized> Reporter for &mut R {
    fn begin(&mut self, device: &str, device_size: DeviceSize) -> io::Result<()> {
        (**self).begin(device, device_size)
    }

    fn report(&mut self, result: &IterationResult) -> io::Result<()> {
        (**self).report(result)
    }
}

impl<A: Reporter, B: Reporter> Reporter for (A, B) {
    fn begin(&mut self, device: &str, device_size: DeviceSize) -> io::Result<()> {
        self.0.begin(device, device_size)?;
        self.1.begin(device, device_size)
    }

    fn report(&mut self, result: &IterationResult) -> io::Result<()> {
        self.0.report(result)?;
        self.1.report(result)
    }
}

/// `done: block=<8>  <6> kB/s <5.1> %CPU <.3> s`
pub fn format_line(result: &IterationResult) -> String {
    let elapsed = match &result.timing {
        Ok(delta) => format!("{:3.3}", delta.elapsed),
        Err(_) => INDETERMINATE.to_owned(),
    };
    match result.rates() {
        Rates::Measured {
            kb_per_sec,
            cpu_percent,
        } => format!(
            "done: block={:8}  {:6} kB/s {:5.1} %CPU {} s",
            result.block_size, kb_per_sec, cpu_percent, elapsed
        ),
        Rates::Indeterminate => format!(
            "done: block={:8}  {:>6} kB/s {:>5} %CPU {} s",
            result.block_size, INDETERMINATE, INDETERMINATE, elapsed
        ),
    }
}

/// Writes the text report, one line per block size, flushing after each.
pub struct LineReporter<W> {
    out: W,
}

impl<W: io::Write> LineReporter<W> {
    pub fn new(out: W) -> Self {
        LineReporter { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl LineReporter<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: io::Write> Reporter for LineReporter<W> {
    fn begin(&mut self, device: &str, device_size: DeviceSize) -> io::Result<()> {
        writeln!(self.out, "Device read speed test")?;
        writeln!(self.out, "Device name: {device}     Device Size: {device_size}")?;
        writeln!(self.out)?;
        self.out.flush()
    }

    fn report(&mut self, result: &IterationResult) -> io::Result<()> {
        if let Some(shortfall) = &result.shortfall {
            match &shortfall.source {
                Some(e) => writeln!(self.out, "{shortfall}: {e}")?,
                None => writeln!(self.out, "{shortfall}")?,
            }
        }
        writeln!(self.out, "{}", format_line(result))?;
        self.out.flush()
    }
}

/// Serializable copy of an [`IterationResult`].
#[serde_as]
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ResultRecord {
    pub block_size: usize,
    pub target_size: u64,
    pub bytes_read: u64,
    pub reads: u64,
    pub wraparounds: u64,
    #[serde_as(as = "Option<serde_with::DurationMicroSeconds<f64>>")]
    pub elapsed_us: Option<Duration>,
    #[serde_as(as = "Option<serde_with::DurationMicroSeconds<f64>>")]
    pub cpu_us: Option<Duration>,
    pub kb_per_sec: Option<u64>,
    pub cpu_percent: Option<f64>,
    pub timing_error: Option<String>,
    pub shortfall: Option<String>,
    pub latency: Option<LatencySummary>,
}

impl From<&IterationResult> for ResultRecord {
    fn from(result: &IterationResult) -> Self {
        let (kb_per_sec, cpu_percent) = match result.rates() {
            Rates::Measured {
                kb_per_sec,
                cpu_percent,
            } => (Some(kb_per_sec), Some(cpu_percent)),
            Rates::Indeterminate => (None, None),
        };
        let (elapsed_us, cpu_us) = match &result.timing {
            Ok(delta) => (
                Duration::try_from_secs_f64(delta.elapsed).ok(),
                Duration::try_from_secs_f64(delta.cpu).ok(),
            ),
            Err(_) => (None, None),
        };
        ResultRecord {
            block_size: result.block_size,
            target_size: result.target_size,
            bytes_read: result.bytes_read,
            reads: result.reads,
            wraparounds: result.wraparounds,
            elapsed_us,
            cpu_us,
            kb_per_sec,
            cpu_percent,
            timing_error: result.timing.as_ref().err().map(|e| e.to_string()),
            shortfall: result.shortfall.as_ref().map(|s| match &s.source {
                Some(e) => format!("{s}: {e}"),
                None => s.to_string(),
            }),
            latency: result.latency.clone(),
        }
    }
}

/// Keeps a [`ResultRecord`] per iteration and logs latency summaries.
#[derive(Debug, Default)]
pub struct Collector {
    records: Vec<ResultRecord>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ResultRecord> {
        self.records
    }
}

impl Reporter for Collector {
    fn report(&mut self, result: &IterationResult) -> io::Result<()> {
        if let Some(latency) = &result.latency {
            tracing::info!(block_size = result.block_size, "{latency}");
        }
        self.records.push(ResultRecord::from(result));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{ReadShortfall, TimingError},
        timing::TimingDelta,
    };

    fn result(
        block_size: usize,
        bytes: u64,
        timing: Result<TimingDelta, TimingError>,
    ) -> IterationResult {
        IterationResult {
            index: 0,
            block_size,
            target_size: bytes,
            bytes_read: bytes,
            reads: bytes / block_size as u64,
            wraparounds: 0,
            timing,
            shortfall: None,
            latency: None,
        }
    }

    #[test]
    fn measured_line() {
        let r = result(
            4096,
            2 * 1024 * 1024,
            Ok(TimingDelta {
                elapsed: 2.0,
                cpu: 0.5,
            }),
        );
        assert_eq!(
            format_line(&r),
            "done: block=    4096    1024 kB/s  25.0 %CPU 2.000 s"
        );
    }

    #[test]
    fn wide_values_are_not_truncated() {
        let r = result(
            1 << 20,
            200 << 20,
            Ok(TimingDelta {
                elapsed: 0.125,
                cpu: 0.125,
            }),
        );
        assert_eq!(
            format_line(&r),
            "done: block= 1048576  1638400 kB/s 100.0 %CPU 0.125 s"
        );
    }

    #[test]
    fn zero_elapsed_prints_sentinel() {
        let r = result(
            1,
            1 << 20,
            Ok(TimingDelta {
                elapsed: 0.0,
                cpu: 0.0,
            }),
        );
        assert_eq!(
            format_line(&r),
            "done: block=       1     n/a kB/s   n/a %CPU 0.000 s"
        );
    }

    #[test]
    fn timing_error_prints_sentinel() {
        let r = result(512, 1 << 20, Err(TimingError::NegativeElapsed { elapsed: -1.0 }));
        assert_eq!(
            format_line(&r),
            "done: block=     512     n/a kB/s   n/a %CPU n/a s"
        );
        let record = ResultRecord::from(&r);
        assert_eq!(record.kb_per_sec, None);
        assert!(record.timing_error.unwrap().contains("backwards"));
    }

    #[test]
    fn shortfall_line_precedes_report() {
        let mut r = result(
            4096,
            1 << 20,
            Ok(TimingDelta {
                elapsed: 1.0,
                cpu: 0.0,
            }),
        );
        r.bytes_read = 8192;
        r.shortfall = Some(ReadShortfall {
            requested: 4096,
            actual: 0,
            offset: 8192,
            source: None,
        });
        let mut reporter = LineReporter::new(Vec::new());
        reporter.report(&r).unwrap();
        let out = String::from_utf8(reporter.into_inner()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines[0], "read error requested=4096 actual=0 offset=8192");
        assert_eq!(lines[1], "done: block=    4096       8 kB/s   0.0 %CPU 1.000 s");
    }

    #[test]
    fn header() {
        let mut reporter = LineReporter::new(Vec::new());
        reporter
            .begin("/dev/sdz", DeviceSize::Known(1 << 30))
            .unwrap();
        let out = String::from_utf8(reporter.into_inner()).unwrap();
        assert_eq!(
            out,
            "Device read speed test\nDevice name: /dev/sdz     Device Size: 1073741824\n\n"
        );
    }

    #[test]
    fn record_serializes() {
        let r = result(
            4096,
            2 * 1024 * 1024,
            Ok(TimingDelta {
                elapsed: 2.0,
                cpu: 0.5,
            }),
        );
        let mut collector = Collector::new();
        collector.report(&r).unwrap();
        let json = serde_json::to_value(&collector.records()[0]).unwrap();
        assert_eq!(json["block_size"], 4096);
        assert_eq!(json["kb_per_sec"], 1024);
        assert_eq!(json["cpu_percent"], 25.0);
        assert_eq!(json["elapsed_us"], 2_000_000.0);
        assert!(json["shortfall"].is_null());
    }
}
