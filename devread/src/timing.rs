//! Wall clock and process CPU time measurement.
//!
//! A [`TimingTracker`] captures a base time when created. [`TimingTracker::mark`]
//! takes a [`TimingSnapshot`], and [`TimingTracker::delta`] turns a previous
//! snapshot into a [`TimingDelta`] covering the interval since.

use std::{io, time::Duration, time::Instant};

use nix::sys::{
    resource::{getrusage, UsageWho},
    time::TimeVal,
};

use crate::error::TimingError;

/// Intervals at or below this are too short to derive a rate from.
pub const MIN_MEASURABLE_ELAPSED_SECS: f64 = 1e-9;

/// Source of wall clock and process CPU time readings.
pub trait Clock {
    /// Monotonic wall clock reading relative to an arbitrary epoch.
    fn wall(&self) -> Duration;
    /// User plus system CPU time consumed by the process so far.
    fn cpu(&self) -> io::Result<Duration>;
}

/// [`Instant`] for wall time, `getrusage(RUSAGE_SELF)` for CPU time.
#[derive(Debug, Clone, Copy)]
pub struct ProcessClock {
    epoch: Instant,
}

impl ProcessClock {
    pub fn new() -> Self {
        ProcessClock {
            epoch: Instant::now(),
        }
    }
}

impl Default for ProcessClock {
    fn default() -> Self {
        Self::new()
    }
}

fn timeval_to_duration(tv: TimeVal) -> Duration {
    Duration::from_secs(tv.tv_sec() as u64) + Duration::from_micros(tv.tv_usec() as u64)
}

impl Clock for ProcessClock {
    fn wall(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn cpu(&self) -> io::Result<Duration> {
        let usage = getrusage(UsageWho::RUSAGE_SELF)?;
        Ok(timeval_to_duration(usage.user_time()) + timeval_to_duration(usage.system_time()))
    }
}

/// Wall seconds since the tracker's base time, and process CPU seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingSnapshot {
    pub wall: f64,
    pub cpu: f64,
}

/// One measurement interval.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct TimingDelta {
    pub elapsed: f64,
    pub cpu: f64,
}

impl TimingDelta {
    /// Whether the interval is long enough to divide by.
    pub fn is_measurable(&self) -> bool {
        self.elapsed.is_finite() && self.elapsed > MIN_MEASURABLE_ELAPSED_SECS
    }
}

pub struct TimingTracker<C = ProcessClock> {
    clock: C,
    base: Duration,
}

impl TimingTracker<ProcessClock> {
    pub fn process() -> Self {
        Self::new(ProcessClock::new())
    }
}

impl<C: Clock> TimingTracker<C> {
    pub fn new(clock: C) -> Self {
        let base = clock.wall();
        TimingTracker { clock, base }
    }

    pub fn mark(&self) -> Result<TimingSnapshot, TimingError> {
        // Relative to `base` so the f64 keeps sub-microsecond resolution.
        let wall = self.clock.wall().as_secs_f64() - self.base.as_secs_f64();
        let cpu = self.clock.cpu()?.as_secs_f64();
        Ok(TimingSnapshot { wall, cpu })
    }

    pub fn delta(&self, since: &TimingSnapshot) -> Result<TimingDelta, TimingError> {
        let now = self.mark()?;
        let elapsed = now.wall - since.wall;
        let cpu = now.cpu - since.cpu;
        if elapsed < 0.0 {
            return Err(TimingError::NegativeElapsed { elapsed });
        }
        if cpu < 0.0 {
            return Err(TimingError::NegativeCpu { cpu });
        }
        Ok(TimingDelta { elapsed, cpu })
    }
}

/// Throughput and CPU utilization derived from a byte count and an interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rates {
    Measured {
        /// Truncated towards zero.
        kb_per_sec: u64,
        cpu_percent: f64,
    },
    /// The interval was too short (or unusable) to divide by.
    Indeterminate,
}

impl Rates {
    pub fn compute(bytes: u64, delta: &TimingDelta) -> Self {
        if !delta.is_measurable() {
            return Rates::Indeterminate;
        }
        let kb_per_sec = bytes as f64 / (delta.elapsed * 1024.0);
        let cpu_percent = delta.cpu / delta.elapsed * 100.0;
        if !kb_per_sec.is_finite() || !cpu_percent.is_finite() {
            return Rates::Indeterminate;
        }
        Rates::Measured {
            kb_per_sec: kb_per_sec as u64,
            cpu_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::ScriptedClock;

    #[test]
    fn process_clock_is_monotonic() {
        let tracker = TimingTracker::process();
        let mark = tracker.mark().unwrap();
        // burn a little cpu
        let mut x = 0u64;
        for i in 0..1_000_000u64 {
            x = x.wrapping_mul(31).wrapping_add(i);
        }
        std::hint::black_box(x);
        let delta = tracker.delta(&mark).unwrap();
        assert!(delta.elapsed >= 0.0);
        assert!(delta.cpu >= 0.0);
    }

    #[test]
    fn marks_are_relative_to_base() {
        let clock = ScriptedClock::new(&[100.0, 101.5, 104.0], &[3.25, 4.0]);
        let tracker = TimingTracker::new(clock);
        let mark = tracker.mark().unwrap();
        assert_eq!(
            mark,
            TimingSnapshot {
                wall: 1.5,
                cpu: 3.25
            }
        );
        let delta = tracker.delta(&mark).unwrap();
        assert_eq!(
            delta,
            TimingDelta {
                elapsed: 2.5,
                cpu: 0.75
            }
        );
    }

    #[test]
    fn backwards_wall_clock() {
        let clock = ScriptedClock::new(&[10.0, 12.0, 11.0], &[0.0, 1.0]);
        let tracker = TimingTracker::new(clock);
        let mark = tracker.mark().unwrap();
        assert!(matches!(
            tracker.delta(&mark),
            Err(TimingError::NegativeElapsed { elapsed }) if elapsed == -1.0
        ));
    }

    #[test]
    fn backwards_cpu_clock() {
        let clock = ScriptedClock::new(&[0.0, 1.0, 2.0], &[2.0, 1.0]);
        let tracker = TimingTracker::new(clock);
        let mark = tracker.mark().unwrap();
        assert!(matches!(
            tracker.delta(&mark),
            Err(TimingError::NegativeCpu { .. })
        ));
    }

    #[test]
    fn throughput_and_cpu_percent() {
        let delta = TimingDelta {
            elapsed: 2.0,
            cpu: 0.5,
        };
        assert_eq!(
            Rates::compute(2 * 1024 * 1024, &delta),
            Rates::Measured {
                kb_per_sec: 1024,
                cpu_percent: 25.0
            }
        );
    }

    #[test]
    fn throughput_truncates() {
        let delta = TimingDelta {
            elapsed: 3.0,
            cpu: 0.0,
        };
        // 1 MiB / 3s = 341.33 kB/s
        assert!(matches!(
            Rates::compute(1024 * 1024, &delta),
            Rates::Measured { kb_per_sec: 341, .. }
        ));
    }

    #[test]
    fn zero_elapsed_is_indeterminate() {
        for elapsed in [0.0, 1e-12, f64::NAN, f64::INFINITY] {
            let delta = TimingDelta { elapsed, cpu: 0.1 };
            assert_eq!(Rates::compute(1 << 20, &delta), Rates::Indeterminate);
        }
    }
}
