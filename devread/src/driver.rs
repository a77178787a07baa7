//! The block size sweep.
//!
//! For every block size, in the configured order, the [`Driver`] marks the
//! timer, reads the target byte count sequentially from the device in
//! blocks of exactly that size, and takes the timing delta. The device cursor
//! persists across block sizes and wraps to the start of the device whenever
//! the next full block would not fit. A block that does not fit even at the
//! start of the device ends its iteration without being read.

use std::{io, time::Instant};

use devread_common::{AlignedBuf, BlockDevice, DeviceSize, CHUNK};
use tracing::{debug, trace, warn};

use crate::{
    config::{ConfigError, DriverConfig},
    error::{Error, ReadShortfall, TimingError},
    latency::{LatencyRecorder, LatencySummary},
    metrics::{MetricsStorage, GLOBAL_STORAGE},
    report::Reporter,
    timing::{Clock, ProcessClock, Rates, TimingDelta, TimingTracker},
};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    /// Reading for the block size at this index.
    Running(usize),
    /// The result for this index has been produced and is being reported.
    Reporting(usize),
    Done,
}

/// Outcome of one block size iteration.
#[derive(Debug)]
pub struct IterationResult {
    /// Position of `block_size` in the sweep.
    pub index: usize,
    pub block_size: usize,
    pub target_size: u64,
    pub bytes_read: u64,
    pub reads: u64,
    pub wraparounds: u64,
    pub timing: Result<TimingDelta, TimingError>,
    pub shortfall: Option<ReadShortfall>,
    pub latency: Option<LatencySummary>,
}

impl IterationResult {
    /// Throughput over the bytes actually transferred, which equals the
    /// target size unless the iteration ended in a shortfall.
    pub fn rates(&self) -> Rates {
        match &self.timing {
            Ok(delta) => Rates::compute(self.bytes_read, delta),
            Err(_) => Rates::Indeterminate,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.shortfall.is_none() && self.bytes_read >= self.target_size
    }
}

pub struct Driver<D, C = ProcessClock> {
    device: D,
    device_size: DeviceSize,
    config: DriverConfig,
    buf: AlignedBuf,
    timer: TimingTracker<C>,
    cursor: u64,
    state: DriverState,
    latencies: Option<LatencyRecorder>,
    metrics: &'static MetricsStorage,
}

impl<D: BlockDevice> Driver<D, ProcessClock> {
    /// Allocates the read buffer; fails before any I/O if that isn't possible.
    pub fn new(device: D, device_size: DeviceSize, config: DriverConfig) -> Result<Self, Error> {
        Self::with_clock(device, device_size, config, ProcessClock::new())
    }

    /// Use a buffer allocated up front, so that a failed allocation can abort
    /// the run before the device is opened.
    pub fn with_buffer(
        device: D,
        device_size: DeviceSize,
        config: DriverConfig,
        buf: AlignedBuf,
    ) -> Result<Self, Error> {
        Self::from_parts(
            device,
            device_size,
            config,
            ProcessClock::new(),
            buf,
            &GLOBAL_STORAGE,
        )
    }
}

impl<D: BlockDevice, C: Clock> Driver<D, C> {
    pub fn with_clock(
        device: D,
        device_size: DeviceSize,
        config: DriverConfig,
        clock: C,
    ) -> Result<Self, Error> {
        Self::with_metrics(device, device_size, config, clock, &GLOBAL_STORAGE)
    }

    pub(crate) fn with_metrics(
        device: D,
        device_size: DeviceSize,
        config: DriverConfig,
        clock: C,
        metrics: &'static MetricsStorage,
    ) -> Result<Self, Error> {
        let buf = AlignedBuf::new(CHUNK)?;
        Self::from_parts(device, device_size, config, clock, buf, metrics)
    }

    pub(crate) fn from_parts(
        device: D,
        device_size: DeviceSize,
        config: DriverConfig,
        clock: C,
        buf: AlignedBuf,
        metrics: &'static MetricsStorage,
    ) -> Result<Self, Error> {
        let largest = config.block_sizes.largest();
        if largest > buf.len() {
            return Err(ConfigError::BlockTooLarge {
                size: largest,
                max: buf.len(),
            }
            .into());
        }
        debug!(
            alignment = buf.alignment(),
            %device_size,
            target = config.target.bytes(),
            block_sizes = config.block_sizes.len(),
            "driver ready"
        );
        let latencies = config.record_latencies.then(LatencyRecorder::new);
        Ok(Driver {
            device,
            device_size,
            config,
            buf,
            timer: TimingTracker::new(clock),
            cursor: 0,
            state: DriverState::Idle,
            latencies,
            metrics,
        })
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Block size the next call to [`Self::next_iteration`] will measure.
    pub fn upcoming_block_size(&self) -> Option<usize> {
        match self.state {
            DriverState::Idle => self.config.block_sizes.get(0),
            DriverState::Running(i) | DriverState::Reporting(i) => {
                self.config.block_sizes.get(i + 1)
            }
            DriverState::Done => None,
        }
    }

    /// Measure the next block size. Returns `None` once the sweep is done.
    pub fn next_iteration(&mut self) -> Option<IterationResult> {
        let index = match self.state {
            DriverState::Idle => 0,
            DriverState::Running(i) | DriverState::Reporting(i) => i + 1,
            DriverState::Done => return None,
        };
        let Some(block_size) = self.config.block_sizes.get(index) else {
            debug!("sweep done");
            self.state = DriverState::Done;
            return None;
        };
        self.state = DriverState::Running(index);
        let result = self.iteration(index, block_size);
        self.state = DriverState::Reporting(index);
        Some(result)
    }

    /// Run the whole sweep, handing each result to `reporter` as soon as it is available.
    pub fn run<R: Reporter + ?Sized>(&mut self, reporter: &mut R) -> Result<usize, Error> {
        let mut iterations = 0;
        while let Some(result) = self.next_iteration() {
            reporter.report(&result)?;
            iterations += 1;
        }
        Ok(iterations)
    }

    fn iteration(&mut self, index: usize, block_size: usize) -> IterationResult {
        let target_size = self.config.target.bytes();
        let block = block_size as u64;
        let mut bytes_read = 0u64;
        let mut reads = 0u64;
        let mut wraparounds = 0u64;
        let mut shortfall = None;
        if let Some(latencies) = &mut self.latencies {
            latencies.clear();
        }

        let mark = self.timer.mark();
        let buf = self.buf.prefix_mut(block_size);
        while bytes_read < target_size {
            if !self.device_size.fits(self.cursor, block) {
                if !self.device_size.fits(0, block) {
                    shortfall = Some(ReadShortfall {
                        requested: block_size,
                        actual: 0,
                        offset: self.cursor,
                        source: Some(io::Error::new(
                            io::ErrorKind::InvalidInput,
                            "block exceeds device size",
                        )),
                    });
                    break;
                }
                trace!(block_size, cursor = self.cursor, "wrapping to device start");
                self.cursor = 0;
                wraparounds += 1;
            }

            let started = self.latencies.as_ref().map(|_| Instant::now());
            let res = self.device.read_block(self.cursor, buf);
            if matches!(&res, Err(e) if e.kind() == io::ErrorKind::Interrupted) {
                continue;
            }
            if let (Some(latencies), Some(started)) = (&mut self.latencies, started) {
                latencies.record(started.elapsed());
            }
            reads += 1;

            match res {
                Ok(n) if n == block_size => {
                    bytes_read += block;
                    self.cursor += block;
                }
                Ok(actual) => {
                    shortfall = Some(ReadShortfall {
                        requested: block_size,
                        actual,
                        offset: self.cursor,
                        source: None,
                    });
                    break;
                }
                Err(e) => {
                    shortfall = Some(ReadShortfall {
                        requested: block_size,
                        actual: 0,
                        offset: self.cursor,
                        source: Some(e),
                    });
                    break;
                }
            }
        }
        let timing = mark.and_then(|mark| self.timer.delta(&mark));

        if let Some(shortfall) = &shortfall {
            match &shortfall.source {
                Some(source) => {
                    warn!(
                        block_size,
                        %shortfall,
                        error = %source,
                        "read failed, ending iteration early"
                    )
                }
                None => warn!(block_size, %shortfall, "short read, ending iteration early"),
            }
        }
        if let Err(e) = &timing {
            warn!(block_size, error = %e, "cannot time iteration");
        }
        self.metrics.record_iteration(
            reads,
            bytes_read,
            wraparounds,
            shortfall.is_some(),
            timing.is_err(),
        );
        debug!(
            block_size,
            bytes_read,
            reads,
            wraparounds,
            cursor = self.cursor,
            "iteration finished"
        );

        IterationResult {
            index,
            block_size,
            target_size,
            bytes_read,
            reads,
            wraparounds,
            timing,
            shortfall,
            latency: self.latencies.as_ref().and_then(LatencyRecorder::summary),
        }
    }
}
