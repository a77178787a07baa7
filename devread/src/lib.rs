//! Measure sequential read throughput of a block device across a descending
//! sweep of block sizes.
//!
//! # Usage
//!
//! 1. Open the device and wrap it in a [`devread_common::BlockDevice`]
//!    ([`Positional`] or [`Sequential`]).
//! 2. Build a [`DriverConfig`] from a [`TargetSize`] and, optionally, a
//!    custom [`BlockSizeList`].
//! 3. Create a [`Driver`] and either call [`Driver::run`] with a [`Reporter`],
//!    or step through [`Driver::next_iteration`] yourself.
//!
//! ```no_run
//! use devread::{Driver, DriverConfig, LineReporter, TargetSize};
//! use devread_common::{device::probe_size, open_device, CacheMode, Positional};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut file = open_device("/dev/sda".as_ref(), CacheMode::Cached)?;
//! let size = probe_size(&mut file)?;
//! let config = DriverConfig::new(TargetSize::from_mib(100)?);
//! let mut driver = Driver::new(Positional::new(file), size, config)?;
//! driver.run(&mut LineReporter::stderr())?;
//! # Ok(())
//! # }
//! ```
//!
//! Every block size yields exactly one [`IterationResult`]. Failed reads end
//! only the iteration they happen in ([`ReadShortfall`]); a broken clock
//! reading yields an indeterminate rate ([`TimingError`]). Only failing to
//! allocate the read buffer stops the sweep before it begins.
//!
//! [`Positional`]: devread_common::Positional
//! [`Sequential`]: devread_common::Sequential

pub mod config;
pub mod driver;
mod error;
pub mod latency;
pub mod metrics;
pub mod report;
pub mod timing;

#[cfg(test)]
mod test_util;

pub use config::{BlockSizeList, ConfigError, DriverConfig, TargetSize, DEFAULT_BLOCK_SIZES};
pub use driver::{Driver, DriverState, IterationResult};
pub use error::{Error, ReadShortfall, TimingError};
pub use report::{Collector, LineReporter, Reporter, ResultRecord};
pub use timing::{Clock, ProcessClock, Rates, TimingDelta, TimingSnapshot, TimingTracker};
