use std::io;

use devread_common::AllocError;

use crate::config::ConfigError;

/// Errors that prevent a sweep from starting or from reporting.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("read buffer: {0}")]
    Alloc(#[from] AllocError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("writing report: {0}")]
    Report(#[from] io::Error),
}

/// A timing measurement that can't be turned into a rate.
#[derive(Debug, thiserror::Error)]
pub enum TimingError {
    #[error("reading process clock: {0}")]
    Clock(#[from] io::Error),
    #[error("wall clock went backwards: elapsed={elapsed:.6}s")]
    NegativeElapsed { elapsed: f64 },
    #[error("process cpu time went backwards: cpu={cpu:.6}s")]
    NegativeCpu { cpu: f64 },
}

/// A read returned fewer bytes than requested.
///
/// Ends the current block size iteration early; the sweep goes on.
#[derive(Debug, thiserror::Error)]
#[error("read error requested={requested} actual={actual} offset={offset}")]
pub struct ReadShortfall {
    pub requested: usize,
    pub actual: usize,
    pub offset: u64,
    #[source]
    pub source: Option<io::Error>,
}
