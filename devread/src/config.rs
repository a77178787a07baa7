//! Sweep parameters: which block sizes, and how many bytes per block size.

use std::num::NonZeroU64;

use devread_common::CHUNK;

/// Block sizes swept by default, largest first.
pub const DEFAULT_BLOCK_SIZES: [usize; 16] = [
    1024 * 1024,
    256 * 1024,
    64 * 1024,
    16 * 1024,
    4096,
    2048,
    1024,
    512,
    128,
    64,
    32,
    16,
    8,
    4,
    2,
    1,
];

/// Largest transfer size expressible when `off_t` is 32 bits wide.
pub const MAX_MIB_WITH_32BIT_OFF_T: u64 = 2047;

const MIB: u64 = 1024 * 1024;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("transfer size must be at least {} MiB", CHUNK as u64 / MIB)]
    ZeroTarget,
    #[error("{mib} MiB is too large for a 32-bit off_t (at most {} MiB)", MAX_MIB_WITH_32BIT_OFF_T)]
    TooLargeForOffT { mib: u64 },
    #[error("transfer size of {mib} MiB overflows")]
    TargetOverflow { mib: u64 },
    #[error("block size list is empty")]
    NoBlockSizes,
    #[error("block size must be positive")]
    ZeroBlockSize,
    #[error("block sizes must be strictly descending, got {prev} then {next}")]
    NotDescending { prev: usize, next: usize },
    #[error("block size {size} exceeds the {max} byte read buffer")]
    BlockTooLarge { size: usize, max: usize },
}

/// Ordered, strictly descending list of block sizes in bytes.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct BlockSizeList(Vec<usize>);

impl BlockSizeList {
    pub fn new(sizes: Vec<usize>) -> Result<Self, ConfigError> {
        let Some(&first) = sizes.first() else {
            return Err(ConfigError::NoBlockSizes);
        };
        if first > CHUNK {
            return Err(ConfigError::BlockTooLarge {
                size: first,
                max: CHUNK,
            });
        }
        for pair in sizes.windows(2) {
            if pair[1] >= pair[0] {
                return Err(ConfigError::NotDescending {
                    prev: pair[0],
                    next: pair[1],
                });
            }
        }
        if sizes.last() == Some(&0) {
            return Err(ConfigError::ZeroBlockSize);
        }
        Ok(BlockSizeList(sizes))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<usize> {
        self.0.get(index).copied()
    }

    /// The first and therefore largest block size.
    pub fn largest(&self) -> usize {
        self.0[0]
    }
}

impl Default for BlockSizeList {
    fn default() -> Self {
        BlockSizeList(DEFAULT_BLOCK_SIZES.to_vec())
    }
}

/// Bytes transferred per block size iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct TargetSize(NonZeroU64);

impl TargetSize {
    /// Convert a MiB count to bytes, rounded down to a multiple of [`CHUNK`].
    pub fn from_mib(mib: u64) -> Result<Self, ConfigError> {
        if std::mem::size_of::<libc::off_t>() <= 4 && mib > MAX_MIB_WITH_32BIT_OFF_T {
            return Err(ConfigError::TooLargeForOffT { mib });
        }
        let bytes = mib
            .checked_mul(MIB)
            .ok_or(ConfigError::TargetOverflow { mib })?;
        Self::from_bytes(bytes)
    }

    /// `bytes` rounded down to a multiple of [`CHUNK`].
    pub fn from_bytes(bytes: u64) -> Result<Self, ConfigError> {
        let chunk = CHUNK as u64;
        NonZeroU64::new(chunk * (bytes / chunk))
            .map(TargetSize)
            .ok_or(ConfigError::ZeroTarget)
    }

    /// An exact byte count with no chunk rounding.
    pub fn exact(bytes: NonZeroU64) -> Self {
        TargetSize(bytes)
    }

    pub fn bytes(&self) -> u64 {
        self.0.get()
    }
}

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub block_sizes: BlockSizeList,
    pub target: TargetSize,
    /// Record per-read latencies into a histogram. Adds a clock read per I/O.
    pub record_latencies: bool,
}

impl DriverConfig {
    pub fn new(target: TargetSize) -> Self {
        DriverConfig {
            block_sizes: BlockSizeList::default(),
            target,
            record_latencies: false,
        }
    }
}
