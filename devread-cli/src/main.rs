use std::{path::PathBuf, str::FromStr, time::Duration};

use anyhow::Context;
use clap::Parser;
use devread::{
    BlockSizeList, Collector, Driver, DriverConfig, LineReporter, Reporter, ResultRecord,
    TargetSize,
};
use devread_common::{
    device::probe_size, open_device, AlignedBuf, BlockDevice, CacheMode, DeviceSize, Positional,
    Sequential, CHUNK,
};
use nix::unistd::{sysconf, SysconfVar};
use tracing::{info, warn};

#[derive(Debug, serde::Serialize, clap::Parser, Clone)]
#[clap(
    version,
    about = "Measure sequential read throughput of a block device across block sizes"
)]
struct Args {
    /// Block device, or a file standing in for one.
    device: PathBuf,
    /// MiB to read for every block size.
    #[clap(
        short = 's',
        long,
        default_value_t = 100,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    size_mib: u64,
    /// sync() before every block size.
    #[clap(short = 'y', long)]
    fsync: bool,
    /// Open the device with O_DIRECT, bypassing the page cache.
    #[clap(long)]
    direct_io: bool,
    #[clap(long, value_enum, default_value = "positional")]
    read_mode: ReadMode,
    /// `probe`, `unbounded`, or a byte count (suffixes k, m, g).
    #[clap(long, default_value = "probe")]
    device_size: DeviceSizeArg,
    /// Comma separated, strictly descending. Defaults to 1MiB down to 1 byte.
    #[clap(long, value_delimiter = ',')]
    block_sizes: Option<Vec<usize>>,
    /// Record per-read latencies.
    #[clap(long)]
    latency_histogram: bool,
    /// Write a JSON summary of all results to this path.
    #[clap(long)]
    output_json: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum, serde::Serialize)]
enum ReadMode {
    /// pread(2) at the benchmark's own cursor.
    Positional,
    /// read(2), seeking back to the start on wraparound.
    Sequential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
enum DeviceSizeArg {
    Probe,
    Unbounded,
    Bytes(u64),
}

impl FromStr for DeviceSizeArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "probe" => Ok(DeviceSizeArg::Probe),
            "unbounded" => Ok(DeviceSizeArg::Unbounded),
            x => {
                let (digits, multiplier) = match x.char_indices().last() {
                    Some((i, 'k' | 'K')) => (&x[..i], 1 << 10),
                    Some((i, 'm' | 'M')) => (&x[..i], 1 << 20),
                    Some((i, 'g' | 'G')) => (&x[..i], 1 << 30),
                    _ => (x, 1),
                };
                match digits.parse::<u64>() {
                    Ok(0) => Err(format!("device size must be positive: {s:?}")),
                    Ok(n) => n
                        .checked_mul(multiplier)
                        .map(DeviceSizeArg::Bytes)
                        .ok_or_else(|| format!("device size overflows: {s:?}")),
                    Err(e) => Err(format!("invalid device size: {e}: {s:?}")),
                }
            }
        }
    }
}

#[derive(serde::Serialize)]
struct BenchmarkOutput<'a> {
    args: &'a Args,
    device_size: Option<u64>,
    metrics: devread::metrics::Metrics,
    results: &'a [ResultRecord],
}

/// Time given to the kernel to write back dirty pages before the sweep.
const SETTLE_TIME: Duration = Duration::from_secs(1);

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_file(true)
        .with_line_number(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let target = TargetSize::from_mib(args.size_mib).context("invalid transfer size")?;
    let block_sizes = match &args.block_sizes {
        Some(sizes) => BlockSizeList::new(sizes.clone()).context("invalid --block-sizes")?,
        None => BlockSizeList::default(),
    };
    let buf = AlignedBuf::new(CHUNK).context("unable to allocate read buffer")?;
    warn_if_cacheable(target, args.fsync);

    nix::unistd::sync();
    std::thread::sleep(SETTLE_TIME);
    nix::unistd::sync();

    let cache_mode = if args.direct_io {
        CacheMode::Direct
    } else {
        CacheMode::Cached
    };
    let mut file = open_device(&args.device, cache_mode)
        .with_context(|| format!("unable to open {:?}", args.device))?;
    let device_size = match args.device_size {
        DeviceSizeArg::Probe => probe_size(&mut file).context("unable to probe device size")?,
        DeviceSizeArg::Unbounded => DeviceSize::Unbounded,
        DeviceSizeArg::Bytes(n) => DeviceSize::Known(n),
    };
    let device: Box<dyn BlockDevice> = match args.read_mode {
        ReadMode::Positional => Box::new(Positional::new(file)),
        ReadMode::Sequential => {
            Box::new(Sequential::new(file).context("unable to rewind device")?)
        }
    };

    let config = DriverConfig {
        block_sizes,
        target,
        record_latencies: args.latency_histogram,
    };
    info!(
        device = ?args.device,
        %device_size,
        target = target.bytes(),
        ?cache_mode,
        read_mode = ?args.read_mode,
        "starting sweep"
    );
    let mut driver = Driver::with_buffer(device, device_size, config, buf)
        .context("unable to set up benchmark")?;

    let mut lines = LineReporter::stderr();
    let mut collector = Collector::new();
    let mut reporters = (&mut lines, &mut collector);
    reporters.begin(&args.device.display().to_string(), device_size)?;
    while let Some(block_size) = driver.upcoming_block_size() {
        if args.fsync {
            tracing::debug!(block_size, "sync before phase");
            nix::unistd::sync();
        }
        let Some(result) = driver.next_iteration() else {
            break;
        };
        reporters.report(&result).context("unable to write report")?;
    }

    let metrics = devread::metrics::global();
    info!(?metrics, "sweep done");

    if let Some(outpath) = &args.output_json {
        let output = BenchmarkOutput {
            args: &args,
            device_size: device_size.known(),
            metrics,
            results: collector.records(),
        };
        info!("writing results to {:?}", outpath);
        let file = std::fs::File::create(outpath)
            .with_context(|| format!("unable to create {outpath:?}"))?;
        serde_json::to_writer_pretty(file, &output).context("unable to write JSON output")?;
    }

    Ok(())
}

/// Warn when the whole transfer could be served from the page cache.
fn warn_if_cacheable(target: TargetSize, fsync: bool) {
    let pages = match sysconf(SysconfVar::_PHYS_PAGES) {
        Ok(Some(pages)) if pages > 0 => pages,
        _ => return,
    };
    let memory = pages as u64 * devread_common::buf::page_size() as u64;
    if target.bytes() <= memory {
        warn!(
            ram_mib = memory / (1024 * 1024),
            target_mib = target.bytes() / (1024 * 1024),
            "testing with less data than RAM; \
             this might yield unrealistically good results for reading{}",
            if fsync { "" } else { " and writing" }
        );
    }
}
