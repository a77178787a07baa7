use std::{fs::File, io, path::Path};

/// Whether reads go through the page cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    Cached,
    /// `O_DIRECT`: buffers, offsets and lengths must be suitably aligned.
    Direct,
}

/// Open `path` read-only for benchmarking.
pub fn open_device(path: &Path, cache_mode: CacheMode) -> io::Result<File> {
    let mut options = std::fs::OpenOptions::new();
    options.read(true);
    match cache_mode {
        CacheMode::Cached => {}
        #[cfg(target_os = "linux")]
        CacheMode::Direct => {
            use std::os::unix::prelude::OpenOptionsExt;
            options.custom_flags(libc::O_DIRECT);
        }
        #[cfg(not(target_os = "linux"))]
        CacheMode::Direct => {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "direct I/O is only supported on Linux",
            ));
        }
    }
    options.open(path)
}
