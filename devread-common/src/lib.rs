//! Low-level pieces shared by the `devread` benchmark: page-aligned buffers,
//! the [`device::BlockDevice`] read abstraction and device opening.

pub mod buf;
pub mod device;
pub mod open_options;

pub use buf::{AlignedBuf, AllocError, CHUNK};
pub use device::{BlockDevice, DeviceSize, Positional, Sequential};
pub use open_options::{open_device, CacheMode};
