//! RTL-SDR capture
//!
//! - `device`: the `SdrDevice` seam and device enumeration
//! - `rtl_sdr`: driver backed by an rtl_sdr child process
//! - `capture`: fixed-size block acquisition and retuning

mod capture;
mod device;
mod rtl_sdr;

pub use capture::{CaptureError, CaptureSource, SdrConfig};
pub use device::{DeviceError, SdrDevice};
pub use rtl_sdr::RtlSdrProcess;
