//! Spectral transform
//!
//! Converts each raw IQ block into one frame of byte-scaled power levels:
//! 1. Scale 8-bit unsigned I/Q to complex samples in [0, 1]
//! 2. Forward FFT
//! 3. Center the zero-frequency bin
//! 4. Power → dBFS → 0..=255 over a fixed dynamic range

mod fft;
mod transform;

pub use fft::{FftKernel, RustFftKernel};
pub use transform::{SpectralTransform, DEFAULT_DYNAMIC_RANGE_DB};
