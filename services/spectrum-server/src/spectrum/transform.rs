//! IQ block → byte-scaled log-power spectrum
//!
//! 8-bit unsigned I/Q pairs are scaled to [0, 1] (no DC offset removal, so
//! the zero-frequency bin carries the ADC bias), transformed, shifted so
//! the zero-frequency bin sits at N/2, converted to dBFS and mapped from
//! `[-range, 0]` dB onto 0..=255.

use num_complex::Complex32;
use thiserror::Error;

use super::fft::{FftKernel, RustFftKernel};

/// Floor added to bin power so silence maps to a finite dB value
pub const POWER_FLOOR: f32 = 1.0e-20;

/// dBFS span corresponding to the bottom of the output scale
pub const DEFAULT_DYNAMIC_RANGE_DB: f32 = 90.0;

#[derive(Debug, Error, PartialEq)]
pub enum TransformError {
    #[error("FFT size must be a non-zero even number, got {0}")]
    FftSize(usize),

    #[error("dynamic range must be positive, got {0} dB")]
    DynamicRange(f32),
}

/// Reusable spectral transform: scratch and output buffers are allocated
/// once and overwritten on every call.
#[derive(Debug)]
pub struct SpectralTransform<K = RustFftKernel> {
    kernel: K,
    dynamic_range_db: f32,
    samples: Vec<Complex32>,
    frame: Vec<u8>,
}

impl SpectralTransform<RustFftKernel> {
    pub fn new(fft_size: usize, dynamic_range_db: f32) -> Result<Self, TransformError> {
        if fft_size == 0 || fft_size % 2 != 0 {
            return Err(TransformError::FftSize(fft_size));
        }
        Self::with_kernel(RustFftKernel::new(fft_size), dynamic_range_db)
    }
}

impl<K: FftKernel> SpectralTransform<K> {
    pub fn with_kernel(kernel: K, dynamic_range_db: f32) -> Result<Self, TransformError> {
        let size = kernel.size();
        if size == 0 || size % 2 != 0 {
            return Err(TransformError::FftSize(size));
        }
        if !(dynamic_range_db > 0.0) {
            return Err(TransformError::DynamicRange(dynamic_range_db));
        }

        Ok(Self {
            kernel,
            dynamic_range_db,
            samples: vec![Complex32::new(0.0, 0.0); size],
            frame: vec![0u8; size],
        })
    }

    pub fn fft_size(&self) -> usize {
        self.frame.len()
    }

    /// Bytes of IQ consumed per frame
    pub fn block_len(&self) -> usize {
        self.frame.len() * 2
    }

    /// Turn one IQ block of exactly `block_len()` bytes into a frame of
    /// `fft_size()` bytes.
    pub fn transform(&mut self, block: &[u8]) -> &[u8] {
        assert_eq!(
            block.len(),
            self.block_len(),
            "IQ block length {} != 2 x FFT size {}",
            block.len(),
            self.fft_size()
        );

        load_samples(block, &mut self.samples);
        self.kernel.process(&mut self.samples);

        let n = self.samples.len();
        let scale = 1.0 / n as f32;
        for (i, out) in self.frame.iter_mut().enumerate() {
            let pt = self.samples[centered_source(i, n)] * scale;
            *out = power_to_level(pt.norm_sqr(), self.dynamic_range_db);
        }

        &self.frame
    }
}

/// Map interleaved unsigned I/Q bytes to complex samples in [0, 1]
fn load_samples(block: &[u8], samples: &mut [Complex32]) {
    for (sample, iq) in samples.iter_mut().zip(block.chunks_exact(2)) {
        *sample = Complex32::new(iq[0] as f32 / 255.0, iq[1] as f32 / 255.0);
    }
}

/// FFT bin feeding output bin `i`, putting the zero-frequency bin at `n / 2`
pub fn centered_source(i: usize, n: usize) -> usize {
    let half = n / 2;
    if i < half {
        half + i
    } else {
        i - half
    }
}

/// Convert linear bin power (1.0 = full scale) to an output byte.
///
/// Values are truncated, not rounded; anything at or above 0 dBFS is 255.
pub fn power_to_level(power: f32, dynamic_range_db: f32) -> u8 {
    let db = 10.0 * (power + POWER_FLOOR).log10() + dynamic_range_db;
    let level = db.max(0.0) / dynamic_range_db * 255.0;
    level.min(255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Kernel that ignores its input and emits a fixed spectrum
    struct FixedSpectrum(Vec<Complex32>);

    impl FftKernel for FixedSpectrum {
        fn size(&self) -> usize {
            self.0.len()
        }

        fn process(&mut self, buffer: &mut [Complex32]) {
            buffer.copy_from_slice(&self.0);
        }
    }

    fn spectrum_with_energy_at(bin: usize, n: usize) -> SpectralTransform<FixedSpectrum> {
        let mut bins = vec![Complex32::new(0.0, 0.0); n];
        // After the 1/N scaling this bin sits exactly at 0 dBFS
        bins[bin] = Complex32::new(n as f32, 0.0);
        SpectralTransform::with_kernel(FixedSpectrum(bins), DEFAULT_DYNAMIC_RANGE_DB).unwrap()
    }

    #[test]
    fn test_frame_length_matches_fft_size() {
        let mut transform = SpectralTransform::new(1024, DEFAULT_DYNAMIC_RANGE_DB).unwrap();
        let block: Vec<u8> = (0..2048u32).map(|i| (i * 37 % 251) as u8).collect();
        assert_eq!(transform.transform(&block).len(), 1024);
    }

    #[test]
    fn test_deterministic() {
        let mut transform = SpectralTransform::new(256, DEFAULT_DYNAMIC_RANGE_DB).unwrap();
        let block: Vec<u8> = (0..512u32).map(|i| (i * 91 % 256) as u8).collect();
        let first = transform.transform(&block).to_vec();
        let second = transform.transform(&block).to_vec();
        assert_eq!(first, second);
    }

    #[test]
    fn test_all_zero_block_floors_at_zero() {
        let mut transform = SpectralTransform::new(4, DEFAULT_DYNAMIC_RANGE_DB).unwrap();
        assert_eq!(transform.transform(&[0u8; 8]), &[0u8, 0, 0, 0]);
    }

    #[test]
    fn test_saturating_block_clamps_at_255() {
        // Every sample is 1+1j: the DC bin reaches +3 dBFS
        let mut transform = SpectralTransform::new(4, DEFAULT_DYNAMIC_RANGE_DB).unwrap();
        assert_eq!(transform.transform(&[255u8; 8]), &[0u8, 0, 255, 0]);
    }

    #[test]
    fn test_centering_shift() {
        assert_eq!(centered_source(2, 4), 0);
        assert_eq!(centered_source(0, 4), 2);
        assert_eq!(centered_source(1, 4), 3);
        assert_eq!(centered_source(3, 4), 1);

        let mut dc = spectrum_with_energy_at(0, 4);
        assert_eq!(dc.transform(&[0u8; 8]), &[0u8, 0, 255, 0]);

        let mut nyquist = spectrum_with_energy_at(2, 4);
        assert_eq!(nyquist.transform(&[0u8; 8]), &[255u8, 0, 0, 0]);
    }

    #[test]
    fn test_power_to_level_truncates() {
        // -6.02 dBFS -> 237.94
        assert_eq!(power_to_level(0.25, 90.0), 237);
        // -45 dBFS -> 127.5
        assert_eq!(power_to_level(10f32.powf(-4.5), 90.0), 127);
        assert_eq!(power_to_level(1.0, 90.0), 255);
        assert_eq!(power_to_level(1.0e-9, 90.0), 0);
        assert_eq!(power_to_level(0.0, 90.0), 0);
        assert_eq!(power_to_level(4.0, 90.0), 255);
    }

    #[test]
    fn test_samples_scaled_to_unit_range() {
        let mut samples = vec![Complex32::new(9.0, 9.0); 2];
        load_samples(&[255, 0, 0, 255], &mut samples);
        assert_eq!(samples, vec![Complex32::new(1.0, 0.0), Complex32::new(0.0, 1.0)]);
    }

    #[test]
    fn test_rejects_invalid_sizes() {
        assert_eq!(
            SpectralTransform::new(0, 90.0).unwrap_err(),
            TransformError::FftSize(0)
        );
        assert_eq!(
            SpectralTransform::new(7, 90.0).unwrap_err(),
            TransformError::FftSize(7)
        );
        assert_eq!(
            SpectralTransform::new(8, 0.0).unwrap_err(),
            TransformError::DynamicRange(0.0)
        );
    }

    #[test]
    #[should_panic(expected = "IQ block length")]
    fn test_wrong_block_length_panics() {
        let mut transform = SpectralTransform::new(4, 90.0).unwrap();
        transform.transform(&[0u8; 6]);
    }
}
