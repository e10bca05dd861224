use num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::fmt;
use std::sync::Arc;

/// Forward FFT of a fixed size, computed in place
pub trait FftKernel {
    fn size(&self) -> usize;

    /// Transform exactly `size()` samples in place, unnormalized
    fn process(&mut self, buffer: &mut [Complex32]);
}

/// rustfft forward plan with a reusable scratch buffer.
///
/// Planning happens once at construction; the plan is released on drop.
pub struct RustFftKernel {
    fft: Arc<dyn Fft<f32>>,
    size: usize,
    scratch: Vec<Complex32>,
}

impl fmt::Debug for RustFftKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RustFftKernel")
            .field("size", &self.size)
            .finish()
    }
}

impl RustFftKernel {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let scratch_len = fft.get_inplace_scratch_len();
        Self {
            fft,
            size,
            scratch: vec![Complex32::new(0.0, 0.0); scratch_len],
        }
    }
}

impl FftKernel for RustFftKernel {
    fn size(&self) -> usize {
        self.size
    }

    fn process(&mut self, buffer: &mut [Complex32]) {
        assert_eq!(
            buffer.len(),
            self.size,
            "buffer length {} != FFT size {}",
            buffer.len(),
            self.size
        );
        self.fft.process_with_scratch(buffer, &mut self.scratch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fft_dc() {
        let size = 64;
        let mut fft = RustFftKernel::new(size);

        let mut input = vec![Complex32::new(1.0, 0.0); size];
        fft.process(&mut input);

        // Unnormalized: DC bin holds the sum of the inputs
        assert!((input[0].norm() - size as f32).abs() < 0.01);
        for &val in &input[1..] {
            assert!(val.norm() < 0.01, "non-zero energy in non-DC bin: {}", val.norm());
        }
    }

    #[test]
    fn test_fft_positive_tone_lands_in_positive_bin() {
        let size = 64;
        let bin = 5;
        let mut fft = RustFftKernel::new(size);

        let mut input: Vec<Complex32> = (0..size)
            .map(|n| {
                let phase = 2.0 * std::f32::consts::PI * bin as f32 * n as f32 / size as f32;
                Complex32::new(phase.cos(), phase.sin())
            })
            .collect();
        fft.process(&mut input);

        let peak = input
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.norm().total_cmp(&b.1.norm()))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(bin));
    }

    #[test]
    #[should_panic(expected = "buffer length")]
    fn test_wrong_length_panics() {
        let mut fft = RustFftKernel::new(8);
        let mut input = vec![Complex32::new(0.0, 0.0); 4];
        fft.process(&mut input);
    }
}
