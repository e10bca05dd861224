//! Fixed-size sample block acquisition
//!
//! Wraps an [`SdrDevice`] with the startup tuning sequence and the
//! exact-length read contract the streaming loop depends on.

use thiserror::Error;
use tracing::{info, warn};

use super::device::{DeviceError, SdrDevice};

/// Tuning applied when the capture source is opened
#[derive(Debug, Clone)]
pub struct SdrConfig {
    pub center_freq: u32,
    pub sample_rate: u32,
    /// Tuner gain in dB, None for automatic gain
    pub gain_db: Option<f32>,
}

/// Acquisition failures. Both variants mean the sample stream can no longer
/// be trusted to be contiguous.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("short read ({got} / {expected}), samples lost")]
    ShortRead { got: usize, expected: usize },

    #[error("sync read failed: {0}")]
    DeviceFault(#[from] DeviceError),
}

/// Blocking source of `block_len`-byte IQ blocks
#[derive(Debug)]
pub struct CaptureSource<D> {
    device: D,
    block: Vec<u8>,
    center_freq: u32,
    blocks_acquired: u64,
}

impl<D: SdrDevice> CaptureSource<D> {
    /// Configure the device and allocate the block buffer.
    ///
    /// Individual configuration failures are logged and tolerated; the
    /// device may still stream with its previous settings.
    pub fn open(mut device: D, config: &SdrConfig, block_len: usize) -> Self {
        if let Err(e) = device.set_sample_rate(config.sample_rate) {
            warn!("Failed to set sample rate: {}", e);
        }

        if let Err(e) = device.set_center_freq(config.center_freq) {
            warn!("Failed to set center freq: {}", e);
        }

        let gain = match config.gain_db {
            Some(db) => device.set_manual_gain(db),
            None => device.set_auto_gain(),
        };
        if let Err(e) = gain {
            warn!("Failed to configure tuner gain: {}", e);
        }

        if let Err(e) = device.reset_buffers() {
            warn!("Failed to reset buffers: {}", e);
        }

        info!(
            "Capture ready: {:.3} MHz, {:.2} MSPS, gain {}, {} bytes/block",
            config.center_freq as f64 / 1e6,
            config.sample_rate as f64 / 1e6,
            config
                .gain_db
                .map(|g| format!("{:.1} dB", g))
                .unwrap_or_else(|| "auto".to_string()),
            block_len
        );

        Self {
            device,
            block: vec![0u8; block_len],
            center_freq: config.center_freq,
            blocks_acquired: 0,
        }
    }

    /// Read exactly one block. Anything less is a [`CaptureError`].
    pub fn acquire(&mut self) -> Result<&[u8], CaptureError> {
        let expected = self.block.len();
        let got = self.device.read_sync(&mut self.block)?;
        if got < expected {
            return Err(CaptureError::ShortRead { got, expected });
        }

        self.blocks_acquired += 1;
        Ok(&self.block)
    }

    pub fn retune(&mut self, freq_hz: u32) -> Result<(), DeviceError> {
        self.device.set_center_freq(freq_hz)?;
        self.center_freq = freq_hz;
        Ok(())
    }

    pub fn reset_buffers(&mut self) -> Result<(), DeviceError> {
        self.device.reset_buffers()
    }

    pub fn center_freq(&self) -> u32 {
        self.center_freq
    }

    pub fn block_len(&self) -> usize {
        self.block.len()
    }

    pub fn blocks_acquired(&self) -> u64 {
        self.blocks_acquired
    }
}
