//! Configuration loaded from environment variables

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::control::DEFAULT_CAPACITY;
use crate::spectrum::DEFAULT_DYNAMIC_RANGE_DB;

/// What to do when a sample block cannot be acquired mid-session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionFailurePolicy {
    /// Release everything and exit the process with a non-zero status
    ExitProcess,
    /// End the session, reset the device buffers and accept the next client
    EndSession,
}

impl FromStr for AcquisitionFailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exit-process" | "exit" => Ok(Self::ExitProcess),
            "end-session" | "session" => Ok(Self::EndSession),
            other => Err(ConfigError::Invalid {
                key: "ACQUISITION_FAILURE_POLICY",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("FFT_SIZE must be a non-zero even number, got {0}")]
    FftSize(usize),

    #[error("COMMAND_BUFFER_CAPACITY must be at least 1")]
    CommandCapacity,

    #[error("FRAME_INTERVAL_MS must be at least 1")]
    FrameInterval,

    #[error("DYNAMIC_RANGE_DB must be positive")]
    DynamicRange,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the spectrum listener binds to
    pub listen_addr: SocketAddr,

    /// RTL-SDR device index
    pub device_index: u32,

    /// Initial center frequency in Hz
    pub center_freq: u32,

    /// Sample rate in samples per second
    pub sample_rate: u32,

    /// Tuner gain in dB (None for automatic gain)
    pub gain_db: Option<f32>,

    /// PPM frequency correction
    pub ppm_error: i32,

    /// Number of FFT bins per frame
    pub fft_size: usize,

    /// Span in dB mapped onto the 0..=255 output scale
    pub dynamic_range_db: f32,

    /// Interval between frames
    pub frame_interval: Duration,

    /// Maximum length of a pending retune command
    pub command_capacity: usize,

    pub acquisition_failure: AcquisitionFailurePolicy,

    /// Path to rtl_sdr executable
    pub rtl_sdr_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 12345)),
            device_index: 0,
            center_freq: 99_400_000,
            sample_rate: 2_000_000,
            gain_db: None,
            ppm_error: 0,
            fft_size: 1024,
            dynamic_range_db: DEFAULT_DYNAMIC_RANGE_DB,
            frame_interval: Duration::from_millis(500),
            command_capacity: DEFAULT_CAPACITY,
            acquisition_failure: AcquisitionFailurePolicy::ExitProcess,
            rtl_sdr_path: PathBuf::from("rtl_sdr"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            listen_addr: parse_or(&lookup, "LISTEN_ADDR", defaults.listen_addr)?,
            device_index: parse_or(&lookup, "DEVICE_INDEX", defaults.device_index)?,
            center_freq: parse_or(&lookup, "CENTER_FREQ", defaults.center_freq)?,
            sample_rate: parse_or(&lookup, "SAMPLE_RATE", defaults.sample_rate)?,
            gain_db: match lookup("DEVICE_GAIN") {
                // "auto" and 0 both select automatic gain, like rtl_sdr -g 0
                Some(v) if v.trim().eq_ignore_ascii_case("auto") => None,
                Some(v) => {
                    let gain: f32 = parse_value("DEVICE_GAIN", &v)?;
                    (gain != 0.0).then_some(gain)
                }
                None => defaults.gain_db,
            },
            ppm_error: parse_or(&lookup, "PPM_ERROR", defaults.ppm_error)?,
            fft_size: parse_or(&lookup, "FFT_SIZE", defaults.fft_size)?,
            dynamic_range_db: parse_or(&lookup, "DYNAMIC_RANGE_DB", defaults.dynamic_range_db)?,
            frame_interval: Duration::from_millis(parse_or(
                &lookup,
                "FRAME_INTERVAL_MS",
                defaults.frame_interval.as_millis() as u64,
            )?),
            command_capacity: parse_or(
                &lookup,
                "COMMAND_BUFFER_CAPACITY",
                defaults.command_capacity,
            )?,
            acquisition_failure: parse_or(
                &lookup,
                "ACQUISITION_FAILURE_POLICY",
                defaults.acquisition_failure,
            )?,
            rtl_sdr_path: lookup("RTL_SDR_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.rtl_sdr_path),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fft_size == 0 || self.fft_size % 2 != 0 {
            return Err(ConfigError::FftSize(self.fft_size));
        }
        if self.command_capacity == 0 {
            return Err(ConfigError::CommandCapacity);
        }
        if self.frame_interval.is_zero() {
            return Err(ConfigError::FrameInterval);
        }
        if !(self.dynamic_range_db > 0.0) {
            return Err(ConfigError::DynamicRange);
        }
        Ok(())
    }

    /// Bytes per sample block (interleaved I/Q)
    pub fn block_len(&self) -> usize {
        self.fft_size * 2
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(v) => parse_value(key, &v),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}
