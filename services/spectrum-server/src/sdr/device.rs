//! Capture device abstraction and RTL-SDR device enumeration

use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::{debug, warn};

/// Device layer errors
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no supported devices found")]
    NoDevices,

    #[error("device #{index} not found ({count} device(s) attached)")]
    NotFound { index: u32, count: usize },

    #[error("failed to {action}: {source}")]
    Io {
        action: &'static str,
        #[source]
        source: io::Error,
    },
}

impl DeviceError {
    pub fn io(action: &'static str, source: io::Error) -> Self {
        Self::Io { action, source }
    }
}

/// A raw IQ sample source with rtl-sdr style controls.
///
/// Implementations release the underlying hardware handle when dropped.
pub trait SdrDevice {
    fn set_sample_rate(&mut self, hz: u32) -> Result<(), DeviceError>;

    fn set_center_freq(&mut self, hz: u32) -> Result<(), DeviceError>;

    fn set_auto_gain(&mut self) -> Result<(), DeviceError>;

    /// Fixed tuner gain in dB
    fn set_manual_gain(&mut self, gain_db: f32) -> Result<(), DeviceError>;

    /// Drop any samples buffered between the tuner and the reader
    fn reset_buffers(&mut self) -> Result<(), DeviceError>;

    /// Blocking read of up to `buf.len()` bytes of interleaved 8-bit I/Q.
    /// Returns the number of bytes actually read.
    fn read_sync(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError>;
}

/// An attached RTL-SDR dongle as reported by the device listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub index: u32,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial: Option<String>,
}

impl DeviceInfo {
    /// Human-readable name, e.g. "Realtek RTL2838UHIDIR"
    pub fn label(&self) -> String {
        match (&self.manufacturer, &self.product) {
            (Some(m), Some(p)) => format!("{} {}", m, p),
            (Some(m), None) => m.clone(),
            (None, Some(p)) => p.clone(),
            (None, None) => "Generic RTL2832U".to_string(),
        }
    }
}

/// Enumerate attached devices by running the rtl_sdr tool briefly and
/// parsing the listing it prints on stderr.
pub fn enumerate(rtl_sdr_path: &Path) -> Result<Vec<DeviceInfo>, DeviceError> {
    let output = Command::new(rtl_sdr_path)
        .arg("-n")
        .arg("1")
        .arg("-")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| DeviceError::io("run rtl_sdr for device enumeration", e))?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    debug!("rtl_sdr listing:\n{}", stderr.trim_end());

    let devices = parse_device_listing(&stderr);
    if devices.is_empty() && !output.status.success() {
        warn!("rtl_sdr exited with {} while enumerating", output.status);
    }
    Ok(devices)
}

/// Parse device lines of the form `  0:  Realtek, RTL2838UHIDIR, SN: 00000001`
pub fn parse_device_listing(text: &str) -> Vec<DeviceInfo> {
    let mut devices = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        let Some((index, info)) = trimmed.split_once(':') else {
            continue;
        };
        let Ok(index) = index.trim().parse::<u32>() else {
            continue;
        };

        let fields: Vec<&str> = info.split(',').collect();
        let manufacturer = fields.first().map(|f| sanitize_string(f)).filter(|s| !s.is_empty());
        let product = fields.get(1).map(|f| sanitize_string(f)).filter(|s| !s.is_empty());
        let serial = fields
            .get(2)
            .and_then(|f| f.trim().strip_prefix("SN:"))
            .map(sanitize_string)
            .filter(|s| !s.is_empty());

        devices.push(DeviceInfo {
            index,
            manufacturer,
            product,
            serial,
        });
    }

    devices
}

/// Sanitize a string to only contain printable ASCII characters
fn sanitize_string(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "Found 2 device(s):
  0:  Realtek, RTL2838UHIDIR, SN: 00000001
  1:  NooElec, NESDR SMArt v5, SN: 30211447

Using device 0: Generic RTL2832U OEM
Found Rafael Micro R820T tuner
";

    #[test]
    fn test_parse_device_listing() {
        let devices = parse_device_listing(LISTING);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].index, 0);
        assert_eq!(devices[0].manufacturer.as_deref(), Some("Realtek"));
        assert_eq!(devices[0].product.as_deref(), Some("RTL2838UHIDIR"));
        assert_eq!(devices[0].serial.as_deref(), Some("00000001"));
        assert_eq!(devices[1].label(), "NooElec NESDR SMArt v5");
    }

    #[test]
    fn test_parse_no_devices() {
        assert!(parse_device_listing("No supported devices found.\n").is_empty());
    }

    #[test]
    fn test_sanitize_strips_control_characters() {
        let devices = parse_device_listing("  0:  Realtek\u{1}, RTL\u{7f}2838, SN: \u{2}\n");
        assert_eq!(devices[0].manufacturer.as_deref(), Some("Realtek"));
        assert_eq!(devices[0].product.as_deref(), Some("RTL2838"));
        assert_eq!(devices[0].serial, None);
    }
}
