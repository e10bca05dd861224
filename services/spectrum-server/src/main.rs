//! Spectrum Server - RTL-SDR FFT streaming over TCP
//!
//! Captures raw IQ blocks from an RTL-SDR dongle, turns each block into a
//! byte-scaled power spectrum and streams the frames to one TCP client at a
//! time. Clients retune the receiver in-band over the same connection.

mod config;
mod control;
mod sdr;
mod session;
mod shutdown;
mod spectrum;
#[cfg(test)]
mod testing;
mod transport;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use config::Config;
use sdr::{CaptureSource, RtlSdrProcess, SdrConfig};
use session::{SessionManager, SessionSettings, StreamContext};
use spectrum::SpectralTransform;
use transport::TcpAcceptor;

fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("===========================================");
    info!("   Spectrum Server - RTL-SDR FFT stream");
    info!("===========================================");

    let config = Config::from_env().context("Invalid configuration")?;

    info!("Configuration:");
    info!("  Listen address: {}", config.listen_addr);
    info!("  Device index: {}", config.device_index);
    info!("  Center frequency: {} Hz", config.center_freq);
    info!("  Sample rate: {} S/s", config.sample_rate);
    match config.gain_db {
        Some(gain) => info!("  Gain: {} dB", gain),
        None => info!("  Gain: auto"),
    }
    info!("  PPM error: {}", config.ppm_error);
    info!("  FFT size: {} bins", config.fft_size);
    info!("  Dynamic range: {} dB", config.dynamic_range_db);
    info!("  Frame interval: {:?}", config.frame_interval);
    info!("  Acquisition failure: {:?}", config.acquisition_failure);
    info!("  rtl_sdr path: {:?}", config.rtl_sdr_path);

    let opened = RtlSdrProcess::open(&config.rtl_sdr_path, config.device_index, config.ppm_error);
    let device = match opened {
        Ok(device) => device,
        Err(e) => {
            error!("Failed to open RTL-SDR device #{}: {}", config.device_index, e);
            error!("Make sure the RTL-SDR device is connected and rtl_sdr is installed.");
            return Err(e.into());
        }
    };

    let sdr_config = SdrConfig {
        center_freq: config.center_freq,
        sample_rate: config.sample_rate,
        gain_db: config.gain_db,
    };
    let capture = CaptureSource::open(device, &sdr_config, config.block_len());
    let transform = SpectralTransform::new(config.fft_size, config.dynamic_range_db)
        .context("Failed to prepare FFT")?;
    let ctx = StreamContext::new(capture, transform)?;

    let listener = TcpAcceptor::bind(config.listen_addr)
        .with_context(|| format!("Failed to listen on {}", config.listen_addr))?;
    info!("Listening on {}", listener.local_addr()?);

    let (trigger, shutdown) = shutdown::channel();
    let _signal_bridge = shutdown::spawn_signal_bridge(trigger)
        .context("Failed to install signal handlers")?;

    info!("===========================================");
    info!("  Serving spectrum frames...");
    info!("  Press Ctrl+C to stop.");
    info!("===========================================");

    let mut manager = SessionManager::new(
        listener,
        ctx,
        SessionSettings::from(&config),
        shutdown,
    );

    let result = manager.run();
    // Releases the device and the listening socket
    drop(manager);

    match result {
        Ok(()) => {
            info!("Shutdown complete.");
            Ok(())
        }
        Err(e) => {
            error!("Exiting after fatal error");
            Err(e.into())
        }
    }
}
