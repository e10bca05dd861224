//! Streaming loop for one client
//!
//! Each iteration: drain control bytes (non-blocking) → apply retunes →
//! acquire a block (blocking) → transform → write the frame (blocking) →
//! wait for the next pacing tick. A retune drained at the top of an
//! iteration therefore applies to that iteration's block and later ones,
//! never to a block already captured.

use std::fmt;
use std::io::{self, Write};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::control::{ControlChannel, Drained};
use crate::sdr::{CaptureError, CaptureSource, SdrDevice};
use crate::shutdown::Shutdown;
use crate::spectrum::{FftKernel, RustFftKernel, SpectralTransform};

use crate::transport::Transport;

use super::manager::SessionSettings;
use super::pacer::{Pace, Pacer};
use super::state::SessionStats;

#[derive(Debug, Error)]
#[error("capture block is {block_len} bytes but the transform needs {needed}")]
pub struct ContextError {
    pub block_len: usize,
    pub needed: usize,
}

/// Capture and transform state shared by consecutive sessions
#[derive(Debug)]
pub struct StreamContext<D, K = RustFftKernel> {
    pub capture: CaptureSource<D>,
    pub transform: SpectralTransform<K>,
}

impl<D: SdrDevice, K: FftKernel> StreamContext<D, K> {
    pub fn new(
        capture: CaptureSource<D>,
        transform: SpectralTransform<K>,
    ) -> Result<Self, ContextError> {
        if capture.block_len() != transform.block_len() {
            return Err(ContextError {
                block_len: capture.block_len(),
                needed: transform.block_len(),
            });
        }
        Ok(Self { capture, transform })
    }
}

/// Why a session ended
#[derive(Debug)]
pub enum SessionOutcome {
    /// The client closed its side of the connection
    PeerClosed,
    /// Reading control bytes failed
    ReadFailed(io::Error),
    /// Writing a frame failed, usually because the client went away
    WriteFailed(io::Error),
    /// The sample stream broke; the caller decides whether that is fatal
    AcquisitionFailed(CaptureError),
    Shutdown,
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => write!(f, "peer closed connection"),
            Self::ReadFailed(e) => write!(f, "control read failed: {}", e),
            Self::WriteFailed(e) => write!(f, "frame write failed: {}", e),
            Self::AcquisitionFailed(e) => write!(f, "acquisition failed: {}", e),
            Self::Shutdown => write!(f, "shutdown requested"),
        }
    }
}

/// One client connection streaming spectrum frames
pub struct Session<'a, T, D, K = RustFftKernel> {
    conn: T,
    control: ControlChannel,
    ctx: &'a mut StreamContext<D, K>,
    pacer: Pacer,
    shutdown: Shutdown,
    stats: SessionStats,
}

impl<'a, T, D, K> Session<'a, T, D, K>
where
    T: Transport,
    D: SdrDevice,
    K: FftKernel,
{
    /// Start a session with an empty command buffer
    pub fn new(
        conn: T,
        ctx: &'a mut StreamContext<D, K>,
        settings: &SessionSettings,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            conn,
            control: ControlChannel::new(settings.command_capacity),
            ctx,
            pacer: Pacer::new(settings.frame_interval),
            shutdown,
            stats: SessionStats::new(),
        }
    }

    /// Stream until the session closes. The connection is dropped (closed)
    /// on return.
    pub fn run(mut self) -> (SessionOutcome, SessionStats) {
        debug!(
            "Streaming {}-bin frames every {:?}",
            self.ctx.transform.fft_size(),
            self.pacer.interval()
        );
        let outcome = self.stream();
        (outcome, self.stats)
    }

    fn stream(&mut self) -> SessionOutcome {
        loop {
            if self.shutdown.is_triggered() {
                return SessionOutcome::Shutdown;
            }

            match self.control.drain(&mut self.conn) {
                Ok(drained) => {
                    self.apply(&drained);
                    if drained.peer_closed {
                        return SessionOutcome::PeerClosed;
                    }
                }
                Err(e) => return SessionOutcome::ReadFailed(e),
            }

            let block = match self.ctx.capture.acquire() {
                Ok(block) => block,
                Err(e) => return SessionOutcome::AcquisitionFailed(e),
            };

            let frame = self.ctx.transform.transform(block);

            if let Err(e) = self.conn.write_all(frame) {
                return SessionOutcome::WriteFailed(e);
            }
            self.stats.record_frame(frame.len());

            if self.pacer.wait(&self.shutdown) == Pace::Cancelled {
                return SessionOutcome::Shutdown;
            }
        }
    }

    /// Apply drained commands in arrival order
    fn apply(&mut self, drained: &Drained) {
        for e in &drained.errors {
            warn!("Discarded control command: {}", e);
            self.stats.record_command_error();
        }

        for cmd in &drained.commands {
            info!("New frequency: {} Hz", cmd.freq_hz);
            match self.ctx.capture.retune(cmd.freq_hz) {
                Ok(()) => self.stats.record_retune(),
                Err(e) => {
                    warn!("Failed to set center freq: {}", e);
                    self.stats.record_retune_failure();
                }
            }
        }

        if drained.bytes > 0 {
            debug!(
                "Drained {} control bytes, {} command(s)",
                drained.bytes,
                drained.commands.len()
            );
        }
    }
}
