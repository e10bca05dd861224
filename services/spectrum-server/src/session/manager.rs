//! Session manager - accepts clients one at a time and runs their sessions

use std::io::{self, ErrorKind};
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{AcquisitionFailurePolicy, Config};
use crate::control::DEFAULT_CAPACITY;
use crate::sdr::{CaptureError, SdrDevice};
use crate::shutdown::Shutdown;
use crate::spectrum::{FftKernel, RustFftKernel};
use crate::transport::{Listener, Transport};

use super::stream::{Session, SessionOutcome, StreamContext};

/// How often an idle accept wait checks for shutdown
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Per-session settings derived from the configuration
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub frame_interval: Duration,
    pub command_capacity: usize,
    pub acquisition_failure: AcquisitionFailurePolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(500),
            command_capacity: DEFAULT_CAPACITY,
            acquisition_failure: AcquisitionFailurePolicy::ExitProcess,
        }
    }
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            frame_interval: config.frame_interval,
            command_capacity: config.command_capacity,
            acquisition_failure: config.acquisition_failure,
        }
    }
}

/// Errors that stop the server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Acquisition(#[from] CaptureError),

    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),
}

/// Owns the listener and the streaming context for the life of the process
pub struct SessionManager<L, D, K = RustFftKernel> {
    listener: L,
    ctx: StreamContext<D, K>,
    settings: SessionSettings,
    shutdown: Shutdown,
    sessions_served: u64,
}

impl<L, D, K> SessionManager<L, D, K>
where
    L: Listener,
    D: SdrDevice,
    K: FftKernel,
{
    pub fn new(
        listener: L,
        ctx: StreamContext<D, K>,
        settings: SessionSettings,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            listener,
            ctx,
            settings,
            shutdown,
            sessions_served: 0,
        }
    }

    /// Serve clients until shutdown. Returns an error only for failures the
    /// configured policy treats as fatal.
    pub fn run(&mut self) -> Result<(), ServerError> {
        info!("Waiting for clients...");

        loop {
            if self.shutdown.is_triggered() {
                break;
            }

            match self.listener.poll_accept() {
                Ok(Some(conn)) => self.serve(conn)?,
                Ok(None) => {
                    if self.shutdown.wait_timeout(ACCEPT_POLL_INTERVAL) {
                        break;
                    }
                }
                Err(e) if is_transient_accept_error(&e) => {
                    warn!("Accept failed: {}", e);
                }
                Err(e) => return Err(ServerError::Accept(e)),
            }
        }

        info!(
            "Session manager stopped. Sessions served: {}, blocks acquired: {}",
            self.sessions_served,
            self.ctx.capture.blocks_acquired()
        );
        Ok(())
    }

    fn serve(&mut self, conn: L::Conn) -> Result<(), ServerError> {
        let peer = conn.peer();
        self.sessions_served += 1;
        info!(
            "Client {} connected at {} (session #{}, {:.3} MHz)",
            peer,
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            self.sessions_served,
            self.ctx.capture.center_freq() as f64 / 1e6
        );

        let session = Session::new(conn, &mut self.ctx, &self.settings, self.shutdown.clone());
        let (outcome, stats) = session.run();

        match outcome {
            // The device may have been stopped by the same signal
            SessionOutcome::AcquisitionFailed(e) if self.shutdown.is_triggered() => {
                info!("Client {} session closed during shutdown: {} | {}", peer, e, stats);
            }
            SessionOutcome::AcquisitionFailed(e) => {
                error!("Client {} session aborted: {} | {}", peer, e, stats);
                match self.settings.acquisition_failure {
                    AcquisitionFailurePolicy::ExitProcess => return Err(e.into()),
                    AcquisitionFailurePolicy::EndSession => {
                        if let Err(e) = self.ctx.capture.reset_buffers() {
                            warn!("Failed to reset buffers: {}", e);
                        }
                    }
                }
            }
            other @ (SessionOutcome::ReadFailed(_) | SessionOutcome::WriteFailed(_)) => {
                warn!("Client {} disconnected: {} | {}", peer, other, stats);
            }
            other => {
                info!("Client {} session closed: {} | {}", peer, other, stats);
            }
        }

        Ok(())
    }
}

fn is_transient_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset | ErrorKind::Interrupted
    )
}
