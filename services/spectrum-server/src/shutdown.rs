//! Cooperative shutdown
//!
//! Termination signals are caught on a helper thread and turned into a
//! shutdown event. The streaming loop checks the event at iteration
//! boundaries and while pacing, so teardown always happens in ordinary
//! control flow where `Drop` releases the device and sockets.
//!
//! The event is the disconnection of a crossbeam channel: once the single
//! [`ShutdownTrigger`] is gone, every receive on a [`Shutdown`] clone
//! returns immediately.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{error, warn};

/// Fires the shutdown event when triggered or dropped
#[derive(Debug)]
pub struct ShutdownTrigger {
    _tx: Sender<()>,
}

impl ShutdownTrigger {
    /// Consumes the trigger; its sender going away is the event
    pub fn trigger(self) {}
}

/// Observer side of the shutdown event
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: Receiver<()>,
}

pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = bounded(0);
    (ShutdownTrigger { _tx: tx }, Shutdown { rx })
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleep up to `timeout`, returning early with `true` on shutdown
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        matches!(
            self.rx.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        )
    }

    /// Channel that becomes ready (disconnected) on shutdown, for `select!`
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

/// Bridge SIGINT, SIGTERM and SIGQUIT into the shutdown event.
///
/// Signal handlers are registered before this returns, so a registration
/// failure is reported to the caller instead of silently firing the event.
pub fn spawn_signal_bridge(trigger: ShutdownTrigger) -> io::Result<JoinHandle<()>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let signals = {
        let _guard = runtime.enter();
        Signals::register()?
    };

    thread::Builder::new()
        .name("signal-bridge".to_string())
        .spawn(move || {
            let mut signals = signals;
            match runtime.block_on(signals.recv()) {
                Some(name) => warn!("{} caught, exiting!", name),
                None => error!("Signal stream closed, shutting down"),
            }
            trigger.trigger();

            // A blocked device read cannot observe the event; a second
            // signal gives up on the orderly teardown
            if let Some(name) = runtime.block_on(signals.recv()) {
                error!("{} caught again, forcing exit", name);
                std::process::exit(2);
            }
        })
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn register() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    async fn recv(&mut self) -> Option<&'static str> {
        tokio::select! {
            s = self.interrupt.recv() => s.map(|_| "SIGINT"),
            s = self.terminate.recv() => s.map(|_| "SIGTERM"),
            s = self.quit.recv() => s.map(|_| "SIGQUIT"),
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn register() -> io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> Option<&'static str> {
        tokio::signal::ctrl_c().await.ok().map(|_| "Ctrl-C")
    }
}
