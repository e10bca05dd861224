//! Frame pacing
//!
//! A fixed-rate ticker bounds the frame rate independently of how long
//! acquisition and transform take: time spent working is not added on top
//! of the interval. Ticks that fall due while a frame is still in progress
//! are coalesced rather than queued.

use std::time::{Duration, Instant};

use crossbeam_channel::{select, tick, Receiver};

use crate::shutdown::Shutdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    /// Time for the next frame
    Tick,
    /// Shutdown was requested while waiting
    Cancelled,
}

#[derive(Debug)]
pub struct Pacer {
    ticker: Receiver<Instant>,
    interval: Duration,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            ticker: tick(interval),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Block until the next tick or until shutdown
    pub fn wait(&self, shutdown: &Shutdown) -> Pace {
        select! {
            recv(self.ticker) -> _ => Pace::Tick,
            recv(shutdown.receiver()) -> _ => Pace::Cancelled,
        }
    }
}
