//! Test doubles for the device and transport seams

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::rc::Rc;

use crate::sdr::{DeviceError, SdrDevice};
use crate::shutdown::ShutdownTrigger;
use crate::transport::{Listener, Transport};

/// Scripted outcome of one `read_sync` call
#[derive(Debug, Clone, Copy)]
pub enum DeviceRead {
    Full,
    Short(usize),
    Fail,
}

#[derive(Debug)]
pub struct DeviceState {
    pub sample_rate: u32,
    pub center_freq: u32,
    pub auto_gain: bool,
    pub manual_gain: Option<f32>,
    pub buffer_resets: usize,
    /// Every successfully applied center frequency, in order
    pub retunes: Vec<u32>,
    /// Center frequency in effect at each read
    pub reads_at: Vec<u32>,
    pub script: VecDeque<DeviceRead>,
    pub fill: u8,
    pub fail_settings: bool,
    pub open: bool,
    /// Fired by the next read, as if a signal arrived mid-acquisition
    pub shutdown_on_read: Option<ShutdownTrigger>,
}

/// In-memory SDR whose state stays observable after it is moved
#[derive(Debug)]
pub struct MockDevice {
    state: Rc<RefCell<DeviceState>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(DeviceState {
                sample_rate: 0,
                center_freq: 0,
                auto_gain: false,
                manual_gain: None,
                buffer_resets: 0,
                retunes: Vec::new(),
                reads_at: Vec::new(),
                script: VecDeque::new(),
                fill: 0,
                fail_settings: false,
                open: true,
                shutdown_on_read: None,
            })),
        }
    }

    pub fn probe(&self) -> Rc<RefCell<DeviceState>> {
        self.state.clone()
    }

    pub fn script<I: IntoIterator<Item = DeviceRead>>(&self, reads: I) {
        self.state.borrow_mut().script.extend(reads);
    }

    fn setting(&self) -> Result<std::cell::RefMut<'_, DeviceState>, DeviceError> {
        let state = self.state.borrow_mut();
        if state.fail_settings {
            return Err(DeviceError::io("configure mock", ErrorKind::Other.into()));
        }
        Ok(state)
    }
}

impl SdrDevice for MockDevice {
    fn set_sample_rate(&mut self, hz: u32) -> Result<(), DeviceError> {
        self.setting()?.sample_rate = hz;
        Ok(())
    }

    fn set_center_freq(&mut self, hz: u32) -> Result<(), DeviceError> {
        let mut state = self.setting()?;
        state.center_freq = hz;
        state.retunes.push(hz);
        Ok(())
    }

    fn set_auto_gain(&mut self) -> Result<(), DeviceError> {
        let mut state = self.setting()?;
        state.auto_gain = true;
        state.manual_gain = None;
        Ok(())
    }

    fn set_manual_gain(&mut self, gain_db: f32) -> Result<(), DeviceError> {
        let mut state = self.setting()?;
        state.auto_gain = false;
        state.manual_gain = Some(gain_db);
        Ok(())
    }

    fn reset_buffers(&mut self) -> Result<(), DeviceError> {
        self.setting()?.buffer_resets += 1;
        Ok(())
    }

    fn read_sync(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        let mut state = self.state.borrow_mut();
        let freq = state.center_freq;
        state.reads_at.push(freq);
        if let Some(trigger) = state.shutdown_on_read.take() {
            trigger.trigger();
        }

        match state.script.pop_front().unwrap_or(DeviceRead::Full) {
            DeviceRead::Full => {
                buf.fill(state.fill);
                Ok(buf.len())
            }
            DeviceRead::Short(n) => {
                let n = n.min(buf.len());
                buf[..n].fill(state.fill);
                Ok(n)
            }
            DeviceRead::Fail => Err(DeviceError::io(
                "read from mock",
                ErrorKind::UnexpectedEof.into(),
            )),
        }
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.state.borrow_mut().open = false;
    }
}

/// Scripted inbound event on a mock connection
#[derive(Debug, Clone)]
pub enum Inbound {
    Bytes(Vec<u8>),
    /// Ends the current drain (reported as WouldBlock)
    Pause,
    Eof,
}

#[derive(Debug, Default)]
pub struct ConnState {
    pub inbound: VecDeque<Inbound>,
    pub written: Vec<u8>,
    pub writes: usize,
    /// Writes succeed this many times, then fail with BrokenPipe
    pub fail_after_writes: Option<usize>,
    pub nonblocking: bool,
    /// Blocking mode observed at each write
    pub nonblocking_at_write: Vec<bool>,
    pub closed: bool,
}

#[derive(Debug)]
pub struct MockConn {
    state: Rc<RefCell<ConnState>>,
}

impl MockConn {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(ConnState::default())),
        }
    }

    pub fn probe(&self) -> Rc<RefCell<ConnState>> {
        self.state.clone()
    }

    pub fn inbound<I: IntoIterator<Item = Inbound>>(self, events: I) -> Self {
        self.state.borrow_mut().inbound.extend(events);
        self
    }

    pub fn fail_after_writes(self, n: usize) -> Self {
        self.state.borrow_mut().fail_after_writes = Some(n);
        self
    }
}

impl Read for MockConn {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        match state.inbound.pop_front() {
            Some(Inbound::Bytes(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    let rest = bytes.split_off(n);
                    state.inbound.push_front(Inbound::Bytes(rest));
                }
                Ok(n)
            }
            Some(Inbound::Eof) => {
                state.inbound.push_front(Inbound::Eof);
                Ok(0)
            }
            Some(Inbound::Pause) | None => Err(ErrorKind::WouldBlock.into()),
        }
    }
}

impl Write for MockConn {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        let nonblocking = state.nonblocking;
        state.nonblocking_at_write.push(nonblocking);
        let limit = state.fail_after_writes;
        if limit.is_some_and(|n| state.writes >= n) {
            return Err(ErrorKind::BrokenPipe.into());
        }
        state.writes += 1;
        state.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for MockConn {
    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        self.state.borrow_mut().nonblocking = nonblocking;
        Ok(())
    }

    fn peer(&self) -> String {
        "mock".to_string()
    }
}

impl Drop for MockConn {
    fn drop(&mut self) {
        self.state.borrow_mut().closed = true;
    }
}

/// Hands out queued connections, then requests shutdown once drained
#[derive(Debug)]
pub struct MockListener {
    pending: VecDeque<MockConn>,
    pub accepted: Rc<RefCell<usize>>,
    on_empty: Option<ShutdownTrigger>,
}

impl MockListener {
    pub fn new<I: IntoIterator<Item = MockConn>>(conns: I, on_empty: ShutdownTrigger) -> Self {
        Self {
            pending: conns.into_iter().collect(),
            accepted: Rc::new(RefCell::new(0)),
            on_empty: Some(on_empty),
        }
    }
}

impl Listener for MockListener {
    type Conn = MockConn;

    fn poll_accept(&mut self) -> io::Result<Option<MockConn>> {
        match self.pending.pop_front() {
            Some(conn) => {
                *self.accepted.borrow_mut() += 1;
                Ok(Some(conn))
            }
            None => {
                if let Some(trigger) = self.on_empty.take() {
                    trigger.trigger();
                }
                Ok(None)
            }
        }
    }
}
