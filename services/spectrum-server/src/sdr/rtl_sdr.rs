//! RTL-SDR access via the rtl_sdr command line tool
//!
//! rtl_sdr streams raw 8-bit IQ to stdout at a fixed tuning, so every change
//! of sample rate, frequency or gain restarts the child process.
//!
//! A dedicated thread drains the child's stdout as fast as it produces
//! samples and queues them in chunks. `read_sync` discards whatever was
//! queued before the call and fills the caller's buffer from samples that
//! arrive afterwards, so each block is contiguous and fresh no matter how
//! slowly frames are paced.

use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use super::device::{enumerate, DeviceError, DeviceInfo, SdrDevice};

/// Bytes requested from the pipe per read
const CHUNK_LEN: usize = 16 * 1024;

/// Chunks held between the stdout reader and `read_sync`
const QUEUE_CHUNKS: usize = 64;

/// RTL-SDR dongle driven through an rtl_sdr child process
#[derive(Debug)]
pub struct RtlSdrProcess {
    rtl_sdr_path: PathBuf,
    info: DeviceInfo,
    sample_rate: u32,
    center_freq: u32,
    gain_db: Option<f32>,
    ppm_error: i32,
    child: Option<Child>,
    samples: Option<Receiver<Vec<u8>>>,
    reader: Option<JoinHandle<()>>,
}

impl RtlSdrProcess {
    /// Look up device `index` in the attached device listing.
    ///
    /// The child process is not started until the first read or
    /// buffer reset.
    pub fn open(rtl_sdr_path: &Path, index: u32, ppm_error: i32) -> Result<Self, DeviceError> {
        let devices = enumerate(rtl_sdr_path)?;
        if devices.is_empty() {
            return Err(DeviceError::NoDevices);
        }

        info!("Found {} device(s):", devices.len());
        for device in &devices {
            info!("  {}: {}", device.index, device.label());
        }

        let info = devices
            .iter()
            .find(|d| d.index == index)
            .cloned()
            .ok_or(DeviceError::NotFound {
                index,
                count: devices.len(),
            })?;

        info!("Using device {}: {}", index, info.label());
        if let Some(serial) = &info.serial {
            info!("  Serial: {}", serial);
        }

        Ok(Self {
            rtl_sdr_path: rtl_sdr_path.to_path_buf(),
            info,
            sample_rate: 2_000_000,
            center_freq: 99_400_000,
            gain_db: None,
            ppm_error,
            child: None,
            samples: None,
            reader: None,
        })
    }

    fn is_streaming(&self) -> bool {
        self.child.is_some()
    }

    fn build_command(&self) -> Command {
        // rtl_sdr -d <device> -f <freq> -s <rate> [-g <gain>] [-p <ppm>] -
        let mut cmd = Command::new(&self.rtl_sdr_path);
        cmd.arg("-d")
            .arg(self.info.index.to_string())
            .arg("-f")
            .arg(self.center_freq.to_string())
            .arg("-s")
            .arg(self.sample_rate.to_string());

        // Without -g rtl_sdr runs the tuner in automatic gain mode
        if let Some(gain) = self.gain_db {
            cmd.arg("-g").arg(gain.to_string());
        }

        if self.ppm_error != 0 {
            cmd.arg("-p").arg(self.ppm_error.to_string());
        }

        // Output to stdout (continuous mode)
        cmd.arg("-");

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Keep terminal signals away from the child; shutdown stops it
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        cmd
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        let mut cmd = self.build_command();
        debug!("Executing: {:?}", cmd);

        let mut child = cmd
            .spawn()
            .map_err(|e| DeviceError::io("spawn rtl_sdr", e))?;

        let Some(stdout) = child.stdout.take() else {
            kill(&mut child);
            return Err(DeviceError::io(
                "capture rtl_sdr stdout",
                ErrorKind::BrokenPipe.into(),
            ));
        };

        let (tx, rx) = bounded(QUEUE_CHUNKS);
        let reader = thread::Builder::new()
            .name("rtl_sdr-stdout".to_string())
            .spawn(move || pump_samples(stdout, tx));
        let reader = match reader {
            Ok(handle) => handle,
            Err(e) => {
                kill(&mut child);
                return Err(DeviceError::io("spawn rtl_sdr reader", e));
            }
        };

        // Forward the tool's diagnostics to our log
        if let Some(stderr) = child.stderr.take() {
            let spawned = thread::Builder::new()
                .name("rtl_sdr-stderr".to_string())
                .spawn(move || {
                    for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                        if !line.trim().is_empty() {
                            info!("[rtl_sdr] {}", line.trim());
                        }
                    }
                });
            if let Err(e) = spawned {
                warn!("Failed to spawn rtl_sdr stderr reader: {}", e);
            }
        }

        self.child = Some(child);
        self.samples = Some(rx);
        self.reader = Some(reader);
        Ok(())
    }

    fn stop(&mut self) {
        // The reader exits on its next send once the queue is gone
        self.samples = None;
        if let Some(mut child) = self.child.take() {
            kill(&mut child);
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }

    fn restart(&mut self) -> Result<(), DeviceError> {
        self.stop();
        self.start()
    }

    fn has_exited(&mut self) -> bool {
        matches!(
            self.child.as_mut().map(Child::try_wait),
            Some(Ok(Some(_)))
        )
    }

    /// Change one tuning field and restart a running stream. The field is
    /// restored if the restart fails.
    fn update<T>(&mut self, field: fn(&mut Self) -> &mut T, value: T) -> Result<(), DeviceError> {
        let previous = std::mem::replace(field(self), value);
        if !self.is_streaming() {
            return Ok(());
        }
        if let Err(e) = self.restart() {
            *field(self) = previous;
            return Err(e);
        }
        Ok(())
    }
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Move everything the child writes into the sample queue. When the queue
/// is full the newest chunk is dropped; readers discard the backlog anyway.
fn pump_samples(mut stdout: ChildStdout, tx: Sender<Vec<u8>>) {
    let mut dropped = 0u64;

    loop {
        let mut chunk = vec![0u8; CHUNK_LEN];
        match stdout.read(&mut chunk) {
            Ok(0) => {
                debug!("rtl_sdr stdout closed (EOF)");
                break;
            }
            Ok(n) => {
                chunk.truncate(n);
                match tx.try_send(chunk) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => dropped += 1,
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("Failed to read from rtl_sdr: {}", e);
                break;
            }
        }
    }

    debug!("rtl_sdr reader stopped, {} chunk(s) dropped while idle", dropped);
}

impl SdrDevice for RtlSdrProcess {
    fn set_sample_rate(&mut self, hz: u32) -> Result<(), DeviceError> {
        self.update(|d| &mut d.sample_rate, hz)
    }

    fn set_center_freq(&mut self, hz: u32) -> Result<(), DeviceError> {
        self.update(|d| &mut d.center_freq, hz)
    }

    fn set_auto_gain(&mut self) -> Result<(), DeviceError> {
        self.update(|d| &mut d.gain_db, None)
    }

    fn set_manual_gain(&mut self, gain_db: f32) -> Result<(), DeviceError> {
        self.update(|d| &mut d.gain_db, Some(gain_db))
    }

    /// Discard queued samples, restarting the child if it has died
    fn reset_buffers(&mut self) -> Result<(), DeviceError> {
        if self.has_exited() {
            warn!("rtl_sdr exited, restarting");
            self.stop();
        }
        if let Some(samples) = &self.samples {
            samples.try_iter().for_each(drop);
            return Ok(());
        }
        self.start()
    }

    fn read_sync(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        if self.samples.is_none() {
            self.start()?;
        }
        let Some(samples) = self.samples.as_ref() else {
            return Ok(0);
        };

        // Anything queued before this call is stale
        samples.try_iter().for_each(drop);

        let mut filled = 0;
        while filled < buf.len() {
            let Ok(chunk) = samples.recv() else {
                warn!("rtl_sdr sample stream ended");
                break;
            };
            let n = chunk.len().min(buf.len() - filled);
            buf[filled..filled + n].copy_from_slice(&chunk[..n]);
            filled += n;
        }

        Ok(filled)
    }
}

impl Drop for RtlSdrProcess {
    fn drop(&mut self) {
        if self.is_streaming() {
            info!("Closing RTL-SDR device #{}", self.info.index);
        }
        self.stop();
    }
}
