//! `/sys/class/gpio` line export, configuration and edge-triggered watching.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::os::unix::io::AsFd;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use nix::poll::{poll, PollFd, PollFlags};

use crate::error::GpioError;

const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// A GPIO line's logic level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    fn from_sysfs_byte(byte: u8) -> Level {
        if byte == b'1' {
            Level::High
        } else {
            Level::Low
        }
    }

    pub fn as_bit(self) -> u8 {
        match self {
            Level::Low => 0,
            Level::High => 1,
        }
    }
}

/// Which edges should wake the background watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
    Both,
}

impl Edge {
    fn as_sysfs_str(self) -> &'static str {
        match self {
            Edge::Rising => "rising",
            Edge::Falling => "falling",
            Edge::Both => "both",
        }
    }
}

/// Anything that can be sampled for a level and watched for edges.
///
/// Implemented by [`SysfsGpio`] for real hardware and by
/// [`crate::mock::MockGpioLine`] in tests.
pub trait GpioLine: Send + Sync + 'static {
    /// Opens/exports the line and configures it as an input with the given
    /// edge-trigger mode.
    fn open(pin: u32, edge: Edge) -> Result<Self, GpioError>
    where
        Self: Sized;

    /// Samples the current level. Never blocks.
    fn read(&self) -> Result<Level, GpioError>;

    /// Spawns a background thread that blocks waiting for edges and invokes
    /// `callback` once per edge. The returned [`GpioWatcher`] stops the
    /// thread when dropped.
    fn spawn_watcher(&self, callback: Box<dyn FnMut() + Send>) -> Result<GpioWatcher, GpioError>;
}

/// Handle to a running edge-watcher thread. Dropping it signals the thread to
/// stop and joins it.
pub struct GpioWatcher {
    pub(crate) stop: Arc<AtomicBool>,
    pub(crate) handle: Option<JoinHandle<()>>,
}

impl Drop for GpioWatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// A single GPIO line exported through `/sys/class/gpio`.
pub struct SysfsGpio {
    pin: u32,
    value_path: PathBuf,
}

impl SysfsGpio {
    fn gpio_dir(pin: u32) -> PathBuf {
        PathBuf::from(format!("{SYSFS_GPIO_ROOT}/gpio{pin}"))
    }

    fn export(pin: u32) -> Result<(), GpioError> {
        if Self::gpio_dir(pin).exists() {
            return Ok(());
        }
        fs::write(format!("{SYSFS_GPIO_ROOT}/export"), pin.to_string())
            .map_err(|e| GpioError::Export(pin, e))
    }

    /// Writes `P` to `/sys/class/gpio/unexport`, releasing the line.
    pub fn unexport(pin: u32) -> Result<(), GpioError> {
        fs::write(format!("{SYSFS_GPIO_ROOT}/unexport"), pin.to_string())
            .map_err(|e| GpioError::Export(pin, e))
    }

    fn write_attr(pin: u32, attr: &'static str, value: &str) -> Result<(), GpioError> {
        let path = Self::gpio_dir(pin).join(attr);
        fs::write(path, value).map_err(|e| GpioError::Configure(pin, attr, e))
    }
}

impl GpioLine for SysfsGpio {
    fn open(pin: u32, edge: Edge) -> Result<Self, GpioError> {
        Self::export(pin)?;
        Self::write_attr(pin, "direction", "in")?;
        Self::write_attr(pin, "edge", edge.as_sysfs_str())?;

        let value_path = Self::gpio_dir(pin).join("value");
        Ok(Self { pin, value_path })
    }

    fn read(&self) -> Result<Level, GpioError> {
        let mut file = File::open(&self.value_path).map_err(|e| GpioError::Read(self.pin, e))?;
        let mut buf = [0u8; 1];
        file.read_exact(&mut buf)
            .map_err(|e| GpioError::Read(self.pin, e))?;
        Ok(Level::from_sysfs_byte(buf[0]))
    }

    fn spawn_watcher(&self, mut callback: Box<dyn FnMut() + Send>) -> Result<GpioWatcher, GpioError> {
        let file = OpenOptions::new()
            .read(true)
            .open(&self.value_path)
            .map_err(|e| GpioError::Read(self.pin, e))?;
        let pin = self.pin;
        let stop = Arc::new(AtomicBool::new(false));
        let watcher_stop = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name(format!("gpio{pin}-watcher"))
            .spawn(move || {
                let mut file = file;
                // Consume the current value so the first poll() blocks for a
                // real edge rather than firing immediately on the existing state.
                let _ = drain(&mut file);

                while !watcher_stop.load(Ordering::Acquire) {
                    let fd = file.as_fd();
                    let mut fds = [PollFd::new(&fd, PollFlags::POLLPRI | PollFlags::POLLERR)];
                    const POLL_TIMEOUT_MS: i32 = 100;
                    match poll(&mut fds, POLL_TIMEOUT_MS) {
                        Ok(0) => continue, // timed out, recheck stop flag
                        Ok(_) => {
                            if drain(&mut file).is_ok() {
                                callback();
                            } else {
                                log::warn!("gpio{pin}: transient read failure, dropping edge");
                            }
                        }
                        Err(nix::errno::Errno::EINTR) => continue,
                        Err(e) => {
                            log::error!("gpio{pin}: poll failed: {e}");
                            thread::sleep(Duration::from_millis(10));
                        }
                    }
                }
            })
            .map_err(|e| GpioError::Read(pin, e))?;

        Ok(GpioWatcher {
            stop,
            handle: Some(handle),
        })
    }
}

fn drain(file: &mut File) -> std::io::Result<()> {
    file.seek(SeekFrom::Start(0))?;
    let mut buf = [0u8; 1];
    file.read_exact(&mut buf)?;
    Ok(())
}

impl Drop for SysfsGpio {
    fn drop(&mut self) {
        if let Err(e) = Self::unexport(self.pin) {
            log::warn!("failed to unexport gpio{}: {e}", self.pin);
        }
    }
}
