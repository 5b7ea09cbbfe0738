//! In-memory fakes for [`GpioLine`] and [`PwmChannel`], used by the property
//! and scenario tests in §8 so they can drive the decoder, motor and
//! controller without real sysfs hardware.
//!
//! Gated behind `cfg(test)` by default; enable the `testing` feature to reuse
//! these fakes from an external integration-test crate.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{GpioError, PwmError};
use crate::sysfs::gpio::{Edge, GpioLine, GpioWatcher, Level};
use crate::sysfs::pwm::PwmChannel;

/// A GPIO line backed by a shared in-memory level, driven manually by tests
/// via [`MockGpioLine::set_level`].
pub struct MockGpioLine {
    level: Arc<AtomicBool>,
    edge: Edge,
}

impl Clone for MockGpioLine {
    fn clone(&self) -> Self {
        Self {
            level: Arc::clone(&self.level),
            edge: self.edge,
        }
    }
}

impl MockGpioLine {
    pub fn set_level(&self, level: Level) {
        self.level.store(level == Level::High, Ordering::Release);
    }
}

impl GpioLine for MockGpioLine {
    fn open(_pin: u32, edge: Edge) -> Result<Self, GpioError> {
        Ok(Self {
            level: Arc::new(AtomicBool::new(false)),
            edge,
        })
    }

    fn read(&self) -> Result<Level, GpioError> {
        Ok(if self.level.load(Ordering::Acquire) {
            Level::High
        } else {
            Level::Low
        })
    }

    fn spawn_watcher(&self, _callback: Box<dyn FnMut() + Send>) -> Result<GpioWatcher, GpioError> {
        // Tests drive the decoder's edge-processing logic directly instead of
        // through a background thread; nothing to watch here.
        let _ = self.edge;
        Ok(GpioWatcher::noop())
    }
}

/// A PWM channel backed by shared atomics, recording every write so tests can
/// assert on ordering (e.g. "off channel zeroed before on channel raised").
#[derive(Clone)]
pub struct MockPwmChannel {
    period: Arc<AtomicU64>,
    duty: Arc<AtomicU64>,
    enabled: Arc<AtomicBool>,
    log: Arc<Mutex<Vec<PwmWrite>>>,
}

/// One recorded write to a [`MockPwmChannel`], for assertions in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PwmWrite {
    Period(u64),
    Duty(u64),
    Enabled(bool),
}

impl MockPwmChannel {
    pub fn writes(&self) -> Vec<PwmWrite> {
        self.log.lock().unwrap().clone()
    }
}

impl PwmChannel for MockPwmChannel {
    fn open(_channel: u32) -> Result<Self, PwmError> {
        Ok(Self {
            period: Arc::new(AtomicU64::new(0)),
            duty: Arc::new(AtomicU64::new(0)),
            enabled: Arc::new(AtomicBool::new(false)),
            log: Arc::new(Mutex::new(Vec::new())),
        })
    }

    fn set_period_ns(&mut self, ns: u64) -> Result<(), PwmError> {
        self.period.store(ns, Ordering::Release);
        self.log.lock().unwrap().push(PwmWrite::Period(ns));
        Ok(())
    }

    fn period_ns(&self) -> Result<u64, PwmError> {
        Ok(self.period.load(Ordering::Acquire))
    }

    fn set_duty_ns(&mut self, ns: u64) -> Result<(), PwmError> {
        self.duty.store(ns, Ordering::Release);
        self.log.lock().unwrap().push(PwmWrite::Duty(ns));
        Ok(())
    }

    fn duty_ns(&self) -> Result<u64, PwmError> {
        Ok(self.duty.load(Ordering::Acquire))
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<(), PwmError> {
        self.enabled.store(enabled, Ordering::Release);
        self.log.lock().unwrap().push(PwmWrite::Enabled(enabled));
        Ok(())
    }

    fn enabled(&self) -> Result<bool, PwmError> {
        Ok(self.enabled.load(Ordering::Acquire))
    }
}

impl GpioWatcher {
    /// A watcher handle that owns no thread; used by [`MockGpioLine`], which
    /// expects tests to drive edges directly rather than through polling.
    pub(crate) fn noop() -> Self {
        GpioWatcher {
            stop: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }
}
