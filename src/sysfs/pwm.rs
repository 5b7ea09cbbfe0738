//! `/sys/class/pwm` channel export and period/duty/enable control.

use std::fs;
use std::path::PathBuf;

use crate::error::PwmError;

const SYSFS_PWM_ROOT: &str = "/sys/class/pwm/pwmchip0";

/// Anything that can be driven as a PWM output channel.
///
/// Implemented by [`SysfsPwm`] for real hardware and by
/// [`crate::mock::MockPwmChannel`] in tests.
pub trait PwmChannel: Send + Sync + 'static {
    /// Opens/exports the channel.
    fn open(channel: u32) -> Result<Self, PwmError>
    where
        Self: Sized;

    fn set_period_ns(&mut self, ns: u64) -> Result<(), PwmError>;
    fn period_ns(&self) -> Result<u64, PwmError>;

    fn set_duty_ns(&mut self, ns: u64) -> Result<(), PwmError>;
    fn duty_ns(&self) -> Result<u64, PwmError>;

    fn set_enabled(&mut self, enabled: bool) -> Result<(), PwmError>;
    fn enabled(&self) -> Result<bool, PwmError>;
}

/// A single PWM channel exported through `/sys/class/pwm/pwmchip0`.
pub struct SysfsPwm {
    channel: u32,
    dir: PathBuf,
}

impl SysfsPwm {
    fn channel_dir(channel: u32) -> PathBuf {
        PathBuf::from(format!("{SYSFS_PWM_ROOT}/pwm{channel}"))
    }

    fn export(channel: u32) -> Result<(), PwmError> {
        if Self::channel_dir(channel).exists() {
            return Ok(());
        }
        fs::write(format!("{SYSFS_PWM_ROOT}/export"), channel.to_string())
            .map_err(|e| PwmError::Export(channel, e))
    }

    /// Writes the channel number to `.../unexport`, releasing it.
    pub fn unexport(channel: u32) -> Result<(), PwmError> {
        fs::write(format!("{SYSFS_PWM_ROOT}/unexport"), channel.to_string())
            .map_err(|e| PwmError::Export(channel, e))
    }

    fn write_attr(&self, attr: &'static str, value: &str) -> Result<(), PwmError> {
        fs::write(self.dir.join(attr), value).map_err(|e| PwmError::Configure(self.channel, attr, e))
    }

    fn read_attr(&self, attr: &'static str) -> Result<String, PwmError> {
        fs::read_to_string(self.dir.join(attr))
            .map(|s| s.trim().to_string())
            .map_err(|e| PwmError::Read(self.channel, attr, e))
    }
}

impl PwmChannel for SysfsPwm {
    fn open(channel: u32) -> Result<Self, PwmError> {
        Self::export(channel)?;
        let dir = Self::channel_dir(channel);
        let pwm = Self { channel, dir };
        pwm.write_attr("duty_cycle", "0")?;
        Ok(pwm)
    }

    fn set_period_ns(&mut self, ns: u64) -> Result<(), PwmError> {
        self.write_attr("period", &ns.to_string())
    }

    fn period_ns(&self) -> Result<u64, PwmError> {
        self.read_attr("period")?
            .parse()
            .map_err(|_| PwmError::Read(self.channel, "period", invalid_data()))
    }

    fn set_duty_ns(&mut self, ns: u64) -> Result<(), PwmError> {
        self.write_attr("duty_cycle", &ns.to_string())
    }

    fn duty_ns(&self) -> Result<u64, PwmError> {
        self.read_attr("duty_cycle")?
            .parse()
            .map_err(|_| PwmError::Read(self.channel, "duty_cycle", invalid_data()))
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<(), PwmError> {
        self.write_attr("enable", if enabled { "1" } else { "0" })
    }

    fn enabled(&self) -> Result<bool, PwmError> {
        Ok(self.read_attr("enable")? == "1")
    }
}

fn invalid_data() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, "unexpected sysfs content")
}

impl Drop for SysfsPwm {
    fn drop(&mut self) {
        if let Err(e) = self.set_enabled(false) {
            log::warn!("failed to disable pwm channel {}: {e}", self.channel);
        }
        if let Err(e) = Self::unexport(self.channel) {
            log::warn!("failed to unexport pwm channel {}: {e}", self.channel);
        }
    }
}
