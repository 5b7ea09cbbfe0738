//! Crate-wide error taxonomy.
//!
//! Each subsystem gets its own error enum so callers can match narrowly;
//! [`ArmError`] composes all of them for code that just wants to propagate
//! with `?` up to a host binary.

use thiserror::Error;

/// Failures exporting or operating on a sysfs GPIO line.
#[derive(Debug, Error)]
pub enum GpioError {
    #[error("failed to export gpio{0}: {1}")]
    Export(u32, std::io::Error),
    #[error("failed to configure gpio{0} {1}: {2}")]
    Configure(u32, &'static str, std::io::Error),
    #[error("failed to read gpio{0} value: {1}")]
    Read(u32, std::io::Error),
}

/// Failures exporting or operating on a sysfs PWM channel.
#[derive(Debug, Error)]
pub enum PwmError {
    #[error("failed to export pwm channel {0}: {1}")]
    Export(u32, std::io::Error),
    #[error("failed to configure pwm channel {0} {1}: {2}")]
    Configure(u32, &'static str, std::io::Error),
    #[error("failed to read pwm channel {0} {1}: {2}")]
    Read(u32, &'static str, std::io::Error),
}

/// Failures specific to the H-bridge motor abstraction.
#[derive(Debug, Error)]
pub enum MotorError {
    #[error("speed {0}% is outside the valid [0, 100] range")]
    InvalidSpeed(f64),
    #[error("invalid range limits: lo ({0}%) must be < hi ({1}%)")]
    InvalidRange(f64, f64),
    #[error(transparent)]
    Pwm(#[from] PwmError),
}

/// Failures from the forward/inverse kinematics solver.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KinematicsError {
    #[error("arity {0} is not supported; only 1- and 2-link arms are implemented")]
    UnsupportedArity(usize),
    #[error("target point is not reachable by this arm")]
    Unreachable,
    #[error("joint angles produced a non-finite (unachievable) position")]
    Unachievable,
}

/// Failures that abort arm calibration. Calibration failure is always fatal:
/// the arm cannot safely operate without a deadband and an angular zero.
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("joint {0}: no movement detected up to 100% duty")]
    NoMovementDetected(usize),
    #[error("joint {0}: motor could not be stopped by ramping duty back down to 0%")]
    CannotStop(usize),
}

/// Top-level error, composing every subsystem's error type.
#[derive(Debug, Error)]
pub enum ArmError {
    #[error("arm configuration must contain at least one joint")]
    EmptyArm,
    #[error("failed to parse arm configuration: {0}")]
    Config(#[from] toml::de::Error),
    #[error("failed to read arm configuration file: {0}")]
    ConfigIo(#[from] std::io::Error),
    #[error(transparent)]
    Gpio(#[from] GpioError),
    #[error(transparent)]
    Pwm(#[from] PwmError),
    #[error(transparent)]
    Motor(#[from] MotorError),
    #[error(transparent)]
    Kinematics(#[from] KinematicsError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}
