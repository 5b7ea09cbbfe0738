//! Thin wrappers around the kernel's sysfs GPIO and PWM interfaces (§6).
//!
//! Both subsystems are exposed behind a trait ([`GpioLine`], [`PwmChannel`])
//! so that [`crate::decoder::QuadratureDecoder`] and
//! [`crate::motor::HBridgeMotor`] can be driven by either the real sysfs
//! files or by the in-memory fakes in [`crate::mock`] during tests.

pub mod gpio;
pub mod pwm;

pub use gpio::{Edge, GpioLine, GpioWatcher, Level, SysfsGpio};
pub use pwm::{PwmChannel, SysfsPwm};
