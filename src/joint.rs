//! A single joint: owns a decoder, a motor, the shared reference angle, and
//! (once calibrated) a running controller.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::atomic_f64::AtomicF64;
use crate::config::JointConfig;
use crate::controller::{JointController, DEFAULT_GAIN};
use crate::decoder::QuadratureDecoder;
use crate::error::ArmError;
use crate::motor::HBridgeMotor;
use crate::sysfs::gpio::{Edge, GpioLine};
use crate::sysfs::pwm::PwmChannel;

/// One joint's hardware and control state.
///
/// Before [`Joint::start_controller`] is called the joint is in its
/// calibration phase: the decoder and motor exist but nothing is driving
/// them automatically. Afterwards the controller thread owns `motor` and the
/// joint can only be commanded through `reference`.
pub struct Joint<G: GpioLine, P: PwmChannel> {
    index: usize,
    decoder: Arc<QuadratureDecoder<G>>,
    motor: Option<HBridgeMotor<P>>,
    reference: Arc<AtomicF64>,
    controller: Option<JointController>,
    gain: f64,
}

impl<G: GpioLine, P: PwmChannel> Joint<G, P> {
    /// Opens this joint's GPIO lines and PWM channels per `config`.
    pub fn new(
        index: usize,
        config: &JointConfig,
        base_pwm_freq_hz: f64,
        initial_duty_pct: f64,
        gain: f64,
    ) -> Result<Self, ArmError> {
        let edge = match config.edge_rate {
            crate::config::EdgeRate::Both4x => Edge::Both,
            crate::config::EdgeRate::Rising2x => Edge::Rising,
        };
        let decoder = Arc::new(QuadratureDecoder::<G>::new(
            config.encoder_pin_a,
            config.encoder_pin_b,
            edge,
            config.segments_per_revolution,
        )?);
        let motor = HBridgeMotor::<P>::new(
            config.motor_pwm_a,
            config.motor_pwm_b,
            base_pwm_freq_hz,
            initial_duty_pct,
        )?;

        Ok(Self {
            index,
            decoder,
            motor: Some(motor),
            reference: Arc::new(AtomicF64::new(0.0)),
            controller: None,
            gain,
        })
    }

    pub fn decoder(&self) -> &Arc<QuadratureDecoder<G>> {
        &self.decoder
    }

    /// Direct motor access, available only during calibration (before
    /// [`Joint::start_controller`] moves it onto the controller thread).
    pub fn motor_mut(&mut self) -> Option<&mut HBridgeMotor<P>> {
        self.motor.as_mut()
    }

    /// Resets the decoder's angular zero; used by Phase B calibration.
    pub fn set_zero(&self) {
        self.decoder.set_zero();
    }

    /// Moves the motor onto a freshly spawned controller thread. Calibration
    /// must be complete before calling this: the controller takes exclusive
    /// ownership of the motor.
    pub fn start_controller(&mut self) {
        let motor = self
            .motor
            .take()
            .expect("joint controller already started");
        self.controller = Some(JointController::spawn(
            self.index,
            Arc::clone(&self.decoder),
            motor,
            Arc::clone(&self.reference),
            self.gain,
        ));
    }

    /// The last commanded reference angle, in degrees — not the measured
    /// angle (see the crate's kinematics/controller design notes).
    pub fn get_angle(&self) -> f64 {
        self.reference.load(Ordering::Acquire)
    }

    /// Sets the reference angle, normalised to `[0, 360)` degrees. Takes
    /// effect on the controller's next loop iteration; there is no
    /// per-call synchronisation.
    pub fn set_angle(&self, degrees: f64) {
        let normalised = degrees.rem_euclid(360.0);
        self.reference.store(normalised, Ordering::Release);
    }

    /// Stops and joins the controller thread, if one is running.
    pub fn stop_controller(&mut self) {
        if let Some(controller) = self.controller.take() {
            controller.stop_and_join();
        }
    }
}

impl<G: GpioLine, P: PwmChannel> Drop for Joint<G, P> {
    fn drop(&mut self) {
        self.stop_controller();
        log::info!("joint {}: torn down", self.index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EdgeRate;
    use crate::mock::{MockGpioLine, MockPwmChannel};

    fn config() -> JointConfig {
        JointConfig {
            encoder_pin_a: 0,
            encoder_pin_b: 1,
            segments_per_revolution: 1856,
            edge_rate: EdgeRate::Both4x,
            motor_pwm_a: 0,
            motor_pwm_b: 1,
            link_length_m: 0.015,
        }
    }

    #[test]
    fn set_angle_normalises_into_0_360_range() {
        let joint: Joint<MockGpioLine, MockPwmChannel> =
            Joint::new(0, &config(), 25_000.0, 0.0, DEFAULT_GAIN).unwrap();
        joint.set_angle(-90.0);
        assert!((joint.get_angle() - 270.0).abs() < 1e-9);
        joint.set_angle(725.0);
        assert!((joint.get_angle() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn controller_lifecycle_starts_and_stops_cleanly() {
        let mut joint: Joint<MockGpioLine, MockPwmChannel> =
            Joint::new(0, &config(), 25_000.0, 0.0, DEFAULT_GAIN).unwrap();
        assert!(joint.motor_mut().is_some());
        joint.start_controller();
        assert!(joint.motor_mut().is_none());
        joint.stop_controller();
    }
}
