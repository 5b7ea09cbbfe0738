//! Arm façade (§4.5): composition, two-phase calibration, and the public
//! `Get/Set/SetSync Position` contract.

use std::thread;
use std::time::Duration;

use crate::config::ArmConfig;
use crate::error::{ArmError, CalibrationError};
use crate::joint::Joint;
use crate::kinematics;
use crate::point::{Point, DEFAULT_TOLERANCE};
use crate::sysfs::gpio::GpioLine;
use crate::sysfs::pwm::PwmChannel;

/// Coarse upward step size used to discover the deadband (§4.5 Phase A).
const DEADBAND_COARSE_STEP_PCT: f64 = 5.0;
/// Fine downward step size used to pin down the exact deadband boundary.
const DEADBAND_FINE_STEP_PCT: f64 = 0.25;
/// Minimum |Δangle| (degrees) that counts as "the motor moved".
const MOVEMENT_THRESHOLD_DEG: f64 = 0.5;
/// Pulse duration used while sweeping upward.
const COARSE_PULSE: Duration = Duration::from_millis(2);
/// Pulse duration used while fine-tuning downward and during zeroing.
const FINE_PULSE: Duration = Duration::from_millis(200);
/// Poll interval for `SetPositionSync`.
const SYNC_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// An N-link planar revolute arm, composed of independently-controlled
/// joints.
pub struct Arm<G: GpioLine, P: PwmChannel> {
    joints: Vec<Joint<G, P>>,
    link_lengths: Vec<f64>,
}

impl<G: GpioLine, P: PwmChannel> Arm<G, P> {
    /// Opens every joint's hardware per `config`. Joints are not yet
    /// calibrated or running — call [`Arm::init`] before commanding motion.
    pub fn new(config: &ArmConfig) -> Result<Self, ArmError> {
        let joints = config
            .joints
            .iter()
            .enumerate()
            .map(|(i, jc)| Joint::<G, P>::new(i, jc, config.base_pwm_freq_hz, config.initial_duty_pct, config.gain))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            joints,
            link_lengths: config.link_lengths(),
        })
    }

    /// Runs both calibration phases on every joint, then starts each
    /// joint's controller thread. Calibration failure is fatal.
    pub fn init(&mut self) -> Result<(), ArmError> {
        for (index, joint) in self.joints.iter_mut().enumerate() {
            log::info!("joint {index}: starting deadband calibration");
            let min_duty_pct = calibrate_movement(index, joint)?;
            joint
                .motor_mut()
                .expect("motor still owned during calibration")
                .apply_range_limits(min_duty_pct, 100.0)
                .map_err(ArmError::from)?;

            log::info!("joint {index}: starting angular zero calibration");
            calibrate_position(index, joint)?;
            joint.set_zero();

            joint.start_controller();
            log::info!("joint {index}: controller running");
        }
        Ok(())
    }

    /// Reads each joint's reference angle and runs forward kinematics.
    pub fn get_position(&self) -> Result<Point, ArmError> {
        let thetas: Vec<f64> = self
            .joints
            .iter()
            .map(|j| j.get_angle().to_radians())
            .collect();
        kinematics::forward(&thetas, &self.link_lengths).map_err(ArmError::from)
    }

    /// Runs inverse kinematics and updates every joint's reference angle.
    pub fn set_position(&mut self, target: &Point) -> Result<(), ArmError> {
        let previous: Vec<f64> = self
            .joints
            .iter()
            .map(|j| j.get_angle().to_radians())
            .collect();
        let thetas = kinematics::inverse(target, &self.link_lengths, &previous)?;
        for (joint, theta) in self.joints.iter().zip(thetas) {
            joint.set_angle(theta.to_degrees());
        }
        Ok(())
    }

    /// `set_position`, then polls `get_position` until it matches `target`
    /// within [`DEFAULT_TOLERANCE`]. Never times out; callers must cancel.
    pub fn set_position_sync(&mut self, target: &Point) -> Result<(), ArmError> {
        self.set_position(target)?;
        loop {
            let current = self.get_position()?;
            if current.eq_within(target, DEFAULT_TOLERANCE) {
                return Ok(());
            }
            thread::sleep(SYNC_POLL_INTERVAL);
        }
    }
}

/// Phase A: ramp duty up until the joint moves, then fine-tune down to the
/// deadband boundary. Returns the calibrated minimum duty, as a percentage.
fn calibrate_movement<G: GpioLine, P: PwmChannel>(
    index: usize,
    joint: &mut Joint<G, P>,
) -> Result<f64, ArmError> {
    let decoder = joint.decoder().clone();
    let motor = joint.motor_mut().expect("motor available during Phase A");

    let mut duty = 0.0;
    loop {
        duty += DEADBAND_COARSE_STEP_PCT;
        if duty > 100.0 {
            return Err(ArmError::from(CalibrationError::NoMovementDetected(index)));
        }
        motor.set_speed(duty).map_err(ArmError::from)?;
        let before = decoder.get_angle();
        thread::sleep(COARSE_PULSE);
        let after = decoder.get_angle();
        motor.stop().map_err(ArmError::from)?;
        if (after - before).abs() >= MOVEMENT_THRESHOLD_DEG {
            break;
        }
    }

    // Fine-tune downward from the coarse boundary until motion stops; the
    // last duty that still moved the joint is the calibrated deadband.
    let mut last_moving = duty;
    loop {
        duty -= DEADBAND_FINE_STEP_PCT;
        if duty <= DEADBAND_FINE_STEP_PCT + MOVEMENT_THRESHOLD_DEG {
            return Err(ArmError::from(CalibrationError::CannotStop(index)));
        }
        motor.set_speed(duty).map_err(ArmError::from)?;
        let before = decoder.get_angle();
        thread::sleep(FINE_PULSE);
        let after = decoder.get_angle();
        motor.stop().map_err(ArmError::from)?;
        if (after - before).abs() < MOVEMENT_THRESHOLD_DEG {
            return Ok(last_moving);
        }
        last_moving = duty;
    }
}

/// Phase B: drive at full speed until the angle stops changing (the
/// mechanical endstop has been reached).
fn calibrate_position<G: GpioLine, P: PwmChannel>(
    _index: usize,
    joint: &mut Joint<G, P>,
) -> Result<(), ArmError> {
    let decoder = joint.decoder().clone();
    let motor = joint.motor_mut().expect("motor available during Phase B");

    motor.set_speed(100.0).map_err(ArmError::from)?;
    loop {
        let before = decoder.get_angle();
        thread::sleep(FINE_PULSE);
        let after = decoder.get_angle();
        if (after - before).abs() < MOVEMENT_THRESHOLD_DEG {
            break;
        }
    }
    motor.stop().map_err(ArmError::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArmConfig;
    use crate::mock::{MockGpioLine, MockPwmChannel};

    #[test]
    fn construction_opens_every_joint() {
        let config = ArmConfig::demo_two_link();
        let arm: Arm<MockGpioLine, MockPwmChannel> = Arm::new(&config).unwrap();
        assert_eq!(arm.joints.len(), 2);
    }

    #[test]
    fn get_position_reflects_reference_angles_not_measured() {
        let config = ArmConfig::demo_two_link();
        let arm: Arm<MockGpioLine, MockPwmChannel> = Arm::new(&config).unwrap();
        // Both references start at 0 degrees: the tool point sits at full
        // extension along +x.
        let p = arm.get_position().unwrap();
        assert!((p.x - (0.015 + 0.015)).abs() < 1e-9);
        assert!(p.y.abs() < 1e-9);
    }
}
