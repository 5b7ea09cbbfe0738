//! H-bridge motor abstraction (§4.2): two PWM channels mapped onto a
//! calibrated duty range, with atomic direction switching.

use crate::decoder::Direction;
use crate::error::MotorError;
use crate::sysfs::pwm::PwmChannel;

/// Observable run state, derived from the two channels' duty cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorState {
    Running,
    Stopped,
}

/// A DC motor driven through an H-bridge as two complementary PWM channels.
///
/// Channel `a` drives [`Direction::Cw`], channel `b` drives
/// [`Direction::Ccw`]; at most one carries nonzero duty at a time.
pub struct HBridgeMotor<P: PwmChannel> {
    pwm_a: P,
    pwm_b: P,
    period_ns: u64,
    min_duty_ns: u64,
    max_duty_ns: u64,
    direction: Direction,
    speed_backup: f64,
}

impl<P: PwmChannel> HBridgeMotor<P> {
    /// Opens both PWM channels and sets the shared period from
    /// `base_freq_hz`. Per §4.2, both channels are first raised to
    /// `initial_duty_pct` of the period, then immediately re-zeroed — this
    /// mirrors the corpus' startup sequencing, leaving the bridge at rest,
    /// direction CW, full duty range.
    pub fn new(
        channel_a: u32,
        channel_b: u32,
        base_freq_hz: f64,
        initial_duty_pct: f64,
    ) -> Result<Self, MotorError> {
        let period_ns = (1.0e9 / base_freq_hz).round() as u64;
        let initial_duty_ns = (period_ns as f64 * initial_duty_pct / 100.0).round() as u64;
        let mut pwm_a = P::open(channel_a)?;
        let mut pwm_b = P::open(channel_b)?;

        pwm_a.set_period_ns(period_ns)?;
        pwm_b.set_period_ns(period_ns)?;
        pwm_a.set_duty_ns(initial_duty_ns)?;
        pwm_b.set_duty_ns(initial_duty_ns)?;
        pwm_a.set_enabled(true)?;
        pwm_b.set_enabled(true)?;
        pwm_a.set_duty_ns(0)?;
        pwm_b.set_duty_ns(0)?;

        Ok(Self {
            pwm_a,
            pwm_b,
            period_ns,
            min_duty_ns: 0,
            max_duty_ns: period_ns,
            direction: Direction::Cw,
            speed_backup: 0.0,
        })
    }

    fn active(&mut self) -> &mut P {
        match self.direction {
            Direction::Cw => &mut self.pwm_a,
            Direction::Ccw => &mut self.pwm_b,
        }
    }

    fn inactive(&mut self) -> &mut P {
        match self.direction {
            Direction::Cw => &mut self.pwm_b,
            Direction::Ccw => &mut self.pwm_a,
        }
    }

    fn duty_for_percent(&self, percent: f64) -> u64 {
        let span = self.max_duty_ns.saturating_sub(self.min_duty_ns) as f64;
        let raw = self.min_duty_ns as f64 + span * percent / 100.0;
        raw.clamp(self.min_duty_ns as f64, self.max_duty_ns as f64).round() as u64
    }

    fn percent_for_duty(&self, duty_ns: u64) -> f64 {
        let span = self.max_duty_ns.saturating_sub(self.min_duty_ns);
        if span == 0 {
            return 0.0;
        }
        100.0 * (duty_ns.saturating_sub(self.min_duty_ns)) as f64 / span as f64
    }

    /// Re-applies the last commanded speed to the active channel.
    pub fn start(&mut self) -> Result<(), MotorError> {
        let speed = self.speed_backup;
        self.set_speed(speed)
    }

    /// Saves the current speed and zeroes both channels.
    pub fn stop(&mut self) -> Result<(), MotorError> {
        self.speed_backup = self.get_speed()?;
        self.pwm_a.set_duty_ns(0)?;
        self.pwm_b.set_duty_ns(0)?;
        Ok(())
    }

    /// Commands the active channel to `percent` of the calibrated range.
    pub fn set_speed(&mut self, percent: f64) -> Result<(), MotorError> {
        if !(0.0..=100.0).contains(&percent) {
            return Err(MotorError::InvalidSpeed(percent));
        }
        let duty = self.duty_for_percent(percent);
        self.active().set_duty_ns(duty)?;
        self.speed_backup = percent;
        Ok(())
    }

    /// Current commanded speed, derived from the active channel's duty.
    pub fn get_speed(&mut self) -> Result<f64, MotorError> {
        let direction = self.direction;
        let duty = match direction {
            Direction::Cw => self.pwm_a.duty_ns()?,
            Direction::Ccw => self.pwm_b.duty_ns()?,
        };
        Ok(self.percent_for_duty(duty))
    }

    /// Switches the active channel, preserving the last commanded speed.
    /// The outgoing channel is zeroed before the incoming one is raised.
    pub fn set_direction(&mut self, direction: Direction) -> Result<(), MotorError> {
        if direction == self.direction {
            return Ok(());
        }
        let speed = self.get_speed()?;
        self.inactive().set_duty_ns(0)?;
        self.active().set_duty_ns(0)?;
        self.direction = direction;
        self.speed_backup = speed;
        self.set_speed(speed)
    }

    pub fn get_direction(&self) -> Direction {
        self.direction
    }

    /// Updates the calibrated `[min, max]` duty window, given as percentages
    /// of the PWM period. `lo` must be strictly less than `hi`.
    pub fn apply_range_limits(&mut self, lo_pct: f64, hi_pct: f64) -> Result<(), MotorError> {
        if lo_pct >= hi_pct {
            return Err(MotorError::InvalidRange(lo_pct, hi_pct));
        }
        self.min_duty_ns = (self.period_ns as f64 * lo_pct / 100.0).round() as u64;
        self.max_duty_ns = (self.period_ns as f64 * hi_pct / 100.0).round() as u64;
        Ok(())
    }

    /// `Stopped` iff both channels currently carry equal duty (in practice,
    /// both zero).
    pub fn get_state(&self) -> Result<MotorState, MotorError> {
        let a = self.pwm_a.duty_ns()?;
        let b = self.pwm_b.duty_ns()?;
        Ok(if a == b {
            MotorState::Stopped
        } else {
            MotorState::Running
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockPwmChannel, PwmWrite};
    use crate::sysfs::pwm::PwmChannel as _;

    fn motor() -> HBridgeMotor<MockPwmChannel> {
        HBridgeMotor::new(0, 1, 1000.0, 0.0).unwrap()
    }

    #[test]
    fn speed_round_trips_within_one_percent() {
        let mut m = motor();
        for s in 0..=100 {
            let s = s as f64;
            m.set_speed(s).unwrap();
            let got = m.get_speed().unwrap();
            assert!((got - s).abs() <= 1.0, "s={s} got={got}");
        }
    }

    #[test]
    fn invalid_speed_is_rejected_and_state_unchanged() {
        let mut m = motor();
        m.set_speed(40.0).unwrap();
        let err = m.set_speed(150.0).unwrap_err();
        assert!(matches!(err, MotorError::InvalidSpeed(_)));
        assert!((m.get_speed().unwrap() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn direction_switch_zeroes_outgoing_channel_before_incoming() {
        let mut m = motor();
        m.set_speed(60.0).unwrap();
        m.set_direction(Direction::Ccw).unwrap();
        assert_eq!(m.get_direction(), Direction::Ccw);

        // Every Duty(0) write on pwm_a happened before any nonzero Duty
        // write on pwm_b in this switch.
        let writes = m.pwm_a.writes();
        let last_a_zero = writes.iter().rposition(|w| *w == PwmWrite::Duty(0));
        assert!(last_a_zero.is_some());

        let b_writes = m.pwm_b.writes();
        let first_b_nonzero = b_writes
            .iter()
            .position(|w| matches!(w, PwmWrite::Duty(d) if *d > 0));
        assert!(first_b_nonzero.is_some());
    }

    #[test]
    fn range_remap_matches_calibrated_endpoints() {
        let mut m = motor();
        m.apply_range_limits(10.0, 90.0).unwrap();
        m.set_speed(0.0).unwrap();
        assert_eq!(m.pwm_a.duty_ns().unwrap(), 100_000);
        m.set_speed(100.0).unwrap();
        assert_eq!(m.pwm_a.duty_ns().unwrap(), 900_000);
        m.set_speed(50.0).unwrap();
        assert_eq!(m.pwm_a.duty_ns().unwrap(), 500_000);
    }

    #[test]
    fn invalid_range_is_rejected() {
        let mut m = motor();
        let err = m.apply_range_limits(90.0, 10.0).unwrap_err();
        assert!(matches!(err, MotorError::InvalidRange(_, _)));
    }

    #[test]
    fn stopped_state_when_both_channels_zero() {
        let m = motor();
        assert_eq!(m.get_state().unwrap(), MotorState::Stopped);
    }
}
