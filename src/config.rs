//! Static per-joint and per-arm configuration.
//!
//! This is plain data: it carries no sysfs handles and performs no I/O other
//! than the optional TOML loading convenience below.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::ArmError;

/// Number of quadrature edges counted per encoder cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum EdgeRate {
    /// Count only one channel's rising edges (2x decoding).
    Rising2x = 2,
    /// Count both edges on both channels (4x decoding).
    Both4x = 4,
}

/// Static configuration for a single joint.
#[derive(Debug, Clone, Deserialize)]
pub struct JointConfig {
    /// sysfs GPIO pin number for quadrature channel A.
    pub encoder_pin_a: u32,
    /// sysfs GPIO pin number for quadrature channel B.
    pub encoder_pin_b: u32,
    /// Encoder counts per full revolution (segments).
    pub segments_per_revolution: u32,
    /// 2x or 4x decoding.
    #[serde(default = "default_edge_rate")]
    pub edge_rate: EdgeRate,
    /// sysfs PWM channel driving the "CW" (channel A) side of the H-bridge.
    pub motor_pwm_a: u32,
    /// sysfs PWM channel driving the "CCW" (channel B) side of the H-bridge.
    pub motor_pwm_b: u32,
    /// Physical link length, in meters.
    pub link_length_m: f64,
}

fn default_edge_rate() -> EdgeRate {
    EdgeRate::Both4x
}

/// Static configuration for the whole arm.
#[derive(Debug, Clone, Deserialize)]
pub struct ArmConfig {
    pub joints: Vec<JointConfig>,
    /// PWM frequency shared by every motor channel, in Hz.
    #[serde(default = "default_base_pwm_freq_hz")]
    pub base_pwm_freq_hz: f64,
    /// Initial duty applied to both H-bridge channels at construction, as a
    /// percentage of the period. The bridge is re-zeroed immediately after,
    /// this only mirrors the corpus' startup sequencing.
    #[serde(default = "default_initial_duty_pct")]
    pub initial_duty_pct: f64,
    /// Proportional gain used by every joint's controller loop.
    #[serde(default = "default_gain")]
    pub gain: f64,
}

fn default_base_pwm_freq_hz() -> f64 {
    25_000.0
}

fn default_initial_duty_pct() -> f64 {
    50.0
}

fn default_gain() -> f64 {
    8.0
}

impl ArmConfig {
    /// Parses an arm configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ArmError> {
        let cfg: ArmConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads and parses an arm configuration from a TOML file on disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ArmError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), ArmError> {
        if self.joints.is_empty() {
            return Err(ArmError::EmptyArm);
        }
        Ok(())
    }

    /// Number of joints (N).
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// Link lengths in joint order, for use by the kinematics solver.
    pub fn link_lengths(&self) -> Vec<f64> {
        self.joints.iter().map(|j| j.link_length_m).collect()
    }

    /// The demo 2-link geometry used throughout the corpus' fixtures and
    /// tests: L1 = L2 = 0.015 m, 64*29 = 1856 segments, 25 kHz base frequency.
    pub fn demo_two_link() -> Self {
        let joint = |pin_a, pin_b, pwm_a, pwm_b| JointConfig {
            encoder_pin_a: pin_a,
            encoder_pin_b: pin_b,
            segments_per_revolution: 64 * 29,
            edge_rate: EdgeRate::Both4x,
            motor_pwm_a: pwm_a,
            motor_pwm_b: pwm_b,
            link_length_m: 0.015,
        };
        ArmConfig {
            joints: vec![joint(24, 25, 3, 7), joint(26, 27, 1, 5)],
            base_pwm_freq_hz: default_base_pwm_freq_hz(),
            initial_duty_pct: default_initial_duty_pct(),
            gain: default_gain(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_joint_list_is_rejected() {
        let toml = "joints = []\n";
        let err = ArmConfig::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, ArmError::EmptyArm));
    }

    #[test]
    fn parses_minimal_single_joint_config() {
        let toml = r#"
            [[joints]]
            encoder_pin_a = 24
            encoder_pin_b = 25
            segments_per_revolution = 1856
            motor_pwm_a = 3
            motor_pwm_b = 7
            link_length_m = 0.015
        "#;
        let cfg = ArmConfig::from_toml_str(toml).unwrap();
        assert_eq!(cfg.joint_count(), 1);
        assert_eq!(cfg.base_pwm_freq_hz, 25_000.0);
        assert_eq!(cfg.joints[0].edge_rate, EdgeRate::Both4x);
    }

    #[test]
    fn demo_geometry_matches_corpus_fixture() {
        let cfg = ArmConfig::demo_two_link();
        assert_eq!(cfg.joint_count(), 2);
        assert_eq!(cfg.link_lengths(), vec![0.015, 0.015]);
        assert_eq!(cfg.joints[0].segments_per_revolution, 1856);
    }
}
