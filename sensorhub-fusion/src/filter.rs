//! Complementary Attitude Filter
//!
//! ## Overview
//!
//! Keeps a unit quaternion rotating body-frame vectors into a world frame
//! whose z axis points up (away from gravity) and whose x axis points to
//! magnetic north when a magnetometer is in use.
//!
//! ```text
//! gyro  ──integrate──▶ ┌──────────┐
//! accel ──tilt fix───▶ │ attitude │ ──▶ orientation, rotation vectors,
//! mag   ──heading fix─▶ └──────────┘     gravity, linear acceleration
//! ```
//!
//! - **Gyroscope**: propagates the attitude by the measured body rate.
//! - **Accelerometer**: rotates the estimate a fraction of the way towards
//!   the tilt implied by the measured specific force.
//! - **Magnetometer**: rotates about world z a fraction of the way towards
//!   the measured heading.
//!
//! The first accelerometer sample (and, for filters using the magnetometer,
//! the first magnetometer sample) snap the estimate directly instead of
//! blending, so outputs are usable as soon as [`AttitudeFilter::has_estimate`]
//! turns true.

use crate::constants::{RAD_TO_DEG, STANDARD_GRAVITY};
use crate::math::{Quaternion, Vec3};

/// Attitude estimator over accel, optional gyro and optional mag
#[derive(Debug, Clone)]
pub struct AttitudeFilter {
    attitude: Quaternion,
    use_mag: bool,
    tilt_known: bool,
    heading_known: bool,
    accel_gain: f32,
    mag_gain: f32,
}

impl AttitudeFilter {
    /// Fresh filter; `use_mag` makes the estimate wait for a heading
    pub fn new(use_mag: bool, accel_gain: f32, mag_gain: f32) -> Self {
        Self {
            attitude: Quaternion::IDENTITY,
            use_mag,
            tilt_known: false,
            heading_known: false,
            accel_gain,
            mag_gain,
        }
    }

    /// Drop the estimate, keeping the configuration
    pub fn reset(&mut self, use_mag: bool) {
        self.attitude = Quaternion::IDENTITY;
        self.use_mag = use_mag;
        self.tilt_known = false;
        self.heading_known = false;
    }

    /// Whether a usable attitude is available
    pub fn has_estimate(&self) -> bool {
        self.tilt_known && (!self.use_mag || self.heading_known)
    }

    /// Current attitude, body to world
    pub fn attitude(&self) -> Quaternion {
        self.attitude
    }

    /// Propagate by body rate `omega` (rad/s) over `dt` seconds
    pub fn handle_gyro(&mut self, omega: Vec3, dt: f32) {
        if !self.tilt_known {
            return;
        }
        let step = Quaternion::from_rotation_vector(omega * dt);
        self.attitude = self.attitude.mul(step).normalized();
    }

    /// Correct tilt from a specific-force measurement (m/s²)
    pub fn handle_acc(&mut self, accel: Vec3, _dt: f32) {
        let Some(up_body) = accel.normalized() else {
            return;
        };

        if !self.tilt_known {
            self.attitude = Quaternion::between(up_body, Vec3::UP);
            self.tilt_known = true;
            return;
        }

        let up_world = self.attitude.rotate(up_body);
        let correction = Quaternion::between(up_world, Vec3::UP);
        self.attitude = blend(correction, self.accel_gain).mul(self.attitude).normalized();
    }

    /// Correct heading from a magnetic field measurement
    pub fn handle_mag(&mut self, field: Vec3, _dt: f32) {
        if !self.use_mag || !self.tilt_known {
            return;
        }
        let field_world = self.attitude.rotate(field);
        let horizontal = Vec3::new(field_world.x, field_world.y, 0.0);
        if horizontal.norm() < f32::EPSILON {
            return;
        }

        // Angle of the horizontal field from world x, taken off about world z
        let error = libm::atan2f(horizontal.y, horizontal.x);
        let gain = if self.heading_known { self.mag_gain } else { 1.0 };
        let correction = Quaternion::from_axis_angle(Vec3::UP, -error * gain);
        self.attitude = correction.mul(self.attitude).normalized();
        self.heading_known = true;
    }

    /// Gravity in the body frame (m/s²), as an accelerometer at rest reads it
    pub fn gravity(&self) -> Vec3 {
        self.attitude.rotate_inverse(Vec3::UP) * STANDARD_GRAVITY
    }

    /// Specific force with gravity removed (m/s²)
    pub fn linear_acceleration(&self, accel: Vec3) -> Vec3 {
        accel - self.gravity()
    }

    /// Azimuth, pitch and roll in degrees; azimuth in `0..360`
    pub fn orientation(&self) -> Vec3 {
        let q = self.attitude;
        let yaw = libm::atan2f(
            2.0 * (q.w * q.z + q.x * q.y),
            1.0 - 2.0 * (q.y * q.y + q.z * q.z),
        );
        let pitch = libm::asinf((2.0 * (q.w * q.y - q.z * q.x)).clamp(-1.0, 1.0));
        let roll = libm::atan2f(
            2.0 * (q.w * q.x + q.y * q.z),
            1.0 - 2.0 * (q.x * q.x + q.y * q.y),
        );

        let mut azimuth = -yaw * RAD_TO_DEG;
        if azimuth < 0.0 {
            azimuth += 360.0;
        }
        Vec3::new(azimuth, pitch * RAD_TO_DEG, roll * RAD_TO_DEG)
    }

    /// Vector part of the attitude with a non-negative scalar part
    pub fn rotation_vector(&self) -> Vec3 {
        let q = self.attitude.canonical();
        Vec3::new(q.x, q.y, q.z)
    }
}

/// Scale a correction rotation by `gain` (small-angle)
fn blend(correction: Quaternion, gain: f32) -> Quaternion {
    let c = correction.canonical();
    Quaternion {
        w: 1.0,
        x: c.x * gain,
        y: c.y * gain,
        z: c.z * gain,
    }
    .normalized()
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::f32::consts::FRAC_PI_2;

    fn close(a: Vec3, b: Vec3, tol: f32) -> bool {
        (a - b).norm() < tol
    }

    #[test]
    fn flat_device_reads_gravity_on_z() {
        let mut filter = AttitudeFilter::new(false, 0.1, 0.1);
        assert!(!filter.has_estimate());
        filter.handle_acc(Vec3::new(0.0, 0.0, 9.8), 0.01);
        assert!(filter.has_estimate());

        assert!(close(filter.gravity(), Vec3::new(0.0, 0.0, STANDARD_GRAVITY), 1e-4));
        assert!(close(filter.linear_acceleration(Vec3::new(1.0, 0.0, STANDARD_GRAVITY)), Vec3::new(1.0, 0.0, 0.0), 1e-4));
    }

    #[test]
    fn tilted_device_gravity_follows_accel() {
        let mut filter = AttitudeFilter::new(false, 0.1, 0.1);
        filter.handle_acc(Vec3::new(0.0, 9.8, 0.0), 0.01);
        let g = filter.gravity();
        assert!(close(g, Vec3::new(0.0, STANDARD_GRAVITY, 0.0), 1e-3));
        // Pitched up 90 degrees about x reads as roll/pitch, never NaN
        let o = filter.orientation();
        assert!(o.x.is_finite() && o.y.is_finite() && o.z.is_finite());
    }

    #[test]
    fn mag_filter_waits_for_heading() {
        let mut filter = AttitudeFilter::new(true, 0.1, 0.1);
        filter.handle_acc(Vec3::new(0.0, 0.0, 9.8), 0.01);
        assert!(!filter.has_estimate());

        // Field pointing along body y: device is turned 90 degrees from north
        filter.handle_mag(Vec3::new(0.0, 30.0, -40.0), 0.02);
        assert!(filter.has_estimate());
        let north_world = filter.attitude().rotate(Vec3::new(0.0, 30.0, 0.0));
        assert!(north_world.y.abs() < 1e-3);
        assert!(north_world.x > 0.0);
    }

    #[test]
    fn gyro_integrates_yaw() {
        let mut filter = AttitudeFilter::new(false, 0.0, 0.0);
        filter.handle_acc(Vec3::new(0.0, 0.0, 9.8), 0.01);
        for _ in 0..100 {
            filter.handle_gyro(Vec3::new(0.0, 0.0, FRAC_PI_2), 0.01);
        }
        let x_world = filter.attitude().rotate(Vec3::new(1.0, 0.0, 0.0));
        assert!(close(x_world, Vec3::new(0.0, 1.0, 0.0), 1e-3));
    }

    #[test]
    fn accel_pulls_tilt_back() {
        let mut filter = AttitudeFilter::new(false, 0.5, 0.0);
        filter.handle_acc(Vec3::new(0.0, 0.0, 9.8), 0.01);
        filter.handle_gyro(Vec3::new(0.3, 0.0, 0.0), 1.0);
        let tilted = filter.gravity();

        for _ in 0..50 {
            filter.handle_acc(Vec3::new(0.0, 0.0, 9.8), 0.01);
        }
        let settled = filter.gravity();
        assert!(settled.z > tilted.z);
        assert!(close(settled, Vec3::new(0.0, 0.0, STANDARD_GRAVITY), 1e-2));
    }
}
