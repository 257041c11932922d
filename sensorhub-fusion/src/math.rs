//! Small fixed-size vector and quaternion types
//!
//! Just enough linear algebra for the attitude filter. All operations are
//! `no_std` and go through `libm` for transcendental functions.

use core::ops::{Add, Mul, Neg, Sub};

/// Three-component vector
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vec3 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vec3 {
    /// Zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// World "up"
    pub const UP: Self = Self::new(0.0, 0.0, 1.0);

    /// Build from components
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Dot product
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Cross product
    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Euclidean length
    pub fn norm(self) -> f32 {
        libm::sqrtf(self.dot(self))
    }

    /// Unit vector in the same direction, `None` for (near) zero vectors
    pub fn normalized(self) -> Option<Self> {
        let n = self.norm();
        if n < f32::EPSILON {
            None
        } else {
            Some(self * (1.0 / n))
        }
    }

    /// Linear interpolation; `t = 0` gives `self`, `t = 1` gives `other`
    pub fn lerp(self, other: Self, t: f32) -> Self {
        self + (other - self) * t
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, k: f32) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }
}

impl Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// Unit quaternion rotating body-frame vectors into the world frame
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Quaternion {
    /// Scalar part
    pub w: f32,
    /// Vector part, x
    pub x: f32,
    /// Vector part, y
    pub y: f32,
    /// Vector part, z
    pub z: f32,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quaternion {
    /// No rotation
    pub const IDENTITY: Self = Self { w: 1.0, x: 0.0, y: 0.0, z: 0.0 };

    /// Rotation of `angle` radians about unit `axis`
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let half = angle * 0.5;
        let s = libm::sinf(half);
        Self {
            w: libm::cosf(half),
            x: axis.x * s,
            y: axis.y * s,
            z: axis.z * s,
        }
    }

    /// Rotation by the vector `v` (axis × angle)
    pub fn from_rotation_vector(v: Vec3) -> Self {
        match v.normalized() {
            Some(axis) => Self::from_axis_angle(axis, v.norm()),
            None => Self::IDENTITY,
        }
    }

    /// Smallest rotation taking unit vector `from` onto unit vector `to`
    pub fn between(from: Vec3, to: Vec3) -> Self {
        let axis = from.cross(to);
        let w = 1.0 + from.dot(to);
        if w < 1e-6 {
            // Opposite vectors: turn half way round any perpendicular axis
            let perp = if libm::fabsf(from.x) < 0.9 { Vec3::new(1.0, 0.0, 0.0) } else { Vec3::new(0.0, 1.0, 0.0) };
            let axis = from.cross(perp).normalized().unwrap_or(Vec3::UP);
            return Self::from_axis_angle(axis, core::f32::consts::PI);
        }
        Self { w, x: axis.x, y: axis.y, z: axis.z }.normalized()
    }

    /// Hamilton product `self ⊗ rhs`
    pub fn mul(self, rhs: Self) -> Self {
        Self {
            w: self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            x: self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            y: self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            z: self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        }
    }

    /// Inverse of a unit quaternion
    pub fn conjugate(self) -> Self {
        Self { w: self.w, x: -self.x, y: -self.y, z: -self.z }
    }

    /// Rescale to unit length
    pub fn normalized(self) -> Self {
        let n = libm::sqrtf(self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z);
        if n < f32::EPSILON {
            return Self::IDENTITY;
        }
        Self {
            w: self.w / n,
            x: self.x / n,
            y: self.y / n,
            z: self.z / n,
        }
    }

    /// Rotate a body-frame vector into the world frame
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self { w: 0.0, x: v.x, y: v.y, z: v.z };
        let r = self.mul(p).mul(self.conjugate());
        Vec3::new(r.x, r.y, r.z)
    }

    /// Rotate a world-frame vector into the body frame
    pub fn rotate_inverse(self, v: Vec3) -> Vec3 {
        self.conjugate().rotate(v)
    }

    /// Same rotation with a non-negative scalar part
    pub fn canonical(self) -> Self {
        if self.w < 0.0 {
            Self { w: -self.w, x: -self.x, y: -self.y, z: -self.z }
        } else {
            self
        }
    }
}
