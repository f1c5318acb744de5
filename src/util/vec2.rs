use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

/// 2D vector used for agent positions, velocities and steering forces
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };
    pub const ONE: Vec2 = Vec2 { x: 1.0, y: 1.0 };

    #[inline]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub const fn splat(v: f32) -> Self {
        Self { x: v, y: v }
    }

    #[inline]
    pub fn from_angle(angle: f32) -> Self {
        Self {
            x: angle.cos(),
            y: angle.sin(),
        }
    }

    #[inline]
    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    #[inline]
    pub fn length_sq(&self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len > 0.0 {
            Self {
                x: self.x / len,
                y: self.y / len,
            }
        } else {
            Self::ZERO
        }
    }

    #[inline]
    pub fn dot(&self, other: Vec2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    /// 2D cross product (returns scalar z-component)
    #[inline]
    pub fn cross(&self, other: Vec2) -> f32 {
        self.x * other.y - self.y * other.x
    }

    #[inline]
    pub fn distance_sq_to(&self, other: Vec2) -> f32 {
        (*self - other).length_sq()
    }

    /// Rescale to a speed within `[min, max]`.
    /// A zero vector has no heading and is returned unchanged.
    pub fn clamp_length_min_max(&self, min: f32, max: f32) -> Self {
        let len = self.length();
        if len <= 0.0 {
            return *self;
        }
        let clamped = len.clamp(min, max);
        *self * (clamped / len)
    }

    pub fn rotate(&self, angle: f32) -> Self {
        let (sin, cos) = (angle.sin(), angle.cos());
        Self {
            x: self.x * cos - self.y * sin,
            y: self.x * sin + self.y * cos,
        }
    }

    /// Signed angle from this vector to another (radians, counter-clockwise positive)
    pub fn angle_to(&self, other: Vec2) -> f32 {
        (self.cross(other)).atan2(self.dot(other))
    }

    /// Turn this vector's heading toward `desired` by at most `max_angle` radians,
    /// taking the magnitude of `desired`.
    pub fn turn_towards(&self, desired: Vec2, max_angle: f32) -> Self {
        let from_len = self.length();
        let to_len = desired.length();
        if from_len <= f32::EPSILON || to_len <= f32::EPSILON {
            return desired;
        }
        let angle = self.angle_to(desired);
        if angle.abs() <= max_angle {
            return desired;
        }
        (*self * (to_len / from_len)).rotate(max_angle.copysign(angle))
    }

    /// Component-wise min
    pub fn min(&self, other: Vec2) -> Self {
        Self {
            x: self.x.min(other.x),
            y: self.y.min(other.y),
        }
    }

    /// Component-wise max
    pub fn max(&self, other: Vec2) -> Self {
        Self {
            x: self.x.max(other.x),
            y: self.y.max(other.y),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Check if vector is approximately equal to another
    pub fn approx_eq(&self, other: Vec2, epsilon: f32) -> bool {
        (self.x - other.x).abs() < epsilon && (self.y - other.y).abs() < epsilon
    }
}

impl Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}

impl Div<f32> for Vec2 {
    type Output = Self;
    fn div(self, rhs: f32) -> Self {
        Self {
            x: self.x / rhs,
            y: self.y / rhs,
        }
    }
}

impl Neg for Vec2 {
    type Output = Self;
    fn neg(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
        }
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl MulAssign<f32> for Vec2 {
    fn mul_assign(&mut self, rhs: f32) {
        self.x *= rhs;
        self.y *= rhs;
    }
}

impl DivAssign<f32> for Vec2 {
    fn div_assign(&mut self, rhs: f32) {
        self.x /= rhs;
        self.y /= rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_normalize_zero() {
        assert_eq!(Vec2::ZERO.normalize(), Vec2::ZERO);
    }

    #[test]
    fn test_clamp_length_min_max() {
        let slow = Vec2::new(0.1, 0.0).clamp_length_min_max(1.0, 2.0);
        assert!(slow.approx_eq(Vec2::new(1.0, 0.0), 1e-5));

        let fast = Vec2::new(0.0, 10.0).clamp_length_min_max(1.0, 2.0);
        assert!(fast.approx_eq(Vec2::new(0.0, 2.0), 1e-5));

        // Zero velocity has no heading to scale
        assert_eq!(Vec2::ZERO.clamp_length_min_max(1.0, 2.0), Vec2::ZERO);
    }

    #[test]
    fn test_turn_towards_bounded() {
        let heading = Vec2::new(1.0, 0.0);
        let desired = Vec2::new(-1.0, 0.01);

        let turned = heading.turn_towards(desired, 0.1);
        assert!((heading.angle_to(turned) - 0.1).abs() < 1e-4);
        assert!((turned.length() - desired.length()).abs() < 1e-4);
    }

    #[test]
    fn test_turn_towards_within_limit() {
        let heading = Vec2::new(1.0, 0.0);
        let desired = Vec2::new(0.0, 2.0);
        assert_eq!(heading.turn_towards(desired, PI), desired);
        assert!((heading.angle_to(desired) - FRAC_PI_2).abs() < 1e-5);
    }

    #[test]
    fn test_ops() {
        let mut v = Vec2::new(3.0, 4.0);
        assert_eq!(v.length(), 5.0);
        v /= 5.0;
        assert!(v.approx_eq(Vec2::new(0.6, 0.8), 1e-6));
        v *= 10.0;
        v -= Vec2::ONE;
        assert!(v.approx_eq(Vec2::new(5.0, 7.0), 1e-5));
        assert_eq!(-v + v, Vec2::ZERO);
    }

    #[test]
    fn test_min_max() {
        let a = Vec2::new(1.0, 5.0);
        let b = Vec2::new(3.0, 2.0);
        assert_eq!(a.min(b), Vec2::new(1.0, 2.0));
        assert_eq!(a.max(b), Vec2::new(3.0, 5.0));
    }
}
