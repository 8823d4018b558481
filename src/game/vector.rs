//! 2D vector math used by the simulation

use std::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// Immutable pair of world-space components
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

impl Vector2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Unit vector for a heading in degrees (0° points along +X)
    pub fn from_heading(degrees: f32) -> Self {
        let rad = degrees.to_radians();
        Self::new(rad.cos(), rad.sin())
    }

    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y
    }

    pub fn distance_squared(self, other: Self) -> f32 {
        (other - self).length_squared()
    }

    pub fn distance(self, other: Self) -> f32 {
        self.distance_squared(other).sqrt()
    }

    /// Unit-length copy, or zero when the vector is too short to normalize
    pub fn normalized(self) -> Self {
        let len = self.length();
        if len <= f32::EPSILON {
            Self::ZERO
        } else {
            self * (1.0 / len)
        }
    }

    /// Scale down so the magnitude never exceeds `max`
    pub fn clamp_magnitude(self, max: f32) -> Self {
        let len_sq = self.length_squared();
        if len_sq <= max * max {
            return self;
        }
        self * (max / len_sq.sqrt())
    }
}

impl Add for Vector2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vector2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vector2 {
    type Output = Self;

    fn mul(self, k: f32) -> Self {
        Self::new(self.x * k, self.y * k)
    }
}

impl Neg for Vector2 {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

impl AddAssign for Vector2 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Vector2 {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl MulAssign<f32> for Vector2 {
    fn mul_assign(&mut self, k: f32) {
        *self = *self * k;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_magnitude_keeps_short_vectors() {
        let v = Vector2::new(3.0, 4.0);
        assert_eq!(v.clamp_magnitude(10.0), v);
    }

    #[test]
    fn clamp_magnitude_scales_long_vectors() {
        let v = Vector2::new(30.0, 40.0).clamp_magnitude(5.0);
        assert!((v.length() - 5.0).abs() < 1e-4);
        assert!((v.x - 3.0).abs() < 1e-4);
        assert!((v.y - 4.0).abs() < 1e-4);
    }

    #[test]
    fn normalizing_zero_yields_zero() {
        assert_eq!(Vector2::ZERO.normalized(), Vector2::ZERO);
        let n = Vector2::new(0.0, -2.0).normalized();
        assert!((n.y + 1.0).abs() < 1e-6);
    }

    #[test]
    fn heading_zero_points_along_x() {
        let v = Vector2::from_heading(0.0);
        assert!((v.x - 1.0).abs() < 1e-6);
        assert!(v.y.abs() < 1e-6);

        let v = Vector2::from_heading(90.0);
        assert!(v.x.abs() < 1e-6);
        assert!((v.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn distance_squared_is_symmetric() {
        let a = Vector2::new(1.0, 2.0);
        let b = Vector2::new(4.0, 6.0);
        assert_eq!(a.distance_squared(b), 25.0);
        assert_eq!(b.distance_squared(a), 25.0);
        assert_eq!(a.distance(b), 5.0);
    }
}
