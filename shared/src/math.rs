use serde::{Deserialize, Serialize};

///Represents a vector in 3D space.
/// The y-axis points up; yaw rotates around it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);
    pub const UP: Vec3 = Vec3::new(0.0, 1.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    ///Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    ///Returns the normalized vector, or zero for a zero-length input.
    pub fn normalize(&self) -> Vec3 {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vec3::ZERO
        } else {
            self.scale(1.0 / mag)
        }
    }

    ///Returns the scaled vector.
    pub fn scale(&self, scalar: f32) -> Vec3 {
        Vec3::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }

    ///Returns the sum of two vectors.
    pub fn add(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    ///Returns `self - other`.
    pub fn sub(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn dot(&self, other: &Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn distance(&self, other: &Vec3) -> f32 {
        self.sub(other).magnitude()
    }

    /// Same vector with the vertical component dropped.
    pub fn flat(&self) -> Vec3 {
        Vec3::new(self.x, 0.0, self.z)
    }

    /// Unit forward vector on the ground plane for a yaw in degrees.
    /// Yaw 0 faces +z, positive yaw turns toward +x.
    pub fn from_yaw(yaw_degrees: f32) -> Vec3 {
        let rad = yaw_degrees.to_radians();
        Vec3::new(rad.sin(), 0.0, rad.cos())
    }

    /// Angle between two vectors in degrees, 0 when either is zero-length.
    pub fn angle_between(&self, other: &Vec3) -> f32 {
        let denom = self.magnitude() * other.magnitude();
        if denom == 0.0 {
            return 0.0;
        }
        (self.dot(other) / denom).clamp(-1.0, 1.0).acos().to_degrees()
    }
}

/// Moves `current` toward `target` by at most `max_delta`, never overshooting.
pub fn move_towards(current: Vec3, target: Vec3, max_delta: f32) -> Vec3 {
    let to_target = target.sub(&current);
    let dist = to_target.magnitude();
    if dist <= max_delta || dist == 0.0 {
        target
    } else {
        current.add(&to_target.scale(max_delta / dist))
    }
}

/// Scalar counterpart of [`move_towards`].
pub fn move_towards_f32(current: f32, target: f32, max_delta: f32) -> f32 {
    if (target - current).abs() <= max_delta {
        target
    } else {
        current + (target - current).signum() * max_delta
    }
}

/// Linear RGBA colour, every channel nominally in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    /// All channels zero. Used on the wire as "pick one for me".
    pub const RANDOM_SENTINEL: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);
    pub const GRAY: Color = Color::rgba(0.5, 0.5, 0.5, 1.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn is_random_sentinel(&self) -> bool {
        *self == Color::RANDOM_SENTINEL
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }

    /// Uppercase `RRGGBB` hex string, alpha ignored.
    pub fn to_hex_rgb(&self) -> String {
        let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!(
            "{:02X}{:02X}{:02X}",
            channel(self.r),
            channel(self.g),
            channel(self.b)
        )
    }
}

///Axis-aligned box described by its center and half extents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub center: Vec3,
    pub half_extents: Vec3,
}

impl Aabb {
    pub const fn new(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            center,
            half_extents,
        }
    }

    pub fn contains(&self, point: &Vec3) -> bool {
        (point.x - self.center.x).abs() <= self.half_extents.x
            && (point.y - self.center.y).abs() <= self.half_extents.y
            && (point.z - self.center.z).abs() <= self.half_extents.z
    }

    /// True when the point lies inside the box footprint on the ground plane.
    pub fn contains_flat(&self, point: &Vec3) -> bool {
        (point.x - self.center.x).abs() <= self.half_extents.x
            && (point.z - self.center.z).abs() <= self.half_extents.z
    }

    pub fn top(&self) -> f32 {
        self.center.y + self.half_extents.y
    }

    /// Outward normal of the face closest to `point`.
    /// Picks the axis with the shallowest penetration, like an AABB contact resolve.
    pub fn surface_normal(&self, point: &Vec3) -> Vec3 {
        let d = point.sub(&self.center);
        let overlap_x = self.half_extents.x - d.x.abs();
        let overlap_y = self.half_extents.y - d.y.abs();
        let overlap_z = self.half_extents.z - d.z.abs();

        if overlap_x <= overlap_y && overlap_x <= overlap_z {
            Vec3::new(d.x.signum(), 0.0, 0.0)
        } else if overlap_y <= overlap_z {
            Vec3::new(0.0, d.y.signum(), 0.0)
        } else {
            Vec3::new(0.0, 0.0, d.z.signum())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_normalize_zero_vector() {
        assert_eq!(Vec3::ZERO.normalize(), Vec3::ZERO);
    }

    #[test]
    fn test_from_yaw() {
        let forward = Vec3::from_yaw(0.0);
        assert_approx_eq!(forward.z, 1.0, 1e-6);
        let right = Vec3::from_yaw(90.0);
        assert_approx_eq!(right.x, 1.0, 1e-6);
        assert_approx_eq!(right.z, 0.0, 1e-6);
    }

    #[test]
    fn test_angle_between() {
        let a = Vec3::new(0.0, 0.0, 1.0);
        let b = Vec3::new(0.0, 0.0, -1.0);
        assert_approx_eq!(a.angle_between(&b), 180.0, 1e-3);
        assert_approx_eq!(a.angle_between(&Vec3::new(1.0, 0.0, 0.0)), 90.0, 1e-3);
    }

    #[test]
    fn test_move_towards_does_not_overshoot() {
        let target = Vec3::new(0.0, 4.0, 0.0);
        let mut pos = Vec3::ZERO;
        for _ in 0..10 {
            pos = move_towards(pos, target, 1.5);
        }
        assert_eq!(pos, target);

        let halfway = move_towards(Vec3::ZERO, target, 1.0);
        assert_approx_eq!(halfway.y, 1.0, 1e-6);
    }

    #[test]
    fn test_move_towards_f32() {
        assert_eq!(move_towards_f32(0.0, 2.0, 5.0), 2.0);
        assert_approx_eq!(move_towards_f32(2.0, 0.0, 0.5), 1.5, 1e-6);
    }

    #[test]
    fn test_color_hex() {
        assert_eq!(Color::rgba(1.0, 0.0, 0.5, 1.0).to_hex_rgb(), "FF0080");
        assert!(Color::RANDOM_SENTINEL.is_random_sentinel());
        assert!(!Color::WHITE.is_random_sentinel());
    }

    #[test]
    fn test_aabb_surface_normal() {
        let wall = Aabb::new(Vec3::new(0.0, 1.0, 5.0), Vec3::new(5.0, 1.0, 0.5));
        let hit = Vec3::new(0.0, 1.0, 4.6);
        assert!(wall.contains(&hit));
        assert_eq!(wall.surface_normal(&hit), Vec3::new(0.0, 0.0, -1.0));
    }
}
