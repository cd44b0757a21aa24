//! Small geometric value types shared by meshes, cameras and the flush engine.

use glam::{Mat4, Vec2, Vec3};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Tightest box around the points, or `None` for an empty iterator.
    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut aabb = Self::new(first, first);
        for p in iter {
            aabb.min = aabb.min.min(p);
            aabb.max = aabb.max.max(p);
        }
        Some(aabb)
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb::new(self.min.min(other.min), self.max.max(other.max))
    }

    pub fn centroid(&self) -> Vec3 {
        0.5 * (self.min + self.max)
    }

    pub fn dimensions(&self) -> Vec3 {
        self.max - self.min
    }

    /// Box around all eight transformed corners.
    pub fn transformed(&self, m: &Mat4) -> Aabb {
        let corners = (0..8).map(|i| {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            m.transform_point3(corner)
        });
        // eight corners are always present
        Aabb::from_points(corners).unwrap_or(*self)
    }
}

/// A triangle in 3D space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub p0: Vec3,
    pub p1: Vec3,
    pub p2: Vec3,
}

impl Triangle {
    pub fn new(p0: Vec3, p1: Vec3, p2: Vec3) -> Self {
        Self { p0, p1, p2 }
    }

    /// Unit face normal (counter-clockwise winding), or `None` when degenerate.
    pub fn normal(&self) -> Option<Vec3> {
        let n = (self.p1 - self.p0).cross(self.p2 - self.p0);
        let n = n.normalize_or_zero();
        if n == Vec3::ZERO || !n.is_finite() {
            None
        } else {
            Some(n)
        }
    }

    pub fn centroid(&self) -> Vec3 {
        (self.p0 + self.p1 + self.p2) / 3.0
    }
}

/// Rectangle in pixel space, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    pub fn from_origin_size(origin: Vec2, size: Vec2) -> Self {
        Self::new(origin, origin + size)
    }

    pub fn width(&self) -> f32 {
        (self.max.x - self.min.x).abs()
    }

    pub fn height(&self) -> f32 {
        (self.max.y - self.min.y).abs()
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height() > 0.0 {
            self.width() / self.height()
        } else {
            1.0
        }
    }

    /// Clamp into `[0, width] x [0, height]`.
    pub fn clamped(&self, width: f32, height: f32) -> Rect {
        let bounds = Vec2::new(width, height);
        Rect::new(
            self.min.min(self.max).clamp(Vec2::ZERO, bounds),
            self.max.max(self.min).clamp(Vec2::ZERO, bounds),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aabb_from_points() {
        let aabb = Aabb::from_points([Vec3::new(1.0, -2.0, 0.0), Vec3::new(-1.0, 3.0, 2.0)])
            .unwrap();
        assert_eq!(aabb.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 3.0, 2.0));
        assert_eq!(aabb.centroid(), Vec3::new(0.0, 0.5, 1.0));
        assert!(Aabb::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn test_aabb_transformed_by_translation() {
        let aabb = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let moved = aabb.transformed(&Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)));
        assert_eq!(moved.centroid(), Vec3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn test_degenerate_triangle_has_no_normal() {
        let t = Triangle::new(Vec3::ZERO, Vec3::X, Vec3::X * 2.0);
        assert!(t.normal().is_none());

        let t = Triangle::new(Vec3::ZERO, Vec3::X, Vec3::Y);
        assert_eq!(t.normal(), Some(Vec3::Z));
    }

    #[test]
    fn test_rect_clamped() {
        let r = Rect::new(Vec2::new(-10.0, 5.0), Vec2::new(50.0, 500.0)).clamped(100.0, 100.0);
        assert_eq!(r.min, Vec2::new(0.0, 5.0));
        assert_eq!(r.max, Vec2::new(50.0, 100.0));
    }
}
