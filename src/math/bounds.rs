use glam::{Mat4, Vec3};

/// Result of a containment test between two volumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intersection {
    Outside,
    Intersects,
    Inside,
}

/// Axis-aligned bounding box. A box starts undefined (min > max) and becomes
/// defined by merging points or other boxes into it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    pub const UNDEFINED: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center_size(center: Vec3, size: Vec3) -> Self {
        let half = size * 0.5;
        Self {
            min: center - half,
            max: center + half,
        }
    }

    pub fn defined(&self) -> bool {
        self.min.x <= self.max.x
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn half_size(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn merge_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn merge_box(&mut self, other: &BoundingBox) {
        if other.defined() {
            self.min = self.min.min(other.min);
            self.max = self.max.max(other.max);
        }
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (n, x) = (self.min, self.max);
        [
            Vec3::new(n.x, n.y, n.z),
            Vec3::new(x.x, n.y, n.z),
            Vec3::new(n.x, x.y, n.z),
            Vec3::new(x.x, x.y, n.z),
            Vec3::new(n.x, n.y, x.z),
            Vec3::new(x.x, n.y, x.z),
            Vec3::new(n.x, x.y, x.z),
            Vec3::new(x.x, x.y, x.z),
        ]
    }

    /// Axis-aligned box enclosing this box after a matrix transform.
    pub fn transformed(&self, transform: &Mat4) -> BoundingBox {
        let mut out = BoundingBox::UNDEFINED;
        if !self.defined() {
            return out;
        }
        for corner in self.corners() {
            out.merge_point(transform.transform_point3(corner));
        }
        out
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    pub fn test_box(&self, other: &BoundingBox) -> Intersection {
        if other.max.x < self.min.x
            || other.min.x > self.max.x
            || other.max.y < self.min.y
            || other.min.y > self.max.y
            || other.max.z < self.min.z
            || other.min.z > self.max.z
        {
            Intersection::Outside
        } else if other.min.x >= self.min.x
            && other.max.x <= self.max.x
            && other.min.y >= self.min.y
            && other.max.y <= self.max.y
            && other.min.z >= self.min.z
            && other.max.z <= self.max.z
        {
            Intersection::Inside
        } else {
            Intersection::Intersects
        }
    }

    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        let clamped = point.clamp(self.min, self.max);
        (point - clamped).length()
    }

    /// Translated copy, used when extruding shadow caster volumes.
    pub fn translated(&self, offset: Vec3) -> BoundingBox {
        BoundingBox {
            min: self.min + offset,
            max: self.max + offset,
        }
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    pub fn from_box(bounds: &BoundingBox) -> Self {
        Self {
            center: bounds.center(),
            radius: bounds.half_size().length(),
        }
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        (point - self.center).length_squared() <= self.radius * self.radius
    }

    pub fn intersects_box(&self, bounds: &BoundingBox) -> bool {
        bounds.distance_to_point(self.center) <= self.radius
    }
}

/// Integer rectangle with exclusive right/bottom, used for viewports and
/// scissor rectangles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl IntRect {
    pub const ZERO: Self = Self {
        left: 0,
        top: 0,
        right: 0,
        bottom: 0,
    };

    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    pub fn clamped_to(&self, bounds: IntRect) -> IntRect {
        IntRect {
            left: self.left.clamp(bounds.left, bounds.right),
            top: self.top.clamp(bounds.top, bounds.bottom),
            right: self.right.clamp(bounds.left, bounds.right),
            bottom: self.bottom.clamp(bounds.top, bounds.bottom),
        }
    }

    pub fn intersection(&self, other: IntRect) -> IntRect {
        IntRect {
            left: self.left.max(other.left),
            top: self.top.max(other.top),
            right: self.right.min(other.right),
            bottom: self.bottom.min(other.bottom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_box_becomes_defined_by_merging() {
        let mut bounds = BoundingBox::UNDEFINED;
        assert!(!bounds.defined());
        bounds.merge_point(Vec3::new(1.0, 2.0, 3.0));
        assert!(bounds.defined());
        assert_eq!(bounds.center(), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn box_containment_classification() {
        let outer = BoundingBox::new(Vec3::splat(-2.0), Vec3::splat(2.0));
        let inner = BoundingBox::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let crossing = BoundingBox::new(Vec3::splat(1.0), Vec3::splat(3.0));
        let outside = BoundingBox::new(Vec3::splat(5.0), Vec3::splat(6.0));

        assert_eq!(outer.test_box(&inner), Intersection::Inside);
        assert_eq!(outer.test_box(&crossing), Intersection::Intersects);
        assert_eq!(outer.test_box(&outside), Intersection::Outside);
    }

    #[test]
    fn transformed_box_stays_axis_aligned() {
        let bounds = BoundingBox::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let rotated = bounds.transformed(&Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4));
        // A rotated unit cube grows along X/Z.
        assert!(rotated.max.x > 1.0);
        assert!((rotated.max.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn rect_clamp_produces_empty_when_fully_outside() {
        let rect = IntRect::new(200, 200, 300, 300);
        let clamped = rect.clamped_to(IntRect::new(0, 0, 100, 100));
        assert!(clamped.is_empty());
    }
}
