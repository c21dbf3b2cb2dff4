use glam::{Mat4, Vec3, Vec4};

use super::bounds::{BoundingBox, Intersection, Sphere};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    pub fn from_vec4(v: Vec4) -> Self {
        let normal = Vec3::new(v.x, v.y, v.z);
        let inv_len = 1.0 / normal.length().max(1e-12);
        Self {
            normal: normal * inv_len,
            d: v.w * inv_len,
        }
    }

    pub fn distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.d
    }
}

/// View frustum as six inward-facing planes plus the eight corner points.
/// Built from a view-projection matrix with 0..1 clip depth, which is what
/// the camera projections in this crate produce.
#[derive(Debug, Clone, Copy)]
pub struct Frustum {
    pub planes: [Plane; 6],
    pub corners: [Vec3; 8],
}

impl Frustum {
    pub fn from_view_proj(view_proj: Mat4) -> Self {
        let r0 = view_proj.row(0);
        let r1 = view_proj.row(1);
        let r2 = view_proj.row(2);
        let r3 = view_proj.row(3);

        let planes = [
            Plane::from_vec4(r3 + r0), // left
            Plane::from_vec4(r3 - r0), // right
            Plane::from_vec4(r3 + r1), // bottom
            Plane::from_vec4(r3 - r1), // top
            Plane::from_vec4(r2),      // near (z >= 0)
            Plane::from_vec4(r3 - r2), // far
        ];

        let inv = view_proj.inverse();
        let mut corners = [Vec3::ZERO; 8];
        let mut i = 0;
        for z in [0.0f32, 1.0] {
            for y in [-1.0f32, 1.0] {
                for x in [-1.0f32, 1.0] {
                    let p = inv * Vec4::new(x, y, z, 1.0);
                    corners[i] = if p.w.abs() > 1e-12 {
                        Vec3::new(p.x, p.y, p.z) / p.w
                    } else {
                        Vec3::ZERO
                    };
                    i += 1;
                }
            }
        }

        Self { planes, corners }
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|p| p.distance(point) >= 0.0)
    }

    pub fn test_box(&self, bounds: &BoundingBox) -> Intersection {
        if !bounds.defined() {
            return Intersection::Outside;
        }

        let center = bounds.center();
        let half = bounds.half_size();
        let mut all_inside = true;

        for plane in &self.planes {
            let dist = plane.distance(center);
            let radius = half.dot(plane.normal.abs());
            if dist < -radius {
                return Intersection::Outside;
            }
            if dist < radius {
                all_inside = false;
            }
        }

        if all_inside {
            Intersection::Inside
        } else {
            Intersection::Intersects
        }
    }

    pub fn test_sphere(&self, sphere: &Sphere) -> Intersection {
        let mut all_inside = true;
        for plane in &self.planes {
            let dist = plane.distance(sphere.center);
            if dist < -sphere.radius {
                return Intersection::Outside;
            }
            if dist < sphere.radius {
                all_inside = false;
            }
        }
        if all_inside {
            Intersection::Inside
        } else {
            Intersection::Intersects
        }
    }

    /// Bounding box of the frustum corners after a transform, typically into
    /// light view space when fitting shadow cameras.
    pub fn transformed_box(&self, transform: &Mat4) -> BoundingBox {
        let mut out = BoundingBox::UNDEFINED;
        for corner in self.corners {
            out.merge_point(transform.transform_point3(corner));
        }
        out
    }

    pub fn world_box(&self) -> BoundingBox {
        let mut out = BoundingBox::UNDEFINED;
        for corner in self.corners {
            out.merge_point(corner);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_frustum() -> Frustum {
        let proj = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.5, 100.0);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        Frustum::from_view_proj(proj * view)
    }

    #[test]
    fn point_in_front_is_inside() {
        let frustum = test_frustum();
        assert!(frustum.contains_point(Vec3::new(0.0, 0.0, -10.0)));
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, 10.0)));
    }

    #[test]
    fn box_classification() {
        let frustum = test_frustum();
        let inside = BoundingBox::from_center_size(Vec3::new(0.0, 0.0, -10.0), Vec3::splat(1.0));
        let outside = BoundingBox::from_center_size(Vec3::new(0.0, 0.0, 200.0), Vec3::splat(1.0));
        let crossing = BoundingBox::from_center_size(Vec3::new(0.0, 0.0, -100.0), Vec3::splat(5.0));

        assert_eq!(frustum.test_box(&inside), Intersection::Inside);
        assert_eq!(frustum.test_box(&outside), Intersection::Outside);
        assert_eq!(frustum.test_box(&crossing), Intersection::Intersects);
    }

    #[test]
    fn sphere_behind_camera_is_outside() {
        let frustum = test_frustum();
        let sphere = Sphere::new(Vec3::new(0.0, 0.0, 50.0), 1.0);
        assert_eq!(frustum.test_sphere(&sphere), Intersection::Outside);
    }

    #[test]
    fn corners_span_near_and_far() {
        let frustum = test_frustum();
        let bounds = frustum.world_box();
        assert!(bounds.min.z < -99.0);
        assert!(bounds.max.z > -1.0);
    }
}
