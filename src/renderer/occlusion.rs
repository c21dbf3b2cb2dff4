use glam::{Mat4, Vec2, Vec3, Vec3Swizzles, Vec4, Vec4Swizzles};

use crate::math::BoundingBox;
use crate::scene::Camera;

/// Coarse CPU depth buffer rasterized from a few large occluders, used to
/// reject drawables before their batches are built. Tests are conservative:
/// anything the rasterizer cannot prove hidden counts as visible.
pub struct OcclusionBuffer {
    width: usize,
    height: usize,
    depth: Vec<f32>,
    view_proj: Mat4,
    triangles_drawn: usize,
    max_triangles: usize,
}

impl OcclusionBuffer {
    pub fn new() -> Self {
        Self {
            width: 0,
            height: 0,
            depth: Vec::new(),
            view_proj: Mat4::IDENTITY,
            triangles_drawn: 0,
            max_triangles: 0,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn triangles_drawn(&self) -> usize {
        self.triangles_drawn
    }

    /// Sizes the buffer to the requested width with the camera's aspect
    /// ratio, then clears it to the far plane.
    pub fn set_size(&mut self, width: usize, aspect: f32) {
        self.width = width.max(1);
        self.height = ((width as f32 / aspect.max(0.01)).round() as usize).max(1);
        self.depth.clear();
        self.depth.resize(self.width * self.height, 1.0);
        self.triangles_drawn = 0;
    }

    pub fn set_view(&mut self, camera: &Camera) {
        self.view_proj = camera.view_proj();
    }

    pub fn set_max_triangles(&mut self, max_triangles: usize) {
        self.max_triangles = max_triangles;
    }

    pub fn budget_exhausted(&self) -> bool {
        self.max_triangles > 0 && self.triangles_drawn >= self.max_triangles
    }

    /// Rasterizes occluder triangles into the depth buffer. Returns false
    /// once the triangle budget is exhausted so the caller can stop feeding
    /// occluders. Triangles touching the near plane are skipped rather than
    /// clipped; skipping an occluder triangle can only make more drawables
    /// pass the visibility test, which keeps the buffer conservative.
    pub fn draw_triangles(&mut self, positions: &[Vec3], indices: &[u32], transform: Mat4) -> bool {
        let mvp = self.view_proj * transform;
        for tri in indices.chunks_exact(3) {
            if self.budget_exhausted() {
                return false;
            }
            let (Some(&a), Some(&b), Some(&c)) = (
                positions.get(tri[0] as usize),
                positions.get(tri[1] as usize),
                positions.get(tri[2] as usize),
            ) else {
                continue;
            };
            self.triangles_drawn += 1;
            let a = mvp * a.extend(1.0);
            let b = mvp * b.extend(1.0);
            let c = mvp * c.extend(1.0);
            if a.w <= 0.0 || b.w <= 0.0 || c.w <= 0.0 {
                continue;
            }
            self.rasterize(project(a, self.width, self.height),
                           project(b, self.width, self.height),
                           project(c, self.width, self.height));
        }
        true
    }

    /// Conservative box test: occluded only when every covered pixel holds
    /// an occluder depth nearer than the box's nearest point. Boxes crossing
    /// the near plane and empty buffers always report visible.
    pub fn is_visible(&self, bounds: &BoundingBox) -> bool {
        if self.depth.is_empty() {
            return true;
        }
        let mut min = Vec2::splat(f32::MAX);
        let mut max = Vec2::splat(f32::MIN);
        let mut min_depth = f32::MAX;
        for corner in bounds.corners() {
            let clip = self.view_proj * corner.extend(1.0);
            if clip.w <= 0.0 {
                return true;
            }
            let p = project(clip, self.width, self.height);
            min = min.min(p.xy());
            max = max.max(p.xy());
            min_depth = min_depth.min(p.z);
        }

        let x0 = (min.x.floor() as i64).clamp(0, self.width as i64 - 1) as usize;
        let x1 = (max.x.ceil() as i64).clamp(0, self.width as i64 - 1) as usize;
        let y0 = (min.y.floor() as i64).clamp(0, self.height as i64 - 1) as usize;
        let y1 = (max.y.ceil() as i64).clamp(0, self.height as i64 - 1) as usize;
        if min.x > self.width as f32 || max.x < 0.0 || min.y > self.height as f32 || max.y < 0.0 {
            return true;
        }

        for y in y0..=y1 {
            let row = &self.depth[y * self.width..(y + 1) * self.width];
            for &pixel in &row[x0..=x1] {
                if pixel >= min_depth {
                    return true;
                }
            }
        }
        false
    }

    fn rasterize(&mut self, a: Vec3, b: Vec3, c: Vec3) {
        // Half-space rasterization over the triangle's pixel bounding box
        // with a flat conservative depth (the farthest vertex), so partial
        // pixel coverage never over-occludes.
        let area = (b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y);
        if area.abs() < 1e-6 {
            return;
        }
        let depth = a.z.max(b.z).max(c.z);

        let min_x = a.x.min(b.x).min(c.x).floor().max(0.0) as usize;
        let max_x = (a.x.max(b.x).max(c.x).ceil() as i64).clamp(0, self.width as i64 - 1) as usize;
        let min_y = a.y.min(b.y).min(c.y).floor().max(0.0) as usize;
        let max_y = (a.y.max(b.y).max(c.y).ceil() as i64).clamp(0, self.height as i64 - 1) as usize;
        if min_x >= self.width || min_y >= self.height {
            return;
        }

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let w0 = (b.x - a.x) * (p.y - a.y) - (p.x - a.x) * (b.y - a.y);
                let w1 = (c.x - b.x) * (p.y - b.y) - (p.x - b.x) * (c.y - b.y);
                let w2 = (a.x - c.x) * (p.y - c.y) - (p.x - c.x) * (a.y - c.y);
                let inside = if area > 0.0 {
                    w0 >= 0.0 && w1 >= 0.0 && w2 >= 0.0
                } else {
                    w0 <= 0.0 && w1 <= 0.0 && w2 <= 0.0
                };
                if inside {
                    let cell = &mut self.depth[y * self.width + x];
                    if depth < *cell {
                        *cell = depth;
                    }
                }
            }
        }
    }
}

impl Default for OcclusionBuffer {
    fn default() -> Self {
        Self::new()
    }
}

fn project(clip: Vec4, width: usize, height: usize) -> Vec3 {
    let ndc = clip.xyz() / clip.w;
    Vec3::new(
        (ndc.x * 0.5 + 0.5) * width as f32,
        (0.5 - ndc.y * 0.5) * height as f32,
        ndc.z,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Camera {
        // Default camera looks down negative Z from the origin.
        Camera::look_to(Vec3::ZERO, Vec3::NEG_Z)
    }

    fn wall(z: f32, half: f32) -> (Vec<Vec3>, Vec<u32>) {
        let positions = vec![
            Vec3::new(-half, -half, z),
            Vec3::new(half, -half, z),
            Vec3::new(half, half, z),
            Vec3::new(-half, half, z),
        ];
        (positions, vec![0, 1, 2, 0, 2, 3])
    }

    #[test]
    fn empty_buffer_reports_everything_visible() {
        let mut buffer = OcclusionBuffer::new();
        buffer.set_size(64, 1.0);
        buffer.set_view(&camera());
        let bounds = BoundingBox::from_center_size(Vec3::new(0.0, 0.0, -10.0), Vec3::splat(1.0));
        assert!(buffer.is_visible(&bounds));
    }

    #[test]
    fn large_wall_occludes_a_box_behind_it() {
        let mut buffer = OcclusionBuffer::new();
        buffer.set_size(64, 1.0);
        buffer.set_view(&camera());
        let (positions, indices) = wall(-5.0, 50.0);
        assert!(buffer.draw_triangles(&positions, &indices, Mat4::IDENTITY));

        let behind = BoundingBox::from_center_size(Vec3::new(0.0, 0.0, -20.0), Vec3::splat(1.0));
        let in_front = BoundingBox::from_center_size(Vec3::new(0.0, 0.0, -2.0), Vec3::splat(1.0));
        assert!(!buffer.is_visible(&behind));
        assert!(buffer.is_visible(&in_front));
    }

    #[test]
    fn boxes_crossing_the_near_plane_stay_visible() {
        let mut buffer = OcclusionBuffer::new();
        buffer.set_size(64, 1.0);
        buffer.set_view(&camera());
        let (positions, indices) = wall(-5.0, 50.0);
        buffer.draw_triangles(&positions, &indices, Mat4::IDENTITY);

        let straddling = BoundingBox::from_center_size(Vec3::ZERO, Vec3::splat(4.0));
        assert!(buffer.is_visible(&straddling));
    }

    #[test]
    fn triangle_budget_stops_submission() {
        let mut buffer = OcclusionBuffer::new();
        buffer.set_size(32, 1.0);
        buffer.set_view(&camera());
        buffer.set_max_triangles(1);
        let (positions, indices) = wall(-5.0, 10.0);
        assert!(!buffer.draw_triangles(&positions, &indices, Mat4::IDENTITY));
        assert_eq!(buffer.triangles_drawn(), 1);
        assert!(buffer.budget_exhausted());
    }
}
