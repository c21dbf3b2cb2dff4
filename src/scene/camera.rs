use glam::{Mat3, Mat4, Quat, Vec3};

use crate::math::{BoundingBox, Frustum};

/// Camera with either perspective or orthographic projection. Shadow split
/// setup builds throwaway cameras through [`Camera::look_to`] and the ortho
/// setters, so everything a view or a shadow pass needs lives here.
#[derive(Debug, Clone)]
pub struct Camera {
    /// Identity used for source-view matching across viewports.
    pub id: u32,
    pub position: Vec3,
    pub rotation: Quat,
    pub near: f32,
    pub far: f32,
    pub fov_y_radians: f32,
    pub aspect: f32,
    pub auto_aspect: bool,
    pub zoom: f32,
    pub orthographic: bool,
    pub ortho_width: f32,
    pub ortho_height: f32,
    pub view_mask: u32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            id: 0,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            near: 0.1,
            far: 100.0,
            fov_y_radians: 60f32.to_radians(),
            aspect: 1.0,
            auto_aspect: true,
            zoom: 1.0,
            orthographic: false,
            ortho_width: 0.0,
            ortho_height: 0.0,
            view_mask: u32::MAX,
        }
    }
}

impl Camera {
    /// Camera looking along `direction`, with a safe up vector when the
    /// direction is nearly vertical.
    pub fn look_to(position: Vec3, direction: Vec3) -> Self {
        let forward = direction.normalize_or_zero();
        let up = if forward.abs().dot(Vec3::Y) > 0.95 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let right = forward.cross(up).normalize();
        let true_up = right.cross(forward);
        let rotation = Quat::from_mat3(&Mat3::from_cols(right, true_up, -forward));
        Self {
            position,
            rotation,
            ..Default::default()
        }
    }

    pub fn set_orthographic(&mut self, width: f32, height: f32) {
        self.orthographic = true;
        self.ortho_width = width;
        self.ortho_height = height;
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if aspect.is_finite() && aspect > 0.0 {
            self.aspect = aspect;
        }
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn projection_valid(&self) -> bool {
        if !(self.near.is_finite() && self.far.is_finite() && self.far > self.near) {
            return false;
        }
        if self.orthographic {
            self.ortho_width > 0.0 && self.ortho_height > 0.0
        } else {
            self.near > 0.0
                && self.fov_y_radians > 0.0
                && self.fov_y_radians < std::f32::consts::PI
                && self.aspect > 0.0
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward(), self.up())
    }

    pub fn projection(&self) -> Mat4 {
        self.projection_with_clip(self.near, self.far)
    }

    fn projection_with_clip(&self, near: f32, far: f32) -> Mat4 {
        if self.orthographic {
            let half_w = self.ortho_width * 0.5 / self.zoom;
            let half_h = self.ortho_height * 0.5 / self.zoom;
            Mat4::orthographic_rh(-half_w, half_w, -half_h, half_h, near, far)
        } else {
            // Zoom narrows the field of view without changing the stored fov.
            let half_h = (self.fov_y_radians * 0.5).tan() / self.zoom;
            let fov = 2.0 * half_h.atan();
            Mat4::perspective_rh(fov, self.aspect, near, far)
        }
    }

    pub fn view_proj(&self) -> Mat4 {
        self.projection() * self.view_matrix()
    }

    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_proj(self.view_proj())
    }

    /// Frustum of the [near, far] slice of the view volume, clamped to the
    /// camera's own clip range. Used for directional shadow cascades.
    pub fn split_frustum(&self, near: f32, far: f32) -> Frustum {
        let near = near.clamp(self.near, self.far);
        let far = far.clamp(near + 1e-4, self.far);
        Frustum::from_view_proj(self.projection_with_clip(near, far) * self.view_matrix())
    }

    pub fn distance(&self, point: Vec3) -> f32 {
        (point - self.position).length()
    }

    /// Positive depth of a world point along the view direction.
    pub fn view_depth(&self, point: Vec3) -> f32 {
        (point - self.position).dot(self.forward())
    }

    /// Min/max view depth of a world-space box.
    pub fn depth_range(&self, bounds: &BoundingBox) -> (f32, f32) {
        let mut min_z = f32::INFINITY;
        let mut max_z = f32::NEG_INFINITY;
        for corner in bounds.corners() {
            let z = self.view_depth(corner);
            min_z = min_z.min(z);
            max_z = max_z.max(z);
        }
        (min_z, max_z)
    }

    /// Approximate fraction of the viewport a bounding sphere around `bounds`
    /// covers. Drives occluder selection and shadow-map auto-shrink.
    pub fn screen_size_ratio(&self, bounds: &BoundingBox) -> f32 {
        let radius = bounds.half_size().length();
        if self.orthographic {
            radius / (self.ortho_height * 0.5).max(1e-6)
        } else {
            let depth = self.view_depth(bounds.center()).max(self.near);
            radius / (depth * (self.fov_y_radians * 0.5).tan()).max(1e-6)
        }
    }

    pub fn far_clip_point(&self) -> Vec3 {
        self.position + self.forward() * self.far
    }
}
