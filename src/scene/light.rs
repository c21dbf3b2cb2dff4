use glam::Vec3;

use crate::math::{BoundingBox, Sphere};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LightId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightType {
    Directional,
    Spot,
    Point,
}

pub const MAX_CASCADE_SPLITS: usize = 4;
pub const POINT_LIGHT_FACES: usize = 6;
pub const MAX_SHADOW_SPLITS: usize = 6;

/// Directional cascade distances. A zero split ends the cascade chain; the
/// effective count is additionally clamped by the camera's far clip.
#[derive(Debug, Clone, Copy)]
pub struct CascadeParameters {
    pub splits: [f32; MAX_CASCADE_SPLITS],
    pub fade_start: f32,
}

impl CascadeParameters {
    pub fn new(s1: f32, s2: f32, s3: f32, s4: f32) -> Self {
        Self {
            splits: [s1, s2, s3, s4],
            fade_start: 0.8,
        }
    }

    pub fn single(far: f32) -> Self {
        Self::new(far, 0.0, 0.0, 0.0)
    }
}

impl Default for CascadeParameters {
    fn default() -> Self {
        Self::new(10.0, 50.0, 200.0, 0.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BiasParameters {
    pub constant: f32,
    pub slope_scaled: f32,
    /// Non-zero selects the normal-offset shadow shader variant.
    pub normal_offset: f32,
}

impl Default for BiasParameters {
    fn default() -> Self {
        Self {
            constant: 0.0002,
            slope_scaled: 0.5,
            normal_offset: 0.0,
        }
    }
}

/// Shadow camera focusing behavior for spot and directional lights.
#[derive(Debug, Clone, Copy)]
pub struct FocusParameters {
    pub focus: bool,
    /// Zoom quantization step, keeps the shadow camera stable frame to frame.
    pub quantize: f32,
    /// Minimum orthographic view size after focusing.
    pub min_view: f32,
}

impl Default for FocusParameters {
    fn default() -> Self {
        Self {
            focus: true,
            quantize: 0.5,
            min_view: 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LightFrame {
    pub distance: f32,
    pub sort_value: f32,
}

#[derive(Debug, Clone)]
pub struct Light {
    pub light_type: LightType,
    pub position: Vec3,
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub range: f32,
    pub fov_y_radians: f32,
    /// Render as a cheap vertex light instead of a per-pixel light.
    pub per_vertex: bool,
    pub negative: bool,
    pub cast_shadows: bool,
    /// Scales the configured base shadow-map size, (0, 1].
    pub shadow_resolution: f32,
    /// Lights farther than this draw no shadows; zero disables the limit.
    pub shadow_distance: f32,
    pub shadow_bias: BiasParameters,
    pub shadow_cascade: CascadeParameters,
    pub shadow_focus: FocusParameters,
    /// Shadow camera near clip as a fraction of the light range.
    pub shadow_near_far_ratio: f32,
    /// How far off-frustum casters may be extruded toward the camera frustum
    /// before they are rejected.
    pub shadow_max_extrusion: f32,
    pub light_mask: u32,
    pub shadow_mask: u32,
    pub frame: LightFrame,
}

impl Light {
    pub fn directional(direction: Vec3) -> Self {
        Self {
            light_type: LightType::Directional,
            direction: direction.normalize_or_zero(),
            ..Self::base()
        }
    }

    pub fn point(position: Vec3, range: f32) -> Self {
        Self {
            light_type: LightType::Point,
            position,
            range,
            ..Self::base()
        }
    }

    pub fn spot(position: Vec3, direction: Vec3, range: f32, fov_y_radians: f32) -> Self {
        Self {
            light_type: LightType::Spot,
            position,
            direction: direction.normalize_or_zero(),
            range,
            fov_y_radians,
            ..Self::base()
        }
    }

    fn base() -> Self {
        Self {
            light_type: LightType::Point,
            position: Vec3::ZERO,
            direction: Vec3::NEG_Y,
            color: Vec3::ONE,
            intensity: 1.0,
            range: 10.0,
            fov_y_radians: 45f32.to_radians(),
            per_vertex: false,
            negative: false,
            cast_shadows: false,
            shadow_resolution: 1.0,
            shadow_distance: 0.0,
            shadow_bias: BiasParameters::default(),
            shadow_cascade: CascadeParameters::default(),
            shadow_focus: FocusParameters::default(),
            shadow_near_far_ratio: 0.002,
            shadow_max_extrusion: 1000.0,
            light_mask: u32::MAX,
            shadow_mask: u32::MAX,
            frame: LightFrame::default(),
        }
    }

    pub fn with_shadows(mut self) -> Self {
        self.cast_shadows = true;
        self
    }

    /// Number of shadow splits this light wants before caster culling:
    /// cascades clamped by the camera far clip for directional lights, six
    /// cube faces for point lights, one for spot lights.
    pub fn num_shadow_splits(&self, camera_far: f32) -> usize {
        match self.light_type {
            LightType::Spot => 1,
            LightType::Point => POINT_LIGHT_FACES,
            LightType::Directional => {
                let mut splits = 0;
                let mut previous = 0.0f32;
                for &split in &self.shadow_cascade.splits {
                    if split <= previous {
                        break;
                    }
                    splits += 1;
                    if split >= camera_far {
                        break;
                    }
                    previous = split;
                }
                splits.max(1).min(MAX_CASCADE_SPLITS)
            }
        }
    }

    /// Intensity-weighted distance used to order lights: closer and brighter
    /// lights sort first so the lit-base optimization picks the cheapest one.
    pub fn sort_value(&self, distance: f32) -> f32 {
        let brightness = (self.intensity * self.color.max_element()).max(1e-4);
        match self.light_type {
            LightType::Directional => 1.0 / brightness,
            _ => distance.max(1e-3) / brightness,
        }
    }

    pub fn world_bounds(&self) -> BoundingBox {
        match self.light_type {
            LightType::Directional => {
                BoundingBox::new(Vec3::splat(-f32::MAX), Vec3::splat(f32::MAX))
            }
            _ => BoundingBox::from_center_size(self.position, Vec3::splat(self.range * 2.0)),
        }
    }

    pub fn volume_sphere(&self) -> Sphere {
        Sphere::new(self.position, self.range)
    }

    pub fn shadow_near_clip(&self) -> f32 {
        (self.range * self.shadow_near_far_ratio).max(0.01)
    }
}
