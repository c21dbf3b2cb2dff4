use std::sync::Arc;

use bitflags::bitflags;
use glam::Mat4;

use crate::math::BoundingBox;
use crate::renderer::FrameInfo;
use crate::resources::{Geometry, Handle, Material};

use super::{LightId, ZoneId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawableId(pub u32);

bitflags! {
    /// Drawable categories a spatial query can filter on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DrawableFlags: u32 {
        const GEOMETRY = 1;
        const LIGHT = 2;
        const ZONE = 4;
    }
}

/// Shader variant family a batch's geometry belongs to. `Instanced` is never
/// set on source batches; the batch builder promotes eligible static batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GeometryType {
    #[default]
    Static,
    Skinned,
    Instanced,
    Billboard,
}

/// How a drawable rebuilds CPU-side geometry each frame (skinning, particle
/// emission). `Worker` updates run on the culling worker threads; a drawable
/// may report `MainThread` at update time even if it was scheduled for a
/// worker, and the pipeline must then re-route it to the serial pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateGeometryKind {
    #[default]
    None,
    Worker,
    MainThread,
}

/// Per-frame rebuild decision, queried on a worker thread right before the
/// geometry update runs. Returning [`UpdateGeometryKind::MainThread`] defers
/// the drawable to the serial pass; `None` skips the rebuild this frame.
pub type GeometryUpdateFn = dyn Fn(&FrameInfo) -> UpdateGeometryKind + Send + Sync;

/// One drawable sub-batch: geometry, material and one or more world
/// transforms. More than one transform means multi-instance static geometry;
/// the batch builder either feeds the transforms into a GPU instancing group
/// or splits them into single-transform draws.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub geometry: Handle<Geometry>,
    pub material: Handle<Material>,
    pub geometry_type: GeometryType,
    pub transforms: Vec<Mat4>,
}

impl SourceBatch {
    pub fn new(geometry: Handle<Geometry>, material: Handle<Material>, transform: Mat4) -> Self {
        Self {
            geometry,
            material,
            geometry_type: GeometryType::Static,
            transforms: vec![transform],
        }
    }
}

/// Per-frame mutable drawable state. Owned by the scene but written by the
/// pipeline: reset at the start of each view update, filled during culling
/// and light processing, and read when batches are built.
#[derive(Debug, Clone, Default)]
pub struct DrawableFrame {
    pub in_view: bool,
    pub distance: f32,
    pub min_z: f32,
    pub max_z: f32,
    pub zone: Option<ZoneId>,
    pub lights: Vec<LightId>,
    pub vertex_lights: Vec<LightId>,
    /// Bit per source batch already covered by a lit-base batch.
    pub lit_base_mask: u64,
    pub geometry_updated: bool,
    /// Set when a worker-scheduled drawable asked for the serial pass.
    pub main_thread_update: bool,
}

impl DrawableFrame {
    pub fn reset(&mut self) {
        self.in_view = false;
        self.distance = 0.0;
        self.min_z = 0.0;
        self.max_z = 0.0;
        self.zone = None;
        self.lights.clear();
        self.vertex_lights.clear();
        self.lit_base_mask = 0;
        self.geometry_updated = false;
        self.main_thread_update = false;
    }
}

/// A renderable scene entity as the pipeline consumes it. The scene owns
/// these; the pipeline refers to them by [`DrawableId`] for one frame only.
#[derive(Clone)]
pub struct Drawable {
    pub bounds: BoundingBox,
    pub draw_distance: f32,
    pub shadow_distance: f32,
    pub view_mask: u32,
    pub light_mask: u32,
    pub shadow_mask: u32,
    pub zone_mask: u32,
    pub cast_shadows: bool,
    pub occluder: bool,
    pub occludee: bool,
    pub batches: Vec<SourceBatch>,
    /// Per-pixel light cap; zero means unlimited.
    pub max_lights: usize,
    pub update_geometry: UpdateGeometryKind,
    /// Re-evaluates the routing each frame; a `Worker` drawable may answer
    /// `MainThread` here and the pipeline re-routes it to the serial pass.
    pub on_update_geometry: Option<Arc<GeometryUpdateFn>>,
    pub frame: DrawableFrame,
}

impl Drawable {
    pub fn new(bounds: BoundingBox) -> Self {
        Self {
            bounds,
            draw_distance: 0.0,
            shadow_distance: 0.0,
            view_mask: u32::MAX,
            light_mask: u32::MAX,
            shadow_mask: u32::MAX,
            zone_mask: u32::MAX,
            cast_shadows: false,
            occluder: false,
            occludee: true,
            batches: Vec::new(),
            max_lights: 0,
            update_geometry: UpdateGeometryKind::None,
            on_update_geometry: None,
            frame: DrawableFrame::default(),
        }
    }

    pub fn with_batch(mut self, batch: SourceBatch) -> Self {
        self.batches.push(batch);
        self
    }

    pub fn with_shadows(mut self) -> Self {
        self.cast_shadows = true;
        self
    }
}
