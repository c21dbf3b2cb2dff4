use glam::Vec3;

use crate::graphics::BufferHandle;

/// GPU geometry as the pipeline references it: buffer handles plus draw
/// ranges. Occluder geometry additionally keeps a CPU-side copy of its
/// positions and indices for the software occlusion rasterizer.
#[derive(Debug, Clone, Default)]
pub struct Geometry {
    pub vertex_buffer: Option<BufferHandle>,
    pub index_buffer: Option<BufferHandle>,
    pub index_start: u32,
    pub index_count: u32,
    pub vertex_count: u32,
    pub lod_distance: f32,
    pub cpu_positions: Vec<Vec3>,
    pub cpu_indices: Vec<u32>,
}

impl Geometry {
    pub fn new(index_count: u32, vertex_count: u32) -> Self {
        Self {
            index_count,
            vertex_count,
            ..Default::default()
        }
    }

    pub fn with_cpu_data(mut self, positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        self.cpu_positions = positions;
        self.cpu_indices = indices;
        self
    }

    pub fn triangle_count(&self) -> u32 {
        self.index_count / 3
    }

    pub fn has_cpu_data(&self) -> bool {
        !self.cpu_positions.is_empty() && !self.cpu_indices.is_empty()
    }
}
