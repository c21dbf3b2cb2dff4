use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::graphics::ShaderPair;
use crate::resources::{Geometry, Handle, Material};
use crate::scene::{GeometryType, ZoneId};

/// One draw-call descriptor: geometry, material pass, transform and light
/// context, all by id so a queue never borrows the stores it was built from.
#[derive(Debug, Clone)]
pub struct Batch {
    pub geometry: Handle<Geometry>,
    pub material: Handle<Material>,
    pub pass_index: usize,
    pub geometry_type: GeometryType,
    pub transform: Mat4,
    pub zone: Option<ZoneId>,
    /// Index into the view's light-queue vector; `None` for unlit batches.
    pub light_queue: Option<u16>,
    pub shaders: Option<ShaderPair>,
    /// Dense id of the resolved shader pair, the top sort-key component.
    pub shader_id: u16,
    pub distance: f32,
    pub render_order: u8,
    pub sort_key: u64,
}

impl Batch {
    pub fn new(
        geometry: Handle<Geometry>,
        material: Handle<Material>,
        pass_index: usize,
        transform: Mat4,
    ) -> Self {
        Self {
            geometry,
            material,
            pass_index,
            geometry_type: GeometryType::Static,
            transform,
            zone: None,
            light_queue: None,
            shaders: None,
            shader_id: 0,
            distance: 0.0,
            render_order: crate::resources::material::DEFAULT_RENDER_ORDER,
            sort_key: 0,
        }
    }

    /// Packs `{shader:16 | lightQueue:16 | material:16 | geometry:16}`. Must
    /// be called again whenever any component changes; it is the sole
    /// ordering key for state-sorted queues.
    pub fn calculate_sort_key(&mut self) {
        let light_queue_id = self.light_queue.map(|i| i + 1).unwrap_or(0) as u64;
        self.sort_key = ((self.shader_id as u64) << 48)
            | (light_queue_id << 32)
            | ((self.material.sort_id() as u64) << 16)
            | self.geometry.sort_id() as u64;
    }

    pub fn grouping_key(&self) -> BatchGroupKey {
        BatchGroupKey {
            zone: self.zone,
            light_queue: self.light_queue,
            pass_index: self.pass_index,
            material: self.material,
            geometry: self.geometry,
            render_order: self.render_order,
        }
    }
}

/// Structural identity for instancing: batches that agree on every field
/// here can be collapsed into one instanced draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchGroupKey {
    pub zone: Option<ZoneId>,
    pub light_queue: Option<u16>,
    pub pass_index: usize,
    pub material: Handle<Material>,
    pub geometry: Handle<Geometry>,
    pub render_order: u8,
}

#[derive(Debug, Clone, Copy)]
pub struct InstanceTransform {
    pub transform: Mat4,
    pub distance: f32,
}

/// A batch generalized to many instances sharing identical state. Below the
/// configured minimum instance count it draws each instance separately with
/// the non-instanced shaders; at or above it, one instanced draw.
#[derive(Debug, Clone)]
pub struct BatchGroup {
    pub batch: Batch,
    pub instances: Vec<InstanceTransform>,
    /// First row in the frame's instancing buffer, assigned during upload.
    pub start_index: u32,
}

impl BatchGroup {
    pub fn from_batch(batch: Batch) -> Self {
        let first = InstanceTransform {
            transform: batch.transform,
            distance: batch.distance,
        };
        Self {
            batch,
            instances: vec![first],
            start_index: 0,
        }
    }

    pub fn add_instance(&mut self, transform: Mat4, distance: f32) {
        self.instances.push(InstanceTransform {
            transform,
            distance,
        });
    }
}

/// Instancing buffer row: the upper three rows of a transposed world matrix,
/// 48 bytes per instance.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct InstanceRows {
    pub rows: [[f32; 4]; 3],
}

impl InstanceRows {
    pub fn from_transform(transform: &Mat4) -> Self {
        let t = transform.transpose();
        Self {
            rows: [
                t.x_axis.to_array(),
                t.y_axis.to_array(),
                t.z_axis.to_array(),
            ],
        }
    }
}

pub const INSTANCE_ROW_SIZE: u64 = std::mem::size_of::<InstanceRows>() as u64;

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn test_batch() -> Batch {
        Batch::new(Handle::new(3), Handle::new(7), 0, Mat4::IDENTITY)
    }

    #[test]
    fn sort_key_packs_all_four_components() {
        let mut batch = test_batch();
        batch.shader_id = 0xAAAA;
        batch.light_queue = Some(4);
        batch.calculate_sort_key();

        assert_eq!(batch.sort_key >> 48, 0xAAAA);
        assert_eq!((batch.sort_key >> 32) & 0xffff, 5);
        assert_eq!((batch.sort_key >> 16) & 0xffff, 7);
        assert_eq!(batch.sort_key & 0xffff, 3);
    }

    #[test]
    fn sort_key_changes_when_a_component_changes() {
        let mut batch = test_batch();
        batch.calculate_sort_key();
        let before = batch.sort_key;
        batch.shader_id = 1;
        batch.calculate_sort_key();
        assert_ne!(before, batch.sort_key);
    }

    #[test]
    fn instance_rows_carry_the_translation() {
        let transform = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let rows = InstanceRows::from_transform(&transform);
        assert_eq!(rows.rows[0][3], 1.0);
        assert_eq!(rows.rows[1][3], 2.0);
        assert_eq!(rows.rows[2][3], 3.0);
        assert_eq!(INSTANCE_ROW_SIZE, 48);
    }
}
