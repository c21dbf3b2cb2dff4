use std::collections::HashMap;

use glam::Mat4;

use crate::graphics::{BufferHandle, Graphics, ShaderParam};
use crate::math::IntRect;
use crate::resources::Assets;
use crate::scene::{Camera, GeometryType, LightId};

use super::batch::{Batch, BatchGroup, BatchGroupKey};
use super::renderer::ShadowMap;

/// Everything a queue needs to issue its draws. GPU submission is strictly
/// single-threaded; this borrows the session object for the duration.
pub struct DrawContext<'a> {
    pub graphics: &'a mut dyn Graphics,
    pub assets: &'a Assets,
    pub view_proj: Mat4,
    pub instancing_buffer: Option<BufferHandle>,
    pub min_instances: usize,
}

/// The batches and instancing groups of one render pass. Rebuilt every
/// frame; the group map stores indices into the group vector so growth never
/// invalidates an entry.
#[derive(Default)]
pub struct BatchQueue {
    pub batches: Vec<Batch>,
    groups: Vec<BatchGroup>,
    group_lookup: HashMap<BatchGroupKey, usize>,
    /// Valid only after one of the sort calls.
    pub sorted_batches: Vec<usize>,
    pub sorted_groups: Vec<usize>,
    max_sorted_instances: usize,
}

impl BatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self, max_sorted_instances: usize) {
        self.batches.clear();
        self.groups.clear();
        self.group_lookup.clear();
        self.sorted_batches.clear();
        self.sorted_groups.clear();
        self.max_sorted_instances = max_sorted_instances;
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty() && self.groups.is_empty()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn groups(&self) -> &[BatchGroup] {
        &self.groups
    }

    pub fn groups_mut(&mut self) -> &mut [BatchGroup] {
        &mut self.groups
    }

    pub fn push_batch(&mut self, batch: Batch) {
        self.batches.push(batch);
    }

    /// Merges a batch into the group with the same structural key, or starts
    /// a new group. Returns the group index and its instance count after the
    /// merge so the caller can promote the group to instanced shaders when
    /// it crosses the threshold.
    pub fn merge_into_group(&mut self, batch: Batch) -> (usize, usize) {
        let key = batch.grouping_key();
        if let Some(&index) = self.group_lookup.get(&key) {
            let group = &mut self.groups[index];
            group.add_instance(batch.transform, batch.distance);
            (index, group.instances.len())
        } else {
            let index = self.groups.len();
            self.groups.push(BatchGroup::from_batch(batch));
            self.group_lookup.insert(key, index);
            (index, 1)
        }
    }

    pub fn total_instances(&self) -> usize {
        self.batches.len() + self.groups.iter().map(|g| g.instances.len()).sum::<usize>()
    }

    /// State-first sort. The name is kept from the original pipeline, where
    /// this ordering serves the back-to-front transparency pass: render
    /// order, then packed state key, then distance (far first) as the tie
    /// break. Groups order by render order alone.
    pub fn sort_back_to_front(&mut self) {
        self.sorted_batches = (0..self.batches.len()).collect();
        let batches = &self.batches;
        self.sorted_batches.sort_by(|&a, &b| {
            let (a, b) = (&batches[a], &batches[b]);
            a.render_order
                .cmp(&b.render_order)
                .then(a.sort_key.cmp(&b.sort_key))
                .then(b.distance.total_cmp(&a.distance))
        });

        self.sorted_groups = (0..self.groups.len()).collect();
        let groups = &self.groups;
        self.sorted_groups
            .sort_by(|&a, &b| groups[a].batch.render_order.cmp(&groups[b].batch.render_order));
    }

    /// Two-pass front-to-back sort: first a strict distance order, then a
    /// first-seen dense remap of the shader/material/geometry key components,
    /// then a re-sort on the rewritten keys. Nearer batches receive lower
    /// remapped ids, so the final order trades exact distance order for
    /// fewer state changes among comparably distant batches. Intentional;
    /// do not replace with a plain distance sort.
    pub fn sort_front_to_back(&mut self) {
        self.sorted_batches = (0..self.batches.len()).collect();
        {
            let batches = &self.batches;
            self.sorted_batches.sort_by(|&a, &b| {
                let (a, b) = (&batches[a], &batches[b]);
                a.render_order
                    .cmp(&b.render_order)
                    .then(a.distance.total_cmp(&b.distance))
                    .then(a.sort_key.cmp(&b.sort_key))
            });
        }

        // Queue-local scratch; queues sort concurrently on worker threads,
        // so these must never be shared state.
        let mut shader_remap: HashMap<u16, u16> = HashMap::new();
        let mut material_remap: HashMap<u16, u16> = HashMap::new();
        let mut geometry_remap: HashMap<u16, u16> = HashMap::new();

        for &index in &self.sorted_batches {
            let batch = &mut self.batches[index];
            let shader = (batch.sort_key >> 48) as u16;
            let light_queue = ((batch.sort_key >> 32) & 0xffff) as u16;
            let material = ((batch.sort_key >> 16) & 0xffff) as u16;
            let geometry = (batch.sort_key & 0xffff) as u16;

            let next_shader = shader_remap.len() as u16;
            let shader = *shader_remap.entry(shader).or_insert(next_shader);
            let next_material = material_remap.len() as u16;
            let material = *material_remap.entry(material).or_insert(next_material);
            let next_geometry = geometry_remap.len() as u16;
            let geometry = *geometry_remap.entry(geometry).or_insert(next_geometry);

            batch.sort_key = ((shader as u64) << 48)
                | ((light_queue as u64) << 32)
                | ((material as u64) << 16)
                | geometry as u64;
        }

        let batches = &self.batches;
        self.sorted_batches.sort_by(|&a, &b| {
            let (a, b) = (&batches[a], &batches[b]);
            a.render_order
                .cmp(&b.render_order)
                .then(a.sort_key.cmp(&b.sort_key))
        });

        // Groups sort front to back by their nearest instance; oversized
        // groups skip the per-instance sort.
        for group in &mut self.groups {
            if group.instances.len() <= self.max_sorted_instances {
                group
                    .instances
                    .sort_by(|a, b| a.distance.total_cmp(&b.distance));
            }
            group.batch.distance = group
                .instances
                .first()
                .map(|i| i.distance)
                .unwrap_or(0.0);
        }
        self.sorted_groups = (0..self.groups.len()).collect();
        let groups = &self.groups;
        self.sorted_groups.sort_by(|&a, &b| {
            let (a, b) = (&groups[a].batch, &groups[b].batch);
            a.render_order
                .cmp(&b.render_order)
                .then(a.distance.total_cmp(&b.distance))
        });
    }

    /// Issues the queue in sorted order: groups first, then loose batches.
    pub fn draw(&self, ctx: &mut DrawContext<'_>) {
        for &index in &self.sorted_groups {
            draw_group(&self.groups[index], ctx);
        }
        for &index in &self.sorted_batches {
            draw_batch(&self.batches[index], ctx);
        }
    }
}

fn prepare_batch(batch: &Batch, ctx: &mut DrawContext<'_>) -> bool {
    let Some(shaders) = batch.shaders else {
        return false;
    };
    let Some(material) = ctx.assets.materials.get(batch.material) else {
        return false;
    };
    let Some(technique) = ctx.assets.techniques.get(material.technique) else {
        return false;
    };
    let Some(pass) = technique.pass(batch.pass_index) else {
        return false;
    };

    ctx.graphics.set_shaders(shaders);
    ctx.graphics.set_blend_mode(pass.blend_mode);
    ctx.graphics.set_depth_test(pass.depth_test);
    ctx.graphics.set_depth_write(pass.depth_write);

    for (name, value) in &material.shader_parameters {
        ctx.graphics.set_shader_parameter(name, *value);
    }
    for &(unit, texture) in &material.textures {
        ctx.graphics.set_texture(unit, Some(texture));
    }

    let Some(geometry) = ctx.assets.geometries.get(batch.geometry) else {
        return false;
    };
    ctx.graphics.set_vertex_buffer(geometry.vertex_buffer);
    ctx.graphics.set_index_buffer(geometry.index_buffer);
    true
}

fn draw_batch(batch: &Batch, ctx: &mut DrawContext<'_>) {
    if !prepare_batch(batch, ctx) {
        return;
    }
    let Some(geometry) = ctx.assets.geometries.get(batch.geometry) else {
        return;
    };
    ctx.graphics.set_shader_parameter(
        "WorldViewProj",
        ShaderParam::Mat4(ctx.view_proj * batch.transform),
    );
    ctx.graphics
        .set_shader_parameter("World", ShaderParam::Mat4(batch.transform));
    ctx.graphics
        .draw_indexed(geometry.index_start, geometry.index_count, 1);
}

fn draw_group(group: &BatchGroup, ctx: &mut DrawContext<'_>) {
    if group.instances.is_empty() || !prepare_batch(&group.batch, ctx) {
        return;
    }
    let Some(geometry) = ctx.assets.geometries.get(group.batch.geometry) else {
        return;
    };

    let instanced = group.batch.geometry_type == GeometryType::Instanced
        && group.instances.len() >= ctx.min_instances
        && ctx.instancing_buffer.is_some();

    if instanced {
        ctx.graphics
            .set_shader_parameter("ViewProj", ShaderParam::Mat4(ctx.view_proj));
        ctx.graphics
            .set_instance_buffer(ctx.instancing_buffer, group.start_index);
        ctx.graphics.draw_indexed(
            geometry.index_start,
            geometry.index_count,
            group.instances.len() as u32,
        );
        ctx.graphics.set_instance_buffer(None, 0);
    } else {
        for instance in &group.instances {
            ctx.graphics.set_shader_parameter(
                "WorldViewProj",
                ShaderParam::Mat4(ctx.view_proj * instance.transform),
            );
            ctx.graphics
                .set_shader_parameter("World", ShaderParam::Mat4(instance.transform));
            ctx.graphics
                .draw_indexed(geometry.index_start, geometry.index_count, 1);
        }
    }
}

/// One shadow-casting sub-view of a light: cascade, cube face or the single
/// spot split, with its own camera, atlas viewport and caster batches.
pub struct ShadowBatchQueue {
    pub shadow_camera: Camera,
    /// Atlas tile, assigned once the shadow map is allocated.
    pub shadow_viewport: IntRect,
    pub near_split: f32,
    pub far_split: f32,
    /// Caster bounds in light view space, for camera focusing.
    pub caster_box: crate::math::BoundingBox,
    pub shadow_batches: BatchQueue,
}

impl ShadowBatchQueue {
    pub fn new(shadow_camera: Camera) -> Self {
        Self {
            shadow_camera,
            shadow_viewport: IntRect::ZERO,
            near_split: 0.0,
            far_split: 0.0,
            caster_box: crate::math::BoundingBox::UNDEFINED,
            shadow_batches: BatchQueue::new(),
        }
    }
}

/// Per-light aggregate: the light's lit queues, its shadow splits and the
/// shadow-map texture borrowed from the renderer pool for this frame.
/// Synthetic vertex-light queues have no light of their own, only the
/// `vertex_lights` list shared by the geometries that reference them.
pub struct LightBatchQueue {
    pub light: Option<LightId>,
    pub negative: bool,
    pub shadow_map: Option<ShadowMap>,
    pub lit_base_batches: BatchQueue,
    pub lit_batches: BatchQueue,
    pub shadow_splits: Vec<ShadowBatchQueue>,
    pub vertex_lights: Vec<LightId>,
    pub volume_batches: Vec<Batch>,
}

impl LightBatchQueue {
    pub fn for_light(light: LightId, negative: bool) -> Self {
        Self {
            light: Some(light),
            negative,
            shadow_map: None,
            lit_base_batches: BatchQueue::new(),
            lit_batches: BatchQueue::new(),
            shadow_splits: Vec::new(),
            vertex_lights: Vec::new(),
            volume_batches: Vec::new(),
        }
    }

    pub fn for_vertex_lights(lights: Vec<LightId>) -> Self {
        Self {
            light: None,
            negative: false,
            shadow_map: None,
            lit_base_batches: BatchQueue::new(),
            lit_batches: BatchQueue::new(),
            shadow_splits: Vec::new(),
            vertex_lights: lights,
            volume_batches: Vec::new(),
        }
    }

    pub fn has_lit_batches(&self) -> bool {
        !self.lit_base_batches.is_empty()
            || !self.lit_batches.is_empty()
            || !self.volume_batches.is_empty()
    }
}
