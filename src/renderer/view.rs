use std::collections::HashMap;

use glam::{Mat4, Vec2, Vec3, Vec4, Vec4Swizzles};
use log::{debug, warn};
use rayon::prelude::*;

use crate::graphics::{
    BlendMode, ClearFlags, CompareMode, Graphics, ShaderPair, ShaderParam, TextureFormat,
    TextureHandle,
};
use crate::math::{Frustum, IntRect};
use crate::resources::{Assets, PassRegistry};
use crate::scene::{
    Camera, DrawableId, GeometryType, Light, LightId, LightType, Scene, SpatialIndex,
    UpdateGeometryKind, ZoneId,
};

use super::batch::{Batch, InstanceRows};
use super::occlusion::OcclusionBuffer;
use super::queue::{BatchQueue, DrawContext, LightBatchQueue};
use super::render_path::{CommandKind, RenderPath, RenderPathCommand, SortMode};
use super::renderer::Renderer;
use super::shadows;

/// Drawables per parallel culling work item.
const CULL_CHUNK: usize = 128;

/// Per-frame timing shared by every view rendered that frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameInfo {
    pub frame_number: u64,
    pub time_step: f32,
}

/// An output rectangle paired with the camera and path that fill it.
#[derive(Debug, Clone)]
pub struct Viewport {
    pub rect: IntRect,
    pub camera: Camera,
    pub render_path: RenderPath,
}

impl Viewport {
    pub fn new(camera: Camera, render_path: RenderPath) -> Self {
        Self {
            rect: IntRect::ZERO,
            camera,
            render_path,
        }
    }
}

/// Whether this view culls for itself or borrows another view's prepared
/// queues because both share the same culling camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullSource {
    Owned,
    Shared { camera_id: u32 },
}

/// Events a render path emits for external collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    RenderUi,
    Custom(String),
}

/// Pass indices in effect for this view, after render-path metadata
/// substitution of the default families.
#[derive(Debug, Clone, Copy)]
struct PassIndices {
    base: usize,
    litbase: usize,
    light: usize,
    alpha: usize,
    litalpha: usize,
    shadow: usize,
}

impl Default for PassIndices {
    fn default() -> Self {
        Self {
            base: PassRegistry::BASE,
            litbase: PassRegistry::LITBASE,
            light: PassRegistry::LIGHT,
            alpha: PassRegistry::ALPHA,
            litalpha: PassRegistry::LITALPHA,
            shadow: PassRegistry::SHADOW,
        }
    }
}

/// One enabled scene-pass command resolved at define time.
#[derive(Debug, Clone, Copy)]
struct ScenePassInfo {
    command_index: usize,
    pass_index: usize,
    queue_index: usize,
    sort: SortMode,
    vertex_lights: bool,
    mark_to_stencil: bool,
}

struct CullResult {
    visible: Vec<(DrawableId, f32, f32, f32, Option<ZoneId>)>,
}

struct LightQuery {
    light: LightId,
    lit_geometries: Vec<DrawableId>,
    splits: Vec<(super::queue::ShadowBatchQueue, Vec<DrawableId>)>,
}

/// The per-viewport frame orchestrator: culls, processes lights, builds the
/// batch queues and finally interprets the render path. Reused across frames
/// so the queue allocations amortize.
pub struct View {
    render_target: Option<TextureHandle>,
    view_rect: IntRect,
    /// Rendering into a texture flips the viewport for consistent UVs.
    flip_vertical: bool,
    render_path: RenderPath,
    camera: Camera,
    pub cull_source: CullSource,
    deferred: bool,
    has_scene_passes: bool,
    passes: PassIndices,
    scene_passes: Vec<ScenePassInfo>,
    queue_for_pass: HashMap<usize, usize>,
    batch_queues: Vec<BatchQueue>,
    /// Sort mode per queue, resolved from the owning command.
    queue_sorts: Vec<SortMode>,
    light_queues: Vec<LightBatchQueue>,
    vertex_light_queues: HashMap<u64, u16>,

    frame: FrameInfo,
    geometries: Vec<DrawableId>,
    lights: Vec<LightId>,
    occlusion: Option<OcclusionBuffer>,
    camera_zone: Option<ZoneId>,
    far_clip_zone: Option<ZoneId>,
    min_z: f32,
    max_z: f32,
    instance_rows: Vec<InstanceRows>,
}

impl View {
    pub fn new() -> Self {
        Self {
            render_target: None,
            view_rect: IntRect::ZERO,
            flip_vertical: false,
            render_path: RenderPath::default(),
            camera: Camera::default(),
            cull_source: CullSource::Owned,
            deferred: false,
            has_scene_passes: false,
            passes: PassIndices::default(),
            scene_passes: Vec::new(),
            queue_for_pass: HashMap::new(),
            batch_queues: Vec::new(),
            queue_sorts: Vec::new(),
            light_queues: Vec::new(),
            vertex_light_queues: HashMap::new(),
            frame: FrameInfo::default(),
            geometries: Vec::new(),
            lights: Vec::new(),
            occlusion: None,
            camera_zone: None,
            far_clip_zone: None,
            min_z: 0.0,
            max_z: 0.0,
            instance_rows: Vec::new(),
        }
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn view_rect(&self) -> IntRect {
        self.view_rect
    }

    pub fn visible_geometries(&self) -> &[DrawableId] {
        &self.geometries
    }

    pub fn visible_lights(&self) -> &[LightId] {
        &self.lights
    }

    pub fn light_queues(&self) -> &[LightBatchQueue] {
        &self.light_queues
    }

    pub fn batch_queue_for_pass(&self, pass_index: usize) -> Option<&BatchQueue> {
        self.queue_for_pass
            .get(&pass_index)
            .map(|&i| &self.batch_queues[i])
    }

    pub fn z_range(&self) -> (f32, f32) {
        (self.min_z, self.max_z)
    }

    /// Validates the viewport against the target, scans the render path and
    /// resolves pass substitution. Returns false when the view cannot render
    /// this frame: scene passes without a usable scene, a loading scene, a
    /// degenerate projection or an empty rectangle.
    #[allow(clippy::too_many_arguments)]
    pub fn define(
        &mut self,
        graphics: &dyn Graphics,
        render_target: Option<(TextureHandle, u32, u32)>,
        viewport: &Viewport,
        scene: Option<&Scene>,
        registry: &mut PassRegistry,
        source: Option<&View>,
    ) -> bool {
        let (target, target_width, target_height) = match render_target {
            Some((texture, width, height)) => (Some(texture), width, height),
            None => {
                let (width, height) = graphics.backbuffer_size();
                (None, width, height)
            }
        };
        let full = IntRect::new(0, 0, target_width as i32, target_height as i32);
        let rect = if viewport.rect.is_empty() {
            full
        } else {
            viewport.rect.clamped_to(full)
        };
        if rect.is_empty() {
            warn!("Viewport rectangle is empty, view not defined");
            return false;
        }

        self.render_target = target;
        self.view_rect = rect;
        self.flip_vertical = target.is_some();
        self.render_path = viewport.render_path.clone();
        self.camera = viewport.camera.clone();
        self.passes = PassIndices::default();
        self.scene_passes.clear();
        self.queue_for_pass.clear();
        self.batch_queues.clear();
        self.queue_sorts.clear();
        self.deferred = self.render_path.has_light_volumes();

        // First scan: metadata substitution of the default pass families.
        let commands: Vec<(usize, RenderPathCommand)> = self
            .render_path
            .commands
            .iter()
            .enumerate()
            .filter(|(_, c)| c.enabled)
            .map(|(i, c)| (i, c.clone()))
            .collect();
        for (_, command) in &commands {
            if let CommandKind::ScenePass { pass, metadata, .. } = &command.kind {
                match metadata.as_str() {
                    "base" => {
                        self.passes.base = registry.get_or_register(pass);
                        self.passes.litbase = registry.get_or_register(&format!("lit{}", pass));
                    }
                    "alpha" => {
                        self.passes.alpha = registry.get_or_register(pass);
                        self.passes.litalpha = registry.get_or_register(&format!("lit{}", pass));
                    }
                    _ => {}
                }
            }
            if let CommandKind::ForwardLights { pass, .. } = &command.kind {
                self.passes.light = registry.get_or_register(pass);
            }
        }

        // Second scan: one batch queue per distinct scene-pass index.
        for (command_index, command) in &commands {
            let CommandKind::ScenePass {
                pass,
                sort,
                vertex_lights,
                mark_to_stencil,
                ..
            } = &command.kind
            else {
                continue;
            };
            let pass_index = registry.get_or_register(pass);
            let queue_index = *self.queue_for_pass.entry(pass_index).or_insert_with(|| {
                self.batch_queues.push(BatchQueue::new());
                self.queue_sorts.push(*sort);
                self.batch_queues.len() - 1
            });
            self.scene_passes.push(ScenePassInfo {
                command_index: *command_index,
                pass_index,
                queue_index,
                sort: *sort,
                vertex_lights: *vertex_lights,
                mark_to_stencil: *mark_to_stencil,
            });
        }
        self.has_scene_passes = !self.scene_passes.is_empty();

        if self.has_scene_passes {
            let Some(scene) = scene else {
                warn!("Scene passes require a scene, view not defined");
                return false;
            };
            if scene.loading {
                debug!("Scene is loading, view not defined");
                return false;
            }
            if !self.camera.projection_valid() {
                warn!("Camera projection is degenerate, view not defined");
                return false;
            }
        }

        // A prepared view with the same culling camera lends us its queues.
        self.cull_source = match source {
            Some(other)
                if other.camera.id == self.camera.id
                    && matches!(other.cull_source, CullSource::Owned) =>
            {
                CullSource::Shared {
                    camera_id: self.camera.id,
                }
            }
            _ => CullSource::Owned,
        };
        true
    }

    /// Culling phase: zones, occluders, geometry and light visibility, with
    /// the per-drawable work fanned out across the thread pool. Follower
    /// views skip this entirely.
    pub fn update(
        &mut self,
        frame: &FrameInfo,
        scene: &mut Scene,
        renderer: &mut Renderer,
        assets: &Assets,
    ) {
        self.frame = *frame;
        if matches!(self.cull_source, CullSource::Shared { .. }) {
            return;
        }
        renderer.stats.views += 1;

        self.geometries.clear();
        self.lights.clear();
        self.light_queues.clear();
        self.vertex_light_queues.clear();
        self.instance_rows.clear();
        for queue in &mut self.batch_queues {
            queue.clear(renderer.settings.max_sorted_instances);
        }
        if let Some(buffer) = self.occlusion.take() {
            renderer.return_occlusion_buffer(buffer);
        }

        if self.camera.auto_aspect {
            self.camera
                .set_aspect(self.view_rect.width() as f32 / self.view_rect.height() as f32);
        }
        let frustum = self.camera.frustum();

        scene.reset_frame_state();

        // Zone resolution: the highest priority zone containing the camera,
        // and the one containing the far clip point as fog fallback.
        let zone_ids = scene.zones_in_frustum(&frustum);
        self.camera_zone = highest_priority_zone(scene, &zone_ids, self.camera.position);
        self.far_clip_zone =
            highest_priority_zone(scene, &zone_ids, self.camera.far_clip_point())
                .or(self.camera_zone);

        if renderer.settings.max_occluder_triangles > 0 {
            self.rasterize_occluders(scene, renderer, assets, &frustum);
        }

        let candidates = scene.geometries_in_frustum(&frustum, self.camera.view_mask);
        let light_ids = scene.lights_in_frustum(&frustum, self.camera.view_mask);

        // Parallel visibility: thread-local buckets, merged in order below.
        let camera = &self.camera;
        let occlusion = self.occlusion.as_ref();
        let zones: Vec<ZoneId> = zone_ids;
        let scene_ref: &Scene = scene;
        let results: Vec<CullResult> = candidates
            .par_chunks(CULL_CHUNK)
            .map(|chunk| {
                let mut visible = Vec::with_capacity(chunk.len());
                for &id in chunk {
                    let drawable = scene_ref.drawable(id);
                    let distance = camera.distance(drawable.bounds.center());
                    if drawable.draw_distance > 0.0 && distance > drawable.draw_distance {
                        continue;
                    }
                    if drawable.occludee {
                        if let Some(buffer) = occlusion {
                            if !buffer.is_visible(&drawable.bounds) {
                                continue;
                            }
                        }
                    }
                    let (min_z, max_z) = camera.depth_range(&drawable.bounds);
                    let zone =
                        drawable_zone(scene_ref, &zones, drawable.bounds.center(), drawable.zone_mask);
                    visible.push((id, distance, min_z, max_z, zone));
                }
                CullResult { visible }
            })
            .collect();

        // Deterministic sequential merge.
        self.min_z = f32::INFINITY;
        self.max_z = f32::NEG_INFINITY;
        for result in results {
            for (id, distance, min_z, max_z, zone) in result.visible {
                let camera_zone = self.camera_zone;
                let drawable = scene.drawable_mut(id);
                drawable.frame.in_view = true;
                drawable.frame.distance = distance;
                drawable.frame.min_z = min_z;
                drawable.frame.max_z = max_z;
                drawable.frame.zone = zone.or(camera_zone);
                self.min_z = self.min_z.min(min_z);
                self.max_z = self.max_z.max(max_z);
                self.geometries.push(id);
            }
        }
        if self.geometries.is_empty() {
            self.min_z = self.camera.near;
            self.max_z = self.camera.far;
        }
        renderer.stats.geometries += self.geometries.len() as u32;

        // Light distances, then the global order: vertex lights first, then
        // cheapest per-pixel light so the lit-base optimization sees it first.
        for &id in &light_ids {
            let distance = self.camera.distance(scene.light(id).position);
            let light = &mut scene.lights[id.0 as usize];
            light.frame.distance = distance;
            light.frame.sort_value = light.sort_value(distance);
        }
        self.lights = light_ids;
        self.lights.sort_by(|&a, &b| {
            let (a, b) = (scene.light(a), scene.light(b));
            b.per_vertex
                .cmp(&a.per_vertex)
                .then(a.frame.sort_value.total_cmp(&b.frame.sort_value))
        });
        renderer.stats.lights += self.lights.len() as u32;
    }

    fn rasterize_occluders(
        &mut self,
        scene: &Scene,
        renderer: &mut Renderer,
        assets: &Assets,
        frustum: &Frustum,
    ) {
        let threshold = renderer.settings.occluder_size_threshold;
        let mut occluders: Vec<(DrawableId, f32)> = scene
            .occluders_in_frustum(frustum, self.camera.view_mask)
            .into_iter()
            .filter_map(|id| {
                let drawable = scene.drawable(id);
                let ratio = self.camera.screen_size_ratio(&drawable.bounds);
                if ratio < threshold {
                    return None;
                }
                // Triangle density over screen size: cheap, large occluders
                // rasterize first.
                let triangles: u32 = drawable
                    .batches
                    .iter()
                    .filter_map(|b| assets.geometries.get(b.geometry))
                    .map(|g| g.triangle_count())
                    .sum();
                if triangles == 0 {
                    return None;
                }
                Some((id, triangles as f32 / ratio))
            })
            .collect();
        if occluders.is_empty() {
            return;
        }
        occluders.sort_by(|a, b| a.1.total_cmp(&b.1));

        let mut buffer = renderer.get_occlusion_buffer();
        buffer.set_size(
            renderer.settings.occlusion_buffer_size as usize,
            self.camera.aspect,
        );
        buffer.set_view(&self.camera);
        buffer.set_max_triangles(renderer.settings.max_occluder_triangles as usize);

        'occluders: for (id, _) in occluders {
            let drawable = scene.drawable(id);
            for source in &drawable.batches {
                let Some(geometry) = assets.geometries.get(source.geometry) else {
                    continue;
                };
                if !geometry.has_cpu_data() {
                    continue;
                }
                for transform in &source.transforms {
                    renderer.stats.occluders += 1;
                    if !buffer.draw_triangles(
                        &geometry.cpu_positions,
                        &geometry.cpu_indices,
                        *transform,
                    ) {
                        break 'occluders;
                    }
                }
            }
        }
        self.occlusion = Some(buffer);
    }

    /// Light processing and batch construction. Per-light queries fan out to
    /// the thread pool; queue construction and shadow-map allocation stay on
    /// the orchestrating thread.
    pub fn get_batches(
        &mut self,
        scene: &mut Scene,
        renderer: &mut Renderer,
        assets: &mut Assets,
        graphics: &mut dyn Graphics,
    ) {
        if matches!(self.cull_source, CullSource::Shared { .. }) {
            return;
        }
        let frustum = self.camera.frustum();
        let camera = self.camera.clone();
        let geometries = &self.geometries;
        let scene_ref: &Scene = scene;
        let renderer_ref: &Renderer = renderer;

        // One work item per light.
        let queries: Vec<LightQuery> = self
            .lights
            .par_iter()
            .map(|&light_id| {
                process_light(scene_ref, renderer_ref, &camera, &frustum, geometries, light_id)
            })
            .collect();

        // Record lit lists on the drawables, vertex lights separately.
        for query in &queries {
            let light = scene.light(query.light).clone();
            for &id in &query.lit_geometries {
                let drawable = scene.drawable_mut(id);
                if light.per_vertex {
                    drawable.frame.vertex_lights.push(query.light);
                } else {
                    drawable.frame.lights.push(query.light);
                }
            }
        }

        // Per-drawable light cap: keep the cheapest lights only.
        for &id in &self.geometries {
            let max_lights = scene.drawable(id).max_lights;
            if max_lights == 0 {
                continue;
            }
            let mut lights = std::mem::take(&mut scene.drawable_mut(id).frame.lights);
            if lights.len() > max_lights {
                lights.sort_by(|&a, &b| {
                    scene
                        .light(a)
                        .frame
                        .sort_value
                        .total_cmp(&scene.light(b).frame.sort_value)
                });
                lights.truncate(max_lights);
            }
            scene.drawable_mut(id).frame.lights = lights;
        }

        // Per-pixel light queues, in sorted light order.
        for query in queries {
            let light = scene.light(query.light).clone();
            if light.per_vertex || query.lit_geometries.is_empty() {
                continue;
            }
            let queue_index = self.light_queues.len() as u16;
            let mut queue = LightBatchQueue::for_light(query.light, light.negative);
            queue
                .lit_base_batches
                .clear(renderer.settings.max_sorted_instances);
            queue
                .lit_batches
                .clear(renderer.settings.max_sorted_instances);

            // Shadow-map allocation happens only now, after caster culling
            // confirmed the light needs one.
            let mut splits = query.splits;
            if !splits.is_empty() {
                let shadow_map = renderer.get_shadow_map(
                    graphics,
                    &light,
                    &self.camera,
                    self.view_rect.width() as u32,
                    self.view_rect.height() as u32,
                );
                match shadow_map {
                    Some(map) => {
                        let num_splits = splits.len();
                        for (index, (split, casters)) in splits.iter_mut().enumerate() {
                            split.shadow_viewport = Renderer::shadow_map_viewport(
                                &map,
                                index,
                                light.light_type,
                                num_splits,
                            );
                            split
                                .shadow_batches
                                .clear(renderer.settings.max_sorted_instances);
                            for &caster in casters.iter() {
                                self.add_shadow_batches(
                                    scene, renderer, assets, graphics, &light, split, caster,
                                );
                            }
                        }
                        queue.shadow_map = Some(map);
                        queue.shadow_splits = splits.into_iter().map(|(s, _)| s).collect();
                    }
                    None => {
                        // Demoted to unshadowed.
                        debug!("No shadow map available, light renders unshadowed");
                    }
                }
            }

            let shadowed = queue.shadow_map.is_some();
            for &id in &query.lit_geometries {
                if !scene.drawable(id).frame.lights.contains(&query.light) {
                    continue;
                }
                self.add_lit_batches(
                    scene,
                    renderer,
                    assets,
                    graphics,
                    &light,
                    query.light,
                    queue_index,
                    &mut queue,
                    shadowed,
                    id,
                );
            }

            if self.deferred {
                self.add_light_volume_batch(renderer, assets, graphics, &light, queue_index, &mut queue);
            }

            // Batches in other queues refer to this queue by index, so it is
            // kept even when it ended up empty.
            self.light_queues.push(queue);
        }

        self.build_base_batches(scene, renderer, assets, graphics);
    }

    /// Base-pass batches for every visible drawable, skipping sub-batches a
    /// lit-base batch already covers and grouping shared vertex-light sets
    /// into synthetic queues.
    fn build_base_batches(
        &mut self,
        scene: &mut Scene,
        renderer: &mut Renderer,
        assets: &Assets,
        graphics: &mut dyn Graphics,
    ) {
        let infos = self.scene_passes.clone();
        for info in infos {
            for gi in 0..self.geometries.len() {
                let id = self.geometries[gi];
                let (batch_count, distance, zone, vertex_lights, lit_base_mask) = {
                    let drawable = scene.drawable(id);
                    (
                        drawable.batches.len(),
                        drawable.frame.distance,
                        drawable.frame.zone,
                        drawable.frame.vertex_lights.clone(),
                        drawable.frame.lit_base_mask,
                    )
                };
                for sub in 0..batch_count {
                    // The mask covers the first 64 sub-batches; the rest stay
                    // on the plain base path.
                    if info.pass_index == self.passes.base
                        && sub < 64
                        && lit_base_mask & (1u64 << sub) != 0
                    {
                        continue;
                    }
                    let source = scene.drawable(id).batches[sub].clone();
                    let Some(material) = assets.materials.get(source.material) else {
                        continue;
                    };
                    let Some(technique) = assets.techniques.get(material.technique) else {
                        continue;
                    };
                    if !technique.has_pass(info.pass_index) {
                        continue;
                    }

                    let mut batch = Batch::new(source.geometry, source.material, info.pass_index, Mat4::IDENTITY);
                    batch.geometry_type = source.geometry_type;
                    batch.distance = distance;
                    batch.render_order = material.render_order;
                    batch.zone = zone;
                    if info.vertex_lights && !vertex_lights.is_empty() {
                        batch.light_queue = Some(self.vertex_light_queue(renderer, &vertex_lights));
                    }

                    let queue_index = info.queue_index;
                    let allow_instancing =
                        info.sort == SortMode::FrontToBack && batch.light_queue.is_none();
                    add_transforms_to_queue(
                        &mut self.batch_queues[queue_index],
                        batch,
                        &source.transforms,
                        renderer,
                        assets,
                        graphics,
                        None,
                        false,
                        vertex_lights.len(),
                        allow_instancing,
                    );
                    renderer.stats.batches += 1;
                }
            }
        }
    }

    /// Finds or creates the synthetic queue for a vertex-light set. The key
    /// is a commutative hash so light order never splits a set.
    fn vertex_light_queue(&mut self, renderer: &Renderer, lights: &[LightId]) -> u16 {
        let key = lights.iter().fold(0u64, |acc, &id| {
            acc ^ (id.0 as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        });
        if let Some(&index) = self.vertex_light_queues.get(&key) {
            return index;
        }
        let index = self.light_queues.len() as u16;
        let mut queue = LightBatchQueue::for_vertex_lights(lights.to_vec());
        queue
            .lit_base_batches
            .clear(renderer.settings.max_sorted_instances);
        queue
            .lit_batches
            .clear(renderer.settings.max_sorted_instances);
        self.light_queues.push(queue);
        self.vertex_light_queues.insert(key, index);
        index
    }

    #[allow(clippy::too_many_arguments)]
    fn add_lit_batches(
        &mut self,
        scene: &mut Scene,
        renderer: &mut Renderer,
        assets: &Assets,
        graphics: &mut dyn Graphics,
        light: &Light,
        light_id: LightId,
        queue_index: u16,
        queue: &mut LightBatchQueue,
        shadowed: bool,
        id: DrawableId,
    ) {
        let is_first_light = scene.drawable(id).frame.lights.first() == Some(&light_id);
        let batch_count = scene.drawable(id).batches.len();
        for sub in 0..batch_count {
            let (source, distance, zone) = {
                let drawable = scene.drawable(id);
                (
                    drawable.batches[sub].clone(),
                    drawable.frame.distance,
                    drawable.frame.zone,
                )
            };
            let Some(material) = assets.materials.get(source.material) else {
                continue;
            };
            let Some(technique) = assets.techniques.get(material.technique) else {
                continue;
            };

            let mut batch = Batch::new(source.geometry, source.material, 0, Mat4::IDENTITY);
            batch.geometry_type = source.geometry_type;
            batch.distance = distance;
            batch.render_order = material.render_order;
            batch.zone = zone;
            batch.light_queue = Some(queue_index);

            let transparent = technique.has_pass(self.passes.alpha);
            if transparent {
                // Lit transparency draws in the view's alpha queue, back to
                // front together with the unlit alpha batches.
                if !technique.has_pass(self.passes.litalpha) {
                    continue;
                }
                batch.pass_index = self.passes.litalpha;
                let Some(&alpha_queue) = self.queue_for_pass.get(&self.passes.alpha) else {
                    continue;
                };
                add_transforms_to_queue(
                    &mut self.batch_queues[alpha_queue],
                    batch,
                    &source.transforms,
                    renderer,
                    assets,
                    graphics,
                    Some(light),
                    shadowed,
                    0,
                    false,
                );
            } else if is_first_light
                && technique.has_pass(self.passes.litbase)
                && sub < 64
                && scene.drawable(id).frame.lit_base_mask & (1u64 << sub) == 0
                && !light.negative
            {
                // Base and first light combined in one replace-blend pass.
                batch.pass_index = self.passes.litbase;
                scene.drawable_mut(id).frame.lit_base_mask |= 1u64 << sub;
                add_transforms_to_queue(
                    &mut queue.lit_base_batches,
                    batch,
                    &source.transforms,
                    renderer,
                    assets,
                    graphics,
                    Some(light),
                    shadowed,
                    0,
                    true,
                );
            } else {
                if !technique.has_pass(self.passes.light) {
                    continue;
                }
                batch.pass_index = self.passes.light;
                add_transforms_to_queue(
                    &mut queue.lit_batches,
                    batch,
                    &source.transforms,
                    renderer,
                    assets,
                    graphics,
                    Some(light),
                    shadowed,
                    0,
                    true,
                );
            }
            renderer.stats.batches += 1;
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn add_shadow_batches(
        &mut self,
        scene: &Scene,
        renderer: &mut Renderer,
        assets: &Assets,
        graphics: &mut dyn Graphics,
        light: &Light,
        split: &mut super::queue::ShadowBatchQueue,
        caster: DrawableId,
    ) {
        let drawable = scene.drawable(caster);
        let distance = split.shadow_camera.view_depth(drawable.bounds.center());
        for source in drawable.batches.clone() {
            let Some(material) = assets.materials.get(source.material) else {
                continue;
            };
            let Some(technique) = assets.techniques.get(material.technique) else {
                continue;
            };
            if !technique.has_pass(self.passes.shadow) {
                continue;
            }
            let mut batch = Batch::new(source.geometry, source.material, self.passes.shadow, Mat4::IDENTITY);
            batch.geometry_type = source.geometry_type;
            batch.distance = distance;
            batch.render_order = material.render_order;
            add_transforms_to_queue(
                &mut split.shadow_batches,
                batch,
                &source.transforms,
                renderer,
                assets,
                graphics,
                Some(light),
                false,
                0,
                true,
            );
            renderer.stats.batches += 1;
        }
    }

    fn add_light_volume_batch(
        &mut self,
        renderer: &mut Renderer,
        assets: &mut Assets,
        graphics: &mut dyn Graphics,
        light: &Light,
        queue_index: u16,
        queue: &mut LightBatchQueue,
    ) {
        let Some(geometry) = renderer.light_volume_geometry(graphics, assets, light.light_type)
        else {
            return;
        };
        let transform = match light.light_type {
            LightType::Directional => Mat4::IDENTITY,
            LightType::Point => Mat4::from_scale_rotation_translation(
                Vec3::splat(light.range),
                glam::Quat::IDENTITY,
                light.position,
            ),
            LightType::Spot => {
                let radius = (light.fov_y_radians * 0.5).tan() * light.range;
                Mat4::from_translation(light.position)
                    * Mat4::from_quat(Camera::look_to(Vec3::ZERO, light.direction).rotation)
                    * Mat4::from_scale(Vec3::new(radius, radius, light.range))
            }
        };
        let mut batch = Batch::new(geometry, crate::resources::Handle::new(0), self.passes.light, transform);
        batch.light_queue = Some(queue_index);
        batch.distance = light.frame.distance;
        queue.volume_batches.push(batch);
    }

    /// Queue sorting and CPU geometry rebuilds, fanned out across workers.
    /// Drawables that report a main-thread-only update at this point are
    /// re-routed to a serial pass.
    pub fn update_geometries(&mut self, scene: &mut Scene, renderer: &mut Renderer) {
        if matches!(self.cull_source, CullSource::Shared { .. }) {
            return;
        }

        let sorts = self.queue_sorts.clone();
        self.batch_queues
            .par_iter_mut()
            .zip(sorts.par_iter())
            .for_each(|(queue, sort)| match sort {
                SortMode::FrontToBack => queue.sort_front_to_back(),
                SortMode::BackToFront => queue.sort_back_to_front(),
            });
        self.light_queues.par_iter_mut().for_each(|queue| {
            queue.lit_base_batches.sort_front_to_back();
            queue.lit_batches.sort_front_to_back();
            for split in &mut queue.shadow_splits {
                split.shadow_batches.sort_front_to_back();
            }
        });

        // Worker geometry updates. Each drawable re-evaluates its routing
        // here; one that answers `MainThread` on the worker is left untouched
        // and picked up by the serial loop below.
        let frame = self.frame;
        scene.drawables.par_iter_mut().for_each(|drawable| {
            if !drawable.frame.in_view
                || drawable.update_geometry != UpdateGeometryKind::Worker
            {
                return;
            }
            let kind = drawable
                .on_update_geometry
                .as_ref()
                .map_or(UpdateGeometryKind::Worker, |hook| hook(&frame));
            match kind {
                UpdateGeometryKind::Worker => drawable.frame.geometry_updated = true,
                UpdateGeometryKind::MainThread => drawable.frame.main_thread_update = true,
                UpdateGeometryKind::None => {}
            }
        });
        for drawable in &mut scene.drawables {
            if !drawable.frame.in_view || drawable.frame.geometry_updated {
                continue;
            }
            if drawable.update_geometry == UpdateGeometryKind::MainThread
                || drawable.frame.main_thread_update
            {
                drawable.frame.geometry_updated = true;
            }
        }

        // Deterministic instancing-buffer packing across all queues.
        let min_instances = renderer.settings.min_instances;
        let mut rows: Vec<InstanceRows> = Vec::new();
        {
            let mut pack = |queue: &mut BatchQueue| {
                for group in queue.groups_mut() {
                    if group.instances.len() < min_instances {
                        continue;
                    }
                    group.start_index = rows.len() as u32;
                    rows.extend(
                        group
                            .instances
                            .iter()
                            .map(|i| InstanceRows::from_transform(&i.transform)),
                    );
                }
            };
            for queue in &mut self.batch_queues {
                pack(queue);
            }
            for light_queue in &mut self.light_queues {
                pack(&mut light_queue.lit_base_batches);
                pack(&mut light_queue.lit_batches);
                for split in &mut light_queue.shadow_splits {
                    pack(&mut split.shadow_batches);
                }
            }
        }
        self.instance_rows = rows;
    }

    /// Interprets the render path. GPU submission is strictly sequential on
    /// this thread. A follower view draws its source's prepared queues into
    /// its own viewport.
    pub fn render(
        &self,
        graphics: &mut dyn Graphics,
        renderer: &mut Renderer,
        assets: &Assets,
        scene: Option<&Scene>,
        source: Option<&View>,
    ) -> Vec<ViewEvent> {
        let prep: &View = match (&self.cull_source, source) {
            (CullSource::Shared { .. }, Some(other)) => other,
            _ => self,
        };
        let mut events = Vec::new();

        // Texture targets sample with inverted V, so scene projection flips.
        let view_proj = if self.flip_vertical {
            Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0)) * prep.camera.view_proj()
        } else {
            prep.camera.view_proj()
        };

        // Upload the instancing rows once per prepared view.
        let instancing_buffer = if prep.instance_rows.is_empty() {
            None
        } else {
            let buffer = renderer.ensure_instancing_buffer(graphics, prep.instance_rows.len());
            if let Some(buffer) = buffer {
                graphics.write_buffer(buffer, 0, bytemuck::cast_slice(&prep.instance_rows));
            }
            buffer
        };

        let mut named_targets: HashMap<String, TextureHandle> = HashMap::new();
        let mut viewport_texture: Option<TextureHandle> = None;
        let mut viewport_modified = true;

        for (command_index, command) in self.render_path.commands.clone().into_iter().enumerate() {
            if !command.enabled {
                continue;
            }

            // Resolve viewport reads before touching the render targets.
            if command.reads_viewport() {
                if viewport_modified || viewport_texture.is_none() {
                    let (width, height) =
                        (self.view_rect.width() as u32, self.view_rect.height() as u32);
                    if let Some(texture) = renderer.get_screen_buffer(
                        graphics,
                        width,
                        height,
                        TextureFormat::Rgba8,
                        1,
                        false,
                        false,
                        true,
                        false,
                        0,
                    ) {
                        graphics.copy_texture(None, Some(texture));
                        viewport_texture = Some(texture);
                        viewport_modified = false;
                    }
                }
            }

            match &command.kind {
                CommandKind::Clear {
                    color,
                    depth,
                    stencil,
                    clear_color,
                    clear_depth,
                    clear_stencil,
                } => {
                    self.bind_outputs(graphics, renderer, &command, &mut named_targets);
                    let mut flags = ClearFlags::empty();
                    flags.set(ClearFlags::COLOR, *color);
                    flags.set(ClearFlags::DEPTH, *depth);
                    flags.set(ClearFlags::STENCIL, *stencil);
                    graphics.clear(flags, Vec4::from_array(*clear_color), *clear_depth, *clear_stencil);
                    if command.writes_viewport() {
                        viewport_modified = true;
                    }
                }
                CommandKind::ScenePass { .. } => {
                    let Some(info) = self
                        .scene_passes
                        .iter()
                        .find(|info| info.command_index == command_index)
                    else {
                        continue;
                    };
                    let Some(queue) = prep.batch_queue_for_pass(info.pass_index) else {
                        continue;
                    };
                    if queue.is_empty() {
                        continue;
                    }
                    self.bind_outputs(graphics, renderer, &command, &mut named_targets);
                    self.bind_inputs(graphics, &command, &named_targets, viewport_texture);
                    if info.mark_to_stencil {
                        graphics.set_stencil(true, 1, 0xff);
                    }
                    let mut ctx = DrawContext {
                        graphics: &mut *graphics,
                        assets,
                        view_proj,
                        instancing_buffer,
                        min_instances: renderer.settings.min_instances,
                    };
                    queue.draw(&mut ctx);
                    if info.mark_to_stencil {
                        graphics.set_stencil(false, 0, 0);
                    }
                    if command.writes_viewport() {
                        viewport_modified = true;
                    }
                }
                CommandKind::Quad {
                    vertex_shader,
                    pixel_shader,
                    defines,
                    blend,
                } => {
                    self.bind_outputs(graphics, renderer, &command, &mut named_targets);
                    self.bind_inputs(graphics, &command, &named_targets, viewport_texture);
                    let vertex = graphics.create_shader(vertex_shader, defines);
                    let pixel = graphics.create_shader(pixel_shader, defines);
                    let (Some(vertex), Some(pixel)) = (vertex, pixel) else {
                        continue;
                    };
                    graphics.set_shaders(ShaderPair { vertex, pixel });
                    graphics.set_blend_mode(*blend);
                    graphics.set_depth_test(CompareMode::Always);
                    graphics.set_depth_write(false);
                    for (name, values) in &command.shader_parameters {
                        if let Some(param) = shader_param_from_values(values) {
                            graphics.set_shader_parameter(name, param);
                        }
                    }
                    graphics.draw(0, 3);
                    if command.writes_viewport() {
                        viewport_modified = true;
                    }
                }
                CommandKind::ForwardLights {
                    use_scissor,
                    use_stencil,
                    ..
                } => {
                    if prep.light_queues.is_empty() {
                        continue;
                    }
                    for light_queue in &prep.light_queues {
                        if light_queue.light.is_none() {
                            continue;
                        }
                        self.render_shadow_map(graphics, renderer, assets, light_queue);
                        self.bind_outputs(graphics, renderer, &command, &mut named_targets);
                        self.bind_inputs(graphics, &command, &named_targets, viewport_texture);
                        if let Some(map) = light_queue.shadow_map {
                            graphics.set_texture(8, Some(map.texture));
                        }
                        let scissor = if *use_scissor {
                            light_queue
                                .light
                                .and_then(|id| scene.map(|s| s.light(id).clone()))
                                .and_then(|light| {
                                    light_scissor(&light, &prep.camera, self.view_rect)
                                })
                        } else {
                            None
                        };
                        graphics.set_scissor(scissor);
                        if *use_stencil {
                            graphics.set_stencil(true, 1, 0xff);
                        }
                        let mut ctx = DrawContext {
                            graphics: &mut *graphics,
                            assets,
                            view_proj,
                            instancing_buffer,
                            min_instances: renderer.settings.min_instances,
                        };
                        light_queue.lit_base_batches.draw(&mut ctx);
                        light_queue.lit_batches.draw(&mut ctx);
                        if *use_stencil {
                            graphics.set_stencil(false, 0, 0);
                        }
                        graphics.set_scissor(None);
                        graphics.set_texture(8, None);
                    }
                    if command.writes_viewport() {
                        viewport_modified = true;
                    }
                }
                CommandKind::LightVolumes {
                    vertex_shader,
                    pixel_shader,
                    defines,
                } => {
                    for light_queue in &prep.light_queues {
                        if light_queue.volume_batches.is_empty() {
                            continue;
                        }
                        self.render_shadow_map(graphics, renderer, assets, light_queue);
                        self.bind_outputs(graphics, renderer, &command, &mut named_targets);
                        self.bind_inputs(graphics, &command, &named_targets, viewport_texture);
                        let vertex = graphics.create_shader(vertex_shader, defines);
                        let pixel = graphics.create_shader(pixel_shader, defines);
                        let (Some(vertex), Some(pixel)) = (vertex, pixel) else {
                            continue;
                        };
                        graphics.set_shaders(ShaderPair { vertex, pixel });
                        graphics.set_blend_mode(BlendMode::Add);
                        graphics.set_depth_write(false);
                        if let Some(map) = light_queue.shadow_map {
                            graphics.set_texture(8, Some(map.texture));
                        }
                        for batch in &light_queue.volume_batches {
                            let Some(geometry) = assets.geometries.get(batch.geometry) else {
                                continue;
                            };
                            graphics.set_shader_parameter(
                                "WorldViewProj",
                                ShaderParam::Mat4(view_proj * batch.transform),
                            );
                            graphics.set_vertex_buffer(geometry.vertex_buffer);
                            graphics.set_index_buffer(geometry.index_buffer);
                            graphics.draw_indexed(geometry.index_start, geometry.index_count, 1);
                        }
                        graphics.set_texture(8, None);
                    }
                    if command.writes_viewport() {
                        viewport_modified = true;
                    }
                }
                CommandKind::RenderUi => {
                    events.push(ViewEvent::RenderUi);
                }
                CommandKind::SendEvent { event } => {
                    events.push(ViewEvent::Custom(event.clone()));
                }
            }
        }
        events
    }

    /// Renders every split of a light's shadow map, serially. The shared
    /// map-per-size reuse policy depends on this sequencing.
    fn render_shadow_map(
        &self,
        graphics: &mut dyn Graphics,
        renderer: &mut Renderer,
        assets: &Assets,
        light_queue: &LightBatchQueue,
    ) {
        let Some(map) = light_queue.shadow_map else {
            return;
        };
        graphics.reset_render_targets();
        graphics.set_render_target(0, map.dummy_color);
        graphics.set_depth_stencil(Some(map.texture));
        graphics.clear(ClearFlags::DEPTH, Vec4::ZERO, 1.0, 0);
        for split in &light_queue.shadow_splits {
            if split.shadow_batches.is_empty() {
                continue;
            }
            graphics.set_viewport(split.shadow_viewport);
            let mut ctx = DrawContext {
                graphics: &mut *graphics,
                assets,
                view_proj: split.shadow_camera.view_proj(),
                instancing_buffer: None,
                min_instances: renderer.settings.min_instances,
            };
            split.shadow_batches.draw(&mut ctx);
        }
        graphics.reset_render_targets();
    }

    /// Binds a command's outputs: the viewport by default, named targets
    /// through the screen-buffer pool otherwise.
    fn bind_outputs(
        &self,
        graphics: &mut dyn Graphics,
        renderer: &mut Renderer,
        command: &RenderPathCommand,
        named_targets: &mut HashMap<String, TextureHandle>,
    ) {
        graphics.reset_render_targets();
        if command.writes_viewport() && command.outputs.is_empty() {
            graphics.set_render_target(0, self.render_target);
            graphics.set_viewport(self.view_rect);
            return;
        }
        for (index, output) in command.outputs.iter().enumerate() {
            if output == super::render_path::VIEWPORT_TARGET {
                graphics.set_render_target(index, self.render_target);
                continue;
            }
            let Some(texture) =
                self.resolve_named_target(graphics, renderer, output, named_targets)
            else {
                continue;
            };
            graphics.set_render_target(index, Some(texture));
        }
        if let Some(name) = &command.depth_stencil {
            if let Some(texture) = self.resolve_named_target(graphics, renderer, name, named_targets)
            {
                graphics.set_depth_stencil(Some(texture));
            }
        }
        if command.outputs.iter().any(|o| o == super::render_path::VIEWPORT_TARGET) {
            graphics.set_viewport(self.view_rect);
        } else if let Some(info) = command
            .outputs
            .first()
            .and_then(|name| self.render_path.render_target(name))
        {
            let (width, height) = info.size.resolve(
                self.view_rect.width() as u32,
                self.view_rect.height() as u32,
            );
            graphics.set_viewport(IntRect::new(0, 0, width as i32, height as i32));
        }
    }

    fn resolve_named_target(
        &self,
        graphics: &mut dyn Graphics,
        renderer: &mut Renderer,
        name: &str,
        named_targets: &mut HashMap<String, TextureHandle>,
    ) -> Option<TextureHandle> {
        if let Some(&texture) = named_targets.get(name) {
            return Some(texture);
        }
        let info = self.render_path.render_target(name)?;
        let (width, height) = info.size.resolve(
            self.view_rect.width() as u32,
            self.view_rect.height() as u32,
        );
        let persistent_key = if info.persistent {
            name_hash(&info.name)
        } else {
            0
        };
        let texture = renderer.get_screen_buffer(
            graphics,
            width,
            height,
            info.format,
            info.multisample,
            false,
            info.cubemap,
            info.filtered,
            info.srgb,
            persistent_key,
        )?;
        named_targets.insert(name.to_string(), texture);
        Some(texture)
    }

    fn bind_inputs(
        &self,
        graphics: &mut dyn Graphics,
        command: &RenderPathCommand,
        named_targets: &HashMap<String, TextureHandle>,
        viewport_texture: Option<TextureHandle>,
    ) {
        for (unit, source) in &command.texture_bindings {
            let texture = if source == super::render_path::VIEWPORT_TARGET {
                viewport_texture
            } else {
                named_targets.get(source).copied()
            };
            graphics.set_texture(*unit, texture);
        }
    }
}

impl Default for View {
    fn default() -> Self {
        Self::new()
    }
}

/// One light work item: lit geometries plus shadow splits with their caster
/// lists. Runs on worker threads; everything it touches is read-only.
fn process_light(
    scene: &Scene,
    renderer: &Renderer,
    camera: &Camera,
    frustum: &Frustum,
    geometries: &[DrawableId],
    light_id: LightId,
) -> LightQuery {
    let light = scene.light(light_id);

    let lit_geometries: Vec<DrawableId> = match light.light_type {
        LightType::Directional => geometries
            .iter()
            .copied()
            .filter(|&id| scene.drawable(id).light_mask & light.light_mask != 0)
            .collect(),
        LightType::Point => scene
            .lit_geometries_in_sphere(&light.volume_sphere(), light.light_mask)
            .into_iter()
            .filter(|&id| scene.drawable(id).frame.in_view)
            .collect(),
        LightType::Spot => {
            let mut spot = Camera::look_to(light.position, light.direction);
            spot.fov_y_radians = light.fov_y_radians;
            spot.aspect = 1.0;
            spot.auto_aspect = false;
            spot.near = light.shadow_near_clip();
            spot.far = light.range;
            scene
                .lit_geometries_in_frustum(&spot.frustum(), light.light_mask)
                .into_iter()
                .filter(|&id| scene.drawable(id).frame.in_view)
                .collect()
        }
    };

    let mut splits = Vec::new();
    let wants_shadows = light.cast_shadows
        && !light.per_vertex
        && !lit_geometries.is_empty()
        && (light.shadow_distance <= 0.0 || light.frame.distance < light.shadow_distance);
    if wants_shadows {
        for mut split in shadows::setup_shadow_cameras(renderer, light, camera) {
            let casters = shadows::collect_shadow_casters(scene, light, camera, frustum, &mut split);
            if !casters.is_empty() {
                shadows::focus_shadow_camera(&mut split, light);
                splits.push((split, casters));
            }
        }
    }

    LightQuery {
        light: light_id,
        lit_geometries,
        splits,
    }
}

/// Shared batch-insertion policy: multi-transform sources split or instance,
/// groups promote to instanced shaders at the configured threshold.
#[allow(clippy::too_many_arguments)]
fn add_transforms_to_queue(
    queue: &mut BatchQueue,
    template: Batch,
    transforms: &[Mat4],
    renderer: &mut Renderer,
    assets: &Assets,
    graphics: &mut dyn Graphics,
    light: Option<&Light>,
    shadowed: bool,
    vertex_light_count: usize,
    allow_instancing: bool,
) {
    let instancing = allow_instancing
        && renderer.settings.dynamic_instancing
        && template.geometry_type == GeometryType::Static;

    for transform in transforms {
        let mut batch = template.clone();
        batch.transform = *transform;
        if !renderer.set_batch_shaders(graphics, assets, &mut batch, light, shadowed, vertex_light_count) {
            continue;
        }
        if instancing {
            let (group_index, count) = queue.merge_into_group(batch);
            // Crossing the threshold switches the whole group to the
            // instanced shader variant.
            if count == renderer.settings.min_instances {
                let group = &mut queue.groups_mut()[group_index];
                group.batch.geometry_type = GeometryType::Instanced;
                let mut promoted = group.batch.clone();
                if renderer.set_batch_shaders(
                    graphics,
                    assets,
                    &mut promoted,
                    light,
                    shadowed,
                    vertex_light_count,
                ) {
                    queue.groups_mut()[group_index].batch = promoted;
                }
            }
        } else {
            queue.push_batch(batch);
        }
    }
}

fn highest_priority_zone(scene: &Scene, zones: &[ZoneId], point: Vec3) -> Option<ZoneId> {
    zones
        .iter()
        .copied()
        .filter(|&id| scene.zone(id).contains_point(point))
        .max_by_key(|&id| scene.zone(id).priority)
}

fn drawable_zone(
    scene: &Scene,
    zones: &[ZoneId],
    point: Vec3,
    zone_mask: u32,
) -> Option<ZoneId> {
    zones
        .iter()
        .copied()
        .filter(|&id| {
            let zone = scene.zone(id);
            zone.zone_mask & zone_mask != 0 && zone.contains_point(point)
        })
        .max_by_key(|&id| scene.zone(id).priority)
}

/// Screen-space scissor covering a local light's volume, or `None` when the
/// volume reaches behind the near plane or covers the whole viewport.
fn light_scissor(light: &Light, camera: &Camera, view_rect: IntRect) -> Option<IntRect> {
    if light.light_type == LightType::Directional {
        return None;
    }
    let view_proj = camera.view_proj();
    let mut min = Vec2::splat(f32::MAX);
    let mut max = Vec2::splat(f32::MIN);
    for corner in light.world_bounds().corners() {
        let clip = view_proj * corner.extend(1.0);
        if clip.w <= 0.0 {
            return None;
        }
        let ndc = clip.xyz() / clip.w;
        min = min.min(Vec2::new(ndc.x, ndc.y));
        max = max.max(Vec2::new(ndc.x, ndc.y));
    }
    if min.x <= -1.0 && min.y <= -1.0 && max.x >= 1.0 && max.y >= 1.0 {
        return None;
    }
    let width = view_rect.width() as f32;
    let height = view_rect.height() as f32;
    let rect = IntRect::new(
        view_rect.left + ((min.x * 0.5 + 0.5) * width) as i32,
        view_rect.top + ((0.5 - max.y * 0.5) * height) as i32,
        view_rect.left + ((max.x * 0.5 + 0.5) * width).ceil() as i32,
        view_rect.top + ((0.5 - min.y * 0.5) * height).ceil() as i32,
    )
    .clamped_to(view_rect);
    if rect.is_empty() {
        None
    } else {
        Some(rect)
    }
}

fn shader_param_from_values(values: &[f32]) -> Option<ShaderParam> {
    match values.len() {
        1 => Some(ShaderParam::Float(values[0])),
        2 => Some(ShaderParam::Vec2(Vec2::new(values[0], values[1]))),
        3 => Some(ShaderParam::Vec3(Vec3::new(values[0], values[1], values[2]))),
        4 => Some(ShaderParam::Vec4(Vec4::new(
            values[0], values[1], values[2], values[3],
        ))),
        _ => None,
    }
}

fn name_hash(name: &str) -> u64 {
    // FNV-1a, stable across runs for persistent-buffer identity.
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for byte in name.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash | 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::HeadlessGraphics;
    use crate::scene::{Camera, Light, Scene};

    fn forward_viewport() -> Viewport {
        Viewport::new(Camera::default(), RenderPath::forward())
    }

    #[test]
    fn scene_passes_require_a_scene() {
        let graphics = HeadlessGraphics::new(800, 600);
        let mut registry = PassRegistry::new();
        let mut view = View::new();
        let viewport = forward_viewport();

        assert!(!view.define(&graphics, None, &viewport, None, &mut registry, None));

        let scene = Scene::new();
        assert!(view.define(&graphics, None, &viewport, Some(&scene), &mut registry, None));
        assert_eq!(view.view_rect(), IntRect::new(0, 0, 800, 600));
    }

    #[test]
    fn loading_scene_defers_the_view() {
        let graphics = HeadlessGraphics::new(800, 600);
        let mut registry = PassRegistry::new();
        let mut view = View::new();
        let viewport = forward_viewport();

        let mut scene = Scene::new();
        scene.loading = true;
        assert!(!view.define(&graphics, None, &viewport, Some(&scene), &mut registry, None));

        scene.loading = false;
        assert!(view.define(&graphics, None, &viewport, Some(&scene), &mut registry, None));
    }

    #[test]
    fn viewport_rect_is_clamped_to_the_target() {
        let graphics = HeadlessGraphics::new(800, 600);
        let mut registry = PassRegistry::new();
        let mut view = View::new();
        let scene = Scene::new();

        let mut viewport = forward_viewport();
        viewport.rect = IntRect::new(-100, -100, 1000, 1000);
        assert!(view.define(&graphics, None, &viewport, Some(&scene), &mut registry, None));
        assert_eq!(view.view_rect(), IntRect::new(0, 0, 800, 600));

        viewport.rect = IntRect::new(100, 100, 300, 250);
        assert!(view.define(&graphics, None, &viewport, Some(&scene), &mut registry, None));
        assert_eq!(view.view_rect(), IntRect::new(100, 100, 300, 250));
    }

    #[test]
    fn degenerate_projection_is_rejected() {
        let graphics = HeadlessGraphics::new(800, 600);
        let mut registry = PassRegistry::new();
        let mut view = View::new();
        let scene = Scene::new();

        let mut viewport = forward_viewport();
        viewport.camera.near = 10.0;
        viewport.camera.far = 1.0;
        assert!(!view.define(&graphics, None, &viewport, Some(&scene), &mut registry, None));
    }

    #[test]
    fn matching_cull_camera_shares_preparation() {
        let graphics = HeadlessGraphics::new(800, 600);
        let mut registry = PassRegistry::new();
        let scene = Scene::new();
        let viewport = forward_viewport();

        let mut source = View::new();
        assert!(source.define(&graphics, None, &viewport, Some(&scene), &mut registry, None));
        assert_eq!(source.cull_source, CullSource::Owned);

        let mut follower = View::new();
        assert!(follower.define(
            &graphics,
            None,
            &viewport,
            Some(&scene),
            &mut registry,
            Some(&source)
        ));
        assert!(matches!(follower.cull_source, CullSource::Shared { .. }));

        // A different camera keeps its own culling.
        let mut other = forward_viewport();
        other.camera.id = 7;
        let mut independent = View::new();
        assert!(independent.define(
            &graphics,
            None,
            &viewport.clone(),
            Some(&scene),
            &mut registry,
            None
        ));
        assert!(independent.define(
            &graphics,
            None,
            &other,
            Some(&scene),
            &mut registry,
            Some(&source)
        ));
        assert_eq!(independent.cull_source, CullSource::Owned);
    }

    #[test]
    fn base_metadata_substitutes_the_lit_pass_family() {
        let graphics = HeadlessGraphics::new(800, 600);
        let mut registry = PassRegistry::new();
        let scene = Scene::new();

        let mut path = RenderPath::forward();
        for command in &mut path.commands {
            if let CommandKind::ScenePass { pass, metadata, .. } = &mut command.kind {
                if metadata == "base" {
                    *pass = "deferred".to_string();
                }
            }
        }
        let viewport = Viewport::new(Camera::default(), path);

        let mut view = View::new();
        assert!(view.define(&graphics, None, &viewport, Some(&scene), &mut registry, None));
        assert_eq!(view.passes.base, registry.index("deferred").unwrap());
        assert_eq!(view.passes.litbase, registry.index("litdeferred").unwrap());
    }

    #[test]
    fn directional_light_scissor_covers_the_viewport() {
        let camera = Camera::look_to(Vec3::ZERO, Vec3::NEG_Z);
        let light = Light::directional(Vec3::NEG_Y);
        assert!(light_scissor(&light, &camera, IntRect::new(0, 0, 400, 400)).is_none());
    }

    #[test]
    fn distant_point_light_gets_a_sub_rect_scissor() {
        let mut camera = Camera::look_to(Vec3::ZERO, Vec3::NEG_Z);
        camera.auto_aspect = false;
        camera.aspect = 1.0;
        let light = Light::point(Vec3::new(0.0, 0.0, -20.0), 2.0);

        let rect = light_scissor(&light, &camera, IntRect::new(0, 0, 400, 400))
            .expect("light in front of the camera must get a scissor");
        assert!(rect.width() < 400);
        assert!(rect.height() < 400);
        assert_eq!(rect, rect.clamped_to(IntRect::new(0, 0, 400, 400)));
    }

    #[test]
    fn light_volume_crossing_the_near_plane_disables_the_scissor() {
        let camera = Camera::look_to(Vec3::ZERO, Vec3::NEG_Z);
        let light = Light::point(Vec3::ZERO, 5.0);
        assert!(light_scissor(&light, &camera, IntRect::new(0, 0, 400, 400)).is_none());
    }

    #[test]
    fn vertex_light_sets_hash_commutatively() {
        let renderer = Renderer::new(crate::settings::RenderSettings::default());
        let mut view = View::new();

        let a = view.vertex_light_queue(&renderer, &[LightId(3), LightId(9)]);
        let b = view.vertex_light_queue(&renderer, &[LightId(9), LightId(3)]);
        assert_eq!(a, b);
        assert_eq!(view.light_queues().len(), 1);

        let c = view.vertex_light_queue(&renderer, &[LightId(3)]);
        assert_ne!(a, c);
        assert_eq!(view.light_queues().len(), 2);
    }

    #[test]
    fn shader_parameter_values_map_by_arity() {
        assert!(matches!(
            shader_param_from_values(&[1.0]),
            Some(ShaderParam::Float(_))
        ));
        assert!(matches!(
            shader_param_from_values(&[1.0, 2.0, 3.0, 4.0]),
            Some(ShaderParam::Vec4(_))
        ));
        assert!(shader_param_from_values(&[1.0; 5]).is_none());
    }
}
