use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use glam::Vec4;
use log::{debug, error, warn};

use crate::graphics::{
    BufferHandle, ClearFlags, Graphics, ShaderPair, TextureDesc, TextureFormat, TextureHandle,
};
use crate::math::IntRect;
use crate::resources::{Assets, Geometry, Handle, Pass, PassLighting};
use crate::scene::{Camera, GeometryType, Light, LightType};
use crate::settings::RenderSettings;

use super::batch::{Batch, INSTANCE_ROW_SIZE};
use super::occlusion::OcclusionBuffer;

/// Smallest shadow map the auto-shrink may produce.
const SHADOW_MIN_PIXELS: u32 = 64;
/// Screen buffers unused for this many frames are released.
const MAX_BUFFER_AGE: u64 = 25;
/// Halving retries when the backend rejects a shadow-map size.
const SHADOW_MAP_RETRIES: u32 = 3;

/// A pooled shadow-map texture, possibly with a linked color target for
/// backends that cannot bind a depth-only pass.
#[derive(Debug, Clone, Copy)]
pub struct ShadowMap {
    pub texture: TextureHandle,
    pub width: u32,
    pub height: u32,
    pub dummy_color: Option<TextureHandle>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RendererStats {
    pub views: u32,
    pub batches: u32,
    pub lights: u32,
    pub shadow_maps: u32,
    pub occluders: u32,
    pub geometries: u32,
}

struct ScreenBufferEntry {
    texture: TextureHandle,
    last_used_frame: u64,
}

#[derive(Default)]
struct ShadowCameraPool {
    used: usize,
    allocated: usize,
}

/// Process-wide pool manager for everything transient a view needs: shadow
/// maps, screen buffers, occlusion buffers, shadow cameras, the instancing
/// buffer, shared light-volume geometry, and the shader-variant cache.
pub struct Renderer {
    pub settings: RenderSettings,
    pub stats: RendererStats,
    frame_number: u64,

    shadow_maps: HashMap<u32, Vec<ShadowMap>>,
    shadow_map_allocations: HashMap<u32, usize>,
    /// Sizes the backend has permanently rejected.
    shadow_map_failures: HashSet<u32>,

    screen_buffers: HashMap<u64, Vec<ScreenBufferEntry>>,
    screen_buffer_allocations: HashMap<u64, usize>,
    persistent_keys: HashSet<u64>,

    occlusion_buffers: Vec<OcclusionBuffer>,
    /// Locked because light work items request cameras concurrently.
    shadow_cameras: Mutex<ShadowCameraPool>,

    instancing_buffer: Option<BufferHandle>,
    instancing_capacity: u64,

    dir_light_geometry: Option<Handle<Geometry>>,
    point_light_geometry: Option<Handle<Geometry>>,
    spot_light_geometry: Option<Handle<Geometry>>,

    shader_variations: HashMap<(String, String), Option<crate::graphics::ShaderHandle>>,
    shader_pair_ids: HashMap<ShaderPair, u16>,
    /// Techniques already reported for missing shaders.
    shader_errors: HashSet<usize>,
}

impl Renderer {
    pub fn new(settings: RenderSettings) -> Self {
        Self {
            settings,
            stats: RendererStats::default(),
            frame_number: 0,
            shadow_maps: HashMap::new(),
            shadow_map_allocations: HashMap::new(),
            shadow_map_failures: HashSet::new(),
            screen_buffers: HashMap::new(),
            screen_buffer_allocations: HashMap::new(),
            persistent_keys: HashSet::new(),
            occlusion_buffers: Vec::new(),
            shadow_cameras: Mutex::new(ShadowCameraPool::default()),
            instancing_buffer: None,
            instancing_capacity: 0,
            dir_light_geometry: None,
            point_light_geometry: None,
            spot_light_geometry: None,
            shader_variations: HashMap::new(),
            shader_pair_ids: HashMap::new(),
            shader_errors: HashSet::new(),
        }
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Resets per-frame allocation counters. Persistent screen buffers keep
    /// theirs so the same physical buffer comes back across frames.
    pub fn begin_frame(&mut self) {
        self.frame_number += 1;
        self.stats = RendererStats::default();
        for count in self.shadow_map_allocations.values_mut() {
            *count = 0;
        }
        let persistent = &self.persistent_keys;
        for (key, count) in self.screen_buffer_allocations.iter_mut() {
            if !persistent.contains(key) {
                *count = 0;
            }
        }
        if let Ok(mut pool) = self.shadow_cameras.lock() {
            pool.used = 0;
        }
    }

    /// Releases screen buffers that have gone unused past the age limit.
    pub fn end_frame(&mut self, graphics: &mut dyn Graphics) {
        let frame = self.frame_number;
        for entries in self.screen_buffers.values_mut() {
            entries.retain(|entry| {
                let keep = frame.saturating_sub(entry.last_used_frame) <= MAX_BUFFER_AGE;
                if !keep {
                    debug!("Releasing aged screen buffer {:?}", entry.texture);
                    graphics.release_texture(entry.texture);
                }
                keep
            });
        }
        self.screen_buffers.retain(|_, entries| !entries.is_empty());
    }

    // Shadow maps ---------------------------------------------------------

    /// Resolves a shadow map for the light, or `None` when the pool is out
    /// of slots or the backend refuses the size; the caller then demotes
    /// the light to unshadowed. Allocation is deferred to this call, after
    /// caster culling has confirmed the light needs one.
    pub fn get_shadow_map(
        &mut self,
        graphics: &mut dyn Graphics,
        light: &Light,
        camera: &Camera,
        view_width: u32,
        view_height: u32,
    ) -> Option<ShadowMap> {
        let _ = view_width;
        let mut size =
            ((self.settings.shadow_map_size as f32 * light.shadow_resolution) as u32).max(1);

        // Distant point and spot lights get smaller maps: project the light
        // volume's approximate diameter into pixels and clamp.
        if light.light_type != LightType::Directional && light.frame.distance > 0.0 {
            let pixels = (light.range / light.frame.distance) * view_height as f32;
            size = size.min((pixels as u32).max(SHADOW_MIN_PIXELS));
        }
        size = size.clamp(SHADOW_MIN_PIXELS, graphics.max_texture_size());
        size = size.next_power_of_two();

        let (mut width, mut height) = (size, size);
        let splits = light.num_shadow_splits(camera.far);
        match light.light_type {
            LightType::Directional => {
                if splits > 1 {
                    width *= 2;
                }
                if splits > 2 {
                    height *= 2;
                }
            }
            LightType::Point => {
                width *= 2;
                height *= 3;
            }
            LightType::Spot => {}
        }
        let max = graphics.max_texture_size();
        width = width.min(max);
        height = height.min(max);

        let key = (width << 16) | height;
        if self.shadow_map_failures.contains(&key) {
            return None;
        }

        let entries = self.shadow_maps.entry(key).or_default();
        let allocated = self.shadow_map_allocations.entry(key).or_insert(0);

        if self.settings.reuse_shadow_maps {
            // All lights of this size share one texture and render serially.
            if let Some(&existing) = entries.first() {
                self.stats.shadow_maps += 1;
                return Some(existing);
            }
        } else {
            if *allocated < entries.len() {
                let map = entries[*allocated];
                *allocated += 1;
                self.stats.shadow_maps += 1;
                return Some(map);
            }
            if entries.len() >= self.settings.max_shadow_maps {
                return None;
            }
        }

        let format = self.settings.shadow_map_format;
        let created = create_shadow_map(graphics, width, height, format);
        match created {
            Some(map) => {
                entries.push(map);
                *allocated += 1;
                self.stats.shadow_maps += 1;
                Some(map)
            }
            None => {
                warn!(
                    "Shadow map {}x{} rejected by backend, disabling that size",
                    width, height
                );
                self.shadow_map_failures.insert(key);
                None
            }
        }
    }

    /// Atlas tile for one shadow split: directional cascades tile a 2x2
    /// grid, point-light cube faces a 2x3 grid, spot lights use the whole
    /// map.
    pub fn shadow_map_viewport(
        shadow_map: &ShadowMap,
        split: usize,
        light_type: LightType,
        num_splits: usize,
    ) -> IntRect {
        match light_type {
            LightType::Spot => IntRect::new(0, 0, shadow_map.width as i32, shadow_map.height as i32),
            LightType::Directional => {
                let cols: u32 = if num_splits > 1 { 2 } else { 1 };
                let rows: u32 = if num_splits > 2 { 2 } else { 1 };
                let tile_w = (shadow_map.width / cols) as i32;
                let tile_h = (shadow_map.height / rows) as i32;
                let left = (split % cols as usize) as i32 * tile_w;
                let top = (split / cols as usize) as i32 * tile_h;
                IntRect::new(left, top, left + tile_w, top + tile_h)
            }
            LightType::Point => {
                let tile_w = (shadow_map.width / 2) as i32;
                let tile_h = (shadow_map.height / 3) as i32;
                let left = (split % 2) as i32 * tile_w;
                let top = (split / 2) as i32 * tile_h;
                IntRect::new(left, top, left + tile_w, top + tile_h)
            }
        }
    }

    // Screen buffers ------------------------------------------------------

    /// Pool lookup for an off-screen color/depth target. A non-zero
    /// `persistent_key` pins one physical buffer to the caller across
    /// frames; everything else rotates within the frame.
    #[allow(clippy::too_many_arguments)]
    pub fn get_screen_buffer(
        &mut self,
        graphics: &mut dyn Graphics,
        width: u32,
        height: u32,
        format: TextureFormat,
        multisample: u32,
        auto_resolve: bool,
        cubemap: bool,
        filtered: bool,
        srgb: bool,
        persistent_key: u64,
    ) -> Option<TextureHandle> {
        // Depth formats never sample filtered or through sRGB.
        let (filtered, srgb) = if format.is_depth() {
            (false, false)
        } else {
            (filtered, srgb)
        };

        let key = screen_buffer_key(
            width,
            height,
            format,
            multisample,
            auto_resolve,
            cubemap,
            filtered,
            srgb,
        ) ^ persistent_key;
        if persistent_key != 0 {
            self.persistent_keys.insert(key);
        }

        let entries = self.screen_buffers.entry(key).or_default();
        let allocated = self.screen_buffer_allocations.entry(key).or_insert(0);

        if *allocated >= entries.len() {
            let desc = TextureDesc {
                width,
                height,
                format,
                multisample,
                filtered,
                srgb,
                cubemap,
                auto_resolve,
                label: format!("screen buffer {}x{} {:?}", width, height, format),
            };
            let texture = graphics.create_texture(&desc)?;
            // Persistent float buffers start from zero so accumulation
            // passes never inherit NaN from uninitialized memory.
            if persistent_key != 0 && format.is_float() {
                graphics.reset_render_targets();
                graphics.set_render_target(0, Some(texture));
                graphics.clear(ClearFlags::COLOR, Vec4::ZERO, 1.0, 0);
                graphics.reset_render_targets();
            }
            entries.push(ScreenBufferEntry {
                texture,
                last_used_frame: self.frame_number,
            });
        }

        let index = if persistent_key != 0 {
            0
        } else {
            let index = *allocated;
            *allocated += 1;
            index
        };
        let entry = &mut entries[index];
        entry.last_used_frame = self.frame_number;
        Some(entry.texture)
    }

    #[cfg(test)]
    pub(crate) fn screen_buffer_count(&self) -> usize {
        self.screen_buffers.values().map(Vec::len).sum()
    }

    // Occlusion buffers and shadow cameras --------------------------------

    pub fn get_occlusion_buffer(&mut self) -> OcclusionBuffer {
        self.occlusion_buffers.pop().unwrap_or_default()
    }

    pub fn return_occlusion_buffer(&mut self, buffer: OcclusionBuffer) {
        self.occlusion_buffers.push(buffer);
    }

    /// Hands out a fresh shadow camera. Callable from concurrent light work
    /// items; only the bookkeeping is shared.
    pub fn get_shadow_camera(&self) -> Camera {
        if let Ok(mut pool) = self.shadow_cameras.lock() {
            pool.used += 1;
            pool.allocated = pool.allocated.max(pool.used);
        }
        Camera::default()
    }

    // Instancing ----------------------------------------------------------

    /// Instancing vertex buffer with capacity for `instance_count` rows,
    /// grown in powers of two. `None` means instanced groups must fall back
    /// to per-instance draws this frame.
    pub fn ensure_instancing_buffer(
        &mut self,
        graphics: &mut dyn Graphics,
        instance_count: usize,
    ) -> Option<BufferHandle> {
        if !self.settings.dynamic_instancing || !graphics.instancing_supported() {
            return None;
        }
        let needed = (instance_count as u64) * INSTANCE_ROW_SIZE;
        if let Some(buffer) = self.instancing_buffer {
            if needed <= self.instancing_capacity {
                return Some(buffer);
            }
            graphics.release_buffer(buffer);
            self.instancing_buffer = None;
        }
        let capacity = needed.next_power_of_two().max(1024 * INSTANCE_ROW_SIZE);
        match graphics.create_buffer(capacity, "instancing buffer") {
            Some(buffer) => {
                self.instancing_buffer = Some(buffer);
                self.instancing_capacity = capacity;
                Some(buffer)
            }
            None => {
                warn!("Instancing buffer allocation failed, drawing per instance");
                self.instancing_capacity = 0;
                None
            }
        }
    }

    // Light volume geometry -----------------------------------------------

    /// Shared geometry for deferred light volumes: a full-screen quad for
    /// directional lights, a sphere for point lights, a cone for spot
    /// lights. Built once, then reused by every view.
    pub fn light_volume_geometry(
        &mut self,
        graphics: &mut dyn Graphics,
        assets: &mut Assets,
        light_type: LightType,
    ) -> Option<Handle<Geometry>> {
        let slot = match light_type {
            LightType::Directional => &mut self.dir_light_geometry,
            LightType::Point => &mut self.point_light_geometry,
            LightType::Spot => &mut self.spot_light_geometry,
        };
        if let Some(handle) = *slot {
            return Some(handle);
        }
        let (positions, indices) = match light_type {
            LightType::Directional => fullscreen_quad(),
            LightType::Point => sphere_mesh(8, 8),
            LightType::Spot => cone_mesh(8),
        };
        let handle = upload_mesh(graphics, assets, &positions, &indices, light_type)?;
        *slot = Some(handle);
        Some(handle)
    }

    // Shader variants -----------------------------------------------------

    /// Resolves the concrete shader pair for a batch from its pass, geometry
    /// type and light context, then refreshes the sort key. Returns false
    /// when a shader is missing; the error is logged once per technique.
    pub fn set_batch_shaders(
        &mut self,
        graphics: &mut dyn Graphics,
        assets: &Assets,
        batch: &mut Batch,
        light: Option<&Light>,
        shadowed: bool,
        vertex_light_count: usize,
    ) -> bool {
        let Some(material) = assets.materials.get(batch.material) else {
            return false;
        };
        let Some(technique) = assets.techniques.get(material.technique) else {
            return false;
        };
        let Some(pass) = technique.pass(batch.pass_index) else {
            return false;
        };

        if batch.geometry_type == GeometryType::Instanced && !graphics.instancing_supported() {
            batch.geometry_type = GeometryType::Static;
        }

        let mut defines = String::new();
        push_define(&mut defines, geometry_define(batch.geometry_type));
        match pass.lighting {
            PassLighting::Unlit => {}
            PassLighting::PerVertex => {
                push_define(&mut defines, &format!("NUMVERTEXLIGHTS={}", vertex_light_count));
            }
            PassLighting::PerPixel => {
                if let Some(light) = light {
                    push_define(
                        &mut defines,
                        match light.light_type {
                            LightType::Directional => "DIRLIGHT",
                            LightType::Point => "POINTLIGHT",
                            LightType::Spot => "SPOTLIGHT",
                        },
                    );
                    if shadowed {
                        push_define(&mut defines, "SHADOW");
                        if light.shadow_bias.normal_offset > 0.0 {
                            push_define(&mut defines, "NORMALOFFSET");
                        }
                    }
                }
            }
        }

        let vertex = self.get_shader(
            graphics,
            &pass.vertex_shader,
            &join_defines(&pass.vertex_defines, &defines),
        );
        let pixel = self.get_shader(
            graphics,
            &pass.pixel_shader,
            &join_defines(&pass.pixel_defines, &defines),
        );
        let (Some(vertex), Some(pixel)) = (vertex, pixel) else {
            self.report_missing_shaders(material.technique.index() as usize, pass);
            batch.shaders = None;
            return false;
        };

        let pair = ShaderPair { vertex, pixel };
        let next_id = self.shader_pair_ids.len() as u16;
        let id = *self.shader_pair_ids.entry(pair).or_insert(next_id);
        batch.shaders = Some(pair);
        batch.shader_id = id;
        batch.calculate_sort_key();
        true
    }

    fn get_shader(
        &mut self,
        graphics: &mut dyn Graphics,
        name: &str,
        defines: &str,
    ) -> Option<crate::graphics::ShaderHandle> {
        let key = (name.to_string(), defines.to_string());
        if let Some(&cached) = self.shader_variations.get(&key) {
            return cached;
        }
        let shader = graphics.create_shader(name, defines);
        self.shader_variations.insert(key, shader);
        shader
    }

    fn report_missing_shaders(&mut self, technique_index: usize, pass: &Pass) {
        if self.shader_errors.insert(technique_index) {
            error!(
                "Missing shader variation {} / {}, batches using this technique will not render",
                pass.vertex_shader, pass.pixel_shader
            );
        }
    }
}

fn create_shadow_map(
    graphics: &mut dyn Graphics,
    width: u32,
    height: u32,
    format: TextureFormat,
) -> Option<ShadowMap> {
    let (mut width, mut height) = (width, height);
    for _ in 0..SHADOW_MAP_RETRIES {
        let desc = TextureDesc {
            width,
            height,
            format,
            multisample: 1,
            filtered: true,
            srgb: false,
            cubemap: false,
            auto_resolve: false,
            label: format!("shadow map {}x{}", width, height),
        };
        if let Some(texture) = graphics.create_texture(&desc) {
            let dummy_color = if graphics.needs_dummy_color(format) {
                graphics.create_texture(&TextureDesc::render_target(
                    width,
                    height,
                    TextureFormat::Rgba8,
                ))
            } else {
                None
            };
            return Some(ShadowMap {
                texture,
                width,
                height,
                dummy_color,
            });
        }
        width = (width / 2).max(SHADOW_MIN_PIXELS);
        height = (height / 2).max(SHADOW_MIN_PIXELS);
    }
    None
}

/// Packs the full identity of a screen buffer into one pool key.
#[allow(clippy::too_many_arguments)]
pub(crate) fn screen_buffer_key(
    width: u32,
    height: u32,
    format: TextureFormat,
    multisample: u32,
    auto_resolve: bool,
    cubemap: bool,
    filtered: bool,
    srgb: bool,
) -> u64 {
    let flags = (auto_resolve as u64)
        | ((cubemap as u64) << 1)
        | ((filtered as u64) << 2)
        | ((srgb as u64) << 3);
    ((format as u64) << 56)
        | ((multisample as u64 & 0xf) << 52)
        | (flags << 48)
        | ((width as u64 & 0xffff) << 32)
        | ((height as u64 & 0xffff) << 16)
}

fn push_define(defines: &mut String, define: &str) {
    if define.is_empty() {
        return;
    }
    if !defines.is_empty() {
        defines.push(' ');
    }
    defines.push_str(define);
}

fn join_defines(base: &str, extra: &str) -> String {
    match (base.is_empty(), extra.is_empty()) {
        (true, _) => extra.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{} {}", base, extra),
    }
}

fn geometry_define(geometry_type: GeometryType) -> &'static str {
    match geometry_type {
        GeometryType::Static => "",
        GeometryType::Skinned => "SKINNED",
        GeometryType::Instanced => "INSTANCED",
        GeometryType::Billboard => "BILLBOARD",
    }
}

fn fullscreen_quad() -> (Vec<[f32; 3]>, Vec<u32>) {
    (
        vec![
            [-1.0, -1.0, 0.0],
            [1.0, -1.0, 0.0],
            [1.0, 1.0, 0.0],
            [-1.0, 1.0, 0.0],
        ],
        vec![0, 1, 2, 0, 2, 3],
    )
}

fn sphere_mesh(rings: u32, segments: u32) -> (Vec<[f32; 3]>, Vec<u32>) {
    let mut positions = Vec::new();
    let mut indices = Vec::new();
    for ring in 0..=rings {
        let phi = std::f32::consts::PI * ring as f32 / rings as f32;
        for segment in 0..=segments {
            let theta = std::f32::consts::TAU * segment as f32 / segments as f32;
            positions.push([
                phi.sin() * theta.cos(),
                phi.cos(),
                phi.sin() * theta.sin(),
            ]);
        }
    }
    let stride = segments + 1;
    for ring in 0..rings {
        for segment in 0..segments {
            let a = ring * stride + segment;
            let b = a + stride;
            indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
        }
    }
    (positions, indices)
}

fn cone_mesh(segments: u32) -> (Vec<[f32; 3]>, Vec<u32>) {
    // Unit cone along negative Z: apex at origin, base circle at z = -1.
    let mut positions = vec![[0.0, 0.0, 0.0]];
    for segment in 0..segments {
        let theta = std::f32::consts::TAU * segment as f32 / segments as f32;
        positions.push([theta.cos(), theta.sin(), -1.0]);
    }
    let mut indices = Vec::new();
    for segment in 0..segments {
        let current = segment + 1;
        let next = (segment + 1) % segments + 1;
        indices.extend_from_slice(&[0, current, next]);
    }
    // Base cap.
    for segment in 1..segments.saturating_sub(1) {
        indices.extend_from_slice(&[1, segment + 1, segment + 2]);
    }
    (positions, indices)
}

fn upload_mesh(
    graphics: &mut dyn Graphics,
    assets: &mut Assets,
    positions: &[[f32; 3]],
    indices: &[u32],
    light_type: LightType,
) -> Option<Handle<Geometry>> {
    let label = format!("light volume {:?}", light_type);
    let vertex_buffer = graphics.create_buffer((positions.len() * 12) as u64, &label)?;
    graphics.write_buffer(vertex_buffer, 0, bytemuck::cast_slice(positions));
    let index_buffer = graphics.create_buffer((indices.len() * 4) as u64, &label)?;
    graphics.write_buffer(index_buffer, 0, bytemuck::cast_slice(indices));

    let mut geometry = Geometry::new(indices.len() as u32, positions.len() as u32);
    geometry.vertex_buffer = Some(vertex_buffer);
    geometry.index_buffer = Some(index_buffer);
    Some(assets.geometries.insert(geometry))
}
