use std::collections::{HashMap, HashSet};

use glam::{Mat4, Vec4};

use crate::math::IntRect;

use super::{
    BlendMode, BufferHandle, ClearFlags, CompareMode, Graphics, ShaderHandle, ShaderPair,
    ShaderParam, TextureDesc, TextureFormat, TextureHandle,
};

/// Per-frame counters collected by the headless backend. The integration
/// tests read these to verify what the pipeline actually submitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphicsStats {
    pub draw_calls: u32,
    pub instanced_draw_calls: u32,
    pub instances: u32,
    pub clears: u32,
    pub shader_switches: u32,
    pub render_target_switches: u32,
    pub texture_copies: u32,
    pub buffer_writes: u32,
    /// Stencil state enables, counted once per `set_stencil(true, ..)`.
    pub stencil_sets: u32,
    /// Texture creation requests the configured limits rejected.
    pub texture_failures: u32,
}

/// Recording implementation of [`Graphics`]. Creates handles without a GPU,
/// tracks bound state and counts submissions. Texture creation can be
/// configured to fail for chosen formats or above a size limit, which is how
/// the tests exercise the shadow-map retry ladder and screen-buffer
/// degradation paths.
pub struct HeadlessGraphics {
    width: u32,
    height: u32,
    max_texture_size: u32,
    instancing: bool,
    dummy_color_formats: HashSet<TextureFormat>,
    rejected_formats: HashSet<TextureFormat>,
    reject_above: Option<u32>,
    fail_shaders: HashSet<String>,

    next_texture: u32,
    next_buffer: u32,
    next_shader: u32,
    pub textures: HashMap<TextureHandle, TextureDesc>,
    buffers: HashMap<BufferHandle, u64>,
    shaders: HashMap<ShaderHandle, String>,

    current_shaders: Option<ShaderPair>,
    current_targets: [Option<TextureHandle>; 4],
    current_depth_stencil: Option<TextureHandle>,
    pub viewport: IntRect,
    pub scissor: Option<IntRect>,
    blend_mode: BlendMode,
    depth_test: CompareMode,
    depth_write: bool,

    pub stats: GraphicsStats,
    /// Viewport rectangles in the order they were set, kept for the shadow
    /// atlas tiling assertions.
    pub viewport_log: Vec<IntRect>,
    /// Last value set per matrix parameter, kept for projection assertions.
    pub mat4_parameters: HashMap<String, Mat4>,
}

impl HeadlessGraphics {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            max_texture_size: 16384,
            instancing: true,
            dummy_color_formats: HashSet::new(),
            rejected_formats: HashSet::new(),
            reject_above: None,
            fail_shaders: HashSet::new(),
            next_texture: 1,
            next_buffer: 1,
            next_shader: 1,
            textures: HashMap::new(),
            buffers: HashMap::new(),
            shaders: HashMap::new(),
            current_shaders: None,
            current_targets: [None; 4],
            current_depth_stencil: None,
            viewport: IntRect::new(0, 0, width as i32, height as i32),
            scissor: None,
            blend_mode: BlendMode::Replace,
            depth_test: CompareMode::LessEqual,
            depth_write: true,
            stats: GraphicsStats::default(),
            viewport_log: Vec::new(),
            mat4_parameters: HashMap::new(),
        }
    }

    pub fn set_instancing_supported(&mut self, enabled: bool) {
        self.instancing = enabled;
    }

    pub fn reject_format(&mut self, format: TextureFormat) {
        self.rejected_formats.insert(format);
    }

    pub fn reject_textures_above(&mut self, size: u32) {
        self.reject_above = Some(size);
    }

    pub fn require_dummy_color(&mut self, format: TextureFormat) {
        self.dummy_color_formats.insert(format);
    }

    pub fn fail_shader(&mut self, name: &str) {
        self.fail_shaders.insert(name.to_string());
    }

    pub fn begin_frame(&mut self) {
        self.stats = GraphicsStats::default();
        self.viewport_log.clear();
        self.mat4_parameters.clear();
    }

    pub fn texture_desc(&self, texture: TextureHandle) -> Option<&TextureDesc> {
        self.textures.get(&texture)
    }

    pub fn shader_name(&self, shader: ShaderHandle) -> Option<&str> {
        self.shaders.get(&shader).map(String::as_str)
    }
}

impl Graphics for HeadlessGraphics {
    fn backbuffer_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn max_texture_size(&self) -> u32 {
        self.max_texture_size
    }

    fn instancing_supported(&self) -> bool {
        self.instancing
    }

    fn needs_dummy_color(&self, format: TextureFormat) -> bool {
        self.dummy_color_formats.contains(&format)
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Option<TextureHandle> {
        if self.rejected_formats.contains(&desc.format) {
            self.stats.texture_failures += 1;
            return None;
        }
        if let Some(limit) = self.reject_above {
            if desc.width > limit || desc.height > limit {
                self.stats.texture_failures += 1;
                return None;
            }
        }
        if desc.width == 0 || desc.height == 0 || desc.width > self.max_texture_size {
            self.stats.texture_failures += 1;
            return None;
        }
        let handle = TextureHandle(self.next_texture);
        self.next_texture += 1;
        self.textures.insert(handle, desc.clone());
        Some(handle)
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
    }

    fn create_buffer(&mut self, size: u64, _label: &str) -> Option<BufferHandle> {
        if size == 0 {
            return None;
        }
        let handle = BufferHandle(self.next_buffer);
        self.next_buffer += 1;
        self.buffers.insert(handle, size);
        Some(handle)
    }

    fn release_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer);
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> bool {
        let Some(&size) = self.buffers.get(&buffer) else {
            return false;
        };
        if offset + data.len() as u64 > size {
            return false;
        }
        self.stats.buffer_writes += 1;
        true
    }

    fn create_shader(&mut self, name: &str, defines: &str) -> Option<ShaderHandle> {
        if self.fail_shaders.contains(name) {
            return None;
        }
        let handle = ShaderHandle(self.next_shader);
        self.next_shader += 1;
        self.shaders.insert(handle, format!("{name} [{defines}]"));
        Some(handle)
    }

    fn reset_render_targets(&mut self) {
        self.current_targets = [None; 4];
        self.current_depth_stencil = None;
        self.scissor = None;
        self.stats.render_target_switches += 1;
    }

    fn set_render_target(&mut self, index: usize, target: Option<TextureHandle>) {
        if index < self.current_targets.len() && self.current_targets[index] != target {
            self.current_targets[index] = target;
            self.stats.render_target_switches += 1;
        }
    }

    fn set_depth_stencil(&mut self, target: Option<TextureHandle>) {
        self.current_depth_stencil = target;
    }

    fn set_viewport(&mut self, rect: IntRect) {
        self.viewport = rect;
        self.viewport_log.push(rect);
    }

    fn set_scissor(&mut self, rect: Option<IntRect>) {
        self.scissor = rect;
    }

    fn set_stencil(&mut self, enabled: bool, _reference: u32, _write_mask: u32) {
        if enabled {
            self.stats.stencil_sets += 1;
        }
    }

    fn set_blend_mode(&mut self, mode: BlendMode) {
        self.blend_mode = mode;
    }

    fn set_depth_test(&mut self, mode: CompareMode) {
        self.depth_test = mode;
    }

    fn set_depth_write(&mut self, enabled: bool) {
        self.depth_write = enabled;
    }

    fn set_shaders(&mut self, shaders: ShaderPair) {
        if self.current_shaders != Some(shaders) {
            self.current_shaders = Some(shaders);
            self.stats.shader_switches += 1;
        }
    }

    fn set_shader_parameter(&mut self, name: &str, value: ShaderParam) {
        if let ShaderParam::Mat4(matrix) = value {
            self.mat4_parameters.insert(name.to_string(), matrix);
        }
    }

    fn set_texture(&mut self, _unit: u32, _texture: Option<TextureHandle>) {}

    fn clear(&mut self, _flags: ClearFlags, _color: Vec4, _depth: f32, _stencil: u32) {
        self.stats.clears += 1;
    }

    fn set_vertex_buffer(&mut self, _buffer: Option<BufferHandle>) {}

    fn set_index_buffer(&mut self, _buffer: Option<BufferHandle>) {}

    fn set_instance_buffer(&mut self, _buffer: Option<BufferHandle>, _first_instance: u32) {}

    fn draw(&mut self, _vertex_start: u32, _vertex_count: u32) {
        self.stats.draw_calls += 1;
        self.stats.instances += 1;
    }

    fn draw_indexed(&mut self, _index_start: u32, _index_count: u32, instance_count: u32) {
        self.stats.draw_calls += 1;
        self.stats.instances += instance_count.max(1);
        if instance_count > 1 {
            self.stats.instanced_draw_calls += 1;
        }
    }

    fn copy_texture(&mut self, _src: Option<TextureHandle>, _dst: Option<TextureHandle>) {
        self.stats.texture_copies += 1;
    }
}
