pub mod headless;

pub use headless::{GraphicsStats, HeadlessGraphics};

use bitflags::bitflags;
use glam::{Mat4, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::math::IntRect;

/// Opaque handle to a backend texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

/// Opaque handle to a backend vertex/index/instance buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u32);

/// Opaque handle to a compiled shader variation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub u32);

/// Vertex + pixel shader pair bound together for a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderPair {
    pub vertex: ShaderHandle,
    pub pixel: ShaderHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureFormat {
    Rgba8,
    Rgba16,
    Rgba16Float,
    Rg16Float,
    R16Float,
    R32Float,
    Rgba32Float,
    Depth16,
    Depth24Stencil8,
    Depth32Float,
}

impl TextureFormat {
    pub fn is_depth(self) -> bool {
        matches!(
            self,
            TextureFormat::Depth16 | TextureFormat::Depth24Stencil8 | TextureFormat::Depth32Float
        )
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            TextureFormat::Rgba16Float
                | TextureFormat::Rg16Float
                | TextureFormat::R16Float
                | TextureFormat::R32Float
                | TextureFormat::Rgba32Float
        )
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClearFlags: u32 {
        const COLOR = 1;
        const DEPTH = 2;
        const STENCIL = 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    #[default]
    Replace,
    Add,
    Multiply,
    Alpha,
    AddAlpha,
    PremulAlpha,
    InvDestAlpha,
    Subtract,
    SubtractAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareMode {
    Always,
    Equal,
    NotEqual,
    Less,
    #[default]
    LessEqual,
    Greater,
    GreaterEqual,
}

/// Texture creation request. Multisample and the boolean flags participate in
/// the renderer's screen-buffer pool key, so they live here rather than on
/// backend-specific descriptors.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub multisample: u32,
    pub filtered: bool,
    pub srgb: bool,
    pub cubemap: bool,
    pub auto_resolve: bool,
    pub label: String,
}

impl TextureDesc {
    pub fn render_target(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            format,
            multisample: 1,
            filtered: false,
            srgb: false,
            cubemap: false,
            auto_resolve: false,
            label: String::new(),
        }
    }
}

/// Untyped shader parameter value, set by semantic name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShaderParam {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

/// The graphics backend as the pipeline consumes it: a single-threaded,
/// stateful immediate-mode session object. Draw submission must never happen
/// from more than one thread; the pipeline guarantees this by executing all
/// render-path commands sequentially on the orchestrating thread.
///
/// Texture and shader creation are fallible so the caller can degrade
/// (smaller shadow map, dropped batch) instead of aborting the frame.
pub trait Graphics {
    fn backbuffer_size(&self) -> (u32, u32);
    fn max_texture_size(&self) -> u32;
    fn instancing_supported(&self) -> bool;
    /// Whether a depth-only render target needs a bound color attachment.
    fn needs_dummy_color(&self, format: TextureFormat) -> bool;

    fn create_texture(&mut self, desc: &TextureDesc) -> Option<TextureHandle>;
    fn release_texture(&mut self, texture: TextureHandle);
    fn create_buffer(&mut self, size: u64, label: &str) -> Option<BufferHandle>;
    fn release_buffer(&mut self, buffer: BufferHandle);
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> bool;
    fn create_shader(&mut self, name: &str, defines: &str) -> Option<ShaderHandle>;

    fn reset_render_targets(&mut self);
    /// `None` binds the backbuffer on slot 0 and unbinds other slots.
    fn set_render_target(&mut self, index: usize, target: Option<TextureHandle>);
    fn set_depth_stencil(&mut self, target: Option<TextureHandle>);
    fn set_viewport(&mut self, rect: IntRect);
    fn set_scissor(&mut self, rect: Option<IntRect>);
    fn set_stencil(&mut self, enabled: bool, reference: u32, write_mask: u32);
    fn set_blend_mode(&mut self, mode: BlendMode);
    fn set_depth_test(&mut self, mode: CompareMode);
    fn set_depth_write(&mut self, enabled: bool);
    fn set_shaders(&mut self, shaders: ShaderPair);
    fn set_shader_parameter(&mut self, name: &str, value: ShaderParam);
    fn set_texture(&mut self, unit: u32, texture: Option<TextureHandle>);

    fn clear(&mut self, flags: ClearFlags, color: Vec4, depth: f32, stencil: u32);

    fn set_vertex_buffer(&mut self, buffer: Option<BufferHandle>);
    fn set_index_buffer(&mut self, buffer: Option<BufferHandle>);
    fn set_instance_buffer(&mut self, buffer: Option<BufferHandle>, first_instance: u32);
    fn draw(&mut self, vertex_start: u32, vertex_count: u32);
    fn draw_indexed(&mut self, index_start: u32, index_count: u32, instance_count: u32);

    /// Copy/resolve the currently bound viewport contents (`src` = `None`) or
    /// a texture into another texture or the backbuffer (`dst` = `None`).
    fn copy_texture(&mut self, src: Option<TextureHandle>, dst: Option<TextureHandle>);
}
