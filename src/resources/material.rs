use crate::graphics::{ShaderParam, TextureHandle};

use super::{Handle, Technique};

pub const DEFAULT_RENDER_ORDER: u8 = 128;

/// Material: a technique reference plus the per-material state the batch
/// builder reads. Render order sorts whole materials before any other key.
#[derive(Debug, Clone)]
pub struct Material {
    pub technique: Handle<Technique>,
    pub render_order: u8,
    pub shader_parameters: Vec<(String, ShaderParam)>,
    pub textures: Vec<(u32, TextureHandle)>,
}

impl Material {
    pub fn new(technique: Handle<Technique>) -> Self {
        Self {
            technique,
            render_order: DEFAULT_RENDER_ORDER,
            shader_parameters: Vec::new(),
            textures: Vec::new(),
        }
    }

    pub fn with_render_order(mut self, order: u8) -> Self {
        self.render_order = order;
        self
    }
}
