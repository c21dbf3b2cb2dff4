use std::collections::HashMap;

use crate::graphics::{BlendMode, CompareMode};

/// How a pass interacts with lights; selects the shader variant family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassLighting {
    #[default]
    Unlit,
    PerVertex,
    PerPixel,
}

/// One material pass: render state plus the shader names and defines the
/// variant selector starts from.
#[derive(Debug, Clone)]
pub struct Pass {
    pub blend_mode: BlendMode,
    pub depth_test: CompareMode,
    pub depth_write: bool,
    pub lighting: PassLighting,
    pub vertex_shader: String,
    pub pixel_shader: String,
    pub vertex_defines: String,
    pub pixel_defines: String,
}

impl Pass {
    pub fn new(vertex_shader: &str, pixel_shader: &str) -> Self {
        Self {
            blend_mode: BlendMode::Replace,
            depth_test: CompareMode::LessEqual,
            depth_write: true,
            lighting: PassLighting::Unlit,
            vertex_shader: vertex_shader.to_string(),
            pixel_shader: pixel_shader.to_string(),
            vertex_defines: String::new(),
            pixel_defines: String::new(),
        }
    }

    pub fn with_lighting(mut self, lighting: PassLighting) -> Self {
        self.lighting = lighting;
        self
    }

    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend_mode = blend;
        self
    }
}

/// A set of passes addressed by registered pass index.
#[derive(Debug, Clone, Default)]
pub struct Technique {
    passes: HashMap<usize, Pass>,
}

impl Technique {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pass(mut self, index: usize, pass: Pass) -> Self {
        self.passes.insert(index, pass);
        self
    }

    pub fn set_pass(&mut self, index: usize, pass: Pass) {
        self.passes.insert(index, pass);
    }

    pub fn pass(&self, index: usize) -> Option<&Pass> {
        self.passes.get(&index)
    }

    pub fn has_pass(&self, index: usize) -> bool {
        self.passes.contains_key(&index)
    }
}

/// Maps pass names to dense indices. The common forward-rendering passes are
/// preregistered so their indices are stable constants; render paths may
/// register additional names, which substitute for the defaults when a scene
/// pass command carries `base`/`alpha` metadata.
#[derive(Debug, Clone)]
pub struct PassRegistry {
    names: Vec<String>,
}

impl PassRegistry {
    pub const BASE: usize = 0;
    pub const LITBASE: usize = 1;
    pub const LIGHT: usize = 2;
    pub const ALPHA: usize = 3;
    pub const LITALPHA: usize = 4;
    pub const SHADOW: usize = 5;

    pub fn new() -> Self {
        Self {
            names: ["base", "litbase", "light", "alpha", "litalpha", "shadow"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    pub fn get_or_register(&mut self, name: &str) -> usize {
        if let Some(index) = self.index(name) {
            return index;
        }
        self.names.push(name.to_string());
        self.names.len() - 1
    }

    pub fn index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }
}

impl Default for PassRegistry {
    fn default() -> Self {
        Self::new()
    }
}
