use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::graphics::{BlendMode, TextureFormat};

/// Name reserved for the current render target in command inputs/outputs.
pub const VIEWPORT_TARGET: &str = "viewport";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    #[default]
    FrontToBack,
    BackToFront,
}

/// How a named render target derives its size from the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSize {
    Absolute { width: u32, height: u32 },
    /// Viewport size divided per axis, minimum 1x1.
    Divisor { x: u32, y: u32 },
    Multiplier { x: f32, y: f32 },
}

impl TargetSize {
    pub fn resolve(&self, viewport_width: u32, viewport_height: u32) -> (u32, u32) {
        match *self {
            TargetSize::Absolute { width, height } => (width.max(1), height.max(1)),
            TargetSize::Divisor { x, y } => (
                (viewport_width / x.max(1)).max(1),
                (viewport_height / y.max(1)).max(1),
            ),
            TargetSize::Multiplier { x, y } => (
                ((viewport_width as f32 * x) as u32).max(1),
                ((viewport_height as f32 * y) as u32).max(1),
            ),
        }
    }
}

/// Declaration of a named off-screen target a render path draws into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderTargetInfo {
    pub name: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub format: TextureFormat,
    pub size: TargetSize,
    #[serde(default)]
    pub filtered: bool,
    #[serde(default)]
    pub srgb: bool,
    #[serde(default)]
    pub cubemap: bool,
    /// Persistent targets keep their contents across frames.
    #[serde(default)]
    pub persistent: bool,
    #[serde(default = "default_multisample")]
    pub multisample: u32,
}

fn default_true() -> bool {
    true
}

fn default_multisample() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum CommandKind {
    Clear {
        #[serde(default = "default_true")]
        color: bool,
        #[serde(default = "default_true")]
        depth: bool,
        #[serde(default = "default_true")]
        stencil: bool,
        #[serde(default)]
        clear_color: [f32; 4],
        #[serde(default = "default_depth")]
        clear_depth: f32,
        #[serde(default)]
        clear_stencil: u32,
    },
    ScenePass {
        pass: String,
        #[serde(default)]
        sort: SortMode,
        /// `base` or `alpha` substitutes this pass for the corresponding
        /// default pass family, including its lit variants.
        #[serde(default)]
        metadata: String,
        #[serde(default)]
        mark_to_stencil: bool,
        #[serde(default)]
        vertex_lights: bool,
    },
    Quad {
        vertex_shader: String,
        pixel_shader: String,
        #[serde(default)]
        defines: String,
        #[serde(default)]
        blend: BlendMode,
    },
    ForwardLights {
        #[serde(default = "default_light_pass")]
        pass: String,
        #[serde(default = "default_true")]
        use_scissor: bool,
        #[serde(default)]
        use_stencil: bool,
    },
    LightVolumes {
        vertex_shader: String,
        pixel_shader: String,
        #[serde(default)]
        defines: String,
    },
    RenderUi,
    SendEvent {
        event: String,
    },
}

fn default_depth() -> f32 {
    1.0
}

fn default_light_pass() -> String {
    "light".to_string()
}

/// One step of a render path: the operation plus its target bindings. An
/// empty output list addresses the viewport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderPathCommand {
    #[serde(flatten)]
    pub kind: CommandKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub depth_stencil: Option<String>,
    /// Texture-unit bindings by named target, or [`VIEWPORT_TARGET`] for the
    /// viewport contents as last written.
    #[serde(default)]
    pub texture_bindings: Vec<(u32, String)>,
    #[serde(default)]
    pub shader_parameters: HashMap<String, Vec<f32>>,
}

impl RenderPathCommand {
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            enabled: true,
            tag: String::new(),
            outputs: Vec::new(),
            depth_stencil: None,
            texture_bindings: Vec::new(),
            shader_parameters: HashMap::new(),
        }
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tag = tag.to_string();
        self
    }

    pub fn with_output(mut self, output: &str) -> Self {
        self.outputs.push(output.to_string());
        self
    }

    pub fn with_binding(mut self, unit: u32, source: &str) -> Self {
        self.texture_bindings.push((unit, source.to_string()));
        self
    }

    pub fn writes_viewport(&self) -> bool {
        self.outputs.is_empty() || self.outputs.iter().any(|o| o == VIEWPORT_TARGET)
    }

    pub fn reads_viewport(&self) -> bool {
        self.texture_bindings.iter().any(|(_, s)| s == VIEWPORT_TARGET)
    }

    pub fn is_scene_pass(&self) -> bool {
        matches!(self.kind, CommandKind::ScenePass { .. })
    }
}

/// Ordered command list plus named-target declarations. Parsed from JSON or
/// built in code; the view interprets it every frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderPath {
    #[serde(default)]
    pub render_targets: Vec<RenderTargetInfo>,
    #[serde(default)]
    pub commands: Vec<RenderPathCommand>,
}

impl RenderPath {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The stock forward path: clear, opaque base, forward lights, alpha.
    pub fn forward() -> Self {
        let mut path = RenderPath::default();
        path.commands.push(RenderPathCommand::new(CommandKind::Clear {
            color: true,
            depth: true,
            stencil: true,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            clear_depth: 1.0,
            clear_stencil: 0,
        }));
        path.commands.push(RenderPathCommand::new(CommandKind::ScenePass {
            pass: "base".to_string(),
            sort: SortMode::FrontToBack,
            metadata: "base".to_string(),
            mark_to_stencil: false,
            vertex_lights: true,
        }));
        path.commands
            .push(RenderPathCommand::new(CommandKind::ForwardLights {
                pass: "light".to_string(),
                use_scissor: true,
                use_stencil: false,
            }));
        path.commands.push(RenderPathCommand::new(CommandKind::ScenePass {
            pass: "alpha".to_string(),
            sort: SortMode::BackToFront,
            metadata: "alpha".to_string(),
            mark_to_stencil: false,
            vertex_lights: true,
        }));
        path
    }

    /// Appends another path's targets and commands, e.g. a post-process
    /// chain on top of the forward path.
    pub fn append(&mut self, other: &RenderPath) {
        self.render_targets.extend(other.render_targets.iter().cloned());
        self.commands.extend(other.commands.iter().cloned());
    }

    /// Toggles every command and render target carrying `tag`.
    pub fn set_enabled(&mut self, tag: &str, enabled: bool) {
        for command in &mut self.commands {
            if command.tag == tag {
                command.enabled = enabled;
            }
        }
        for target in &mut self.render_targets {
            if target.tag == tag {
                target.enabled = enabled;
            }
        }
    }

    pub fn render_target(&self, name: &str) -> Option<&RenderTargetInfo> {
        self.render_targets
            .iter()
            .find(|t| t.enabled && t.name.eq_ignore_ascii_case(name))
    }

    pub fn enabled_commands(&self) -> impl Iterator<Item = &RenderPathCommand> {
        self.commands.iter().filter(|c| c.enabled)
    }

    pub fn has_light_volumes(&self) -> bool {
        self.enabled_commands()
            .any(|c| matches!(c.kind, CommandKind::LightVolumes { .. }))
    }
}
