pub mod batch;
pub mod occlusion;
pub mod queue;
pub mod render_path;
#[allow(clippy::module_inception)]
pub mod renderer;
pub mod shadows;
pub mod view;

pub use batch::{Batch, BatchGroup, BatchGroupKey, InstanceRows, InstanceTransform};
pub use occlusion::OcclusionBuffer;
pub use queue::{BatchQueue, DrawContext, LightBatchQueue, ShadowBatchQueue};
pub use render_path::{
    CommandKind, RenderPath, RenderPathCommand, RenderTargetInfo, SortMode, TargetSize,
    VIEWPORT_TARGET,
};
pub use renderer::{Renderer, RendererStats, ShadowMap};
pub use view::{CullSource, FrameInfo, View, ViewEvent, Viewport};
