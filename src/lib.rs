//! Per-frame rendering pipeline for a retained 3D scene: frustum and
//! occlusion culling, light and shadow processing, sorted and instanced
//! batch queues, pooled transient GPU resources and a data-driven render
//! path interpreter.
//!
//! The pipeline is backend-agnostic: all GPU work goes through the
//! [`graphics::Graphics`] trait, and [`graphics::HeadlessGraphics`] records
//! submissions for tests. A typical frame:
//!
//! ```
//! use renderpath::graphics::HeadlessGraphics;
//! use renderpath::renderer::{FrameInfo, RenderPath, Renderer, View, Viewport};
//! use renderpath::resources::Assets;
//! use renderpath::scene::{Camera, Scene};
//! use renderpath::settings::RenderSettings;
//!
//! let mut graphics = HeadlessGraphics::new(1280, 720);
//! let mut renderer = Renderer::new(RenderSettings::default());
//! let mut assets = Assets::new();
//! let mut scene = Scene::new();
//! let mut view = View::new();
//!
//! let viewport = Viewport::new(Camera::default(), RenderPath::forward());
//! let frame = FrameInfo { frame_number: 1, time_step: 1.0 / 60.0 };
//!
//! renderer.begin_frame();
//! assert!(view.define(&graphics, None, &viewport, Some(&scene), &mut assets.passes, None));
//! view.update(&frame, &mut scene, &mut renderer, &assets);
//! view.get_batches(&mut scene, &mut renderer, &mut assets, &mut graphics);
//! view.update_geometries(&mut scene, &mut renderer);
//! view.render(&mut graphics, &mut renderer, &assets, Some(&scene), None);
//! renderer.end_frame(&mut graphics);
//! ```

pub mod graphics;
pub mod math;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod settings;
