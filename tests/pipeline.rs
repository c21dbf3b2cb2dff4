//! End-to-end frames through the full pipeline against the recording
//! graphics backend.

use std::sync::Arc;

use glam::{Mat4, Vec3};
use renderpath::graphics::{
    BlendMode, Graphics, HeadlessGraphics, TextureDesc, TextureFormat, TextureHandle,
};
use renderpath::math::{BoundingBox, IntRect};
use renderpath::renderer::{
    CommandKind, FrameInfo, RenderPath, RenderPathCommand, RenderTargetInfo, Renderer, TargetSize,
    View, Viewport,
};
use renderpath::resources::{
    Assets, Geometry, Handle, Material, Pass, PassLighting, PassRegistry, Technique,
};
use renderpath::scene::{
    Camera, CascadeParameters, Drawable, DrawableId, Light, Scene, SourceBatch,
    UpdateGeometryKind,
};
use renderpath::settings::RenderSettings;

struct Pipeline {
    graphics: HeadlessGraphics,
    renderer: Renderer,
    assets: Assets,
    scene: Scene,
    view: View,
}

impl Pipeline {
    fn new(settings: RenderSettings) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            graphics: HeadlessGraphics::new(800, 600),
            renderer: Renderer::new(settings),
            assets: Assets::new(),
            scene: Scene::new(),
            view: View::new(),
        }
    }

    fn unlit_material(&mut self) -> Handle<Material> {
        let technique =
            Technique::new().with_pass(PassRegistry::BASE, Pass::new("unlit", "unlit"));
        let technique = self.assets.techniques.insert(technique);
        self.assets.materials.insert(Material::new(technique))
    }

    fn lit_material(&mut self) -> Handle<Material> {
        let technique = Technique::new()
            .with_pass(PassRegistry::BASE, Pass::new("unlit", "unlit"))
            .with_pass(
                PassRegistry::LITBASE,
                Pass::new("litsolid", "litsolid").with_lighting(PassLighting::PerPixel),
            )
            .with_pass(
                PassRegistry::LIGHT,
                Pass::new("litsolid", "litsolid")
                    .with_lighting(PassLighting::PerPixel)
                    .with_blend(BlendMode::Add),
            )
            .with_pass(PassRegistry::SHADOW, Pass::new("shadow", "shadow"));
        let technique = self.assets.techniques.insert(technique);
        self.assets.materials.insert(Material::new(technique))
    }

    fn vertex_lit_material(&mut self) -> Handle<Material> {
        let technique = Technique::new().with_pass(
            PassRegistry::BASE,
            Pass::new("basevl", "basevl").with_lighting(PassLighting::PerVertex),
        );
        let technique = self.assets.techniques.insert(technique);
        self.assets.materials.insert(Material::new(technique))
    }

    fn cube(&mut self) -> Handle<Geometry> {
        self.assets.geometries.insert(Geometry::new(36, 24))
    }

    fn add_box(
        &mut self,
        center: Vec3,
        half: f32,
        geometry: Handle<Geometry>,
        material: Handle<Material>,
    ) -> DrawableId {
        let bounds = BoundingBox::from_center_size(center, Vec3::splat(half * 2.0));
        let drawable = Drawable::new(bounds).with_batch(SourceBatch::new(
            geometry,
            material,
            Mat4::from_translation(center),
        ));
        self.scene.add_drawable(drawable)
    }

    fn run_frame(&mut self, viewport: &Viewport) -> bool {
        self.run_frame_to(viewport, None)
    }

    fn run_frame_to(
        &mut self,
        viewport: &Viewport,
        target: Option<(TextureHandle, u32, u32)>,
    ) -> bool {
        self.graphics.begin_frame();
        self.renderer.begin_frame();
        if !self.view.define(
            &self.graphics,
            target,
            viewport,
            Some(&self.scene),
            &mut self.assets.passes,
            None,
        ) {
            return false;
        }
        let frame = FrameInfo {
            frame_number: self.renderer.frame_number(),
            time_step: 1.0 / 60.0,
        };
        self.view
            .update(&frame, &mut self.scene, &mut self.renderer, &self.assets);
        self.view.get_batches(
            &mut self.scene,
            &mut self.renderer,
            &mut self.assets,
            &mut self.graphics,
        );
        self.view.update_geometries(&mut self.scene, &mut self.renderer);
        self.view.render(
            &mut self.graphics,
            &mut self.renderer,
            &self.assets,
            Some(&self.scene),
            None,
        );
        self.renderer.end_frame(&mut self.graphics);
        true
    }
}

fn forward_viewport() -> Viewport {
    Viewport::new(Camera::look_to(Vec3::ZERO, Vec3::NEG_Z), RenderPath::forward())
}

#[test]
fn opaque_geometry_renders_with_one_clear() {
    let mut pipeline = Pipeline::new(RenderSettings::default());
    let material = pipeline.unlit_material();
    let cube = pipeline.cube();
    pipeline.add_box(Vec3::new(0.0, 0.0, -5.0), 0.5, cube, material);

    assert!(pipeline.run_frame(&forward_viewport()));

    assert_eq!(pipeline.view.visible_geometries().len(), 1);
    assert_eq!(pipeline.renderer.stats.geometries, 1);
    assert_eq!(pipeline.graphics.stats.clears, 1);
    assert_eq!(pipeline.graphics.stats.draw_calls, 1);
}

#[test]
fn geometry_outside_the_frustum_is_culled() {
    let mut pipeline = Pipeline::new(RenderSettings::default());
    let material = pipeline.unlit_material();
    let cube = pipeline.cube();
    pipeline.add_box(Vec3::new(0.0, 0.0, -5.0), 0.5, cube, material);
    pipeline.add_box(Vec3::new(0.0, 0.0, 50.0), 0.5, cube, material);

    assert!(pipeline.run_frame(&forward_viewport()));

    assert_eq!(pipeline.view.visible_geometries().len(), 1);
    assert_eq!(pipeline.graphics.stats.draw_calls, 1);
}

#[test]
fn identical_static_batches_collapse_into_one_instanced_draw() {
    let mut pipeline = Pipeline::new(RenderSettings::default());
    let material = pipeline.unlit_material();
    let cube = pipeline.cube();
    for i in 0..8 {
        pipeline.add_box(Vec3::new(i as f32 - 3.5, 0.0, -8.0), 0.4, cube, material);
    }

    assert!(pipeline.run_frame(&forward_viewport()));

    assert_eq!(pipeline.graphics.stats.draw_calls, 1);
    assert_eq!(pipeline.graphics.stats.instanced_draw_calls, 1);
    assert_eq!(pipeline.graphics.stats.instances, 8);
    assert_eq!(pipeline.graphics.stats.buffer_writes, 1);
}

#[test]
fn instancing_falls_back_to_per_instance_draws_when_unsupported() {
    let mut pipeline = Pipeline::new(RenderSettings::default());
    pipeline.graphics.set_instancing_supported(false);
    let material = pipeline.unlit_material();
    let cube = pipeline.cube();
    for i in 0..8 {
        pipeline.add_box(Vec3::new(i as f32 - 3.5, 0.0, -8.0), 0.4, cube, material);
    }

    assert!(pipeline.run_frame(&forward_viewport()));

    assert_eq!(pipeline.graphics.stats.draw_calls, 8);
    assert_eq!(pipeline.graphics.stats.instanced_draw_calls, 0);
}

#[test]
fn directional_light_renders_shadow_map_then_lit_batches() {
    let mut pipeline = Pipeline::new(RenderSettings::default());
    let material = pipeline.lit_material();
    let cube = pipeline.cube();

    let caster = pipeline.add_box(Vec3::new(0.0, 1.0, -5.0), 0.5, cube, material);
    pipeline.scene.drawables[caster.0 as usize].cast_shadows = true;
    pipeline.add_box(Vec3::new(0.0, -1.0, -5.0), 0.5, cube, material);

    pipeline
        .scene
        .add_light(Light::directional(Vec3::NEG_Y).with_shadows());

    assert!(pipeline.run_frame(&forward_viewport()));

    assert_eq!(pipeline.renderer.stats.shadow_maps, 1);
    assert!(pipeline
        .graphics
        .textures
        .values()
        .any(|desc| desc.format.is_depth()));

    let queues = pipeline.view.light_queues();
    assert_eq!(queues.len(), 1);
    assert!(queues[0].shadow_map.is_some());
    assert!(!queues[0].shadow_splits.is_empty());

    // One shadow caster draw plus the lit-base pair, which instances.
    assert_eq!(pipeline.graphics.stats.clears, 2);
    assert!(pipeline.graphics.stats.draw_calls >= 2);
}

#[test]
fn exhausted_shadow_pool_demotes_the_second_light() {
    let settings = RenderSettings {
        reuse_shadow_maps: false,
        max_shadow_maps: 1,
        ..RenderSettings::default()
    };
    let mut pipeline = Pipeline::new(settings);
    let material = pipeline.lit_material();
    let cube = pipeline.cube();

    for x in [-2.0f32, 2.0] {
        let caster = pipeline.add_box(Vec3::new(x, -1.0, -5.0), 0.4, cube, material);
        pipeline.scene.drawables[caster.0 as usize].cast_shadows = true;
        pipeline
            .scene
            .add_light(Light::point(Vec3::new(x, 0.0, -5.0), 3.0).with_shadows());
    }

    assert!(pipeline.run_frame(&forward_viewport()));

    let depth_maps = pipeline
        .graphics
        .textures
        .values()
        .filter(|desc| desc.format.is_depth())
        .count();
    assert_eq!(depth_maps, 1);

    let queues = pipeline.view.light_queues();
    assert_eq!(queues.len(), 2);
    assert_eq!(queues.iter().filter(|q| q.shadow_map.is_some()).count(), 1);
    // The demoted light still lights its geometry.
    assert!(queues.iter().all(|q| {
        q.lit_base_batches.total_instances() + q.lit_batches.total_instances() > 0
    }));
}

#[test]
fn occluded_geometry_is_dropped_before_batch_building() {
    let settings = RenderSettings {
        max_occluder_triangles: 1000,
        ..RenderSettings::default()
    };
    let mut pipeline = Pipeline::new(settings);
    let material = pipeline.unlit_material();

    // A wall covering the whole view at z = -3, with CPU-side triangles.
    let wall_geometry = pipeline.assets.geometries.insert(
        Geometry::new(6, 4).with_cpu_data(
            vec![
                Vec3::new(-8.0, -6.0, -3.0),
                Vec3::new(8.0, -6.0, -3.0),
                Vec3::new(8.0, 6.0, -3.0),
                Vec3::new(-8.0, 6.0, -3.0),
            ],
            vec![0, 1, 2, 0, 2, 3],
        ),
    );
    let wall_bounds = BoundingBox::new(Vec3::new(-8.0, -6.0, -3.1), Vec3::new(8.0, 6.0, -2.9));
    let mut wall = Drawable::new(wall_bounds).with_batch(SourceBatch::new(
        wall_geometry,
        material,
        Mat4::IDENTITY,
    ));
    wall.occluder = true;
    wall.occludee = false;
    pipeline.scene.add_drawable(wall);

    let cube = pipeline.cube();
    pipeline.add_box(Vec3::new(0.0, 0.0, -20.0), 0.5, cube, material);

    assert!(pipeline.run_frame(&forward_viewport()));
    assert_eq!(pipeline.renderer.stats.occluders, 1);
    assert_eq!(pipeline.view.visible_geometries().len(), 1);

    // With occlusion disabled both drawables stay visible.
    let mut control = Pipeline::new(RenderSettings::default());
    let material = control.unlit_material();
    let wall_geometry = control.assets.geometries.insert(Geometry::new(6, 4));
    let mut wall = Drawable::new(wall_bounds).with_batch(SourceBatch::new(
        wall_geometry,
        material,
        Mat4::IDENTITY,
    ));
    wall.occluder = true;
    wall.occludee = false;
    control.scene.add_drawable(wall);
    let cube = control.cube();
    control.add_box(Vec3::new(0.0, 0.0, -20.0), 0.5, cube, material);

    assert!(control.run_frame(&forward_viewport()));
    assert_eq!(control.view.visible_geometries().len(), 2);
}

#[test]
fn viewport_read_resolves_into_a_pooled_texture() {
    let mut pipeline = Pipeline::new(RenderSettings::default());
    let material = pipeline.unlit_material();
    let cube = pipeline.cube();
    pipeline.add_box(Vec3::new(0.0, 0.0, -5.0), 0.5, cube, material);

    let mut path = RenderPath::forward();
    path.commands.push(
        RenderPathCommand::new(CommandKind::Quad {
            vertex_shader: "copy".to_string(),
            pixel_shader: "copy".to_string(),
            defines: String::new(),
            blend: BlendMode::Replace,
        })
        .with_binding(0, "viewport"),
    );
    let viewport = Viewport::new(Camera::look_to(Vec3::ZERO, Vec3::NEG_Z), path);

    assert!(pipeline.run_frame(&viewport));
    assert_eq!(pipeline.graphics.stats.texture_copies, 1);
    // Scene batch plus the fullscreen quad.
    assert_eq!(pipeline.graphics.stats.draw_calls, 2);
}

#[test]
fn chained_viewport_reads_recopy_after_each_write() {
    let mut pipeline = Pipeline::new(RenderSettings::default());
    let material = pipeline.unlit_material();
    let cube = pipeline.cube();
    pipeline.add_box(Vec3::new(0.0, 0.0, -5.0), 0.5, cube, material);

    let mut path = RenderPath::forward();
    for _ in 0..2 {
        path.commands.push(
            RenderPathCommand::new(CommandKind::Quad {
                vertex_shader: "blur".to_string(),
                pixel_shader: "blur".to_string(),
                defines: String::new(),
                blend: BlendMode::Replace,
            })
            .with_binding(0, "viewport"),
        );
    }
    let viewport = Viewport::new(Camera::look_to(Vec3::ZERO, Vec3::NEG_Z), path);

    assert!(pipeline.run_frame(&viewport));
    // Each quad writes the viewport, so each read snapshots it again.
    assert_eq!(pipeline.graphics.stats.texture_copies, 2);
    assert_eq!(pipeline.graphics.stats.draw_calls, 3);
}

#[test]
fn named_render_target_is_allocated_at_divided_size() {
    let mut pipeline = Pipeline::new(RenderSettings::default());
    let material = pipeline.unlit_material();
    let cube = pipeline.cube();
    pipeline.add_box(Vec3::new(0.0, 0.0, -5.0), 0.5, cube, material);

    let mut path = RenderPath::forward();
    path.render_targets.push(RenderTargetInfo {
        name: "small".to_string(),
        tag: String::new(),
        enabled: true,
        format: TextureFormat::Rgba8,
        size: TargetSize::Divisor { x: 2, y: 2 },
        filtered: true,
        srgb: false,
        cubemap: false,
        persistent: false,
        multisample: 1,
    });
    path.commands.push(
        RenderPathCommand::new(CommandKind::Quad {
            vertex_shader: "downsample".to_string(),
            pixel_shader: "downsample".to_string(),
            defines: String::new(),
            blend: BlendMode::Replace,
        })
        .with_binding(0, "viewport")
        .with_output("small"),
    );
    path.commands.push(
        RenderPathCommand::new(CommandKind::Quad {
            vertex_shader: "upsample".to_string(),
            pixel_shader: "upsample".to_string(),
            defines: String::new(),
            blend: BlendMode::Replace,
        })
        .with_binding(0, "small"),
    );
    let viewport = Viewport::new(Camera::look_to(Vec3::ZERO, Vec3::NEG_Z), path);

    assert!(pipeline.run_frame(&viewport));
    assert!(pipeline
        .graphics
        .textures
        .values()
        .any(|desc| desc.width == 400 && desc.height == 300));
}

#[test]
fn follower_view_draws_the_sources_prepared_queues() {
    let mut pipeline = Pipeline::new(RenderSettings::default());
    let material = pipeline.unlit_material();
    let cube = pipeline.cube();
    pipeline.add_box(Vec3::new(0.0, 0.0, -5.0), 0.5, cube, material);

    let viewport = forward_viewport();
    assert!(pipeline.run_frame(&viewport));
    assert_eq!(pipeline.graphics.stats.draw_calls, 1);

    let Pipeline {
        graphics,
        renderer,
        assets,
        scene,
        view,
    } = &mut pipeline;

    let mut follower = View::new();
    assert!(follower.define(
        graphics,
        None,
        &viewport,
        Some(scene),
        &mut assets.passes,
        Some(view),
    ));
    follower.render(graphics, renderer, assets, Some(scene), Some(view));
    assert_eq!(graphics.stats.draw_calls, 2);
}

#[test]
fn per_vertex_light_skips_forward_light_passes() {
    let mut pipeline = Pipeline::new(RenderSettings::default());
    let material = pipeline.vertex_lit_material();
    let cube = pipeline.cube();
    pipeline.add_box(Vec3::new(0.0, 0.0, -5.0), 0.5, cube, material);

    let mut light = Light::point(Vec3::new(0.0, 1.0, -5.0), 5.0);
    light.per_vertex = true;
    pipeline.scene.add_light(light);

    assert!(pipeline.run_frame(&forward_viewport()));

    let queues = pipeline.view.light_queues();
    assert_eq!(queues.len(), 1);
    assert!(queues[0].light.is_none());
    assert_eq!(queues[0].vertex_lights.len(), 1);
    // Only the base pass draws; no per-pixel light pass ran.
    assert_eq!(pipeline.graphics.stats.draw_calls, 1);
}

#[test]
fn max_lights_keeps_only_the_cheapest_light() {
    let mut pipeline = Pipeline::new(RenderSettings::default());
    let material = pipeline.lit_material();
    let cube = pipeline.cube();
    let id = pipeline.add_box(Vec3::new(0.0, 0.0, -5.0), 0.5, cube, material);
    pipeline.scene.drawables[id.0 as usize].max_lights = 1;

    pipeline
        .scene
        .add_light(Light::point(Vec3::new(0.0, 1.0, -5.0), 5.0));
    let mut dim = Light::point(Vec3::new(0.0, 3.0, -5.0), 5.0);
    dim.intensity = 0.05;
    pipeline.scene.add_light(dim);

    assert!(pipeline.run_frame(&forward_viewport()));

    let queues = pipeline.view.light_queues();
    assert_eq!(queues.len(), 2);
    let lit_counts: Vec<usize> = queues
        .iter()
        .map(|q| q.lit_base_batches.total_instances() + q.lit_batches.total_instances())
        .collect();
    assert_eq!(lit_counts.iter().sum::<usize>(), 1);
}

#[test]
fn identical_frames_submit_identical_command_streams() {
    let mut pipeline = Pipeline::new(RenderSettings::default());
    let material = pipeline.lit_material();
    let cube = pipeline.cube();
    for i in 0..5 {
        let id = pipeline.add_box(
            Vec3::new(i as f32 - 2.0, 0.0, -6.0 - i as f32),
            0.4,
            cube,
            material,
        );
        pipeline.scene.drawables[id.0 as usize].cast_shadows = true;
    }
    pipeline
        .scene
        .add_light(Light::directional(Vec3::NEG_Y).with_shadows());
    pipeline
        .scene
        .add_light(Light::point(Vec3::new(0.0, 2.0, -6.0), 8.0));

    let viewport = forward_viewport();
    assert!(pipeline.run_frame(&viewport));
    let first_stats = pipeline.graphics.stats;
    let first_viewports = pipeline.graphics.viewport_log.clone();

    assert!(pipeline.run_frame(&viewport));
    assert_eq!(pipeline.graphics.stats, first_stats);
    assert_eq!(pipeline.graphics.viewport_log, first_viewports);
}

#[test]
fn empty_scene_clears_once_and_draws_nothing() {
    let mut pipeline = Pipeline::new(RenderSettings::default());

    assert!(pipeline.run_frame(&forward_viewport()));

    assert!(pipeline.view.visible_geometries().is_empty());
    assert!(pipeline.view.visible_lights().is_empty());
    assert!(pipeline.view.light_queues().is_empty());
    assert!(pipeline
        .view
        .batch_queue_for_pass(PassRegistry::BASE)
        .map_or(true, |q| q.is_empty()));
    assert!(pipeline
        .view
        .batch_queue_for_pass(PassRegistry::ALPHA)
        .map_or(true, |q| q.is_empty()));
    assert_eq!(pipeline.graphics.stats.clears, 1);
    assert_eq!(pipeline.graphics.stats.draw_calls, 0);
    assert_eq!(pipeline.graphics.stats.buffer_writes, 0);
}

#[test]
fn single_split_directional_shadow_covers_the_whole_map() {
    let mut pipeline = Pipeline::new(RenderSettings::default());
    let material = pipeline.lit_material();
    let cube = pipeline.cube();

    let caster = pipeline.add_box(Vec3::new(0.0, 1.0, -5.0), 0.5, cube, material);
    pipeline.scene.drawables[caster.0 as usize].cast_shadows = true;
    pipeline.add_box(Vec3::new(0.0, -1.0, -5.0), 0.5, cube, material);

    let light = pipeline
        .scene
        .add_light(Light::directional(Vec3::NEG_Y).with_shadows());
    pipeline.scene.lights[light.0 as usize].shadow_cascade = CascadeParameters::single(50.0);

    assert!(pipeline.run_frame(&forward_viewport()));

    let queues = pipeline.view.light_queues();
    assert_eq!(queues.len(), 1);
    let map = queues[0].shadow_map.expect("shadow map allocated");
    assert_eq!(queues[0].shadow_splits.len(), 1);
    assert_eq!(
        queues[0].shadow_splits[0].shadow_viewport,
        IntRect::new(0, 0, map.width as i32, map.height as i32)
    );
}

#[test]
fn point_light_faces_tile_the_atlas_without_overlap() {
    let mut pipeline = Pipeline::new(RenderSettings::default());
    let material = pipeline.lit_material();
    let cube = pipeline.cube();

    pipeline.add_box(Vec3::new(0.0, -1.0, -5.0), 0.4, cube, material);
    // One caster per cube face around the light.
    let offsets = [
        Vec3::new(1.5, 0.0, 0.0),
        Vec3::new(-1.5, 0.0, 0.0),
        Vec3::new(0.0, 1.5, 0.0),
        Vec3::new(0.0, -1.5, 0.0),
        Vec3::new(0.0, 0.0, 1.5),
        Vec3::new(0.0, 0.0, -1.5),
    ];
    let light_position = Vec3::new(0.0, 0.0, -5.0);
    for offset in offsets {
        let caster = pipeline.add_box(light_position + offset, 0.3, cube, material);
        pipeline.scene.drawables[caster.0 as usize].cast_shadows = true;
    }
    pipeline
        .scene
        .add_light(Light::point(light_position, 4.0).with_shadows());

    assert!(pipeline.run_frame(&forward_viewport()));

    let queues = pipeline.view.light_queues();
    assert_eq!(queues.len(), 1);
    let map = queues[0].shadow_map.expect("shadow map allocated");
    let splits = &queues[0].shadow_splits;
    assert_eq!(splits.len(), 6);

    let tile_w = (map.width / 2) as i32;
    let tile_h = (map.height / 3) as i32;
    assert_eq!(tile_w * 2, map.width as i32);
    assert_eq!(tile_h * 3, map.height as i32);
    for (face, split) in splits.iter().enumerate() {
        let left = (face % 2) as i32 * tile_w;
        let top = (face / 2) as i32 * tile_h;
        assert_eq!(
            split.shadow_viewport,
            IntRect::new(left, top, left + tile_w, top + tile_h)
        );
    }
}

#[test]
fn worker_geometry_update_reroutes_to_the_serial_pass() {
    let mut pipeline = Pipeline::new(RenderSettings::default());
    let material = pipeline.unlit_material();
    let cube = pipeline.cube();
    let rerouted = pipeline.add_box(Vec3::new(-1.5, 0.0, -5.0), 0.5, cube, material);
    let threaded = pipeline.add_box(Vec3::new(0.0, 0.0, -5.0), 0.5, cube, material);
    let skipped = pipeline.add_box(Vec3::new(1.5, 0.0, -5.0), 0.5, cube, material);

    {
        let drawable = &mut pipeline.scene.drawables[rerouted.0 as usize];
        drawable.update_geometry = UpdateGeometryKind::Worker;
        drawable.on_update_geometry =
            Some(Arc::new(|_: &FrameInfo| UpdateGeometryKind::MainThread));
    }
    pipeline.scene.drawables[threaded.0 as usize].update_geometry = UpdateGeometryKind::Worker;
    {
        let drawable = &mut pipeline.scene.drawables[skipped.0 as usize];
        drawable.update_geometry = UpdateGeometryKind::Worker;
        drawable.on_update_geometry = Some(Arc::new(|_: &FrameInfo| UpdateGeometryKind::None));
    }

    assert!(pipeline.run_frame(&forward_viewport()));

    let frame = &pipeline.scene.drawables[rerouted.0 as usize].frame;
    assert!(frame.main_thread_update);
    assert!(frame.geometry_updated);

    let frame = &pipeline.scene.drawables[threaded.0 as usize].frame;
    assert!(!frame.main_thread_update);
    assert!(frame.geometry_updated);

    let frame = &pipeline.scene.drawables[skipped.0 as usize].frame;
    assert!(!frame.main_thread_update);
    assert!(!frame.geometry_updated);
}

#[test]
fn render_to_texture_flips_the_projection() {
    let mut pipeline = Pipeline::new(RenderSettings::default());
    let material = pipeline.unlit_material();
    let cube = pipeline.cube();
    let center = Vec3::new(0.0, 1.0, -5.0);
    pipeline.add_box(center, 0.5, cube, material);

    let viewport = forward_viewport();
    assert!(pipeline.run_frame(&viewport));
    let straight = pipeline.graphics.mat4_parameters["WorldViewProj"];
    assert_eq!(
        straight,
        pipeline.view.camera().view_proj() * Mat4::from_translation(center)
    );

    let target = pipeline
        .graphics
        .create_texture(&TextureDesc::render_target(256, 256, TextureFormat::Rgba8))
        .expect("target texture");
    assert!(pipeline.run_frame_to(&viewport, Some((target, 256, 256))));
    let flipped = pipeline.graphics.mat4_parameters["WorldViewProj"];
    assert_eq!(
        flipped,
        Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0))
            * pipeline.view.camera().view_proj()
            * Mat4::from_translation(center)
    );
}

#[test]
fn forward_lights_stencil_flag_marks_each_light() {
    let mut pipeline = Pipeline::new(RenderSettings::default());
    let material = pipeline.lit_material();
    let cube = pipeline.cube();
    pipeline.add_box(Vec3::new(0.0, 0.0, -5.0), 0.5, cube, material);
    pipeline
        .scene
        .add_light(Light::point(Vec3::new(0.0, 1.0, -5.0), 5.0));

    assert!(pipeline.run_frame(&forward_viewport()));
    assert_eq!(pipeline.graphics.stats.stencil_sets, 0);

    let mut path = RenderPath::forward();
    for command in &mut path.commands {
        if let CommandKind::ForwardLights { use_stencil, .. } = &mut command.kind {
            *use_stencil = true;
        }
    }
    let viewport = Viewport::new(Camera::look_to(Vec3::ZERO, Vec3::NEG_Z), path);
    assert!(pipeline.run_frame(&viewport));
    assert_eq!(pipeline.graphics.stats.stencil_sets, 1);
}

#[test]
fn sub_batches_beyond_the_mask_width_stay_on_the_base_path() {
    let mut pipeline = Pipeline::new(RenderSettings::default());
    let material = pipeline.lit_material();
    let cube = pipeline.cube();

    let center = Vec3::new(0.0, 0.0, -5.0);
    let mut drawable = Drawable::new(BoundingBox::from_center_size(center, Vec3::splat(1.0)));
    for _ in 0..70 {
        drawable
            .batches
            .push(SourceBatch::new(cube, material, Mat4::from_translation(center)));
    }
    pipeline.scene.add_drawable(drawable);
    pipeline
        .scene
        .add_light(Light::point(Vec3::new(0.0, 1.0, -5.0), 5.0));

    assert!(pipeline.run_frame(&forward_viewport()));

    let queues = pipeline.view.light_queues();
    assert_eq!(queues.len(), 1);
    assert_eq!(queues[0].lit_base_batches.total_instances(), 64);
    assert_eq!(queues[0].lit_batches.total_instances(), 6);
    let base = pipeline
        .view
        .batch_queue_for_pass(PassRegistry::BASE)
        .expect("base queue");
    assert_eq!(base.total_instances(), 6);
}
