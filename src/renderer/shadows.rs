use glam::Vec3;

use crate::math::{BoundingBox, Frustum, Intersection};
use crate::scene::{Camera, Drawable, DrawableId, Light, LightType, Scene, SpatialIndex};

use super::queue::ShadowBatchQueue;
use super::renderer::Renderer;

/// Cube-map face bases for point-light shadow cameras, in split order.
const POINT_FACE_DIRECTIONS: [(Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::Y),
    (Vec3::NEG_X, Vec3::Y),
    (Vec3::Y, Vec3::NEG_Z),
    (Vec3::NEG_Y, Vec3::Z),
    (Vec3::Z, Vec3::Y),
    (Vec3::NEG_Z, Vec3::Y),
];

/// Builds the shadow splits for a light: one focused camera per cascade,
/// cube face or spot cone. Viewports are assigned later, once a shadow map
/// has actually been allocated.
pub fn setup_shadow_cameras(
    renderer: &Renderer,
    light: &Light,
    camera: &Camera,
) -> Vec<ShadowBatchQueue> {
    let num_splits = light.num_shadow_splits(camera.far);
    let mut splits = Vec::with_capacity(num_splits);
    match light.light_type {
        LightType::Directional => {
            let mut near = camera.near;
            for index in 0..num_splits {
                let far = light.shadow_cascade.splits[index].min(camera.far);
                let mut split = ShadowBatchQueue::new(renderer.get_shadow_camera());
                setup_dir_light_camera(&mut split.shadow_camera, light, camera, near, far);
                split.near_split = near;
                split.far_split = far;
                splits.push(split);
                near = far;
            }
        }
        LightType::Spot => {
            let mut split = ShadowBatchQueue::new(renderer.get_shadow_camera());
            let shadow_camera = &mut split.shadow_camera;
            *shadow_camera = Camera::look_to(light.position, light.direction);
            shadow_camera.fov_y_radians = light.fov_y_radians;
            shadow_camera.aspect = 1.0;
            shadow_camera.auto_aspect = false;
            shadow_camera.near = light.shadow_near_clip();
            shadow_camera.far = light.range.max(shadow_camera.near + 0.01);
            split.near_split = shadow_camera.near;
            split.far_split = shadow_camera.far;
            splits.push(split);
        }
        LightType::Point => {
            for (direction, up) in POINT_FACE_DIRECTIONS {
                let mut split = ShadowBatchQueue::new(renderer.get_shadow_camera());
                let shadow_camera = &mut split.shadow_camera;
                *shadow_camera = Camera::look_to(light.position, direction);
                // Cube faces need the canonical up vector, not the guessed one.
                shadow_camera.rotation = glam::Quat::from_mat3(&glam::Mat3::from_cols(
                    direction.cross(up).normalize(),
                    up,
                    -direction,
                ));
                shadow_camera.fov_y_radians = std::f32::consts::FRAC_PI_2;
                shadow_camera.aspect = 1.0;
                shadow_camera.auto_aspect = false;
                shadow_camera.near = light.shadow_near_clip();
                shadow_camera.far = light.range.max(shadow_camera.near + 0.01);
                split.near_split = shadow_camera.near;
                split.far_split = shadow_camera.far;
                splits.push(split);
            }
        }
    }
    splits
}

/// Orthographic camera enclosing one cascade slice of the view frustum,
/// looking along the light direction from behind the slice.
fn setup_dir_light_camera(
    shadow_camera: &mut Camera,
    light: &Light,
    camera: &Camera,
    near: f32,
    far: f32,
) {
    let oriented = Camera::look_to(Vec3::ZERO, light.direction);
    shadow_camera.rotation = oriented.rotation;
    shadow_camera.auto_aspect = false;

    // Fit the split frustum in light view space.
    let light_view = shadow_camera_space(shadow_camera);
    let split_box = camera.split_frustum(near, far).transformed_box(&light_view);
    let center = split_box.center();
    let size = split_box.size();

    // Pull the camera back past the near face by the extrusion distance so
    // casters between the light and the slice still enter the frustum.
    let inv = light_view.inverse();
    shadow_camera.position = inv.transform_point3(Vec3::new(
        center.x,
        center.y,
        split_box.max.z + light.shadow_max_extrusion,
    ));
    shadow_camera.set_orthographic(size.x.max(1e-3), size.y.max(1e-3));
    shadow_camera.near = 0.0;
    shadow_camera.far = size.z.max(1e-3) + light.shadow_max_extrusion;
    shadow_camera.zoom = 1.0;
}

fn shadow_camera_space(shadow_camera: &Camera) -> glam::Mat4 {
    glam::Mat4::look_to_rh(
        Vec3::ZERO,
        shadow_camera.rotation * Vec3::NEG_Z,
        shadow_camera.rotation * Vec3::Y,
    )
}

/// Gathers the shadow casters of one split. Returns the accepted drawables
/// and records the light-space caster bounds in the split for focusing.
pub fn collect_shadow_casters(
    scene: &Scene,
    light: &Light,
    camera: &Camera,
    camera_frustum: &Frustum,
    split: &mut ShadowBatchQueue,
) -> Vec<DrawableId> {
    let shadow_frustum = split.shadow_camera.frustum();
    let candidates = scene.shadow_casters_in_frustum(&shadow_frustum, light.shadow_mask);
    let light_view = split.shadow_camera.view_matrix();

    let mut casters = Vec::new();
    let mut caster_box = BoundingBox::UNDEFINED;
    for id in candidates {
        let drawable = scene.drawable(id);

        if drawable.shadow_distance > 0.0 {
            let distance = camera.distance(drawable.bounds.center());
            if distance > drawable.shadow_distance {
                continue;
            }
        }

        // Cascades only accept in-view casters whose view-space Z range
        // overlaps the split slice; out-of-view casters are handled by the
        // extrusion test instead.
        if light.light_type == LightType::Directional && drawable.frame.in_view {
            if drawable.frame.max_z < split.near_split || drawable.frame.min_z > split.far_split {
                continue;
            }
        }

        if !shadow_caster_visible(drawable, light, camera, camera_frustum) {
            continue;
        }

        caster_box.merge_box(&drawable.bounds.transformed(&light_view));
        casters.push(id);
    }
    split.caster_box = caster_box;
    casters
}

/// Whether an off-frustum caster's shadow can still fall inside the view:
/// its bounds extruded away from the light must touch the camera frustum.
fn shadow_caster_visible(
    drawable: &Drawable,
    light: &Light,
    camera: &Camera,
    camera_frustum: &Frustum,
) -> bool {
    if drawable.frame.in_view {
        return true;
    }
    let extrusion = match light.light_type {
        LightType::Directional => light.shadow_max_extrusion,
        _ => light.shadow_max_extrusion.min(camera.far),
    };
    let direction = match light.light_type {
        LightType::Directional => light.direction,
        _ => (drawable.bounds.center() - light.position).normalize_or_zero(),
    };
    let mut extruded = drawable.bounds;
    extruded.merge_box(&drawable.bounds.translated(direction * extrusion));
    camera_frustum.test_box(&extruded) != Intersection::Outside
}

/// Tightens a shadow camera onto the casters it actually renders. Spot
/// lights zoom in; directional cascades shrink and recenter the ortho
/// window. Quantization keeps the result stable across frames.
pub fn focus_shadow_camera(split: &mut ShadowBatchQueue, light: &Light) {
    let focus = light.shadow_focus;
    if !focus.focus || !split.caster_box.defined() {
        return;
    }
    let caster_box = split.caster_box;
    let shadow_camera = &mut split.shadow_camera;

    if shadow_camera.orthographic {
        let size = caster_box.size();
        let mut width = shadow_camera.ortho_width.min(size.x);
        let mut height = shadow_camera.ortho_height.min(size.y);
        if focus.quantize > 0.0 {
            width = (width / focus.quantize).ceil() * focus.quantize;
            height = (height / focus.quantize).ceil() * focus.quantize;
        }
        width = width.max(focus.min_view);
        height = height.max(focus.min_view);

        // Recenter on the casters in the light view plane.
        let center = caster_box.center();
        let offset = shadow_camera.rotation * Vec3::new(center.x, center.y, 0.0);
        shadow_camera.position += offset;
        shadow_camera.set_orthographic(width, height);
    } else {
        // Zoom factor that still covers every caster corner.
        let tan_half = (shadow_camera.fov_y_radians * 0.5).tan();
        let mut needed: f32 = 0.0;
        for corner in caster_box.corners() {
            // The caster box is already in light view space.
            let depth = (-corner.z).max(shadow_camera.near);
            let extent = corner.x.abs().max(corner.y.abs());
            needed = needed.max(extent / (depth * tan_half));
        }
        if needed > 0.0 && needed < 1.0 {
            let mut zoom = 1.0 / needed;
            if focus.quantize > 0.0 {
                zoom = (zoom / (1.0 + focus.quantize)).max(1.0);
            }
            shadow_camera.zoom = zoom.max(1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SourceBatch;
    use crate::settings::RenderSettings;
    use glam::Mat4;

    fn renderer() -> Renderer {
        Renderer::new(RenderSettings::default())
    }

    fn caster_at(position: Vec3) -> Drawable {
        Drawable::new(BoundingBox::from_center_size(position, Vec3::splat(1.0)))
            .with_batch(SourceBatch::new(
                crate::resources::Handle::new(0),
                crate::resources::Handle::new(0),
                Mat4::from_translation(position),
            ))
            .with_shadows()
    }

    #[test]
    fn directional_light_gets_one_camera_per_cascade() {
        let renderer = renderer();
        let mut camera = Camera::default();
        camera.far = 300.0;
        let light = Light::directional(Vec3::new(0.3, -1.0, 0.2)).with_shadows();

        let splits = setup_shadow_cameras(&renderer, &light, &camera);
        assert_eq!(splits.len(), 3);
        assert_eq!(splits[0].near_split, camera.near);
        assert_eq!(splits[0].far_split, 10.0);
        assert_eq!(splits[1].near_split, 10.0);
        assert!(splits.iter().all(|s| s.shadow_camera.orthographic));
        // Each cascade must actually contain its slice of the view frustum.
        let slice = camera.split_frustum(10.0, 50.0).world_box();
        assert_ne!(
            splits[1].shadow_camera.frustum().test_box(&slice),
            Intersection::Outside
        );
    }

    #[test]
    fn point_light_faces_cover_all_directions() {
        let renderer = renderer();
        let camera = Camera::default();
        let light = Light::point(Vec3::new(1.0, 2.0, 3.0), 8.0).with_shadows();

        let splits = setup_shadow_cameras(&renderer, &light, &camera);
        assert_eq!(splits.len(), 6);
        for (split, (direction, _)) in splits.iter().zip(POINT_FACE_DIRECTIONS) {
            let probe = light.position + direction * 4.0;
            assert!(
                split.shadow_camera.frustum().contains_point(probe),
                "face toward {:?} misses its direction",
                direction
            );
        }
    }

    #[test]
    fn spot_camera_matches_the_light_cone() {
        let renderer = renderer();
        let camera = Camera::default();
        let light = Light::spot(Vec3::ZERO, Vec3::NEG_Z, 20.0, 1.0).with_shadows();

        let splits = setup_shadow_cameras(&renderer, &light, &camera);
        assert_eq!(splits.len(), 1);
        let shadow_camera = &splits[0].shadow_camera;
        assert_eq!(shadow_camera.fov_y_radians, 1.0);
        assert_eq!(shadow_camera.far, 20.0);
        assert!(shadow_camera.frustum().contains_point(Vec3::new(0.0, 0.0, -10.0)));
    }

    #[test]
    fn cascade_rejects_in_view_casters_outside_its_z_slice() {
        let renderer = renderer();
        let mut camera = Camera::look_to(Vec3::ZERO, Vec3::NEG_Z);
        camera.far = 300.0;
        let light = Light::directional(Vec3::NEG_Y).with_shadows();

        let mut scene = Scene::new();
        let mut near_caster = caster_at(Vec3::new(0.0, 0.0, -5.0));
        near_caster.frame.in_view = true;
        near_caster.frame.min_z = 4.5;
        near_caster.frame.max_z = 5.5;
        let mut far_caster = caster_at(Vec3::new(0.0, 0.0, -100.0));
        far_caster.frame.in_view = true;
        far_caster.frame.min_z = 99.5;
        far_caster.frame.max_z = 100.5;
        let near_id = scene.add_drawable(near_caster);
        scene.add_drawable(far_caster);

        let mut splits = setup_shadow_cameras(&renderer, &light, &camera);
        let frustum = camera.frustum();
        let casters = collect_shadow_casters(&scene, &light, &camera, &frustum, &mut splits[0]);
        assert_eq!(casters, vec![near_id]);
    }

    #[test]
    fn off_frustum_caster_is_kept_when_its_shadow_reaches_the_view() {
        let renderer = renderer();
        let camera = Camera::look_to(Vec3::ZERO, Vec3::NEG_Z);
        let light = Light::directional(Vec3::NEG_Y).with_shadows();

        let mut scene = Scene::new();
        // Above the view frustum, not in view, but its shadow falls straight
        // down into it.
        let above = caster_at(Vec3::new(0.0, 30.0, -5.0));
        let id = scene.add_drawable(above);

        let mut splits = setup_shadow_cameras(&renderer, &light, &camera);
        let frustum = camera.frustum();
        let casters = collect_shadow_casters(&scene, &light, &camera, &frustum, &mut splits[0]);
        assert_eq!(casters, vec![id]);
    }

    #[test]
    fn focusing_tightens_a_spot_camera() {
        let renderer = renderer();
        let camera = Camera::default();
        let light = Light::spot(Vec3::ZERO, Vec3::NEG_Z, 50.0, 1.2).with_shadows();
        let mut splits = setup_shadow_cameras(&renderer, &light, &camera);

        // Small caster cluster near the cone axis.
        splits[0].caster_box =
            BoundingBox::from_center_size(Vec3::new(0.0, 0.0, -25.0), Vec3::splat(2.0));
        focus_shadow_camera(&mut splits[0], &light);
        assert!(splits[0].shadow_camera.zoom > 1.0);
    }
}
