use crate::math::{Frustum, Intersection, Sphere};

use super::{Drawable, DrawableId, Light, LightId, LightType, Zone, ZoneId};

/// The spatial-index collaborator: containment queries over scene content.
/// A production engine backs this with an octree; [`Scene`] provides a
/// linear-scan reference implementation with identical semantics.
pub trait SpatialIndex {
    fn geometries_in_frustum(&self, frustum: &Frustum, view_mask: u32) -> Vec<DrawableId>;
    fn occluders_in_frustum(&self, frustum: &Frustum, view_mask: u32) -> Vec<DrawableId>;
    fn lights_in_frustum(&self, frustum: &Frustum, view_mask: u32) -> Vec<LightId>;
    fn zones_in_frustum(&self, frustum: &Frustum) -> Vec<ZoneId>;
    fn lit_geometries_in_sphere(&self, sphere: &Sphere, light_mask: u32) -> Vec<DrawableId>;
    fn lit_geometries_in_frustum(&self, frustum: &Frustum, light_mask: u32) -> Vec<DrawableId>;
    fn shadow_casters_in_frustum(&self, frustum: &Frustum, shadow_mask: u32) -> Vec<DrawableId>;
}

/// Scene content the pipeline consumes: drawables, lights and zones plus the
/// reference spatial index over them. The pipeline holds ids into these
/// vectors for at most one frame.
#[derive(Default)]
pub struct Scene {
    pub drawables: Vec<Drawable>,
    pub lights: Vec<Light>,
    pub zones: Vec<Zone>,
    pub default_zone: Zone,
    /// Set while the scene streams in resource-only content; views that need
    /// scene passes refuse to define themselves until loading finishes.
    pub loading: bool,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            default_zone: Zone::default(),
            ..Default::default()
        }
    }

    pub fn add_drawable(&mut self, drawable: Drawable) -> DrawableId {
        let id = DrawableId(self.drawables.len() as u32);
        self.drawables.push(drawable);
        id
    }

    pub fn add_light(&mut self, light: Light) -> LightId {
        let id = LightId(self.lights.len() as u32);
        self.lights.push(light);
        id
    }

    pub fn add_zone(&mut self, zone: Zone) -> ZoneId {
        let id = ZoneId(self.zones.len() as u32);
        self.zones.push(zone);
        id
    }

    pub fn drawable(&self, id: DrawableId) -> &Drawable {
        &self.drawables[id.0 as usize]
    }

    pub fn drawable_mut(&mut self, id: DrawableId) -> &mut Drawable {
        &mut self.drawables[id.0 as usize]
    }

    pub fn light(&self, id: LightId) -> &Light {
        &self.lights[id.0 as usize]
    }

    pub fn zone(&self, id: ZoneId) -> &Zone {
        &self.zones[id.0 as usize]
    }

    /// Clears all per-frame drawable and light state before a view update.
    pub fn reset_frame_state(&mut self) {
        for drawable in &mut self.drawables {
            drawable.frame.reset();
        }
        for light in &mut self.lights {
            light.frame = Default::default();
        }
    }

    fn light_in_frustum(light: &Light, frustum: &Frustum) -> bool {
        match light.light_type {
            LightType::Directional => true,
            LightType::Point => {
                frustum.test_sphere(&light.volume_sphere()) != Intersection::Outside
            }
            LightType::Spot => frustum.test_box(&light.world_bounds()) != Intersection::Outside,
        }
    }
}

impl SpatialIndex for Scene {
    fn geometries_in_frustum(&self, frustum: &Frustum, view_mask: u32) -> Vec<DrawableId> {
        self.drawables
            .iter()
            .enumerate()
            .filter(|(_, d)| {
                !d.batches.is_empty()
                    && d.view_mask & view_mask != 0
                    && frustum.test_box(&d.bounds) != Intersection::Outside
            })
            .map(|(i, _)| DrawableId(i as u32))
            .collect()
    }

    fn occluders_in_frustum(&self, frustum: &Frustum, view_mask: u32) -> Vec<DrawableId> {
        self.drawables
            .iter()
            .enumerate()
            .filter(|(_, d)| {
                d.occluder
                    && d.view_mask & view_mask != 0
                    && frustum.test_box(&d.bounds) != Intersection::Outside
            })
            .map(|(i, _)| DrawableId(i as u32))
            .collect()
    }

    fn lights_in_frustum(&self, frustum: &Frustum, view_mask: u32) -> Vec<LightId> {
        self.lights
            .iter()
            .enumerate()
            .filter(|(_, l)| l.light_mask & view_mask != 0 && Self::light_in_frustum(l, frustum))
            .map(|(i, _)| LightId(i as u32))
            .collect()
    }

    fn zones_in_frustum(&self, frustum: &Frustum) -> Vec<ZoneId> {
        self.zones
            .iter()
            .enumerate()
            .filter(|(_, z)| frustum.test_box(&z.bounds) != Intersection::Outside)
            .map(|(i, _)| ZoneId(i as u32))
            .collect()
    }

    fn lit_geometries_in_sphere(&self, sphere: &Sphere, light_mask: u32) -> Vec<DrawableId> {
        self.drawables
            .iter()
            .enumerate()
            .filter(|(_, d)| {
                !d.batches.is_empty()
                    && d.light_mask & light_mask != 0
                    && sphere.intersects_box(&d.bounds)
            })
            .map(|(i, _)| DrawableId(i as u32))
            .collect()
    }

    fn lit_geometries_in_frustum(&self, frustum: &Frustum, light_mask: u32) -> Vec<DrawableId> {
        self.drawables
            .iter()
            .enumerate()
            .filter(|(_, d)| {
                !d.batches.is_empty()
                    && d.light_mask & light_mask != 0
                    && frustum.test_box(&d.bounds) != Intersection::Outside
            })
            .map(|(i, _)| DrawableId(i as u32))
            .collect()
    }

    fn shadow_casters_in_frustum(&self, frustum: &Frustum, shadow_mask: u32) -> Vec<DrawableId> {
        self.drawables
            .iter()
            .enumerate()
            .filter(|(_, d)| {
                d.cast_shadows
                    && !d.batches.is_empty()
                    && d.shadow_mask & shadow_mask != 0
                    && frustum.test_box(&d.bounds) != Intersection::Outside
            })
            .map(|(i, _)| DrawableId(i as u32))
            .collect()
    }
}
