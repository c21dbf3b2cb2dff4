use glam::Vec3;

use crate::math::BoundingBox;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ZoneId(pub u32);

/// A volume supplying ambient and fog parameters to the geometries it
/// contains. When several zones overlap, the highest priority wins.
#[derive(Debug, Clone)]
pub struct Zone {
    pub bounds: BoundingBox,
    pub priority: i32,
    pub ambient_color: Vec3,
    pub fog_color: Vec3,
    pub fog_start: f32,
    pub fog_end: f32,
    pub zone_mask: u32,
}

impl Zone {
    pub fn new(bounds: BoundingBox) -> Self {
        Self {
            bounds,
            priority: 0,
            ambient_color: Vec3::splat(0.1),
            fog_color: Vec3::ZERO,
            fog_start: 250.0,
            fog_end: 1000.0,
            zone_mask: u32::MAX,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.bounds.contains_point(point)
    }
}

impl Default for Zone {
    fn default() -> Self {
        // The implicit default zone spans everything at the lowest priority.
        let mut zone = Zone::new(BoundingBox::new(
            Vec3::splat(-f32::MAX),
            Vec3::splat(f32::MAX),
        ));
        zone.priority = i32::MIN;
        zone
    }
}
