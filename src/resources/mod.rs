pub mod cache;
pub mod geometry;
pub mod handle;
pub mod material;
pub mod technique;

pub use cache::ResourceCache;
pub use geometry::Geometry;
pub use handle::Handle;
pub use material::Material;
pub use technique::{Pass, PassLighting, PassRegistry, Technique};

/// All resource stores the pipeline reads during a frame, bundled so call
/// sites pass one reference instead of four.
pub struct Assets {
    pub geometries: ResourceCache<Geometry>,
    pub materials: ResourceCache<Material>,
    pub techniques: ResourceCache<Technique>,
    pub passes: PassRegistry,
}

impl Assets {
    pub fn new() -> Self {
        Self {
            geometries: ResourceCache::new(),
            materials: ResourceCache::new(),
            techniques: ResourceCache::new(),
            passes: PassRegistry::new(),
        }
    }
}

impl Default for Assets {
    fn default() -> Self {
        Self::new()
    }
}
