pub mod camera;
pub mod drawable;
pub mod index;
pub mod light;
pub mod zone;

pub use camera::Camera;
pub use drawable::{
    Drawable, DrawableFlags, DrawableFrame, DrawableId, GeometryType, GeometryUpdateFn,
    SourceBatch, UpdateGeometryKind,
};
pub use index::{Scene, SpatialIndex};
pub use light::{
    BiasParameters, CascadeParameters, FocusParameters, Light, LightId, LightType,
    MAX_CASCADE_SPLITS, MAX_SHADOW_SPLITS, POINT_LIGHT_FACES,
};
pub use zone::{Zone, ZoneId};
