pub mod bounds;
pub mod frustum;

pub use bounds::{BoundingBox, IntRect, Intersection, Sphere};
pub use frustum::{Frustum, Plane};
