//! Shape descriptors with optionally dynamic rank and dimensions.

pub mod dimension;
pub mod partial_shape;

pub use dimension::Dimension;
pub use partial_shape::PartialShape;
