//! Coordinate and geometry types shared by the scene and the renderers.
//!
//! Canonical CPU space:
//! - Logical pixels, scaled by a target's resolution at viewport time
//! - Origin top-left
//! - +X right, +Y down
//!
//! Render targets convert to clip space through their projection matrix.

mod matrix;
mod rect;
mod vec2;
mod viewport;

pub use matrix::{Decomposed, Matrix, SingularMatrixError};
pub use rect::Rect;
pub use vec2::Vec2;
pub use viewport::Viewport;
