//! Presentation layer: headless views fed by the image loader.

/// Recycled image grid.
pub mod grid;

pub use grid::{Grid, GridCell};
