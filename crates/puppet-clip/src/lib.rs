//! # puppet-clip
//!
//! Graphics backend agnostic clipping masks for deformable 2D puppets.
//!
//! A drawable can be clipped by the union of other drawables' alpha. Each
//! unique set of masking drawables becomes one [`MaskContext`], shared by all
//! drawables it clips. Every frame, [`ClippingManager`] packs the masks in use
//! into the color channels and sub-rectangles of a few offscreen surfaces and
//! hands the draws to a backend through [`MaskDrawer`] and [`ModelDrawer`].
//! Backends like `puppet-clip-wgpu` provide the surfaces and shaders.

mod bounds;
mod color;
mod config;
mod context;
mod dedup;
mod error;
mod layout;
mod manager;
mod model;
mod rect;
mod render;
mod surface;
mod transform;

#[cfg(test)]
mod test_support;

pub use bounds::*;
pub use color::*;
pub use config::*;
pub use context::*;
pub use dedup::*;
pub use error::*;
pub use layout::*;
pub use manager::*;
pub use model::*;
pub use rect::*;
pub use render::*;
pub use surface::*;
pub use transform::*;
