//! Error types for degraded frames.
//!
//! None of these abort a frame. The manager logs them and skips the single
//! surface or draw call involved.

use thiserror::Error;

/// A mask surface could not be created.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("Invalid mask surface size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    #[error("Mask surface {width}x{height} exceeds the backend limit of {limit}")]
    TooLarge { width: u32, height: u32, limit: u32 },

    #[error("Mask surface creation failed: {0}")]
    Backend(String),
}

/// A single draw call was skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DrawError {
    #[error("Texture {texture} for drawable {drawable} is not bound")]
    TextureUnbound { drawable: usize, texture: usize },

    #[error("Drawable {0} has no vertex data")]
    EmptyMesh(usize),

    #[error("Mask surface {0} is not available")]
    SurfaceUnavailable(usize),

    #[error("Draw failed: {0}")]
    Backend(String),
}
