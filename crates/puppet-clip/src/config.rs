use crate::transform::ClipSpace;

/// Default mask surface edge length in pixels.
pub const DEFAULT_ATLAS_SIZE: u32 = 256;

/// When masks are rendered relative to the drawables they clip.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MaskingMode {
    /// All masks are packed into the shared atlas once per frame, before the model draws.
    #[default]
    Buffered,
    /// Each clipped drawable renders its mask over a whole surface right before itself.
    HighPrecision,
}

/// Settings fixed for the lifetime of a manager (except the atlas size).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClippingConfig {
    /// Size of each mask surface in pixels.
    pub atlas_size: (u32, u32),
    pub mode: MaskingMode,
    pub clip_space: ClipSpace,
}

impl Default for ClippingConfig {
    fn default() -> Self {
        Self {
            atlas_size: (DEFAULT_ATLAS_SIZE, DEFAULT_ATLAS_SIZE),
            mode: MaskingMode::Buffered,
            clip_space: ClipSpace::YUp,
        }
    }
}

impl ClippingConfig {
    pub fn with_atlas_size(mut self, width: u32, height: u32) -> Self {
        self.atlas_size = (width, height);
        self
    }

    pub fn with_mode(mut self, mode: MaskingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_clip_space(mut self, clip_space: ClipSpace) -> Self {
        self.clip_space = clip_space;
        self
    }
}
