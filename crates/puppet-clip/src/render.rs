use glam::Mat4;

use crate::color::Color;
use crate::context::MaskContext;
use crate::error::DrawError;
use crate::model::DrawableSource;
use crate::surface::MaskSurface;

/// Backend draw submission for mask shapes.
pub trait MaskDrawer<S: MaskSurface> {
    /// Draw one masking drawable into the currently bound `surface`.
    ///
    /// Use `context.matrix_for_mask()` as the vertex transform and write only
    /// the channel of `context.layout_channel_index()`. Vertex data only needs
    /// re-uploading when `source.vertex_positions_changed(drawable)` is set.
    fn draw_mask(
        &mut self,
        surface: &mut S,
        source: &dyn DrawableSource,
        drawable: usize,
        context: &MaskContext,
    ) -> Result<(), DrawError>;
}

/// What a clipped drawable needs to sample its mask.
pub struct MaskBinding<'a, S: MaskSurface> {
    pub surface: &'a S,
    /// Model space to mask sampling space.
    pub matrix: Mat4,
    /// Selects the channel holding this mask.
    pub channel_color: Color,
    /// Render where the mask is *not* set.
    pub inverted: bool,
}

/// Backend draw submission for ordinary drawables.
pub trait ModelDrawer<S: MaskSurface>: MaskDrawer<S> {
    /// Draw `drawable` into the main target, sampling `mask` when present.
    fn draw_drawable(
        &mut self,
        source: &dyn DrawableSource,
        drawable: usize,
        mask: Option<MaskBinding<'_, S>>,
    ) -> Result<(), DrawError>;

    /// Submit pending model draws.
    ///
    /// Called before a mask surface is rewritten mid-frame and once at the end of the frame.
    fn flush(&mut self) {}
}

/// Counters for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub contexts_in_use: usize,
    pub rejected_masks: usize,
    pub mask_draw_calls: usize,
    pub model_draw_calls: usize,
    pub skipped_draws: usize,
}
