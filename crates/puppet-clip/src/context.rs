use glam::Mat4;

use crate::dedup::MaskKey;
use crate::layout::LayoutSlot;
use crate::rect::Rect;
use crate::transform::MaskTransforms;

const EMPTY_RECT: Rect = Rect::new(glam::Vec2::ZERO, glam::Vec2::ZERO);

/// One unique mask shared by every drawable it clips.
///
/// Created once when the manager is initialized and kept for its lifetime.
/// Everything except the key and the clipped drawable list is overwritten each frame.
#[derive(Clone, Debug)]
pub struct MaskContext {
    key: MaskKey,
    clipped_drawables: Vec<usize>,

    is_using: bool,
    all_clipped_draw_rect: Rect,
    layout: Option<LayoutSlot>,
    transforms: MaskTransforms,
}

impl MaskContext {
    pub fn new(key: MaskKey) -> Self {
        Self {
            key,
            clipped_drawables: Vec::new(),
            is_using: false,
            all_clipped_draw_rect: EMPTY_RECT,
            layout: None,
            transforms: MaskTransforms::default(),
        }
    }

    pub fn key(&self) -> &MaskKey {
        &self.key
    }

    /// Indices of the drawables whose alpha forms this mask.
    pub fn mask_ids(&self) -> &[usize] {
        self.key.ids()
    }

    /// Indices of the drawables this mask restricts.
    pub fn clipped_drawable_index_list(&self) -> &[usize] {
        &self.clipped_drawables
    }

    pub(crate) fn add_clipped_drawable(&mut self, index: usize) {
        self.clipped_drawables.push(index);
    }

    /// True when at least one clipped drawable contributes bounds this frame.
    pub fn is_using(&self) -> bool {
        self.is_using
    }

    /// Union of the clipped drawables' bounds in model space for this frame.
    ///
    /// Empty when nothing clipped by this mask is drawn.
    pub fn all_clipped_draw_rect(&self) -> Rect {
        self.all_clipped_draw_rect
    }

    /// Slot assigned this frame, `None` when not in use or rejected for capacity.
    pub fn layout(&self) -> Option<LayoutSlot> {
        self.layout
    }

    pub fn layout_channel_index(&self) -> Option<usize> {
        self.layout.map(|s| s.channel)
    }

    pub fn layout_bounds(&self) -> Option<Rect> {
        self.layout.map(|s| s.bounds)
    }

    pub fn buffer_index(&self) -> Option<usize> {
        self.layout.map(|s| s.surface_index)
    }

    /// Model space to mask-surface clip space.
    pub fn matrix_for_mask(&self) -> Mat4 {
        self.transforms.for_mask
    }

    /// Model space to mask sampling space.
    pub fn matrix_for_draw(&self) -> Mat4 {
        self.transforms.for_draw
    }

    /// Whether the mask is drawn this frame.
    pub fn is_renderable(&self) -> bool {
        self.is_using && self.layout.is_some()
    }

    pub(crate) fn set_bounds(&mut self, bounds: Option<Rect>) {
        self.is_using = bounds.is_some();
        self.all_clipped_draw_rect = bounds.unwrap_or(EMPTY_RECT);
        self.layout = None;
    }

    pub(crate) fn set_layout(&mut self, slot: Option<LayoutSlot>, transforms: MaskTransforms) {
        self.layout = slot;
        self.transforms = transforms;
    }

    pub(crate) fn reset_frame_state(&mut self) {
        self.is_using = false;
        self.all_clipped_draw_rect = EMPTY_RECT;
        self.layout = None;
        self.transforms = MaskTransforms::default();
    }
}
