//! Per-frame drawable data consumed from the deformation engine.
//!
//! The clipping subsystem never owns vertex data. It reads it through
//! [`DrawableSource`], which the host implements on top of whatever produces
//! the deformed meshes. [`Model`] is a plain in-memory implementation used by
//! tests and the demo.

use glam::Vec2;

/// How a drawable's color is combined with what is already in the target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    #[default]
    Normal,
    Additive,
    Multiplicative,
}

/// Read-only view of the drawables of a deformed model for the current frame.
///
/// Drawables are addressed by index in `0..drawable_count()`. Mask ids are
/// indices of the drawables whose alpha forms the stencil.
pub trait DrawableSource {
    fn drawable_count(&self) -> usize;

    /// Deformed vertex positions in model space.
    fn vertex_positions(&self, index: usize) -> &[Vec2];

    /// Triangle list indices into [`DrawableSource::vertex_positions`].
    fn vertex_indices(&self, index: usize) -> &[u16];

    fn vertex_uvs(&self, index: usize) -> &[Vec2];

    /// True when the vertex positions differ from the previous frame.
    fn vertex_positions_changed(&self, index: usize) -> bool;

    fn opacity(&self, index: usize) -> f32;

    fn is_visible(&self, index: usize) -> bool;

    fn render_order(&self, index: usize) -> i32;

    /// Whether back faces should be culled when drawing this drawable.
    fn is_culling(&self, index: usize) -> bool;

    fn blend_mode(&self, index: usize) -> BlendMode;

    /// Backend texture slot the drawable samples from.
    fn texture_index(&self, index: usize) -> usize;

    /// Indices of the drawables masking this one (empty when unmasked).
    fn mask_ids(&self, index: usize) -> &[usize];

    /// When true the drawable renders only where its mask is *not* set.
    fn is_inverted_mask(&self, _index: usize) -> bool {
        false
    }

    /// True if any drawable is masked.
    fn uses_masking(&self) -> bool {
        (0..self.drawable_count()).any(|i| !self.mask_ids(i).is_empty())
    }
}

/// A single paintable part of a [`Model`].
#[derive(Clone, Debug)]
pub struct Drawable {
    pub positions: Vec<Vec2>,
    pub uvs: Vec<Vec2>,
    pub indices: Vec<u16>,
    pub opacity: f32,
    pub visible: bool,
    pub render_order: i32,
    pub culling: bool,
    pub blend_mode: BlendMode,
    pub texture_index: usize,
    pub masks: Vec<usize>,
    pub inverted_mask: bool,
    /// Set by [`Model::set_positions`], cleared by [`Model::reset_dynamic_flags`].
    pub positions_changed: bool,
}

impl Drawable {
    /// Axis-aligned quad covering `min..max` with full-texture UVs.
    pub fn quad(min: Vec2, max: Vec2) -> Self {
        Self {
            positions: vec![
                min,
                Vec2::new(max.x, min.y),
                max,
                Vec2::new(min.x, max.y),
            ],
            uvs: vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(1.0, 1.0),
                Vec2::new(0.0, 1.0),
            ],
            indices: vec![0, 1, 2, 0, 2, 3],
            opacity: 1.0,
            visible: true,
            render_order: 0,
            culling: false,
            blend_mode: BlendMode::Normal,
            texture_index: 0,
            masks: Vec::new(),
            inverted_mask: false,
            positions_changed: true,
        }
    }

    pub fn with_masks(mut self, masks: impl Into<Vec<usize>>) -> Self {
        self.masks = masks.into();
        self
    }

    pub fn with_render_order(mut self, order: i32) -> Self {
        self.render_order = order;
        self
    }

    pub fn with_texture(mut self, texture_index: usize) -> Self {
        self.texture_index = texture_index;
        self
    }

    pub fn with_blend_mode(mut self, blend_mode: BlendMode) -> Self {
        self.blend_mode = blend_mode;
        self
    }

    pub fn with_inverted_mask(mut self, inverted: bool) -> Self {
        self.inverted_mask = inverted;
        self
    }
}

/// In-memory model snapshot.
#[derive(Clone, Debug, Default)]
pub struct Model {
    drawables: Vec<Drawable>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_drawables(drawables: Vec<Drawable>) -> Self {
        Self { drawables }
    }

    /// Append a drawable and return its index.
    pub fn push(&mut self, drawable: Drawable) -> usize {
        self.drawables.push(drawable);
        self.drawables.len() - 1
    }

    pub fn drawable(&self, index: usize) -> Option<&Drawable> {
        self.drawables.get(index)
    }

    pub fn drawable_mut(&mut self, index: usize) -> Option<&mut Drawable> {
        self.drawables.get_mut(index)
    }

    /// Replace the deformed positions of a drawable and flag them as changed.
    pub fn set_positions(&mut self, index: usize, positions: Vec<Vec2>) {
        if let Some(d) = self.drawables.get_mut(index) {
            d.positions = positions;
            d.positions_changed = true;
        }
    }

    /// Translate every vertex of a drawable.
    pub fn translate(&mut self, index: usize, delta: Vec2) {
        if let Some(d) = self.drawables.get_mut(index) {
            for p in &mut d.positions {
                *p += delta;
            }
            d.positions_changed = true;
        }
    }

    pub fn set_opacity(&mut self, index: usize, opacity: f32) {
        if let Some(d) = self.drawables.get_mut(index) {
            d.opacity = opacity;
        }
    }

    pub fn set_visible(&mut self, index: usize, visible: bool) {
        if let Some(d) = self.drawables.get_mut(index) {
            d.visible = visible;
        }
    }

    /// Call once the frame has been drawn.
    pub fn reset_dynamic_flags(&mut self) {
        for d in &mut self.drawables {
            d.positions_changed = false;
        }
    }
}

impl DrawableSource for Model {
    fn drawable_count(&self) -> usize {
        self.drawables.len()
    }

    fn vertex_positions(&self, index: usize) -> &[Vec2] {
        self.drawables
            .get(index)
            .map_or(&[], |d| d.positions.as_slice())
    }

    fn vertex_indices(&self, index: usize) -> &[u16] {
        self.drawables
            .get(index)
            .map_or(&[], |d| d.indices.as_slice())
    }

    fn vertex_uvs(&self, index: usize) -> &[Vec2] {
        self.drawables.get(index).map_or(&[], |d| d.uvs.as_slice())
    }

    fn vertex_positions_changed(&self, index: usize) -> bool {
        self.drawables
            .get(index)
            .is_some_and(|d| d.positions_changed)
    }

    fn opacity(&self, index: usize) -> f32 {
        self.drawables.get(index).map_or(0.0, |d| d.opacity)
    }

    fn is_visible(&self, index: usize) -> bool {
        self.drawables.get(index).is_some_and(|d| d.visible)
    }

    fn render_order(&self, index: usize) -> i32 {
        self.drawables.get(index).map_or(0, |d| d.render_order)
    }

    fn is_culling(&self, index: usize) -> bool {
        self.drawables.get(index).is_some_and(|d| d.culling)
    }

    fn blend_mode(&self, index: usize) -> BlendMode {
        self.drawables
            .get(index)
            .map_or(BlendMode::Normal, |d| d.blend_mode)
    }

    fn texture_index(&self, index: usize) -> usize {
        self.drawables.get(index).map_or(0, |d| d.texture_index)
    }

    fn mask_ids(&self, index: usize) -> &[usize] {
        self.drawables.get(index).map_or(&[], |d| d.masks.as_slice())
    }

    fn is_inverted_mask(&self, index: usize) -> bool {
        self.drawables.get(index).is_some_and(|d| d.inverted_mask)
    }
}
