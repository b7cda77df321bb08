use glam::{Mat4, Vec2, Vec3};

use crate::rect::Rect;

/// Fraction of the bounds' own extent added on each side before fitting into a slot.
///
/// Keeps bilinear sampling at the slot edge from reading a neighbouring mask.
pub const BOUNDS_MARGIN: f32 = 0.05;

/// Vertical orientation of the backend's clip space relative to texture rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClipSpace {
    /// OpenGL style: atlas row 0 is written at clip y = -1.
    #[default]
    YUp,
    /// wgpu/Metal/D3D style: atlas row 0 is written at clip y = +1 (top of the target).
    YDown,
}

impl ClipSpace {
    /// Matrix mapping atlas-normalized `[0, 1]` coordinates to clip space.
    pub fn atlas_to_clip(self) -> Mat4 {
        match self {
            ClipSpace::YUp => {
                Mat4::from_translation(Vec3::new(-1.0, -1.0, 0.0))
                    * Mat4::from_scale(Vec3::new(2.0, 2.0, 1.0))
            }
            ClipSpace::YDown => {
                Mat4::from_translation(Vec3::new(-1.0, 1.0, 0.0))
                    * Mat4::from_scale(Vec3::new(2.0, -2.0, 1.0))
            }
        }
    }
}

/// Per-mask transforms rebuilt every frame the mask is in use.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaskTransforms {
    /// Model space to clip space of the mask surface (used while writing the mask).
    pub for_mask: Mat4,
    /// Model space to atlas `[0, 1]` sampling space (used while drawing clipped content).
    pub for_draw: Mat4,
}

impl Default for MaskTransforms {
    fn default() -> Self {
        Self {
            for_mask: Mat4::IDENTITY,
            for_draw: Mat4::IDENTITY,
        }
    }
}

/// Bounds actually fitted into the slot: margin added, zero extents replaced by a unit extent.
pub fn expanded_bounds(bounds: &Rect) -> Rect {
    let mut expanded = bounds.expand(
        bounds.width() * BOUNDS_MARGIN,
        bounds.height() * BOUNDS_MARGIN,
    );

    let center = bounds.center();
    if expanded.width() < f32::EPSILON {
        expanded.min.x = center.x - 0.5;
        expanded.max.x = center.x + 0.5;
    }
    if expanded.height() < f32::EPSILON {
        expanded.min.y = center.y - 0.5;
        expanded.max.y = center.y + 0.5;
    }
    expanded
}

/// Build the write and read transforms fitting `bounds` into `layout`.
///
/// `layout` is a normalized sub-rectangle of the mask surface.
pub fn build_mask_transforms(bounds: &Rect, layout: &Rect, clip_space: ClipSpace) -> MaskTransforms {
    let expanded = expanded_bounds(bounds);
    let scale: Vec2 = layout.size() / expanded.size();

    let for_draw = Mat4::from_translation(layout.min.extend(0.0))
        * Mat4::from_scale(scale.extend(1.0))
        * Mat4::from_translation((-expanded.min).extend(0.0));

    MaskTransforms {
        for_mask: clip_space.atlas_to_clip() * for_draw,
        for_draw,
    }
}
