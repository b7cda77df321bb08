use crate::model::DrawableSource;
use crate::rect::Rect;

/// Model-space bounds of a drawable's current vertices.
///
/// Returns `None` when the drawable contributes nothing this frame: no vertices,
/// hidden, fully transparent, or no finite coordinates.
pub fn drawable_bounds<M: DrawableSource + ?Sized>(source: &M, index: usize) -> Option<Rect> {
    if !source.is_visible(index) || source.opacity(index) <= 0.0 {
        return None;
    }

    let mut bounds: Option<Rect> = None;
    for &p in source.vertex_positions(index) {
        if !p.is_finite() {
            continue;
        }
        bounds = Some(match bounds {
            Some(b) => b.include_point(p),
            None => Rect::new(p, p),
        });
    }
    bounds
}

/// Union of the bounds of every drawable in `drawables`, or `None` if none contributes.
pub fn clipped_draw_bounds<M: DrawableSource + ?Sized>(
    source: &M,
    drawables: &[usize],
) -> Option<Rect> {
    drawables
        .iter()
        .filter_map(|&i| drawable_bounds(source, i))
        .reduce(|acc, r| acc.union(&r))
}
