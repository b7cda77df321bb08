//! Mask atlas slot allocation.
//!
//! Every in-use mask gets one (surface, channel, sub-rect) slot per frame:
//! - masks are spread as evenly as possible over the physical surfaces
//! - inside a surface, as evenly as possible over the four color channels
//! - inside a channel, on a grid sized to the local count (1, 2, 2x2 or 3x3)
//!
//! A channel holds at most [`MAX_MASKS_PER_CHANNEL`] masks. Anything beyond
//! that is rejected and reported; rejected masks get no slot and render nothing.

use glam::Vec2;

use crate::color::CHANNEL_COUNT;
use crate::rect::Rect;

/// Largest grid a single channel is divided into (3x3).
pub const MAX_MASKS_PER_CHANNEL: usize = 9;

/// Where one mask lives in the atlas for the current frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutSlot {
    /// Physical surface the mask is drawn into.
    pub surface_index: usize,
    /// Color channel (0 = R, 1 = G, 2 = B, 3 = A).
    pub channel: usize,
    /// Normalized sub-rectangle of the surface.
    pub bounds: Rect,
}

/// Result of one allocation pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayoutPlan {
    /// One entry per requested mask, in request order. `None` means rejected.
    pub slots: Vec<Option<LayoutSlot>>,
    /// Number of masks that could not be placed.
    pub rejected: usize,
}

/// Stateless allocator for mask atlas slots.
#[derive(Clone, Copy, Debug, Default)]
pub struct LayoutAllocator;

impl LayoutAllocator {
    /// Assign slots for `count` masks across `surface_count` surfaces.
    ///
    /// Slots are handed out in order, so the i-th in-use mask always gets the
    /// same slot for the same `(count, surface_count)`.
    pub fn allocate(count: usize, surface_count: usize) -> LayoutPlan {
        let surface_count = surface_count.max(1);
        let mut plan = LayoutPlan {
            slots: Vec::with_capacity(count),
            rejected: 0,
        };

        for (surface_index, surface_masks) in
            distribute(count, surface_count).into_iter().enumerate()
        {
            for (channel, channel_masks) in distribute(surface_masks, CHANNEL_COUNT)
                .into_iter()
                .enumerate()
            {
                if channel_masks > MAX_MASKS_PER_CHANNEL {
                    log::error!(
                        "not supported mask count: {} masks in channel {} of surface {} \
                         (limit {}, {} masks in use over {} surfaces)",
                        channel_masks,
                        channel,
                        surface_index,
                        MAX_MASKS_PER_CHANNEL,
                        count,
                        surface_count
                    );
                }

                for i in 0..channel_masks {
                    let slot = cell_bounds(channel_masks, i).map(|bounds| LayoutSlot {
                        surface_index,
                        channel,
                        bounds,
                    });
                    if slot.is_none() {
                        plan.rejected += 1;
                    }
                    plan.slots.push(slot);
                }
            }
        }

        plan
    }

    /// Slot covering surface 0, channel 0 completely.
    ///
    /// Used when each mask is rendered right before the drawable that needs it.
    pub fn full_surface() -> LayoutSlot {
        LayoutSlot {
            surface_index: 0,
            channel: 0,
            bounds: Rect::unit(),
        }
    }
}

/// Split `count` into `buckets` parts, the first `count % buckets` getting one extra.
fn distribute(count: usize, buckets: usize) -> Vec<usize> {
    let div = count / buckets;
    let rem = count % buckets;
    (0..buckets).map(|b| div + usize::from(b < rem)).collect()
}

/// Sub-rectangles for a channel holding `count` masks.
///
/// Entries past [`MAX_MASKS_PER_CHANNEL`] are `None`.
pub fn channel_layout(count: usize) -> Vec<Option<Rect>> {
    (0..count).map(|i| cell_bounds(count, i)).collect()
}

/// Bounds of the `index`-th mask in a channel holding `count` masks.
fn cell_bounds(count: usize, index: usize) -> Option<Rect> {
    match count {
        0 => None,
        1 => Some(Rect::unit()),
        2 => Some(Rect::from_min_size(
            Vec2::new((index % 2) as f32 * 0.5, 0.0),
            Vec2::new(0.5, 1.0),
        )),
        3..=4 => Some(grid_cell(2, index)),
        _ if index < MAX_MASKS_PER_CHANNEL => Some(grid_cell(3, index)),
        _ => None,
    }
}

/// Row-major cell of a `side x side` grid.
fn grid_cell(side: usize, index: usize) -> Rect {
    let cell = 1.0 / side as f32;
    let x = (index % side) as f32 * cell;
    let y = (index / side) as f32 * cell;
    Rect::from_min_size(Vec2::new(x, y), Vec2::splat(cell))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_counts(plan: &LayoutPlan) -> [usize; CHANNEL_COUNT] {
        let mut counts = [0; CHANNEL_COUNT];
        for slot in plan.slots.iter().flatten() {
            counts[slot.channel] += 1;
        }
        counts
    }

    #[test]
    fn test_single_mask_uses_whole_channel() {
        let plan = LayoutAllocator::allocate(1, 1);
        assert_eq!(
            plan.slots,
            vec![Some(LayoutSlot {
                surface_index: 0,
                channel: 0,
                bounds: Rect::unit(),
            })]
        );
    }

    #[test]
    fn test_four_masks_one_per_channel() {
        let plan = LayoutAllocator::allocate(4, 1);
        assert_eq!(channel_counts(&plan), [1, 1, 1, 1]);
        assert!(plan.slots.iter().flatten().all(|s| s.bounds == Rect::unit()));
    }

    #[test]
    fn test_five_masks_split_first_channel_in_halves() {
        let plan = LayoutAllocator::allocate(5, 1);
        assert_eq!(channel_counts(&plan), [2, 1, 1, 1]);
        assert_eq!(plan.rejected, 0);

        let first = plan.slots[0].unwrap();
        let second = plan.slots[1].unwrap();
        assert_eq!(first.channel, 0);
        assert_eq!(second.channel, 0);
        assert_eq!(
            first.bounds,
            Rect::from_min_size(Vec2::ZERO, Vec2::new(0.5, 1.0))
        );
        assert_eq!(
            second.bounds,
            Rect::from_min_size(Vec2::new(0.5, 0.0), Vec2::new(0.5, 1.0))
        );
    }

    #[test]
    fn test_quad_and_nine_grids() {
        let quad = channel_layout(3);
        assert_eq!(
            quad[2],
            Some(Rect::from_min_size(Vec2::new(0.0, 0.5), Vec2::splat(0.5)))
        );

        let nine = channel_layout(9);
        let last = nine[8].unwrap();
        assert!((last.min - Vec2::splat(2.0 / 3.0)).length() < 1e-6);
        assert!((last.width() - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_tenth_mask_in_a_channel_is_rejected() {
        let cells = channel_layout(10);
        assert_eq!(cells.len(), 10);
        assert!(cells[..9].iter().all(Option::is_some));
        assert_eq!(cells[9], None);
    }

    #[test]
    fn test_overflowing_surface_rejects_without_panicking() {
        // 37 masks on one surface: 10 land in channel 0.
        let plan = LayoutAllocator::allocate(37, 1);
        assert_eq!(plan.slots.len(), 37);
        assert_eq!(plan.rejected, 1);
        assert_eq!(plan.slots[9], None);
        assert_eq!(channel_counts(&plan), [9, 9, 9, 9]);
    }

    #[test]
    fn test_no_two_masks_share_a_slot() {
        for surfaces in 1..=3 {
            let plan = LayoutAllocator::allocate(40, surfaces);
            let placed: Vec<_> = plan.slots.iter().flatten().collect();
            for (i, a) in placed.iter().enumerate() {
                for b in &placed[i + 1..] {
                    assert!(
                        a.surface_index != b.surface_index
                            || a.channel != b.channel
                            || a.bounds != b.bounds
                    );
                }
            }
        }
    }

    #[test]
    fn test_masks_spread_over_surfaces() {
        let plan = LayoutAllocator::allocate(5, 2);
        let on_first = plan
            .slots
            .iter()
            .flatten()
            .filter(|s| s.surface_index == 0)
            .count();
        assert_eq!(on_first, 3);
        // Surfaces are filled in order.
        assert_eq!(plan.slots[3].unwrap().surface_index, 1);
    }

    #[test]
    fn test_allocation_is_deterministic() {
        assert_eq!(LayoutAllocator::allocate(23, 2), LayoutAllocator::allocate(23, 2));
    }

    #[test]
    fn test_zero_surfaces_behaves_like_one() {
        assert_eq!(LayoutAllocator::allocate(6, 0), LayoutAllocator::allocate(6, 1));
    }
}
