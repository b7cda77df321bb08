//! Per-frame orchestration of mask contexts.
//!
//! Frame pipeline:
//! 1. bounds pass: recompute every context's model-space bounds and `is_using`
//! 2. layout pass: only when something is in use; assign atlas slots
//! 3. transforms for every slotted context
//! 4. draw-mask pass (buffered mode only)
//!
//! The draw-model pass ([`ClippingManager::draw_model`]) then draws ordinary
//! drawables, binding each clipped drawable's mask. In high-precision mode the
//! mask of a clipped drawable is redrawn over a whole surface immediately
//! before that drawable instead of in step 4.

use crate::bounds::clipped_draw_bounds;
use crate::color::{channel_color, Color, CHANNEL_COLORS};
use crate::config::{ClippingConfig, MaskingMode};
use crate::context::MaskContext;
use crate::dedup::{find_equivalent, MaskKey};
use crate::error::DrawError;
use crate::layout::{LayoutAllocator, LayoutSlot};
use crate::model::DrawableSource;
use crate::render::{FrameStats, MaskBinding, MaskDrawer, ModelDrawer};
use crate::surface::{MaskSurface, SurfaceFactory, SurfacePool};
use crate::transform::{build_mask_transforms, MaskTransforms};

/// Owns every mask context of one model and the surfaces they are drawn into.
pub struct ClippingManager<F: SurfaceFactory> {
    config: ClippingConfig,
    contexts: Vec<MaskContext>,
    /// Drawable index -> index into `contexts`.
    drawable_contexts: Vec<Option<usize>>,
    pool: SurfacePool<F>,
    surface_count: usize,

    // Scratch: contexts in use this frame, in creation order.
    in_use: Vec<usize>,
    stats: FrameStats,
    /// Set by `setup_clipping_context`, consumed by `draw_model`.
    frame_prepared: bool,
}

impl<F: SurfaceFactory> ClippingManager<F> {
    pub fn new(factory: F, config: ClippingConfig) -> Self {
        Self {
            pool: SurfacePool::new(factory, config.atlas_size),
            config,
            contexts: Vec::new(),
            drawable_contexts: Vec::new(),
            surface_count: 1,
            in_use: Vec::new(),
            stats: FrameStats::default(),
            frame_prepared: false,
        }
    }

    /// Build one context per unique mask of `model` and create the mask surfaces.
    ///
    /// `surface_count` below 1 is clamped to 1. High-precision masking always
    /// uses a single surface.
    pub fn initialize<M: DrawableSource>(&mut self, model: &M, surface_count: usize) {
        self.surface_count = if surface_count < 1 {
            log::warn!("mask surface count {} is below 1, using 1", surface_count);
            1
        } else {
            surface_count
        };

        let drawable_count = model.drawable_count();
        self.contexts.clear();
        self.drawable_contexts = vec![None; drawable_count];

        for index in 0..drawable_count {
            let ids = model.mask_ids(index);
            if ids.is_empty() {
                continue;
            }

            let valid: Vec<usize> = ids.iter().copied().filter(|&id| id < drawable_count).collect();
            if valid.len() != ids.len() {
                log::warn!(
                    "drawable {} references {} mask ids outside 0..{}, ignoring them",
                    index,
                    ids.len() - valid.len(),
                    drawable_count
                );
            }
            if valid.is_empty() {
                continue;
            }

            let key = MaskKey::new(&valid);
            let context_index = match find_equivalent(&self.contexts, &key) {
                Some(existing) => existing,
                None => {
                    self.contexts.push(MaskContext::new(key));
                    self.contexts.len() - 1
                }
            };
            self.contexts[context_index].add_clipped_drawable(index);
            self.drawable_contexts[index] = Some(context_index);
        }

        if self.config.mode == MaskingMode::HighPrecision {
            self.surface_count = 1;
        }

        if self.contexts.is_empty() {
            self.pool.recreate(0);
            log::info!("model has no masks, clipping disabled");
        } else {
            self.pool.recreate(self.surface_count);
            log::info!(
                "clipping initialized: {} mask contexts for {} drawables, {} surfaces of {}x{}",
                self.contexts.len(),
                drawable_count,
                self.surface_count,
                self.config.atlas_size.0,
                self.config.atlas_size.1
            );
        }
    }

    /// Run the bounds, layout, transform and (buffered) draw-mask passes for this frame.
    pub fn setup_clipping_context<M, D>(&mut self, model: &M, drawer: &mut D) -> FrameStats
    where
        M: DrawableSource,
        D: MaskDrawer<F::Surface>,
    {
        self.stats = FrameStats::default();
        self.frame_prepared = true;
        if self.contexts.is_empty() {
            return self.stats;
        }

        self.in_use.clear();
        for (index, context) in self.contexts.iter_mut().enumerate() {
            context.set_bounds(clipped_draw_bounds(model, context.clipped_drawable_index_list()));
            if context.is_using() {
                self.in_use.push(index);
            }
        }
        self.stats.contexts_in_use = self.in_use.len();

        if self.in_use.is_empty() {
            log::trace!("no mask in use this frame");
            return self.stats;
        }

        match self.config.mode {
            MaskingMode::Buffered => {
                let plan = LayoutAllocator::allocate(self.in_use.len(), self.surface_count);
                self.stats.rejected_masks = plan.rejected;
                for (&index, slot) in self.in_use.iter().zip(plan.slots) {
                    Self::apply_layout(&mut self.contexts[index], slot, &self.config);
                }
                self.draw_mask_pass(model, drawer);
            }
            MaskingMode::HighPrecision => {
                for &index in &self.in_use {
                    let slot = Some(LayoutAllocator::full_surface());
                    Self::apply_layout(&mut self.contexts[index], slot, &self.config);
                }
            }
        }

        log::trace!(
            "clipping frame: {} in use, {} rejected, {} mask draws",
            self.stats.contexts_in_use,
            self.stats.rejected_masks,
            self.stats.mask_draw_calls
        );
        self.stats
    }

    fn apply_layout(context: &mut MaskContext, slot: Option<LayoutSlot>, config: &ClippingConfig) {
        let transforms = slot.map_or_else(MaskTransforms::default, |s| {
            build_mask_transforms(&context.all_clipped_draw_rect(), &s.bounds, config.clip_space)
        });
        context.set_layout(slot, transforms);
    }

    fn draw_mask_pass<M, D>(&mut self, model: &M, drawer: &mut D)
    where
        M: DrawableSource,
        D: MaskDrawer<F::Surface>,
    {
        self.pool.begin_frame();

        for &index in &self.in_use {
            let context = &self.contexts[index];
            let Some(slot) = context.layout() else {
                continue;
            };

            let Some(surface) = self.pool.bind(slot.surface_index) else {
                log::warn!(
                    "mask context {}: {}",
                    index,
                    DrawError::SurfaceUnavailable(slot.surface_index)
                );
                self.stats.skipped_draws += context.mask_ids().len();
                continue;
            };

            draw_context_masks(surface, model, context, drawer, &mut self.stats);
        }

        self.pool.end_current();
    }

    /// Render the mask of `drawable` over a whole surface. High-precision mode only.
    pub fn draw_masks_for_drawable<M, D>(&mut self, model: &M, drawable: usize, drawer: &mut D)
    where
        M: DrawableSource,
        D: MaskDrawer<F::Surface>,
    {
        if self.config.mode != MaskingMode::HighPrecision {
            return;
        }
        let Some(index) = self.drawable_contexts.get(drawable).copied().flatten() else {
            return;
        };
        let context = &self.contexts[index];
        if !context.is_renderable() {
            return;
        }

        let Some(surface) = self.pool.bind_exclusive(0) else {
            log::warn!("mask context {}: {}", index, DrawError::SurfaceUnavailable(0));
            self.stats.skipped_draws += context.mask_ids().len();
            return;
        };

        draw_context_masks(surface, model, context, drawer, &mut self.stats);
        self.pool.end_current();
    }

    /// Draw every visible drawable in render order, binding masks where needed.
    ///
    /// Call after [`ClippingManager::setup_clipping_context`] for the same frame.
    /// The returned stats include that call's counts.
    pub fn draw_model<M, R>(&mut self, model: &M, renderer: &mut R) -> FrameStats
    where
        M: DrawableSource,
        R: ModelDrawer<F::Surface>,
    {
        if !self.frame_prepared {
            self.stats = FrameStats::default();
        }
        self.frame_prepared = false;

        let mut order: Vec<usize> = (0..model.drawable_count()).collect();
        order.sort_by_key(|&i| (model.render_order(i), i));

        for index in order {
            if !model.is_visible(index) {
                continue;
            }

            let context_index = self.drawable_contexts.get(index).copied().flatten();
            let Some(context_index) = context_index else {
                let result = renderer.draw_drawable(model, index, None);
                record_model_draw(&mut self.stats, index, result);
                continue;
            };

            if !self.contexts[context_index].is_renderable() {
                continue;
            }

            if self.config.mode == MaskingMode::HighPrecision {
                renderer.flush();
                self.draw_masks_for_drawable(model, index, renderer);
            }

            let context = &self.contexts[context_index];
            let Some(slot) = context.layout() else {
                continue;
            };
            let Some(surface) = self.pool.get(slot.surface_index) else {
                log::warn!(
                    "drawable {}: {}",
                    index,
                    DrawError::SurfaceUnavailable(slot.surface_index)
                );
                self.stats.skipped_draws += 1;
                continue;
            };

            let binding = MaskBinding {
                surface,
                matrix: context.matrix_for_draw(),
                channel_color: channel_color(slot.channel).unwrap_or(CHANNEL_COLORS[0]),
                inverted: model.is_inverted_mask(index),
            };
            let result = renderer.draw_drawable(model, index, Some(binding));
            record_model_draw(&mut self.stats, index, result);
        }

        renderer.flush();
        self.stats
    }

    /// The context clipping `drawable`, if any.
    pub fn context_for_drawable(&self, drawable: usize) -> Option<&MaskContext> {
        self.drawable_contexts
            .get(drawable)
            .copied()
            .flatten()
            .map(|i| &self.contexts[i])
    }

    /// Color selector for `channel` (R, G, B, A). Out-of-range channels fall back to R.
    pub fn channel_color_mask(&self, channel: usize) -> Color {
        channel_color(channel).unwrap_or_else(|| {
            log::warn!("mask channel {} out of range", channel);
            CHANNEL_COLORS[0]
        })
    }

    /// Change the mask surface size.
    ///
    /// Recreates every surface and drops all per-frame layout state.
    pub fn set_atlas_size(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            log::warn!("ignoring mask atlas size {}x{}", width, height);
            return;
        }
        if self.config.atlas_size == (width, height) {
            return;
        }

        self.config.atlas_size = (width, height);
        for context in &mut self.contexts {
            context.reset_frame_state();
        }
        self.pool.resize(width, height);
        log::debug!("mask atlas resized to {}x{}", width, height);
    }

    /// Number of mask surfaces that currently exist.
    ///
    /// Zero for a model without masks. Can be below the requested count when
    /// the backend failed to create some of them.
    pub fn physical_surface_count(&self) -> usize {
        self.pool.len()
    }

    pub fn surface(&self, index: usize) -> Option<&F::Surface> {
        self.pool.get(index)
    }

    pub fn contexts(&self) -> &[MaskContext] {
        &self.contexts
    }

    pub fn config(&self) -> &ClippingConfig {
        &self.config
    }

    pub fn atlas_size(&self) -> (u32, u32) {
        self.config.atlas_size
    }

    /// True when the model has no masks and every pass is skipped.
    pub fn is_idle(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn last_frame_stats(&self) -> FrameStats {
        self.stats
    }
}

impl<F: SurfaceFactory> std::fmt::Debug for ClippingManager<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClippingManager")
            .field("config", &self.config)
            .field("contexts", &self.contexts.len())
            .field("pool", &self.pool)
            .finish()
    }
}

fn draw_context_masks<S, M, D>(
    surface: &mut S,
    model: &M,
    context: &MaskContext,
    drawer: &mut D,
    stats: &mut FrameStats,
) where
    S: MaskSurface,
    M: DrawableSource,
    D: MaskDrawer<S>,
{
    for &mask in context.mask_ids() {
        if model.vertex_positions(mask).is_empty() {
            continue;
        }
        match drawer.draw_mask(surface, model, mask, context) {
            Ok(()) => stats.mask_draw_calls += 1,
            Err(err) => {
                log::warn!("skipping mask drawable {}: {}", mask, err);
                stats.skipped_draws += 1;
            }
        }
    }
}

fn record_model_draw(stats: &mut FrameStats, drawable: usize, result: Result<(), DrawError>) {
    match result {
        Ok(()) => stats.model_draw_calls += 1,
        Err(err) => {
            log::warn!("skipping drawable {}: {}", drawable, err);
            stats.skipped_draws += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Drawable, Model};
    use crate::rect::Rect;
    use crate::test_support::{OpLog, RecordingDrawer, RecordingFactory, SurfaceOp};
    use crate::transform::ClipSpace;
    use glam::Vec2;

    type TestManager = ClippingManager<RecordingFactory>;

    fn quad_at(x: f32) -> Drawable {
        Drawable::quad(Vec2::new(x, 0.0), Vec2::new(x + 1.0, 1.0))
    }

    /// `n` mask drawables followed by `n` drawables each clipped by its own mask.
    fn independent_masks(n: usize) -> Model {
        let mut model = Model::new();
        for i in 0..n {
            model.push(quad_at(i as f32 * 2.0));
        }
        for i in 0..n {
            model.push(quad_at(i as f32 * 2.0).with_masks(vec![i]).with_render_order(1));
        }
        model
    }

    fn manager(config: ClippingConfig) -> (TestManager, OpLog) {
        let log = OpLog::default();
        let factory = RecordingFactory::with_log(log.clone());
        (ClippingManager::new(factory, config), log)
    }

    #[test]
    fn test_set_equal_masks_share_one_context() {
        let mut model = Model::new();
        for i in 0..3 {
            model.push(quad_at(i as f32));
        }
        model.push(quad_at(0.0).with_masks(vec![0, 1]));
        model.push(quad_at(1.0).with_masks(vec![1, 0]));
        model.push(quad_at(2.0).with_masks(vec![2]));
        model.push(quad_at(3.0).with_masks(vec![1, 0, 1]));

        let (mut manager, _) = manager(ClippingConfig::default());
        manager.initialize(&model, 1);

        assert_eq!(manager.contexts().len(), 2);
        assert_eq!(manager.contexts()[0].clipped_drawable_index_list(), &[3, 4, 6]);
        assert_eq!(manager.contexts()[1].clipped_drawable_index_list(), &[5]);
        assert!(std::ptr::eq(
            manager.context_for_drawable(3).unwrap(),
            manager.context_for_drawable(4).unwrap()
        ));
        assert!(manager.context_for_drawable(0).is_none());
    }

    #[test]
    fn test_model_without_masks_is_idle() {
        let model = Model::with_drawables(vec![quad_at(0.0), quad_at(1.0)]);
        let (mut manager, log) = manager(ClippingConfig::default());
        manager.initialize(&model, 2);
        let mut drawer = RecordingDrawer::new(log.clone());

        let stats = manager.setup_clipping_context(&model, &mut drawer);

        assert!(manager.is_idle());
        assert_eq!(stats, FrameStats::default());
        assert!(log.ops().is_empty());
        assert_eq!(manager.physical_surface_count(), 0);
        assert!(manager.surface(0).is_none());
    }

    #[test]
    fn test_surface_count_reports_created_surfaces() {
        let model = independent_masks(1);
        let factory = RecordingFactory::failing_after(1);
        let mut manager = ClippingManager::new(factory, ClippingConfig::default());
        manager.initialize(&model, 3);

        assert_eq!(manager.physical_surface_count(), 1);
        assert!(manager.surface(1).is_none());
    }

    #[test]
    fn test_surface_count_is_clamped() {
        let model = independent_masks(1);
        let (mut manager, log) = manager(ClippingConfig::default());
        manager.initialize(&model, 0);

        assert_eq!(manager.physical_surface_count(), 1);
        assert_eq!(log.ops(), vec![SurfaceOp::Create(0, 256, 256)]);
    }

    #[test]
    fn test_out_of_range_mask_ids_are_dropped() {
        let mut model = independent_masks(1);
        model.push(quad_at(5.0).with_masks(vec![0, 99]));
        model.push(quad_at(6.0).with_masks(vec![42]));

        let (mut manager, _) = manager(ClippingConfig::default());
        manager.initialize(&model, 1);

        assert_eq!(manager.contexts().len(), 1);
        assert_eq!(manager.contexts()[0].clipped_drawable_index_list(), &[1, 2]);
        assert!(manager.context_for_drawable(3).is_none());
    }

    #[test]
    fn test_five_masks_fill_channels_two_one_one_one() {
        let model = independent_masks(5);
        let (mut manager, log) = manager(ClippingConfig::default());
        manager.initialize(&model, 1);
        let mut drawer = RecordingDrawer::new(log.clone());

        let stats = manager.setup_clipping_context(&model, &mut drawer);
        assert_eq!(stats.contexts_in_use, 5);
        assert_eq!(stats.mask_draw_calls, 5);

        let channels: Vec<_> = manager
            .contexts()
            .iter()
            .map(|c| c.layout_channel_index().unwrap())
            .collect();
        assert_eq!(channels, vec![0, 0, 1, 2, 3]);

        let halves = [
            Rect::from_min_size(Vec2::ZERO, Vec2::new(0.5, 1.0)),
            Rect::from_min_size(Vec2::new(0.5, 0.0), Vec2::new(0.5, 1.0)),
        ];
        assert_eq!(manager.contexts()[0].layout_bounds(), Some(halves[0]));
        assert_eq!(manager.contexts()[1].layout_bounds(), Some(halves[1]));
        assert_eq!(manager.contexts()[2].layout_bounds(), Some(Rect::unit()));
    }

    #[test]
    fn test_surface_cleared_once_per_frame() {
        let model = independent_masks(6);
        let (mut manager, log) = manager(ClippingConfig::default());
        manager.initialize(&model, 1);
        let mut drawer = RecordingDrawer::new(log.clone());

        for _ in 0..2 {
            log.take();
            manager.setup_clipping_context(&model, &mut drawer);
            let ops = log.ops();

            let clears = ops
                .iter()
                .filter(|op| matches!(op, SurfaceOp::Clear(..)))
                .count();
            assert_eq!(clears, 1);
            assert_eq!(ops.first(), Some(&SurfaceOp::Begin(0, None)));
            assert_eq!(ops.last(), Some(&SurfaceOp::End(0)));
        }
    }

    #[test]
    fn test_masks_switch_surfaces_in_order() {
        let model = independent_masks(5);
        let (mut manager, log) = manager(ClippingConfig::default());
        manager.initialize(&model, 2);
        let mut drawer = RecordingDrawer::new(log.clone());
        log.take();

        manager.setup_clipping_context(&model, &mut drawer);
        let ops = log.ops();

        let buffers: Vec<_> = manager
            .contexts()
            .iter()
            .map(|c| c.buffer_index().unwrap())
            .collect();
        assert_eq!(buffers, vec![0, 0, 0, 1, 1]);

        let begins = ops
            .iter()
            .filter(|op| matches!(op, SurfaceOp::Begin(..)))
            .count();
        assert_eq!(begins, 2);

        let end0 = ops.iter().position(|op| *op == SurfaceOp::End(0)).unwrap();
        let begin1 = ops
            .iter()
            .position(|op| *op == SurfaceOp::Begin(1, None))
            .unwrap();
        assert!(end0 < begin1);
        assert_eq!(
            ops.iter()
                .filter(|op| matches!(op, SurfaceOp::MaskDraw { surface: 1, .. }))
                .count(),
            2
        );
    }

    #[test]
    fn test_in_use_count_bounded_by_drawables_with_vertices() {
        let mut model = independent_masks(4);
        model.set_positions(5, Vec::new());
        model.set_positions(7, vec![Vec2::new(1.0, 1.0)]);

        let (mut manager, log) = manager(ClippingConfig::default());
        manager.initialize(&model, 1);
        let mut drawer = RecordingDrawer::new(log);
        manager.setup_clipping_context(&model, &mut drawer);

        let in_use = manager.contexts().iter().filter(|c| c.is_using()).count();
        let with_vertices = manager
            .contexts()
            .iter()
            .filter(|c| {
                c.clipped_drawable_index_list()
                    .iter()
                    .any(|&d| !model.vertex_positions(d).is_empty())
            })
            .count();
        assert!(in_use <= with_vertices);
        assert_eq!(in_use, 3);

        // A single-vertex mask target still gets usable transforms.
        let point = &manager.contexts()[3];
        assert!(point.is_using());
        assert!(point.matrix_for_draw().is_finite());
    }

    #[test]
    fn test_fading_out_frees_the_slot() {
        let mut model = independent_masks(1);
        let (mut manager, log) = manager(ClippingConfig::default());
        manager.initialize(&model, 1);
        let mut drawer = RecordingDrawer::new(log.clone());

        let first = manager.setup_clipping_context(&model, &mut drawer);
        assert!(manager.contexts()[0].is_using());
        assert_eq!(first.mask_draw_calls, 1);

        model.set_opacity(1, 0.0);
        log.take();
        let second = manager.setup_clipping_context(&model, &mut drawer);

        let context = &manager.contexts()[0];
        assert!(!context.is_using());
        assert!(context.layout().is_none());
        assert_eq!(
            context.all_clipped_draw_rect(),
            Rect::new(Vec2::ZERO, Vec2::ZERO)
        );
        assert_eq!(second.contexts_in_use, 0);
        assert_eq!(second.mask_draw_calls, 0);
        assert!(log.ops().is_empty());
    }

    #[test]
    fn test_unbound_mask_texture_skips_one_draw() {
        let mut model = Model::new();
        model.push(quad_at(0.0).with_texture(0));
        model.push(quad_at(1.0).with_texture(1));
        model.push(quad_at(0.0).with_masks(vec![0, 1]));

        let (mut manager, log) = manager(ClippingConfig::default());
        manager.initialize(&model, 1);
        let mut drawer = RecordingDrawer::new(log.clone());
        drawer.unbound_textures.push(1);

        let stats = manager.setup_clipping_context(&model, &mut drawer);
        assert_eq!(stats.mask_draw_calls, 1);
        assert_eq!(stats.skipped_draws, 1);
        assert!(log.ops().contains(&SurfaceOp::MaskDraw {
            surface: 0,
            drawable: 0,
            channel: 0
        }));
    }

    #[test]
    fn test_unbound_clipped_texture_skips_only_its_draw() {
        let mut model = Model::new();
        model.push(quad_at(0.0));
        model.push(quad_at(0.0).with_masks(vec![0]).with_texture(3).with_render_order(1));
        model.push(quad_at(2.0).with_render_order(2));

        let (mut manager, log) = manager(ClippingConfig::default());
        manager.initialize(&model, 1);
        let mut drawer = RecordingDrawer::new(log.clone());
        drawer.unbound_textures.push(3);

        manager.setup_clipping_context(&model, &mut drawer);
        log.take();
        let stats = manager.draw_model(&model, &mut drawer);

        assert_eq!(
            stats,
            FrameStats {
                contexts_in_use: 1,
                rejected_masks: 0,
                mask_draw_calls: 1,
                model_draw_calls: 2,
                skipped_draws: 1,
            }
        );
        let drawn: Vec<_> = log
            .ops()
            .iter()
            .filter_map(|op| match op {
                SurfaceOp::ModelDraw { drawable, .. } => Some(*drawable),
                _ => None,
            })
            .collect();
        assert_eq!(drawn, vec![0, 2]);
    }

    #[test]
    fn test_mask_drawable_without_vertices_is_skipped() {
        let mut model = Model::new();
        model.push(quad_at(0.0));
        model.push(quad_at(1.0));
        model.push(quad_at(0.0).with_masks(vec![0, 1]));
        model.set_positions(1, Vec::new());

        let (mut manager, log) = manager(ClippingConfig::default());
        manager.initialize(&model, 1);
        let mut drawer = RecordingDrawer::new(log.clone());

        let stats = manager.setup_clipping_context(&model, &mut drawer);
        assert!(manager.contexts()[0].is_renderable());
        assert_eq!(stats.mask_draw_calls, 1);
        assert_eq!(stats.skipped_draws, 0);
        assert!(!log
            .ops()
            .iter()
            .any(|op| matches!(op, SurfaceOp::MaskDraw { drawable: 1, .. })));
    }

    #[test]
    fn test_draw_model_without_setup_starts_fresh_stats() {
        let model = independent_masks(1);
        let (mut manager, log) = manager(ClippingConfig::default());
        manager.initialize(&model, 1);
        let mut drawer = RecordingDrawer::new(log);

        manager.setup_clipping_context(&model, &mut drawer);
        let first = manager.draw_model(&model, &mut drawer);
        assert_eq!(first.mask_draw_calls, 1);
        assert_eq!(first.model_draw_calls, 2);

        let second = manager.draw_model(&model, &mut drawer);
        assert_eq!(second.mask_draw_calls, 0);
        assert_eq!(second.model_draw_calls, 2);
    }

    #[test]
    fn test_overflowing_channel_renders_nothing() {
        let model = independent_masks(37);
        let (mut manager, log) = manager(ClippingConfig::default());
        manager.initialize(&model, 1);
        let mut drawer = RecordingDrawer::new(log.clone());

        let stats = manager.setup_clipping_context(&model, &mut drawer);
        assert_eq!(stats.rejected_masks, 1);
        assert_eq!(stats.mask_draw_calls, 36);

        let rejected = &manager.contexts()[9];
        assert!(rejected.is_using());
        assert!(!rejected.is_renderable());

        log.take();
        manager.draw_model(&model, &mut drawer);
        let ops = log.ops();
        // Drawable 37 + 9 is clipped by the rejected mask.
        assert!(!ops
            .iter()
            .any(|op| matches!(op, SurfaceOp::ModelDraw { drawable: 46, .. })));
        assert!(ops
            .iter()
            .any(|op| matches!(op, SurfaceOp::ModelDraw { drawable: 45, .. })));
    }

    #[test]
    fn test_draw_model_binds_masks_in_render_order() {
        let mut model = independent_masks(2);
        model.drawable_mut(0).unwrap().render_order = 5;
        model.drawable_mut(3).unwrap().render_order = -1;

        let (mut manager, log) = manager(ClippingConfig::default());
        manager.initialize(&model, 1);
        let mut drawer = RecordingDrawer::new(log.clone());
        manager.setup_clipping_context(&model, &mut drawer);
        log.take();

        let stats = manager.draw_model(&model, &mut drawer);
        assert_eq!(stats.model_draw_calls, 4);
        assert_eq!(
            log.ops(),
            vec![
                SurfaceOp::ModelDraw {
                    drawable: 3,
                    mask: Some((0, 1))
                },
                SurfaceOp::ModelDraw {
                    drawable: 1,
                    mask: None
                },
                SurfaceOp::ModelDraw {
                    drawable: 2,
                    mask: Some((0, 0))
                },
                SurfaceOp::ModelDraw {
                    drawable: 0,
                    mask: None
                },
                SurfaceOp::Flush,
            ]
        );
    }

    #[test]
    fn test_high_precision_draws_mask_before_each_clipped_drawable() {
        let mut model = independent_masks(1);
        model.push(quad_at(0.5).with_masks(vec![0]).with_render_order(2));

        let config = ClippingConfig::default().with_mode(MaskingMode::HighPrecision);
        let (mut manager, log) = manager(config);
        manager.initialize(&model, 3);
        let mut drawer = RecordingDrawer::new(log.clone());

        let stats = manager.setup_clipping_context(&model, &mut drawer);
        assert_eq!(stats.mask_draw_calls, 0);
        assert_eq!(
            manager.contexts()[0].layout(),
            Some(LayoutAllocator::full_surface())
        );
        log.take();

        manager.draw_model(&model, &mut drawer);
        let white = Some(crate::color::MASK_CLEAR_COLOR);
        let mask_pass = [
            SurfaceOp::Flush,
            SurfaceOp::Begin(0, white),
            SurfaceOp::MaskDraw {
                surface: 0,
                drawable: 0,
                channel: 0,
            },
            SurfaceOp::End(0),
        ];
        let mut expected = vec![SurfaceOp::ModelDraw {
            drawable: 0,
            mask: None,
        }];
        expected.extend(mask_pass.iter().cloned());
        expected.push(SurfaceOp::ModelDraw {
            drawable: 1,
            mask: Some((0, 0)),
        });
        expected.extend(mask_pass.iter().cloned());
        expected.push(SurfaceOp::ModelDraw {
            drawable: 2,
            mask: Some((0, 0)),
        });
        expected.push(SurfaceOp::Flush);

        assert_eq!(log.ops(), expected);
    }

    #[test]
    fn test_context_transform_maps_bounds_center_to_slot_center() {
        let model = independent_masks(3);
        let config = ClippingConfig::default().with_clip_space(ClipSpace::YDown);
        let (mut manager, log) = manager(config);
        manager.initialize(&model, 1);
        let mut drawer = RecordingDrawer::new(log);
        manager.setup_clipping_context(&model, &mut drawer);

        for context in manager.contexts() {
            let center = context.all_clipped_draw_rect().center();
            let slot = context.layout_bounds().unwrap();
            let read = context
                .matrix_for_draw()
                .transform_point3(center.extend(0.0))
                .truncate();
            assert!((read - slot.center()).length() < 1e-4);
        }
    }

    #[test]
    fn test_set_atlas_size_recreates_surfaces() {
        let model = independent_masks(2);
        let (mut manager, log) = manager(ClippingConfig::default());
        manager.initialize(&model, 2);
        let mut drawer = RecordingDrawer::new(log.clone());
        manager.setup_clipping_context(&model, &mut drawer);
        log.take();

        manager.set_atlas_size(512, 128);

        assert_eq!(manager.atlas_size(), (512, 128));
        assert_eq!(
            log.ops(),
            vec![SurfaceOp::Create(2, 512, 128), SurfaceOp::Create(3, 512, 128)]
        );
        assert!(manager.contexts().iter().all(|c| c.layout().is_none()));
        assert_eq!(manager.surface(1).map(|s| s.size()), Some((512, 128)));

        log.take();
        manager.set_atlas_size(512, 128);
        assert!(log.ops().is_empty());
    }

    #[test]
    fn test_channel_color_mask_falls_back_to_red() {
        let (manager, _) = manager(ClippingConfig::default());
        assert_eq!(manager.channel_color_mask(2), Color::new(0.0, 0.0, 1.0, 0.0));
        assert_eq!(manager.channel_color_mask(9), CHANNEL_COLORS[0]);
    }
}
