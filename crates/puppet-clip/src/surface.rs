//! Offscreen mask surfaces.
//!
//! Backends provide the surface type; [`SurfacePool`] owns the fixed set of
//! surfaces for one manager and enforces the draw protocol:
//! - at most one surface is being drawn into at a time
//! - each surface is cleared once per frame, right before its first mask

use crate::color::{Color, MASK_CLEAR_COLOR};
use crate::error::SurfaceError;

/// An offscreen render target with four mask channels.
pub trait MaskSurface {
    /// Whatever the backend binds to sample the surface.
    type View;

    /// Start drawing into this surface, optionally clearing it first.
    fn begin_draw(&mut self, clear: Option<Color>);

    /// Finish drawing. Writes must be ordered before any later sampling.
    fn end_draw(&mut self);

    fn clear(&mut self, color: Color);

    fn color_view(&self) -> &Self::View;

    /// Size in pixels (width, height).
    fn size(&self) -> (u32, u32);
}

/// Creates mask surfaces for one backend.
pub trait SurfaceFactory {
    type Surface: MaskSurface;

    fn create(&mut self, width: u32, height: u32) -> Result<Self::Surface, SurfaceError>;
}

/// Fixed pool of physical mask surfaces.
pub struct SurfacePool<F: SurfaceFactory> {
    factory: F,
    surfaces: Vec<F::Surface>,
    cleared: Vec<bool>,
    current: Option<usize>,
    requested: usize,
    size: (u32, u32),
}

impl<F: SurfaceFactory> SurfacePool<F> {
    pub fn new(factory: F, size: (u32, u32)) -> Self {
        Self {
            factory,
            surfaces: Vec::new(),
            cleared: Vec::new(),
            current: None,
            requested: 0,
            size,
        }
    }

    /// (Re)create `count` surfaces at the pool size. Existing surfaces are dropped.
    ///
    /// Creation stops at the first failure; the surfaces created so far stay usable.
    pub fn recreate(&mut self, count: usize) {
        self.end_current();
        self.surfaces.clear();
        self.requested = count;

        let (width, height) = self.size;
        for index in 0..count {
            match self.factory.create(width, height) {
                Ok(surface) => self.surfaces.push(surface),
                Err(err) => {
                    log::error!("mask surface {} of {}: {}", index + 1, count, err);
                    break;
                }
            }
        }
        self.cleared = vec![false; self.surfaces.len()];

        log::debug!(
            "created {}/{} mask surfaces at {}x{}",
            self.surfaces.len(),
            count,
            width,
            height
        );
    }

    /// Change the surface size and recreate every surface.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        self.recreate(self.requested);
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Number of surfaces actually available.
    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    /// Number of surfaces the pool was asked for.
    pub fn requested(&self) -> usize {
        self.requested
    }

    pub fn get(&self, index: usize) -> Option<&F::Surface> {
        self.surfaces.get(index)
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Forget which surfaces were cleared; call at the start of a frame.
    pub fn begin_frame(&mut self) {
        self.cleared.iter_mut().for_each(|c| *c = false);
    }

    /// Make `index` the current surface, ending the previous one if it differs.
    ///
    /// Clears the surface if this is its first use this frame. Returns the
    /// surface, or `None` if it does not exist.
    pub fn bind(&mut self, index: usize) -> Option<&mut F::Surface> {
        if index >= self.surfaces.len() {
            return None;
        }

        if self.current != Some(index) {
            self.end_current();
            self.surfaces[index].begin_draw(None);
            self.current = Some(index);
        }

        if !self.cleared[index] {
            self.surfaces[index].clear(MASK_CLEAR_COLOR);
            self.cleared[index] = true;
        }

        self.surfaces.get_mut(index)
    }

    /// Begin a fresh draw on `index` that always starts from a cleared surface.
    pub fn bind_exclusive(&mut self, index: usize) -> Option<&mut F::Surface> {
        if index >= self.surfaces.len() {
            return None;
        }
        self.end_current();
        self.surfaces[index].begin_draw(Some(MASK_CLEAR_COLOR));
        self.cleared[index] = true;
        self.current = Some(index);
        self.surfaces.get_mut(index)
    }

    /// End the draw on the current surface, if any.
    pub fn end_current(&mut self) {
        if let Some(index) = self.current.take() {
            if let Some(surface) = self.surfaces.get_mut(index) {
                surface.end_draw();
            }
        }
    }
}

impl<F: SurfaceFactory> std::fmt::Debug for SurfacePool<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfacePool")
            .field("surfaces", &self.surfaces.len())
            .field("requested", &self.requested)
            .field("size", &self.size)
            .field("current", &self.current)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingFactory, SurfaceOp};

    #[test]
    fn test_bind_clears_once_per_frame() {
        let factory = RecordingFactory::new();
        let log = factory.log();
        let mut pool = SurfacePool::new(factory, (64, 64));
        pool.recreate(1);

        pool.begin_frame();
        pool.bind(0);
        pool.bind(0);
        pool.end_current();

        assert_eq!(
            log.ops(),
            vec![
                SurfaceOp::Create(0, 64, 64),
                SurfaceOp::Begin(0, None),
                SurfaceOp::Clear(0, MASK_CLEAR_COLOR),
                SurfaceOp::End(0),
            ]
        );
    }

    #[test]
    fn test_switching_surfaces_ends_previous() {
        let factory = RecordingFactory::new();
        let log = factory.log();
        let mut pool = SurfacePool::new(factory, (32, 32));
        pool.recreate(2);
        log.take();

        pool.begin_frame();
        pool.bind(0);
        pool.bind(1);
        assert_eq!(pool.current(), Some(1));
        pool.end_current();

        let ops = log.ops();
        let end0 = ops.iter().position(|op| *op == SurfaceOp::End(0)).unwrap();
        let begin1 = ops
            .iter()
            .position(|op| *op == SurfaceOp::Begin(1, None))
            .unwrap();
        assert!(end0 < begin1);
    }

    #[test]
    fn test_failed_creation_keeps_earlier_surfaces() {
        let factory = RecordingFactory::failing_after(1);
        let mut pool = SurfacePool::new(factory, (16, 16));
        pool.recreate(3);

        assert_eq!(pool.len(), 1);
        assert_eq!(pool.requested(), 3);
        assert!(pool.bind(2).is_none());
    }
}
