//! Recording surfaces and drawers for unit tests.

use std::cell::RefCell;
use std::rc::Rc;

use crate::color::Color;
use crate::context::MaskContext;
use crate::error::{DrawError, SurfaceError};
use crate::model::DrawableSource;
use crate::render::{MaskBinding, MaskDrawer, ModelDrawer};
use crate::surface::{MaskSurface, SurfaceFactory};

#[derive(Clone, Debug, PartialEq)]
pub enum SurfaceOp {
    Create(usize, u32, u32),
    Begin(usize, Option<Color>),
    Clear(usize, Color),
    End(usize),
    MaskDraw {
        surface: usize,
        drawable: usize,
        channel: usize,
    },
    ModelDraw {
        drawable: usize,
        mask: Option<(usize, usize)>,
    },
    Flush,
}

/// Shared, ordered record of everything the backend was asked to do.
#[derive(Clone, Debug, Default)]
pub struct OpLog(Rc<RefCell<Vec<SurfaceOp>>>);

impl OpLog {
    pub fn push(&self, op: SurfaceOp) {
        self.0.borrow_mut().push(op);
    }

    pub fn ops(&self) -> Vec<SurfaceOp> {
        self.0.borrow().clone()
    }

    pub fn take(&self) -> Vec<SurfaceOp> {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

pub struct RecordingSurface {
    id: usize,
    size: (u32, u32),
    log: OpLog,
}

impl MaskSurface for RecordingSurface {
    type View = usize;

    fn begin_draw(&mut self, clear: Option<Color>) {
        self.log.push(SurfaceOp::Begin(self.id, clear));
    }

    fn end_draw(&mut self) {
        self.log.push(SurfaceOp::End(self.id));
    }

    fn clear(&mut self, color: Color) {
        self.log.push(SurfaceOp::Clear(self.id, color));
    }

    fn color_view(&self) -> &usize {
        &self.id
    }

    fn size(&self) -> (u32, u32) {
        self.size
    }
}

pub struct RecordingFactory {
    log: OpLog,
    next_id: usize,
    fail_after: Option<usize>,
}

impl RecordingFactory {
    pub fn new() -> Self {
        Self::with_log(OpLog::default())
    }

    pub fn with_log(log: OpLog) -> Self {
        Self {
            log,
            next_id: 0,
            fail_after: None,
        }
    }

    /// Factory whose creations fail once `count` surfaces exist.
    pub fn failing_after(count: usize) -> Self {
        Self {
            fail_after: Some(count),
            ..Self::new()
        }
    }

    pub fn log(&self) -> OpLog {
        self.log.clone()
    }
}

impl SurfaceFactory for RecordingFactory {
    type Surface = RecordingSurface;

    fn create(&mut self, width: u32, height: u32) -> Result<RecordingSurface, SurfaceError> {
        if self.fail_after.is_some_and(|n| self.next_id >= n) {
            return Err(SurfaceError::Backend("out of surfaces".to_string()));
        }
        let id = self.next_id;
        self.next_id += 1;
        self.log.push(SurfaceOp::Create(id, width, height));
        Ok(RecordingSurface {
            id,
            size: (width, height),
            log: self.log.clone(),
        })
    }
}

pub struct RecordingDrawer {
    log: OpLog,
    /// Texture slots treated as not yet uploaded.
    pub unbound_textures: Vec<usize>,
}

impl RecordingDrawer {
    pub fn new(log: OpLog) -> Self {
        Self {
            log,
            unbound_textures: Vec::new(),
        }
    }

    fn check_texture(&self, source: &dyn DrawableSource, drawable: usize) -> Result<(), DrawError> {
        let texture = source.texture_index(drawable);
        if self.unbound_textures.contains(&texture) {
            return Err(DrawError::TextureUnbound { drawable, texture });
        }
        Ok(())
    }
}

impl MaskDrawer<RecordingSurface> for RecordingDrawer {
    fn draw_mask(
        &mut self,
        surface: &mut RecordingSurface,
        source: &dyn DrawableSource,
        drawable: usize,
        context: &MaskContext,
    ) -> Result<(), DrawError> {
        self.check_texture(source, drawable)?;
        self.log.push(SurfaceOp::MaskDraw {
            surface: *surface.color_view(),
            drawable,
            channel: context.layout_channel_index().unwrap_or(usize::MAX),
        });
        Ok(())
    }
}

impl ModelDrawer<RecordingSurface> for RecordingDrawer {
    fn draw_drawable(
        &mut self,
        source: &dyn DrawableSource,
        drawable: usize,
        mask: Option<MaskBinding<'_, RecordingSurface>>,
    ) -> Result<(), DrawError> {
        self.check_texture(source, drawable)?;
        let channel = |c: Color| c.to_array().iter().position(|&v| v == 1.0).unwrap_or(usize::MAX);
        self.log.push(SurfaceOp::ModelDraw {
            drawable,
            mask: mask.map(|m| (*m.surface.color_view(), channel(m.channel_color))),
        });
        Ok(())
    }

    fn flush(&mut self) {
        self.log.push(SurfaceOp::Flush);
    }
}
