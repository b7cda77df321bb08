//! # puppet-clip-wgpu
//!
//! WGPU backend for puppet-clip: RGBA8 mask surfaces, the mask write pass and
//! the masked model pass.
//!
//! ```ignore
//! let gpu = GpuContext::new(device, queue);
//! let config = ClippingConfig::default().with_clip_space(ClipSpace::YDown);
//! let mut clipping = WgpuClippingManager::new(WgpuSurfaceFactory::new(gpu.clone()), config);
//! let mut renderer = MaskRenderer::new(gpu, target_format, ClipSpace::YDown);
//!
//! clipping.initialize(&model, 2);
//! // per frame
//! renderer.begin_frame(&target_view, Some(Color::transparent()));
//! clipping.setup_clipping_context(&model, &mut renderer);
//! clipping.draw_model(&model, &mut renderer);
//! renderer.end_frame();
//! ```

mod gpu;
mod mesh_cache;
mod renderer;
mod surface;
mod uniform;
mod vertex;

pub use gpu::*;
pub use renderer::*;
pub use surface::*;
pub use uniform::*;
pub use vertex::*;

/// Clipping manager backed by wgpu mask surfaces.
pub type WgpuClippingManager = puppet_clip::ClippingManager<WgpuSurfaceFactory>;
