use puppet_clip::{Color, MaskSurface, SurfaceError, SurfaceFactory};

use crate::gpu::GpuContext;

/// Format of every mask surface. Four 8-bit channels, one mask plane each.
pub const MASK_TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

pub(crate) fn to_wgpu_color(color: Color) -> wgpu::Color {
    wgpu::Color {
        r: color.r as f64,
        g: color.g as f64,
        b: color.b as f64,
        a: color.a as f64,
    }
}

/// Reject sizes the device cannot allocate.
pub fn validate_surface_size(width: u32, height: u32, limit: u32) -> Result<(), SurfaceError> {
    if width == 0 || height == 0 {
        return Err(SurfaceError::InvalidSize { width, height });
    }
    if width > limit || height > limit {
        return Err(SurfaceError::TooLarge {
            width,
            height,
            limit,
        });
    }
    Ok(())
}

fn encode_clear(encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView, color: Color) {
    let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Mask Clear Pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(to_wgpu_color(color)),
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
}

/// Offscreen RGBA8 render target holding up to four mask planes.
///
/// Draws between `begin_draw` and `end_draw` are recorded into one command
/// encoder, submitted at `end_draw`.
pub struct WgpuMaskSurface {
    gpu: GpuContext,
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: (u32, u32),
    encoder: Option<wgpu::CommandEncoder>,
}

impl WgpuMaskSurface {
    /// Open a render pass that keeps the current contents.
    ///
    /// `None` when the surface is not being drawn into.
    pub(crate) fn begin_pass(&mut self) -> Option<wgpu::RenderPass<'_>> {
        let encoder = self.encoder.as_mut()?;
        Some(encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Mask Draw Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        }))
    }
}

impl MaskSurface for WgpuMaskSurface {
    type View = wgpu::TextureView;

    fn begin_draw(&mut self, clear: Option<Color>) {
        if self.encoder.is_some() {
            log::warn!("mask surface begin_draw without end_draw, submitting previous draws");
            self.end_draw();
        }

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Mask Surface Encoder"),
            });
        if let Some(color) = clear {
            encode_clear(&mut encoder, &self.view, color);
        }
        self.encoder = Some(encoder);
    }

    fn end_draw(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.gpu.submit(encoder);
        }
    }

    fn clear(&mut self, color: Color) {
        match self.encoder.as_mut() {
            Some(encoder) => encode_clear(encoder, &self.view, color),
            None => {
                let mut encoder =
                    self.gpu
                        .device
                        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                            label: Some("Mask Clear Encoder"),
                        });
                encode_clear(&mut encoder, &self.view, color);
                self.gpu.submit(encoder);
            }
        }
    }

    fn color_view(&self) -> &wgpu::TextureView {
        &self.view
    }

    fn size(&self) -> (u32, u32) {
        self.size
    }
}

impl Drop for WgpuMaskSurface {
    fn drop(&mut self) {
        self.end_draw();
    }
}

/// Creates [`WgpuMaskSurface`]s on one device.
pub struct WgpuSurfaceFactory {
    gpu: GpuContext,
    created: usize,
}

impl WgpuSurfaceFactory {
    pub fn new(gpu: GpuContext) -> Self {
        Self { gpu, created: 0 }
    }
}

impl SurfaceFactory for WgpuSurfaceFactory {
    type Surface = WgpuMaskSurface;

    fn create(&mut self, width: u32, height: u32) -> Result<WgpuMaskSurface, SurfaceError> {
        validate_surface_size(width, height, self.gpu.max_texture_dimension())?;

        let texture = self.gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("Mask Surface {}", self.created)),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: MASK_TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.created += 1;

        Ok(WgpuMaskSurface {
            gpu: self.gpu.clone(),
            _texture: texture,
            view,
            size: (width, height),
            encoder: None,
        })
    }
}
