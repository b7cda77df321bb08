use glam::Mat4;
use puppet_clip::{
    channel_color, BlendMode, ClipSpace, Color, DrawError, DrawableSource, MaskBinding,
    MaskContext, MaskDrawer, MaskSurface, ModelDrawer, Rect,
};
use wgpu::util::DeviceExt;

use crate::gpu::GpuContext;
use crate::mesh_cache::MeshCache;
use crate::surface::{to_wgpu_color, WgpuMaskSurface, MASK_TEXTURE_FORMAT};
use crate::uniform::{MaskUniforms, ModelUniforms, UniformArena};
use crate::vertex::MeshVertex;

/// Uniform blocks allocated up front per arena.
const INITIAL_UNIFORM_BLOCKS: u64 = 64;

const BLEND_MODES: [BlendMode; 3] = [
    BlendMode::Normal,
    BlendMode::Additive,
    BlendMode::Multiplicative,
];

/// Blend state writing a mask: `dst = dst * (1 - src)` per channel.
pub fn mask_blend_state() -> wgpu::BlendState {
    wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::Zero,
            dst_factor: wgpu::BlendFactor::OneMinusSrc,
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::Zero,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
    }
}

/// Blend state for premultiplied drawable output.
pub fn blend_state(mode: BlendMode) -> wgpu::BlendState {
    let keep_alpha = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::Zero,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    };

    match mode {
        BlendMode::Normal => wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING,
        BlendMode::Additive => wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: keep_alpha,
        },
        BlendMode::Multiplicative => wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::Dst,
                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: keep_alpha,
        },
    }
}

fn pipeline_index(mode: BlendMode, culling: bool) -> usize {
    let blend = match mode {
        BlendMode::Normal => 0,
        BlendMode::Additive => 1,
        BlendMode::Multiplicative => 2,
    };
    blend * 2 + usize::from(culling)
}

/// Pixel scissor rect `(x, y, width, height)` covering the normalized `bounds`.
///
/// `clip_space` decides whether normalized y = 0 is the first or last pixel row.
pub fn scissor_rect(bounds: &Rect, size: (u32, u32), clip_space: ClipSpace) -> (u32, u32, u32, u32) {
    let (w, h) = (size.0 as f32, size.1 as f32);
    let (top, bottom) = match clip_space {
        ClipSpace::YDown => (bounds.min.y, bounds.max.y),
        ClipSpace::YUp => (1.0 - bounds.max.y, 1.0 - bounds.min.y),
    };

    let x0 = (bounds.min.x.clamp(0.0, 1.0) * w).floor() as u32;
    let x1 = (bounds.max.x.clamp(0.0, 1.0) * w).ceil() as u32;
    let y0 = (top.clamp(0.0, 1.0) * h).floor() as u32;
    let y1 = (bottom.clamp(0.0, 1.0) * h).ceil() as u32;

    (
        x0.min(size.0),
        y0.min(size.1),
        x1.saturating_sub(x0).min(size.0),
        y1.saturating_sub(y0).min(size.1),
    )
}

struct MainTarget {
    view: wgpu::TextureView,
    encoder: Option<wgpu::CommandEncoder>,
}

/// WGPU implementation of mask and model draw submission.
///
/// Mask draws go into the encoder of the bound [`WgpuMaskSurface`]. Model
/// draws are recorded into a pending encoder for the main target, submitted
/// by [`ModelDrawer::flush`] so that any mask rewritten afterwards cannot
/// affect draws already recorded.
pub struct MaskRenderer {
    gpu: GpuContext,
    clip_space: ClipSpace,
    projection: Mat4,

    /// Indexed by `culling as usize`.
    mask_pipelines: [wgpu::RenderPipeline; 2],
    /// Indexed by [`pipeline_index`].
    model_pipelines: Vec<wgpu::RenderPipeline>,

    uniform_layout: wgpu::BindGroupLayout,
    mask_uniforms: UniformArena<MaskUniforms>,
    model_uniforms: UniformArena<ModelUniforms>,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    textures: Vec<Option<wgpu::BindGroup>>,
    blank_mask: wgpu::BindGroup,

    meshes: MeshCache,
    target: Option<MainTarget>,
}

impl MaskRenderer {
    /// Create a renderer drawing model content into targets of `target_format`.
    ///
    /// `clip_space` must match the one the clipping manager was configured with.
    /// wgpu itself is [`ClipSpace::YDown`].
    pub fn new(gpu: GpuContext, target_format: wgpu::TextureFormat, clip_space: ClipSpace) -> Self {
        let device = &gpu.device;

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Clip Uniform Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Clip Texture Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Clip Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let mask_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Mask Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/mask.wgsl").into()),
        });
        let model_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Model Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/model.wgsl").into()),
        });

        let mask_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mask Pipeline Layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });
        let model_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Model Pipeline Layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        // Writing through a y-down clip space flips winding.
        let mask_front_face = match clip_space {
            ClipSpace::YUp => wgpu::FrontFace::Ccw,
            ClipSpace::YDown => wgpu::FrontFace::Cw,
        };

        let build = |label: &str,
                     layout: &wgpu::PipelineLayout,
                     shader: &wgpu::ShaderModule,
                     format: wgpu::TextureFormat,
                     blend: wgpu::BlendState,
                     front_face: wgpu::FrontFace,
                     culling: bool| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module: shader,
                    entry_point: Some("vs_main"),
                    buffers: &[MeshVertex::desc()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face,
                    cull_mode: culling.then_some(wgpu::Face::Back),
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        let mask_pipelines = [false, true].map(|culling| {
            build(
                "Mask Pipeline",
                &mask_layout,
                &mask_shader,
                MASK_TEXTURE_FORMAT,
                mask_blend_state(),
                mask_front_face,
                culling,
            )
        });

        let mut model_pipelines = Vec::with_capacity(BLEND_MODES.len() * 2);
        for mode in BLEND_MODES {
            for culling in [false, true] {
                debug_assert_eq!(pipeline_index(mode, culling), model_pipelines.len());
                model_pipelines.push(build(
                    "Model Pipeline",
                    &model_layout,
                    &model_shader,
                    target_format,
                    blend_state(mode),
                    wgpu::FrontFace::Ccw,
                    culling,
                ));
            }
        }

        // Bound for unmasked draws; the shader ignores it.
        let blank_texture = device.create_texture_with_data(
            &gpu.queue,
            &wgpu::TextureDescriptor {
                label: Some("Blank Mask Texture"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: MASK_TEXTURE_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &[255, 255, 255, 255],
        );
        let blank_view = blank_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let blank_mask = texture_bind_group(device, &texture_layout, &blank_view, &sampler);

        log::debug!(
            "mask renderer created: {} model pipelines, target {:?}, {:?}",
            model_pipelines.len(),
            target_format,
            clip_space
        );

        let mask_uniforms =
            UniformArena::new(&gpu, &uniform_layout, "Mask Uniforms", INITIAL_UNIFORM_BLOCKS);
        let model_uniforms =
            UniformArena::new(&gpu, &uniform_layout, "Model Uniforms", INITIAL_UNIFORM_BLOCKS);

        Self {
            gpu,
            clip_space,
            projection: Mat4::IDENTITY,
            mask_pipelines,
            model_pipelines,
            uniform_layout,
            mask_uniforms,
            model_uniforms,
            texture_layout,
            sampler,
            textures: Vec::new(),
            blank_mask,
            meshes: MeshCache::default(),
            target: None,
        }
    }

    /// Model space to main target clip space.
    pub fn set_projection(&mut self, projection: Mat4) {
        self.projection = projection;
    }

    /// Make `view` available to drawables whose texture index is `index`.
    pub fn bind_texture(&mut self, index: usize, view: &wgpu::TextureView) {
        if self.textures.len() <= index {
            self.textures.resize_with(index + 1, || None);
        }
        self.textures[index] = Some(texture_bind_group(
            &self.gpu.device,
            &self.texture_layout,
            view,
            &self.sampler,
        ));
    }

    /// Upload tightly packed RGBA8 pixels and bind them at `index`.
    pub fn upload_texture(
        &mut self,
        index: usize,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<wgpu::Texture, DrawError> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || rgba.len() != expected {
            return Err(DrawError::Backend(format!(
                "texture {} is {}x{} but has {} bytes, expected {}",
                index,
                width,
                height,
                rgba.len(),
                expected
            )));
        }

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = self.gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("Drawable Texture {}", index)),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.bind_texture(index, &view);
        Ok(texture)
    }

    /// Start a frame drawing into `target`, optionally clearing it.
    pub fn begin_frame(&mut self, target: &wgpu::TextureView, clear: Option<Color>) {
        self.flush();
        self.meshes.begin_frame();
        self.mask_uniforms.reset();
        self.model_uniforms.reset();

        let mut encoder = None;
        if let Some(color) = clear {
            let mut e = self.create_encoder();
            {
                let _pass = e.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Model Clear Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: target,
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
            encoder = Some(e);
        }

        self.target = Some(MainTarget {
            view: target.clone(),
            encoder,
        });
    }

    /// Submit pending work and release the target.
    pub fn end_frame(&mut self) {
        self.flush();
        self.target = None;
    }

    /// Vertex uploads since creation.
    pub fn mesh_uploads(&self) -> usize {
        self.meshes.uploads()
    }

    fn create_encoder(&self) -> wgpu::CommandEncoder {
        self.gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Model Encoder"),
            })
    }

    fn texture_for(&self, source: &dyn DrawableSource, drawable: usize) -> Result<&wgpu::BindGroup, DrawError> {
        let texture = source.texture_index(drawable);
        self.textures
            .get(texture)
            .and_then(Option::as_ref)
            .ok_or(DrawError::TextureUnbound { drawable, texture })
    }
}

fn texture_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Clip Texture Bind Group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

impl MaskDrawer<WgpuMaskSurface> for MaskRenderer {
    fn draw_mask(
        &mut self,
        surface: &mut WgpuMaskSurface,
        source: &dyn DrawableSource,
        drawable: usize,
        context: &MaskContext,
    ) -> Result<(), DrawError> {
        let Some(slot) = context.layout() else {
            return Ok(());
        };
        let channel = channel_color(slot.channel).ok_or_else(|| {
            DrawError::Backend(format!("mask channel {} out of range", slot.channel))
        })?;

        let texture = self.texture_for(source, drawable)?.clone();
        let (uniforms, offset) = self.mask_uniforms.push(
            &self.gpu,
            &self.uniform_layout,
            &MaskUniforms::new(context.matrix_for_mask(), channel),
        );
        let pipeline = &self.mask_pipelines[usize::from(source.is_culling(drawable))];
        let mesh = self.meshes.prepare(&self.gpu, source, drawable)?;

        let (x, y, w, h) = scissor_rect(&slot.bounds, surface.size(), self.clip_space);
        if w == 0 || h == 0 {
            return Ok(());
        }

        let Some(mut pass) = surface.begin_pass() else {
            return Err(DrawError::Backend(
                "mask surface is not bound for drawing".to_string(),
            ));
        };
        pass.set_scissor_rect(x, y, w, h);
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &uniforms, &[offset]);
        pass.set_bind_group(1, &texture, &[]);
        pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed(0..mesh.index_count, 0, 0..1);

        Ok(())
    }
}

impl ModelDrawer<WgpuMaskSurface> for MaskRenderer {
    fn draw_drawable(
        &mut self,
        source: &dyn DrawableSource,
        drawable: usize,
        mask: Option<MaskBinding<'_, WgpuMaskSurface>>,
    ) -> Result<(), DrawError> {
        if self.target.is_none() {
            return Err(DrawError::Backend(
                "no render target, call begin_frame first".to_string(),
            ));
        }

        let texture = self.texture_for(source, drawable)?.clone();
        let opacity = source.opacity(drawable);
        let (uniforms, mask_group) = match &mask {
            Some(binding) => (
                ModelUniforms::masked(
                    self.projection,
                    opacity,
                    binding.matrix,
                    binding.channel_color,
                    binding.inverted,
                    self.clip_space == ClipSpace::YUp,
                ),
                texture_bind_group(
                    &self.gpu.device,
                    &self.texture_layout,
                    binding.surface.color_view(),
                    &self.sampler,
                ),
            ),
            None => (
                ModelUniforms::unmasked(self.projection, opacity),
                self.blank_mask.clone(),
            ),
        };
        let (uniforms, offset) = self
            .model_uniforms
            .push(&self.gpu, &self.uniform_layout, &uniforms);

        let pipeline = &self.model_pipelines
            [pipeline_index(source.blend_mode(drawable), source.is_culling(drawable))];
        let mesh = self.meshes.prepare(&self.gpu, source, drawable)?;

        let Some(target) = self.target.as_mut() else {
            return Ok(());
        };
        let encoder = target.encoder.get_or_insert_with(|| {
            self.gpu
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Model Encoder"),
                })
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Model Draw Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.view,
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
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &uniforms, &[offset]);
        pass.set_bind_group(1, &texture, &[]);
        pass.set_bind_group(2, &mask_group, &[]);
        pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed(0..mesh.index_count, 0, 0..1);

        Ok(())
    }

    fn flush(&mut self) {
        if let Some(encoder) = self.target.as_mut().and_then(|t| t.encoder.take()) {
            self.gpu.submit(encoder);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    #[test]
    fn test_pipeline_indices_are_unique() {
        let mut seen = Vec::new();
        for mode in BLEND_MODES {
            for culling in [false, true] {
                let index = pipeline_index(mode, culling);
                assert!(!seen.contains(&index));
                seen.push(index);
            }
        }
        assert_eq!(seen.len(), 6);
        assert!(seen.iter().all(|&i| i < 6));
    }

    #[test]
    fn test_blend_modes() {
        assert_eq!(
            blend_state(BlendMode::Normal),
            wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING
        );

        let additive = blend_state(BlendMode::Additive);
        assert_eq!(additive.color.src_factor, wgpu::BlendFactor::One);
        assert_eq!(additive.color.dst_factor, wgpu::BlendFactor::One);
        assert_eq!(additive.alpha.dst_factor, wgpu::BlendFactor::One);

        let multiply = blend_state(BlendMode::Multiplicative);
        assert_eq!(multiply.color.src_factor, wgpu::BlendFactor::Dst);
        assert_eq!(multiply.alpha.src_factor, wgpu::BlendFactor::Zero);
    }

    #[test]
    fn test_mask_blend_only_darkens() {
        let blend = mask_blend_state();
        assert_eq!(blend.color.src_factor, wgpu::BlendFactor::Zero);
        assert_eq!(blend.color.dst_factor, wgpu::BlendFactor::OneMinusSrc);
        assert_eq!(blend.alpha.dst_factor, wgpu::BlendFactor::OneMinusSrcAlpha);
    }

    #[test]
    fn test_scissor_rect_follows_clip_space() {
        let right_half_top = Rect::new(Vec2::new(0.5, 0.0), Vec2::new(1.0, 0.5));
        assert_eq!(
            scissor_rect(&right_half_top, (256, 128), ClipSpace::YDown),
            (128, 0, 128, 64)
        );
        assert_eq!(
            scissor_rect(&right_half_top, (256, 128), ClipSpace::YUp),
            (128, 64, 128, 64)
        );
    }

    #[test]
    fn test_scissor_rect_covers_thirds() {
        let third = Rect::from_min_size(Vec2::splat(2.0 / 3.0), Vec2::splat(1.0 / 3.0));
        let (x, y, w, h) = scissor_rect(&third, (256, 256), ClipSpace::YDown);
        assert_eq!((x, y), (170, 170));
        assert_eq!(x + w, 256);
        assert_eq!(y + h, 256);
    }
}
