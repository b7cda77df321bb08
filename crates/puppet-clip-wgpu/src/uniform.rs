use std::marker::PhantomData;
use std::num::NonZeroU64;

use glam::Mat4;
use puppet_clip::Color;

use crate::gpu::GpuContext;

/// Uniforms of the mask write pass. Mirrors `MaskUniforms` in `shaders/mask.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaskUniforms {
    /// Model space to mask surface clip space.
    pub clip_matrix: [[f32; 4]; 4],
    /// One-hot channel selector.
    pub channel_flag: [f32; 4],
}

impl MaskUniforms {
    pub fn new(clip_matrix: Mat4, channel: Color) -> Self {
        Self {
            clip_matrix: clip_matrix.to_cols_array_2d(),
            channel_flag: channel.to_array(),
        }
    }
}

/// Uniforms of the model pass. Mirrors `ModelUniforms` in `shaders/model.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelUniforms {
    pub projection: [[f32; 4]; 4],
    /// Model space to mask sampling space. Identity when unmasked.
    pub clip_matrix: [[f32; 4]; 4],
    pub channel_flag: [f32; 4],
    /// Tint; alpha carries the drawable opacity.
    pub base_color: [f32; 4],
    /// x: masked, y: inverted, z: flip sampled v. 0.0 or 1.0 each.
    pub flags: [f32; 4],
}

impl ModelUniforms {
    pub fn unmasked(projection: Mat4, opacity: f32) -> Self {
        Self {
            projection: projection.to_cols_array_2d(),
            clip_matrix: Mat4::IDENTITY.to_cols_array_2d(),
            channel_flag: [0.0; 4],
            base_color: [1.0, 1.0, 1.0, opacity],
            flags: [0.0; 4],
        }
    }

    pub fn masked(
        projection: Mat4,
        opacity: f32,
        clip_matrix: Mat4,
        channel: Color,
        inverted: bool,
        flip_v: bool,
    ) -> Self {
        Self {
            clip_matrix: clip_matrix.to_cols_array_2d(),
            channel_flag: channel.to_array(),
            flags: [1.0, f32::from(u8::from(inverted)), f32::from(u8::from(flip_v)), 0.0],
            ..Self::unmasked(projection, opacity)
        }
    }
}

/// Distance between consecutive uniform blocks in an arena buffer.
fn uniform_stride(size: u64, alignment: u64) -> u64 {
    size.div_ceil(alignment).max(1) * alignment
}

/// One persistent uniform buffer holding a block per draw, bound with a dynamic offset.
///
/// Blocks are handed out in order and recycled at [`UniformArena::reset`].
/// Running out of room replaces the buffer with one twice the size; draws
/// already recorded keep the old buffer alive.
pub(crate) struct UniformArena<T> {
    label: &'static str,
    stride: u64,
    capacity: u64,
    len: u64,
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    _marker: PhantomData<T>,
}

impl<T: bytemuck::Pod> UniformArena<T> {
    pub fn new(
        gpu: &GpuContext,
        layout: &wgpu::BindGroupLayout,
        label: &'static str,
        capacity: u64,
    ) -> Self {
        let stride = uniform_stride(
            std::mem::size_of::<T>() as u64,
            u64::from(gpu.device.limits().min_uniform_buffer_offset_alignment),
        );
        let capacity = capacity.max(1);
        let (buffer, bind_group) = Self::allocate(gpu, layout, label, stride * capacity);
        Self {
            label,
            stride,
            capacity,
            len: 0,
            buffer,
            bind_group,
            _marker: PhantomData,
        }
    }

    fn allocate(
        gpu: &GpuContext,
        layout: &wgpu::BindGroupLayout,
        label: &'static str,
        size: u64,
    ) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(std::mem::size_of::<T>() as u64),
                }),
            }],
        });
        (buffer, bind_group)
    }

    /// Start handing out blocks from the beginning of the buffer again.
    pub fn reset(&mut self) {
        self.len = 0;
    }

    /// Write `uniforms` into the next free block.
    ///
    /// Returns the bind group and the dynamic offset to bind it with.
    pub fn push(
        &mut self,
        gpu: &GpuContext,
        layout: &wgpu::BindGroupLayout,
        uniforms: &T,
    ) -> (wgpu::BindGroup, u32) {
        if self.len == self.capacity {
            self.capacity *= 2;
            let (buffer, bind_group) =
                Self::allocate(gpu, layout, self.label, self.stride * self.capacity);
            self.buffer = buffer;
            self.bind_group = bind_group;
            self.len = 0;
            log::debug!("{} grown to {} blocks", self.label, self.capacity);
        }

        let offset = self.len * self.stride;
        gpu.queue
            .write_buffer(&self.buffer, offset, bytemuck::bytes_of(uniforms));
        self.len += 1;
        (self.bind_group.clone(), offset as u32)
    }
}
