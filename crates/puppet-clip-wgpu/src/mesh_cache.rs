use puppet_clip::{DrawError, DrawableSource};

use crate::gpu::GpuContext;
use crate::vertex::{interleave, MeshVertex};

/// GPU copy of one drawable's mesh.
pub(crate) struct CachedMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
    vertex_count: usize,
    vertex_capacity: usize,
    index_capacity: usize,
    uploaded_frame: u64,
}

/// Per-drawable vertex and index buffers, re-uploaded only when the source changed.
///
/// A drawable used both as a mask and as visible content is uploaded at most
/// once per frame.
#[derive(Default)]
pub(crate) struct MeshCache {
    meshes: Vec<Option<CachedMesh>>,
    frame: u64,
    uploads: usize,
}

/// Round `bytes` up to the copy alignment wgpu requires for buffer writes.
fn aligned_size(bytes: usize) -> u64 {
    let align = wgpu::COPY_BUFFER_ALIGNMENT;
    (bytes as u64).div_ceil(align).max(1) * align
}

/// Indices padded to an even count so the byte length is 4-aligned.
fn padded_indices(indices: &[u16]) -> Vec<u16> {
    let mut padded = indices.to_vec();
    if padded.len() % 2 == 1 {
        padded.push(0);
    }
    padded
}

impl MeshCache {
    pub fn begin_frame(&mut self) {
        self.frame += 1;
    }

    /// Number of vertex uploads since creation.
    pub fn uploads(&self) -> usize {
        self.uploads
    }

    pub fn prepare(
        &mut self,
        gpu: &GpuContext,
        source: &dyn DrawableSource,
        drawable: usize,
    ) -> Result<&CachedMesh, DrawError> {
        let positions = source.vertex_positions(drawable);
        let indices = source.vertex_indices(drawable);
        if positions.is_empty() || indices.is_empty() {
            return Err(DrawError::EmptyMesh(drawable));
        }

        if self.meshes.len() <= drawable {
            self.meshes.resize_with(drawable + 1, || None);
        }

        let frame = self.frame;
        let vertex_bytes = positions.len() * std::mem::size_of::<MeshVertex>();
        let index_bytes = indices.len() * std::mem::size_of::<u16>();

        let needs_vertices = match &self.meshes[drawable] {
            None => true,
            Some(mesh) => {
                mesh.vertex_count != positions.len()
                    || mesh.index_count as usize != indices.len()
                    || (source.vertex_positions_changed(drawable) && mesh.uploaded_frame != frame)
            }
        };
        if !needs_vertices {
            return self.meshes[drawable]
                .as_ref()
                .ok_or(DrawError::EmptyMesh(drawable));
        }

        let grow = match &self.meshes[drawable] {
            None => true,
            Some(mesh) => {
                mesh.vertex_capacity < vertex_bytes || mesh.index_capacity < index_bytes
            }
        };
        if grow {
            let vertex_capacity = vertex_bytes.next_power_of_two();
            let index_capacity = index_bytes.next_power_of_two().max(4);
            self.meshes[drawable] = Some(CachedMesh {
                vertex_buffer: gpu.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Drawable Vertex Buffer"),
                    size: aligned_size(vertex_capacity),
                    usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                }),
                index_buffer: gpu.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Drawable Index Buffer"),
                    size: aligned_size(index_capacity),
                    usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                }),
                index_count: 0,
                vertex_count: 0,
                vertex_capacity,
                index_capacity,
                uploaded_frame: 0,
            });
        }

        let Some(mesh) = self.meshes[drawable].as_mut() else {
            return Err(DrawError::EmptyMesh(drawable));
        };

        let vertices = interleave(positions, source.vertex_uvs(drawable));
        gpu.queue
            .write_buffer(&mesh.vertex_buffer, 0, bytemuck::cast_slice(&vertices));
        if grow || mesh.index_count as usize != indices.len() {
            gpu.queue.write_buffer(
                &mesh.index_buffer,
                0,
                bytemuck::cast_slice(&padded_indices(indices)),
            );
        }

        mesh.vertex_count = positions.len();
        mesh.index_count = indices.len() as u32;
        mesh.uploaded_frame = frame;
        self.uploads += 1;

        Ok(mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_size() {
        assert_eq!(aligned_size(0), 4);
        assert_eq!(aligned_size(6), 8);
        assert_eq!(aligned_size(16), 16);
    }

    #[test]
    fn test_odd_index_count_is_padded() {
        assert_eq!(padded_indices(&[0, 1, 2]), vec![0, 1, 2, 0]);
        assert_eq!(padded_indices(&[0, 1, 2, 0, 2, 3]).len(), 6);
    }
}
