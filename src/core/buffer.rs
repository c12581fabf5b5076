//! GPU buffer abstractions
//!
//! Provides typed wrappers for vertex, index, and per-draw uniform buffers.

use crate::context::WgpuContext;
use bytemuck::{Pod, Zeroable};
use std::marker::PhantomData;

/// A GPU buffer containing vertex data.
pub struct VertexBuffer {
    pub(crate) buffer: wgpu::Buffer,
    pub(crate) count: u32,
}

impl VertexBuffer {
    /// Create a new vertex buffer from a slice of vertices.
    pub fn new<V: Pod + Zeroable>(ctx: &WgpuContext, vertices: &[V], label: Option<&str>) -> Self {
        use wgpu::util::DeviceExt;
        let buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label,
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        Self {
            buffer,
            count: vertices.len() as u32,
        }
    }

    /// Get the number of vertices.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Create a buffer slice for the entire buffer.
    pub fn slice(&self) -> wgpu::BufferSlice<'_> {
        self.buffer.slice(..)
    }
}

/// A GPU buffer containing 32-bit index data.
pub struct IndexBuffer {
    pub(crate) buffer: wgpu::Buffer,
    pub(crate) count: u32,
}

impl IndexBuffer {
    /// Create a new index buffer from u32 indices.
    pub fn new(ctx: &WgpuContext, indices: &[u32], label: Option<&str>) -> Self {
        use wgpu::util::DeviceExt;
        let buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label,
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        Self {
            buffer,
            count: indices.len() as u32,
        }
    }

    /// Get the number of indices.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Create a buffer slice for the entire buffer.
    pub fn slice(&self) -> wgpu::BufferSlice<'_> {
        self.buffer.slice(..)
    }
}

/// Uniform buffer holding one `T` per draw, addressed with dynamic offsets.
///
/// Writing every draw's data up front and selecting it with a dynamic offset
/// keeps each draw in a render pass from observing the last `write_buffer`
/// issued before submission.
pub struct DynamicUniformBuffer<T> {
    buffer: wgpu::Buffer,
    stride: u64,
    capacity: usize,
    label: String,
    _marker: PhantomData<T>,
}

impl<T: Pod + Zeroable> DynamicUniformBuffer<T> {
    /// Create a buffer with room for `capacity` elements.
    pub fn new(ctx: &WgpuContext, capacity: usize, label: &str) -> Self {
        let stride = aligned_stride(
            std::mem::size_of::<T>() as u64,
            ctx.uniform_offset_alignment() as u64,
        );
        let capacity = capacity.max(1);
        let buffer = Self::create(ctx, stride, capacity, label);

        Self {
            buffer,
            stride,
            capacity,
            label: label.to_string(),
            _marker: PhantomData,
        }
    }

    fn create(ctx: &WgpuContext, stride: u64, capacity: usize, label: &str) -> wgpu::Buffer {
        ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: stride * capacity as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Grow the buffer to hold at least `count` elements.
    ///
    /// Returns `true` when the underlying buffer was replaced, in which case
    /// every bind group referencing it must be recreated.
    pub fn reserve(&mut self, ctx: &WgpuContext, count: usize) -> bool {
        if count <= self.capacity {
            return false;
        }
        let capacity = count.next_power_of_two();
        self.buffer.destroy();
        self.buffer = Self::create(ctx, self.stride, capacity, &self.label);
        self.capacity = capacity;
        true
    }

    /// Upload `items`, element `i` landing at `offset(i)`.
    pub fn write(&self, ctx: &WgpuContext, items: &[T]) {
        debug_assert!(items.len() <= self.capacity, "reserve before writing");
        if items.is_empty() {
            return;
        }
        let size = std::mem::size_of::<T>();
        let mut data = vec![0u8; items.len() * self.stride as usize];
        for (i, item) in items.iter().enumerate() {
            let start = i * self.stride as usize;
            data[start..start + size].copy_from_slice(bytemuck::bytes_of(item));
        }
        ctx.queue.write_buffer(&self.buffer, 0, &data);
    }

    /// Dynamic offset of the `index`-th element.
    pub fn offset(&self, index: usize) -> u32 {
        (index as u64 * self.stride) as u32
    }

    /// Binding covering a single element, to be combined with a dynamic offset.
    pub fn binding(&self) -> wgpu::BindingResource<'_> {
        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer: &self.buffer,
            offset: 0,
            size: Self::element_size(),
        })
    }

    /// Size of one element as a binding size.
    pub fn element_size() -> Option<wgpu::BufferSize> {
        wgpu::BufferSize::new(std::mem::size_of::<T>() as u64)
    }

    /// Number of elements the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Distance in bytes between consecutive elements.
    pub fn stride(&self) -> u64 {
        self.stride
    }
}

/// Round `size` up to the next multiple of `alignment`.
pub fn aligned_stride(size: u64, alignment: u64) -> u64 {
    let alignment = alignment.max(1);
    size.div_ceil(alignment) * alignment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_stride() {
        assert_eq!(aligned_stride(128, 256), 256);
        assert_eq!(aligned_stride(256, 256), 256);
        assert_eq!(aligned_stride(257, 256), 512);
        assert_eq!(aligned_stride(64, 0), 64);
    }
}
