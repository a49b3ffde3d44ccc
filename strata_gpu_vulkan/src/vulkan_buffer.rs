/// Buffer - Vulkan implementation of the strata Buffer trait

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::any::Any;
use std::sync::{Arc, PoisonError};
use strata_gpu::strata::gpu::Buffer;
use strata_gpu::strata::{Error, Result};
use strata_gpu::{engine_err, engine_error};

use crate::vulkan_context::GpuContext;

const LOG_SOURCE: &str = "strata::vulkan::buffer";

/// What a buffer is bound as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
    /// Source of a buffer-to-image copy
    Staging,
}

impl BufferUsage {
    fn to_vk(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            BufferUsage::Index => vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }
}

/// Vulkan buffer implementation
///
/// Device-local buffers can be bound for drawing. Host-visible buffers are
/// mapped for their whole lifetime and serve as copy sources only.
pub struct VulkanBuffer {
    /// Shared GPU context (device, allocator)
    ctx: Arc<GpuContext>,
    /// Vulkan buffer
    pub(crate) buffer: vk::Buffer,
    /// GPU memory allocation
    allocation: Option<Allocation>,
    size: u64,
    usage: BufferUsage,
    cpu_backed: bool,
}

impl VulkanBuffer {
    /// Create a buffer
    ///
    /// # Arguments
    ///
    /// * `ctx` - Shared GPU context
    /// * `size` - Size in bytes
    /// * `usage` - Binding the buffer is created for
    /// * `cpu_backed` - Allocate host-visible, persistently mapped memory
    pub fn new(ctx: Arc<GpuContext>, size: u64, usage: BufferUsage, cpu_backed: bool) -> Result<Self> {
        unsafe {
            let buffer_info = vk::BufferCreateInfo::default()
                .size(size)
                .usage(usage.to_vk())
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let buffer = ctx.device.create_buffer(&buffer_info, None)
                .map_err(|e| engine_err!(LOG_SOURCE, "Failed to create buffer: {:?}", e))?;

            let requirements = ctx.device.get_buffer_memory_requirements(buffer);
            let location = if cpu_backed { MemoryLocation::CpuToGpu } else { MemoryLocation::GpuOnly };
            let allocation = ctx.allocator
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .allocate(&AllocationCreateDesc {
                    name: "buffer",
                    requirements,
                    location,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                });
            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(_) => {
                    engine_error!(LOG_SOURCE, "Out of GPU memory for buffer ({} bytes)", size);
                    ctx.device.destroy_buffer(buffer, None);
                    return Err(Error::OutOfMemory);
                }
            };

            if let Err(e) = ctx.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) {
                if let Ok(mut allocator) = ctx.allocator.lock() {
                    allocator.free(allocation).ok();
                }
                ctx.device.destroy_buffer(buffer, None);
                return Err(engine_err!(LOG_SOURCE, "Failed to bind buffer memory: {:?}", e));
            }

            Ok(Self {
                ctx,
                buffer,
                allocation: Some(allocation),
                size,
                usage,
                cpu_backed,
            })
        }
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// Write `data` at `offset` through the persistent mapping
    pub fn update(&self, offset: u64, data: &[u8]) -> Result<()> {
        if offset + data.len() as u64 > self.size {
            return Err(Error::InvalidResource(format!(
                "Buffer write of {} bytes at {} exceeds size {}",
                data.len(), offset, self.size
            )));
        }
        let allocation = self.allocation
            .as_ref()
            .ok_or_else(|| engine_err!(LOG_SOURCE, "Buffer update failed: no GPU allocation"))?;
        let mapped_ptr = allocation
            .mapped_ptr()
            .ok_or_else(|| Error::BackendError("Buffer is not CPU-accessible".to_string()))?
            .as_ptr() as *mut u8;

        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped_ptr.add(offset as usize), data.len());
        }
        Ok(())
    }
}

impl Buffer for VulkanBuffer {
    fn size(&self) -> u64 {
        self.size
    }

    fn is_cpu_backed(&self) -> bool {
        self.cpu_backed
    }

    fn is_mapped(&self) -> bool {
        self.allocation.as_ref().is_some_and(|a| a.mapped_ptr().is_some())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        unsafe {
            // Free GPU memory
            if let Some(allocation) = self.allocation.take() {
                // Don't panic if lock fails - we still need to destroy the buffer
                if let Ok(mut allocator) = self.ctx.allocator.lock() {
                    allocator.free(allocation).ok();
                }
            }

            // Destroy buffer
            self.ctx.device.destroy_buffer(self.buffer, None);
        }
    }
}
