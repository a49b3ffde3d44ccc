/*!
# Strata GPU - Vulkan Backend

Vulkan implementation of the strata_gpu collaborator traits, using ash for
the Vulkan bindings and gpu-allocator for memory management.

The device is headless: it renders into offscreen targets and textures.
Segments recorded by a [`strata_gpu::strata::gpu::SegmentCommandBuffer`] are
secondary command buffers, replayed into one primary command buffer that
[`VulkanGpu::flush`] submits.

Pipeline compilation is left to the application through a
[`PipelineStateFactory`]; without one every draw is dropped.

# Example

```no_run
use strata_gpu::strata::gpu::*;
use strata_gpu_vulkan::{TargetOptions, VulkanGpu};

# fn main() -> strata_gpu::strata::Result<()> {
let gpu = VulkanGpu::new(Config::default())?;
let target = gpu.create_render_target(256, 256, TextureFormat::R8G8B8A8_UNORM, TargetOptions::default())?;

let mut command_buffer = gpu.create_command_buffer(
    target,
    LoadAndStoreInfo::new(LoadOp::Clear, StoreOp::Store, [0.0, 0.0, 0.0, 1.0]),
    LoadAndStoreInfo::load_store(),
)?;
command_buffer.clear(&FixedClip::with_scissor(IRect::from_xywh(16, 16, 64, 64)), [1.0, 0.0, 0.0, 1.0])?;
command_buffer.submit()?;
gpu.flush()?;
# Ok(())
# }
```
*/

mod vulkan_context;
mod vulkan_convert;
mod vulkan_image;
mod vulkan_render_target;
mod vulkan_buffer;
mod vulkan_render_pass;
mod vulkan_command_buffer;
mod vulkan_pipeline_state;
mod vulkan_sampler;
mod vulkan_resource_provider;
mod vulkan_gpu;
mod vulkan_uploader;
#[cfg(feature = "vulkan-validation")]
mod debug;

pub use vulkan_context::GpuContext;
pub use vulkan_convert::{bytes_per_pixel, format_to_vk, full_mip_chain};
pub use vulkan_image::{VulkanImage, VulkanStencilAttachment, VulkanTexture};
pub use vulkan_render_target::VulkanRenderTarget;
pub use vulkan_buffer::{BufferUsage, VulkanBuffer};
pub use vulkan_render_pass::VulkanRenderPass;
pub use vulkan_command_buffer::VulkanSecondaryCommandBuffer;
pub use vulkan_pipeline_state::{CompiledPipeline, PipelineStateFactory, PipelineStateRequest, VulkanPipelineState};
pub use vulkan_resource_provider::{VulkanResourceProvider, DEFAULT_MAX_SECONDARY_COMMAND_BUFFERS};
pub use vulkan_gpu::{TargetOptions, TextureDesc, VulkanGpu};
pub use vulkan_uploader::VulkanUploader;

#[cfg(feature = "vulkan-validation")]
pub use debug::{get_validation_stats, reset_validation_stats, DebugConfig, ValidationStats};
