/// PipelineState - compiled Vulkan graphics pipeline for one draw
/// configuration
///
/// Shader programs are application territory: pipelines are compiled by an
/// application-supplied [`PipelineStateFactory`] and cached by the resource
/// provider.

use ash::vk;
use std::any::Any;
use std::sync::Arc;
use strata_gpu::strata::gpu::{
    Gpu, Pipeline, PipelineState, PrimitiveProcessor, PrimitiveType, SecondaryCommandBuffer,
};
use strata_gpu::strata::{Error, Result};

use crate::vulkan_command_buffer::VulkanSecondaryCommandBuffer;
use crate::vulkan_context::GpuContext;

/// Everything a factory needs to compile a pipeline
pub struct PipelineStateRequest<'a> {
    pub pipeline: &'a Pipeline,
    pub primitive_processor: &'a dyn PrimitiveProcessor,
    pub topology: vk::PrimitiveTopology,
    /// Render pass the pipeline must be compatible with
    pub render_pass: vk::RenderPass,
    pub samples: vk::SampleCountFlags,
    pub has_stencil: bool,
}

/// Vulkan objects produced by a factory, owned by the pipeline state
#[derive(Debug, Clone, Copy)]
pub struct CompiledPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

/// Application hook compiling and feeding graphics pipelines
pub trait PipelineStateFactory: Send + Sync {
    /// Compile a pipeline for `request`
    ///
    /// Returns `Ok(None)` when the configuration is not supported; the draw is
    /// then dropped.
    fn create_pipeline(&self, device: &ash::Device, request: &PipelineStateRequest<'_>) -> Result<Option<CompiledPipeline>>;

    /// Write the draw's uniforms and descriptors before the pipeline is bound
    fn write_draw_data(
        &self,
        _device: &ash::Device,
        _compiled: &CompiledPipeline,
        _primitive_processor: &dyn PrimitiveProcessor,
        _pipeline: &Pipeline,
    ) -> Result<()> {
        Ok(())
    }

    /// Bind the written descriptors right after the pipeline
    fn bind_draw_data(&self, _device: &ash::Device, _compiled: &CompiledPipeline, _command_buffer: vk::CommandBuffer) -> Result<()> {
        Ok(())
    }

    /// Release per-draw resources allocated by `write_draw_data`
    fn release_draw_data(&self, _compiled: &CompiledPipeline) {}
}

/// Vulkan pipeline state implementation
pub struct VulkanPipelineState {
    ctx: Arc<GpuContext>,
    compiled: CompiledPipeline,
    primitive_type: PrimitiveType,
    factory: Arc<dyn PipelineStateFactory>,
}

impl VulkanPipelineState {
    pub(crate) fn new(
        ctx: Arc<GpuContext>,
        compiled: CompiledPipeline,
        primitive_type: PrimitiveType,
        factory: Arc<dyn PipelineStateFactory>,
    ) -> Self {
        Self { ctx, compiled, primitive_type, factory }
    }

    pub fn compiled(&self) -> &CompiledPipeline {
        &self.compiled
    }
}

impl PipelineState for VulkanPipelineState {
    fn primitive_type(&self) -> PrimitiveType {
        self.primitive_type
    }

    fn set_data(&self, _gpu: &dyn Gpu, primitive_processor: &dyn PrimitiveProcessor, pipeline: &Pipeline) -> Result<()> {
        self.factory.write_draw_data(&self.ctx.device, &self.compiled, primitive_processor, pipeline)
    }

    fn bind(&self, _gpu: &dyn Gpu, command_buffer: &mut dyn SecondaryCommandBuffer) -> Result<()> {
        let vk_command_buffer = command_buffer.as_any_mut()
            .downcast_mut::<VulkanSecondaryCommandBuffer>()
            .ok_or_else(|| Error::InvalidResource("Command buffer is not a Vulkan command buffer".to_string()))?;
        if !vk_command_buffer.is_recording() {
            return Err(Error::InvalidResource("Command buffer is not recording".to_string()));
        }
        let handle = vk_command_buffer.command_buffer();
        unsafe {
            self.ctx.device.cmd_bind_pipeline(handle, vk::PipelineBindPoint::GRAPHICS, self.compiled.pipeline);
        }
        self.factory.bind_draw_data(&self.ctx.device, &self.compiled, handle)
    }

    fn free_temp_resources(&self, _gpu: &dyn Gpu) {
        self.factory.release_draw_data(&self.compiled);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanPipelineState {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_pipeline(self.compiled.pipeline, None);
            self.ctx.device.destroy_pipeline_layout(self.compiled.layout, None);
        }
    }
}
