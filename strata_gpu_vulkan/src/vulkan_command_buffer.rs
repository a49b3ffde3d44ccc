/// SecondaryCommandBuffer - Vulkan secondary command buffer recording one
/// segment
///
/// Recorded with RENDER_PASS_CONTINUE inside the segment's render pass and
/// replayed by the device with vkCmdExecuteCommands.

use ash::vk;
use std::any::Any;
use std::sync::Arc;
use strata_gpu::strata::gpu::{
    Buffer, ClearAspect, ClearAttachment, ClearRect, IRect, RenderPass, RenderTarget,
    SecondaryCommandBuffer, Viewport,
};
use strata_gpu::strata::{Error, Result};
use strata_gpu::engine_err;

use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_context::GpuContext;
use crate::vulkan_convert::{clear_value_to_vk, rect_to_vk};
use crate::vulkan_render_pass::VulkanRenderPass;
use crate::vulkan_render_target::VulkanRenderTarget;

const LOG_SOURCE: &str = "strata::vulkan::command_buffer";

/// Vulkan secondary command buffer implementation
pub struct VulkanSecondaryCommandBuffer {
    ctx: Arc<GpuContext>,
    /// Vulkan command buffer handle (owned by the provider's pool)
    pub(crate) command_buffer: vk::CommandBuffer,
    recording: bool,
}

impl VulkanSecondaryCommandBuffer {
    pub(crate) fn new(ctx: Arc<GpuContext>, command_buffer: vk::CommandBuffer) -> Self {
        Self { ctx, command_buffer, recording: false }
    }

    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    fn ensure_recording(&self) -> Result<()> {
        if self.recording {
            Ok(())
        } else {
            Err(Error::InvalidResource("Command buffer is not recording".to_string()))
        }
    }

    fn vulkan_buffer(buffer: &Arc<dyn Buffer>) -> Result<&VulkanBuffer> {
        buffer.as_any()
            .downcast_ref::<VulkanBuffer>()
            .ok_or_else(|| Error::InvalidResource("Buffer is not a Vulkan buffer".to_string()))
    }
}

impl SecondaryCommandBuffer for VulkanSecondaryCommandBuffer {
    fn begin(&mut self, target: &dyn RenderTarget, render_pass: &Arc<dyn RenderPass>) -> Result<()> {
        let vk_render_pass = render_pass.as_any()
            .downcast_ref::<VulkanRenderPass>()
            .ok_or_else(|| Error::InvalidResource("Render pass is not a Vulkan render pass".to_string()))?;
        let vk_target = target.as_any()
            .downcast_ref::<VulkanRenderTarget>()
            .ok_or_else(|| Error::InvalidResource("Render target is not a Vulkan render target".to_string()))?;
        let framebuffer = vk_target.framebuffer(vk_render_pass.render_pass)?;

        let inheritance = vk::CommandBufferInheritanceInfo::default()
            .render_pass(vk_render_pass.render_pass)
            .subpass(0)
            .framebuffer(framebuffer);
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE
                | vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
            .inheritance_info(&inheritance);

        unsafe {
            self.ctx.device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(|e| engine_err!(LOG_SOURCE, "Failed to begin secondary command buffer: {:?}", e))?;
        }
        self.recording = true;
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.ensure_recording()?;
        unsafe {
            self.ctx.device
                .end_command_buffer(self.command_buffer)
                .map_err(|e| engine_err!(LOG_SOURCE, "Failed to end secondary command buffer: {:?}", e))?;
        }
        self.recording = false;
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.recording
    }

    fn clear_attachments(&mut self, attachments: &[ClearAttachment], rects: &[ClearRect]) -> Result<()> {
        self.ensure_recording()?;
        let vk_attachments: Vec<vk::ClearAttachment> = attachments
            .iter()
            .map(|attachment| {
                let (aspect_mask, color_attachment) = match attachment.aspect {
                    ClearAspect::Color(index) => (vk::ImageAspectFlags::COLOR, index),
                    ClearAspect::Stencil => (vk::ImageAspectFlags::STENCIL, 0),
                };
                vk::ClearAttachment {
                    aspect_mask,
                    color_attachment,
                    clear_value: clear_value_to_vk(&attachment.value),
                }
            })
            .collect();
        let vk_rects: Vec<vk::ClearRect> = rects
            .iter()
            .map(|rect| vk::ClearRect {
                rect: rect_to_vk(rect.rect),
                base_array_layer: rect.base_array_layer,
                layer_count: rect.layer_count,
            })
            .collect();

        unsafe {
            self.ctx.device.cmd_clear_attachments(self.command_buffer, &vk_attachments, &vk_rects);
        }
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, buffer: &Arc<dyn Buffer>) -> Result<()> {
        self.ensure_recording()?;
        let vk_buffer = Self::vulkan_buffer(buffer)?;
        unsafe {
            self.ctx.device.cmd_bind_vertex_buffers(self.command_buffer, 0, &[vk_buffer.buffer], &[0]);
        }
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: &Arc<dyn Buffer>) -> Result<()> {
        self.ensure_recording()?;
        let vk_buffer = Self::vulkan_buffer(buffer)?;
        unsafe {
            self.ctx.device.cmd_bind_index_buffer(self.command_buffer, vk_buffer.buffer, 0, vk::IndexType::UINT16);
        }
        Ok(())
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) -> Result<()> {
        self.ensure_recording()?;
        unsafe {
            self.ctx.device.cmd_draw(self.command_buffer, vertex_count, instance_count, first_vertex, first_instance);
        }
        Ok(())
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Result<()> {
        self.ensure_recording()?;
        unsafe {
            self.ctx.device.cmd_draw_indexed(
                self.command_buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.ensure_recording()?;
        let vk_viewport = vk::Viewport {
            x: viewport.x,
            y: viewport.y,
            width: viewport.width,
            height: viewport.height,
            min_depth: viewport.min_depth,
            max_depth: viewport.max_depth,
        };
        unsafe {
            self.ctx.device.cmd_set_viewport(self.command_buffer, 0, &[vk_viewport]);
        }
        Ok(())
    }

    fn set_scissor(&mut self, scissor: IRect) -> Result<()> {
        self.ensure_recording()?;
        unsafe {
            self.ctx.device.cmd_set_scissor(self.command_buffer, 0, &[rect_to_vk(scissor)]);
        }
        Ok(())
    }

    fn set_blend_constants(&mut self, constants: [f32; 4]) -> Result<()> {
        self.ensure_recording()?;
        unsafe {
            self.ctx.device.cmd_set_blend_constants(self.command_buffer, &constants);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
