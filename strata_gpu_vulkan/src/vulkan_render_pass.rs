/// RenderPass - Vulkan implementation of the strata RenderPass trait
///
/// One single-subpass render pass per (attachment set, color ops, stencil
/// ops). Attachments stay in their attachment layouts across the pass: images
/// are transitioned before the pass begins.

use ash::vk;
use std::any::Any;
use std::sync::Arc;
use strata_gpu::strata::gpu::{AttachmentsDescriptor, LoadStoreOps, RenderPass, StoreOp};
use strata_gpu::strata::Result;
use strata_gpu::engine_err;

use crate::vulkan_context::GpuContext;
use crate::vulkan_convert::{format_to_vk, load_op_to_vk, sample_count_to_vk, store_op_to_vk};

/// Vulkan render pass implementation
pub struct VulkanRenderPass {
    ctx: Arc<GpuContext>,
    /// Vulkan render pass handle
    pub(crate) render_pass: vk::RenderPass,
    attachments: AttachmentsDescriptor,
    color_ops: LoadStoreOps,
    stencil_ops: LoadStoreOps,
    /// Index of the compatible set this pass belongs to
    pub(crate) compatible_index: u32,
}

impl VulkanRenderPass {
    /// Create a render pass for `attachments` with the given ops
    ///
    /// # Arguments
    ///
    /// * `ctx` - Shared GPU context
    /// * `attachments` - Color (and optional stencil) attachment description
    /// * `color_ops` - Load/store ops of the color attachment
    /// * `stencil_ops` - Load/store ops of the stencil aspect
    /// * `compatible_index` - Compatible set the pass is registered in
    pub fn new(
        ctx: Arc<GpuContext>,
        attachments: AttachmentsDescriptor,
        color_ops: LoadStoreOps,
        stencil_ops: LoadStoreOps,
        compatible_index: u32,
    ) -> Result<Self> {
        let mut descriptions = Vec::with_capacity(2);
        descriptions.push(vk::AttachmentDescription::default()
            .format(format_to_vk(attachments.color.format))
            .samples(sample_count_to_vk(attachments.color.samples))
            .load_op(load_op_to_vk(color_ops.load_op))
            .store_op(store_op_to_vk(color_ops.store_op))
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL));

        let color_ref = vk::AttachmentReference::default()
            .attachment(attachments.color_index())
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        let stencil_ref = match (attachments.stencil, attachments.stencil_index()) {
            (Some(stencil), Some(index)) => {
                // Depth content is never kept: only the stencil aspect is used
                descriptions.push(vk::AttachmentDescription::default()
                    .format(format_to_vk(stencil.format))
                    .samples(sample_count_to_vk(stencil.samples))
                    .load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .stencil_load_op(load_op_to_vk(stencil_ops.load_op))
                    .stencil_store_op(store_op_to_vk(stencil_ops.store_op))
                    .initial_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                    .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL));
                Some(vk::AttachmentReference::default()
                    .attachment(index)
                    .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL))
            }
            _ => None,
        };

        let color_refs = [color_ref];
        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if let Some(ref stencil_ref) = stencil_ref {
            subpass = subpass.depth_stencil_attachment(stencil_ref);
        }

        // Subpass dependency - include fragment test stages when stencil is present
        let (stage_mask, access_mask) = if stencil_ref.is_some() {
            (
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                    | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
        } else {
            (
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            )
        };

        let dependency = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(stage_mask)
            .src_access_mask(access_mask)
            .dst_stage_mask(stage_mask)
            .dst_access_mask(access_mask);

        let render_pass_info = vk::RenderPassCreateInfo::default()
            .attachments(&descriptions)
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(std::slice::from_ref(&dependency));

        let render_pass = unsafe {
            ctx.device.create_render_pass(&render_pass_info, None)
                .map_err(|e| engine_err!("strata::vulkan", "Failed to create render pass: {:?}", e))?
        };

        Ok(Self {
            ctx,
            render_pass,
            attachments,
            color_ops,
            stencil_ops,
            compatible_index,
        })
    }

    /// True when the color result is kept after the pass
    pub fn stores_color(&self) -> bool {
        self.color_ops.store_op == StoreOp::Store
    }
}

impl RenderPass for VulkanRenderPass {
    fn attachments(&self) -> &AttachmentsDescriptor {
        &self.attachments
    }

    fn color_ops(&self) -> LoadStoreOps {
        self.color_ops
    }

    fn stencil_ops(&self) -> LoadStoreOps {
        self.stencil_ops
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanRenderPass {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_render_pass(self.render_pass, None);
        }
    }
}
