/// RenderTarget - Vulkan implementation of the strata RenderTarget trait
///
/// Owns (or shares, for texture-backed targets) the color image, plus the
/// optional MSAA color image and stencil attachment. One framebuffer serves
/// every render pass of the target's compatible set.

use ash::vk;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use strata_gpu::strata::gpu::{
    AttachmentsDescriptor, CompatibleRenderPassHandle, Image, RenderTarget, StencilAttachment,
    SurfaceOrigin,
};
use strata_gpu::strata::Result;
use strata_gpu::engine_err;

use crate::vulkan_context::GpuContext;
use crate::vulkan_image::{VulkanImage, VulkanStencilAttachment};

/// Vulkan render target implementation
pub struct VulkanRenderTarget {
    ctx: Arc<GpuContext>,
    origin: SurfaceOrigin,
    /// Single-sampled color image (resolve destination when MSAA is used)
    color: Arc<VulkanImage>,
    /// Multisampled color image rendered into, if any
    msaa: Option<VulkanImage>,
    stencil: Option<VulkanStencilAttachment>,
    attachments: AttachmentsDescriptor,
    handle: CompatibleRenderPassHandle,
    needs_resolve: AtomicBool,
    /// Mip flag of the texture backing this target, if any
    mip_maps_dirty: Option<Arc<AtomicBool>>,
    framebuffer: Mutex<Option<vk::Framebuffer>>,
}

impl VulkanRenderTarget {
    /// Assemble a render target from already created images
    ///
    /// # Arguments
    ///
    /// * `ctx` - Shared GPU context
    /// * `origin` - Where row 0 lives
    /// * `color` - Single-sampled color image
    /// * `msaa` - Multisampled color image, rendered into instead of `color`
    /// * `stencil` - Stencil attachment
    /// * `handle` - Compatible render-pass set of the attachments
    /// * `mip_maps_dirty` - Mip flag of the backing texture
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        ctx: Arc<GpuContext>,
        origin: SurfaceOrigin,
        color: Arc<VulkanImage>,
        msaa: Option<VulkanImage>,
        stencil: Option<VulkanStencilAttachment>,
        attachments: AttachmentsDescriptor,
        handle: CompatibleRenderPassHandle,
        mip_maps_dirty: Option<Arc<AtomicBool>>,
    ) -> Self {
        Self {
            ctx,
            origin,
            color,
            msaa,
            stencil,
            attachments,
            handle,
            needs_resolve: AtomicBool::new(false),
            mip_maps_dirty,
            framebuffer: Mutex::new(None),
        }
    }

    pub fn color_image(&self) -> &Arc<VulkanImage> {
        &self.color
    }

    pub fn msaa_vulkan_image(&self) -> Option<&VulkanImage> {
        self.msaa.as_ref()
    }

    pub fn stencil_vulkan_attachment(&self) -> Option<&VulkanStencilAttachment> {
        self.stencil.as_ref()
    }

    /// Record that replayed commands wrote to the target
    pub(crate) fn mark_rendered(&self) {
        if self.msaa.is_some() {
            self.needs_resolve.store(true, Ordering::Release);
        }
        if let Some(dirty) = &self.mip_maps_dirty {
            dirty.store(true, Ordering::Release);
        }
    }

    pub(crate) fn mark_resolved(&self) {
        self.needs_resolve.store(false, Ordering::Release);
    }

    /// Framebuffer of the target, created on first use with `render_pass`
    ///
    /// Valid with every render pass compatible with `render_pass`.
    pub(crate) fn framebuffer(&self, render_pass: vk::RenderPass) -> Result<vk::Framebuffer> {
        let mut framebuffer = self.framebuffer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = *framebuffer {
            return Ok(existing);
        }

        let mut views = Vec::with_capacity(2);
        views.push(self.msaa.as_ref().map_or(self.color.attachment_view, |msaa| msaa.attachment_view));
        if let Some(stencil) = &self.stencil {
            views.push(stencil.image().attachment_view);
        }

        let framebuffer_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&views)
            .width(self.color.width())
            .height(self.color.height())
            .layers(1);

        let created = unsafe {
            self.ctx.device.create_framebuffer(&framebuffer_info, None)
                .map_err(|e| engine_err!("strata::vulkan", "Failed to create framebuffer: {:?}", e))?
        };
        *framebuffer = Some(created);
        Ok(created)
    }
}

impl RenderTarget for VulkanRenderTarget {
    fn width(&self) -> u32 {
        self.color.width()
    }

    fn height(&self) -> u32 {
        self.color.height()
    }

    fn origin(&self) -> SurfaceOrigin {
        self.origin
    }

    fn image(&self) -> &dyn Image {
        self.color.as_ref()
    }

    fn msaa_image(&self) -> Option<&dyn Image> {
        self.msaa.as_ref().map(|image| image as &dyn Image)
    }

    fn stencil_attachment(&self) -> Option<&dyn StencilAttachment> {
        self.stencil.as_ref().map(|stencil| stencil as &dyn StencilAttachment)
    }

    fn compatible_render_pass_handle(&self) -> CompatibleRenderPassHandle {
        self.handle
    }

    fn attachments(&self) -> AttachmentsDescriptor {
        self.attachments
    }

    fn needs_resolve(&self) -> bool {
        self.needs_resolve.load(Ordering::Acquire)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanRenderTarget {
    fn drop(&mut self) {
        let framebuffer = self.framebuffer.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(framebuffer) = framebuffer.take() {
            unsafe {
                self.ctx.device.destroy_framebuffer(framebuffer, None);
            }
        }
    }
}
