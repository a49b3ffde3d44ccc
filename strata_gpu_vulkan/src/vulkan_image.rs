/// Image - Vulkan images with tracked layout, and the texture / stencil
/// attachment types built on them

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use strata_gpu::strata::gpu::{
    AccessFlags, Gpu, Image, ImageLayout, PipelineStageFlags, RenderTarget, StencilAttachment,
    Texture, TextureFormat,
};
use strata_gpu::strata::{Error, Result};
use strata_gpu::{engine_err, engine_error, engine_trace};

use crate::vulkan_context::GpuContext;
use crate::vulkan_convert::{
    access_flags_to_vk, aspect_mask, format_to_vk, image_layout_to_vk, sample_count_to_vk,
    stage_flags_to_vk,
};
use crate::vulkan_gpu::VulkanGpu;
use crate::vulkan_render_target::VulkanRenderTarget;

const LOG_SOURCE: &str = "strata::vulkan::image";

/// Creation parameters of a Vulkan image
#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub mip_levels: u32,
    pub samples: u32,
    pub usage: vk::ImageUsageFlags,
}

/// Last transition applied to an image
#[derive(Debug, Clone, Copy)]
struct LayoutState {
    layout: ImageLayout,
    access: AccessFlags,
    stage: PipelineStageFlags,
}

/// Vulkan image with its view, memory and tracked layout
pub struct VulkanImage {
    /// Shared GPU context (device, allocator)
    ctx: Arc<GpuContext>,
    /// Vulkan image
    pub(crate) image: vk::Image,
    /// View over every mip level
    pub(crate) view: vk::ImageView,
    /// View over level 0 for framebuffers, `view` itself when there are no mips
    pub(crate) attachment_view: vk::ImageView,
    /// GPU memory allocation
    allocation: Option<Allocation>,
    pub(crate) desc: ImageDesc,
    state: Mutex<LayoutState>,
}

impl VulkanImage {
    /// Create an image, allocate its memory and create its view
    ///
    /// # Arguments
    ///
    /// * `ctx` - Shared GPU context
    /// * `desc` - Size, format, mip count, sample count and usage
    /// * `name` - Allocation name (for allocator debugging)
    pub fn new(ctx: Arc<GpuContext>, desc: ImageDesc, name: &str) -> Result<Self> {
        unsafe {
            let format = format_to_vk(desc.format);
            let image_create_info = vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_2D)
                .format(format)
                .extent(vk::Extent3D {
                    width: desc.width,
                    height: desc.height,
                    depth: 1,
                })
                .mip_levels(desc.mip_levels)
                .array_layers(1)
                .samples(sample_count_to_vk(desc.samples))
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(desc.usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);

            let image = ctx.device.create_image(&image_create_info, None)
                .map_err(|e| engine_err!(LOG_SOURCE, "Failed to create image '{}': {:?}", name, e))?;

            // Allocate memory
            let requirements = ctx.device.get_image_memory_requirements(image);
            let allocation = ctx.allocator
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .allocate(&AllocationCreateDesc {
                    name,
                    requirements,
                    location: MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                });
            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(_) => {
                    let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                    engine_error!(LOG_SOURCE, "Out of GPU memory for image '{}' ({}x{}, {:.2} MB)",
                        name, desc.width, desc.height, size_mb);
                    ctx.device.destroy_image(image, None);
                    return Err(Error::OutOfMemory);
                }
            };

            if let Err(e) = ctx.device.bind_image_memory(image, allocation.memory(), allocation.offset()) {
                Self::release(&ctx, image, &[], Some(allocation));
                return Err(engine_err!(LOG_SOURCE, "Failed to bind memory of image '{}': {:?}", name, e));
            }

            let view = match Self::create_view(&ctx, image, desc.format, desc.mip_levels) {
                Ok(view) => view,
                Err(e) => {
                    Self::release(&ctx, image, &[], Some(allocation));
                    return Err(engine_err!(LOG_SOURCE, "Failed to create view of image '{}': {:?}", name, e));
                }
            };
            let attachment_view = if desc.mip_levels > 1 {
                match Self::create_view(&ctx, image, desc.format, 1) {
                    Ok(attachment_view) => attachment_view,
                    Err(e) => {
                        Self::release(&ctx, image, &[view], Some(allocation));
                        return Err(engine_err!(LOG_SOURCE, "Failed to create attachment view of image '{}': {:?}", name, e));
                    }
                }
            } else {
                view
            };

            Ok(Self {
                ctx,
                image,
                view,
                attachment_view,
                allocation: Some(allocation),
                desc,
                state: Mutex::new(LayoutState {
                    layout: ImageLayout::Undefined,
                    access: AccessFlags::empty(),
                    stage: PipelineStageFlags::TOP_OF_PIPE,
                }),
            })
        }
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn format(&self) -> TextureFormat {
        self.desc.format
    }

    pub fn mip_levels(&self) -> u32 {
        self.desc.mip_levels
    }

    pub(crate) fn aspect_mask(&self) -> vk::ImageAspectFlags {
        aspect_mask(self.desc.format)
    }

    /// Overwrite the tracked layout after a transition recorded outside
    /// `request_layout` (mip generation ends with every level shader-readable)
    pub(crate) fn set_tracked_layout(&self, layout: ImageLayout, access: AccessFlags, stage: PipelineStageFlags) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = LayoutState { layout, access, stage };
    }

    /// View over the first `levels` mip levels
    unsafe fn create_view(
        ctx: &GpuContext,
        image: vk::Image,
        format: TextureFormat,
        levels: u32,
    ) -> std::result::Result<vk::ImageView, vk::Result> {
        let view_create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format_to_vk(format))
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect_mask(format),
                base_mip_level: 0,
                level_count: levels,
                base_array_layer: 0,
                layer_count: 1,
            });
        ctx.device.create_image_view(&view_create_info, None)
    }

    unsafe fn release(ctx: &GpuContext, image: vk::Image, views: &[vk::ImageView], allocation: Option<Allocation>) {
        for &view in views {
            ctx.device.destroy_image_view(view, None);
        }
        if let Some(allocation) = allocation {
            // Don't panic if lock fails - we still need to destroy the image
            if let Ok(mut allocator) = ctx.allocator.lock() {
                allocator.free(allocation).ok();
            }
        }
        ctx.device.destroy_image(image, None);
    }
}

impl Image for VulkanImage {
    fn current_layout(&self) -> ImageLayout {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).layout
    }

    fn request_layout(
        &self,
        gpu: &dyn Gpu,
        layout: ImageLayout,
        access: AccessFlags,
        stage: PipelineStageFlags,
        discardable: bool,
    ) {
        let Some(vulkan) = gpu.as_any().downcast_ref::<VulkanGpu>() else {
            debug_assert!(false, "Vulkan image used with a non-Vulkan device");
            return;
        };

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.layout == layout && state.access.contains(access) {
            return;
        }

        let old_layout = if discardable { ImageLayout::Undefined } else { state.layout };
        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(image_layout_to_vk(old_layout))
            .new_layout(image_layout_to_vk(layout))
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: self.aspect_mask(),
                base_mip_level: 0,
                level_count: self.desc.mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            })
            .src_access_mask(access_flags_to_vk(state.access))
            .dst_access_mask(access_flags_to_vk(access));
        let src_stage = stage_flags_to_vk(state.stage);
        let dst_stage = stage_flags_to_vk(stage);

        let recorded = vulkan.record_primary(|device, command_buffer| unsafe {
            device.cmd_pipeline_barrier(
                command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        });
        match recorded {
            Ok(()) => {
                engine_trace!(LOG_SOURCE, "Image {:?}: {:?} -> {:?}", self.image, old_layout, layout);
                *state = LayoutState { layout, access, stage };
            }
            Err(e) => engine_error!(LOG_SOURCE, "Layout transition to {:?} not recorded: {}", layout, e),
        }
    }
}

impl Drop for VulkanImage {
    fn drop(&mut self) {
        unsafe {
            if self.attachment_view != self.view {
                Self::release(&self.ctx, self.image, &[self.view, self.attachment_view], self.allocation.take());
            } else {
                Self::release(&self.ctx, self.image, &[self.view], self.allocation.take());
            }
        }
    }
}

// ============================================================================
// Texture
// ============================================================================

/// Sampled texture, optionally renderable
pub struct VulkanTexture {
    image: Arc<VulkanImage>,
    render_target: Option<Arc<VulkanRenderTarget>>,
    /// Shared with the render target, which dirties it on every replay
    mip_maps_dirty: Arc<AtomicBool>,
}

impl VulkanTexture {
    pub(crate) fn new(
        image: Arc<VulkanImage>,
        render_target: Option<Arc<VulkanRenderTarget>>,
        mip_maps_dirty: Arc<AtomicBool>,
    ) -> Self {
        Self { image, render_target, mip_maps_dirty }
    }

    pub fn image(&self) -> &Arc<VulkanImage> {
        &self.image
    }

    /// Render target drawing into this texture, for recording command buffers
    pub fn vulkan_render_target(&self) -> Option<&Arc<VulkanRenderTarget>> {
        self.render_target.as_ref()
    }
}

impl Image for VulkanTexture {
    fn current_layout(&self) -> ImageLayout {
        self.image.current_layout()
    }

    fn request_layout(
        &self,
        gpu: &dyn Gpu,
        layout: ImageLayout,
        access: AccessFlags,
        stage: PipelineStageFlags,
        discardable: bool,
    ) {
        self.image.request_layout(gpu, layout, access, stage, discardable);
    }
}

impl Texture for VulkanTexture {
    fn as_render_target(&self) -> Option<&dyn RenderTarget> {
        self.render_target.as_deref().map(|rt| rt as &dyn RenderTarget)
    }

    fn mip_maps_dirty(&self) -> bool {
        self.image.mip_levels() > 1 && self.mip_maps_dirty.load(Ordering::Acquire)
    }

    fn set_mip_maps_dirty(&self, dirty: bool) {
        self.mip_maps_dirty.store(dirty, Ordering::Release);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Stencil attachment
// ============================================================================

/// Stencil buffer of a render target
pub struct VulkanStencilAttachment {
    image: VulkanImage,
    bits: u32,
}

impl VulkanStencilAttachment {
    pub(crate) fn new(image: VulkanImage) -> Self {
        // Every supported stencil format carries an 8-bit stencil aspect
        Self { image, bits: 8 }
    }

    pub fn image(&self) -> &VulkanImage {
        &self.image
    }
}

impl Image for VulkanStencilAttachment {
    fn current_layout(&self) -> ImageLayout {
        self.image.current_layout()
    }

    fn request_layout(
        &self,
        gpu: &dyn Gpu,
        layout: ImageLayout,
        access: AccessFlags,
        stage: PipelineStageFlags,
        discardable: bool,
    ) {
        self.image.request_layout(gpu, layout, access, stage, discardable);
    }
}

impl StencilAttachment for VulkanStencilAttachment {
    fn bits(&self) -> u32 {
        self.bits
    }
}
