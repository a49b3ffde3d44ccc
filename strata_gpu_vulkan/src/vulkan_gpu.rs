/// VulkanGpu - Vulkan implementation of the strata Gpu trait
///
/// Headless device owning one primary command buffer. Layout barriers,
/// resolves, mip generation, uploads and segment replays are all recorded
/// into it in call order; [`VulkanGpu::flush`] submits it and waits.

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use std::any::Any;
use std::ffi::CString;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};
use strata_gpu::strata::gpu::{
    AccessFlags, AttachmentDesc, AttachmentsDescriptor, ClearValue, Config, Gpu, GpuStats, IRect,
    Image, ImageLayout, LoadAndStoreInfo, PipelineStageFlags, RenderPass, RenderTarget,
    ResourceProvider, SecondaryCommandBuffer, SegmentCommandBuffer, SurfaceOrigin, Texture,
    TextureFormat,
};
use strata_gpu::strata::{Error, Result};
use strata_gpu::{engine_debug, engine_err, engine_error, engine_info, engine_trace};

use crate::vulkan_buffer::{BufferUsage, VulkanBuffer};
use crate::vulkan_command_buffer::VulkanSecondaryCommandBuffer;
use crate::vulkan_context::GpuContext;
use crate::vulkan_convert::{bytes_per_pixel, clear_value_to_vk, full_mip_chain, rect_to_vk};
use crate::vulkan_image::{ImageDesc, VulkanImage, VulkanStencilAttachment, VulkanTexture};
use crate::vulkan_pipeline_state::PipelineStateFactory;
use crate::vulkan_render_pass::VulkanRenderPass;
use crate::vulkan_render_target::VulkanRenderTarget;
use crate::vulkan_resource_provider::{VulkanResourceProvider, DEFAULT_MAX_SECONDARY_COMMAND_BUFFERS};
use crate::vulkan_uploader::VulkanUploader;

const LOG_SOURCE: &str = "strata::vulkan";

/// Render-target options shared by plain and texture-backed targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetOptions {
    /// Sample count of the color attachment (1 = no MSAA)
    pub samples: u32,
    /// Format of the stencil attachment, if any
    pub stencil_format: Option<TextureFormat>,
    pub origin: SurfaceOrigin,
}

impl Default for TargetOptions {
    fn default() -> Self {
        Self {
            samples: 1,
            stencil_format: None,
            origin: SurfaceOrigin::TopLeft,
        }
    }
}

/// Texture creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    /// Allocate a full mip chain
    pub mipmapped: bool,
    /// Make the texture renderable with these options
    pub render_target: Option<TargetOptions>,
}

/// Primary command buffer and the fence of its last submission
struct PrimaryCommands {
    pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
    recording: bool,
}

/// Vulkan device implementation
pub struct VulkanGpu {
    ctx: Arc<GpuContext>,
    provider: VulkanResourceProvider,
    primary: Mutex<PrimaryCommands>,
    /// Upload staging buffers kept alive until the next flush completes
    staging: Mutex<Vec<VulkanBuffer>>,
    stats: GpuStats,
}

impl VulkanGpu {
    /// Create a headless device without a pipeline factory
    ///
    /// Every draw is dropped until a factory is supplied, clears and uploads
    /// work.
    pub fn new(config: Config) -> Result<Arc<Self>> {
        Self::create(config, None)
    }

    /// Create a headless device compiling pipelines through `factory`
    pub fn with_factory(config: Config, factory: Arc<dyn PipelineStateFactory>) -> Result<Arc<Self>> {
        Self::create(config, Some(factory))
    }

    fn create(config: Config, factory: Option<Arc<dyn PipelineStateFactory>>) -> Result<Arc<Self>> {
        unsafe {
            // Create Vulkan Entry
            let entry = ash::Entry::load()
                .map_err(|e| {
                    engine_error!(LOG_SOURCE, "Failed to load Vulkan library: {:?}", e);
                    Error::InitializationFailed(format!("Failed to load Vulkan library: {:?}", e))
                })?;

            // Application Info
            let app_name = CString::new(config.app_name.clone())
                .map_err(|_| Error::InitializationFailed("Application name contains a NUL byte".to_string()))?;
            let (major, minor, patch) = config.app_version;
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, major, minor, patch))
                .engine_name(c"Strata")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_2);

            let enable_validation = config.enable_validation && cfg!(feature = "vulkan-validation");
            if config.enable_validation && !enable_validation {
                engine_info!(LOG_SOURCE, "Validation requested but the vulkan-validation feature is disabled");
            }

            let mut extension_names = Vec::new();
            let mut layer_names = Vec::new();
            if enable_validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
                layer_names.push(c"VK_LAYER_KHRONOS_validation".as_ptr());
            }

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry
                .create_instance(&create_info, None)
                .map_err(|e| {
                    engine_error!(LOG_SOURCE, "Failed to create Vulkan instance: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create instance: {:?}", e))
                })?;

            let (debug_utils_loader, debug_messenger) = if enable_validation {
                Self::create_debug_messenger(&entry, &instance)?
            } else {
                (None, None)
            };

            // Pick the first device with a graphics queue
            let physical_devices = instance
                .enumerate_physical_devices()
                .map_err(|e| {
                    engine_error!(LOG_SOURCE, "Failed to enumerate physical devices: {:?}", e);
                    Error::InitializationFailed(format!("Failed to enumerate physical devices: {:?}", e))
                })?;

            let (physical_device, graphics_family_index) = physical_devices
                .into_iter()
                .find_map(|pd| {
                    instance
                        .get_physical_device_queue_family_properties(pd)
                        .iter()
                        .position(|qf| qf.queue_flags.contains(vk::QueueFlags::GRAPHICS))
                        .map(|index| (pd, index as u32))
                })
                .ok_or_else(|| {
                    engine_error!(LOG_SOURCE, "No Vulkan device with a graphics queue found");
                    Error::InitializationFailed("No Vulkan device with a graphics queue found".to_string())
                })?;

            // Create Logical Device
            let queue_priorities = [1.0];
            let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
                .queue_family_index(graphics_family_index)
                .queue_priorities(&queue_priorities)];
            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos);

            let device = instance
                .create_device(physical_device, &device_create_info, None)
                .map_err(|e| {
                    engine_error!(LOG_SOURCE, "Failed to create logical device: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create device: {:?}", e))
                })?;
            let graphics_queue = device.get_device_queue(graphics_family_index, 0);

            // Create GPU allocator
            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| {
                engine_error!(LOG_SOURCE, "Failed to create GPU allocator: {:?}", e);
                Error::InitializationFailed(format!("Failed to create allocator: {:?}", e))
            })?;

            // From here on the context owns device and instance destruction
            let ctx = Arc::new(GpuContext::new(
                entry,
                instance,
                physical_device,
                device,
                allocator,
                graphics_queue,
                graphics_family_index,
                debug_utils_loader,
                debug_messenger,
            ));

            let primary = Self::create_primary(&ctx)?;
            let provider = VulkanResourceProvider::new(ctx.clone(), factory, DEFAULT_MAX_SECONDARY_COMMAND_BUFFERS)?;

            engine_info!(LOG_SOURCE, "Vulkan device created (validation: {})", enable_validation);
            Ok(Arc::new(Self {
                ctx,
                provider,
                primary: Mutex::new(primary),
                staging: Mutex::new(Vec::new()),
                stats: GpuStats::new(),
            }))
        }
    }

    #[cfg(feature = "vulkan-validation")]
    unsafe fn create_debug_messenger(
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<(Option<ash::ext::debug_utils::Instance>, Option<vk::DebugUtilsMessengerEXT>)> {
        let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);
        crate::debug::init_debug_config(crate::debug::DebugConfig::default());

        let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
            )
            .pfn_user_callback(Some(crate::debug::vulkan_debug_callback));

        let messenger = debug_utils
            .create_debug_utils_messenger(&debug_info, None)
            .map_err(|e| {
                engine_error!(LOG_SOURCE, "Failed to create debug messenger: {:?}", e);
                Error::InitializationFailed(format!("Failed to create debug messenger: {:?}", e))
            })?;
        Ok((Some(debug_utils), Some(messenger)))
    }

    #[cfg(not(feature = "vulkan-validation"))]
    unsafe fn create_debug_messenger(
        _entry: &ash::Entry,
        _instance: &ash::Instance,
    ) -> Result<(Option<ash::ext::debug_utils::Instance>, Option<vk::DebugUtilsMessengerEXT>)> {
        Ok((None, None))
    }

    fn create_primary(ctx: &GpuContext) -> Result<PrimaryCommands> {
        unsafe {
            let pool_create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(ctx.graphics_queue_family)
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            let pool = ctx.device.create_command_pool(&pool_create_info, None)
                .map_err(|e| Error::InitializationFailed(format!("Failed to create command pool: {:?}", e)))?;

            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            let command_buffer = match ctx.device.allocate_command_buffers(&allocate_info) {
                Ok(buffers) if !buffers.is_empty() => buffers[0],
                _ => {
                    ctx.device.destroy_command_pool(pool, None);
                    return Err(Error::InitializationFailed("Failed to allocate primary command buffer".to_string()));
                }
            };

            let fence = match ctx.device.create_fence(&vk::FenceCreateInfo::default(), None) {
                Ok(fence) => fence,
                Err(e) => {
                    ctx.device.destroy_command_pool(pool, None);
                    return Err(Error::InitializationFailed(format!("Failed to create fence: {:?}", e)));
                }
            };

            Ok(PrimaryCommands { pool, command_buffer, fence, recording: false })
        }
    }

    pub fn context(&self) -> &Arc<GpuContext> {
        &self.ctx
    }

    pub fn provider(&self) -> &VulkanResourceProvider {
        &self.provider
    }

    /// Record into the primary command buffer, beginning it if needed
    pub(crate) fn record_primary<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let mut primary = self.primary.lock().unwrap_or_else(PoisonError::into_inner);
        if !primary.recording {
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            unsafe {
                self.ctx.device
                    .begin_command_buffer(primary.command_buffer, &begin_info)
                    .map_err(|e| engine_err!(LOG_SOURCE, "Failed to begin primary command buffer: {:?}", e))?;
            }
            primary.recording = true;
        }
        record(&self.ctx.device, primary.command_buffer);
        Ok(())
    }

    /// Submit everything recorded so far and wait for it to complete
    ///
    /// Reclaims recycled secondary command buffers and frees upload staging
    /// memory afterwards. No-op when nothing was recorded.
    pub fn flush(&self) -> Result<()> {
        {
            let mut primary = self.primary.lock().unwrap_or_else(PoisonError::into_inner);
            if !primary.recording {
                return Ok(());
            }
            primary.recording = false;

            unsafe {
                let device = &self.ctx.device;
                device.end_command_buffer(primary.command_buffer)
                    .map_err(|e| engine_err!(LOG_SOURCE, "Failed to end primary command buffer: {:?}", e))?;

                let command_buffers = [primary.command_buffer];
                let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
                let serial = self.ctx.advance_submitted_serial();
                device.queue_submit(self.ctx.graphics_queue, &[submit_info], primary.fence)
                    .map_err(|e| engine_err!(LOG_SOURCE, "Failed to submit commands to GPU queue: {:?}", e))?;

                device.wait_for_fences(&[primary.fence], true, u64::MAX)
                    .map_err(|e| engine_err!(LOG_SOURCE, "Failed to wait for submit fence: {:?}", e))?;
                device.reset_fences(&[primary.fence])
                    .map_err(|e| engine_err!(LOG_SOURCE, "Failed to reset submit fence: {:?}", e))?;

                self.ctx.mark_completed(serial);
                engine_trace!(LOG_SOURCE, "Submission {} completed", serial);
            }
        }

        self.staging.lock().unwrap_or_else(PoisonError::into_inner).clear();
        self.provider.reclaim();
        Ok(())
    }

    /// Start recording on `target`
    ///
    /// # Arguments
    ///
    /// * `target` - Render target created by this device
    /// * `color_info` - Initial color policy and clear color
    /// * `stencil_info` - Initial stencil policy
    pub fn create_command_buffer(
        self: &Arc<Self>,
        target: Arc<dyn RenderTarget>,
        color_info: LoadAndStoreInfo,
        stencil_info: LoadAndStoreInfo,
    ) -> Result<SegmentCommandBuffer> {
        SegmentCommandBuffer::new(self.clone(), target, color_info, stencil_info)
    }

    /// Flush state performing inline uploads through staging buffers
    pub fn uploader(self: &Arc<Self>) -> Arc<VulkanUploader> {
        Arc::new(VulkanUploader::new(self.clone()))
    }

    /// Create a vertex or index buffer
    pub fn create_buffer(&self, size: u64, usage: BufferUsage, cpu_backed: bool) -> Result<Arc<VulkanBuffer>> {
        Ok(Arc::new(VulkanBuffer::new(self.ctx.clone(), size, usage, cpu_backed)?))
    }

    /// Create an offscreen render target
    pub fn create_render_target(
        &self,
        width: u32,
        height: u32,
        format: TextureFormat,
        options: TargetOptions,
    ) -> Result<Arc<VulkanRenderTarget>> {
        let color = Arc::new(VulkanImage::new(
            self.ctx.clone(),
            ImageDesc {
                width,
                height,
                format,
                mip_levels: 1,
                samples: 1,
                usage: vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::SAMPLED
                    | vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::TRANSFER_DST,
            },
            "render target",
        )?);
        Ok(Arc::new(self.build_target(color, options, None)?))
    }

    /// Create a sampled texture, optionally renderable
    pub fn create_texture(&self, desc: &TextureDesc) -> Result<Arc<VulkanTexture>> {
        let mip_levels = if desc.mipmapped { full_mip_chain(desc.width, desc.height) } else { 1 };
        let mut usage = vk::ImageUsageFlags::SAMPLED
            | vk::ImageUsageFlags::TRANSFER_DST
            | vk::ImageUsageFlags::TRANSFER_SRC;
        if desc.render_target.is_some() {
            usage |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
        }

        let image = Arc::new(VulkanImage::new(
            self.ctx.clone(),
            ImageDesc {
                width: desc.width,
                height: desc.height,
                format: desc.format,
                mip_levels,
                samples: 1,
                usage,
            },
            "texture",
        )?);

        let mip_maps_dirty = Arc::new(AtomicBool::new(false));
        let render_target = match desc.render_target {
            Some(options) => Some(Arc::new(self.build_target(image.clone(), options, Some(mip_maps_dirty.clone()))?)),
            None => None,
        };
        Ok(Arc::new(VulkanTexture::new(image, render_target, mip_maps_dirty)))
    }

    fn build_target(
        &self,
        color: Arc<VulkanImage>,
        options: TargetOptions,
        mip_maps_dirty: Option<Arc<AtomicBool>>,
    ) -> Result<VulkanRenderTarget> {
        let (width, height, format) = (color.width(), color.height(), color.format());

        let msaa = if options.samples > 1 {
            Some(VulkanImage::new(
                self.ctx.clone(),
                ImageDesc {
                    width,
                    height,
                    format,
                    mip_levels: 1,
                    samples: options.samples,
                    usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
                },
                "msaa color",
            )?)
        } else {
            None
        };

        let stencil = match options.stencil_format {
            Some(stencil_format) => {
                if !stencil_format.has_stencil() {
                    return Err(Error::InvalidResource(format!("{:?} has no stencil aspect", stencil_format)));
                }
                Some(VulkanStencilAttachment::new(VulkanImage::new(
                    self.ctx.clone(),
                    ImageDesc {
                        width,
                        height,
                        format: stencil_format,
                        mip_levels: 1,
                        samples: options.samples,
                        usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                    },
                    "stencil",
                )?))
            }
            None => None,
        };

        let attachments = AttachmentsDescriptor {
            color: AttachmentDesc { format, samples: options.samples.max(1) },
            stencil: options.stencil_format.map(|format| AttachmentDesc { format, samples: options.samples.max(1) }),
        };
        let handle = self.provider.register_compatible_set(attachments);

        Ok(VulkanRenderTarget::new(
            self.ctx.clone(),
            options.origin,
            color,
            msaa,
            stencil,
            attachments,
            handle,
            mip_maps_dirty,
        ))
    }

    /// Copy `data` into `rect` of mip level 0 of `texture`
    ///
    /// `data` holds tightly packed rows. The copy is recorded into the primary
    /// command buffer and lands with the next flush.
    pub fn write_pixels(&self, texture: &dyn Texture, rect: IRect, data: &[u8]) -> Result<()> {
        let vk_texture = texture.as_any()
            .downcast_ref::<VulkanTexture>()
            .ok_or_else(|| Error::InvalidResource("Texture is not a Vulkan texture".to_string()))?;
        let image = vk_texture.image();
        let bpp = bytes_per_pixel(image.format())
            .ok_or_else(|| Error::InvalidResource(format!("Cannot upload pixels to {:?}", image.format())))?;

        let bounds = IRect::from_size(image.width(), image.height());
        if rect.is_empty() || !bounds.contains(&rect) {
            return Err(Error::InvalidResource(format!("Upload rect {:?} outside texture {:?}", rect, bounds)));
        }
        let size = rect.width() as u64 * rect.height() as u64 * bpp as u64;
        if (data.len() as u64) < size {
            return Err(Error::InvalidResource(format!("Upload needs {} bytes, got {}", size, data.len())));
        }

        let staging = VulkanBuffer::new(self.ctx.clone(), size, BufferUsage::Staging, true)?;
        staging.update(0, &data[..size as usize])?;

        texture.request_layout(
            self,
            ImageLayout::TransferDst,
            AccessFlags::TRANSFER_WRITE,
            PipelineStageFlags::TRANSFER,
            false,
        );

        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D { x: rect.left, y: rect.top, z: 0 })
            .image_extent(vk::Extent3D {
                width: rect.width() as u32,
                height: rect.height() as u32,
                depth: 1,
            });

        let (buffer, vk_image) = (staging.buffer, image.image);
        self.record_primary(|device, command_buffer| unsafe {
            device.cmd_copy_buffer_to_image(
                command_buffer,
                buffer,
                vk_image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        })?;

        self.staging.lock().unwrap_or_else(PoisonError::into_inner).push(staging);
        texture.set_mip_maps_dirty(true);
        Ok(())
    }

    /// Record the blit chain rebuilding levels 1.. from level 0
    fn record_mip_chain(&self, image: &VulkanImage) -> Result<()> {
        let (width, height) = (image.width(), image.height());
        let aspect_mask = image.aspect_mask();
        let mip_levels = image.mip_levels();
        let vk_image = image.image;

        let level_range = |level: u32| vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: level,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };

        self.record_primary(|device, command_buffer| unsafe {
            for mip in 1..mip_levels {
                let src_mip = mip - 1;
                let src_width = (width >> src_mip).max(1);
                let src_height = (height >> src_mip).max(1);
                let dst_width = (width >> mip).max(1);
                let dst_height = (height >> mip).max(1);

                // Transition src mip to TRANSFER_SRC_OPTIMAL
                let barrier_src = vk::ImageMemoryBarrier::default()
                    .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                    .new_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(vk_image)
                    .subresource_range(level_range(src_mip))
                    .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                    .dst_access_mask(vk::AccessFlags::TRANSFER_READ);

                device.cmd_pipeline_barrier(
                    command_buffer,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[barrier_src],
                );

                // Blit from src_mip to dst_mip
                let blit = vk::ImageBlit::default()
                    .src_subresource(vk::ImageSubresourceLayers {
                        aspect_mask,
                        mip_level: src_mip,
                        base_array_layer: 0,
                        layer_count: 1,
                    })
                    .src_offsets([
                        vk::Offset3D { x: 0, y: 0, z: 0 },
                        vk::Offset3D { x: src_width as i32, y: src_height as i32, z: 1 },
                    ])
                    .dst_subresource(vk::ImageSubresourceLayers {
                        aspect_mask,
                        mip_level: mip,
                        base_array_layer: 0,
                        layer_count: 1,
                    })
                    .dst_offsets([
                        vk::Offset3D { x: 0, y: 0, z: 0 },
                        vk::Offset3D { x: dst_width as i32, y: dst_height as i32, z: 1 },
                    ]);

                device.cmd_blit_image(
                    command_buffer,
                    vk_image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    vk_image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[blit],
                    vk::Filter::LINEAR,
                );

                // Done with this level
                let barrier_src_final = vk::ImageMemoryBarrier::default()
                    .old_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                    .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(vk_image)
                    .subresource_range(level_range(src_mip))
                    .src_access_mask(vk::AccessFlags::TRANSFER_READ)
                    .dst_access_mask(vk::AccessFlags::SHADER_READ);

                device.cmd_pipeline_barrier(
                    command_buffer,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::ALL_GRAPHICS,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[barrier_src_final],
                );
            }

            // Transition last mip level to SHADER_READ_ONLY
            let barrier_last_mip = vk::ImageMemoryBarrier::default()
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(vk_image)
                .subresource_range(level_range(mip_levels - 1))
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::SHADER_READ);

            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::ALL_GRAPHICS,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier_last_mip],
            );
        })
    }
}

impl Gpu for VulkanGpu {
    fn resource_provider(&self) -> &dyn ResourceProvider {
        &self.provider
    }

    fn resolve_render_target(&self, target: &dyn RenderTarget) {
        let Some(vk_target) = target.as_any().downcast_ref::<VulkanRenderTarget>() else {
            debug_assert!(false, "resolve requested for a non-Vulkan render target");
            return;
        };
        let Some(msaa) = vk_target.msaa_vulkan_image() else {
            vk_target.mark_resolved();
            return;
        };
        let color = vk_target.color_image();

        msaa.request_layout(self, ImageLayout::TransferSrc, AccessFlags::TRANSFER_READ, PipelineStageFlags::TRANSFER, false);
        color.request_layout(self, ImageLayout::TransferDst, AccessFlags::TRANSFER_WRITE, PipelineStageFlags::TRANSFER, true);

        let subresource = vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        let region = vk::ImageResolve::default()
            .src_subresource(subresource)
            .dst_subresource(subresource)
            .extent(vk::Extent3D { width: color.width(), height: color.height(), depth: 1 });

        let (src, dst) = (msaa.image, color.image);
        let recorded = self.record_primary(|device, command_buffer| unsafe {
            device.cmd_resolve_image(
                command_buffer,
                src,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        });
        match recorded {
            Ok(()) => vk_target.mark_resolved(),
            Err(e) => engine_error!(LOG_SOURCE, "Resolve not recorded: {}", e),
        }
    }

    fn generate_mipmap(&self, texture: &dyn Texture) {
        let Some(vk_texture) = texture.as_any().downcast_ref::<VulkanTexture>() else {
            debug_assert!(false, "mip generation requested for a non-Vulkan texture");
            return;
        };
        let image = vk_texture.image();
        if image.mip_levels() < 2 {
            return;
        }

        image.request_layout(self, ImageLayout::TransferDst, AccessFlags::TRANSFER_WRITE, PipelineStageFlags::TRANSFER, false);
        match self.record_mip_chain(image) {
            Ok(()) => {
                image.set_tracked_layout(ImageLayout::ShaderReadOnly, AccessFlags::SHADER_READ, PipelineStageFlags::ALL_GRAPHICS);
                engine_trace!(LOG_SOURCE, "Regenerated {} mip levels", image.mip_levels());
            }
            Err(e) => engine_error!(LOG_SOURCE, "Mip generation not recorded: {}", e),
        }
    }

    fn submit_secondary_command_buffer(
        &self,
        command_buffer: &dyn SecondaryCommandBuffer,
        render_pass: &Arc<dyn RenderPass>,
        clear_value: &ClearValue,
        target: &dyn RenderTarget,
        bounds: IRect,
    ) -> Result<()> {
        let vk_command_buffer = command_buffer.as_any()
            .downcast_ref::<VulkanSecondaryCommandBuffer>()
            .ok_or_else(|| Error::InvalidResource("Command buffer is not a Vulkan command buffer".to_string()))?;
        let vk_render_pass = render_pass.as_any()
            .downcast_ref::<VulkanRenderPass>()
            .ok_or_else(|| Error::InvalidResource("Render pass is not a Vulkan render pass".to_string()))?;
        let vk_target = target.as_any()
            .downcast_ref::<VulkanRenderTarget>()
            .ok_or_else(|| Error::InvalidResource("Render target is not a Vulkan render target".to_string()))?;
        if vk_command_buffer.is_recording() {
            return Err(engine_err!(LOG_SOURCE, "Secondary command buffer replayed while still recording"));
        }

        let framebuffer = vk_target.framebuffer(vk_render_pass.render_pass)?;
        let mut clear_values = vec![clear_value_to_vk(clear_value)];
        if target.attachments().stencil.is_some() {
            clear_values.push(clear_value_to_vk(&ClearValue::DepthStencil { depth: 1.0, stencil: 0 }));
        }

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(vk_render_pass.render_pass)
            .framebuffer(framebuffer)
            .render_area(rect_to_vk(bounds))
            .clear_values(&clear_values);
        let secondary = [vk_command_buffer.command_buffer()];

        self.record_primary(|device, primary| unsafe {
            device.cmd_begin_render_pass(primary, &begin_info, vk::SubpassContents::SECONDARY_COMMAND_BUFFERS);
            device.cmd_execute_commands(primary, &secondary);
            device.cmd_end_render_pass(primary);
        })?;

        if vk_render_pass.stores_color() {
            vk_target.mark_rendered();
        }
        engine_debug!(LOG_SOURCE, "Replayed segment over {:?}", bounds);
        Ok(())
    }

    fn stats(&self) -> &GpuStats {
        &self.stats
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanGpu {
    fn drop(&mut self) {
        unsafe {
            // Wait for device to finish
            self.ctx.device.device_wait_idle().ok();

            let primary = self.primary.get_mut().unwrap_or_else(PoisonError::into_inner);
            self.ctx.device.destroy_fence(primary.fence, None);
            // Frees the primary command buffer too
            self.ctx.device.destroy_command_pool(primary.pool, None);
        }
        // Provider caches, staging buffers and the context drop after this,
        // the context last once every resource released it
    }
}
