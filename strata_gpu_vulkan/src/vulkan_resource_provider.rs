/// ResourceProvider - Vulkan caches behind the recorder
///
/// - Compatible render-pass sets, one per attachment description, each
///   holding one render pass per (color ops, stencil ops) combination
/// - A pool of secondary command buffers, retired on recycle and reclaimed
///   once the submission that may still use them has completed
/// - Pipeline states keyed by program keys, topology and compatible set
/// - Samplers

use ash::vk;
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex, PoisonError};
use strata_gpu::strata::gpu::{
    AttachmentsDescriptor, CompatibleRenderPassHandle, FilterMode, LoadStoreOps, Pipeline,
    PipelineState, PrimitiveProcessor, PrimitiveType, RenderPass, RenderTarget, ResourceProvider,
    SecondaryCommandBuffer,
};
use strata_gpu::strata::{Error, Result};
use strata_gpu::{engine_debug, engine_err, engine_trace, engine_warn};

use crate::vulkan_command_buffer::VulkanSecondaryCommandBuffer;
use crate::vulkan_context::GpuContext;
use crate::vulkan_convert::{sample_count_to_vk, topology_to_vk};
use crate::vulkan_pipeline_state::{PipelineStateFactory, PipelineStateRequest, VulkanPipelineState};
use crate::vulkan_render_pass::VulkanRenderPass;
use crate::vulkan_sampler::SamplerCache;

const LOG_SOURCE: &str = "strata::vulkan::resource_provider";

/// Default cap on live secondary command buffers
pub const DEFAULT_MAX_SECONDARY_COMMAND_BUFFERS: usize = 256;

/// Render passes sharing one attachment description
struct CompatibleSet {
    attachments: AttachmentsDescriptor,
    render_passes: FxHashMap<(LoadStoreOps, LoadStoreOps), Arc<VulkanRenderPass>>,
}

/// Secondary command buffers allocated from one pool
struct CommandBufferPool {
    pool: vk::CommandPool,
    available: Vec<vk::CommandBuffer>,
    /// Recycled buffers with the submission serial that must complete first
    retired: Vec<(u64, vk::CommandBuffer)>,
    allocated: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineStateKey {
    pipeline_key: u64,
    processor_key: u64,
    primitive_type: PrimitiveType,
    compatible_index: u32,
}

/// Vulkan resource provider
pub struct VulkanResourceProvider {
    ctx: Arc<GpuContext>,
    compatible_sets: Mutex<Vec<CompatibleSet>>,
    command_buffers: Mutex<CommandBufferPool>,
    max_command_buffers: usize,
    pipeline_states: Mutex<FxHashMap<PipelineStateKey, Arc<VulkanPipelineState>>>,
    factory: Option<Arc<dyn PipelineStateFactory>>,
    samplers: Mutex<SamplerCache>,
}

impl VulkanResourceProvider {
    /// Create the provider and its command pool
    ///
    /// # Arguments
    ///
    /// * `ctx` - Shared GPU context
    /// * `factory` - Pipeline compiler; without one every draw is dropped
    /// * `max_command_buffers` - Cap on live secondary command buffers
    pub fn new(
        ctx: Arc<GpuContext>,
        factory: Option<Arc<dyn PipelineStateFactory>>,
        max_command_buffers: usize,
    ) -> Result<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(ctx.graphics_queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let pool = unsafe {
            ctx.device.create_command_pool(&pool_create_info, None)
                .map_err(|e| Error::InitializationFailed(format!("Failed to create secondary command pool: {:?}", e)))?
        };

        Ok(Self {
            samplers: Mutex::new(SamplerCache::new(ctx.clone())),
            ctx,
            compatible_sets: Mutex::new(Vec::new()),
            command_buffers: Mutex::new(CommandBufferPool {
                pool,
                available: Vec::new(),
                retired: Vec::new(),
                allocated: 0,
            }),
            max_command_buffers,
            pipeline_states: Mutex::new(FxHashMap::default()),
            factory,
        })
    }

    /// Handle of the compatible set for `attachments`, registering it if new
    pub fn register_compatible_set(&self, attachments: AttachmentsDescriptor) -> CompatibleRenderPassHandle {
        let mut sets = self.compatible_sets.lock().unwrap_or_else(PoisonError::into_inner);
        let index = match sets.iter().position(|set| set.attachments == attachments) {
            Some(index) => index,
            None => {
                sets.push(CompatibleSet { attachments, render_passes: FxHashMap::default() });
                engine_debug!(LOG_SOURCE, "Registered compatible render-pass set {}: {:?}", sets.len() - 1, attachments);
                sets.len() - 1
            }
        };
        CompatibleRenderPassHandle::new(index as u32)
    }

    fn render_pass_in_set(
        &self,
        index: u32,
        color_ops: LoadStoreOps,
        stencil_ops: LoadStoreOps,
    ) -> Result<Arc<dyn RenderPass>> {
        let mut sets = self.compatible_sets.lock().unwrap_or_else(PoisonError::into_inner);
        let set = sets
            .get_mut(index as usize)
            .ok_or_else(|| Error::InvalidResource(format!("Unknown compatible render-pass set {}", index)))?;

        if let Some(render_pass) = set.render_passes.get(&(color_ops, stencil_ops)) {
            return Ok(render_pass.clone());
        }
        let render_pass = Arc::new(VulkanRenderPass::new(
            self.ctx.clone(),
            set.attachments,
            color_ops,
            stencil_ops,
            index,
        )?);
        set.render_passes.insert((color_ops, stencil_ops), render_pass.clone());
        engine_trace!(LOG_SOURCE, "Created render pass in set {} (color {:?}, stencil {:?})", index, color_ops, stencil_ops);
        Ok(render_pass)
    }

    /// Sampler for `filter`, for pipeline factories writing descriptors
    pub fn sampler(&self, filter: FilterMode) -> Result<vk::Sampler> {
        self.samplers.lock().unwrap_or_else(PoisonError::into_inner).get(filter)
    }

    /// Move retired command buffers whose submission completed back to the pool
    pub fn reclaim(&self) {
        let completed = self.ctx.completed_serial();
        let mut pool = self.command_buffers.lock().unwrap_or_else(PoisonError::into_inner);
        let CommandBufferPool { available, retired, .. } = &mut *pool;
        retired.retain(|&(serial, command_buffer)| {
            if serial > completed {
                return true;
            }
            let reset = unsafe {
                self.ctx.device.reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
            };
            match reset {
                Ok(()) => available.push(command_buffer),
                Err(e) => engine_warn!(LOG_SOURCE, "Dropping secondary command buffer that failed to reset: {:?}", e),
            }
            false
        });
    }

    /// (available, retired, allocated) secondary command buffer counts
    pub fn command_buffer_counts(&self) -> (usize, usize, usize) {
        let pool = self.command_buffers.lock().unwrap_or_else(PoisonError::into_inner);
        (pool.available.len(), pool.retired.len(), pool.allocated)
    }

    pub fn pipeline_state_count(&self) -> usize {
        self.pipeline_states.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn compatible_set_count(&self) -> usize {
        self.compatible_sets.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl ResourceProvider for VulkanResourceProvider {
    fn find_render_pass(
        &self,
        target: &dyn RenderTarget,
        color_ops: LoadStoreOps,
        stencil_ops: LoadStoreOps,
    ) -> Result<Arc<dyn RenderPass>> {
        let handle = self.register_compatible_set(target.attachments());
        let index = handle
            .index()
            .ok_or_else(|| engine_err!(LOG_SOURCE, "Compatible set registration returned no index"))?;
        self.render_pass_in_set(index, color_ops, stencil_ops)
    }

    fn find_compatible_render_pass(
        &self,
        handle: CompatibleRenderPassHandle,
        color_ops: LoadStoreOps,
        stencil_ops: LoadStoreOps,
    ) -> Result<Arc<dyn RenderPass>> {
        let index = handle
            .index()
            .ok_or_else(|| Error::InvalidResource("Invalid compatible render-pass handle".to_string()))?;
        self.render_pass_in_set(index, color_ops, stencil_ops)
    }

    fn find_or_create_secondary_command_buffer(&self) -> Option<Box<dyn SecondaryCommandBuffer>> {
        self.reclaim();
        let mut pool = self.command_buffers.lock().unwrap_or_else(PoisonError::into_inner);
        let command_buffer = match pool.available.pop() {
            Some(command_buffer) => command_buffer,
            None if pool.allocated < self.max_command_buffers => {
                let allocate_info = vk::CommandBufferAllocateInfo::default()
                    .command_pool(pool.pool)
                    .level(vk::CommandBufferLevel::SECONDARY)
                    .command_buffer_count(1);
                let allocated = unsafe { self.ctx.device.allocate_command_buffers(&allocate_info) };
                match allocated.ok().and_then(|buffers| buffers.into_iter().next()) {
                    Some(command_buffer) => {
                        pool.allocated += 1;
                        command_buffer
                    }
                    None => {
                        engine_warn!(LOG_SOURCE, "Secondary command buffer allocation failed");
                        return None;
                    }
                }
            }
            None => {
                engine_warn!(LOG_SOURCE, "Secondary command buffer pool exhausted ({} live)", pool.allocated);
                return None;
            }
        };
        Some(Box::new(VulkanSecondaryCommandBuffer::new(self.ctx.clone(), command_buffer)))
    }

    fn recycle_secondary_command_buffer(&self, command_buffer: Box<dyn SecondaryCommandBuffer>) {
        let Some(vk_command_buffer) = command_buffer.as_any().downcast_ref::<VulkanSecondaryCommandBuffer>() else {
            debug_assert!(false, "foreign command buffer recycled into the Vulkan provider");
            return;
        };
        // The next submission is the last one that can reference the buffer
        let serial = self.ctx.pending_serial();
        self.command_buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retired
            .push((serial, vk_command_buffer.command_buffer()));
    }

    fn find_or_create_compatible_pipeline_state(
        &self,
        pipeline: &Pipeline,
        primitive_processor: &dyn PrimitiveProcessor,
        primitive_type: PrimitiveType,
        render_pass: &dyn RenderPass,
    ) -> Option<Arc<dyn PipelineState>> {
        let Some(vk_render_pass) = render_pass.as_any().downcast_ref::<VulkanRenderPass>() else {
            debug_assert!(false, "pipeline state requested for a non-Vulkan render pass");
            return None;
        };
        let Some(factory) = &self.factory else {
            engine_trace!(LOG_SOURCE, "No pipeline state factory installed");
            return None;
        };

        let key = PipelineStateKey {
            pipeline_key: pipeline.program_key(),
            processor_key: primitive_processor.program_key(),
            primitive_type,
            compatible_index: vk_render_pass.compatible_index,
        };
        let mut states = self.pipeline_states.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(state) = states.get(&key) {
            return Some(state.clone());
        }

        let attachments = vk_render_pass.attachments();
        let request = PipelineStateRequest {
            pipeline,
            primitive_processor,
            topology: topology_to_vk(primitive_type),
            render_pass: vk_render_pass.render_pass,
            samples: sample_count_to_vk(attachments.color.samples),
            has_stencil: attachments.stencil.is_some(),
        };
        match factory.create_pipeline(&self.ctx.device, &request) {
            Ok(Some(compiled)) => {
                let state = Arc::new(VulkanPipelineState::new(
                    self.ctx.clone(),
                    compiled,
                    primitive_type,
                    factory.clone(),
                ));
                states.insert(key, state.clone());
                engine_debug!(LOG_SOURCE, "Compiled pipeline state for {} ({:?})", primitive_processor.name(), primitive_type);
                Some(state)
            }
            Ok(None) => None,
            Err(e) => {
                engine_warn!(LOG_SOURCE, "Pipeline compilation for {} failed: {}", primitive_processor.name(), e);
                None
            }
        }
    }
}

impl Drop for VulkanResourceProvider {
    fn drop(&mut self) {
        let pool = self.command_buffers.get_mut().unwrap_or_else(PoisonError::into_inner);
        unsafe {
            // Frees every secondary command buffer allocated from it
            self.ctx.device.destroy_command_pool(pool.pool, None);
        }
    }
}
