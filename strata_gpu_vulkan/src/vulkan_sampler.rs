/// SamplerCache - VkSampler management for the Vulkan backend
///
/// Creates and caches one VkSampler per filter mode on first use. Pipeline
/// factories fetch samplers through the resource provider.

use ash::vk;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use strata_gpu::strata::gpu::FilterMode;
use strata_gpu::strata::Result;
use strata_gpu::engine_err;

use crate::vulkan_context::GpuContext;
use crate::vulkan_convert::filter_to_vk;

/// Sampler cache: creates VkSampler on first use, destroys on drop
pub(crate) struct SamplerCache {
    ctx: Arc<GpuContext>,
    cache: FxHashMap<FilterMode, vk::Sampler>,
}

impl SamplerCache {
    pub(crate) fn new(ctx: Arc<GpuContext>) -> Self {
        Self {
            ctx,
            cache: FxHashMap::default(),
        }
    }

    /// Get or create the VkSampler for `filter`
    pub(crate) fn get(&mut self, filter: FilterMode) -> Result<vk::Sampler> {
        if let Some(&sampler) = self.cache.get(&filter) {
            return Ok(sampler);
        }
        let sampler = Self::create_vk_sampler(&self.ctx, filter)?;
        self.cache.insert(filter, sampler);
        Ok(sampler)
    }

    fn create_vk_sampler(ctx: &GpuContext, filter: FilterMode) -> Result<vk::Sampler> {
        let (filter, mipmap, uses_mips) = filter_to_vk(filter);
        // Without mips sampling is pinned to the base level
        let max_lod = if uses_mips { vk::LOD_CLAMP_NONE } else { 0.0 };

        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(filter)
            .min_filter(filter)
            .mipmap_mode(mipmap)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(max_lod)
            .border_color(vk::BorderColor::FLOAT_TRANSPARENT_BLACK)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .unnormalized_coordinates(false);

        unsafe {
            ctx.device.create_sampler(&create_info, None)
                .map_err(|e| engine_err!("strata::vulkan", "Failed to create sampler: {:?}", e))
        }
    }
}

impl Drop for SamplerCache {
    fn drop(&mut self) {
        for (_, sampler) in self.cache.drain() {
            unsafe { self.ctx.device.destroy_sampler(sampler, None); }
        }
    }
}
