/// Uploader - flush state running inline uploads through staging buffers

use std::sync::Arc;
use strata_gpu::engine_warn;
use strata_gpu::strata::gpu::{DeferredUpload, FlushState, IRect, Texture, WritePixels};

use crate::vulkan_gpu::VulkanGpu;

const LOG_SOURCE: &str = "strata::vulkan::uploader";

/// Flush state handed to `inline_upload`
///
/// Each write copies through a fresh staging buffer that stays alive until
/// the next [`VulkanGpu::flush`].
pub struct VulkanUploader {
    gpu: Arc<VulkanGpu>,
}

impl VulkanUploader {
    pub(crate) fn new(gpu: Arc<VulkanGpu>) -> Self {
        Self { gpu }
    }
}

impl FlushState for VulkanUploader {
    fn do_upload(&self, upload: DeferredUpload) {
        let mut writer = StagingWriter { gpu: &self.gpu };
        upload(&mut writer);
    }
}

struct StagingWriter<'a> {
    gpu: &'a VulkanGpu,
}

impl WritePixels for StagingWriter<'_> {
    fn write_pixels(&mut self, texture: &Arc<dyn Texture>, rect: IRect, data: &[u8]) -> bool {
        match self.gpu.write_pixels(texture.as_ref(), rect, data) {
            Ok(()) => true,
            Err(e) => {
                engine_warn!(LOG_SOURCE, "Pixel upload to {:?} failed: {}", rect, e);
                false
            }
        }
    }
}
