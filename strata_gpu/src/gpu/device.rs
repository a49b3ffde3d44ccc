/// Gpu trait - device services used while recording and submitting segments

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use crate::error::Result;
use crate::gpu::command_buffer::SecondaryCommandBuffer;
use crate::gpu::geometry::IRect;
use crate::gpu::image::{RenderTarget, Texture};
use crate::gpu::render_pass::{ClearValue, RenderPass};
use crate::gpu::resource_provider::ResourceProvider;

/// Device configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Enable validation layers (debug builds)
    pub enable_validation: bool,

    /// Application name
    pub app_name: String,

    /// Application version
    pub app_version: (u32, u32, u32),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable_validation: cfg!(debug_assertions),
            app_name: "Strata Application".to_string(),
            app_version: (1, 0, 0),
        }
    }
}

/// Device counters
#[derive(Debug, Default)]
pub struct GpuStats {
    draws: AtomicU64,
    segments_submitted: AtomicU64,
    segments_dropped: AtomicU64,
}

impl GpuStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_draws(&self) {
        self.draws.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_segments_submitted(&self) {
        self.segments_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_segments_dropped(&self) {
        self.segments_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Draw commands issued
    pub fn draws(&self) -> u64 {
        self.draws.load(Ordering::Relaxed)
    }

    /// Segments replayed against the device
    pub fn segments_submitted(&self) -> u64 {
        self.segments_submitted.load(Ordering::Relaxed)
    }

    /// Segments skipped because their bounds missed the target
    pub fn segments_dropped(&self) -> u64 {
        self.segments_dropped.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.draws.store(0, Ordering::Relaxed);
        self.segments_submitted.store(0, Ordering::Relaxed);
        self.segments_dropped.store(0, Ordering::Relaxed);
    }
}

/// Device used by command recording
///
/// Selected once when the device context is created; command buffers hold a
/// shared reference to it for their whole lifetime.
pub trait Gpu: Send + Sync {
    /// Shared resource caches
    fn resource_provider(&self) -> &dyn ResourceProvider;

    /// Resolve pending multisampled content of `target` into its single-sampled image
    ///
    /// No-op when the target does not need a resolve.
    fn resolve_render_target(&self, target: &dyn RenderTarget);

    /// Regenerate the mip chain of `texture` from level 0
    fn generate_mipmap(&self, texture: &dyn Texture);

    /// Replay a recorded segment inside a render pass on `target`
    ///
    /// # Arguments
    ///
    /// * `command_buffer` - Ended secondary command buffer
    /// * `render_pass` - Render pass of the segment
    /// * `clear_value` - Color clear value used by a `Clear` load op
    /// * `target` - Render target
    /// * `bounds` - Render area, already clipped to the target
    fn submit_secondary_command_buffer(
        &self,
        command_buffer: &dyn SecondaryCommandBuffer,
        render_pass: &Arc<dyn RenderPass>,
        clear_value: &ClearValue,
        target: &dyn RenderTarget,
        bounds: IRect,
    ) -> Result<()>;

    /// Device counters
    fn stats(&self) -> &GpuStats;

    /// Access the concrete backend type
    fn as_any(&self) -> &dyn Any;
}
