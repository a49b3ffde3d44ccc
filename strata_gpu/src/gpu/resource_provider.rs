/// ResourceProvider trait - shared caches of render passes, pipeline states
/// and secondary command buffers
///
/// Caches do their own locking. Lookups are blocking and synchronous.

use std::sync::Arc;
use crate::error::Result;
use crate::gpu::command_buffer::SecondaryCommandBuffer;
use crate::gpu::image::RenderTarget;
use crate::gpu::mesh::PrimitiveType;
use crate::gpu::pipeline::{Pipeline, PrimitiveProcessor};
use crate::gpu::pipeline_state::PipelineState;
use crate::gpu::render_pass::{CompatibleRenderPassHandle, LoadStoreOps, RenderPass};

/// Backend resource caches consumed by command recording
pub trait ResourceProvider: Send + Sync {
    /// Render pass for `target`'s attachment set with the given ops
    ///
    /// # Arguments
    ///
    /// * `target` - Render target describing the attachments
    /// * `color_ops` - Color attachment load/store policy
    /// * `stencil_ops` - Stencil attachment load/store policy
    fn find_render_pass(
        &self,
        target: &dyn RenderTarget,
        color_ops: LoadStoreOps,
        stencil_ops: LoadStoreOps,
    ) -> Result<Arc<dyn RenderPass>>;

    /// Render pass from an already-resolved compatible set
    ///
    /// # Arguments
    ///
    /// * `handle` - Valid compatible-set handle
    /// * `color_ops` - Color attachment load/store policy
    /// * `stencil_ops` - Stencil attachment load/store policy
    fn find_compatible_render_pass(
        &self,
        handle: CompatibleRenderPassHandle,
        color_ops: LoadStoreOps,
        stencil_ops: LoadStoreOps,
    ) -> Result<Arc<dyn RenderPass>>;

    /// Secondary command buffer ready to begin, `None` when the pool is exhausted
    fn find_or_create_secondary_command_buffer(&self) -> Option<Box<dyn SecondaryCommandBuffer>>;

    /// Hand a secondary command buffer back to the pool
    ///
    /// The pool must not reuse it before the device has finished executing it.
    fn recycle_secondary_command_buffer(&self, command_buffer: Box<dyn SecondaryCommandBuffer>);

    /// Pipeline state compatible with `render_pass`, `None` when it cannot be built
    ///
    /// # Arguments
    ///
    /// * `pipeline` - Processor chain and fixed state
    /// * `primitive_processor` - Primitive processor of the draw
    /// * `primitive_type` - Topology to compile for
    /// * `render_pass` - Render pass the draw is recorded in
    fn find_or_create_compatible_pipeline_state(
        &self,
        pipeline: &Pipeline,
        primitive_processor: &dyn PrimitiveProcessor,
        primitive_type: PrimitiveType,
        render_pass: &dyn RenderPass,
    ) -> Option<Arc<dyn PipelineState>>;
}

/// Resolve the render pass a segment on `target` should use
///
/// Goes through the target's compatible-set handle when it has a valid one,
/// otherwise describes the target's attachments.
pub fn resolve_render_pass(
    provider: &dyn ResourceProvider,
    target: &dyn RenderTarget,
    color_ops: LoadStoreOps,
    stencil_ops: LoadStoreOps,
) -> Result<Arc<dyn RenderPass>> {
    let handle = target.compatible_render_pass_handle();
    if handle.is_valid() {
        provider.find_compatible_render_pass(handle, color_ops, stencil_ops)
    } else {
        provider.find_render_pass(target, color_ops, stencil_ops)
    }
}
