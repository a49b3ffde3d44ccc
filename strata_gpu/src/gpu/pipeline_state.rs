/// PipelineState trait - compiled backend state for one draw configuration

use std::any::Any;
use crate::error::Result;
use crate::gpu::command_buffer::SecondaryCommandBuffer;
use crate::gpu::device::Gpu;
use crate::gpu::mesh::PrimitiveType;
use crate::gpu::pipeline::{Pipeline, PrimitiveProcessor};

/// Cached, compiled state for a (pipeline, primitive processor, topology,
/// render pass) tuple
///
/// The object itself stays in the provider cache between draws. Per-draw
/// resources (uniform data, descriptor sets) are temporary and released by
/// [`PipelineState::free_temp_resources`].
pub trait PipelineState: Send + Sync {
    /// Topology this state was compiled for
    fn primitive_type(&self) -> PrimitiveType;

    /// Upload per-draw uniforms and sampler bindings
    ///
    /// # Arguments
    ///
    /// * `gpu` - Device owning the state
    /// * `primitive_processor` - Primitive processor of the draw
    /// * `pipeline` - Processor chain of the draw
    fn set_data(&self, gpu: &dyn Gpu, primitive_processor: &dyn PrimitiveProcessor, pipeline: &Pipeline) -> Result<()>;

    /// Bind the compiled pipeline and its descriptor sets
    fn bind(&self, gpu: &dyn Gpu, command_buffer: &mut dyn SecondaryCommandBuffer) -> Result<()>;

    /// Release resources allocated by `set_data`
    fn free_temp_resources(&self, gpu: &dyn Gpu);

    /// Access the concrete backend type
    fn as_any(&self) -> &dyn Any;
}
