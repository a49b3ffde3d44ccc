/// SegmentCommandBuffer draw path - sampled-image preparation, pipeline-state
/// resolution, geometry binding and per-range draw issue

use std::sync::Arc;
use crate::error::Result;
use crate::gpu::command_buffer::{SecondaryCommandBuffer, Viewport};
use crate::gpu::device::Gpu;
use crate::gpu::geometry::{IRect, Rect};
use crate::gpu::gpu_command_buffer::{SegmentCommandBuffer, LOG_SOURCE};
use crate::gpu::image::RenderTarget;
use crate::gpu::mesh::{DrawRange, Mesh, PrimitiveType};
use crate::gpu::pipeline::{Pipeline, PrimitiveProcessor};
use crate::gpu::pipeline_state::PipelineState;
use crate::gpu::render_pass::RenderPass;
use crate::gpu::resource_state::prepare_sampled_images;
use crate::{engine_trace, engine_warn};

impl SegmentCommandBuffer {
    pub(crate) fn on_draw(
        &mut self,
        pipeline: &Pipeline,
        primitive_processor: &dyn PrimitiveProcessor,
        meshes: &[Mesh],
        bounds: &Rect,
    ) -> Result<()> {
        let Some(first_mesh) = meshes.first() else {
            return Ok(());
        };

        let gpu = self.gpu.as_ref();
        let target = self.render_target.as_ref();
        let index = self.segments.len() - 1;
        let segment = &mut self.segments[index];
        let Some(cb) = segment.command_buffer.as_deref_mut() else {
            engine_warn!(LOG_SOURCE, "Draw dropped, segment {} has no command buffer", index);
            return Ok(());
        };

        prepare_sampled_images(gpu, primitive_processor, pipeline);

        let mut primitive_type = first_mesh.primitive_type();
        let Some(mut pipeline_state) = prepare_draw_state(
            gpu,
            target,
            cb,
            segment.render_pass.as_ref(),
            pipeline,
            primitive_processor,
            primitive_type,
        )?
        else {
            return Ok(());
        };
        segment.bounds.join(bounds);

        for mesh in meshes {
            for range in mesh.draw_ranges() {
                if range.primitive_type != primitive_type {
                    pipeline_state.free_temp_resources(gpu);
                    primitive_type = range.primitive_type;
                    pipeline_state = match prepare_draw_state(
                        gpu,
                        target,
                        cb,
                        segment.render_pass.as_ref(),
                        pipeline,
                        primitive_processor,
                        primitive_type,
                    )? {
                        Some(state) => state,
                        None => return Ok(()),
                    };
                }

                if range.is_indexed() {
                    let Ok(vertex_offset) = i32::try_from(range.start_vertex) else {
                        debug_assert!(false, "vertex offset {} exceeds i32", range.start_vertex);
                        engine_warn!(LOG_SOURCE, "Indexed range dropped, vertex offset {} exceeds i32", range.start_vertex);
                        continue;
                    };
                    bind_geometry(cb, &range)?;
                    cb.draw_indexed(range.index_count, 1, range.start_index, vertex_offset, 0)?;
                } else {
                    bind_geometry(cb, &range)?;
                    cb.draw(range.vertex_count, 1, range.start_vertex, 0)?;
                }
                segment.is_empty = false;
                gpu.stats().inc_draws();
            }
        }

        pipeline_state.free_temp_resources(gpu);
        Ok(())
    }
}

/// Resolve, fill and bind the pipeline state for one topology
///
/// `None` means the cache could not build one; the caller drops the rest of
/// the draw.
fn prepare_draw_state(
    gpu: &dyn Gpu,
    target: &dyn RenderTarget,
    cb: &mut dyn SecondaryCommandBuffer,
    render_pass: &dyn RenderPass,
    pipeline: &Pipeline,
    primitive_processor: &dyn PrimitiveProcessor,
    primitive_type: PrimitiveType,
) -> Result<Option<Arc<dyn PipelineState>>> {
    let Some(state) = gpu.resource_provider().find_or_create_compatible_pipeline_state(
        pipeline,
        primitive_processor,
        primitive_type,
        render_pass,
    ) else {
        engine_trace!(
            LOG_SOURCE,
            "No pipeline state for {} ({:?}), draw dropped",
            primitive_processor.name(),
            primitive_type
        );
        return Ok(None);
    };

    if let Err(e) = state.set_data(gpu, primitive_processor, pipeline) {
        engine_warn!(LOG_SOURCE, "Pipeline state data upload failed, draw dropped: {}", e);
        state.free_temp_resources(gpu);
        return Ok(None);
    }
    state.bind(gpu, cb)?;
    set_dynamic_state(cb, target, pipeline)?;
    Ok(Some(state))
}

/// Viewport, scissor and blend constants for a draw
pub(crate) fn set_dynamic_state(
    cb: &mut dyn SecondaryCommandBuffer,
    target: &dyn RenderTarget,
    pipeline: &Pipeline,
) -> Result<()> {
    let (width, height) = (target.width(), target.height());
    let full = IRect::from_size(width, height);

    let scissor = match pipeline.scissor {
        Some(rect) if !rect.contains(&full) => target
            .origin()
            .to_device(&rect, height)
            .intersection(&full)
            .unwrap_or_default(),
        _ => full,
    };
    cb.set_scissor(scissor)?;
    cb.set_viewport(Viewport::full(width, height))?;

    if let Some(constants) = pipeline.blend_constant {
        cb.set_blend_constants(constants)?;
    }
    Ok(())
}

fn bind_geometry(cb: &mut dyn SecondaryCommandBuffer, range: &DrawRange<'_>) -> Result<()> {
    // Host writes are made visible by the queue submission itself
    debug_assert!(!range.vertex_buffer.is_cpu_backed(), "cpu-backed vertex buffer bound");
    debug_assert!(!range.vertex_buffer.is_mapped(), "vertex buffer bound while mapped");
    cb.bind_vertex_buffer(range.vertex_buffer)?;

    if let Some(index_buffer) = range.index_buffer {
        debug_assert!(!index_buffer.is_cpu_backed(), "cpu-backed index buffer bound");
        debug_assert!(!index_buffer.is_mapped(), "index buffer bound while mapped");
        cb.bind_index_buffer(index_buffer)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "segment_draw_tests.rs"]
mod tests;
