//! GpuCommandBuffer - deferred recording of clears, draws and uploads for one
//! render target
//!
//! [`SegmentCommandBuffer`] splits the recorded stream into segments, one per
//! render-pass configuration. Operations on an untouched segment fold into its
//! load ops where possible; anything else is recorded as explicit commands.
//! Nothing reaches the device before [`GpuCommandBuffer::submit`].

use std::sync::Arc;
use crate::error::Result;
use crate::gpu::command_buffer::{ClearAspect, ClearAttachment, ClearRect};
use crate::gpu::device::Gpu;
use crate::gpu::geometry::{FixedClip, IRect, Rect};
use crate::gpu::image::RenderTarget;
use crate::gpu::mesh::Mesh;
use crate::gpu::pipeline::{Pipeline, PrimitiveProcessor};
use crate::gpu::render_pass::{ClearValue, LoadAndStoreInfo, LoadStoreOps};
use crate::gpu::resource_provider::resolve_render_pass;
use crate::gpu::resource_state::prepare_target_for_submit;
use crate::gpu::segment::{Segment, SegmentState};
use crate::gpu::upload::{DeferredUpload, FlushState, InlineUpload};
use crate::{engine_debug, engine_error, engine_trace, engine_warn};

pub(crate) const LOG_SOURCE: &str = "strata::SegmentCommandBuffer";

/// Deferred command recording against one render target
///
/// One implementation exists per backend family; the device hands out the
/// right one when a command buffer is created.
pub trait GpuCommandBuffer: Send {
    /// Target all operations draw into
    fn render_target(&self) -> &Arc<dyn RenderTarget>;

    /// Clear the color attachment inside `clip` to `color` (RGBA)
    fn clear(&mut self, clip: &FixedClip, color: [f32; 4]) -> Result<()>;

    /// Declare the whole target's previous contents undefined
    fn discard(&mut self) -> Result<()>;

    /// Reset the stencil clip bit inside `clip`
    ///
    /// # Arguments
    ///
    /// * `clip` - Region to clear
    /// * `inside_stencil_mask` - Set the clip bit (true) or clear all bits (false)
    fn clear_stencil_clip(&mut self, clip: &FixedClip, inside_stencil_mask: bool) -> Result<()>;

    /// Record a draw of `meshes`
    ///
    /// # Arguments
    ///
    /// * `pipeline` - Processor chain and fixed state
    /// * `primitive_processor` - Per-vertex computation of the draw
    /// * `meshes` - Geometry, drawn in order
    /// * `bounds` - Bounding rectangle of the geometry in target space
    fn draw(
        &mut self,
        pipeline: &Pipeline,
        primitive_processor: &dyn PrimitiveProcessor,
        meshes: &[Mesh],
        bounds: &Rect,
    ) -> Result<()>;

    /// Schedule an upload to run before any later-recorded command
    fn inline_upload(&mut self, flush_state: Arc<dyn FlushState>, upload: DeferredUpload) -> Result<()>;

    /// Stop recording
    fn end(&mut self) -> Result<()>;

    /// Replay everything recorded against the device
    fn submit(&mut self) -> Result<()>;
}

/// Segmenting command buffer over backend-provided collaborators
pub struct SegmentCommandBuffer {
    pub(crate) gpu: Arc<dyn Gpu>,
    pub(crate) render_target: Arc<dyn RenderTarget>,
    pub(crate) segments: Vec<Segment>,
}

impl SegmentCommandBuffer {
    /// Begin recording on `render_target`
    ///
    /// Creates the first segment with the caller's initial load/store policy.
    ///
    /// # Arguments
    ///
    /// * `gpu` - Device providing the caches
    /// * `render_target` - Target every segment draws into
    /// * `color_info` - Initial color policy and clear color
    /// * `stencil_info` - Initial stencil policy (clear color ignored)
    pub fn new(
        gpu: Arc<dyn Gpu>,
        render_target: Arc<dyn RenderTarget>,
        color_info: LoadAndStoreInfo,
        stencil_info: LoadAndStoreInfo,
    ) -> Result<Self> {
        let mut command_buffer = Self {
            gpu,
            render_target,
            segments: Vec::new(),
        };
        command_buffer.push_segment(color_info.ops(), stencil_info.ops(), color_info.clear_color)?;
        Ok(command_buffer)
    }

    /// Segments in creation order; the last one is current
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn gpu(&self) -> &Arc<dyn Gpu> {
        &self.gpu
    }

    pub(crate) fn current(&mut self) -> &mut Segment {
        let index = self.segments.len() - 1;
        &mut self.segments[index]
    }

    fn push_segment(&mut self, color_ops: LoadStoreOps, stencil_ops: LoadStoreOps, clear_color: [f32; 4]) -> Result<()> {
        let provider = self.gpu.resource_provider();
        let render_pass = resolve_render_pass(provider, self.render_target.as_ref(), color_ops, stencil_ops)?;

        let mut command_buffer = provider.find_or_create_secondary_command_buffer();
        match command_buffer.as_mut() {
            Some(cb) => cb.begin(self.render_target.as_ref(), &render_pass)?,
            None => engine_warn!(LOG_SOURCE, "No secondary command buffer available, segment {} records nothing", self.segments.len()),
        }

        self.segments.push(Segment::new(command_buffer, render_pass, clear_color));
        Ok(())
    }

    /// Swap the current segment's render pass for a compatible one with new ops
    fn refold_render_pass(&mut self, color_ops: LoadStoreOps, stencil_ops: LoadStoreOps) -> Result<()> {
        let render_pass = resolve_render_pass(
            self.gpu.resource_provider(),
            self.render_target.as_ref(),
            color_ops,
            stencil_ops,
        )?;
        let segment = self.current();
        debug_assert!(segment.is_empty, "render pass swapped on a segment with recorded commands");
        debug_assert!(
            render_pass.is_compatible(segment.render_pass.as_ref()),
            "render pass swapped for an incompatible one"
        );
        // Dropping the old Arc releases our reference to it
        segment.render_pass = render_pass;
        Ok(())
    }

    /// End the current segment and open a new one that keeps prior content
    fn add_additional_segment(&mut self) -> Result<()> {
        self.end_current()?;
        self.push_segment(LoadStoreOps::LOAD_STORE, LoadStoreOps::LOAD_STORE, [0.0; 4])?;
        engine_trace!(LOG_SOURCE, "Started segment {}", self.segments.len() - 1);
        Ok(())
    }

    /// Recording into a segment that was already replayed is a contract violation
    fn debug_assert_recording(&self, operation: &str) {
        debug_assert!(
            self.segments.last().is_some_and(|s| s.state == SegmentState::Recording),
            "{} recorded after the current segment was ended or submitted",
            operation
        );
    }

    fn end_current(&mut self) -> Result<()> {
        let segment = self.current();
        if segment.state != SegmentState::Recording {
            return Ok(());
        }
        if let Some(cb) = segment.command_buffer.as_mut() {
            if cb.is_recording() {
                cb.end()?;
            }
        }
        segment.state = SegmentState::Ended;
        Ok(())
    }

    /// Record an explicit attachment clear on the current segment
    fn record_clear(&mut self, clip: &FixedClip, attachment: ClearAttachment) -> Result<()> {
        let target = self.render_target.clone();
        let (width, height) = (target.width(), target.height());
        let region = clip.region(width, height);
        let full = IRect::from_size(width, height);
        let Some(device_rect) = target.origin().to_device(&region, height).intersection(&full) else {
            engine_trace!(LOG_SOURCE, "Clear outside target ignored");
            return Ok(());
        };

        let segment = self.current();
        match segment.command_buffer.as_mut() {
            Some(cb) => {
                cb.clear_attachments(&[attachment], &[ClearRect::new(device_rect)])?;
                segment.is_empty = false;
            }
            None => engine_warn!(LOG_SOURCE, "Clear dropped, segment has no command buffer"),
        }
        segment.bounds.join(&region.to_rect());
        Ok(())
    }
}

impl GpuCommandBuffer for SegmentCommandBuffer {
    fn render_target(&self) -> &Arc<dyn RenderTarget> {
        &self.render_target
    }

    fn clear(&mut self, clip: &FixedClip, color: [f32; 4]) -> Result<()> {
        self.debug_assert_recording("clear");
        let full = self.render_target.bounds_rect();
        let covers = clip.covers_target(self.render_target.width(), self.render_target.height());

        if self.current().is_empty && covers {
            self.refold_render_pass(LoadStoreOps::CLEAR_STORE, LoadStoreOps::LOAD_STORE)?;
            let segment = self.current();
            segment.clear_color = color;
            segment.starts_with_clear = true;
            segment.bounds.join(&full);
            engine_trace!(LOG_SOURCE, "Clear folded into load op of segment {}", self.segments.len() - 1);
            return Ok(());
        }

        let color_index = self.current().render_pass.color_attachment_index();
        debug_assert!(color_index.is_some(), "render pass has no color attachment");
        let attachment = ClearAttachment {
            aspect: ClearAspect::Color(color_index.unwrap_or(0)),
            value: ClearValue::Color(color),
        };
        self.record_clear(clip, attachment)
    }

    fn discard(&mut self) -> Result<()> {
        self.debug_assert_recording("discard");
        if !self.current().is_empty {
            return Ok(());
        }
        // startsWithClear is left as is: a pending folded clear is overridden here
        self.refold_render_pass(LoadStoreOps::DONT_CARE_STORE, LoadStoreOps::DONT_CARE_STORE)
    }

    fn clear_stencil_clip(&mut self, clip: &FixedClip, inside_stencil_mask: bool) -> Result<()> {
        self.debug_assert_recording("clear_stencil_clip");
        let bits = self.render_target.stencil_attachment().map(|s| s.bits());
        debug_assert!(bits.is_some(), "stencil clip clear without a stencil attachment");
        debug_assert!(
            self.current().render_pass.stencil_attachment_index().is_some(),
            "render pass has no stencil attachment"
        );

        let stencil = match bits {
            Some(bits) if inside_stencil_mask && bits > 0 => 1u32 << (bits - 1),
            _ => 0,
        };
        let attachment = ClearAttachment {
            aspect: ClearAspect::Stencil,
            value: ClearValue::DepthStencil { depth: 0.0, stencil },
        };
        self.record_clear(clip, attachment)
    }

    fn draw(
        &mut self,
        pipeline: &Pipeline,
        primitive_processor: &dyn PrimitiveProcessor,
        meshes: &[Mesh],
        bounds: &Rect,
    ) -> Result<()> {
        self.debug_assert_recording("draw");
        self.on_draw(pipeline, primitive_processor, meshes, bounds)
    }

    fn inline_upload(&mut self, flush_state: Arc<dyn FlushState>, upload: DeferredUpload) -> Result<()> {
        self.debug_assert_recording("inline_upload");
        if !self.current().is_empty {
            self.add_additional_segment()?;
        }
        self.current().uploads.push(InlineUpload::new(flush_state, upload));
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.end_current()
    }

    fn submit(&mut self) -> Result<()> {
        if self.current().state == SegmentState::Submitted {
            debug_assert!(false, "command buffer submitted twice");
            return Ok(());
        }
        self.end_current()?;

        let gpu = self.gpu.as_ref();
        let target = self.render_target.as_ref();
        prepare_target_for_submit(gpu, target);

        let extent = target.bounds_rect();
        let mut first_error = None;
        for (index, segment) in self.segments.iter_mut().enumerate() {
            // Replayed by an earlier submit
            if segment.state == SegmentState::Submitted {
                continue;
            }
            for upload in segment.uploads.drain(..) {
                upload.execute();
            }

            let mut bounds = segment.bounds;
            if !bounds.intersect(&extent) {
                segment.state = SegmentState::Submitted;
                gpu.stats().inc_segments_dropped();
                engine_trace!(LOG_SOURCE, "Segment {} dropped, bounds outside target", index);
                continue;
            }

            let Some(cb) = segment.command_buffer.as_deref() else {
                segment.state = SegmentState::Submitted;
                engine_warn!(LOG_SOURCE, "Segment {} not replayed, no command buffer", index);
                continue;
            };
            let replayed = gpu.submit_secondary_command_buffer(
                cb,
                &segment.render_pass,
                &ClearValue::Color(segment.clear_color),
                target,
                bounds.round_out(),
            );
            match replayed {
                Ok(()) => {
                    segment.state = SegmentState::Submitted;
                    gpu.stats().inc_segments_submitted();
                }
                Err(e) => {
                    engine_error!(LOG_SOURCE, "Segment {} replay failed: {}", index, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        engine_debug!(LOG_SOURCE, "Submitted {} segment(s)", self.segments.len());
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for SegmentCommandBuffer {
    fn drop(&mut self) {
        let provider = self.gpu.resource_provider();
        for segment in self.segments.drain(..) {
            if let Some(cb) = segment.command_buffer {
                provider.recycle_secondary_command_buffer(cb);
            }
        }
    }
}

#[cfg(test)]
#[path = "gpu_command_buffer_tests.rs"]
mod tests;
