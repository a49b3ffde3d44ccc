/// Segment - one secondary command buffer scoped to one render-pass configuration

use std::sync::Arc;
use crate::gpu::command_buffer::SecondaryCommandBuffer;
use crate::gpu::geometry::Rect;
use crate::gpu::render_pass::{LoadStoreOps, RenderPass};
use crate::gpu::upload::InlineUpload;

/// Recording state of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// Current segment, accepting commands
    Recording,
    /// Frozen, waiting for submission
    Ended,
    /// Replayed (or dropped) by a submit
    Submitted,
}

/// One segment of a [`SegmentCommandBuffer`](crate::gpu::SegmentCommandBuffer)
///
/// `command_buffer` is `None` when the pool had nothing to hand out; such a
/// segment still folds clears and runs its uploads but records and replays
/// nothing.
pub struct Segment {
    pub(crate) command_buffer: Option<Box<dyn SecondaryCommandBuffer>>,
    pub(crate) render_pass: Arc<dyn RenderPass>,
    pub(crate) bounds: Rect,
    pub(crate) is_empty: bool,
    pub(crate) starts_with_clear: bool,
    pub(crate) clear_color: [f32; 4],
    pub(crate) uploads: Vec<InlineUpload>,
    pub(crate) state: SegmentState,
}

impl Segment {
    pub(crate) fn new(
        command_buffer: Option<Box<dyn SecondaryCommandBuffer>>,
        render_pass: Arc<dyn RenderPass>,
        clear_color: [f32; 4],
    ) -> Self {
        Self {
            command_buffer,
            render_pass,
            bounds: Rect::empty(),
            is_empty: true,
            starts_with_clear: false,
            clear_color,
            uploads: Vec::new(),
            state: SegmentState::Recording,
        }
    }

    /// Render pass the segment replays in
    pub fn render_pass(&self) -> &Arc<dyn RenderPass> {
        &self.render_pass
    }

    pub fn color_ops(&self) -> LoadStoreOps {
        self.render_pass.color_ops()
    }

    pub fn stencil_ops(&self) -> LoadStoreOps {
        self.render_pass.stencil_ops()
    }

    /// Recorded command stream, if one was acquired
    pub fn command_buffer(&self) -> Option<&dyn SecondaryCommandBuffer> {
        self.command_buffer.as_deref()
    }

    /// Union of everything the segment touched, in logical coordinates
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// True until a command beyond the bare begin is recorded
    pub fn is_empty(&self) -> bool {
        self.is_empty
    }

    /// True when a full-target clear was folded into the color load op
    pub fn starts_with_clear(&self) -> bool {
        self.starts_with_clear
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    /// Uploads still waiting to run
    pub fn pending_uploads(&self) -> usize {
        self.uploads.len()
    }

    pub fn state(&self) -> SegmentState {
        self.state
    }
}
