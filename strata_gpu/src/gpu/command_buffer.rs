/// SecondaryCommandBuffer trait - one segment's recorded command stream
///
/// A secondary command buffer is begun inside a render pass scope and later
/// replayed by the device inside a matching pass.

use std::any::Any;
use std::sync::Arc;
use crate::error::Result;
use crate::gpu::buffer::Buffer;
use crate::gpu::geometry::IRect;
use crate::gpu::image::RenderTarget;
use crate::gpu::render_pass::{ClearValue, RenderPass};

/// Aspect targeted by an attachment clear
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearAspect {
    /// Color attachment at the given render-pass index
    Color(u32),
    /// Stencil aspect of the stencil attachment
    Stencil,
}

/// One attachment clear inside a render pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearAttachment {
    pub aspect: ClearAspect,
    pub value: ClearValue,
}

/// Region cleared by an attachment clear, in device coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearRect {
    pub rect: IRect,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

impl ClearRect {
    /// Single-layer clear rectangle
    pub fn new(rect: IRect) -> Self {
        Self { rect, base_array_layer: 0, layer_count: 1 }
    }
}

/// Viewport dimensions and depth range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Viewport covering a whole `width x height` target
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Secondary command buffer recorded by one segment
pub trait SecondaryCommandBuffer: Send {
    /// Begin recording inside `render_pass` on `target`
    ///
    /// # Arguments
    ///
    /// * `target` - Render target whose attachments the pass addresses
    /// * `render_pass` - Render pass the commands will be replayed in
    fn begin(&mut self, target: &dyn RenderTarget, render_pass: &Arc<dyn RenderPass>) -> Result<()>;

    /// Stop recording
    fn end(&mut self) -> Result<()>;

    /// True between `begin` and `end`
    fn is_recording(&self) -> bool;

    /// Clear attachment regions inside the active pass
    ///
    /// # Arguments
    ///
    /// * `attachments` - Aspects and values to clear
    /// * `rects` - Device-space regions
    fn clear_attachments(&mut self, attachments: &[ClearAttachment], rects: &[ClearRect]) -> Result<()>;

    /// Bind a vertex buffer at binding 0
    fn bind_vertex_buffer(&mut self, buffer: &Arc<dyn Buffer>) -> Result<()>;

    /// Bind an index buffer (16-bit indices)
    fn bind_index_buffer(&mut self, buffer: &Arc<dyn Buffer>) -> Result<()>;

    /// Draw vertices
    ///
    /// # Arguments
    ///
    /// * `vertex_count` - Number of vertices to draw
    /// * `instance_count` - Number of instances
    /// * `first_vertex` - Index of first vertex
    /// * `first_instance` - Index of first instance
    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) -> Result<()>;

    /// Draw indexed vertices
    ///
    /// # Arguments
    ///
    /// * `index_count` - Number of indices to draw
    /// * `instance_count` - Number of instances
    /// * `first_index` - Index of first index
    /// * `vertex_offset` - Value added to vertex index before indexing into the vertex buffer
    /// * `first_instance` - Index of first instance
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Result<()>;

    /// Set the viewport
    fn set_viewport(&mut self, viewport: Viewport) -> Result<()>;

    /// Set the scissor rectangle (device coordinates)
    fn set_scissor(&mut self, scissor: IRect) -> Result<()>;

    /// Set the constant blend color
    fn set_blend_constants(&mut self, constants: [f32; 4]) -> Result<()>;

    /// Access the concrete backend type
    fn as_any(&self) -> &dyn Any;

    /// Mutable access to the concrete backend type
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
