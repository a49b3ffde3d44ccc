//! GPU command recording module
//!
//! Backend-agnostic collaborator traits and the segmenting command buffer
//! built on them.

// Module declarations
pub mod geometry;
pub mod render_pass;
pub mod image;
pub mod buffer;
pub mod mesh;
pub mod pipeline;
pub mod command_buffer;
pub mod pipeline_state;
pub mod resource_provider;
pub mod device;
pub mod upload;
pub mod resource_state;
pub mod segment;
pub mod gpu_command_buffer;
mod segment_draw;

#[cfg(test)]
pub(crate) mod mock_gpu;

// Re-export main types
pub use geometry::{FixedClip, IRect, Rect, SurfaceOrigin};
pub use render_pass::{
    AttachmentDesc, AttachmentsDescriptor, ClearValue, CompatibleRenderPassHandle,
    LoadAndStoreInfo, LoadOp, LoadStoreOps, RenderPass, StoreOp, TextureFormat,
};
pub use image::{
    AccessFlags, FilterMode, Image, ImageLayout, PipelineStageFlags, RenderTarget,
    StencilAttachment, Texture,
};
pub use buffer::Buffer;
pub use mesh::{DrawRange, Mesh, PrimitiveType};
pub use pipeline::{FragmentProcessor, Pipeline, PrimitiveProcessor, TextureAccess, XferProcessor};
pub use command_buffer::{ClearAspect, ClearAttachment, ClearRect, SecondaryCommandBuffer, Viewport};
pub use pipeline_state::PipelineState;
pub use resource_provider::{resolve_render_pass, ResourceProvider};
pub use device::{Config, Gpu, GpuStats};
pub use upload::{DeferredUpload, FlushState, InlineUpload, WritePixels};
pub use resource_state::{prepare_sampled_images, prepare_target_for_submit};
pub use segment::{Segment, SegmentState};
pub use gpu_command_buffer::{GpuCommandBuffer, SegmentCommandBuffer};
