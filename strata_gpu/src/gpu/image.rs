/// Image resource traits - textures, render targets and stencil attachments
///
/// Images own their layout state. Recorders never cache it: they request the
/// layout they need right before use and the image no-ops when it already
/// matches.

use std::any::Any;
use bitflags::bitflags;
use crate::gpu::device::Gpu;
use crate::gpu::geometry::{Rect, SurfaceOrigin};
use crate::gpu::render_pass::{AttachmentsDescriptor, CompatibleRenderPassHandle};

/// Image layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    /// Undefined layout (initial state, contents may be discarded)
    Undefined,
    /// Layout usable by every operation, at reduced performance
    General,
    /// Layout for color attachment
    ColorAttachment,
    /// Layout for depth/stencil attachment
    DepthStencilAttachment,
    /// Layout for shader read-only access
    ShaderReadOnly,
    /// Layout for transfer source
    TransferSrc,
    /// Layout for transfer destination
    TransferDst,
}

bitflags! {
    /// Memory access scopes for layout transitions
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const COLOR_ATTACHMENT_READ = 1 << 0;
        const COLOR_ATTACHMENT_WRITE = 1 << 1;
        const DEPTH_STENCIL_ATTACHMENT_READ = 1 << 2;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 1 << 3;
        const SHADER_READ = 1 << 4;
        const TRANSFER_READ = 1 << 5;
        const TRANSFER_WRITE = 1 << 6;
        const HOST_WRITE = 1 << 7;
        const MEMORY_READ = 1 << 8;
    }
}

bitflags! {
    /// Pipeline stage scopes for layout transitions
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStageFlags: u32 {
        const TOP_OF_PIPE = 1 << 0;
        const VERTEX_SHADER = 1 << 1;
        const FRAGMENT_SHADER = 1 << 2;
        const EARLY_FRAGMENT_TESTS = 1 << 3;
        const LATE_FRAGMENT_TESTS = 1 << 4;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 5;
        const TRANSFER = 1 << 6;
        const HOST = 1 << 7;
        const ALL_GRAPHICS = 1 << 8;
        const BOTTOM_OF_PIPE = 1 << 9;
    }
}

/// Texture filtering mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Bilerp,
    /// Trilinear, requires a complete mip chain
    MipMap,
}

/// An image whose layout can be transitioned
pub trait Image: Send + Sync {
    /// Layout the image was last transitioned to
    fn current_layout(&self) -> ImageLayout;

    /// Request a layout transition before the image is used
    ///
    /// No-op when the image is already in `layout` with compatible access.
    ///
    /// # Arguments
    ///
    /// * `gpu` - Device recording the barrier
    /// * `layout` - Target layout
    /// * `access` - Access mask of the upcoming use
    /// * `stage` - Pipeline stages of the upcoming use
    /// * `discardable` - Previous contents may be thrown away
    fn request_layout(
        &self,
        gpu: &dyn Gpu,
        layout: ImageLayout,
        access: AccessFlags,
        stage: PipelineStageFlags,
        discardable: bool,
    );
}

/// Sampled image
pub trait Texture: Image {
    /// Render target view of this texture, if it is also drawn into
    fn as_render_target(&self) -> Option<&dyn RenderTarget>;

    /// True when the mip chain is stale relative to level 0
    fn mip_maps_dirty(&self) -> bool;

    /// Mark the mip chain stale (true) or regenerated (false)
    fn set_mip_maps_dirty(&self, dirty: bool);

    /// Access the concrete backend type
    fn as_any(&self) -> &dyn Any;
}

/// Stencil attachment of a render target
pub trait StencilAttachment: Image {
    /// Stencil bit depth
    fn bits(&self) -> u32;
}

/// Surface that segments draw into
pub trait RenderTarget: Send + Sync {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn origin(&self) -> SurfaceOrigin;

    /// Single-sampled color image
    fn image(&self) -> &dyn Image;

    /// Multisampled color image, when the target resolves into `image`
    fn msaa_image(&self) -> Option<&dyn Image>;

    /// Stencil attachment, if one is bound
    fn stencil_attachment(&self) -> Option<&dyn StencilAttachment>;

    /// Cached compatible-set identity, invalid when never looked up
    fn compatible_render_pass_handle(&self) -> CompatibleRenderPassHandle;

    /// Attachment set used when no valid compatible handle exists
    fn attachments(&self) -> AttachmentsDescriptor;

    /// True when multisampled content has not been resolved yet
    fn needs_resolve(&self) -> bool;

    /// Access the concrete backend type
    fn as_any(&self) -> &dyn Any;

    /// Image written by draws: the MSAA image when present
    fn color_attachment_image(&self) -> &dyn Image {
        self.msaa_image().unwrap_or_else(|| self.image())
    }

    /// Full extent as a float rectangle
    fn bounds_rect(&self) -> Rect {
        Rect::from_size(self.width(), self.height())
    }
}
