/// Render-pass configuration types
///
/// A render pass pairs a target's attachment set with the load/store policy
/// applied to each attachment when a segment is replayed.

use std::any::Any;

/// Load operation for an attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadOp {
    /// Load existing content
    Load,
    /// Clear the content to the pass clear value
    Clear,
    /// Don't care about existing content
    DontCare,
}

/// Store operation for an attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// Store the rendered content
    Store,
    /// Don't care about storing the content
    DontCare,
}

/// Load/store pair for one attachment aspect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadStoreOps {
    pub load_op: LoadOp,
    pub store_op: StoreOp,
}

impl LoadStoreOps {
    /// Keep previous content and store the result
    pub const LOAD_STORE: LoadStoreOps = LoadStoreOps::new(LoadOp::Load, StoreOp::Store);
    /// Clear on load and store the result
    pub const CLEAR_STORE: LoadStoreOps = LoadStoreOps::new(LoadOp::Clear, StoreOp::Store);
    /// Previous content is undefined, store the result
    pub const DONT_CARE_STORE: LoadStoreOps = LoadStoreOps::new(LoadOp::DontCare, StoreOp::Store);

    pub const fn new(load_op: LoadOp, store_op: StoreOp) -> Self {
        Self { load_op, store_op }
    }
}

/// Initial load/store policy for one aspect, with the clear color used when
/// `load_op` is `Clear`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadAndStoreInfo {
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_color: [f32; 4],
}

impl LoadAndStoreInfo {
    pub const fn new(load_op: LoadOp, store_op: StoreOp, clear_color: [f32; 4]) -> Self {
        Self { load_op, store_op, clear_color }
    }

    /// Load and store, clear color transparent black
    pub const fn load_store() -> Self {
        Self::new(LoadOp::Load, StoreOp::Store, [0.0; 4])
    }

    pub fn ops(&self) -> LoadStoreOps {
        LoadStoreOps::new(self.load_op, self.store_op)
    }
}

impl Default for LoadAndStoreInfo {
    fn default() -> Self {
        Self::load_store()
    }
}

/// Clear value passed to an attachment clear or to a render-pass begin
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    /// RGBA color (0.0 - 1.0)
    Color([f32; 4]),
    /// Depth and stencil values
    DepthStencil { depth: f32, stencil: u32 },
}

/// Attachment pixel formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum TextureFormat {
    // Color formats
    R8_UNORM,
    R8G8B8A8_UNORM,
    R8G8B8A8_SRGB,
    B8G8R8A8_UNORM,
    B8G8R8A8_SRGB,
    R16G16B16A16_SFLOAT,

    // Stencil formats
    S8_UINT,
    D24_UNORM_S8_UINT,
    D32_SFLOAT_S8_UINT,
}

impl TextureFormat {
    /// True for formats carrying a stencil aspect
    pub fn has_stencil(&self) -> bool {
        matches!(
            self,
            TextureFormat::S8_UINT | TextureFormat::D24_UNORM_S8_UINT | TextureFormat::D32_SFLOAT_S8_UINT
        )
    }

    /// True for formats carrying a depth aspect
    pub fn has_depth(&self) -> bool {
        matches!(self, TextureFormat::D24_UNORM_S8_UINT | TextureFormat::D32_SFLOAT_S8_UINT)
    }
}

/// Descriptor for a single attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentDesc {
    /// Pixel format
    pub format: TextureFormat,
    /// Number of samples (1 = no MSAA)
    pub samples: u32,
}

/// Attachment set of a render target
///
/// Two render passes are compatible exactly when their descriptors are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentsDescriptor {
    pub color: AttachmentDesc,
    pub stencil: Option<AttachmentDesc>,
}

impl AttachmentsDescriptor {
    /// Attachment index of the color attachment
    pub fn color_index(&self) -> u32 {
        0
    }

    /// Attachment index of the stencil attachment, if any
    pub fn stencil_index(&self) -> Option<u32> {
        self.stencil.map(|_| 1)
    }

    pub fn attachment_count(&self) -> u32 {
        1 + self.stencil.is_some() as u32
    }
}

/// Identity of a set of mutually compatible render passes
///
/// Handed out by the resource provider and cached on render targets so that
/// lookups skip re-describing the attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CompatibleRenderPassHandle(Option<u32>);

impl CompatibleRenderPassHandle {
    pub const fn new(index: u32) -> Self {
        Self(Some(index))
    }

    /// A handle that refers to no compatible set
    pub const fn invalid() -> Self {
        Self(None)
    }

    pub fn is_valid(&self) -> bool {
        self.0.is_some()
    }

    pub fn index(&self) -> Option<u32> {
        self.0
    }
}

/// Render-pass configuration trait
///
/// Implemented by each backend. Instances are shared between the resource
/// provider cache and the segments that use them.
pub trait RenderPass: Send + Sync {
    /// Attachment set this pass addresses
    fn attachments(&self) -> &AttachmentsDescriptor;

    /// Load/store policy of the color attachment
    fn color_ops(&self) -> LoadStoreOps;

    /// Load/store policy of the stencil attachment
    fn stencil_ops(&self) -> LoadStoreOps;

    /// Index of the color attachment, if the pass has one
    fn color_attachment_index(&self) -> Option<u32> {
        Some(self.attachments().color_index())
    }

    /// Index of the stencil attachment, if the pass has one
    fn stencil_attachment_index(&self) -> Option<u32> {
        self.attachments().stencil_index()
    }

    /// Check whether `other` addresses the same attachment set
    ///
    /// # Arguments
    ///
    /// * `other` - Render pass to compare against
    fn is_compatible(&self, other: &dyn RenderPass) -> bool {
        self.attachments() == other.attachments()
    }

    /// Access the concrete backend type
    fn as_any(&self) -> &dyn Any;
}

#[cfg(test)]
#[path = "render_pass_tests.rs"]
mod tests;
