/// Deferred uploads scheduled between segments

use std::sync::Arc;
use crate::gpu::geometry::IRect;
use crate::gpu::image::Texture;

/// Writes pixel data into a texture on behalf of an upload
pub trait WritePixels {
    /// Write `data` (tightly packed rows) into `rect` of mip level 0
    ///
    /// Returns false when the write could not be scheduled.
    fn write_pixels(&mut self, texture: &Arc<dyn Texture>, rect: IRect, data: &[u8]) -> bool;
}

/// Upload body, run exactly once when its segment is submitted
pub type DeferredUpload = Box<dyn FnOnce(&mut dyn WritePixels) + Send>;

/// Flush context that produced an upload and knows how to run it
pub trait FlushState: Send + Sync {
    /// Run `upload` against this flush's pixel writer
    fn do_upload(&self, upload: DeferredUpload);
}

/// An upload waiting to run before its segment replays
pub struct InlineUpload {
    flush_state: Arc<dyn FlushState>,
    upload: DeferredUpload,
}

impl InlineUpload {
    pub fn new(flush_state: Arc<dyn FlushState>, upload: DeferredUpload) -> Self {
        Self { flush_state, upload }
    }

    /// Run the upload, consuming it
    pub fn execute(self) {
        self.flush_state.do_upload(self.upload);
    }
}
