/*!
# Strata GPU

Deferred command recording for the Strata rendering stack.

Draws, clears, discards, stencil-clip clears and inline uploads are recorded
against one render target into a sequence of secondary command buffers
(segments), each bound to a render-pass configuration. Full-target clears and
discards on an untouched segment fold into the pass's load ops; uploads split
the stream so they always run before the commands recorded after them.

## Architecture

- **GpuCommandBuffer**: Recording interface, one implementation per backend family
- **SegmentCommandBuffer**: Segmenting implementation over the collaborator traits
- **Gpu**: Device services (resolve, mip generation, segment replay, stats)
- **ResourceProvider**: Render-pass, pipeline-state and command-buffer caches
- **RenderTarget / Texture / Image**: Resources owning their layout state

Backend crates (Vulkan, ...) implement the collaborator traits and hand out
command buffers from their device.
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod gpu;

// Main strata namespace module
pub mod strata {
    // Error types
    pub use crate::error::{Error, Result};

    // Engine-wide services (logger)
    pub use crate::engine::Engine;

    // Logging sub-module (types only, macros are exported at the crate root)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // Command recording sub-module
    pub mod gpu {
        pub use crate::gpu::*;
    }
}
