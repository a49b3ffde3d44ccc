/// Geometry buffer trait

use std::any::Any;

/// Vertex or index buffer bound by draws
pub trait Buffer: Send + Sync {
    /// Size in bytes
    fn size(&self) -> u64;

    /// True when the data lives in host memory only and cannot be bound
    fn is_cpu_backed(&self) -> bool;

    /// True while the buffer is mapped for host writes
    fn is_mapped(&self) -> bool;

    /// Access the concrete backend type
    fn as_any(&self) -> &dyn Any;
}
