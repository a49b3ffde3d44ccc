/// Draw pipeline description - processors, sampled textures and fixed state
///
/// A pipeline is the chain of processors a draw runs: the primitive processor
/// supplied per draw, the color and coverage fragment processors (each a tree
/// of nested children) and the final xfer (blend) processor.

use std::any::Any;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use rustc_hash::FxHasher;
use crate::gpu::geometry::IRect;
use crate::gpu::image::{FilterMode, Texture};

/// A texture sampled by a processor
#[derive(Clone)]
pub struct TextureAccess {
    pub texture: Arc<dyn Texture>,
    pub filter: FilterMode,
}

impl TextureAccess {
    pub fn new(texture: Arc<dyn Texture>, filter: FilterMode) -> Self {
        Self { texture, filter }
    }
}

impl std::fmt::Debug for TextureAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureAccess")
            .field("texture", &Arc::as_ptr(&self.texture).cast::<()>())
            .field("filter", &self.filter)
            .finish()
    }
}

/// Per-vertex computation and binding layout of a draw
///
/// Supplied by the caller for each draw call.
pub trait PrimitiveProcessor: Send + Sync {
    /// Stable name used in logs
    fn name(&self) -> &str;

    /// Textures sampled by the vertex stage
    fn texture_accesses(&self) -> &[TextureAccess];

    /// Key identifying the generated program for this processor
    fn program_key(&self) -> u64;

    /// Access the concrete type
    fn as_any(&self) -> &dyn Any;
}

/// Value-computation stage, possibly with nested child stages
#[derive(Debug, Clone)]
pub struct FragmentProcessor {
    name: String,
    texture_accesses: Vec<TextureAccess>,
    children: Vec<FragmentProcessor>,
}

impl FragmentProcessor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            texture_accesses: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_texture(mut self, access: TextureAccess) -> Self {
        self.texture_accesses.push(access);
        self
    }

    pub fn with_child(mut self, child: FragmentProcessor) -> Self {
        self.children.push(child);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn texture_accesses(&self) -> &[TextureAccess] {
        &self.texture_accesses
    }

    pub fn children(&self) -> &[FragmentProcessor] {
        &self.children
    }

    fn hash_into(&self, hasher: &mut FxHasher) {
        self.name.hash(hasher);
        self.texture_accesses.len().hash(hasher);
        for access in &self.texture_accesses {
            access.filter.hash(hasher);
        }
        self.children.len().hash(hasher);
        for child in &self.children {
            child.hash_into(hasher);
        }
    }
}

/// Final blend/transfer stage
#[derive(Debug, Clone)]
pub struct XferProcessor {
    name: String,
    texture_accesses: Vec<TextureAccess>,
}

impl XferProcessor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), texture_accesses: Vec::new() }
    }

    /// Xfer reading a copy of the destination
    pub fn with_dst_texture(mut self, access: TextureAccess) -> Self {
        self.texture_accesses.push(access);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn texture_accesses(&self) -> &[TextureAccess] {
        &self.texture_accesses
    }
}

impl Default for XferProcessor {
    fn default() -> Self {
        Self::new("SrcOver")
    }
}

/// Processor chain plus fixed-function state of a draw
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    pub color_fragment_processors: Vec<FragmentProcessor>,
    pub coverage_fragment_processors: Vec<FragmentProcessor>,
    pub xfer_processor: XferProcessor,
    /// Scissor in logical (origin-relative) coordinates
    pub scissor: Option<IRect>,
    /// Constant blend color, for xfers that use one
    pub blend_constant: Option<[f32; 4]>,
}

impl Pipeline {
    pub fn new(xfer_processor: XferProcessor) -> Self {
        Self { xfer_processor, ..Default::default() }
    }

    /// Every fragment processor, color stages first, each tree in pre-order
    pub fn fragment_processors(&self) -> FragmentProcessorIter<'_> {
        let mut stack: Vec<&FragmentProcessor> = Vec::new();
        for fp in self.coverage_fragment_processors.iter().rev() {
            stack.push(fp);
        }
        for fp in self.color_fragment_processors.iter().rev() {
            stack.push(fp);
        }
        FragmentProcessorIter { stack }
    }

    /// Key of the program this pipeline generates, independent of the primitive processor
    pub fn program_key(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.color_fragment_processors.len().hash(&mut hasher);
        for fp in &self.color_fragment_processors {
            fp.hash_into(&mut hasher);
        }
        self.coverage_fragment_processors.len().hash(&mut hasher);
        for fp in &self.coverage_fragment_processors {
            fp.hash_into(&mut hasher);
        }
        self.xfer_processor.name.hash(&mut hasher);
        self.xfer_processor.texture_accesses.len().hash(&mut hasher);
        hasher.finish()
    }
}

/// Depth-first walk over a pipeline's fragment processors
pub struct FragmentProcessorIter<'a> {
    stack: Vec<&'a FragmentProcessor>,
}

impl<'a> Iterator for FragmentProcessorIter<'a> {
    type Item = &'a FragmentProcessor;

    fn next(&mut self) -> Option<Self::Item> {
        let fp = self.stack.pop()?;
        for child in fp.children.iter().rev() {
            self.stack.push(child);
        }
        Some(fp)
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
