/// Mesh descriptions consumed by draws
///
/// A mesh is either a single (optionally indexed) range or a repeated
/// instance pattern. Draws never issue hardware instancing: patterns are
/// expanded into successive plain ranges by [`Mesh::draw_ranges`].

use std::sync::Arc;
use crate::gpu::buffer::Buffer;

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Triangles,
    TriangleStrip,
    TriangleFan,
    Points,
    Lines,
    LineStrip,
}

/// Repeated instance pattern of a mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InstancePattern {
    vertices_per_instance: u32,
    indices_per_instance: u32,
    instance_count: u32,
    max_instances_per_draw: u32,
}

/// Geometry of one draw submission
#[derive(Clone)]
pub struct Mesh {
    primitive_type: PrimitiveType,
    vertex_buffer: Arc<dyn Buffer>,
    index_buffer: Option<Arc<dyn Buffer>>,
    start_vertex: u32,
    start_index: u32,
    vertex_count: u32,
    index_count: u32,
    pattern: Option<InstancePattern>,
}

impl Mesh {
    /// Non-indexed range of `vertex_count` vertices
    pub fn new(
        primitive_type: PrimitiveType,
        vertex_buffer: Arc<dyn Buffer>,
        start_vertex: u32,
        vertex_count: u32,
    ) -> Self {
        Self {
            primitive_type,
            vertex_buffer,
            index_buffer: None,
            start_vertex,
            start_index: 0,
            vertex_count,
            index_count: 0,
            pattern: None,
        }
    }

    /// Indexed range of `index_count` indices
    pub fn new_indexed(
        primitive_type: PrimitiveType,
        vertex_buffer: Arc<dyn Buffer>,
        index_buffer: Arc<dyn Buffer>,
        start_vertex: u32,
        start_index: u32,
        vertex_count: u32,
        index_count: u32,
    ) -> Self {
        Self {
            primitive_type,
            vertex_buffer,
            index_buffer: Some(index_buffer),
            start_vertex,
            start_index,
            vertex_count,
            index_count,
            pattern: None,
        }
    }

    /// Repeated indexed pattern
    ///
    /// Every instance uses `vertices_per_instance` consecutive vertices and
    /// the same `indices_per_instance` indices starting at `start_index`.
    /// At most `max_instances_per_draw` instances go into one range, which
    /// bounds the largest index the shared index pattern has to address.
    #[allow(clippy::too_many_arguments)]
    pub fn new_instanced(
        primitive_type: PrimitiveType,
        vertex_buffer: Arc<dyn Buffer>,
        index_buffer: Arc<dyn Buffer>,
        start_vertex: u32,
        start_index: u32,
        vertices_per_instance: u32,
        indices_per_instance: u32,
        instance_count: u32,
        max_instances_per_draw: u32,
    ) -> Self {
        debug_assert!(max_instances_per_draw > 0);
        debug_assert!(
            instance_count
                .checked_mul(vertices_per_instance)
                .and_then(|count| count.checked_add(start_vertex))
                .is_some(),
            "instanced mesh vertex range overflows u32"
        );
        debug_assert!(
            max_instances_per_draw.min(instance_count).checked_mul(indices_per_instance).is_some(),
            "instanced mesh index count overflows u32"
        );
        let first = instance_count.min(max_instances_per_draw);
        Self {
            primitive_type,
            vertex_buffer,
            index_buffer: Some(index_buffer),
            start_vertex,
            start_index,
            vertex_count: first.saturating_mul(vertices_per_instance),
            index_count: first.saturating_mul(indices_per_instance),
            pattern: Some(InstancePattern {
                vertices_per_instance,
                indices_per_instance,
                instance_count,
                max_instances_per_draw,
            }),
        }
    }

    pub fn primitive_type(&self) -> PrimitiveType {
        self.primitive_type
    }

    pub fn is_indexed(&self) -> bool {
        self.index_buffer.is_some()
    }

    pub fn is_instanced(&self) -> bool {
        self.pattern.is_some()
    }

    pub fn vertex_buffer(&self) -> &Arc<dyn Buffer> {
        &self.vertex_buffer
    }

    pub fn index_buffer(&self) -> Option<&Arc<dyn Buffer>> {
        self.index_buffer.as_ref()
    }

    /// Iterate the plain ranges this mesh draws
    pub fn draw_ranges(&self) -> DrawRanges<'_> {
        let remaining = match self.pattern {
            Some(p) => p.instance_count - p.instance_count.min(p.max_instances_per_draw),
            None => 0,
        };
        DrawRanges {
            mesh: self,
            next: Some(DrawRange {
                primitive_type: self.primitive_type,
                vertex_buffer: &self.vertex_buffer,
                index_buffer: self.index_buffer.as_ref(),
                start_vertex: self.start_vertex,
                vertex_count: self.vertex_count,
                start_index: self.start_index,
                index_count: self.index_count,
            }),
            instances_remaining: remaining,
        }
    }
}

/// One non-instanced draw
#[derive(Clone, Copy)]
pub struct DrawRange<'a> {
    pub primitive_type: PrimitiveType,
    pub vertex_buffer: &'a Arc<dyn Buffer>,
    pub index_buffer: Option<&'a Arc<dyn Buffer>>,
    pub start_vertex: u32,
    pub vertex_count: u32,
    pub start_index: u32,
    pub index_count: u32,
}

impl DrawRange<'_> {
    pub fn is_indexed(&self) -> bool {
        self.index_buffer.is_some()
    }
}

/// Iterator over the draw ranges of a mesh
pub struct DrawRanges<'a> {
    mesh: &'a Mesh,
    next: Option<DrawRange<'a>>,
    instances_remaining: u32,
}

impl<'a> Iterator for DrawRanges<'a> {
    type Item = DrawRange<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        if self.instances_remaining > 0 {
            if let Some(pattern) = self.mesh.pattern {
                let instances = self.instances_remaining.min(pattern.max_instances_per_draw);
                self.instances_remaining -= instances;
                self.next = Some(DrawRange {
                    start_vertex: current.start_vertex.saturating_add(current.vertex_count),
                    vertex_count: instances.saturating_mul(pattern.vertices_per_instance),
                    index_count: instances.saturating_mul(pattern.indices_per_instance),
                    ..current
                });
            }
        }
        Some(current)
    }
}

#[cfg(test)]
#[path = "mesh_tests.rs"]
mod tests;
