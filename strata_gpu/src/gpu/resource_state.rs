/// Image layout transitions requested around recording and submission
///
/// Nothing here caches layout state: every helper requests the layout it
/// needs right before use and the image decides whether a barrier is due.

use std::sync::Arc;
use crate::gpu::device::Gpu;
use crate::gpu::image::{AccessFlags, FilterMode, ImageLayout, PipelineStageFlags, RenderTarget, Texture};
use crate::gpu::pipeline::{Pipeline, PrimitiveProcessor, TextureAccess};

/// Make `target` writable as a color (and stencil) attachment
///
/// Transitions the multisampled image instead of the resolve image when the
/// target has one, since that is what the render pass draws into.
pub fn prepare_target_for_submit(gpu: &dyn Gpu, target: &dyn RenderTarget) {
    target.color_attachment_image().request_layout(
        gpu,
        ImageLayout::ColorAttachment,
        AccessFlags::COLOR_ATTACHMENT_WRITE,
        PipelineStageFlags::ALL_GRAPHICS,
        false,
    );

    if let Some(stencil) = target.stencil_attachment() {
        stencil.request_layout(
            gpu,
            ImageLayout::DepthStencilAttachment,
            AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            PipelineStageFlags::ALL_GRAPHICS,
            false,
        );
    }
}

/// A distinct texture sampled by a draw
struct SampledTexture<'a> {
    texture: &'a Arc<dyn Texture>,
    needs_mips: bool,
}

fn same_texture(a: &Arc<dyn Texture>, b: &Arc<dyn Texture>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

fn collect<'a>(sampled: &mut Vec<SampledTexture<'a>>, accesses: &'a [TextureAccess]) {
    for access in accesses {
        let needs_mips = access.filter == FilterMode::MipMap;
        match sampled.iter_mut().find(|s| same_texture(s.texture, &access.texture)) {
            Some(existing) => existing.needs_mips |= needs_mips,
            None => sampled.push(SampledTexture { texture: &access.texture, needs_mips }),
        }
    }
}

/// Ready every texture a draw samples for shader reads
///
/// Walks the primitive processor, every fragment processor (children
/// included) and the xfer processor. Each distinct texture is resolved when it
/// is also a render target with pending multisampled content, gets its mip
/// chain rebuilt when a mipmapped sampler reads it and the chain is dirty,
/// then is transitioned to shader-read-only.
///
/// Returns the number of distinct textures prepared.
pub fn prepare_sampled_images(
    gpu: &dyn Gpu,
    primitive_processor: &dyn PrimitiveProcessor,
    pipeline: &Pipeline,
) -> usize {
    let mut sampled = Vec::new();
    collect(&mut sampled, primitive_processor.texture_accesses());
    for fp in pipeline.fragment_processors() {
        collect(&mut sampled, fp.texture_accesses());
    }
    collect(&mut sampled, pipeline.xfer_processor.texture_accesses());

    for entry in &sampled {
        prepare_sampled_image(gpu, entry.texture.as_ref(), entry.needs_mips);
    }
    sampled.len()
}

fn prepare_sampled_image(gpu: &dyn Gpu, texture: &dyn Texture, needs_mips: bool) {
    if let Some(target) = texture.as_render_target() {
        if target.needs_resolve() {
            gpu.resolve_render_target(target);
        }
    }

    if needs_mips && texture.mip_maps_dirty() {
        gpu.generate_mipmap(texture);
        texture.set_mip_maps_dirty(false);
    }

    texture.request_layout(
        gpu,
        ImageLayout::ShaderReadOnly,
        AccessFlags::SHADER_READ,
        PipelineStageFlags::ALL_GRAPHICS,
        false,
    );
}

#[cfg(test)]
#[path = "resource_state_tests.rs"]
mod tests;
