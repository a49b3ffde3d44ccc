//! Unit tests for resource_state.rs

use crate::gpu::image::{AccessFlags, FilterMode, Image, ImageLayout, PipelineStageFlags, RenderTarget, Texture};
use crate::gpu::mock_gpu::*;
use crate::gpu::pipeline::{FragmentProcessor, Pipeline, TextureAccess};
use crate::gpu::resource_state::*;

fn layout_requests(gpu: &MockGpu) -> Vec<(String, ImageLayout)> {
    gpu.events()
        .into_iter()
        .filter_map(|e| match e {
            MockEvent::LayoutRequest { image, layout, .. } => Some((image, layout)),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Target transitions
// ============================================================================

#[test]
fn test_target_without_stencil_transitions_color_only() {
    let gpu = MockGpu::new();
    let rt = MockRenderTarget::new("rt", 8, 8);

    prepare_target_for_submit(gpu.as_ref(), &rt);

    assert_eq!(layout_requests(&gpu), vec![("rt".to_string(), ImageLayout::ColorAttachment)]);
    assert_eq!(rt.image().current_layout(), ImageLayout::ColorAttachment);
}

#[test]
fn test_msaa_target_transitions_msaa_image() {
    let gpu = MockGpu::new();
    let rt = MockRenderTarget::new("rt", 8, 8).with_msaa().with_stencil(8);

    prepare_target_for_submit(gpu.as_ref(), &rt);

    assert_eq!(
        gpu.events(),
        vec![
            MockEvent::LayoutRequest {
                image: "rt.msaa".to_string(),
                layout: ImageLayout::ColorAttachment,
                access: AccessFlags::COLOR_ATTACHMENT_WRITE,
                stage: PipelineStageFlags::ALL_GRAPHICS,
            },
            MockEvent::LayoutRequest {
                image: "rt.stencil".to_string(),
                layout: ImageLayout::DepthStencilAttachment,
                access: AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                stage: PipelineStageFlags::ALL_GRAPHICS,
            },
        ]
    );
    // The resolve image is not an attachment of the pass
    assert_eq!(rt.image().current_layout(), ImageLayout::Undefined);
}

#[test]
fn test_target_transition_requested_every_time() {
    let gpu = MockGpu::new();
    let rt = MockRenderTarget::new("rt", 8, 8);

    prepare_target_for_submit(gpu.as_ref(), &rt);
    prepare_target_for_submit(gpu.as_ref(), &rt);

    assert_eq!(layout_requests(&gpu).len(), 2);
}

// ============================================================================
// Sampled images
// ============================================================================

#[test]
fn test_distinct_textures_counted_once() {
    let gpu = MockGpu::new();
    let texture = MockTexture::new(1);
    let other = MockTexture::new(2);

    let primitive_processor = MockPrimitiveProcessor::new()
        .with_texture(TextureAccess::new(texture.clone(), FilterMode::Nearest))
        .with_texture(TextureAccess::new(texture.clone(), FilterMode::Bilerp));
    let mut pipeline = Pipeline::default();
    pipeline
        .coverage_fragment_processors
        .push(FragmentProcessor::new("mask").with_texture(TextureAccess::new(other.clone(), FilterMode::Nearest)));

    let prepared = prepare_sampled_images(gpu.as_ref(), &primitive_processor, &pipeline);

    assert_eq!(prepared, 2);
    assert_eq!(
        layout_requests(&gpu),
        vec![
            ("texture1".to_string(), ImageLayout::ShaderReadOnly),
            ("texture2".to_string(), ImageLayout::ShaderReadOnly),
        ]
    );
}

#[test]
fn test_mipmap_access_anywhere_regenerates_shared_texture() {
    let gpu = MockGpu::new();
    let texture = MockTexture::new(3);
    texture.set_mip_maps_dirty(true);

    let primitive_processor = MockPrimitiveProcessor::new().with_texture(TextureAccess::new(texture.clone(), FilterMode::Nearest));
    let mut pipeline = Pipeline::default();
    pipeline
        .color_fragment_processors
        .push(FragmentProcessor::new("image").with_texture(TextureAccess::new(texture.clone(), FilterMode::MipMap)));

    prepare_sampled_images(gpu.as_ref(), &primitive_processor, &pipeline);

    assert_eq!(
        gpu.events()[0],
        MockEvent::GenerateMipmap("texture3".to_string())
    );
    assert!(!texture.mip_maps_dirty());
    assert_eq!(texture.current_layout(), ImageLayout::ShaderReadOnly);
}

#[test]
fn test_clean_render_target_texture_not_resolved() {
    let gpu = MockGpu::new();
    let texture = MockTexture::with_render_target(6, MockRenderTarget::new("offscreen", 4, 4));

    let primitive_processor = MockPrimitiveProcessor::new().with_texture(TextureAccess::new(texture.clone(), FilterMode::Nearest));
    prepare_sampled_images(gpu.as_ref(), &primitive_processor, &Pipeline::default());

    assert!(!gpu.events().iter().any(|e| matches!(e, MockEvent::Resolve(_))));
}
