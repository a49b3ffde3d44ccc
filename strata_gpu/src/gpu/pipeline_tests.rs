/// Unit tests for pipeline.rs

use crate::gpu::image::FilterMode;
use crate::gpu::mock_gpu::MockTexture;
use crate::gpu::pipeline::*;

fn names(pipeline: &Pipeline) -> Vec<String> {
    pipeline.fragment_processors().map(|fp| fp.name().to_string()).collect()
}

// ============================================================================
// Fragment processor walk
// ============================================================================

#[test]
fn test_fragment_processors_empty() {
    let pipeline = Pipeline::default();
    assert_eq!(pipeline.fragment_processors().count(), 0);
    assert_eq!(pipeline.xfer_processor.name(), "SrcOver");
}

#[test]
fn test_fragment_processors_pre_order_with_children() {
    let mut pipeline = Pipeline::default();
    pipeline.color_fragment_processors.push(
        FragmentProcessor::new("compose")
            .with_child(FragmentProcessor::new("gradient").with_child(FragmentProcessor::new("colorizer")))
            .with_child(FragmentProcessor::new("image")),
    );
    pipeline.color_fragment_processors.push(FragmentProcessor::new("modulate"));
    pipeline.coverage_fragment_processors.push(FragmentProcessor::new("aa_rect"));

    assert_eq!(
        names(&pipeline),
        vec!["compose", "gradient", "colorizer", "image", "modulate", "aa_rect"]
    );
}

// ============================================================================
// Program key
// ============================================================================

#[test]
fn test_program_key_stable_for_equal_chains() {
    let build = || {
        let mut p = Pipeline::new(XferProcessor::new("Porter-Duff"));
        p.color_fragment_processors.push(FragmentProcessor::new("a").with_child(FragmentProcessor::new("b")));
        p
    };
    assert_eq!(build().program_key(), build().program_key());
}

#[test]
fn test_program_key_differs_by_structure() {
    let mut nested = Pipeline::default();
    nested.color_fragment_processors.push(FragmentProcessor::new("a").with_child(FragmentProcessor::new("b")));

    let mut flat = Pipeline::default();
    flat.color_fragment_processors.push(FragmentProcessor::new("a"));
    flat.color_fragment_processors.push(FragmentProcessor::new("b"));

    assert_ne!(nested.program_key(), flat.program_key());
}

#[test]
fn test_program_key_ignores_fixed_state() {
    let mut a = Pipeline::default();
    let mut b = Pipeline::default();
    a.blend_constant = Some([1.0; 4]);
    b.scissor = Some(crate::gpu::geometry::IRect::from_xywh(0, 0, 4, 4));
    assert_eq!(a.program_key(), b.program_key());
}

#[test]
fn test_texture_access_on_processors() {
    let texture = MockTexture::new(1);
    let fp = FragmentProcessor::new("image").with_texture(TextureAccess::new(texture.clone(), FilterMode::MipMap));
    assert_eq!(fp.texture_accesses().len(), 1);
    assert_eq!(fp.texture_accesses()[0].filter, FilterMode::MipMap);

    let xp = XferProcessor::new("dst_read").with_dst_texture(TextureAccess::new(texture, FilterMode::Nearest));
    assert_eq!(xp.texture_accesses().len(), 1);
}
