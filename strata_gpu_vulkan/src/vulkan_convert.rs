/// Conversions from strata core types to Vulkan enums and structs
///
/// Pure functions, usable without a device.

use ash::vk;
use strata_gpu::strata::gpu::{
    AccessFlags, ClearValue, FilterMode, IRect, ImageLayout, LoadOp, PipelineStageFlags,
    PrimitiveType, StoreOp, TextureFormat,
};

/// Convert TextureFormat to Vulkan format
pub fn format_to_vk(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::R8_UNORM => vk::Format::R8_UNORM,
        TextureFormat::R8G8B8A8_UNORM => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::R8G8B8A8_SRGB => vk::Format::R8G8B8A8_SRGB,
        TextureFormat::B8G8R8A8_UNORM => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::B8G8R8A8_SRGB => vk::Format::B8G8R8A8_SRGB,
        TextureFormat::R16G16B16A16_SFLOAT => vk::Format::R16G16B16A16_SFLOAT,
        TextureFormat::S8_UINT => vk::Format::S8_UINT,
        TextureFormat::D24_UNORM_S8_UINT => vk::Format::D24_UNORM_S8_UINT,
        TextureFormat::D32_SFLOAT_S8_UINT => vk::Format::D32_SFLOAT_S8_UINT,
    }
}

/// Bytes per pixel of a color format, `None` for stencil formats
pub fn bytes_per_pixel(format: TextureFormat) -> Option<u32> {
    match format {
        TextureFormat::R8_UNORM => Some(1),
        TextureFormat::R8G8B8A8_UNORM
        | TextureFormat::R8G8B8A8_SRGB
        | TextureFormat::B8G8R8A8_UNORM
        | TextureFormat::B8G8R8A8_SRGB => Some(4),
        TextureFormat::R16G16B16A16_SFLOAT => Some(8),
        TextureFormat::S8_UINT | TextureFormat::D24_UNORM_S8_UINT | TextureFormat::D32_SFLOAT_S8_UINT => None,
    }
}

/// Image aspects carried by a format
pub fn aspect_mask(format: TextureFormat) -> vk::ImageAspectFlags {
    let mut mask = vk::ImageAspectFlags::empty();
    if format.has_depth() {
        mask |= vk::ImageAspectFlags::DEPTH;
    }
    if format.has_stencil() {
        mask |= vk::ImageAspectFlags::STENCIL;
    }
    if mask.is_empty() {
        vk::ImageAspectFlags::COLOR
    } else {
        mask
    }
}

/// Convert LoadOp to Vulkan
pub fn load_op_to_vk(load_op: LoadOp) -> vk::AttachmentLoadOp {
    match load_op {
        LoadOp::Load => vk::AttachmentLoadOp::LOAD,
        LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
        LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
    }
}

/// Convert StoreOp to Vulkan
pub fn store_op_to_vk(store_op: StoreOp) -> vk::AttachmentStoreOp {
    match store_op {
        StoreOp::Store => vk::AttachmentStoreOp::STORE,
        StoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
    }
}

/// Convert ImageLayout to Vulkan
pub fn image_layout_to_vk(layout: ImageLayout) -> vk::ImageLayout {
    match layout {
        ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
        ImageLayout::General => vk::ImageLayout::GENERAL,
        ImageLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ImageLayout::DepthStencilAttachment => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ImageLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ImageLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ImageLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    }
}

/// Convert access flags to Vulkan
pub fn access_flags_to_vk(access: AccessFlags) -> vk::AccessFlags {
    let mut flags = vk::AccessFlags::empty();
    let mapping = [
        (AccessFlags::COLOR_ATTACHMENT_READ, vk::AccessFlags::COLOR_ATTACHMENT_READ),
        (AccessFlags::COLOR_ATTACHMENT_WRITE, vk::AccessFlags::COLOR_ATTACHMENT_WRITE),
        (AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ, vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ),
        (AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE, vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE),
        (AccessFlags::SHADER_READ, vk::AccessFlags::SHADER_READ),
        (AccessFlags::TRANSFER_READ, vk::AccessFlags::TRANSFER_READ),
        (AccessFlags::TRANSFER_WRITE, vk::AccessFlags::TRANSFER_WRITE),
        (AccessFlags::HOST_WRITE, vk::AccessFlags::HOST_WRITE),
        (AccessFlags::MEMORY_READ, vk::AccessFlags::MEMORY_READ),
    ];
    for (ours, theirs) in mapping {
        if access.contains(ours) {
            flags |= theirs;
        }
    }
    flags
}

/// Convert pipeline stage flags to Vulkan
///
/// An empty set maps to TOP_OF_PIPE, which Vulkan requires for a first use.
pub fn stage_flags_to_vk(stage: PipelineStageFlags) -> vk::PipelineStageFlags {
    let mut flags = vk::PipelineStageFlags::empty();
    let mapping = [
        (PipelineStageFlags::TOP_OF_PIPE, vk::PipelineStageFlags::TOP_OF_PIPE),
        (PipelineStageFlags::VERTEX_SHADER, vk::PipelineStageFlags::VERTEX_SHADER),
        (PipelineStageFlags::FRAGMENT_SHADER, vk::PipelineStageFlags::FRAGMENT_SHADER),
        (PipelineStageFlags::EARLY_FRAGMENT_TESTS, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS),
        (PipelineStageFlags::LATE_FRAGMENT_TESTS, vk::PipelineStageFlags::LATE_FRAGMENT_TESTS),
        (PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT),
        (PipelineStageFlags::TRANSFER, vk::PipelineStageFlags::TRANSFER),
        (PipelineStageFlags::HOST, vk::PipelineStageFlags::HOST),
        (PipelineStageFlags::ALL_GRAPHICS, vk::PipelineStageFlags::ALL_GRAPHICS),
        (PipelineStageFlags::BOTTOM_OF_PIPE, vk::PipelineStageFlags::BOTTOM_OF_PIPE),
    ];
    for (ours, theirs) in mapping {
        if stage.contains(ours) {
            flags |= theirs;
        }
    }
    if flags.is_empty() {
        vk::PipelineStageFlags::TOP_OF_PIPE
    } else {
        flags
    }
}

/// Convert a sample count to Vulkan (unsupported counts fall back to 1)
pub fn sample_count_to_vk(samples: u32) -> vk::SampleCountFlags {
    match samples {
        2 => vk::SampleCountFlags::TYPE_2,
        4 => vk::SampleCountFlags::TYPE_4,
        8 => vk::SampleCountFlags::TYPE_8,
        16 => vk::SampleCountFlags::TYPE_16,
        _ => vk::SampleCountFlags::TYPE_1,
    }
}

/// Convert PrimitiveType to Vulkan topology
pub fn topology_to_vk(primitive_type: PrimitiveType) -> vk::PrimitiveTopology {
    match primitive_type {
        PrimitiveType::Triangles => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveType::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        PrimitiveType::TriangleFan => vk::PrimitiveTopology::TRIANGLE_FAN,
        PrimitiveType::Points => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveType::Lines => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveType::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
    }
}

/// Sampler filters for a filter mode: (mag/min filter, mipmap mode, uses mips)
pub fn filter_to_vk(filter: FilterMode) -> (vk::Filter, vk::SamplerMipmapMode, bool) {
    match filter {
        FilterMode::Nearest => (vk::Filter::NEAREST, vk::SamplerMipmapMode::NEAREST, false),
        FilterMode::Bilerp => (vk::Filter::LINEAR, vk::SamplerMipmapMode::NEAREST, false),
        FilterMode::MipMap => (vk::Filter::LINEAR, vk::SamplerMipmapMode::LINEAR, true),
    }
}

/// Convert an integer rectangle to a Vulkan 2D rect (inverted rects become empty)
pub fn rect_to_vk(rect: IRect) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: rect.left, y: rect.top },
        extent: vk::Extent2D {
            width: rect.width().max(0) as u32,
            height: rect.height().max(0) as u32,
        },
    }
}

/// Convert a clear value to Vulkan
pub fn clear_value_to_vk(value: &ClearValue) -> vk::ClearValue {
    match *value {
        ClearValue::Color(color) => vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        },
        ClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
        },
    }
}

/// Number of mip levels of a full chain for a `width x height` image
pub fn full_mip_chain(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

#[cfg(test)]
#[path = "vulkan_convert_tests.rs"]
mod tests;
