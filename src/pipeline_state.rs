//! The pipeline-descriptor surface the pipeline cache keys on and builds
//! from (§4.10). Plain data, independent of how it was produced upstream.

use crate::crosswalk::{BlendFactor, CompareFunction, CullMode, PrimitiveType, VertexFormat, Winding};
use crate::format::PixelFormat;
use ash::vk;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct VertexAttribute {
  pub location: u32,
  pub binding: u32,
  pub format: VertexFormat,
  pub offset: u32,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct VertexBinding {
  pub binding: u32,
  pub stride: u32,
  pub per_instance: bool,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ColorBlendAttachment {
  pub blend_enable: bool,
  pub src_color: BlendFactor,
  pub dst_color: BlendFactor,
  pub src_alpha: BlendFactor,
  pub dst_alpha: BlendFactor,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct DepthStencilState {
  pub depth_test_enable: bool,
  pub depth_write_enable: bool,
  pub depth_compare: CompareFunction,
}

/// The fixed-function and shader-stage state a `VkPipeline` is built from.
/// Everything the spec marks dynamic (viewport, scissor, depth bias, blend
/// constants, stencil reference) is intentionally absent.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct RenderPipelineDescriptor {
  pub vertex_shader_identity: u64,
  pub fragment_shader_identity: Option<u64>,
  pub vertex_bindings: Vec<VertexBinding>,
  pub vertex_attributes: Vec<VertexAttribute>,
  pub primitive_type: PrimitiveType,
  pub cull_mode: CullMode,
  pub winding: Winding,
  pub color_blend: Vec<ColorBlendAttachment>,
  pub depth_stencil: Option<DepthStencilState>,
}

/// The render-target shape a pipeline is compatible with: formats, sample
/// counts, and resolve presence only (§4.10) — not the actual image
/// handles, which change every frame.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct SubpassShape {
  pub color_formats: Vec<Option<(PixelFormat, u32, bool)>>,
  pub depth_stencil_format: Option<(PixelFormat, u32)>,
  pub subpass_index: u32,
}

impl SubpassShape {
  /// Two shapes are compatible iff, on every slot present on both sides,
  /// format/sample-count/resolve-presence match, and any slots beyond the
  /// shorter side's length are nil on the longer side (§4.10).
  pub fn compatible_with(&self, other: &SubpassShape) -> bool {
    if self.subpass_index != other.subpass_index || self.depth_stencil_format != other.depth_stencil_format {
      return false;
    }
    let len = self.color_formats.len().max(other.color_formats.len());
    for i in 0..len {
      let a = self.color_formats.get(i).copied().flatten();
      let b = other.color_formats.get(i).copied().flatten();
      if a != b {
        return false;
      }
    }
    true
  }
}

pub fn blend_attachment_state(attachment: &ColorBlendAttachment) -> vk::PipelineColorBlendAttachmentState {
  vk::PipelineColorBlendAttachmentState::builder()
    .blend_enable(attachment.blend_enable)
    .src_color_blend_factor(attachment.src_color.to_vk())
    .dst_color_blend_factor(attachment.dst_color.to_vk())
    .color_blend_op(vk::BlendOp::ADD)
    .src_alpha_blend_factor(attachment.src_alpha.to_vk())
    .dst_alpha_blend_factor(attachment.dst_alpha.to_vk())
    .alpha_blend_op(vk::BlendOp::ADD)
    .color_write_mask(vk::ColorComponentFlags::RGBA)
    .build()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn shape(color_formats: Vec<Option<(PixelFormat, u32, bool)>>) -> SubpassShape {
    SubpassShape { color_formats, depth_stencil_format: None, subpass_index: 0 }
  }

  #[test]
  fn trailing_nil_slots_on_longer_side_are_compatible() {
    let a = shape(vec![Some((PixelFormat::Rgba8Unorm, 1, false))]);
    let b = shape(vec![Some((PixelFormat::Rgba8Unorm, 1, false)), None]);
    assert!(a.compatible_with(&b));
  }

  #[test]
  fn mismatched_format_is_incompatible() {
    let a = shape(vec![Some((PixelFormat::Rgba8Unorm, 1, false))]);
    let b = shape(vec![Some((PixelFormat::Bgra8Unorm, 1, false))]);
    assert!(!a.compatible_with(&b));
  }

  #[test]
  fn mismatched_sample_count_is_incompatible() {
    let a = shape(vec![Some((PixelFormat::Rgba8Unorm, 1, false))]);
    let b = shape(vec![Some((PixelFormat::Rgba8Unorm, 4, false))]);
    assert!(!a.compatible_with(&b));
  }
}
