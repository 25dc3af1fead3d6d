//! Enum crosswalks (§6): total mappings from the backend's closed domain
//! enums onto their `ash::vk` equivalents. Each one must stay total — a
//! variant added to either side without its counterpart is a compile
//! error via the exhaustive `match`.

use ash::vk;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum PrimitiveType {
  Point,
  Line,
  LineStrip,
  Triangle,
  TriangleStrip,
}

impl PrimitiveType {
  pub fn to_vk(self) -> vk::PrimitiveTopology {
    match self {
      Self::Point => vk::PrimitiveTopology::POINT_LIST,
      Self::Line => vk::PrimitiveTopology::LINE_LIST,
      Self::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
      Self::Triangle => vk::PrimitiveTopology::TRIANGLE_LIST,
      Self::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
    }
  }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum BlendFactor {
  Zero,
  One,
  SrcColor,
  OneMinusSrcColor,
  DstColor,
  OneMinusDstColor,
  SrcAlpha,
  OneMinusSrcAlpha,
  DstAlpha,
  OneMinusDstAlpha,
  Src1Color,
  OneMinusSrc1Color,
  Src1Alpha,
  OneMinusSrc1Alpha,
  ConstantColor,
  OneMinusConstantColor,
  ConstantAlpha,
  OneMinusConstantAlpha,
  SrcAlphaSaturate,
}

impl BlendFactor {
  pub fn to_vk(self) -> vk::BlendFactor {
    match self {
      Self::Zero => vk::BlendFactor::ZERO,
      Self::One => vk::BlendFactor::ONE,
      Self::SrcColor => vk::BlendFactor::SRC_COLOR,
      Self::OneMinusSrcColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
      Self::DstColor => vk::BlendFactor::DST_COLOR,
      Self::OneMinusDstColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
      Self::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
      Self::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
      Self::DstAlpha => vk::BlendFactor::DST_ALPHA,
      Self::OneMinusDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
      Self::Src1Color => vk::BlendFactor::SRC1_COLOR,
      Self::OneMinusSrc1Color => vk::BlendFactor::ONE_MINUS_SRC1_COLOR,
      Self::Src1Alpha => vk::BlendFactor::SRC1_ALPHA,
      Self::OneMinusSrc1Alpha => vk::BlendFactor::ONE_MINUS_SRC1_ALPHA,
      Self::ConstantColor => vk::BlendFactor::CONSTANT_COLOR,
      Self::OneMinusConstantColor => vk::BlendFactor::ONE_MINUS_CONSTANT_COLOR,
      Self::ConstantAlpha => vk::BlendFactor::CONSTANT_ALPHA,
      Self::OneMinusConstantAlpha => vk::BlendFactor::ONE_MINUS_CONSTANT_ALPHA,
      Self::SrcAlphaSaturate => vk::BlendFactor::SRC_ALPHA_SATURATE,
    }
  }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum CompareFunction {
  Always,
  Never,
  Less,
  LessEqual,
  Equal,
  Greater,
  NotEqual,
  GreaterEqual,
}

impl CompareFunction {
  pub fn to_vk(self) -> vk::CompareOp {
    match self {
      Self::Always => vk::CompareOp::ALWAYS,
      Self::Never => vk::CompareOp::NEVER,
      Self::Less => vk::CompareOp::LESS,
      Self::LessEqual => vk::CompareOp::LESS_OR_EQUAL,
      Self::Equal => vk::CompareOp::EQUAL,
      Self::Greater => vk::CompareOp::GREATER,
      Self::NotEqual => vk::CompareOp::NOT_EQUAL,
      Self::GreaterEqual => vk::CompareOp::GREATER_OR_EQUAL,
    }
  }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum CullMode {
  None,
  Front,
  Back,
}

impl CullMode {
  pub fn to_vk(self) -> vk::CullModeFlags {
    match self {
      Self::None => vk::CullModeFlags::NONE,
      Self::Front => vk::CullModeFlags::FRONT,
      Self::Back => vk::CullModeFlags::BACK,
    }
  }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Winding {
  Clockwise,
  CounterClockwise,
}

impl Winding {
  pub fn to_vk(self) -> vk::FrontFace {
    match self {
      Self::Clockwise => vk::FrontFace::CLOCKWISE,
      Self::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
    }
  }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum SamplerAddressMode {
  Repeat,
  MirrorRepeat,
  ClampToEdge,
  ClampToBorder,
  MirrorClampToEdge,
}

impl SamplerAddressMode {
  pub fn to_vk(self) -> vk::SamplerAddressMode {
    match self {
      Self::Repeat => vk::SamplerAddressMode::REPEAT,
      Self::MirrorRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
      Self::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
      Self::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
      Self::MirrorClampToEdge => vk::SamplerAddressMode::MIRROR_CLAMP_TO_EDGE,
    }
  }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum VertexFormat {
  U8,
  U8x2,
  U8x3,
  U8x4,
  U8Norm,
  U8x2Norm,
  U8x3Norm,
  U8x4Norm,
  I8,
  I8x2,
  I8x3,
  I8x4,
  I8Norm,
  I8x2Norm,
  I8x3Norm,
  I8x4Norm,
  U16,
  U16x2,
  U16x3,
  U16x4,
  U16Norm,
  U16x2Norm,
  U16x3Norm,
  U16x4Norm,
  I16,
  I16x2,
  I16x3,
  I16x4,
  I16Norm,
  I16x2Norm,
  I16x3Norm,
  I16x4Norm,
  U32,
  U32x2,
  U32x3,
  U32x4,
  I32,
  I32x2,
  I32x3,
  I32x4,
  F16,
  F16x2,
  F16x3,
  F16x4,
  F32,
  F32x2,
  F32x3,
  F32x4,
  /// Packed `A2B10G10R10` unsigned-normalized, e.g. compressed normals.
  Unorm10_10_10_2,
}

impl VertexFormat {
  pub fn to_vk(self) -> vk::Format {
    use VertexFormat::*;
    match self {
      U8 => vk::Format::R8_UINT,
      U8x2 => vk::Format::R8G8_UINT,
      U8x3 => vk::Format::R8G8B8_UINT,
      U8x4 => vk::Format::R8G8B8A8_UINT,
      U8Norm => vk::Format::R8_UNORM,
      U8x2Norm => vk::Format::R8G8_UNORM,
      U8x3Norm => vk::Format::R8G8B8_UNORM,
      U8x4Norm => vk::Format::R8G8B8A8_UNORM,
      I8 => vk::Format::R8_SINT,
      I8x2 => vk::Format::R8G8_SINT,
      I8x3 => vk::Format::R8G8B8_SINT,
      I8x4 => vk::Format::R8G8B8A8_SINT,
      I8Norm => vk::Format::R8_SNORM,
      I8x2Norm => vk::Format::R8G8_SNORM,
      I8x3Norm => vk::Format::R8G8B8_SNORM,
      I8x4Norm => vk::Format::R8G8B8A8_SNORM,
      U16 => vk::Format::R16_UINT,
      U16x2 => vk::Format::R16G16_UINT,
      U16x3 => vk::Format::R16G16B16_UINT,
      U16x4 => vk::Format::R16G16B16A16_UINT,
      U16Norm => vk::Format::R16_UNORM,
      U16x2Norm => vk::Format::R16G16_UNORM,
      U16x3Norm => vk::Format::R16G16B16_UNORM,
      U16x4Norm => vk::Format::R16G16B16A16_UNORM,
      I16 => vk::Format::R16_SINT,
      I16x2 => vk::Format::R16G16_SINT,
      I16x3 => vk::Format::R16G16B16_SINT,
      I16x4 => vk::Format::R16G16B16A16_SINT,
      I16Norm => vk::Format::R16_SNORM,
      I16x2Norm => vk::Format::R16G16_SNORM,
      I16x3Norm => vk::Format::R16G16B16_SNORM,
      I16x4Norm => vk::Format::R16G16B16A16_SNORM,
      U32 => vk::Format::R32_UINT,
      U32x2 => vk::Format::R32G32_UINT,
      U32x3 => vk::Format::R32G32B32_UINT,
      U32x4 => vk::Format::R32G32B32A32_UINT,
      I32 => vk::Format::R32_SINT,
      I32x2 => vk::Format::R32G32_SINT,
      I32x3 => vk::Format::R32G32B32_SINT,
      I32x4 => vk::Format::R32G32B32A32_SINT,
      F16 => vk::Format::R16_SFLOAT,
      F16x2 => vk::Format::R16G16_SFLOAT,
      F16x3 => vk::Format::R16G16B16_SFLOAT,
      F16x4 => vk::Format::R16G16B16A16_SFLOAT,
      F32 => vk::Format::R32_SFLOAT,
      F32x2 => vk::Format::R32G32_SFLOAT,
      F32x3 => vk::Format::R32G32B32_SFLOAT,
      F32x4 => vk::Format::R32G32B32A32_SFLOAT,
      Unorm10_10_10_2 => vk::Format::A2B10G10R10_UNORM_PACK32,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn winding_crosswalk_is_total() {
    assert_eq!(Winding::Clockwise.to_vk(), vk::FrontFace::CLOCKWISE);
    assert_eq!(Winding::CounterClockwise.to_vk(), vk::FrontFace::COUNTER_CLOCKWISE);
  }

  #[test]
  fn cull_mode_none_maps_to_vk_none() {
    assert_eq!(CullMode::None.to_vk(), vk::CullModeFlags::NONE);
  }

  #[test]
  fn primitive_type_crosswalk_covers_strips() {
    assert_eq!(PrimitiveType::TriangleStrip.to_vk(), vk::PrimitiveTopology::TRIANGLE_STRIP);
    assert_eq!(PrimitiveType::LineStrip.to_vk(), vk::PrimitiveTopology::LINE_STRIP);
  }
}
