//! Pixel format: a closed enum mapped bijectively onto `vk::Format`,
//! classified by predicates used throughout layout planning (§3).

use ash::vk;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum PixelFormat {
  R8Unorm,
  R8Snorm,
  R8Uint,
  R8Sint,
  Rg8Unorm,
  Rg8Snorm,
  Rg8Uint,
  Rg8Sint,
  Rgba8Unorm,
  Rgba8UnormSrgb,
  Rgba8Snorm,
  Rgba8Uint,
  Rgba8Sint,
  Bgra8Unorm,
  Bgra8UnormSrgb,
  R16Float,
  Rg16Float,
  Rgba16Float,
  R32Float,
  Rg32Float,
  Rgba32Float,
  R32Uint,
  R32Sint,
  Depth32Float,
  Depth24UnormStencil8,
  Depth32FloatStencil8,
  Stencil8,
}

impl PixelFormat {
  /// Bijective mapping onto the Vulkan format enum.
  pub fn to_vk(self) -> vk::Format {
    use PixelFormat::*;
    match self {
      R8Unorm => vk::Format::R8_UNORM,
      R8Snorm => vk::Format::R8_SNORM,
      R8Uint => vk::Format::R8_UINT,
      R8Sint => vk::Format::R8_SINT,
      Rg8Unorm => vk::Format::R8G8_UNORM,
      Rg8Snorm => vk::Format::R8G8_SNORM,
      Rg8Uint => vk::Format::R8G8_UINT,
      Rg8Sint => vk::Format::R8G8_SINT,
      Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
      Rgba8UnormSrgb => vk::Format::R8G8B8A8_SRGB,
      Rgba8Snorm => vk::Format::R8G8B8A8_SNORM,
      Rgba8Uint => vk::Format::R8G8B8A8_UINT,
      Rgba8Sint => vk::Format::R8G8B8A8_SINT,
      Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
      Bgra8UnormSrgb => vk::Format::B8G8R8A8_SRGB,
      R16Float => vk::Format::R16_SFLOAT,
      Rg16Float => vk::Format::R16G16_SFLOAT,
      Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
      R32Float => vk::Format::R32_SFLOAT,
      Rg32Float => vk::Format::R32G32_SFLOAT,
      Rgba32Float => vk::Format::R32G32B32A32_SFLOAT,
      R32Uint => vk::Format::R32_UINT,
      R32Sint => vk::Format::R32_SINT,
      Depth32Float => vk::Format::D32_SFLOAT,
      Depth24UnormStencil8 => vk::Format::D24_UNORM_S8_UINT,
      Depth32FloatStencil8 => vk::Format::D32_SFLOAT_S8_UINT,
      Stencil8 => vk::Format::S8_UINT,
    }
  }

  /// Inverse of `to_vk`; `None` for Vulkan formats outside the closed set
  /// this backend supports.
  pub fn from_vk(format: vk::Format) -> Option<Self> {
    use PixelFormat::*;
    Some(match format {
      vk::Format::R8_UNORM => R8Unorm,
      vk::Format::R8_SNORM => R8Snorm,
      vk::Format::R8_UINT => R8Uint,
      vk::Format::R8_SINT => R8Sint,
      vk::Format::R8G8_UNORM => Rg8Unorm,
      vk::Format::R8G8_SNORM => Rg8Snorm,
      vk::Format::R8G8_UINT => Rg8Uint,
      vk::Format::R8G8_SINT => Rg8Sint,
      vk::Format::R8G8B8A8_UNORM => Rgba8Unorm,
      vk::Format::R8G8B8A8_SRGB => Rgba8UnormSrgb,
      vk::Format::R8G8B8A8_SNORM => Rgba8Snorm,
      vk::Format::R8G8B8A8_UINT => Rgba8Uint,
      vk::Format::R8G8B8A8_SINT => Rgba8Sint,
      vk::Format::B8G8R8A8_UNORM => Bgra8Unorm,
      vk::Format::B8G8R8A8_SRGB => Bgra8UnormSrgb,
      vk::Format::R16_SFLOAT => R16Float,
      vk::Format::R16G16_SFLOAT => Rg16Float,
      vk::Format::R16G16B16A16_SFLOAT => Rgba16Float,
      vk::Format::R32_SFLOAT => R32Float,
      vk::Format::R32G32_SFLOAT => Rg32Float,
      vk::Format::R32G32B32A32_SFLOAT => Rgba32Float,
      vk::Format::R32_UINT => R32Uint,
      vk::Format::R32_SINT => R32Sint,
      vk::Format::D32_SFLOAT => Depth32Float,
      vk::Format::D24_UNORM_S8_UINT => Depth24UnormStencil8,
      vk::Format::D32_SFLOAT_S8_UINT => Depth32FloatStencil8,
      vk::Format::S8_UINT => Stencil8,
      _ => return None,
    })
  }

  pub fn is_depth(self) -> bool {
    use PixelFormat::*;
    matches!(
      self,
      Depth32Float | Depth24UnormStencil8 | Depth32FloatStencil8
    )
  }

  pub fn is_stencil(self) -> bool {
    use PixelFormat::*;
    matches!(self, Depth24UnormStencil8 | Depth32FloatStencil8 | Stencil8)
  }

  pub fn is_depth_or_stencil(self) -> bool {
    self.is_depth() || self.is_stencil()
  }

  pub fn is_unnormalized_int(self) -> bool {
    use PixelFormat::*;
    matches!(
      self,
      R8Uint | R8Sint | Rg8Uint | Rg8Sint | Rgba8Uint | Rgba8Sint | R32Uint | R32Sint
    )
  }

  pub fn is_signed_int(self) -> bool {
    use PixelFormat::*;
    matches!(self, R8Sint | Rg8Sint | Rgba8Sint | R32Sint)
  }

  pub fn is_unsigned_int(self) -> bool {
    use PixelFormat::*;
    matches!(self, R8Uint | Rg8Uint | Rgba8Uint | R32Uint)
  }

  pub fn bytes_per_pixel(self) -> u32 {
    use PixelFormat::*;
    match self {
      R8Unorm | R8Snorm | R8Uint | R8Sint | Stencil8 => 1,
      Rg8Unorm | Rg8Snorm | Rg8Uint | Rg8Sint | R16Float => 2,
      Depth24UnormStencil8 => 4,
      Rgba8Unorm | Rgba8UnormSrgb | Rgba8Snorm | Rgba8Uint | Rgba8Sint | Bgra8Unorm
      | Bgra8UnormSrgb | Rg16Float | R32Float | R32Uint | R32Sint | Depth32Float => 4,
      Depth32FloatStencil8 => 5,
      Rgba16Float | Rg32Float => 8,
      Rgba32Float => 16,
    }
  }

  /// Aspect mask implied by this format, for image-view/barrier subresource
  /// ranges.
  pub fn aspect_mask(self) -> vk::ImageAspectFlags {
    match (self.is_depth(), self.is_stencil()) {
      (true, true) => vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
      (true, false) => vk::ImageAspectFlags::DEPTH,
      (false, true) => vk::ImageAspectFlags::STENCIL,
      (false, false) => vk::ImageAspectFlags::COLOR,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn to_vk_from_vk_round_trips() {
    let all = [
      PixelFormat::R8Unorm,
      PixelFormat::Rgba8Unorm,
      PixelFormat::Bgra8UnormSrgb,
      PixelFormat::Rgba16Float,
      PixelFormat::Depth32Float,
      PixelFormat::Depth24UnormStencil8,
      PixelFormat::Stencil8,
    ];
    for format in all {
      assert_eq!(PixelFormat::from_vk(format.to_vk()), Some(format));
    }
  }

  #[test]
  fn depth_stencil_classification() {
    assert!(PixelFormat::Depth32Float.is_depth());
    assert!(!PixelFormat::Depth32Float.is_stencil());
    assert!(PixelFormat::Depth24UnormStencil8.is_depth());
    assert!(PixelFormat::Depth24UnormStencil8.is_stencil());
    assert!(PixelFormat::Stencil8.is_stencil());
    assert!(!PixelFormat::Stencil8.is_depth());
    assert!(!PixelFormat::Rgba8Unorm.is_depth_or_stencil());
  }

  #[test]
  fn unnormalized_int_classification() {
    assert!(PixelFormat::R32Uint.is_unnormalized_int());
    assert!(!PixelFormat::Rgba8Unorm.is_unnormalized_int());
  }
}
