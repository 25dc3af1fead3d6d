//! Resource descriptors (§3): the plain-data description of a texture,
//! buffer, or render target, independent of how it was allocated.

use crate::format::PixelFormat;
use crate::resources::handles::ImageHandle;

/// Maximum number of color attachments a render target descriptor may
/// declare. Matches the Vulkan implementation-defined minimum of 4 that
/// every conformant driver supports, kept conservative rather than reading
/// `maxColorAttachments` dynamically since the planner treats this as a
/// compile-time array bound.
pub const MAX_COLOR_ATTACHMENTS: usize = 4;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum StorageMode {
  /// Device-local only; no host access.
  Private,
  /// Host-visible.
  Shared,
  /// Device-local with a host-visible staging shadow for GPU→CPU readback.
  Managed,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum CacheMode {
  Default,
  WriteCombined,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum TextureType {
  Tex1D,
  Tex2D,
  Tex2DArray,
  Tex3D,
  TexCube,
}

bitflags::bitflags! {
  #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
  pub struct TextureUsage: u32 {
    const SAMPLED          = 1 << 0;
    const STORAGE          = 1 << 1;
    const RENDER_TARGET     = 1 << 2;
    const BLIT_SOURCE       = 1 << 3;
    const BLIT_DESTINATION  = 1 << 4;
  }
}

bitflags::bitflags! {
  #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
  pub struct BufferUsage: u32 {
    const VERTEX           = 1 << 0;
    const INDEX            = 1 << 1;
    const CONSTANT         = 1 << 2;
    const STORAGE          = 1 << 3;
    const BLIT_SOURCE       = 1 << 4;
    const BLIT_DESTINATION  = 1 << 5;
    const INDIRECT         = 1 << 6;
  }
}

#[derive(Copy, Clone, Debug)]
pub struct TextureDescriptor {
  pub pixel_format: PixelFormat,
  pub width: u32,
  pub height: u32,
  pub depth: u32,
  pub mip_levels: u32,
  pub array_layers: u32,
  pub sample_count: u32,
  pub texture_type: TextureType,
  pub usage_hint: TextureUsage,
  pub storage_mode: StorageMode,
  pub cache_mode: CacheMode,
}

impl TextureDescriptor {
  /// Checks the invariants from §3: `sample_count ∈ {1,2,4,8}` and, for a
  /// true 3D (depth > 1) texture, all three dimensions are non-zero.
  pub fn validate(&self) -> bool {
    let sample_count_ok = matches!(self.sample_count, 1 | 2 | 4 | 8);
    let depth_ok = if self.texture_type == TextureType::Tex3D {
      self.width > 0 && self.height > 0 && self.depth > 0
    } else {
      true
    };
    sample_count_ok && depth_ok
  }

  /// Hash key used by the transient image pool's free list (§4.3): two
  /// descriptors that would produce an identical `VkImageCreateInfo` (and
  /// so are interchangeable for reuse) hash identically.
  pub fn pool_key(&self) -> TransientImageKey {
    TransientImageKey {
      pixel_format: self.pixel_format,
      width: self.width,
      height: self.height,
      depth: self.depth,
      mip_levels: self.mip_levels,
      array_layers: self.array_layers,
      sample_count: self.sample_count,
      texture_type: self.texture_type,
      usage_hint: self.usage_hint,
    }
  }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct TransientImageKey {
  pixel_format: PixelFormat,
  width: u32,
  height: u32,
  depth: u32,
  mip_levels: u32,
  array_layers: u32,
  sample_count: u32,
  texture_type: TextureType,
  usage_hint: TextureUsage,
}

#[derive(Copy, Clone, Debug)]
pub struct BufferDescriptor {
  pub length: u64,
  pub storage_mode: StorageMode,
  pub cache_mode: CacheMode,
  pub usage_hint: BufferUsage,
}

#[derive(Copy, Clone, Debug)]
pub struct Extent2D {
  pub width: u32,
  pub height: u32,
}

#[derive(Copy, Clone, Debug)]
pub enum ClearColor {
  Float([f32; 4]),
  Sint([i32; 4]),
  Uint([u32; 4]),
}

#[derive(Copy, Clone, Debug)]
pub enum ClearOperation {
  Keep,
  Clear(ClearColor),
}

/// One attachment slot in a render target descriptor.
#[derive(Copy, Clone, Debug)]
pub struct ColorAttachment {
  pub texture: ImageHandle,
  pub level: u32,
  pub slice: u32,
  pub depth_plane: u32,
  pub resolve: Option<ResolveAttachment>,
  pub clear_operation: ClearOperation,
}

#[derive(Copy, Clone, Debug)]
pub struct ResolveAttachment {
  pub texture: ImageHandle,
  pub level: u32,
  pub slice: u32,
}

#[derive(Copy, Clone, Debug)]
pub struct DepthAttachment {
  pub texture: ImageHandle,
  pub level: u32,
  pub slice: u32,
  pub clear_operation: ClearOperation,
}

#[derive(Copy, Clone, Debug)]
pub struct StencilAttachment {
  pub texture: ImageHandle,
  pub level: u32,
  pub slice: u32,
  pub clear_operation: ClearOperation,
}

#[derive(Clone, Debug, Default)]
pub struct RenderTargetDescriptor {
  pub color_attachments: Vec<Option<ColorAttachment>>,
  pub depth_attachment: Option<DepthAttachment>,
  pub stencil_attachment: Option<StencilAttachment>,
  pub size: Option<Extent2D>,
  pub array_length: u32,
  pub visibility_buffer: Option<crate::resources::handles::BufferHandle>,
}

impl RenderTargetDescriptor {
  /// §3 invariant: stencil without depth is unsupported.
  pub fn stencil_requires_depth_satisfied(&self) -> bool {
    self.stencil_attachment.is_none() || self.depth_attachment.is_some()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn base_texture() -> TextureDescriptor {
    TextureDescriptor {
      pixel_format: PixelFormat::Rgba8Unorm,
      width: 1,
      height: 1,
      depth: 1,
      mip_levels: 1,
      array_layers: 1,
      sample_count: 1,
      texture_type: TextureType::Tex2D,
      usage_hint: TextureUsage::RENDER_TARGET,
      storage_mode: StorageMode::Private,
      cache_mode: CacheMode::Default,
    }
  }

  #[test]
  fn rejects_unsupported_sample_count() {
    let mut d = base_texture();
    d.sample_count = 3;
    assert!(!d.validate());
  }

  #[test]
  fn accepts_supported_sample_counts() {
    for sc in [1, 2, 4, 8] {
      let mut d = base_texture();
      d.sample_count = sc;
      assert!(d.validate());
    }
  }

  #[test]
  fn requires_nonzero_dims_for_3d_textures() {
    let mut d = base_texture();
    d.texture_type = TextureType::Tex3D;
    d.depth = 0;
    assert!(!d.validate());
    d.depth = 4;
    assert!(d.validate());
  }

  #[test]
  fn rt_stencil_without_depth_is_flagged() {
    let mut rt = RenderTargetDescriptor::default();
    assert!(rt.stencil_requires_depth_satisfied());
    rt.stencil_attachment = Some(StencilAttachment {
      texture: ImageHandle::default(),
      level: 0,
      slice: 0,
      clear_operation: ClearOperation::Keep,
    });
    assert!(!rt.stencil_requires_depth_satisfied());
  }
}
