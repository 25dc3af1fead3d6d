//! Backend resource objects: descriptors (plain data, §3), generational
//! handles (§9 Design Note 1), and the owning `Image`/`Buffer` wrappers.

pub mod descriptors;
pub mod handles;

pub use descriptors::{
  BufferDescriptor, BufferUsage, CacheMode, ClearColor, ClearOperation, ColorAttachment,
  DepthAttachment, Extent2D, RenderTargetDescriptor, ResolveAttachment, StencilAttachment,
  StorageMode, TextureDescriptor, TextureType, TextureUsage, TransientImageKey,
};
pub use handles::{BufferHandle, ImageHandle, SamplerHandle, Slab};

use crate::layout_tracker::LayoutTimeline;
use ash::vk;

/// How an `Image`'s memory is backed. §3: "exactly one of (allocator-owned,
/// swapchain-owned, externally-imported)".
pub enum ImageOwnership {
  /// Allocated from the VMA-equivalent allocator; `dispose` must free it.
  Allocator(vk_mem::Allocation),
  /// Backed by a swapchain; the swapchain owns the memory and destroys the
  /// `VkImage` itself.
  Swapchain,
  /// Imported from outside the backend; the backend never frees the
  /// underlying memory or image.
  Imported,
}

/// A backend image: the Vulkan handle, a full-resource view, its
/// descriptor, and its per-subresource layout timeline (§4.5).
pub struct Image {
  pub handle: vk::Image,
  pub view: vk::ImageView,
  pub descriptor: TextureDescriptor,
  pub ownership: ImageOwnership,
  pub layouts: LayoutTimeline,
}

impl Image {
  pub fn is_swapchain_owned(&self) -> bool {
    matches!(self.ownership, ImageOwnership::Swapchain)
  }

  pub fn subresource_range(&self) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::builder()
      .aspect_mask(self.descriptor.pixel_format.aspect_mask())
      .base_mip_level(0)
      .level_count(self.descriptor.mip_levels)
      .base_array_layer(0)
      .layer_count(self.descriptor.array_layers)
      .build()
  }
}

/// A backend buffer: the Vulkan handle, the suballocation offset within it,
/// and its descriptor.
pub struct Buffer {
  pub handle: vk::Buffer,
  pub offset: vk::DeviceSize,
  pub descriptor: BufferDescriptor,
  pub allocation: Option<vk_mem::Allocation>,
}
