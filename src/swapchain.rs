//! Swapchain lifecycle (§4.9): lazy creation, format/present-mode
//! preference, and recreate-on-out-of-date handling for `next_image`.

use crate::device::{Device, QueueRole};
use crate::error::{BackendError, BackendResult};
use crate::resource_pool::ResourcePool;
use crate::resources::{Extent2D, ImageHandle, TextureDescriptor, TextureType, TextureUsage};
use crate::format::PixelFormat;
use ash::vk;

struct SwapchainImage {
  handle: ImageHandle,
  view: vk::ImageView,
}

/// One acquired swapchain image, ready to be driven through a
/// `FrameCommandBuffer` and handed back to `submit` for presentation.
pub struct AcquiredImage {
  pub image: ImageHandle,
  pub image_index: u32,
  pub acquire_semaphore: vk::Semaphore,
}

/// Owns the `VkSwapchainKHR`, its images (registered into the resource pool
/// as imported images so the layout tracker sees them like any other), and
/// the acquire/present binary semaphore pairs cycled across frames.
pub struct Swapchain {
  surface: vk::SurfaceKHR,
  surface_loader: ash::extensions::khr::Surface,
  loader: ash::extensions::khr::Swapchain,
  handle: vk::SwapchainKHR,
  format: vk::SurfaceFormatKHR,
  extent: vk::Extent2D,
  images: Vec<SwapchainImage>,
  acquire_semaphores: Vec<vk::Semaphore>,
  present_semaphores: Vec<vk::Semaphore>,
  next_sync_index: usize,
}

impl Swapchain {
  /// No swapchain is created until the first `next_image` call (§4.9:
  /// "lazy creation"); `new` only stores what's needed to build one.
  pub fn new(surface: vk::SurfaceKHR, surface_loader: ash::extensions::khr::Surface, loader: ash::extensions::khr::Swapchain) -> Self {
    Self {
      surface,
      surface_loader,
      loader,
      handle: vk::SwapchainKHR::null(),
      format: vk::SurfaceFormatKHR::default(),
      extent: vk::Extent2D::default(),
      images: Vec::new(),
      acquire_semaphores: Vec::new(),
      present_semaphores: Vec::new(),
      next_sync_index: 0,
    }
  }

  pub fn format(&self) -> PixelFormat {
    PixelFormat::from_vk(self.format.format).unwrap_or(PixelFormat::Bgra8Unorm)
  }

  pub fn extent(&self) -> Extent2D {
    Extent2D { width: self.extent.width, height: self.extent.height }
  }

  /// Acquires the next image, creating the swapchain on first call and
  /// recreating it if the surface's capabilities have changed since the
  /// last call (§4.9). Recurses exactly once on `ERROR_OUT_OF_DATE_KHR`;
  /// any other failure from either creation or acquire is fatal to the
  /// frame.
  pub fn next_image(
    &mut self, device: &Device, resources: &mut ResourcePool, requested_extent: vk::Extent2D,
  ) -> BackendResult<AcquiredImage> {
    self.next_image_inner(device, resources, requested_extent, true)
  }

  fn next_image_inner(
    &mut self, device: &Device, resources: &mut ResourcePool, requested_extent: vk::Extent2D, allow_recreate: bool,
  ) -> BackendResult<AcquiredImage> {
    if self.handle == vk::SwapchainKHR::null() {
      self.recreate(device, resources, requested_extent)?;
    }

    let sync_index = self.next_sync_index;
    self.next_sync_index = (self.next_sync_index + 1) % self.acquire_semaphores.len();
    let acquire_semaphore = self.acquire_semaphores[sync_index];

    let result = unsafe {
      self
        .loader
        .acquire_next_image(self.handle, u64::MAX, acquire_semaphore, vk::Fence::null())
    };

    match result {
      Ok((image_index, _suboptimal)) => Ok(AcquiredImage {
        image: self.images[image_index as usize].handle,
        image_index,
        acquire_semaphore,
      }),
      Err(vk::Result::ERROR_OUT_OF_DATE_KHR) if allow_recreate => {
        self.recreate(device, resources, requested_extent)?;
        self.next_image_inner(device, resources, requested_extent, false)
      }
      Err(e) => Err(e.into()),
    }
  }

  /// The present-semaphore half of the sync pair for the image just
  /// acquired through `next_image`; `commit` waits on `acquire_semaphore`
  /// and signals this one before calling `vkQueuePresentKHR`.
  pub fn present_semaphore(&self, acquired: &AcquiredImage) -> vk::Semaphore {
    let sync_index = self
      .acquire_semaphores
      .iter()
      .position(|s| *s == acquired.acquire_semaphore)
      .unwrap_or(0);
    self.present_semaphores[sync_index]
  }

  pub fn loader(&self) -> ash::extensions::khr::Swapchain {
    self.loader.clone()
  }

  pub fn handle(&self) -> vk::SwapchainKHR {
    self.handle
  }

  fn recreate(&mut self, device: &Device, resources: &mut ResourcePool, requested_extent: vk::Extent2D) -> BackendResult<()> {
    if self.handle != vk::SwapchainKHR::null() {
      unsafe { device.device.device_wait_idle() }?;
    }

    let capabilities = unsafe {
      self
        .surface_loader
        .get_physical_device_surface_capabilities(device.physical_device, self.surface)?
    };
    let formats = unsafe {
      self
        .surface_loader
        .get_physical_device_surface_formats(device.physical_device, self.surface)?
    };
    let present_modes = unsafe {
      self
        .surface_loader
        .get_physical_device_surface_present_modes(device.physical_device, self.surface)?
    };

    let format = choose_surface_format(&formats);
    let present_mode = choose_present_mode(&present_modes);
    let extent = choose_extent(&capabilities, requested_extent);

    let max_image_count = if capabilities.max_image_count == 0 { u32::MAX } else { capabilities.max_image_count };
    let image_count = (capabilities.min_image_count + 1).clamp(3, max_image_count);

    let queue_family_indices = device.concurrent_family_indices.clone();
    let mut create_info = vk::SwapchainCreateInfoKHR::builder()
      .surface(self.surface)
      .min_image_count(image_count)
      .image_format(format.format)
      .image_color_space(format.color_space)
      .image_extent(extent)
      .image_array_layers(1)
      .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
      .image_sharing_mode(device.sharing_mode)
      .pre_transform(capabilities.current_transform)
      .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
      .present_mode(present_mode)
      .clipped(true)
      .old_swapchain(self.handle);
    if device.sharing_mode == vk::SharingMode::CONCURRENT {
      create_info = create_info.queue_family_indices(&queue_family_indices);
    }
    let create_info = create_info.build();

    let new_handle = unsafe { self.loader.create_swapchain(&create_info, None)? };

    self.destroy_images(device, resources);
    if self.handle != vk::SwapchainKHR::null() {
      unsafe { self.loader.destroy_swapchain(self.handle, None) };
    }
    self.handle = new_handle;
    self.format = format;
    self.extent = extent;

    let raw_images = unsafe { self.loader.get_swapchain_images(self.handle)? };
    let descriptor = TextureDescriptor {
      pixel_format: PixelFormat::from_vk(format.format).ok_or(BackendError::UnsupportedPixelFormat { format: format.format, usage: "swapchain" })?,
      width: extent.width,
      height: extent.height,
      depth: 1,
      mip_levels: 1,
      array_layers: 1,
      sample_count: 1,
      texture_type: TextureType::Tex2D,
      usage_hint: TextureUsage::RENDER_TARGET,
      storage_mode: crate::resources::StorageMode::Private,
      cache_mode: crate::resources::CacheMode::Default,
    };

    self.images = raw_images
      .into_iter()
      .map(|image| {
        let view_create_info = vk::ImageViewCreateInfo::builder()
          .image(image)
          .view_type(vk::ImageViewType::TYPE_2D)
          .format(format.format)
          .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
          })
          .build();
        let view = unsafe { device.device.create_image_view(&view_create_info, None) }?;
        let handle = resources.import_external(image, view, descriptor);
        Ok(SwapchainImage { handle, view })
      })
      .collect::<BackendResult<Vec<_>>>()?;

    let sync_count = self.images.len();
    self.destroy_sync_objects(&device.device);
    self.acquire_semaphores = (0..sync_count)
      .map(|_| unsafe { device.device.create_semaphore(&vk::SemaphoreCreateInfo::builder().build(), None) })
      .collect::<Result<Vec<_>, _>>()?;
    self.present_semaphores = (0..sync_count)
      .map(|_| unsafe { device.device.create_semaphore(&vk::SemaphoreCreateInfo::builder().build(), None) })
      .collect::<Result<Vec<_>, _>>()?;
    self.next_sync_index = 0;

    Ok(())
  }

  fn destroy_images(&mut self, device: &Device, resources: &mut ResourcePool) {
    for image in self.images.drain(..) {
      resources.dispose_image(image.handle);
      unsafe { device.device.destroy_image_view(image.view, None) };
    }
  }

  fn destroy_sync_objects(&mut self, device: &ash::Device) {
    for semaphore in self.acquire_semaphores.drain(..).chain(self.present_semaphores.drain(..)) {
      unsafe { device.destroy_semaphore(semaphore, None) };
    }
  }

  /// Presents `acquired`, once `FrameCommandBuffer::commit` has signaled
  /// its present semaphore (§4.9, §7: suboptimal is non-fatal, anything
  /// else fails the frame).
  pub fn submit(&self, device: &Device, role: QueueRole, acquired: &AcquiredImage) -> BackendResult<()> {
    let present_semaphore = self.present_semaphore(acquired);
    let swapchains = [self.handle];
    let image_indices = [acquired.image_index];
    let wait_semaphores = [present_semaphore];
    let present_info = vk::PresentInfoKHR::builder()
      .wait_semaphores(&wait_semaphores)
      .swapchains(&swapchains)
      .image_indices(&image_indices)
      .build();
    match unsafe { self.loader.queue_present(device.queue_for_role(role).handle, &present_info) } {
      Ok(_suboptimal) => Ok(()),
      Err(vk::Result::SUBOPTIMAL_KHR) => Ok(()),
      Err(e) => Err(e.into()),
    }
  }

  pub fn destroy(&mut self, device: &Device, resources: &mut ResourcePool) {
    self.destroy_images(device, resources);
    self.destroy_sync_objects(&device.device);
    if self.handle != vk::SwapchainKHR::null() {
      unsafe { self.loader.destroy_swapchain(self.handle, None) };
      self.handle = vk::SwapchainKHR::null();
    }
  }
}

fn choose_surface_format(available: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
  available
    .iter()
    .find(|f| f.format == vk::Format::B8G8R8A8_SRGB && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
    .or_else(|| available.iter().find(|f| f.format == vk::Format::B8G8R8A8_UNORM && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR))
    .copied()
    .unwrap_or_else(|| available[0])
}

fn choose_present_mode(available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
  [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO]
    .iter()
    .find(|mode| available.contains(mode))
    .copied()
    .unwrap_or(vk::PresentModeKHR::FIFO)
}

fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, requested: vk::Extent2D) -> vk::Extent2D {
  if capabilities.current_extent.width != u32::MAX {
    return capabilities.current_extent;
  }
  vk::Extent2D {
    width: requested.width.clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
    height: requested.height.clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn present_mode_prefers_mailbox_over_fifo() {
    let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
    assert_eq!(choose_present_mode(&available), vk::PresentModeKHR::MAILBOX);
  }

  #[test]
  fn present_mode_falls_back_to_fifo() {
    let available = [vk::PresentModeKHR::FIFO];
    assert_eq!(choose_present_mode(&available), vk::PresentModeKHR::FIFO);
  }

  #[test]
  fn surface_format_falls_back_to_first_when_preferred_absent() {
    let available = [vk::SurfaceFormatKHR { format: vk::Format::R8G8B8A8_UNORM, color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR }];
    assert_eq!(choose_surface_format(&available).format, vk::Format::R8G8B8A8_UNORM);
  }

  #[test]
  fn extent_uses_current_extent_when_fixed() {
    let capabilities = vk::SurfaceCapabilitiesKHR {
      current_extent: vk::Extent2D { width: 800, height: 600 },
      ..Default::default()
    };
    let extent = choose_extent(&capabilities, vk::Extent2D { width: 1920, height: 1080 });
    assert_eq!((extent.width, extent.height), (800, 600));
  }
}
