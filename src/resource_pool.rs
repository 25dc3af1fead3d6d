//! Resource allocation and disposal (§4.2).
//!
//! Wraps the VMA-equivalent allocator: maps `(StorageMode, CacheMode)` onto
//! a `vk_mem::MemoryUsage`, owns the slabs of live images/buffers/samplers,
//! and defers destruction until the in-flight frame that last touched a
//! resource has completed.

use crate::device::{Device, QueueRole};
use crate::error::{BackendError, BackendResult};
use crate::resources::{
  Buffer, BufferDescriptor, BufferHandle, BufferUsage, CacheMode, Image, ImageHandle,
  ImageOwnership, SamplerHandle, Slab, StorageMode, TextureDescriptor,
};
use ash::vk;
use std::mem::ManuallyDrop;

/// Maps a descriptor's storage/cache mode pair onto the allocator's memory
/// usage hint (§4.2). `Managed` is host-visible in both cache modes (the
/// CPU side writes or reads it directly); `Default` favors GPU-resident
/// memory that's also host-visible (`GpuToCpu`), `WriteCombined` favors
/// host-resident memory optimized for sequential CPU writes (`CpuToGpu`).
fn memory_usage_for(storage_mode: StorageMode, cache_mode: CacheMode) -> vk_mem::MemoryUsage {
  match (storage_mode, cache_mode) {
    (StorageMode::Private, _) => vk_mem::MemoryUsage::GpuOnly,
    (StorageMode::Managed, CacheMode::Default) => vk_mem::MemoryUsage::GpuToCpu,
    (StorageMode::Managed, CacheMode::WriteCombined) => vk_mem::MemoryUsage::CpuToGpu,
    (StorageMode::Shared, CacheMode::WriteCombined) => vk_mem::MemoryUsage::CpuToGpu,
    (StorageMode::Shared, CacheMode::Default) => vk_mem::MemoryUsage::CpuOnly,
  }
}

#[derive(Copy, Clone, Debug)]
enum DisposalEntry {
  Image(vk::Image, ImageOwnershipTag),
  Buffer(vk::Buffer),
  Sampler(vk::Sampler),
}

/// `ImageOwnership` itself isn't `Copy` (it holds a `vk_mem::Allocation`),
/// so the deferred-disposal queue only remembers whether an allocation must
/// be freed alongside the Vulkan handle.
#[derive(Copy, Clone, Debug)]
enum ImageOwnershipTag {
  Allocated,
  NotAllocated,
}

struct PendingDisposal {
  entry: DisposalEntry,
  allocation: Option<vk_mem::Allocation>,
}

/// Owns every `Image`/`Buffer`/sampler the backend has allocated, plus the
/// allocator and the queue of destructions deferred until their owning
/// frame retires (§4.2, §5).
pub struct ResourcePool {
  allocator: ManuallyDrop<vk_mem::Allocator>,
  images: Slab<ImageHandle, Image>,
  buffers: Slab<BufferHandle, Buffer>,
  samplers: Slab<SamplerHandle, vk::Sampler>,
  pending_disposals: Vec<PendingDisposal>,
}

impl ResourcePool {
  pub fn new(instance: &ash::Instance, device: &Device) -> BackendResult<Self> {
    let create_info = vk_mem::AllocatorCreateInfo::new(instance, &device.device, device.physical_device);
    let allocator = vk_mem::Allocator::new(&create_info)?;
    Ok(Self {
      allocator: ManuallyDrop::new(allocator),
      images: Slab::new(),
      buffers: Slab::new(),
      samplers: Slab::new(),
      pending_disposals: Vec::new(),
    })
  }

  /// Allocates a `VkImage` + `VkImageView` per `descriptor` (§3, §4.2).
  pub fn allocate_image(&mut self, device: &Device, descriptor: TextureDescriptor) -> BackendResult<ImageHandle> {
    if !descriptor.validate() {
      return Err(BackendError::ResourceAllocationFailed);
    }

    let image_type = match descriptor.texture_type {
      crate::resources::TextureType::Tex1D => vk::ImageType::TYPE_1D,
      crate::resources::TextureType::Tex3D => vk::ImageType::TYPE_3D,
      _ => vk::ImageType::TYPE_2D,
    };
    let array_layers = match descriptor.texture_type {
      crate::resources::TextureType::TexCube => descriptor.array_layers * 6,
      _ => descriptor.array_layers,
    };
    let flags = if descriptor.texture_type == crate::resources::TextureType::TexCube {
      vk::ImageCreateFlags::CUBE_COMPATIBLE
    } else {
      vk::ImageCreateFlags::empty()
    };

    let mut usage = vk::ImageUsageFlags::empty();
    if descriptor.usage_hint.contains(crate::resources::TextureUsage::SAMPLED) {
      usage |= vk::ImageUsageFlags::SAMPLED;
    }
    if descriptor.usage_hint.contains(crate::resources::TextureUsage::STORAGE) {
      usage |= vk::ImageUsageFlags::STORAGE;
    }
    if descriptor.usage_hint.contains(crate::resources::TextureUsage::RENDER_TARGET) {
      usage |= if descriptor.pixel_format.is_depth_or_stencil() {
        vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
      } else {
        vk::ImageUsageFlags::COLOR_ATTACHMENT
      };
    }
    if descriptor.usage_hint.contains(crate::resources::TextureUsage::BLIT_SOURCE) {
      usage |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    if descriptor.usage_hint.contains(crate::resources::TextureUsage::BLIT_DESTINATION) {
      usage |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    if descriptor.storage_mode == StorageMode::Managed {
      usage |= vk::ImageUsageFlags::TRANSFER_SRC;
    }

    if !device.supports_pixel_format(descriptor.pixel_format, descriptor.usage_hint) {
      return Err(BackendError::UnsupportedPixelFormat { format: descriptor.pixel_format.to_vk(), usage: "allocate_image" });
    }

    let image_create_info = vk::ImageCreateInfo::builder()
      .image_type(image_type)
      .format(descriptor.pixel_format.to_vk())
      .extent(vk::Extent3D {
        width: descriptor.width,
        height: descriptor.height,
        depth: if descriptor.texture_type == crate::resources::TextureType::Tex3D { descriptor.depth } else { 1 },
      })
      .mip_levels(descriptor.mip_levels)
      .array_layers(array_layers)
      .samples(sample_count_flags(descriptor.sample_count))
      .tiling(vk::ImageTiling::OPTIMAL)
      .usage(usage)
      .sharing_mode(vk::SharingMode::EXCLUSIVE)
      .initial_layout(vk::ImageLayout::UNDEFINED)
      .flags(flags)
      .build();

    let allocation_create_info = vk_mem::AllocationCreateInfo {
      usage: memory_usage_for(descriptor.storage_mode, descriptor.cache_mode),
      ..Default::default()
    };

    let (vk_image, allocation, _info) = unsafe {
      self.allocator.create_image(&image_create_info, &allocation_create_info)
    }?;

    let view_type = match descriptor.texture_type {
      crate::resources::TextureType::Tex1D => vk::ImageViewType::TYPE_1D,
      crate::resources::TextureType::Tex2D => vk::ImageViewType::TYPE_2D,
      crate::resources::TextureType::Tex2DArray => vk::ImageViewType::TYPE_2D_ARRAY,
      crate::resources::TextureType::Tex3D => vk::ImageViewType::TYPE_3D,
      crate::resources::TextureType::TexCube => vk::ImageViewType::CUBE,
    };
    let subresource_range = vk::ImageSubresourceRange::builder()
      .aspect_mask(descriptor.pixel_format.aspect_mask())
      .base_mip_level(0)
      .level_count(descriptor.mip_levels)
      .base_array_layer(0)
      .layer_count(array_layers)
      .build();
    let view_create_info = vk::ImageViewCreateInfo::builder()
      .image(vk_image)
      .view_type(view_type)
      .format(descriptor.pixel_format.to_vk())
      .subresource_range(subresource_range)
      .build();
    let view = unsafe { device.device.create_image_view(&view_create_info, None) }?;

    let image = Image {
      handle: vk_image,
      view,
      descriptor,
      ownership: ImageOwnership::Allocator(allocation),
      layouts: crate::layout_tracker::LayoutTimeline::new(),
    };
    Ok(self.images.insert(image))
  }

  /// Allocates a `VkBuffer` per `descriptor` (§3, §4.2).
  pub fn allocate_buffer(&mut self, device: &Device, descriptor: BufferDescriptor) -> BackendResult<BufferHandle> {
    let mut usage = vk::BufferUsageFlags::empty();
    if descriptor.usage_hint.contains(BufferUsage::VERTEX) {
      usage |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if descriptor.usage_hint.contains(BufferUsage::INDEX) {
      usage |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if descriptor.usage_hint.contains(BufferUsage::CONSTANT) {
      usage |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if descriptor.usage_hint.contains(BufferUsage::STORAGE) {
      usage |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if descriptor.usage_hint.contains(BufferUsage::BLIT_SOURCE) {
      usage |= vk::BufferUsageFlags::TRANSFER_SRC;
    }
    if descriptor.usage_hint.contains(BufferUsage::BLIT_DESTINATION) {
      usage |= vk::BufferUsageFlags::TRANSFER_DST;
    }
    if descriptor.usage_hint.contains(BufferUsage::INDIRECT) {
      usage |= vk::BufferUsageFlags::INDIRECT_BUFFER;
    }
    if descriptor.storage_mode == StorageMode::Managed {
      usage |= vk::BufferUsageFlags::TRANSFER_SRC;
    }

    let buffer_create_info = vk::BufferCreateInfo::builder()
      .size(descriptor.length)
      .usage(usage)
      .sharing_mode(vk::SharingMode::EXCLUSIVE)
      .build();
    let allocation_create_info = vk_mem::AllocationCreateInfo {
      usage: memory_usage_for(descriptor.storage_mode, descriptor.cache_mode),
      ..Default::default()
    };

    let (vk_buffer, allocation, _info) =
      unsafe { self.allocator.create_buffer(&buffer_create_info, &allocation_create_info) }?;
    let _ = device;

    let buffer = Buffer { handle: vk_buffer, offset: 0, descriptor, allocation: Some(allocation) };
    Ok(self.buffers.insert(buffer))
  }

  pub fn allocate_sampler(&mut self, device: &Device, create_info: &vk::SamplerCreateInfo) -> BackendResult<SamplerHandle> {
    let sampler = unsafe { device.device.create_sampler(create_info, None) }?;
    Ok(self.samplers.insert(sampler))
  }

  /// Registers an externally-owned image the backend never frees (§3:
  /// `ImageOwnership::Imported`). Used for e.g. swapchain images presented
  /// by a compositor extension outside `swapchain.rs`.
  pub fn import_external(&mut self, handle: vk::Image, view: vk::ImageView, descriptor: TextureDescriptor) -> ImageHandle {
    self.images.insert(Image {
      handle,
      view,
      descriptor,
      ownership: ImageOwnership::Imported,
      layouts: crate::layout_tracker::LayoutTimeline::new(),
    })
  }

  pub fn image(&self, handle: ImageHandle) -> Option<&Image> {
    self.images.get(handle)
  }

  pub fn image_mut(&mut self, handle: ImageHandle) -> Option<&mut Image> {
    self.images.get_mut(handle)
  }

  pub fn buffer(&self, handle: BufferHandle) -> Option<&Buffer> {
    self.buffers.get(handle)
  }

  /// Removes `handle` from the live slab and enqueues its Vulkan
  /// destruction for the next `drain_disposals` call, once the frame that
  /// last referenced it has retired (§4.2, §5).
  pub fn dispose_image(&mut self, handle: ImageHandle) {
    if let Some(image) = self.images.remove(handle) {
      if image.is_swapchain_owned() {
        return;
      }
      let (tag, allocation) = match image.ownership {
        ImageOwnership::Allocator(a) => (ImageOwnershipTag::Allocated, Some(a)),
        ImageOwnership::Imported => (ImageOwnershipTag::NotAllocated, None),
        ImageOwnership::Swapchain => unreachable!("handled above"),
      };
      self.pending_disposals.push(PendingDisposal {
        entry: DisposalEntry::Image(image.handle, tag),
        allocation,
      });
    }
  }

  pub fn dispose_buffer(&mut self, handle: BufferHandle) {
    if let Some(buffer) = self.buffers.remove(handle) {
      self.pending_disposals.push(PendingDisposal {
        entry: DisposalEntry::Buffer(buffer.handle),
        allocation: buffer.allocation,
      });
    }
  }

  pub fn dispose_sampler(&mut self, handle: SamplerHandle) {
    if let Some(sampler) = self.samplers.remove(handle) {
      self.pending_disposals.push(PendingDisposal { entry: DisposalEntry::Sampler(sampler), allocation: None });
    }
  }

  /// Actually destroys everything queued by `dispose_*`. Called once per
  /// completed submission (§4.2: "deferred disposal queue drained after
  /// each submit"), never mid-frame.
  pub fn drain_disposals(&mut self, device: &ash::Device) {
    for pending in self.pending_disposals.drain(..) {
      match pending.entry {
        DisposalEntry::Image(image, ImageOwnershipTag::Allocated) => {
          if let Some(allocation) = pending.allocation {
            unsafe { self.allocator.destroy_image(image, &allocation) };
          }
        }
        DisposalEntry::Image(_, ImageOwnershipTag::NotAllocated) => {}
        DisposalEntry::Buffer(buffer) => {
          if let Some(allocation) = pending.allocation {
            unsafe { self.allocator.destroy_buffer(buffer, &allocation) };
          }
        }
        DisposalEntry::Sampler(sampler) => unsafe { device.destroy_sampler(sampler, None) },
      }
    }
  }

  /// Copies GPU-resident data back to host memory via a one-shot staging
  /// buffer, resolving the `Managed` readback path (§4.2, §9 Open Question).
  /// Blocks the calling thread on the copy's completion; callers on the hot
  /// path should prefer asynchronous readback through the frame's
  /// completion callback instead.
  pub fn read_back_buffer(&mut self, device: &Device, handle: BufferHandle, offset: vk::DeviceSize, size: vk::DeviceSize) -> BackendResult<Vec<u8>> {
    let buffer = self.buffers.get(handle).ok_or(BackendError::ResourceAllocationFailed)?;
    let src = buffer.handle;

    let staging_create_info = vk::BufferCreateInfo::builder()
      .size(size)
      .usage(vk::BufferUsageFlags::TRANSFER_DST)
      .sharing_mode(vk::SharingMode::EXCLUSIVE)
      .build();
    let staging_alloc_info = vk_mem::AllocationCreateInfo {
      usage: vk_mem::MemoryUsage::GpuToCpu,
      ..Default::default()
    };
    let (staging_buffer, staging_allocation, _info) =
      unsafe { self.allocator.create_buffer(&staging_create_info, &staging_alloc_info) }?;

    let queue = device.queue_for_role(QueueRole::Copy);
    let pool = queue.command_pool.lock().unwrap();
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
      .command_pool(*pool)
      .level(vk::CommandBufferLevel::PRIMARY)
      .command_buffer_count(1)
      .build();
    let command_buffer = unsafe { device.device.allocate_command_buffers(&alloc_info) }?[0];

    let begin_info = vk::CommandBufferBeginInfo::builder()
      .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
      .build();
    unsafe {
      device.device.begin_command_buffer(command_buffer, &begin_info)?;
      let region = vk::BufferCopy { src_offset: offset, dst_offset: 0, size };
      device.device.cmd_copy_buffer(command_buffer, src, staging_buffer, &[region]);
      device.device.end_command_buffer(command_buffer)?;

      let submit_info = vk::SubmitInfo::builder().command_buffers(std::slice::from_ref(&command_buffer)).build();
      device.device.queue_submit(queue.handle, &[submit_info], vk::Fence::null())?;
      device.device.queue_wait_idle(queue.handle)?;
      device.device.free_command_buffers(*pool, &[command_buffer]);
    }
    drop(pool);

    let mapped = unsafe { self.allocator.map_memory(&staging_allocation) }?;
    let mut out = vec![0u8; size as usize];
    unsafe { std::ptr::copy_nonoverlapping(mapped, out.as_mut_ptr(), size as usize) };
    unsafe { self.allocator.unmap_memory(&staging_allocation) };
    unsafe { self.allocator.destroy_buffer(staging_buffer, &staging_allocation) };

    Ok(out)
  }
}

pub(crate) fn sample_count_flags(count: u32) -> vk::SampleCountFlags {
  match count {
    2 => vk::SampleCountFlags::TYPE_2,
    4 => vk::SampleCountFlags::TYPE_4,
    8 => vk::SampleCountFlags::TYPE_8,
    _ => vk::SampleCountFlags::TYPE_1,
  }
}

