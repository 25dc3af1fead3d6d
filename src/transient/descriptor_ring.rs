//! Argument-buffer (descriptor set) allocation (§4.3): a ring of N
//! "reset whole pool" descriptor pools for per-frame sets, plus a separate
//! incrementally-freeable pool for persistent sets.

use crate::error::BackendResult;
use ash::vk;

pub struct DescriptorRing {
  pools: Vec<vk::DescriptorPool>,
  persistent_pool: vk::DescriptorPool,
  current: usize,
}

impl DescriptorRing {
  pub fn new(
    device: &ash::Device, in_flight_frame_count: usize, pool_sizes: &[vk::DescriptorPoolSize],
    max_sets: u32,
  ) -> BackendResult<Self> {
    let mut pools = Vec::with_capacity(in_flight_frame_count);
    for _ in 0..in_flight_frame_count {
      let create_info = vk::DescriptorPoolCreateInfo::builder()
        .max_sets(max_sets)
        .pool_sizes(pool_sizes)
        .build();
      pools.push(unsafe { device.create_descriptor_pool(&create_info, None) }?);
    }

    let persistent_info = vk::DescriptorPoolCreateInfo::builder()
      .max_sets(max_sets)
      .pool_sizes(pool_sizes)
      .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
      .build();
    let persistent_pool = unsafe { device.create_descriptor_pool(&persistent_info, None) }?;

    Ok(Self { pools, persistent_pool, current: 0 })
  }

  /// Rotates to `frame_index mod N` and resets that slot's pool in bulk
  /// (§4.3: "on frame cycle, `pool[frame_index mod N]` is reset in bulk").
  pub fn begin_frame(&mut self, device: &ash::Device, frame_index: u64) -> BackendResult<()> {
    self.current = (frame_index % self.pools.len() as u64) as usize;
    unsafe { device.reset_descriptor_pool(self.pools[self.current], vk::DescriptorPoolResetFlags::empty()) }?;
    Ok(())
  }

  pub fn allocate(&self, device: &ash::Device, layouts: &[vk::DescriptorSetLayout]) -> BackendResult<Vec<vk::DescriptorSet>> {
    let alloc_info = vk::DescriptorSetAllocateInfo::builder()
      .descriptor_pool(self.pools[self.current])
      .set_layouts(layouts)
      .build();
    Ok(unsafe { device.allocate_descriptor_sets(&alloc_info) }?)
  }

  pub fn allocate_persistent(&self, device: &ash::Device, layouts: &[vk::DescriptorSetLayout]) -> BackendResult<Vec<vk::DescriptorSet>> {
    let alloc_info = vk::DescriptorSetAllocateInfo::builder()
      .descriptor_pool(self.persistent_pool)
      .set_layouts(layouts)
      .build();
    Ok(unsafe { device.allocate_descriptor_sets(&alloc_info) }?)
  }

  pub fn free_persistent(&self, device: &ash::Device, sets: &[vk::DescriptorSet]) -> BackendResult<()> {
    unsafe { device.free_descriptor_sets(self.persistent_pool, sets) }?;
    Ok(())
  }

  /// Caller must invoke before dropping the owning `Device`.
  pub fn destroy(&mut self, device: &ash::Device) {
    unsafe {
      for pool in self.pools.drain(..) {
        device.destroy_descriptor_pool(pool, None);
      }
      device.destroy_descriptor_pool(self.persistent_pool, None);
    }
  }
}
