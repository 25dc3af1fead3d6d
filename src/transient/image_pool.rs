//! Transient image pool and the one-frame history pool (§4.3).

use crate::config::HISTORY_POOL_FRAME_COUNT;
use crate::device::Device;
use crate::error::BackendResult;
use crate::resource_pool::ResourcePool;
use crate::resources::{ImageHandle, TextureDescriptor, TransientImageKey};
use std::collections::HashMap;

struct PendingDeposit {
  handle: ImageHandle,
  key: TransientImageKey,
  retire_value: u64,
}

/// A free list keyed by descriptor hash (§4.3), plus the N=1 history pool
/// used by temporal passes that need last frame's image alive for exactly
/// one more frame.
pub struct ImagePool {
  free: HashMap<TransientImageKey, Vec<ImageHandle>>,
  pending: Vec<PendingDeposit>,
  history: HashMap<u64, ImageHandle>,
}

impl ImagePool {
  pub fn new() -> Self {
    static_assertions::const_assert_eq!(HISTORY_POOL_FRAME_COUNT, 1);
    Self { free: HashMap::new(), pending: Vec::new(), history: HashMap::new() }
  }

  /// Reuses an exact free-list match for `descriptor`, or allocates a new
  /// image (§4.3: `collect_image`).
  pub fn collect_image(
    &mut self, pool: &mut ResourcePool, device: &Device, descriptor: TextureDescriptor,
  ) -> BackendResult<ImageHandle> {
    let key = descriptor.pool_key();
    if let Some(handle) = self.free.get_mut(&key).and_then(Vec::pop) {
      return Ok(handle);
    }
    pool.allocate_image(device, descriptor)
  }

  /// Queues `handle` for reuse once the submission tagged `retire_value`
  /// has completed (§4.3: `deposit_image`).
  pub fn deposit_image(&mut self, handle: ImageHandle, key: TransientImageKey, retire_value: u64) {
    self.pending.push(PendingDeposit { handle, key, retire_value });
  }

  /// Moves every deposit whose `retire_value` is at or before
  /// `completed_value` into the free list.
  pub fn reclaim(&mut self, completed_value: u64) {
    let (ready, still_pending): (Vec<_>, Vec<_>) =
      self.pending.drain(..).partition(|d| d.retire_value <= completed_value);
    self.pending = still_pending;
    for deposit in ready {
      self.free.entry(deposit.key).or_default().push(deposit.handle);
    }
  }

  /// History slot for `id` (typically a stable per-pass identity token),
  /// holding only the previous frame's image.
  pub fn history_get(&self, id: u64) -> Option<ImageHandle> {
    self.history.get(&id).copied()
  }

  pub fn history_put(&mut self, id: u64, handle: ImageHandle) {
    self.history.insert(id, handle);
  }
}

impl Default for ImagePool {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::format::PixelFormat;
  use crate::resources::{CacheMode, StorageMode, TextureType, TextureUsage};

  fn key() -> TransientImageKey {
    TextureDescriptor {
      pixel_format: PixelFormat::Rgba8Unorm,
      width: 64,
      height: 64,
      depth: 1,
      mip_levels: 1,
      array_layers: 1,
      sample_count: 1,
      texture_type: TextureType::Tex2D,
      usage_hint: TextureUsage::RENDER_TARGET,
      storage_mode: StorageMode::Private,
      cache_mode: CacheMode::Default,
    }
    .pool_key()
  }

  #[test]
  fn reclaim_only_frees_deposits_whose_value_has_been_reached() {
    let mut pool = ImagePool::new();
    let handle = ImageHandle::default();
    pool.deposit_image(handle, key(), 10);
    pool.reclaim(5);
    assert!(pool.free.is_empty());
    pool.reclaim(10);
    assert_eq!(pool.free.get(&key()).map(Vec::len), Some(1));
  }

  #[test]
  fn history_pool_keeps_only_latest_per_id() {
    let mut slab: crate::resources::Slab<ImageHandle, ()> = crate::resources::Slab::new();
    let a = slab.insert(());
    let b = slab.insert(());
    let mut pool = ImagePool::new();
    pool.history_put(1, a);
    pool.history_put(1, b);
    assert_eq!(pool.history_get(1), Some(b));
  }
}
