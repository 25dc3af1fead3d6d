//! Generational handles for persistent images and buffers (§9 Design Note
//! 1: replace reference-counted/raw-pointer resource references with
//! indices into a generational slab).

use slotmap::{new_key_type, SlotMap};

new_key_type! {
  /// Handle to a persistent `Image`. Stable across frames; disposal bumps
  /// the slot's generation so a stale handle is distinguishable from a
  /// handle into a reused slot.
  pub struct ImageHandle;
  /// Handle to a persistent `Buffer`.
  pub struct BufferHandle;
  /// Handle to a `VkSampler`.
  pub struct SamplerHandle;
}

/// A generational slab of `T`, keyed by a `slotmap` key type `K`.
///
/// This is the substrate both the persistent resource pool (§4.2) and the
/// shader-layout caches (§4.4) build their registries on.
pub struct Slab<K: slotmap::Key, T> {
  slots: SlotMap<K, T>,
}

impl<K: slotmap::Key, T> Slab<K, T> {
  pub fn new() -> Self {
    Self {
      slots: SlotMap::with_key(),
    }
  }

  pub fn insert(&mut self, value: T) -> K {
    self.slots.insert(value)
  }

  pub fn get(&self, key: K) -> Option<&T> {
    self.slots.get(key)
  }

  pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
    self.slots.get_mut(key)
  }

  pub fn remove(&mut self, key: K) -> Option<T> {
    self.slots.remove(key)
  }

  pub fn len(&self) -> usize {
    self.slots.len()
  }

  pub fn is_empty(&self) -> bool {
    self.slots.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (K, &T)> {
    self.slots.iter()
  }
}

impl<K: slotmap::Key, T> Default for Slab<K, T> {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stale_handle_is_not_found_after_removal() {
    let mut slab: Slab<ImageHandle, u32> = Slab::new();
    let handle = slab.insert(42);
    assert_eq!(slab.remove(handle), Some(42));
    assert_eq!(slab.get(handle), None);
  }

  #[test]
  fn reused_slot_gets_new_generation() {
    let mut slab: Slab<ImageHandle, u32> = Slab::new();
    let first = slab.insert(1);
    slab.remove(first);
    let second = slab.insert(2);
    // A slotmap key carries a generation; a stale handle into a reused slot
    // must not alias the new value.
    assert_eq!(slab.get(first), None);
    assert_eq!(slab.get(second), Some(&2));
  }
}
