//! Linear-bump buffer arenas (§4.3): `N = in_flight_frame_count` frame
//! slots, each holding a growable list of blocks. `begin_frame` rotates to
//! `frame_index mod N` and resets that slot's blocks for reuse; by the time
//! it is called, `frame.rs` has already waited for that slot's previous
//! occupant to retire.

use crate::config::ARENA_ALIGNMENT;
use crate::device::Device;
use crate::error::BackendResult;
use crate::resource_pool::ResourcePool;
use crate::resources::{BufferDescriptor, BufferHandle, BufferUsage, CacheMode, StorageMode};
use ash::vk;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ArenaKind {
  SharedDefault,
  SharedWriteCombined,
  ManagedDefault,
  ManagedWriteCombined,
}

impl ArenaKind {
  fn storage_cache(self) -> (StorageMode, CacheMode) {
    match self {
      ArenaKind::SharedDefault => (StorageMode::Shared, CacheMode::Default),
      ArenaKind::SharedWriteCombined => (StorageMode::Shared, CacheMode::WriteCombined),
      ArenaKind::ManagedDefault => (StorageMode::Managed, CacheMode::Default),
      ArenaKind::ManagedWriteCombined => (StorageMode::Managed, CacheMode::WriteCombined),
    }
  }
}

struct Block {
  buffer: BufferHandle,
  size: vk::DeviceSize,
  cursor: vk::DeviceSize,
}

#[derive(Copy, Clone, Debug)]
pub struct TransientAllocation {
  pub buffer: BufferHandle,
  pub offset: vk::DeviceSize,
  pub size: vk::DeviceSize,
}

struct FrameSlot {
  blocks: Vec<Block>,
}

pub struct BufferArena {
  kind: ArenaKind,
  block_size: vk::DeviceSize,
  slots: Vec<FrameSlot>,
  current_slot: usize,
}

fn align_up(value: vk::DeviceSize, align: vk::DeviceSize) -> vk::DeviceSize {
  (value + align - 1) / align * align
}

impl BufferArena {
  pub fn new(kind: ArenaKind, block_size: vk::DeviceSize, in_flight_frame_count: usize) -> Self {
    Self {
      kind,
      block_size,
      slots: (0..in_flight_frame_count).map(|_| FrameSlot { blocks: Vec::new() }).collect(),
      current_slot: 0,
    }
  }

  /// Rotates to this frame's slot and resets its blocks' cursors to zero
  /// without destroying the underlying buffers (§4.3).
  pub fn begin_frame(&mut self, frame_index: u64) {
    self.current_slot = (frame_index % self.slots.len() as u64) as usize;
    for block in &mut self.slots[self.current_slot].blocks {
      block.cursor = 0;
    }
  }

  /// Bump-allocates `size` bytes, 256-byte aligned, from the current
  /// frame's slot, growing by a new block of `max(size, block_size)` when
  /// the tail block doesn't have room (§4.3).
  pub fn allocate(
    &mut self, pool: &mut ResourcePool, device: &Device, size: vk::DeviceSize,
  ) -> BackendResult<TransientAllocation> {
    let aligned = align_up(size, ARENA_ALIGNMENT);
    let slot = &mut self.slots[self.current_slot];

    if let Some(block) = slot.blocks.last_mut() {
      if block.cursor + aligned <= block.size {
        let offset = block.cursor;
        block.cursor += aligned;
        return Ok(TransientAllocation { buffer: block.buffer, offset, size: aligned });
      }
    }

    let new_block_size = aligned.max(self.block_size);
    let (storage_mode, cache_mode) = self.kind.storage_cache();
    let descriptor = BufferDescriptor {
      length: new_block_size,
      storage_mode,
      cache_mode,
      usage_hint: BufferUsage::VERTEX | BufferUsage::INDEX | BufferUsage::CONSTANT | BufferUsage::STORAGE,
    };
    let buffer = pool.allocate_buffer(device, descriptor)?;
    slot.blocks.push(Block { buffer, size: new_block_size, cursor: aligned });
    Ok(TransientAllocation { buffer, offset: 0, size: aligned })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn align_up_rounds_to_256() {
    assert_eq!(align_up(1, 256), 256);
    assert_eq!(align_up(256, 256), 256);
    assert_eq!(align_up(257, 256), 512);
  }

  #[test]
  fn begin_frame_selects_slot_by_modulo() {
    let mut arena = BufferArena::new(ArenaKind::SharedDefault, 1024, 3);
    arena.begin_frame(0);
    assert_eq!(arena.current_slot, 0);
    arena.begin_frame(4);
    assert_eq!(arena.current_slot, 1);
  }
}
