//! Load/store-op resolution, clear-value encoding, and initial/final
//! layout derivation for one finalized attachment (§4.6).

use crate::layout_tracker::{LayoutTimeline, SubresourceKey};
use crate::resources::{ClearColor, ClearOperation, ImageHandle};
use crate::usage::{CommandIndex, CommandRange, ResourceUsage};
use ash::vk;

#[derive(Clone, Debug)]
pub struct FinalizedAttachment {
  pub texture: ImageHandle,
  pub level: u32,
  pub slice: u32,
  pub load_op: vk::AttachmentLoadOp,
  pub store_op: vk::AttachmentStoreOp,
  pub clear_value: Option<vk::ClearValue>,
  pub initial_layout: vk::ImageLayout,
  pub final_layout: vk::ImageLayout,
  pub previous_cmd: Option<CommandIndex>,
  pub next_cmd: Option<CommandIndex>,
}

/// Differentiates signed-int, unsigned-int, and float clear color encoding
/// (§4.6). Depth/stencil attachments reuse `ClearColor::Float`: component 0
/// is the depth value, component 1's bit pattern is the stencil value.
fn encode_clear_value(color: ClearColor, is_depth_or_stencil: bool) -> vk::ClearValue {
  if is_depth_or_stencil {
    let (depth, stencil) = match color {
      ClearColor::Float(c) => (c[0], c[1] as u32),
      ClearColor::Uint(c) => (c[0] as f32, c[1]),
      ClearColor::Sint(c) => (c[0] as f32, c[1] as u32),
    };
    return vk::ClearValue { depth_stencil: vk::ClearDepthStencilValue { depth, stencil } };
  }
  match color {
    ClearColor::Float(c) => vk::ClearValue { color: vk::ClearColorValue { float32: c } },
    ClearColor::Uint(c) => vk::ClearValue { color: vk::ClearColorValue { uint32: c } },
    ClearColor::Sint(c) => vk::ClearValue { color: vk::ClearColorValue { int32: c } },
  }
}

/// Finalizes one attachment of a render-pass group (§4.6): resolves its
/// load/store ops, clear value, and initial/final layouts against the full
/// per-resource usage list for the frame.
pub fn finalize_attachment(
  texture: ImageHandle, level: u32, slice: u32, clear_operation: ClearOperation, group_range: CommandRange,
  usages: &[ResourceUsage], layouts: &LayoutTimeline, subresource: SubresourceKey, is_depth_or_stencil: bool,
) -> FinalizedAttachment {
  let is_first_use = !usages.iter().any(|u| u.command_range.hi <= group_range.lo);
  let is_last_use = !usages.iter().any(|u| u.command_range.lo >= group_range.hi);

  let mut load_op = match clear_operation {
    ClearOperation::Clear(_) => vk::AttachmentLoadOp::CLEAR,
    ClearOperation::Keep => vk::AttachmentLoadOp::LOAD,
  };
  if is_first_use && load_op == vk::AttachmentLoadOp::LOAD {
    load_op = vk::AttachmentLoadOp::DONT_CARE;
  }

  let store_op = if is_last_use { vk::AttachmentStoreOp::DONT_CARE } else { vk::AttachmentStoreOp::STORE };

  let clear_value = match clear_operation {
    ClearOperation::Clear(color) => Some(encode_clear_value(color, is_depth_or_stencil)),
    ClearOperation::Keep => None,
  };

  let previous_cmd = usages.iter().filter(|u| u.command_range.hi <= group_range.lo).map(|u| u.command_range.last()).max();
  let next_cmd = usages.iter().filter(|u| u.command_range.lo >= group_range.hi).map(|u| u.command_range.lo).min();

  let (tracked_initial, final_layout) = layouts.render_pass_layouts(previous_cmd, next_cmd, subresource);
  let initial_layout = if is_first_use { vk::ImageLayout::UNDEFINED } else { tracked_initial };

  FinalizedAttachment {
    texture,
    level,
    slice,
    load_op,
    store_op,
    clear_value,
    initial_layout,
    final_layout,
    previous_cmd,
    next_cmd,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::resources::Slab;
  use crate::usage::Access;
  use ash::vk::PipelineStageFlags;

  fn usage(lo: u32, hi: u32) -> ResourceUsage {
    ResourceUsage {
      pass_index: 0,
      command_range: CommandRange::new(lo, hi),
      access: Access::RenderTargetWriteOnly,
      stages: PipelineStageFlags::ALL_COMMANDS,
      active_range: crate::usage::ActiveRange::full_subresource(1, 1),
    }
  }

  #[test]
  fn first_use_downgrades_load_to_dont_care() {
    let mut slab: Slab<ImageHandle, ()> = Slab::new();
    let tex = slab.insert(());
    let layouts = LayoutTimeline::new();
    let key = SubresourceKey::full_resource(1, 1);
    let result = finalize_attachment(
      tex, 0, 0, ClearOperation::Keep, CommandRange::new(0, 3), &[usage(0, 3)], &layouts, key, false,
    );
    assert_eq!(result.load_op, vk::AttachmentLoadOp::DONT_CARE);
    assert_eq!(result.initial_layout, vk::ImageLayout::UNDEFINED);
  }

  #[test]
  fn last_use_sets_store_op_dont_care() {
    let mut slab: Slab<ImageHandle, ()> = Slab::new();
    let tex = slab.insert(());
    let layouts = LayoutTimeline::new();
    let key = SubresourceKey::full_resource(1, 1);
    let result = finalize_attachment(
      tex, 0, 0, ClearOperation::Keep, CommandRange::new(0, 3), &[usage(0, 3)], &layouts, key, false,
    );
    assert_eq!(result.store_op, vk::AttachmentStoreOp::DONT_CARE);
  }

  #[test]
  fn non_terminal_use_keeps_store() {
    let mut slab: Slab<ImageHandle, ()> = Slab::new();
    let tex = slab.insert(());
    let layouts = LayoutTimeline::new();
    let key = SubresourceKey::full_resource(1, 1);
    let result = finalize_attachment(
      tex, 0, 0, ClearOperation::Keep, CommandRange::new(0, 3), &[usage(0, 3), usage(5, 7)], &layouts, key, false,
    );
    assert_eq!(result.store_op, vk::AttachmentStoreOp::STORE);
  }

  #[test]
  fn clear_encoding_differentiates_numeric_kinds() {
    let float_clear = encode_clear_value(ClearColor::Float([1.0, 0.0, 0.0, 1.0]), false);
    let uint_clear = encode_clear_value(ClearColor::Uint([1, 2, 3, 4]), false);
    unsafe {
      assert_eq!(float_clear.color.float32[0], 1.0);
      assert_eq!(uint_clear.color.uint32[0], 1);
    }
  }

  #[test]
  fn depth_stencil_clear_splits_depth_and_stencil_components() {
    let clear = encode_clear_value(ClearColor::Float([0.5, 3.0, 0.0, 0.0]), true);
    unsafe {
      assert_eq!(clear.depth_stencil.depth, 0.5);
      assert_eq!(clear.depth_stencil.stencil, 3);
    }
  }
}
