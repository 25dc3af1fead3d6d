//! Subpass dependency synthesis (§4.6).

use crate::planner::RenderPassGroup;
use crate::resources::ImageHandle;
use crate::usage::PassRecord;
use ash::vk;
use std::collections::HashMap;

type AttachmentIdentity = (ImageHandle, u32, u32);

fn touched_attachments(rt: &crate::resources::RenderTargetDescriptor) -> Vec<AttachmentIdentity> {
  let mut identities: Vec<AttachmentIdentity> = rt
    .color_attachments
    .iter()
    .flatten()
    .map(|a| (a.texture, a.level, a.slice))
    .collect();
  if let Some(d) = &rt.depth_attachment {
    identities.push((d.texture, d.level, d.slice));
  }
  if let Some(s) = &rt.stencil_attachment {
    identities.push((s.texture, s.level, s.slice));
  }
  identities
}

fn merge_into(deps: &mut Vec<vk::SubpassDependency>, src: u32, dst: u32, flags: vk::DependencyFlags) {
  let src_access = vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
  let dst_access = vk::AccessFlags::COLOR_ATTACHMENT_READ
    | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
    | vk::AccessFlags::INPUT_ATTACHMENT_READ;
  let src_stage =
    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
  let dst_stage = src_stage | vk::PipelineStageFlags::FRAGMENT_SHADER;

  if let Some(existing) = deps.iter_mut().find(|d| d.src_subpass == src && d.dst_subpass == dst && d.dependency_flags == flags) {
    existing.src_access_mask |= src_access;
    existing.dst_access_mask |= dst_access;
    existing.src_stage_mask |= src_stage;
    existing.dst_stage_mask |= dst_stage;
    return;
  }
  deps.push(vk::SubpassDependency {
    src_subpass: src,
    dst_subpass: dst,
    src_access_mask: src_access,
    dst_access_mask: dst_access,
    src_stage_mask: src_stage,
    dst_stage_mask: dst_stage,
    dependency_flags: flags,
  });
}

/// Walks each attachment through the group's subpasses, emitting a
/// dependency whenever a write is followed by a later subpass's use of the
/// same attachment, and a self-dependency (`BY_REGION`) when a subpass both
/// writes an attachment and reads it back as an input attachment — `
/// input_attachments[subpass]` names exactly those reads, so an ordinary
/// same-subpass sequence of render-target writes (no input-attachment read)
/// never gets a spurious self-dependency (§4.6).
pub fn compute_subpass_dependencies(
  group: &RenderPassGroup, passes: &[PassRecord], input_attachments: &[std::collections::HashSet<ImageHandle>],
) -> Vec<vk::SubpassDependency> {
  let mut last_write_subpass: HashMap<AttachmentIdentity, u32> = HashMap::new();
  let mut dependencies = Vec::new();

  for member in &group.passes {
    let rt = passes[member.pass_index]
      .render_target
      .as_ref()
      .expect("a pass assigned to a render-target group always has a render target");
    let touched = touched_attachments(rt);

    for identity in &touched {
      if let Some(&prev_subpass) = last_write_subpass.get(identity) {
        if prev_subpass == member.subpass_index {
          let (image, _, _) = *identity;
          let is_input_attachment_read = input_attachments
            .get(member.subpass_index as usize)
            .map_or(false, |set| set.contains(&image));
          if is_input_attachment_read {
            merge_into(&mut dependencies, prev_subpass, member.subpass_index, vk::DependencyFlags::BY_REGION);
          }
        } else {
          merge_into(&mut dependencies, prev_subpass, member.subpass_index, vk::DependencyFlags::empty());
        }
      }
    }
    for identity in touched {
      last_write_subpass.insert(identity, member.subpass_index);
    }
  }

  dependencies
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::planner::merge::{PassInGroup, RenderPassGroup, SubpassMembership};
  use crate::resources::{ClearOperation, ColorAttachment, Extent2D, RenderTargetDescriptor, Slab};
  use crate::usage::{CommandRange, PassCommands, PassKind};

  fn draw_pass(rt: RenderTargetDescriptor) -> PassRecord {
    PassRecord { kind: PassKind::Draw, command_range: CommandRange::new(0, 1), commands: PassCommands::None, render_target: Some(rt) }
  }

  fn rt_with(tex: crate::resources::ImageHandle, size: Extent2D) -> RenderTargetDescriptor {
    RenderTargetDescriptor {
      color_attachments: vec![Some(ColorAttachment { texture: tex, level: 0, slice: 0, depth_plane: 0, resolve: None, clear_operation: ClearOperation::Keep })],
      depth_attachment: None,
      stencil_attachment: None,
      size: Some(size),
      array_length: 1,
      visibility_buffer: None,
    }
  }

  #[test]
  fn write_then_read_in_later_subpass_emits_dependency() {
    let mut slab: Slab<crate::resources::ImageHandle, ()> = Slab::new();
    let tex = slab.insert(());
    let size = Extent2D { width: 64, height: 64 };
    let passes = vec![draw_pass(rt_with(tex, size)), draw_pass(rt_with(tex, size))];
    let group = RenderPassGroup {
      passes: vec![PassInGroup { pass_index: 0, subpass_index: 0 }, PassInGroup { pass_index: 1, subpass_index: 1 }],
      size,
      color_attachments: vec![Some(ColorAttachment { texture: tex, level: 0, slice: 0, depth_plane: 0, resolve: None, clear_operation: ClearOperation::Keep })],
      depth_attachment: None,
      stencil_attachment: None,
      visibility_buffer: None,
      subpasses: vec![
        SubpassMembership { color: vec![true], depth: false, stencil: false },
        SubpassMembership { color: vec![true], depth: false, stencil: false },
      ],
      next_subpass_index: 1,
    };
    let deps = compute_subpass_dependencies(&group, &passes, &[]);
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].src_subpass, 0);
    assert_eq!(deps[0].dst_subpass, 1);
  }

  #[test]
  fn same_subpass_write_then_plain_rewrite_has_no_self_dependency() {
    let mut slab: Slab<crate::resources::ImageHandle, ()> = Slab::new();
    let tex = slab.insert(());
    let size = Extent2D { width: 64, height: 64 };
    let passes = vec![draw_pass(rt_with(tex, size)), draw_pass(rt_with(tex, size))];
    let group = RenderPassGroup {
      passes: vec![PassInGroup { pass_index: 0, subpass_index: 0 }, PassInGroup { pass_index: 1, subpass_index: 0 }],
      size,
      color_attachments: vec![Some(ColorAttachment { texture: tex, level: 0, slice: 0, depth_plane: 0, resolve: None, clear_operation: ClearOperation::Keep })],
      depth_attachment: None,
      stencil_attachment: None,
      visibility_buffer: None,
      subpasses: vec![SubpassMembership { color: vec![true], depth: false, stencil: false }],
      next_subpass_index: 0,
    };
    // No entry in `input_attachments` for subpass 0, so the repeated
    // same-subpass write must not synthesize a self-dependency.
    let deps = compute_subpass_dependencies(&group, &passes, &[std::collections::HashSet::new()]);
    assert!(deps.is_empty());
  }

  #[test]
  fn same_subpass_input_attachment_read_emits_self_dependency() {
    let mut slab: Slab<crate::resources::ImageHandle, ()> = Slab::new();
    let tex = slab.insert(());
    let size = Extent2D { width: 64, height: 64 };
    let passes = vec![draw_pass(rt_with(tex, size)), draw_pass(rt_with(tex, size))];
    let group = RenderPassGroup {
      passes: vec![PassInGroup { pass_index: 0, subpass_index: 0 }, PassInGroup { pass_index: 1, subpass_index: 0 }],
      size,
      color_attachments: vec![Some(ColorAttachment { texture: tex, level: 0, slice: 0, depth_plane: 0, resolve: None, clear_operation: ClearOperation::Keep })],
      depth_attachment: None,
      stencil_attachment: None,
      visibility_buffer: None,
      subpasses: vec![SubpassMembership { color: vec![true], depth: false, stencil: false }],
      next_subpass_index: 0,
    };
    let mut reads = std::collections::HashSet::new();
    reads.insert(tex);
    let deps = compute_subpass_dependencies(&group, &passes, &[reads]);
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].src_subpass, 0);
    assert_eq!(deps[0].dst_subpass, 0);
    assert_eq!(deps[0].dependency_flags, vk::DependencyFlags::BY_REGION);
  }
}
