//! The merge rule (§4.6): decides whether a draw pass joins the current
//! render-target group as a reused or new subpass, or forces the group to
//! close and a new one to open.

use crate::resources::{
  BufferHandle, ClearOperation, ColorAttachment, DepthAttachment, Extent2D, RenderTargetDescriptor,
  StencilAttachment,
};
use crate::usage::PassRecord;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum MergeResult {
  /// Reuses the previous pass's subpass.
  Identical,
  /// Opens a new subpass with index `last + 1` in the same render pass.
  Compatible,
  /// The group must finalize; the candidate opens a new group.
  Incompatible,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum SlotResult {
  /// Neither side uses this attachment slot.
  Neutral,
  /// Both sides use it, identically, with no new clear.
  Identical,
  /// Exactly one side uses it.
  CompatibleOnly,
  Incompatible,
}

fn combine(results: impl IntoIterator<Item = SlotResult>) -> MergeResult {
  let mut best = MergeResult::Identical;
  for slot in results {
    match slot {
      SlotResult::Incompatible => return MergeResult::Incompatible,
      SlotResult::CompatibleOnly => best = MergeResult::Compatible,
      SlotResult::Neutral | SlotResult::Identical => {}
    }
  }
  best
}

fn compare_color(existing: Option<&ColorAttachment>, candidate: Option<&ColorAttachment>) -> SlotResult {
  match (existing, candidate) {
    (None, None) => SlotResult::Neutral,
    (None, Some(_)) | (Some(_), None) => SlotResult::CompatibleOnly,
    (Some(e), Some(c)) => {
      let same_target = e.texture == c.texture && e.level == c.level && e.slice == c.slice && e.depth_plane == c.depth_plane;
      if !same_target {
        return SlotResult::Incompatible;
      }
      if matches!(c.clear_operation, ClearOperation::Clear(_)) {
        SlotResult::Incompatible
      } else {
        SlotResult::Identical
      }
    }
  }
}

fn compare_depth(existing: Option<&DepthAttachment>, candidate: Option<&DepthAttachment>) -> SlotResult {
  match (existing, candidate) {
    (None, None) => SlotResult::Neutral,
    (None, Some(_)) | (Some(_), None) => SlotResult::CompatibleOnly,
    (Some(e), Some(c)) => {
      let same_target = e.texture == c.texture && e.level == c.level && e.slice == c.slice;
      if !same_target {
        return SlotResult::Incompatible;
      }
      if matches!(c.clear_operation, ClearOperation::Clear(_)) {
        SlotResult::Incompatible
      } else {
        SlotResult::Identical
      }
    }
  }
}

fn compare_stencil(existing: Option<&StencilAttachment>, candidate: Option<&StencilAttachment>) -> SlotResult {
  match (existing, candidate) {
    (None, None) => SlotResult::Neutral,
    (None, Some(_)) | (Some(_), None) => SlotResult::CompatibleOnly,
    (Some(e), Some(c)) => {
      let same_target = e.texture == c.texture && e.level == c.level && e.slice == c.slice;
      if !same_target {
        return SlotResult::Incompatible;
      }
      if matches!(c.clear_operation, ClearOperation::Clear(_)) {
        SlotResult::Incompatible
      } else {
        SlotResult::Identical
      }
    }
  }
}

fn compare_visibility_buffer(existing: Option<BufferHandle>, candidate: Option<BufferHandle>) -> SlotResult {
  match (existing, candidate) {
    (None, None) => SlotResult::Neutral,
    (None, Some(_)) | (Some(_), None) => SlotResult::CompatibleOnly,
    (Some(e), Some(c)) if e == c => SlotResult::Identical,
    (Some(_), Some(_)) => SlotResult::Incompatible,
  }
}

/// Decides how `candidate` relates to the attachments `group` has already
/// committed to (§4.6 rules 1-5).
pub fn try_merge(group: &RenderPassGroup, candidate: &RenderTargetDescriptor) -> MergeResult {
  let candidate_size = match candidate.size {
    Some(size) => size,
    None => group.size,
  };
  if candidate_size.width != group.size.width || candidate_size.height != group.size.height {
    return MergeResult::Incompatible;
  }

  let color_len = group.color_attachments.len().max(candidate.color_attachments.len());
  let color_results = (0..color_len).map(|i| {
    compare_color(
      group.color_attachments.get(i).and_then(Option::as_ref),
      candidate.color_attachments.get(i).and_then(Option::as_ref),
    )
  });

  let depth_result = compare_depth(group.depth_attachment.as_ref(), candidate.depth_attachment.as_ref());
  let stencil_result = compare_stencil(group.stencil_attachment.as_ref(), candidate.stencil_attachment.as_ref());
  let visibility_result =
    compare_visibility_buffer(group.visibility_buffer, candidate.visibility_buffer);

  combine(
    color_results
      .chain(std::iter::once(depth_result))
      .chain(std::iter::once(stencil_result))
      .chain(std::iter::once(visibility_result)),
  )
}

#[derive(Copy, Clone, Debug)]
pub struct PlannedAttachment {
  pub texture: crate::resources::ImageHandle,
  pub level: u32,
  pub slice: u32,
}

pub struct PassInGroup {
  pub pass_index: usize,
  pub subpass_index: u32,
}

/// Which attachment slots a single planned subpass actually references,
/// as opposed to the group-wide union in `RenderPassGroup::color_attachments`
/// (§3: `Subpass{descriptor, index, input_attachments, preserve_attachments}`).
#[derive(Clone, Debug, Default)]
pub struct SubpassMembership {
  pub color: Vec<bool>,
  pub depth: bool,
  pub stencil: bool,
}

fn membership_for(rt: &RenderTargetDescriptor) -> SubpassMembership {
  SubpassMembership {
    color: rt.color_attachments.iter().map(Option::is_some).collect(),
    depth: rt.depth_attachment.is_some(),
    stencil: rt.stencil_attachment.is_some(),
  }
}

/// One or more draw passes sharing a single `VkRenderPass`, assigned
/// subpass indices by the merge rule (§4.6).
pub struct RenderPassGroup {
  pub passes: Vec<PassInGroup>,
  pub size: Extent2D,
  pub color_attachments: Vec<Option<ColorAttachment>>,
  pub depth_attachment: Option<DepthAttachment>,
  pub stencil_attachment: Option<StencilAttachment>,
  pub visibility_buffer: Option<BufferHandle>,
  pub subpasses: Vec<SubpassMembership>,
  pub(crate) next_subpass_index: u32,
}

impl RenderPassGroup {
  fn open(pass_index: usize, rt: &RenderTargetDescriptor, size: Extent2D) -> Self {
    Self {
      passes: vec![PassInGroup { pass_index, subpass_index: 0 }],
      size,
      color_attachments: rt.color_attachments.clone(),
      depth_attachment: rt.depth_attachment,
      stencil_attachment: rt.stencil_attachment,
      visibility_buffer: rt.visibility_buffer,
      subpasses: vec![membership_for(rt)],
      next_subpass_index: 0,
    }
  }

  fn absorb(&mut self, pass_index: usize, rt: &RenderTargetDescriptor, result: MergeResult) {
    let subpass_index = match result {
      MergeResult::Identical => self.next_subpass_index,
      MergeResult::Compatible => {
        self.next_subpass_index += 1;
        self.subpasses.push(membership_for(rt));
        self.next_subpass_index
      }
      MergeResult::Incompatible => unreachable!("caller must open a new group on Incompatible"),
    };
    self.passes.push(PassInGroup { pass_index, subpass_index });

    for (i, candidate) in rt.color_attachments.iter().enumerate() {
      if candidate.is_some() {
        if i >= self.color_attachments.len() {
          self.color_attachments.resize(i + 1, None);
        }
        if self.color_attachments[i].is_none() {
          self.color_attachments[i] = *candidate;
        }
      }
    }
    if self.depth_attachment.is_none() {
      self.depth_attachment = rt.depth_attachment;
    }
    if self.stencil_attachment.is_none() {
      self.stencil_attachment = rt.stencil_attachment;
    }
    if self.visibility_buffer.is_none() {
      self.visibility_buffer = rt.visibility_buffer;
    }

    let slot_count = self.color_attachments.len();
    for membership in &mut self.subpasses {
      if membership.color.len() < slot_count {
        membership.color.resize(slot_count, false);
      }
    }
  }

  /// For each subpass, which color slots (and whether depth/stencil) must
  /// be marked `PRESERVE` because an earlier and a later subpass reference
  /// the attachment but this one doesn't (§4.6).
  pub fn preserve_attachments(&self) -> (Vec<Vec<bool>>, Vec<bool>) {
    let slot_count = self.color_attachments.len();
    let mut color_preserve = vec![vec![false; slot_count]; self.subpasses.len()];
    for slot in 0..slot_count {
      let users: Vec<usize> = self
        .subpasses
        .iter()
        .enumerate()
        .filter(|(_, s)| s.color.get(slot).copied().unwrap_or(false))
        .map(|(i, _)| i)
        .collect();
      if let (Some(&first), Some(&last)) = (users.first(), users.last()) {
        for subpass in first + 1..last {
          if !self.subpasses[subpass].color.get(slot).copied().unwrap_or(false) {
            color_preserve[subpass][slot] = true;
          }
        }
      }
    }

    let mut depth_preserve = vec![false; self.subpasses.len()];
    let depth_users: Vec<usize> = self
      .subpasses
      .iter()
      .enumerate()
      .filter(|(_, s)| s.depth || s.stencil)
      .map(|(i, _)| i)
      .collect();
    if let (Some(&first), Some(&last)) = (depth_users.first(), depth_users.last()) {
      for subpass in first + 1..last {
        if !(self.subpasses[subpass].depth || self.subpasses[subpass].stencil) {
          depth_preserve[subpass] = true;
        }
      }
    }

    (color_preserve, depth_preserve)
  }
}

/// Groups every draw pass in `passes` into render-target groups by
/// repeatedly applying `try_merge` (§4.6). Non-draw passes (compute, blit,
/// external, CPU) are not grouped; callers interleave them between groups
/// by original pass order.
pub fn group_passes(passes: &[PassRecord]) -> Vec<RenderPassGroup> {
  let mut groups: Vec<RenderPassGroup> = Vec::new();

  for (pass_index, pass) in passes.iter().enumerate() {
    let rt = match &pass.render_target {
      Some(rt) => rt,
      None => continue,
    };
    let size = pass.render_target_size().unwrap_or(Extent2D { width: 0, height: 0 });

    match groups.last_mut() {
      Some(group) => {
        let result = try_merge(group, rt);
        match result {
          MergeResult::Incompatible => groups.push(RenderPassGroup::open(pass_index, rt, size)),
          other => group.absorb(pass_index, rt, other),
        }
      }
      None => groups.push(RenderPassGroup::open(pass_index, rt, size)),
    }
  }

  groups
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::resources::{ClearColor, ImageHandle};

  fn rt_with_color(texture: ImageHandle, clear: bool, size: Extent2D) -> RenderTargetDescriptor {
    RenderTargetDescriptor {
      color_attachments: vec![Some(ColorAttachment {
        texture,
        level: 0,
        slice: 0,
        depth_plane: 0,
        resolve: None,
        clear_operation: if clear {
          ClearOperation::Clear(ClearColor::Float([0.0; 4]))
        } else {
          ClearOperation::Keep
        },
      })],
      depth_attachment: None,
      stencil_attachment: None,
      size: Some(size),
      array_length: 1,
      visibility_buffer: None,
    }
  }

  #[test]
  fn same_target_no_new_clear_is_identical() {
    let mut slab: crate::resources::Slab<ImageHandle, ()> = crate::resources::Slab::new();
    let tex = slab.insert(());
    let size = Extent2D { width: 64, height: 64 };
    let rt_a = rt_with_color(tex, true, size);
    let group = RenderPassGroup::open(0, &rt_a, size);
    let rt_b = rt_with_color(tex, false, size);
    assert_eq!(try_merge(&group, &rt_b), MergeResult::Identical);
  }

  #[test]
  fn same_target_with_new_clear_is_incompatible() {
    let mut slab: crate::resources::Slab<ImageHandle, ()> = crate::resources::Slab::new();
    let tex = slab.insert(());
    let size = Extent2D { width: 64, height: 64 };
    let group = RenderPassGroup::open(0, &rt_with_color(tex, true, size), size);
    assert_eq!(try_merge(&group, &rt_with_color(tex, true, size)), MergeResult::Incompatible);
  }

  #[test]
  fn different_targets_are_incompatible() {
    let mut slab: crate::resources::Slab<ImageHandle, ()> = crate::resources::Slab::new();
    let tex_a = slab.insert(());
    let tex_b = slab.insert(());
    let size = Extent2D { width: 64, height: 64 };
    let group = RenderPassGroup::open(0, &rt_with_color(tex_a, false, size), size);
    assert_eq!(try_merge(&group, &rt_with_color(tex_b, false, size)), MergeResult::Incompatible);
  }

  #[test]
  fn mismatched_sizes_are_incompatible() {
    let mut slab: crate::resources::Slab<ImageHandle, ()> = crate::resources::Slab::new();
    let tex = slab.insert(());
    let group = RenderPassGroup::open(0, &rt_with_color(tex, false, Extent2D { width: 64, height: 64 }), Extent2D { width: 64, height: 64 });
    let candidate = rt_with_color(tex, false, Extent2D { width: 32, height: 32 });
    assert_eq!(try_merge(&group, &candidate), MergeResult::Incompatible);
  }

  #[test]
  fn disjoint_attachments_are_compatible_new_subpass() {
    let mut slab: crate::resources::Slab<ImageHandle, ()> = crate::resources::Slab::new();
    let tex_a = slab.insert(());
    let size = Extent2D { width: 64, height: 64 };
    let group = RenderPassGroup::open(0, &rt_with_color(tex_a, false, size), size);
    let mut candidate = rt_with_color(tex_a, false, size);
    candidate.color_attachments.push(None);
    candidate.color_attachments[0] = None;
    candidate.color_attachments.push(Some(ColorAttachment {
      texture: slab.insert(()),
      level: 0,
      slice: 0,
      depth_plane: 0,
      resolve: None,
      clear_operation: ClearOperation::Keep,
    }));
    assert_eq!(try_merge(&group, &candidate), MergeResult::Compatible);
  }
}
