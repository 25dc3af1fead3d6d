//! Per-image, per-subresource layout timeline (§4.5).
//!
//! Each image maintains an ordered map from `command_index -> layout` per
//! subresource. Queries are a "largest key <= command_index" lookup, which
//! `BTreeMap::range` gives us directly without a manual binary search.

use crate::usage::{ActiveRange, CommandIndex, ResourceUsage};
use ash::vk;
use std::collections::BTreeMap;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct SubresourceKey {
  pub base_mip_level: u32,
  pub level_count: u32,
  pub base_array_layer: u32,
  pub layer_count: u32,
}

impl SubresourceKey {
  pub fn full_resource(mip_levels: u32, array_layers: u32) -> Self {
    Self {
      base_mip_level: 0,
      level_count: mip_levels,
      base_array_layer: 0,
      layer_count: array_layers,
    }
  }
}

impl From<ActiveRange> for SubresourceKey {
  fn from(range: ActiveRange) -> Self {
    match range {
      ActiveRange::Subresource {
        base_mip_level,
        level_count,
        base_array_layer,
        layer_count,
      } => SubresourceKey {
        base_mip_level,
        level_count,
        base_array_layer,
        layer_count,
      },
      ActiveRange::BufferRange { .. } => {
        panic!("layout tracker queried with a buffer range; images only")
      }
    }
  }
}

/// Per-subresource layout timeline for a single image.
#[derive(Default)]
pub struct LayoutTimeline {
  timelines: std::collections::HashMap<SubresourceKey, BTreeMap<CommandIndex, vk::ImageLayout>>,
  full_resource_key: Option<SubresourceKey>,
  last_frame_computed: Option<u64>,
}

impl LayoutTimeline {
  pub fn new() -> Self {
    Self::default()
  }

  /// Derives the layout each usage's subresource must hold across its
  /// command range, from the ordered usage list (§4.5 rules).
  ///
  /// `preserve_last_layout` carries the final layout from the previous
  /// frame forward as the effective state before this frame's first usage,
  /// instead of resetting to `UNDEFINED` — used for persistent images that
  /// are read before being written again this frame.
  pub fn compute_frame_layouts(
    &mut self, usages: &[ResourceUsage], is_depth_or_stencil: bool, preserve_last_layout: bool,
    frame_index: u64,
  ) {
    if !preserve_last_layout {
      self.timelines.clear();
    }
    self.last_frame_computed = Some(frame_index);

    for usage in usages {
      let key = SubresourceKey::from(usage.active_range);
      self.full_resource_key.get_or_insert(key);
      let layout = classify_layout(usage.access, is_depth_or_stencil);
      self
        .timelines
        .entry(key)
        .or_default()
        .insert(usage.command_range.lo, layout);
    }
  }

  /// Largest keyed entry `<= command_index`, per the exact subresource key
  /// if tracked, else the full-resource key as a conservative fallback.
  pub fn layout(&self, command_index: CommandIndex, subresource: SubresourceKey) -> vk::ImageLayout {
    if let Some(map) = self.timelines.get(&subresource) {
      if let Some((_, layout)) = map.range(..=command_index).next_back() {
        return *layout;
      }
    }
    if let Some(full_key) = self.full_resource_key {
      if let Some(map) = self.timelines.get(&full_key) {
        if let Some((_, layout)) = map.range(..=command_index).next_back() {
          return *layout;
        }
      }
    }
    vk::ImageLayout::UNDEFINED
  }

  /// `(initial_layout, final_layout)` for a render-pass attachment (§4.5).
  pub fn render_pass_layouts(
    &self, previous_cmd: Option<CommandIndex>, next_cmd: Option<CommandIndex>,
    subresource: SubresourceKey,
  ) -> (vk::ImageLayout, vk::ImageLayout) {
    let initial = match previous_cmd {
      Some(idx) => self.layout(idx, subresource),
      None => vk::ImageLayout::UNDEFINED,
    };
    let final_layout = match next_cmd {
      Some(idx) => self.layout(idx, subresource),
      None => vk::ImageLayout::UNDEFINED,
    };
    (initial, final_layout)
  }
}

/// Pure mapping from `(access, is_depth_or_stencil)` to the Vulkan layout
/// that access requires (§4.5 rules, §9 Design Note: "define once as pure
/// functions... do not recompute per barrier").
pub fn classify_layout(access: crate::usage::Access, is_depth_or_stencil: bool) -> vk::ImageLayout {
  use crate::usage::Access::*;
  match access {
    RenderTargetWriteOnly | RenderTargetReadWrite => {
      if is_depth_or_stencil {
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
      } else {
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
      }
    }
    InputAttachmentReadWrite | ReadWrite | Write => vk::ImageLayout::GENERAL,
    InputAttachment | Read | Sampler | ConstantBuffer => {
      if is_depth_or_stencil {
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
      } else {
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
      }
    }
    BlitSource => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
    BlitDestination => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    VertexBuffer | IndexBuffer => {
      panic!("vertex/index buffer access does not apply to images")
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::usage::{Access, ActiveRange, CommandRange};
  use ash::vk::PipelineStageFlags;

  fn usage(pass: usize, lo: u32, hi: u32, access: Access) -> ResourceUsage {
    ResourceUsage {
      pass_index: pass,
      command_range: CommandRange::new(lo, hi),
      access,
      stages: PipelineStageFlags::ALL_COMMANDS,
      active_range: ActiveRange::full_subresource(1, 1),
    }
  }

  #[test]
  fn render_target_write_then_sampled_read() {
    let mut timeline = LayoutTimeline::new();
    let usages = vec![
      usage(0, 0, 3, Access::RenderTargetWriteOnly),
      usage(1, 3, 5, Access::Sampler),
    ];
    timeline.compute_frame_layouts(&usages, false, false, 0);
    let key = SubresourceKey::full_resource(1, 1);
    assert_eq!(timeline.layout(0, key), vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    assert_eq!(timeline.layout(4, key), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
  }

  #[test]
  fn render_pass_layouts_undefined_when_no_prior_use() {
    let timeline = LayoutTimeline::new();
    let key = SubresourceKey::full_resource(1, 1);
    let (initial, final_layout) = timeline.render_pass_layouts(None, None, key);
    assert_eq!(initial, vk::ImageLayout::UNDEFINED);
    assert_eq!(final_layout, vk::ImageLayout::UNDEFINED);
  }

  #[test]
  fn storage_access_maps_to_general() {
    assert_eq!(classify_layout(Access::ReadWrite, false), vk::ImageLayout::GENERAL);
    assert_eq!(classify_layout(Access::InputAttachmentReadWrite, false), vk::ImageLayout::GENERAL);
  }

  #[test]
  fn depth_formats_use_depth_layouts() {
    assert_eq!(
      classify_layout(Access::RenderTargetWriteOnly, true),
      vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
    );
    assert_eq!(
      classify_layout(Access::Sampler, true),
      vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
    );
  }
}
