//! Builds and caches the `VkRenderPass`/`VkFramebuffer` objects a planned
//! render-target group (§4.6) turns into. Sits between the planner and the
//! frame command buffer (§4.8): the planner decides subpass structure and
//! load/store ops, this module turns that decision into live Vulkan
//! objects and reuses them across frames when the shape repeats.

use crate::error::BackendResult;
use crate::planner::FinalizedAttachment;
use crate::resource_pool::ResourcePool;
use ash::vk;
use std::collections::HashMap;

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
struct AttachmentKey {
  format: vk::Format,
  samples: u32,
  load_op: vk::AttachmentLoadOp,
  store_op: vk::AttachmentStoreOp,
  initial_layout: vk::ImageLayout,
  final_layout: vk::ImageLayout,
}

/// What one planned subpass references, mirroring `SubpassPlan` — kept
/// separate so it can derive `Hash` for the render-pass cache key.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
struct SubpassKey {
  color_used: Vec<bool>,
  color_input: Vec<bool>,
  color_preserve: Vec<bool>,
  depth_used: bool,
  depth_input: bool,
  depth_preserve: bool,
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
struct RenderPassKey {
  color: Vec<Option<AttachmentKey>>,
  depth_stencil: Option<AttachmentKey>,
  subpasses: Vec<SubpassKey>,
  dependency_count: usize,
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
struct FramebufferKey {
  render_pass: vk::RenderPass,
  views: Vec<vk::ImageView>,
  extent: (u32, u32),
}

/// What one planned subpass references (§4.6, §3's per-subpass
/// `input_attachments`/`preserve_attachments`): which of the group's color
/// slots (and depth/stencil) this particular subpass actually reads or
/// writes, which of those are read back as an input attachment within the
/// same subpass (forcing `GENERAL` layout), and which attachments this
/// subpass must preserve because neither reads nor writes them but an
/// earlier and a later subpass do.
#[derive(Clone, Debug, Default)]
pub struct SubpassPlan {
  pub color_used: Vec<bool>,
  pub color_input: Vec<bool>,
  pub color_preserve: Vec<bool>,
  pub depth_used: bool,
  pub depth_input: bool,
  pub depth_preserve: bool,
}

/// One finalized render-target group, ready to become a `VkRenderPass`:
/// the planner's attachment resolution plus the per-subpass membership and
/// dependency list computed alongside it.
pub struct PlannedRenderPass<'a> {
  pub color_attachments: &'a [Option<(FinalizedAttachment, u32)>],
  pub depth_stencil_attachment: Option<&'a (FinalizedAttachment, u32)>,
  pub subpasses: &'a [SubpassPlan],
  pub dependencies: &'a [vk::SubpassDependency],
  pub extent: vk::Extent2D,
}

#[derive(Default)]
pub struct RenderPassCache {
  render_passes: HashMap<RenderPassKey, vk::RenderPass>,
  framebuffers: HashMap<FramebufferKey, vk::Framebuffer>,
}

impl RenderPassCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get_or_create_render_pass(
    &mut self, device: &ash::Device, resources: &ResourcePool, plan: &PlannedRenderPass,
  ) -> BackendResult<vk::RenderPass> {
    let color_keys: Vec<Option<AttachmentKey>> = plan
      .color_attachments
      .iter()
      .map(|slot| slot.as_ref().map(|(attachment, sample_count)| attachment_key(resources, attachment, *sample_count)))
      .collect();
    let depth_key = plan.depth_stencil_attachment.map(|(attachment, sample_count)| attachment_key(resources, attachment, *sample_count));
    let subpass_keys: Vec<SubpassKey> = plan
      .subpasses
      .iter()
      .map(|s| SubpassKey {
        color_used: s.color_used.clone(),
        color_input: s.color_input.clone(),
        color_preserve: s.color_preserve.clone(),
        depth_used: s.depth_used,
        depth_input: s.depth_input,
        depth_preserve: s.depth_preserve,
      })
      .collect();

    let key = RenderPassKey {
      color: color_keys,
      depth_stencil: depth_key,
      subpasses: subpass_keys,
      dependency_count: plan.dependencies.len(),
    };
    if let Some(render_pass) = self.render_passes.get(&key) {
      return Ok(*render_pass);
    }

    let render_pass = build_render_pass(device, resources, plan)?;
    self.render_passes.insert(key, render_pass);
    Ok(render_pass)
  }

  pub fn get_or_create_framebuffer(
    &mut self, device: &ash::Device, render_pass: vk::RenderPass, views: &[vk::ImageView], extent: vk::Extent2D,
  ) -> BackendResult<vk::Framebuffer> {
    let key = FramebufferKey { render_pass, views: views.to_vec(), extent: (extent.width, extent.height) };
    if let Some(framebuffer) = self.framebuffers.get(&key) {
      return Ok(*framebuffer);
    }

    let create_info = vk::FramebufferCreateInfo::builder()
      .render_pass(render_pass)
      .attachments(views)
      .width(extent.width)
      .height(extent.height)
      .layers(1)
      .build();
    let framebuffer = unsafe { device.create_framebuffer(&create_info, None) }?;
    self.framebuffers.insert(key, framebuffer);
    Ok(framebuffer)
  }

  pub fn destroy(&mut self, device: &ash::Device) {
    for (_, framebuffer) in self.framebuffers.drain() {
      unsafe { device.destroy_framebuffer(framebuffer, None) };
    }
    for (_, render_pass) in self.render_passes.drain() {
      unsafe { device.destroy_render_pass(render_pass, None) };
    }
  }
}

fn attachment_key(resources: &ResourcePool, attachment: &FinalizedAttachment, sample_count: u32) -> AttachmentKey {
  AttachmentKey {
    format: resolve_format(resources, attachment),
    samples: sample_count,
    load_op: attachment.load_op,
    store_op: attachment.store_op,
    initial_layout: attachment.initial_layout,
    final_layout: attachment.final_layout,
  }
}

fn build_render_pass(device: &ash::Device, resources: &ResourcePool, plan: &PlannedRenderPass) -> BackendResult<vk::RenderPass> {
  let mut descriptions = Vec::new();
  let color_index: Vec<Option<u32>> = plan
    .color_attachments
    .iter()
    .map(|slot| {
      slot.as_ref().map(|(attachment, sample_count)| {
        let index = descriptions.len() as u32;
        descriptions.push(attachment_description(resources, attachment, *sample_count));
        index
      })
    })
    .collect();
  let depth_index = plan.depth_stencil_attachment.map(|(attachment, sample_count)| {
    let index = descriptions.len() as u32;
    descriptions.push(attachment_description(resources, attachment, sample_count));
    index
  });

  // Scratch storage for each subpass's reference arrays; `VkSubpassDescription`
  // borrows these, so they must outlive the `subpasses` vec built below.
  let mut color_refs_per_subpass: Vec<Vec<vk::AttachmentReference>> = Vec::with_capacity(plan.subpasses.len());
  let mut depth_ref_per_subpass: Vec<Option<vk::AttachmentReference>> = Vec::with_capacity(plan.subpasses.len());
  let mut preserve_per_subpass: Vec<Vec<u32>> = Vec::with_capacity(plan.subpasses.len());

  for subpass in plan.subpasses {
    let color_refs: Vec<vk::AttachmentReference> = color_index
      .iter()
      .enumerate()
      .map(|(slot, index)| match index {
        Some(index) if subpass.color_used.get(slot).copied().unwrap_or(false) => {
          let layout = if subpass.color_input.get(slot).copied().unwrap_or(false) {
            vk::ImageLayout::GENERAL
          } else {
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
          };
          vk::AttachmentReference { attachment: *index, layout }
        }
        _ => vk::AttachmentReference { attachment: vk::ATTACHMENT_UNUSED, layout: vk::ImageLayout::UNDEFINED },
      })
      .collect();

    let depth_ref = depth_index.filter(|_| subpass.depth_used).map(|index| {
      let layout = if subpass.depth_input { vk::ImageLayout::GENERAL } else { vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL };
      vk::AttachmentReference { attachment: index, layout }
    });

    let mut preserve = Vec::new();
    for (slot, index) in color_index.iter().enumerate() {
      if let Some(index) = index {
        if subpass.color_preserve.get(slot).copied().unwrap_or(false) {
          preserve.push(*index);
        }
      }
    }
    if subpass.depth_preserve {
      if let Some(index) = depth_index {
        preserve.push(index);
      }
    }

    color_refs_per_subpass.push(color_refs);
    depth_ref_per_subpass.push(depth_ref);
    preserve_per_subpass.push(preserve);
  }

  let mut subpasses = Vec::with_capacity(plan.subpasses.len().max(1));
  for i in 0..plan.subpasses.len().max(1) {
    let mut builder = vk::SubpassDescription::builder().pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS);
    if let Some(color_refs) = color_refs_per_subpass.get(i) {
      builder = builder.color_attachments(color_refs);
    }
    if let Some(Some(depth_ref)) = depth_ref_per_subpass.get(i) {
      builder = builder.depth_stencil_attachment(depth_ref);
    }
    if let Some(preserve) = preserve_per_subpass.get(i) {
      builder = builder.preserve_attachments(preserve);
    }
    subpasses.push(builder.build());
  }

  let create_info = vk::RenderPassCreateInfo::builder()
    .attachments(&descriptions)
    .subpasses(&subpasses)
    .dependencies(plan.dependencies)
    .build();
  Ok(unsafe { device.create_render_pass(&create_info, None) }?)
}

fn attachment_description(resources: &ResourcePool, attachment: &FinalizedAttachment, sample_count: u32) -> vk::AttachmentDescription {
  vk::AttachmentDescription::builder()
    .format(resolve_format(resources, attachment))
    .samples(crate::resource_pool::sample_count_flags(sample_count))
    .load_op(attachment.load_op)
    .store_op(attachment.store_op)
    .stencil_load_op(attachment.load_op)
    .stencil_store_op(attachment.store_op)
    .initial_layout(attachment.initial_layout)
    .final_layout(attachment.final_layout)
    .build()
}

fn resolve_format(resources: &ResourcePool, attachment: &FinalizedAttachment) -> vk::Format {
  resources.image(attachment.texture).map(|image| image.descriptor.pixel_format.to_vk()).unwrap_or(vk::Format::UNDEFINED)
}
