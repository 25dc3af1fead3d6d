//! Frame command buffer (§4.8): takes the planner's grouped passes and the
//! compacted resource-command stream, drives the three encoders over the
//! frame's command range, and submits with timeline-semaphore discipline.
//! Completion is detected by a small pool of background waiter threads
//! rather than blocking the render thread.

use crate::config::TIMELINE_WAIT_TIMEOUT_NS;
use crate::device::Queue;
use crate::encoders::blit::BlitEncoder;
use crate::encoders::compute::ComputeEncoder;
use crate::encoders::draw::{DrawEncoder, PipelineBinding};
use crate::encoders::check_resource_commands;
use crate::error::{BackendError, BackendResult};
use crate::layout_tracker::SubresourceKey;
use crate::planner::{compute_subpass_dependencies, finalize_attachment, group_passes, RenderPassGroup};
use crate::render_pass_cache::{PlannedRenderPass, RenderPassCache, SubpassPlan};
use crate::resource_commands::{Phase, ResourceCommandStream};
use crate::resource_pool::ResourcePool;
use crate::resources::{Extent2D, ImageHandle};
use crate::transient::DescriptorRing;
use crate::usage::{Access, CommandIndex, CommandRange, PassCommands, PassKind, PassRecord, ResourceUsage};
use ash::vk;
use std::collections::{HashMap, HashSet};

/// A timeline-semaphore wait or signal point the frame must honor (§4.8).
#[derive(Copy, Clone, Debug)]
pub struct TimelinePoint {
  pub semaphore: vk::Semaphore,
  pub value: u64,
}

/// The pre-allocated command buffer a frame encodes into; the caller owns
/// the pool it came from (§4.1's per-queue command pool).
pub struct CommandBufferInfo {
  pub command_buffer: vk::CommandBuffer,
  pub command_pool: vk::CommandPool,
}

/// One image's full-frame usage list plus whether its layout timeline
/// should carry its last entry forward into this frame (§4.5, §5):
/// persistent images that are read before being written again this frame
/// need their previous final layout, transient images always start fresh.
pub struct ImageUsageRecord {
  pub handle: ImageHandle,
  pub usages: Vec<ResourceUsage>,
  pub is_persistent: bool,
}

struct PresentRequest {
  acquire_semaphore: vk::Semaphore,
  present_semaphore: vk::Semaphore,
}

#[derive(Copy, Clone, Debug)]
struct PassGroupInfo {
  group_index: usize,
  begins_render_pass: bool,
  advances_subpass: bool,
  ends_render_pass: bool,
}

struct PreparedGroup {
  render_pass: vk::RenderPass,
  framebuffer: vk::Framebuffer,
  extent: Extent2D,
  clear_values: Vec<vk::ClearValue>,
}

pub struct FrameCommandBuffer<'a> {
  device: &'a ash::Device,
  ext_dynamic_state: &'a ash::extensions::ext::ExtendedDynamicState,
  queue: &'a Queue,
  command_buffer: vk::CommandBuffer,
  command_pool: vk::CommandPool,
  resources: &'a mut ResourcePool,
  descriptor_ring: &'a mut DescriptorRing,
  pipelines: &'a HashMap<u64, PipelineBinding>,
  passes: Vec<PassRecord>,
  pass_group_info: HashMap<usize, PassGroupInfo>,
  prepared_groups: Vec<PreparedGroup>,
  resource_commands: ResourceCommandStream,
  wait_points: Vec<(TimelinePoint, vk::PipelineStageFlags)>,
  signal_points: Vec<TimelinePoint>,
  present: Option<PresentRequest>,
  submitted: bool,
}

impl<'a> FrameCommandBuffer<'a> {
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    device: &'a ash::Device, ext_dynamic_state: &'a ash::extensions::ext::ExtendedDynamicState, queue: &'a Queue,
    command_info: CommandBufferInfo, resources: &'a mut ResourcePool, descriptor_ring: &'a mut DescriptorRing,
    pipelines: &'a HashMap<u64, PipelineBinding>, render_pass_cache: &mut RenderPassCache, passes: Vec<PassRecord>,
    image_usages: Vec<ImageUsageRecord>, resource_commands: ResourceCommandStream, frame_index: u64,
  ) -> BackendResult<Self> {
    for record in &image_usages {
      if let Some(image) = resources.image_mut(record.handle) {
        let is_depth_or_stencil = image.descriptor.pixel_format.is_depth_or_stencil();
        image.layouts.compute_frame_layouts(&record.usages, is_depth_or_stencil, record.is_persistent, frame_index);
      }
    }
    let usage_map: HashMap<ImageHandle, Vec<ResourceUsage>> = image_usages.into_iter().map(|r| (r.handle, r.usages)).collect();

    let begin_info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT).build();
    unsafe { device.begin_command_buffer(command_info.command_buffer, &begin_info) }?;

    let groups = group_passes(&passes);
    let mut pass_group_info = HashMap::new();
    let mut prepared_groups = Vec::with_capacity(groups.len());
    for (group_index, group) in groups.iter().enumerate() {
      for (i, pass_in_group) in group.passes.iter().enumerate() {
        pass_group_info.insert(
          pass_in_group.pass_index,
          PassGroupInfo {
            group_index,
            begins_render_pass: i == 0,
            advances_subpass: i > 0 && group.passes[i].subpass_index != group.passes[i - 1].subpass_index,
            ends_render_pass: i == group.passes.len() - 1,
          },
        );
      }
      prepared_groups.push(prepare_group(device, resources, render_pass_cache, &passes, group, &usage_map)?);
    }

    Ok(Self {
      device,
      ext_dynamic_state,
      queue,
      command_buffer: command_info.command_buffer,
      command_pool: command_info.command_pool,
      resources,
      descriptor_ring,
      pipelines,
      passes,
      pass_group_info,
      prepared_groups,
      resource_commands,
      wait_points: Vec::new(),
      signal_points: Vec::new(),
      present: None,
      submitted: false,
    })
  }

  /// Encodes the pass at `index` into the command buffer, opening or
  /// advancing its render pass's subpass as needed (§4.7, §4.8).
  pub fn encode_pass(&mut self, index: usize) -> BackendResult<()> {
    let kind = self.passes[index].kind;
    let command_range = self.passes[index].command_range;

    match kind {
      PassKind::Draw => {
        let info = *self.pass_group_info.get(&index).expect("a draw pass must belong to a render-pass group");
        let group = &self.prepared_groups[info.group_index];
        let mut encoder = DrawEncoder::new(self.device, self.ext_dynamic_state, self.command_buffer, self.resources, self.descriptor_ring, self.pipelines);
        if info.begins_render_pass {
          encoder.begin_render_pass(group.render_pass, group.framebuffer, group.extent, &group.clear_values);
        } else if info.advances_subpass {
          encoder.next_subpass();
        }
        if let PassCommands::Draw(commands) = &self.passes[index].commands {
          encoder.execute(&mut self.resource_commands, command_range, commands)?;
        }
        if info.ends_render_pass {
          encoder.end_render_pass();
        }
      }
      PassKind::Compute => {
        let mut encoder = ComputeEncoder::new(self.device, self.command_buffer, self.resources, self.descriptor_ring, self.pipelines);
        if let PassCommands::Compute(commands) = &self.passes[index].commands {
          encoder.execute(&mut self.resource_commands, command_range, commands)?;
        }
      }
      PassKind::Blit => {
        let encoder = BlitEncoder::new(self.device, self.command_buffer, self.resources);
        if let PassCommands::Blit(commands) = &self.passes[index].commands {
          encoder.execute(&mut self.resource_commands, command_range, commands)?;
        }
      }
      PassKind::External | PassKind::Cpu => {
        check_resource_commands(self.device, self.command_buffer, &mut self.resource_commands, command_range.lo, Phase::Before);
        check_resource_commands(self.device, self.command_buffer, &mut self.resource_commands, command_range.last(), Phase::After);
      }
    }
    Ok(())
  }

  /// The pool `command_buffer` was allocated from, for callers that need
  /// to free or reset it outside the normal commit/drop paths.
  pub fn command_pool(&self) -> vk::CommandPool {
    self.command_pool
  }

  pub fn wait(&mut self, point: TimelinePoint, stage: vk::PipelineStageFlags) {
    self.wait_points.push((point, stage));
  }

  pub fn signal(&mut self, point: TimelinePoint) {
    self.signal_points.push(point);
  }

  /// Registers the swapchain image this frame renders into for
  /// presentation (§4.8): binary acquire/present semaphore pair, distinct
  /// from the timeline semaphores used for everything else. The caller
  /// still has to present through `Swapchain::submit` after `commit`
  /// returns; this only wires the semaphore pair into the submission.
  pub fn present(&mut self, acquire_semaphore: vk::Semaphore, present_semaphore: vk::Semaphore) {
    self.present = Some(PresentRequest { acquire_semaphore, present_semaphore });
  }

  /// Ends recording, submits with a `VkTimelineSemaphoreSubmitInfo`, and
  /// hands completion detection off to a background waiter thread (§4.8).
  /// `on_completion` always runs, whether the wait succeeds, times out, or
  /// the device is lost. Does not itself present a swapchain image; the
  /// caller does that with `Swapchain::submit` once this returns.
  pub fn commit(mut self, on_completion: impl FnOnce(BackendResult<()>) + Send + 'static) -> BackendResult<()> {
    unsafe { self.device.end_command_buffer(self.command_buffer) }?;

    let mut wait_semaphores = Vec::with_capacity(self.wait_points.len() + 1);
    let mut wait_dst_stages = Vec::with_capacity(self.wait_points.len() + 1);
    let mut wait_values = Vec::with_capacity(self.wait_points.len() + 1);
    for (point, stage) in &self.wait_points {
      wait_semaphores.push(point.semaphore);
      wait_dst_stages.push(*stage);
      wait_values.push(point.value);
    }
    if let Some(present) = &self.present {
      wait_semaphores.push(present.acquire_semaphore);
      wait_dst_stages.push(vk::PipelineStageFlags::ALL_GRAPHICS);
      wait_values.push(0);
    }

    let mut signal_semaphores = Vec::with_capacity(self.signal_points.len() + 1);
    let mut signal_values = Vec::with_capacity(self.signal_points.len() + 1);
    for point in &self.signal_points {
      signal_semaphores.push(point.semaphore);
      signal_values.push(point.value);
    }
    if let Some(present) = &self.present {
      signal_semaphores.push(present.present_semaphore);
      signal_values.push(0);
    }

    let mut timeline_info = vk::TimelineSemaphoreSubmitInfo::builder()
      .wait_semaphore_values(&wait_values)
      .signal_semaphore_values(&signal_values)
      .build();

    let command_buffers = [self.command_buffer];
    let submit_info = vk::SubmitInfo::builder()
      .wait_semaphores(&wait_semaphores)
      .wait_dst_stage_mask(&wait_dst_stages)
      .command_buffers(&command_buffers)
      .signal_semaphores(&signal_semaphores)
      .push_next(&mut timeline_info)
      .build();

    unsafe { self.device.queue_submit(self.queue.handle, &[submit_info], vk::Fence::null()) }?;
    self.submitted = true;

    spawn_waiter(self.device.clone(), self.signal_points.clone(), on_completion);
    Ok(())
  }
}

impl<'a> Drop for FrameCommandBuffer<'a> {
  /// §5 cancellation: dropping an uncommitted frame returns the command
  /// buffer to the pool and never presents.
  fn drop(&mut self) {
    if !self.submitted {
      if self.present.is_some() {
        log::warn!("frame dropped before commit with a swapchain image acquired; image stays acquired until the next present");
      }
      unsafe {
        let _ = self.device.reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty());
      }
    }
  }
}

fn group_command_range(passes: &[PassRecord], group: &RenderPassGroup) -> CommandRange {
  let lo = group.passes.iter().map(|p| passes[p.pass_index].command_range.lo).min().unwrap_or(0);
  let hi = group.passes.iter().map(|p| passes[p.pass_index].command_range.hi).max().unwrap_or(0);
  CommandRange::new(lo, hi)
}

fn prepare_group(
  device: &ash::Device, resources: &ResourcePool, render_pass_cache: &mut RenderPassCache, passes: &[PassRecord],
  group: &RenderPassGroup, usage_map: &HashMap<ImageHandle, Vec<ResourceUsage>>,
) -> BackendResult<PreparedGroup> {
  let group_range = group_command_range(passes, group);
  let subpass_count = group.passes.iter().map(|p| p.subpass_index).max().unwrap_or(0) + 1;
  let empty_usages: Vec<ResourceUsage> = Vec::new();
  let usages_for = |handle: ImageHandle| usage_map.get(&handle).unwrap_or(&empty_usages).as_slice();

  let mut color_attachments = Vec::with_capacity(group.color_attachments.len());
  let mut clear_values = Vec::new();
  let mut views = Vec::new();
  for slot in &group.color_attachments {
    match slot {
      Some(attachment) => {
        let image = resources.image(attachment.texture).expect("color attachment image handle must resolve");
        let usages = usages_for(attachment.texture);
        let key = SubresourceKey::full_resource(image.descriptor.mip_levels, image.descriptor.array_layers);
        let finalized = finalize_attachment(
          attachment.texture, attachment.level, attachment.slice, attachment.clear_operation, group_range, usages, &image.layouts, key, false,
        );
        clear_values.push(finalized.clear_value.unwrap_or(vk::ClearValue { color: vk::ClearColorValue { float32: [0.0; 4] } }));
        views.push(image.view);
        color_attachments.push(Some((finalized, image.descriptor.sample_count)));
      }
      None => color_attachments.push(None),
    }
  }

  let depth_stencil_attachment = if let Some(depth) = &group.depth_attachment {
    let image = resources.image(depth.texture).expect("depth attachment image handle must resolve");
    let usages = usages_for(depth.texture);
    let key = SubresourceKey::full_resource(image.descriptor.mip_levels, image.descriptor.array_layers);
    let finalized =
      finalize_attachment(depth.texture, depth.level, depth.slice, depth.clear_operation, group_range, usages, &image.layouts, key, true);
    clear_values.push(finalized.clear_value.unwrap_or(vk::ClearValue { color: vk::ClearColorValue { float32: [0.0; 4] } }));
    views.push(image.view);
    Some((finalized, image.descriptor.sample_count))
  } else if let Some(stencil) = &group.stencil_attachment {
    let image = resources.image(stencil.texture).expect("stencil attachment image handle must resolve");
    let usages = usages_for(stencil.texture);
    let key = SubresourceKey::full_resource(image.descriptor.mip_levels, image.descriptor.array_layers);
    let finalized =
      finalize_attachment(stencil.texture, stencil.level, stencil.slice, stencil.clear_operation, group_range, usages, &image.layouts, key, true);
    clear_values.push(finalized.clear_value.unwrap_or(vk::ClearValue { color: vk::ClearColorValue { float32: [0.0; 4] } }));
    views.push(image.view);
    Some((finalized, image.descriptor.sample_count))
  } else {
    None
  };

  let pass_subpass: HashMap<usize, u32> = group.passes.iter().map(|p| (p.pass_index, p.subpass_index)).collect();
  let mut input_attachments: Vec<HashSet<ImageHandle>> = vec![HashSet::new(); subpass_count as usize];
  for (&handle, usages) in usage_map.iter() {
    for usage in usages {
      if let Some(&subpass_index) = pass_subpass.get(&usage.pass_index) {
        if matches!(usage.access, Access::InputAttachment | Access::InputAttachmentReadWrite) {
          input_attachments[subpass_index as usize].insert(handle);
        }
      }
    }
  }

  let (color_preserve, depth_preserve) = group.preserve_attachments();
  let depth_stencil_handle = group.depth_attachment.map(|a| a.texture).or_else(|| group.stencil_attachment.map(|a| a.texture));
  let subpasses: Vec<SubpassPlan> = group
    .subpasses
    .iter()
    .enumerate()
    .map(|(i, membership)| {
      let reads = &input_attachments[i];
      let color_used = membership.color.clone();
      let color_input = group
        .color_attachments
        .iter()
        .enumerate()
        .map(|(slot, attachment)| {
          color_used.get(slot).copied().unwrap_or(false) && attachment.map_or(false, |a| reads.contains(&a.texture))
        })
        .collect();
      let depth_used = membership.depth || membership.stencil;
      let depth_input = depth_used && depth_stencil_handle.map_or(false, |handle| reads.contains(&handle));
      SubpassPlan {
        color_used,
        color_input,
        color_preserve: color_preserve[i].clone(),
        depth_used,
        depth_input,
        depth_preserve: depth_preserve[i],
      }
    })
    .collect();

  let dependencies = compute_subpass_dependencies(group, passes, &input_attachments);
  let extent = vk::Extent2D { width: group.size.width, height: group.size.height };
  let plan = PlannedRenderPass {
    color_attachments: &color_attachments,
    depth_stencil_attachment: depth_stencil_attachment.as_ref(),
    subpasses: &subpasses,
    dependencies: &dependencies,
    extent,
  };

  let render_pass = render_pass_cache.get_or_create_render_pass(device, resources, &plan)?;
  let framebuffer = render_pass_cache.get_or_create_framebuffer(device, render_pass, &views, extent)?;

  Ok(PreparedGroup { render_pass, framebuffer, extent: group.size, clear_values })
}

/// §4.8 ambient addition: one OS thread per in-flight submission, parked
/// on `vkWaitSemaphores` with the 10-second budget (§7). `on_completion`
/// always fires, including on timeout or device loss, so the caller can
/// release resources deterministically.
fn spawn_waiter(device: ash::Device, signal_points: Vec<TimelinePoint>, on_completion: impl FnOnce(BackendResult<()>) + Send + 'static) {
  std::thread::spawn(move || {
    if signal_points.is_empty() {
      on_completion(Ok(()));
      return;
    }
    let semaphores: Vec<vk::Semaphore> = signal_points.iter().map(|p| p.semaphore).collect();
    let values: Vec<u64> = signal_points.iter().map(|p| p.value).collect();
    let wait_info = vk::SemaphoreWaitInfo::builder().semaphores(&semaphores).values(&values).build();
    let result = unsafe { device.wait_semaphores(&wait_info, TIMELINE_WAIT_TIMEOUT_NS) };
    let outcome = match result {
      Ok(()) => Ok(()),
      Err(vk::Result::TIMEOUT) => Err(BackendError::TimelineWaitTimeout),
      Err(e) => Err(e.into()),
    };
    on_completion(outcome);
  });
}

