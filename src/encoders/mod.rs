//! Command encoders (§4.7): the `vkCmdSetEvent`/`vkCmdWaitEvents`/
//! `vkCmdPipelineBarrier` phasing point every encoder kind shares, plus the
//! draw/compute/blit specializations.

pub mod blit;
pub mod compute;
pub mod draw;

pub use blit::BlitEncoder;
pub use compute::ComputeEncoder;
pub use draw::{DrawEncoder, PipelineBinding};

use crate::resource_commands::{BarrierPayload, Phase, ResourceCommand, ResourceCommandKind, ResourceCommandStream};
use crate::usage::CommandIndex;
use ash::vk;

fn fold_stage(masks: impl Iterator<Item = vk::PipelineStageFlags>) -> vk::PipelineStageFlags {
  let combined = masks.fold(vk::PipelineStageFlags::empty(), |acc, m| acc | m);
  if combined.is_empty() {
    vk::PipelineStageFlags::ALL_COMMANDS
  } else {
    combined
  }
}

fn barrier_src_stage(payload: &BarrierPayload) -> vk::PipelineStageFlags {
  fold_stage(
    payload
      .memory
      .iter()
      .map(|b| b.src_stage_mask)
      .chain(payload.buffers.iter().map(|b| b.src_stage_mask))
      .chain(payload.images.iter().map(|b| b.src_stage_mask)),
  )
}

fn barrier_dst_stage(payload: &BarrierPayload) -> vk::PipelineStageFlags {
  fold_stage(
    payload
      .memory
      .iter()
      .map(|b| b.dst_stage_mask)
      .chain(payload.buffers.iter().map(|b| b.dst_stage_mask))
      .chain(payload.images.iter().map(|b| b.dst_stage_mask)),
  )
}

fn memory_barriers(payload: &BarrierPayload) -> Vec<vk::MemoryBarrier> {
  payload
    .memory
    .iter()
    .map(|b| {
      vk::MemoryBarrier::builder()
        .src_access_mask(b.src_access_mask)
        .dst_access_mask(b.dst_access_mask)
        .build()
    })
    .collect()
}

fn buffer_barriers(payload: &BarrierPayload) -> Vec<vk::BufferMemoryBarrier> {
  payload
    .buffers
    .iter()
    .map(|b| {
      vk::BufferMemoryBarrier::builder()
        .src_access_mask(b.src_access_mask)
        .dst_access_mask(b.dst_access_mask)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .buffer(b.buffer)
        .offset(b.offset)
        .size(b.size)
        .build()
    })
    .collect()
}

fn image_barriers(payload: &BarrierPayload) -> Vec<vk::ImageMemoryBarrier> {
  payload
    .images
    .iter()
    .map(|b| {
      vk::ImageMemoryBarrier::builder()
        .src_access_mask(b.src_access_mask)
        .dst_access_mask(b.dst_access_mask)
        .old_layout(b.old_layout)
        .new_layout(b.new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(b.image)
        .subresource_range(b.subresource_range)
        .build()
    })
    .collect()
}

fn apply(device: &ash::Device, cmd: vk::CommandBuffer, command: ResourceCommand) {
  match command.kind {
    ResourceCommandKind::SignalEvent(event) => unsafe {
      device.cmd_set_event(cmd, event, vk::PipelineStageFlags::ALL_COMMANDS);
    },
    ResourceCommandKind::WaitEvents { events, barriers } => unsafe {
      device.cmd_wait_events(
        cmd,
        &events,
        barrier_src_stage(&barriers),
        barrier_dst_stage(&barriers),
        &memory_barriers(&barriers),
        &buffer_barriers(&barriers),
        &image_barriers(&barriers),
      );
    },
    ResourceCommandKind::PipelineBarrier(barriers) => unsafe {
      device.cmd_pipeline_barrier(
        cmd,
        barrier_src_stage(&barriers),
        barrier_dst_stage(&barriers),
        vk::DependencyFlags::empty(),
        &memory_barriers(&barriers),
        &buffer_barriers(&barriers),
        &image_barriers(&barriers),
      );
    },
  }
}

/// The shared phasing point (§4.7): drains every resource command queued
/// for `(index, phase)` off the stream and records it.
pub(crate) fn check_resource_commands(
  device: &ash::Device, cmd: vk::CommandBuffer, stream: &mut ResourceCommandStream, index: CommandIndex, phase: Phase,
) {
  for command in stream.drain_at(index, phase) {
    apply(device, cmd, command);
  }
}
