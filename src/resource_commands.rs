//! The planned synchronization stream (§3, §4.7): barriers and events
//! tagged by the command index they must run before/after, consumed by
//! encoders via a running cursor.

use crate::usage::CommandIndex;
use ash::vk;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub enum Phase {
  Before,
  After,
}

#[derive(Clone, Debug)]
pub struct ImageBarrier {
  pub image: vk::Image,
  pub subresource_range: vk::ImageSubresourceRange,
  pub old_layout: vk::ImageLayout,
  pub new_layout: vk::ImageLayout,
  pub src_access_mask: vk::AccessFlags,
  pub dst_access_mask: vk::AccessFlags,
  pub src_stage_mask: vk::PipelineStageFlags,
  pub dst_stage_mask: vk::PipelineStageFlags,
}

#[derive(Clone, Debug)]
pub struct BufferBarrier {
  pub buffer: vk::Buffer,
  pub offset: vk::DeviceSize,
  pub size: vk::DeviceSize,
  pub src_access_mask: vk::AccessFlags,
  pub dst_access_mask: vk::AccessFlags,
  pub src_stage_mask: vk::PipelineStageFlags,
  pub dst_stage_mask: vk::PipelineStageFlags,
}

#[derive(Clone, Debug)]
pub struct MemoryBarrier {
  pub src_access_mask: vk::AccessFlags,
  pub dst_access_mask: vk::AccessFlags,
  pub src_stage_mask: vk::PipelineStageFlags,
  pub dst_stage_mask: vk::PipelineStageFlags,
}

#[derive(Clone, Debug, Default)]
pub struct BarrierPayload {
  pub memory: Vec<MemoryBarrier>,
  pub buffers: Vec<BufferBarrier>,
  pub images: Vec<ImageBarrier>,
}

#[derive(Clone, Debug)]
pub enum ResourceCommandKind {
  SignalEvent(vk::Event),
  WaitEvents { events: Vec<vk::Event>, barriers: BarrierPayload },
  PipelineBarrier(BarrierPayload),
}

#[derive(Clone, Debug)]
pub struct ResourceCommand {
  pub command_index: CommandIndex,
  pub phase: Phase,
  pub kind: ResourceCommandKind,
}

/// The sorted `(command_index, phase)` stream for one frame, plus the
/// running cursor encoders advance through it (§4.7).
#[derive(Default)]
pub struct ResourceCommandStream {
  commands: Vec<ResourceCommand>,
  cursor: usize,
}

impl ResourceCommandStream {
  pub fn new(mut commands: Vec<ResourceCommand>) -> Self {
    commands.sort_by(|a, b| (a.command_index, a.phase).cmp(&(b.command_index, b.phase)));
    Self { commands, cursor: 0 }
  }

  pub fn is_sorted(&self) -> bool {
    self
      .commands
      .windows(2)
      .all(|w| (w[0].command_index, w[0].phase) <= (w[1].command_index, w[1].phase))
  }

  /// Drains every command whose `(command_index, phase)` equals the
  /// requested key, advancing the cursor monotonically. §4.7: "advances
  /// the cursor emitting any ... whose `(index, phase)` equals the
  /// cursor." The cursor only moves forward: callers must query in
  /// non-decreasing `(command_index, phase)` order within a frame.
  pub fn drain_at(&mut self, command_index: CommandIndex, phase: Phase) -> Vec<ResourceCommand> {
    let mut drained = Vec::new();
    while self.cursor < self.commands.len() {
      let candidate = &self.commands[self.cursor];
      if candidate.command_index != command_index || candidate.phase != phase {
        break;
      }
      drained.push(self.commands[self.cursor].clone());
      self.cursor += 1;
    }
    drained
  }

  pub fn remaining(&self) -> usize {
    self.commands.len() - self.cursor
  }

  /// Programming invariant (§7): every resource command must eventually be
  /// consumed by an encoder within the frame it was planned for.
  pub fn assert_fully_consumed(&self) {
    assert_eq!(
      self.remaining(),
      0,
      "resource command stream has {} unconsumed entries; cursor out of range",
      self.remaining()
    );
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn barrier_cmd(index: CommandIndex, phase: Phase) -> ResourceCommand {
    ResourceCommand {
      command_index: index,
      phase,
      kind: ResourceCommandKind::PipelineBarrier(BarrierPayload::default()),
    }
  }

  #[test]
  fn constructor_sorts_by_index_then_phase() {
    let stream = ResourceCommandStream::new(vec![
      barrier_cmd(5, Phase::After),
      barrier_cmd(5, Phase::Before),
      barrier_cmd(2, Phase::Before),
    ]);
    assert!(stream.is_sorted());
  }

  #[test]
  fn drain_at_only_consumes_matching_entries() {
    let mut stream = ResourceCommandStream::new(vec![
      barrier_cmd(2, Phase::Before),
      barrier_cmd(2, Phase::After),
      barrier_cmd(4, Phase::Before),
    ]);
    assert_eq!(stream.drain_at(2, Phase::Before).len(), 1);
    assert_eq!(stream.remaining(), 2);
    assert_eq!(stream.drain_at(2, Phase::After).len(), 1);
    assert_eq!(stream.remaining(), 1);
    assert_eq!(stream.drain_at(4, Phase::Before).len(), 1);
    stream.assert_fully_consumed();
  }

  #[test]
  fn drain_at_nonmatching_index_is_empty() {
    let mut stream = ResourceCommandStream::new(vec![barrier_cmd(9, Phase::Before)]);
    assert!(stream.drain_at(3, Phase::Before).is_empty());
  }
}
