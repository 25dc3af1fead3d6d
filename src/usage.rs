//! The upstream input contract (§3, §6): pass records and resource usage
//! lists produced by the higher-level graph recorder. The core consumes
//! these read-only; it never constructs them itself except in tests.

use crate::resources::{BufferHandle, Extent2D, ImageHandle, RenderTargetDescriptor};
use ash::vk;

/// Frame-global, monotonically increasing. The unit of ordering and
/// barrier placement (§3, §5).
pub type CommandIndex = u32;

/// A half-open `[lo, hi)` range of command-sequence numbers.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct CommandRange {
  pub lo: CommandIndex,
  pub hi: CommandIndex,
}

impl CommandRange {
  pub fn new(lo: CommandIndex, hi: CommandIndex) -> Self {
    debug_assert!(lo <= hi, "command range must not be inverted");
    Self { lo, hi }
  }

  pub fn contains(&self, index: CommandIndex) -> bool {
    index >= self.lo && index < self.hi
  }

  pub fn last(&self) -> CommandIndex {
    debug_assert!(self.hi > self.lo, "empty command range has no last index");
    self.hi - 1
  }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum PassKind {
  Draw,
  Compute,
  Blit,
  /// Submitted by an external API the graph doesn't control (e.g. a
  /// windowing-system callback); carries no commands of its own.
  External,
  /// A synchronous CPU-side callback with no device commands.
  Cpu,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Access {
  Read,
  Write,
  ReadWrite,
  ConstantBuffer,
  RenderTargetReadWrite,
  RenderTargetWriteOnly,
  InputAttachment,
  InputAttachmentReadWrite,
  VertexBuffer,
  IndexBuffer,
  BlitSource,
  BlitDestination,
  Sampler,
}

impl Access {
  pub fn is_write(self) -> bool {
    matches!(
      self,
      Access::Write
        | Access::ReadWrite
        | Access::RenderTargetReadWrite
        | Access::RenderTargetWriteOnly
        | Access::InputAttachmentReadWrite
        | Access::BlitDestination
    )
  }

  pub fn is_read(self) -> bool {
    matches!(
      self,
      Access::Read
        | Access::ReadWrite
        | Access::ConstantBuffer
        | Access::RenderTargetReadWrite
        | Access::InputAttachment
        | Access::InputAttachmentReadWrite
        | Access::VertexBuffer
        | Access::IndexBuffer
        | Access::BlitSource
        | Access::Sampler
    )
  }

  pub fn is_render_target(self) -> bool {
    matches!(
      self,
      Access::RenderTargetReadWrite | Access::RenderTargetWriteOnly
    )
  }
}

/// Subresource or buffer-range touched by one usage.
#[derive(Copy, Clone, Debug)]
pub enum ActiveRange {
  Subresource {
    base_mip_level: u32,
    level_count: u32,
    base_array_layer: u32,
    layer_count: u32,
  },
  BufferRange {
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
  },
}

impl ActiveRange {
  pub fn full_subresource(mip_levels: u32, array_layers: u32) -> Self {
    ActiveRange::Subresource {
      base_mip_level: 0,
      level_count: mip_levels,
      base_array_layer: 0,
      layer_count: array_layers,
    }
  }
}

/// One recorded access of a resource within a frame (§3).
#[derive(Copy, Clone, Debug)]
pub struct ResourceUsage {
  pub pass_index: usize,
  pub command_range: CommandRange,
  pub access: Access,
  pub stages: vk::PipelineStageFlags,
  pub active_range: ActiveRange,
}

/// Typed commands recorded within a draw pass.
#[derive(Clone, Debug)]
pub enum DrawCommand {
  SetPipeline { pipeline_key: u64 },
  SetVertexBuffer { slot: u32, buffer: BufferHandle, offset: vk::DeviceSize },
  SetIndexBuffer { buffer: BufferHandle, offset: vk::DeviceSize, index_type: vk::IndexType },
  SetBytes { path: crate::reflection::BindingPath, data: Vec<u8> },
  BindResource { path: crate::reflection::BindingPath, resource: BoundResource },
  SetDepthStencilState { depth_test_enable: bool, depth_write_enable: bool, compare: vk::CompareOp },
  SetViewportOverride { viewport: vk::Viewport },
  Draw { vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32 },
  DrawIndexed { index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32, first_instance: u32 },
}

#[derive(Copy, Clone, Debug)]
pub enum BoundResource {
  Image(ImageHandle),
  Buffer(BufferHandle),
}

#[derive(Clone, Debug)]
pub enum ComputeCommand {
  SetPipeline { pipeline_key: u64 },
  BindResource { path: crate::reflection::BindingPath, resource: BoundResource },
  SetBytes { path: crate::reflection::BindingPath, data: Vec<u8> },
  Dispatch { group_count_x: u32, group_count_y: u32, group_count_z: u32 },
  DispatchIndirect { buffer: BufferHandle, offset: vk::DeviceSize },
}

#[derive(Clone, Debug)]
pub enum BlitCommand {
  CopyBufferToBuffer { src: BufferHandle, src_offset: vk::DeviceSize, dst: BufferHandle, dst_offset: vk::DeviceSize, size: vk::DeviceSize },
  CopyBufferToImage { src: BufferHandle, src_offset: vk::DeviceSize, dst: ImageHandle, dst_level: u32, dst_slice: u32 },
  CopyImageToBuffer { src: ImageHandle, src_level: u32, src_slice: u32, dst: BufferHandle, dst_offset: vk::DeviceSize },
  CopyImageToImage { src: ImageHandle, src_level: u32, src_slice: u32, dst: ImageHandle, dst_level: u32, dst_slice: u32 },
  Blit { src: ImageHandle, src_level: u32, dst: ImageHandle, dst_level: u32, filter: vk::Filter },
  Fill { dst: BufferHandle, offset: vk::DeviceSize, size: vk::DeviceSize, value: u32 },
}

#[derive(Clone, Debug)]
pub enum PassCommands {
  Draw(Vec<DrawCommand>),
  Compute(Vec<ComputeCommand>),
  Blit(Vec<BlitCommand>),
  None,
}

/// One recorded pass (§3).
#[derive(Clone, Debug)]
pub struct PassRecord {
  pub kind: PassKind,
  pub command_range: CommandRange,
  pub commands: PassCommands,
  /// Present only for `kind == Draw`.
  pub render_target: Option<RenderTargetDescriptor>,
}

impl PassRecord {
  pub fn render_target_size(&self) -> Option<Extent2D> {
    self.render_target.as_ref().and_then(|rt| rt.size)
  }
}
