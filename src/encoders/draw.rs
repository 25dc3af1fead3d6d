//! Draw encoder (§4.7): render-pass/subpass management, deferred resource
//! binding, and the flipped-Y viewport convention.

use crate::encoders::check_resource_commands;
use crate::error::{BackendError, BackendResult};
use crate::reflection::{BindingPath, ReflectedResourceType, ResourceReflection};
use crate::resource_commands::{Phase, ResourceCommandStream};
use crate::resource_pool::ResourcePool;
use crate::resources::Extent2D;
use crate::usage::{BoundResource, CommandRange, DrawCommand};
use ash::vk;
use std::collections::HashMap;

/// Everything the encoder needs to bind and flush one pipeline's resources,
/// produced ahead of time by the reflection + cache layer (§4.4).
#[derive(Clone)]
pub struct PipelineBinding {
  pub pipeline: vk::Pipeline,
  pub layout: vk::PipelineLayout,
  pub set_layouts: Vec<vk::DescriptorSetLayout>,
  pub push_constant_range: Option<vk::PushConstantRange>,
  pub resources: Vec<ResourceReflection>,
}

enum PendingBinding {
  Resource(BoundResource),
  Bytes(Vec<u8>),
}

/// Encodes one draw pass's command range into an already-open command
/// buffer. Render-pass open/close and `vkCmdNextSubpass` transitions are
/// driven by the caller (frame-level orchestration knows group boundaries);
/// this encoder handles everything from viewport setup down to the
/// individual `vkCmdDraw*` calls.
pub struct DrawEncoder<'a> {
  device: &'a ash::Device,
  ext_dynamic_state: &'a ash::extensions::ext::ExtendedDynamicState,
  cmd: vk::CommandBuffer,
  resources: &'a ResourcePool,
  descriptor_ring: &'a mut crate::transient::DescriptorRing,
  pipelines: &'a HashMap<u64, PipelineBinding>,
  current_pipeline_key: Option<u64>,
  pipeline_dirty: bool,
  pending: HashMap<BindingPath, PendingBinding>,
}

impl<'a> DrawEncoder<'a> {
  pub fn new(
    device: &'a ash::Device, ext_dynamic_state: &'a ash::extensions::ext::ExtendedDynamicState, cmd: vk::CommandBuffer,
    resources: &'a ResourcePool, descriptor_ring: &'a mut crate::transient::DescriptorRing,
    pipelines: &'a HashMap<u64, PipelineBinding>,
  ) -> Self {
    Self {
      device,
      ext_dynamic_state,
      cmd,
      resources,
      descriptor_ring,
      pipelines,
      current_pipeline_key: None,
      pipeline_dirty: false,
      pending: HashMap::new(),
    }
  }

  pub fn begin_render_pass(&self, render_pass: vk::RenderPass, framebuffer: vk::Framebuffer, render_area: Extent2D, clear_values: &[vk::ClearValue]) {
    let begin_info = vk::RenderPassBeginInfo::builder()
      .render_pass(render_pass)
      .framebuffer(framebuffer)
      .render_area(vk::Rect2D { offset: vk::Offset2D { x: 0, y: 0 }, extent: vk::Extent2D { width: render_area.width, height: render_area.height } })
      .clear_values(clear_values)
      .build();
    unsafe { self.device.cmd_begin_render_pass(self.cmd, &begin_info, vk::SubpassContents::INLINE) };
    self.set_default_viewport_scissor(render_area);
  }

  pub fn next_subpass(&self) {
    unsafe { self.device.cmd_next_subpass(self.cmd, vk::SubpassContents::INLINE) };
  }

  pub fn end_render_pass(&self) {
    unsafe { self.device.cmd_end_render_pass(self.cmd) };
  }

  /// Y-flipped viewport (`origin.y = height`, `height = -height`) so clip
  /// space matches the rest of the pipeline's winding convention (§4.7),
  /// plus a scissor equal to the render-target extent and zeroed dynamic
  /// depth bias / stencil reference.
  fn set_default_viewport_scissor(&self, extent: Extent2D) {
    let viewport = vk::Viewport {
      x: 0.0,
      y: extent.height as f32,
      width: extent.width as f32,
      height: -(extent.height as f32),
      min_depth: 0.0,
      max_depth: 1.0,
    };
    self.set_viewport(viewport);
    let scissor = vk::Rect2D { offset: vk::Offset2D { x: 0, y: 0 }, extent: vk::Extent2D { width: extent.width, height: extent.height } };
    unsafe {
      self.device.cmd_set_scissor(self.cmd, 0, &[scissor]);
      self.device.cmd_set_depth_bias(self.cmd, 0.0, 0.0, 0.0);
      self.device.cmd_set_stencil_reference(self.cmd, vk::StencilFaceFlags::FRONT_AND_BACK, 0);
    }
  }

  fn set_viewport(&self, viewport: vk::Viewport) {
    unsafe { self.device.cmd_set_viewport(self.cmd, 0, &[viewport]) };
  }

  /// Executes every command in `commands`, one per command index in
  /// `range`, phasing resource commands before/after each (§4.7).
  pub fn execute(&mut self, stream: &mut ResourceCommandStream, range: CommandRange, commands: &[DrawCommand]) -> BackendResult<()> {
    debug_assert_eq!(commands.len(), (range.hi - range.lo) as usize);
    for (offset, command) in commands.iter().enumerate() {
      let index = range.lo + offset as u32;
      check_resource_commands(self.device, self.cmd, stream, index, Phase::Before);
      self.execute_command(command)?;
      check_resource_commands(self.device, self.cmd, stream, index, Phase::After);
    }
    Ok(())
  }

  fn execute_command(&mut self, command: &DrawCommand) -> BackendResult<()> {
    match command {
      DrawCommand::SetPipeline { pipeline_key } => {
        if self.current_pipeline_key != Some(*pipeline_key) {
          self.current_pipeline_key = Some(*pipeline_key);
          self.pipeline_dirty = true;
        }
      }
      DrawCommand::SetVertexBuffer { slot, buffer, offset } => {
        let vk_buffer = self.resources.buffer(*buffer).expect("vertex buffer handle must resolve").handle;
        unsafe { self.device.cmd_bind_vertex_buffers(self.cmd, *slot, &[vk_buffer], &[*offset]) };
      }
      DrawCommand::SetIndexBuffer { buffer, offset, index_type } => {
        let vk_buffer = self.resources.buffer(*buffer).expect("index buffer handle must resolve").handle;
        unsafe { self.device.cmd_bind_index_buffer(self.cmd, vk_buffer, *offset, *index_type) };
      }
      DrawCommand::SetBytes { path, data } => {
        self.pending.insert(*path, PendingBinding::Bytes(data.clone()));
      }
      DrawCommand::BindResource { path, resource } => {
        self.pending.insert(*path, PendingBinding::Resource(*resource));
      }
      DrawCommand::SetDepthStencilState { depth_test_enable, depth_write_enable, compare } => unsafe {
        self.ext_dynamic_state.cmd_set_depth_test_enable(self.cmd, *depth_test_enable);
        self.ext_dynamic_state.cmd_set_depth_write_enable(self.cmd, *depth_write_enable);
        self.ext_dynamic_state.cmd_set_depth_compare_op(self.cmd, *compare);
      },
      DrawCommand::SetViewportOverride { viewport } => self.set_viewport(*viewport),
      DrawCommand::Draw { vertex_count, instance_count, first_vertex, first_instance } => {
        self.flush_bindings()?;
        unsafe { self.device.cmd_draw(self.cmd, *vertex_count, *instance_count, *first_vertex, *first_instance) };
      }
      DrawCommand::DrawIndexed { index_count, instance_count, first_index, vertex_offset, first_instance } => {
        self.flush_bindings()?;
        unsafe {
          self
            .device
            .cmd_draw_indexed(self.cmd, *index_count, *instance_count, *first_index, *vertex_offset, *first_instance)
        };
      }
    }
    Ok(())
  }

  /// Rebinds the pipeline if dirty, then flushes every queued descriptor
  /// and push-constant binding (§4.7): called once, immediately before
  /// each draw.
  fn flush_bindings(&mut self) -> BackendResult<()> {
    let key = self.current_pipeline_key.expect("a pipeline must be bound before drawing");
    let binding = self.pipelines.get(&key).expect("pipeline_key must resolve to a built pipeline");

    if self.pipeline_dirty {
      unsafe { self.device.cmd_bind_pipeline(self.cmd, vk::PipelineBindPoint::GRAPHICS, binding.pipeline) };
      self.pipeline_dirty = false;
    }

    if self.pending.is_empty() {
      return Ok(());
    }

    let pending = std::mem::take(&mut self.pending);
    let mut by_set: HashMap<u32, Vec<(BindingPath, PendingBinding)>> = HashMap::new();
    for (path, value) in pending {
      if path.is_push_constant() {
        self.push_inline_bytes(binding, value)?;
        continue;
      }
      by_set.entry(path.set).or_default().push((path, value));
    }

    for (set, entries) in by_set {
      let layout = binding.set_layouts[set as usize];
      let sets = self.descriptor_ring.allocate(self.device, std::slice::from_ref(&layout))?;
      let descriptor_set = sets[0];
      self.write_descriptor_set(binding, descriptor_set, &entries);
      unsafe {
        self.device.cmd_bind_descriptor_sets(self.cmd, vk::PipelineBindPoint::GRAPHICS, binding.layout, set, &[descriptor_set], &[]);
      }
    }
    Ok(())
  }

  fn push_inline_bytes(&self, binding: &PipelineBinding, value: PendingBinding) -> BackendResult<()> {
    let PendingBinding::Bytes(data) = value else {
      panic!("push-constant path must carry inline bytes, never a resource binding");
    };
    let range = binding.push_constant_range.expect("pipeline has no push-constant range declared");
    if data.len() as u32 > range.size {
      return Err(BackendError::InlineUploadExceedsPushConstantRange { size: data.len() as u32, push_constant_range: range.size });
    }
    unsafe { self.device.cmd_push_constants(self.cmd, binding.layout, range.stage_flags, range.offset, &data) };
    Ok(())
  }

  fn write_descriptor_set(&self, binding: &PipelineBinding, descriptor_set: vk::DescriptorSet, entries: &[(BindingPath, PendingBinding)]) {
    let mut image_infos: Vec<vk::DescriptorImageInfo> = Vec::with_capacity(entries.len());
    let mut buffer_infos: Vec<vk::DescriptorBufferInfo> = Vec::with_capacity(entries.len());
    let mut writes: Vec<(BindingPath, usize, vk::DescriptorType, bool)> = Vec::with_capacity(entries.len());

    for (path, value) in entries {
      let reflection = binding.resources.iter().find(|r| r.path.set == path.set && r.path.binding == path.binding);
      let Some(reflection) = reflection else { continue };
      let resource = match value {
        PendingBinding::Resource(r) => *r,
        PendingBinding::Bytes(_) => continue,
      };
      match resource {
        BoundResource::Image(handle) => {
          let image = self.resources.image(handle).expect("bound image handle must resolve");
          let layout = match reflection.resource_type {
            ReflectedResourceType::StorageImage => vk::ImageLayout::GENERAL,
            _ => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
          };
          image_infos.push(vk::DescriptorImageInfo { sampler: vk::Sampler::null(), image_view: image.view, image_layout: layout });
          writes.push((*path, image_infos.len() - 1, reflection.resource_type.to_vk(), true));
        }
        BoundResource::Buffer(handle) => {
          let buffer = self.resources.buffer(handle).expect("bound buffer handle must resolve");
          buffer_infos.push(vk::DescriptorBufferInfo { buffer: buffer.handle, offset: buffer.offset, range: vk::WHOLE_SIZE });
          writes.push((*path, buffer_infos.len() - 1, reflection.resource_type.to_vk(), false));
        }
      }
    }

    let descriptor_writes: Vec<vk::WriteDescriptorSet> = writes
      .iter()
      .map(|(path, idx, descriptor_type, is_image)| {
        let mut builder = vk::WriteDescriptorSet::builder()
          .dst_set(descriptor_set)
          .dst_binding(path.binding)
          .dst_array_element(path.array_index)
          .descriptor_type(*descriptor_type);
        builder = if *is_image {
          builder.image_info(std::slice::from_ref(&image_infos[*idx]))
        } else {
          builder.buffer_info(std::slice::from_ref(&buffer_infos[*idx]))
        };
        builder.build()
      })
      .collect();

    if !descriptor_writes.is_empty() {
      unsafe { self.device.update_descriptor_sets(&descriptor_writes, &[]) };
    }
  }
}
