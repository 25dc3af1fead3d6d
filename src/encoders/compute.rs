//! Compute encoder (§4.7): dispatch, with the same resource-command
//! phasing and deferred-binding discipline as the draw encoder.

use crate::encoders::check_resource_commands;
use crate::error::BackendResult;
use crate::reflection::BindingPath;
use crate::resource_commands::{Phase, ResourceCommandStream};
use crate::resource_pool::ResourcePool;
use crate::usage::{BoundResource, CommandRange, ComputeCommand};
use ash::vk;
use std::collections::HashMap;

use crate::encoders::draw::PipelineBinding;

enum PendingBinding {
  Resource(BoundResource),
  Bytes(Vec<u8>),
}

pub struct ComputeEncoder<'a> {
  device: &'a ash::Device,
  cmd: vk::CommandBuffer,
  resources: &'a ResourcePool,
  descriptor_ring: &'a mut crate::transient::DescriptorRing,
  pipelines: &'a HashMap<u64, PipelineBinding>,
  current_pipeline_key: Option<u64>,
  pipeline_dirty: bool,
  pending: HashMap<BindingPath, PendingBinding>,
}

impl<'a> ComputeEncoder<'a> {
  pub fn new(
    device: &'a ash::Device, cmd: vk::CommandBuffer, resources: &'a ResourcePool,
    descriptor_ring: &'a mut crate::transient::DescriptorRing, pipelines: &'a HashMap<u64, PipelineBinding>,
  ) -> Self {
    Self { device, cmd, resources, descriptor_ring, pipelines, current_pipeline_key: None, pipeline_dirty: false, pending: HashMap::new() }
  }

  pub fn execute(&mut self, stream: &mut ResourceCommandStream, range: CommandRange, commands: &[ComputeCommand]) -> BackendResult<()> {
    debug_assert_eq!(commands.len(), (range.hi - range.lo) as usize);
    for (offset, command) in commands.iter().enumerate() {
      let index = range.lo + offset as u32;
      check_resource_commands(self.device, self.cmd, stream, index, Phase::Before);
      self.execute_command(command)?;
      check_resource_commands(self.device, self.cmd, stream, index, Phase::After);
    }
    Ok(())
  }

  fn execute_command(&mut self, command: &ComputeCommand) -> BackendResult<()> {
    match command {
      ComputeCommand::SetPipeline { pipeline_key } => {
        if self.current_pipeline_key != Some(*pipeline_key) {
          self.current_pipeline_key = Some(*pipeline_key);
          self.pipeline_dirty = true;
        }
      }
      ComputeCommand::BindResource { path, resource } => {
        self.pending.insert(*path, PendingBinding::Resource(*resource));
      }
      ComputeCommand::SetBytes { path, data } => {
        self.pending.insert(*path, PendingBinding::Bytes(data.clone()));
      }
      ComputeCommand::Dispatch { group_count_x, group_count_y, group_count_z } => {
        self.flush_bindings()?;
        unsafe { self.device.cmd_dispatch(self.cmd, *group_count_x, *group_count_y, *group_count_z) };
      }
      ComputeCommand::DispatchIndirect { buffer, offset } => {
        self.flush_bindings()?;
        let vk_buffer = self.resources.buffer(*buffer).expect("indirect dispatch buffer handle must resolve").handle;
        unsafe { self.device.cmd_dispatch_indirect(self.cmd, vk_buffer, *offset) };
      }
    }
    Ok(())
  }

  fn flush_bindings(&mut self) -> BackendResult<()> {
    let key = self.current_pipeline_key.expect("a pipeline must be bound before dispatching");
    let binding = self.pipelines.get(&key).expect("pipeline_key must resolve to a built pipeline");

    if self.pipeline_dirty {
      unsafe { self.device.cmd_bind_pipeline(self.cmd, vk::PipelineBindPoint::COMPUTE, binding.pipeline) };
      self.pipeline_dirty = false;
    }
    if self.pending.is_empty() {
      return Ok(());
    }

    let pending = std::mem::take(&mut self.pending);
    let mut by_set: HashMap<u32, Vec<(BindingPath, BoundResource)>> = HashMap::new();
    for (path, value) in pending {
      match value {
        PendingBinding::Resource(resource) => {
          by_set.entry(path.set).or_default().push((path, resource));
        }
        PendingBinding::Bytes(data) => {
          let range = binding.push_constant_range.expect("pipeline has no push-constant range declared");
          unsafe { self.device.cmd_push_constants(self.cmd, binding.layout, range.stage_flags, range.offset, &data) };
        }
      }
    }

    for (set, entries) in by_set {
      let layout = binding.set_layouts[set as usize];
      let sets = self.descriptor_ring.allocate(self.device, std::slice::from_ref(&layout))?;
      let descriptor_set = sets[0];
      write_descriptor_set(self.device, self.resources, binding, descriptor_set, &entries);
      unsafe {
        self.device.cmd_bind_descriptor_sets(self.cmd, vk::PipelineBindPoint::COMPUTE, binding.layout, set, &[descriptor_set], &[]);
      }
    }
    Ok(())
  }
}

fn write_descriptor_set(
  device: &ash::Device, resources: &ResourcePool, binding: &PipelineBinding, descriptor_set: vk::DescriptorSet,
  entries: &[(BindingPath, BoundResource)],
) {
  use crate::reflection::ReflectedResourceType;

  let mut image_infos: Vec<vk::DescriptorImageInfo> = Vec::with_capacity(entries.len());
  let mut buffer_infos: Vec<vk::DescriptorBufferInfo> = Vec::with_capacity(entries.len());
  let mut writes: Vec<(BindingPath, usize, vk::DescriptorType, bool)> = Vec::with_capacity(entries.len());

  for (path, resource) in entries {
    let reflection = binding.resources.iter().find(|r| r.path.set == path.set && r.path.binding == path.binding);
    let Some(reflection) = reflection else { continue };
    match resource {
      BoundResource::Image(handle) => {
        let image = resources.image(*handle).expect("bound image handle must resolve");
        let layout = match reflection.resource_type {
          ReflectedResourceType::StorageImage => vk::ImageLayout::GENERAL,
          _ => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        image_infos.push(vk::DescriptorImageInfo { sampler: vk::Sampler::null(), image_view: image.view, image_layout: layout });
        writes.push((*path, image_infos.len() - 1, reflection.resource_type.to_vk(), true));
      }
      BoundResource::Buffer(handle) => {
        let buffer = resources.buffer(*handle).expect("bound buffer handle must resolve");
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
    unsafe { device.update_descriptor_sets(&descriptor_writes, &[]) };
  }
}
