//! Descriptor-set-layout and pipeline-layout caches (§4.4).

use crate::error::BackendResult;
use crate::reflection::shader_module::ResourceReflection;
use ash::vk;
use std::collections::HashMap;

/// Memoizes `descriptor_set_layout(set)` per reflection object. Keyed by
/// `(reflection_identity, set)`, never by binding contents alone: two
/// reflection objects with identical bindings must not share a cached
/// layout handle (§4.4).
#[derive(Default)]
pub struct DescriptorSetLayoutCache {
  layouts: HashMap<(u64, u32), vk::DescriptorSetLayout>,
}

impl DescriptorSetLayoutCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get_or_create(
    &mut self, device: &ash::Device, reflection_identity: u64, set: u32,
    bindings_for_set: &[&ResourceReflection],
  ) -> BackendResult<vk::DescriptorSetLayout> {
    if let Some(layout) = self.layouts.get(&(reflection_identity, set)) {
      return Ok(*layout);
    }

    let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings_for_set
      .iter()
      .map(|r| {
        vk::DescriptorSetLayoutBinding::builder()
          .binding(r.path.binding)
          .descriptor_type(r.resource_type.to_vk())
          .descriptor_count(r.array_length)
          .stage_flags(r.accessed_stages)
          .build()
      })
      .collect();

    // Every binding permits unbound array slots (§4.4).
    let binding_flags = vec![vk::DescriptorBindingFlags::PARTIALLY_BOUND; vk_bindings.len()];
    let mut flags_info = vk::DescriptorSetLayoutBindingFlagsCreateInfo::builder()
      .binding_flags(&binding_flags)
      .build();
    let create_info = vk::DescriptorSetLayoutCreateInfo::builder()
      .bindings(&vk_bindings)
      .push_next(&mut flags_info)
      .build();

    let layout = unsafe { device.create_descriptor_set_layout(&create_info, None) }?;
    self.layouts.insert((reflection_identity, set), layout);
    Ok(layout)
  }

  pub fn destroy(&mut self, device: &ash::Device) {
    for (_, layout) in self.layouts.drain() {
      unsafe { device.destroy_descriptor_set_layout(layout, None) };
    }
  }
}

/// Identifies a pipeline layout by the shader identities it was built from
/// plus the descriptor-set count (§4.4): equal keys must imply an equal
/// `VkPipelineLayout`, so the key carries shader identity rather than just
/// the bindings the layouts happen to contain.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct PipelineLayoutKey {
  pub shader_identities: Vec<u64>,
  pub set_count: u32,
}

#[derive(Default)]
pub struct PipelineLayoutCache {
  layouts: HashMap<PipelineLayoutKey, vk::PipelineLayout>,
}

impl PipelineLayoutCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get_or_create(
    &mut self, device: &ash::Device, key: PipelineLayoutKey, set_layouts: &[vk::DescriptorSetLayout],
    push_constant_ranges: &[vk::PushConstantRange],
  ) -> BackendResult<vk::PipelineLayout> {
    if let Some(layout) = self.layouts.get(&key) {
      return Ok(*layout);
    }
    let create_info = vk::PipelineLayoutCreateInfo::builder()
      .set_layouts(set_layouts)
      .push_constant_ranges(push_constant_ranges)
      .build();
    let layout = unsafe { device.create_pipeline_layout(&create_info, None) }?;
    self.layouts.insert(key, layout);
    Ok(layout)
  }

  pub fn destroy(&mut self, device: &ash::Device) {
    for (_, layout) in self.layouts.drain() {
      unsafe { device.destroy_pipeline_layout(layout, None) };
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn distinct_shader_identities_never_collide() {
    let a = PipelineLayoutKey { shader_identities: vec![1, 2], set_count: 1 };
    let b = PipelineLayoutKey { shader_identities: vec![3, 4], set_count: 1 };
    assert_ne!(a, b);
  }
}
