//! SPIR-V parsing (§4.4). `spirv_reflect::ShaderModule` does the actual
//! parsing; this folds its per-entry-point output into the path-keyed
//! tables the rest of the backend consumes.

use crate::error::{BackendError, BackendResult};
use crate::reflection::BindingPath;
use ash::vk;
use spirv_reflect::types::ReflectDescriptorType;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ReflectedResourceType {
  UniformBuffer,
  StorageBuffer,
  SampledImage,
  StorageImage,
  Sampler,
  CombinedImageSampler,
  InputAttachment,
}

impl ReflectedResourceType {
  fn from_reflect(ty: ReflectDescriptorType) -> Option<Self> {
    Some(match ty {
      ReflectDescriptorType::UniformBuffer => Self::UniformBuffer,
      ReflectDescriptorType::StorageBuffer => Self::StorageBuffer,
      ReflectDescriptorType::SampledImage => Self::SampledImage,
      ReflectDescriptorType::StorageImage => Self::StorageImage,
      ReflectDescriptorType::Sampler => Self::Sampler,
      ReflectDescriptorType::CombinedImageSampler => Self::CombinedImageSampler,
      ReflectDescriptorType::InputAttachment => Self::InputAttachment,
      _ => return None,
    })
  }

  pub fn to_vk(self) -> vk::DescriptorType {
    match self {
      Self::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
      Self::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
      Self::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
      Self::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
      Self::Sampler => vk::DescriptorType::SAMPLER,
      Self::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
      Self::InputAttachment => vk::DescriptorType::INPUT_ATTACHMENT,
    }
  }
}

/// Reflection data for one descriptor binding, folded across every entry
/// point it is accessed from (§4.4).
#[derive(Clone, Debug)]
pub struct ResourceReflection {
  pub path: BindingPath,
  pub array_length: u32,
  pub resource_type: ReflectedResourceType,
  pub accessed_stages: vk::ShaderStageFlags,
  /// `min..max` accessed byte offset across entry points, for buffer-class
  /// resources; `None` for images/samplers.
  pub binding_range: Option<(u32, u32)>,
}

/// Reflection data for every module backing one pipeline (§4.4): resources
/// folded into a path-keyed table, plus the merged push-constant ranges.
pub struct ShaderReflection {
  pub resources: Vec<ResourceReflection>,
  pub push_constant_ranges: Vec<vk::PushConstantRange>,
  pub max_set: Option<u32>,
}

impl ShaderReflection {
  /// `modules` is `(spirv_bytes, stage)` for every shader stage in the
  /// pipeline, e.g. `[(vertex_spv, VERTEX), (fragment_spv, FRAGMENT)]`.
  pub fn from_spirv_modules(modules: &[(&[u8], vk::ShaderStageFlags)]) -> BackendResult<Self> {
    let mut resources: HashMap<(u32, u32), ResourceReflection> = HashMap::new();
    let mut push_constant_ranges = Vec::new();
    let mut max_set = None;

    for (bytes, stage) in modules {
      let module = spirv_reflect::ShaderModule::load_u8_data(bytes)
        .map_err(BackendError::ShaderReflectionFailed)?;
      let desc_sets = module
        .enumerate_descriptor_sets(None)
        .map_err(BackendError::ShaderReflectionFailed)?;

      for desc_set in &desc_sets {
        max_set = Some(max_set.map_or(desc_set.set, |m: u32| m.max(desc_set.set)));
        for binding in &desc_set.bindings {
          let Some(resource_type) = ReflectedResourceType::from_reflect(binding.descriptor_type) else {
            continue;
          };
          let key = (desc_set.set, binding.binding);
          let entry = resources.entry(key).or_insert_with(|| ResourceReflection {
            path: BindingPath::new(desc_set.set, binding.binding, 0),
            array_length: binding.count.max(1),
            resource_type,
            accessed_stages: vk::ShaderStageFlags::empty(),
            binding_range: None,
          });
          entry.accessed_stages |= *stage;

          let size = binding.block.size;
          if size > 0 {
            let (lo, hi) = entry.binding_range.unwrap_or((0, 0));
            entry.binding_range = Some((lo, hi.max(size)));
          }
        }
      }

      let push_constants = module
        .enumerate_push_constant_blocks(None)
        .map_err(BackendError::ShaderReflectionFailed)?;
      for block in &push_constants {
        push_constant_ranges.push(vk::PushConstantRange {
          stage_flags: *stage,
          offset: block.offset,
          size: block.size,
        });
      }
    }

    Ok(Self { resources: resources.into_values().collect(), push_constant_ranges, max_set })
  }

  pub fn bindings_for_set(&self, set: u32) -> Vec<&ResourceReflection> {
    self.resources.iter().filter(|r| r.path.set == set).collect()
  }
}

/// Directory-scan identifier resolution (§4.4, §6): builds `identifier ->
/// .spv path` by the entry-point name, falling back to the file stem for
/// modules whose only entry point is GLSL's `main`.
pub struct ShaderIdentifierTable {
  paths: HashMap<String, PathBuf>,
}

impl ShaderIdentifierTable {
  pub fn scan(dir: &Path) -> BackendResult<Self> {
    let mut paths = HashMap::new();
    let entries = std::fs::read_dir(dir)
      .map_err(|e| BackendError::ShaderReflectionFailed(format!("{}: {}", dir.display(), e)))?;

    for entry in entries {
      let entry = entry.map_err(|e| BackendError::ShaderReflectionFailed(e.to_string()))?;
      let path = entry.path();
      if path.extension().and_then(|e| e.to_str()) != Some("spv") {
        continue;
      }
      let bytes = std::fs::read(&path)
        .map_err(|e| BackendError::ShaderReflectionFailed(format!("{}: {}", path.display(), e)))?;
      let module =
        spirv_reflect::ShaderModule::load_u8_data(&bytes).map_err(BackendError::ShaderReflectionFailed)?;
      let entry_points = module
        .enumerate_entry_points()
        .map_err(BackendError::ShaderReflectionFailed)?;

      let identifier = entry_points
        .iter()
        .map(|e| e.name.clone())
        .find(|name| name != "main")
        .unwrap_or_else(|| {
          path.file_stem().and_then(|s| s.to_str()).unwrap_or("unknown").to_string()
        });
      paths.insert(identifier, path);
    }

    Ok(Self { paths })
  }

  pub fn resolve(&self, identifier: &str) -> Option<&Path> {
    self.paths.get(identifier).map(PathBuf::as_path)
  }
}
