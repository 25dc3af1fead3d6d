//! Device & queue registry (§4.1).
//!
//! Enumerates physical devices, creates the logical device, and binds
//! queue families to roles. Selection (`select`) is a pure function over a
//! supplied `&[PhysicalDeviceInfo]` so it can be unit tested without a live
//! `VkInstance`.

use crate::config::{DeviceSelectionCriteria, MANDATORY_DEVICE_EXTENSIONS};
use crate::error::{BackendError, BackendResult};
use crate::format::PixelFormat;
use crate::resources::TextureUsage;
use ash::vk;
use std::collections::HashMap;
use std::ffi::CStr;
use std::sync::Mutex;

#[derive(Clone, Debug)]
pub struct PhysicalDeviceInfo {
  pub handle: vk::PhysicalDevice,
  pub properties: vk::PhysicalDeviceProperties,
  pub queue_families: Vec<vk::QueueFamilyProperties>,
  pub extensions: Vec<String>,
  pub api_version: u32,
  pub features: vk::PhysicalDeviceFeatures,
  pub features11: vk::PhysicalDeviceVulkan11Features,
  pub features12: vk::PhysicalDeviceVulkan12Features,
}

/// Queries every physical device visible to `instance` and assembles the
/// capability record `select` chooses from (§4.1): properties, queue
/// family properties, supported extensions, and the 1.0/1.1/1.2 feature
/// bits via a chained `vkGetPhysicalDeviceFeatures2`.
pub fn enumerate_physical_devices(instance: &ash::Instance) -> BackendResult<Vec<PhysicalDeviceInfo>> {
  let handles = unsafe { instance.enumerate_physical_devices() }?;
  handles
    .into_iter()
    .map(|handle| {
      let properties = unsafe { instance.get_physical_device_properties(handle) };
      let queue_families = unsafe { instance.get_physical_device_queue_family_properties(handle) };
      let extension_properties = unsafe { instance.enumerate_device_extension_properties(handle) }?;
      let extensions = extension_properties
        .iter()
        .map(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) }.to_string_lossy().into_owned())
        .collect();

      let mut features11 = vk::PhysicalDeviceVulkan11Features::default();
      let mut features12 = vk::PhysicalDeviceVulkan12Features::default();
      let mut features2 = vk::PhysicalDeviceFeatures2::builder()
        .push_next(&mut features11)
        .push_next(&mut features12)
        .build();
      unsafe { instance.get_physical_device_features2(handle, &mut features2) };
      // The chain above points into this frame's locals; clear it before
      // storing so a later push_next chain doesn't inherit stale pointers.
      features11.p_next = std::ptr::null_mut();
      features12.p_next = std::ptr::null_mut();

      Ok(PhysicalDeviceInfo {
        handle,
        properties,
        queue_families,
        extensions,
        api_version: properties.api_version,
        features: features2.features,
        features11,
        features12,
      })
    })
    .collect()
}

/// Pure selection logic (§4.1 ambient addition): picks the index into
/// `candidates` that best satisfies `criteria`, preferring the requested
/// device type among devices that support the mandatory + required
/// extensions and API version.
pub fn select(candidates: &[PhysicalDeviceInfo], criteria: &DeviceSelectionCriteria) -> Option<usize> {
  let satisfies = |info: &PhysicalDeviceInfo| -> bool {
    if info.api_version < criteria.minimum_api_version {
      return false;
    }
    let has_graphics = info
      .queue_families
      .iter()
      .any(|f| f.queue_flags.contains(vk::QueueFlags::GRAPHICS));
    if !has_graphics {
      return false;
    }
    MANDATORY_DEVICE_EXTENSIONS
      .iter()
      .chain(criteria.required_extensions.iter())
      .all(|required| info.extensions.iter().any(|e| e == required))
  };

  let mut best: Option<(usize, bool)> = None;
  for (idx, info) in candidates.iter().enumerate() {
    if !satisfies(info) {
      continue;
    }
    let matches_preferred = criteria
      .preferred_device_type
      .map(|t| info.properties.device_type == t)
      .unwrap_or(true);
    match best {
      None => best = Some((idx, matches_preferred)),
      Some((_, already_preferred)) if matches_preferred && !already_preferred => {
        best = Some((idx, matches_preferred))
      }
      _ => {}
    }
  }
  best.map(|(idx, _)| idx)
}

/// A family index is treated as transfer-capable whenever it advertises
/// graphics or compute, regardless of whether the driver also sets the
/// explicit `TRANSFER` bit (§4.1: "software-enforced").
pub fn family_supports_transfer(flags: vk::QueueFlags) -> bool {
  flags.intersects(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER)
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum QueueRole {
  Graphics,
  Compute,
  Copy,
  Present,
}

pub struct Queue {
  pub family_index: u32,
  pub queue_index: u32,
  pub handle: vk::Queue,
  pub roles: Vec<QueueRole>,
  pub command_pool: Mutex<vk::CommandPool>,
}

/// Owns the logical device, its queues, and physical-device capability
/// queries. Constructed at startup, destroyed at shutdown (§3).
pub struct Device {
  pub instance: ash::Instance,
  pub physical_device: vk::PhysicalDevice,
  pub device: ash::Device,
  pub queues: Vec<Queue>,
  graphics_queue_idx: usize,
  present_queue_idx: Option<usize>,
  pub sharing_mode: vk::SharingMode,
  pub concurrent_family_indices: Vec<u32>,
  format_properties_cache: Mutex<HashMap<vk::Format, vk::FormatProperties>>,
}

impl Device {
  /// Creates the logical device and binds every queue family's full
  /// advertised queue count (except the graphics family, which requests
  /// exactly one) to a role (§4.1). `surface` is optional: when absent, no
  /// present queue is bound and only exclusive sharing is used.
  pub fn create_logical_device(
    instance: ash::Instance, info: &PhysicalDeviceInfo, criteria: &DeviceSelectionCriteria,
    surface: Option<(&ash::extensions::khr::Surface, vk::SurfaceKHR)>,
  ) -> BackendResult<Self> {
    let graphics_family = info
      .queue_families
      .iter()
      .position(|f| f.queue_flags.contains(vk::QueueFlags::GRAPHICS))
      .expect("select() guarantees a graphics-capable family exists") as u32;

    let present_family = match surface {
      Some((surface_loader, surface_khr)) => (0..info.queue_families.len() as u32).find(|&f| {
        unsafe {
          surface_loader
            .get_physical_device_surface_support(info.handle, f, surface_khr)
            .unwrap_or(false)
        }
      }),
      None => None,
    };

    let priorities_by_family: Vec<Vec<f32>> = info
      .queue_families
      .iter()
      .enumerate()
      .map(|(idx, family)| {
        let count = if idx as u32 == graphics_family { 1 } else { family.queue_count };
        vec![1.0_f32; count as usize]
      })
      .collect();

    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = priorities_by_family
      .iter()
      .enumerate()
      .filter(|(_, priorities)| !priorities.is_empty())
      .map(|(family_index, priorities)| {
        vk::DeviceQueueCreateInfo::builder()
          .queue_family_index(family_index as u32)
          .queue_priorities(priorities)
          .build()
      })
      .collect();

    let mut extension_names: Vec<&str> = MANDATORY_DEVICE_EXTENSIONS.to_vec();
    extension_names.extend(criteria.required_extensions.iter().copied());
    let extension_name_cstrings: Vec<std::ffi::CString> = extension_names
      .iter()
      .map(|e| std::ffi::CString::new(*e).unwrap())
      .collect();
    let extension_name_ptrs: Vec<*const i8> =
      extension_name_cstrings.iter().map(|c| c.as_ptr()).collect();

    // Every reported 1.0/1.1/1.2 core feature, minus robustBufferAccess (§4.1).
    let mut features10 = info.features;
    features10.robust_buffer_access = vk::FALSE;
    let mut features11 = info.features11;
    features11.p_next = std::ptr::null_mut();
    let mut features12 = info.features12;
    features12.p_next = std::ptr::null_mut();
    let mut extended_dynamic_state =
      vk::PhysicalDeviceExtendedDynamicStateFeaturesEXT::builder()
        .extended_dynamic_state(true)
        .build();

    let mut features2 = vk::PhysicalDeviceFeatures2::builder()
      .features(features10)
      .push_next(&mut features11)
      .push_next(&mut features12)
      .push_next(&mut extended_dynamic_state)
      .build();

    let device_create_info = vk::DeviceCreateInfo::builder()
      .queue_create_infos(&queue_create_infos)
      .enabled_extension_names(&extension_name_ptrs)
      .push_next(&mut features2)
      .build();

    let device = unsafe { instance.create_device(info.handle, &device_create_info, None) }
      .map_err(|_| BackendError::DeviceCreationFailed)?;

    let mut queues = Vec::new();
    for (family_index, priorities) in priorities_by_family.iter().enumerate() {
      for queue_index in 0..priorities.len() as u32 {
        let handle = unsafe { device.get_device_queue(family_index as u32, queue_index) };
        let flags = info.queue_families[family_index].queue_flags;
        let mut roles = Vec::new();
        if family_index as u32 == graphics_family && queue_index == 0 {
          roles.push(QueueRole::Graphics);
        } else if flags.contains(vk::QueueFlags::COMPUTE) {
          roles.push(QueueRole::Compute);
        } else if family_supports_transfer(flags) {
          roles.push(QueueRole::Copy);
        }
        if Some(family_index as u32) == present_family {
          roles.push(QueueRole::Present);
        }
        queues.push(Queue {
          family_index: family_index as u32,
          queue_index,
          handle,
          roles,
          command_pool: Mutex::new(Self::create_command_pool(&device, family_index as u32)?),
        });
      }
    }

    let graphics_queue_idx = queues
      .iter()
      .position(|q| q.roles.contains(&QueueRole::Graphics))
      .expect("graphics queue always created");
    let present_queue_idx = queues.iter().position(|q| q.roles.contains(&QueueRole::Present));

    let (sharing_mode, concurrent_family_indices) = match present_family {
      Some(pf) if pf != graphics_family => (
        vk::SharingMode::CONCURRENT,
        vec![graphics_family, pf],
      ),
      _ => (vk::SharingMode::EXCLUSIVE, Vec::new()),
    };

    Ok(Self {
      instance,
      physical_device: info.handle,
      device,
      queues,
      graphics_queue_idx,
      present_queue_idx,
      sharing_mode,
      concurrent_family_indices,
      format_properties_cache: Mutex::new(HashMap::new()),
    })
  }

  fn create_command_pool(device: &ash::Device, family_index: u32) -> BackendResult<vk::CommandPool> {
    let create_info = vk::CommandPoolCreateInfo::builder()
      .queue_family_index(family_index)
      .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
      .build();
    Ok(unsafe { device.create_command_pool(&create_info, None) }?)
  }

  pub fn queue_for_role(&self, role: QueueRole) -> &Queue {
    match role {
      QueueRole::Graphics => &self.queues[self.graphics_queue_idx],
      _ => self
        .queues
        .iter()
        .find(|q| q.roles.contains(&role))
        .unwrap_or(&self.queues[self.graphics_queue_idx]),
    }
  }

  pub fn present_queue(&self) -> Option<&Queue> {
    self.present_queue_idx.map(|idx| &self.queues[idx])
  }

  /// `supports_pixel_format` (§7 Validation): queries and caches
  /// `VkFormatProperties`, checking the feature bit implied by `usage`.
  pub fn supports_pixel_format(&self, format: PixelFormat, usage: TextureUsage) -> bool {
    let vk_format = format.to_vk();
    let mut cache = self.format_properties_cache.lock().unwrap();
    let props = *cache.entry(vk_format).or_insert_with(|| unsafe {
      self
        .instance
        .get_physical_device_format_properties(self.physical_device, vk_format)
    });

    let mut required = vk::FormatFeatureFlags::empty();
    if usage.contains(TextureUsage::SAMPLED) {
      required |= vk::FormatFeatureFlags::SAMPLED_IMAGE;
    }
    if usage.contains(TextureUsage::STORAGE) {
      required |= vk::FormatFeatureFlags::STORAGE_IMAGE;
    }
    if usage.contains(TextureUsage::RENDER_TARGET) {
      required |= if format.is_depth_or_stencil() {
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
      } else {
        vk::FormatFeatureFlags::COLOR_ATTACHMENT
      };
    }
    if usage.contains(TextureUsage::BLIT_SOURCE) {
      required |= vk::FormatFeatureFlags::BLIT_SRC;
    }
    if usage.contains(TextureUsage::BLIT_DESTINATION) {
      required |= vk::FormatFeatureFlags::BLIT_DST;
    }

    props.optimal_tiling_features.contains(required)
  }
}

impl Drop for Device {
  fn drop(&mut self) {
    unsafe {
      for queue in &self.queues {
        let pool = queue.command_pool.lock().unwrap();
        self.device.destroy_command_pool(*pool, None);
      }
      self.device.destroy_device(None);
    }
  }
}

/// Name constants pulled via `CStr` for the extension name comparisons
/// above; kept for symmetry with how `ash` exposes extension metadata.
pub fn extension_name(bytes: &'static [u8]) -> &'static CStr {
  CStr::from_bytes_with_nul(bytes).expect("extension name constant must be nul-terminated")
}

#[cfg(test)]
mod tests {
  use super::*;

  fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
    vk::QueueFamilyProperties {
      queue_flags: flags,
      queue_count: count,
      timestamp_valid_bits: 0,
      min_image_transfer_granularity: vk::Extent3D::default(),
    }
  }

  fn info(device_type: vk::PhysicalDeviceType, extensions: &[&str]) -> PhysicalDeviceInfo {
    let mut properties = vk::PhysicalDeviceProperties::default();
    properties.device_type = device_type;
    PhysicalDeviceInfo {
      handle: vk::PhysicalDevice::null(),
      properties,
      queue_families: vec![
        family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 1),
        family(vk::QueueFlags::TRANSFER, 2),
      ],
      extensions: extensions.iter().map(|s| s.to_string()).collect(),
      api_version: vk::API_VERSION_1_2,
      features: vk::PhysicalDeviceFeatures::default(),
      features11: vk::PhysicalDeviceVulkan11Features::default(),
      features12: vk::PhysicalDeviceVulkan12Features::default(),
    }
  }

  #[test]
  fn rejects_devices_missing_mandatory_extensions() {
    let candidates = vec![info(vk::PhysicalDeviceType::DISCRETE_GPU, &[])];
    let criteria = DeviceSelectionCriteria::default();
    assert_eq!(select(&candidates, &criteria), None);
  }

  #[test]
  fn prefers_requested_device_type() {
    let candidates = vec![
      info(vk::PhysicalDeviceType::INTEGRATED_GPU, MANDATORY_DEVICE_EXTENSIONS),
      info(vk::PhysicalDeviceType::DISCRETE_GPU, MANDATORY_DEVICE_EXTENSIONS),
    ];
    let criteria = DeviceSelectionCriteria::builder()
      .preferred_device_type(Some(vk::PhysicalDeviceType::DISCRETE_GPU))
      .build()
      .unwrap();
    assert_eq!(select(&candidates, &criteria), Some(1));
  }

  #[test]
  fn falls_back_to_any_match_without_preferred_type() {
    let candidates = vec![info(vk::PhysicalDeviceType::CPU, MANDATORY_DEVICE_EXTENSIONS)];
    let criteria = DeviceSelectionCriteria::builder()
      .preferred_device_type(None)
      .build()
      .unwrap();
    assert_eq!(select(&candidates, &criteria), Some(0));
  }

  #[test]
  fn transfer_is_implied_by_graphics_or_compute() {
    assert!(family_supports_transfer(vk::QueueFlags::GRAPHICS));
    assert!(family_supports_transfer(vk::QueueFlags::COMPUTE));
    assert!(!family_supports_transfer(vk::QueueFlags::SPARSE_BINDING));
  }
}
