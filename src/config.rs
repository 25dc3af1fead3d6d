//! Backend-wide configuration, built with `derive_builder` the way the
//! teacher crate configures its renderer.

use ash::vk;

/// Default linear-bump block size for the transient buffer arenas (§4.3).
pub const DEFAULT_ARENA_BLOCK_SIZE: vk::DeviceSize = 256 * 1024;
/// Alignment guaranteed for every offset returned by a buffer arena.
pub const ARENA_ALIGNMENT: vk::DeviceSize = 256;
/// Timeout for `vkWaitSemaphores` in `commit`'s completion wait (§4.8, §7).
pub const TIMELINE_WAIT_TIMEOUT_NS: u64 = 10_000_000_000;
/// In-flight frame count used by the history-buffer pool (§4.3).
pub const HISTORY_POOL_FRAME_COUNT: usize = 1;

/// Backend configuration. Sane defaults: triple buffering, no preferred
/// device type, no extra extensions beyond the mandatory set in §4.1.
#[derive(Builder, Clone, Debug)]
#[builder(default)]
pub struct Config {
  /// N in the spec: number of frames that may be concurrently in flight.
  pub in_flight_frame_count: usize,
  /// Device selection criteria consumed by `device::select`.
  pub device_selection: DeviceSelectionCriteria,
  /// Block size for transient buffer arenas, in bytes.
  pub arena_block_size: vk::DeviceSize,
  /// Enable `VK_LAYER_KHRONOS_validation` and a debug messenger.
  pub enable_validation_layers: bool,
}

impl Config {
  pub fn builder() -> ConfigBuilder {
    ConfigBuilder::default()
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      in_flight_frame_count: 3,
      device_selection: DeviceSelectionCriteria::default(),
      arena_block_size: DEFAULT_ARENA_BLOCK_SIZE,
      enable_validation_layers: cfg!(debug_assertions),
    }
  }
}

/// Criteria used by `device::select` to pick a `VkPhysicalDevice`.
///
/// Deliberately plain data so selection stays a pure function over a
/// supplied list of `PhysicalDeviceInfo` and is unit-testable without an
/// instance (§4.1 ambient addition).
#[derive(Builder, Clone, Debug)]
#[builder(default)]
pub struct DeviceSelectionCriteria {
  pub preferred_device_type: Option<vk::PhysicalDeviceType>,
  /// Extensions beyond the mandatory set (swapchain, timeline semaphore,
  /// extended dynamic state) that a candidate device must support.
  pub required_extensions: Vec<&'static str>,
  pub minimum_api_version: u32,
}

impl DeviceSelectionCriteria {
  pub fn builder() -> DeviceSelectionCriteriaBuilder {
    DeviceSelectionCriteriaBuilder::default()
  }
}

impl Default for DeviceSelectionCriteria {
  fn default() -> Self {
    Self {
      preferred_device_type: Some(vk::PhysicalDeviceType::DISCRETE_GPU),
      required_extensions: Vec::new(),
      minimum_api_version: vk::API_VERSION_1_2,
    }
  }
}

/// The mandatory device extensions from §4.1/§6.
pub const MANDATORY_DEVICE_EXTENSIONS: &[&str] = &[
  "VK_KHR_swapchain",
  "VK_KHR_timeline_semaphore",
  "VK_EXT_extended_dynamic_state",
  "VK_EXT_extended_dynamic_state2",
  "VK_EXT_inline_uniform_block",
];
