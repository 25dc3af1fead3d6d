//! Crate-wide error type.
//!
//! Mirrors the error taxonomy of the spec: recoverable device/allocation
//! failures are returned as `BackendError`, programming invariants panic
//! (see call sites in `planner`, `encoders`, and `reflection`).

use std::{error::Error, fmt};

pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug)]
pub enum BackendError {
  /// Raw `VkResult` that doesn't have a more specific variant below.
  VulkanError(ash::vk::Result),
  /// Error surfaced by the VMA-equivalent allocator.
  AllocatorError(vk_mem::Error),
  /// `vkQueueSubmit`/`vkWaitSemaphores` reported the device as lost.
  DeviceLost,
  /// A timeline semaphore wait exceeded the 10 second budget.
  TimelineWaitTimeout,
  /// `vkAcquireNextImageKHR`/`vkQueuePresentKHR` returned `ERROR_OUT_OF_DATE_KHR`.
  SwapchainOutOfDate,
  /// `vkAcquireNextImageKHR`/`vkQueuePresentKHR` returned `SUBOPTIMAL_KHR`.
  SuboptimalSwapchain,
  /// No physical device satisfied the supplied `DeviceSelectionCriteria`.
  NoSuitablePhysicalDevice,
  /// No memory type satisfied the requested storage/cache mode combination.
  NoSuitableMemoryType,
  /// `allocate_image`/`allocate_buffer`/`allocate_sampler` failed.
  ResourceAllocationFailed,
  /// A pixel format is not supported for the requested usage.
  UnsupportedPixelFormat { format: ash::vk::Format, usage: &'static str },
  /// SPIR-V failed to parse, or its reflection data doesn't fit the binding model.
  ShaderReflectionFailed(String),
  /// Logical device creation failed; no state changed.
  DeviceCreationFailed,
  /// `SetBytes` payload exceeds the pipeline's push-constant range and the
  /// staging-buffer fallback for inline uploads isn't implemented yet.
  InlineUploadExceedsPushConstantRange { size: u32, push_constant_range: u32 },
}

impl From<ash::vk::Result> for BackendError {
  fn from(e: ash::vk::Result) -> Self {
    match e {
      ash::vk::Result::SUBOPTIMAL_KHR => BackendError::SuboptimalSwapchain,
      ash::vk::Result::ERROR_OUT_OF_DATE_KHR => BackendError::SwapchainOutOfDate,
      ash::vk::Result::ERROR_DEVICE_LOST => BackendError::DeviceLost,
      e => BackendError::VulkanError(e),
    }
  }
}

impl From<vk_mem::Error> for BackendError {
  fn from(e: vk_mem::Error) -> Self {
    BackendError::AllocatorError(e)
  }
}

impl fmt::Display for BackendError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      BackendError::VulkanError(r) => write!(f, "vulkan error: {}", r),
      BackendError::AllocatorError(e) => write!(f, "allocator error: {}", e),
      BackendError::DeviceLost => write!(f, "device lost"),
      BackendError::TimelineWaitTimeout => {
        write!(f, "timeline semaphore wait exceeded 10s timeout")
      }
      BackendError::SwapchainOutOfDate => write!(f, "swapchain out of date"),
      BackendError::SuboptimalSwapchain => write!(f, "swapchain suboptimal"),
      BackendError::NoSuitablePhysicalDevice => {
        write!(f, "no physical device satisfied the selection criteria")
      }
      BackendError::NoSuitableMemoryType => write!(
        f,
        "no memory type satisfied the requested storage/cache mode"
      ),
      BackendError::ResourceAllocationFailed => write!(f, "resource allocation failed"),
      BackendError::UnsupportedPixelFormat { format, usage } => {
        write!(f, "pixel format {:?} unsupported for usage: {}", format, usage)
      }
      BackendError::ShaderReflectionFailed(s) => write!(f, "shader reflection failed: {}", s),
      BackendError::DeviceCreationFailed => write!(f, "logical device creation failed"),
      BackendError::InlineUploadExceedsPushConstantRange { size, push_constant_range } => write!(
        f,
        "inline upload of {} bytes exceeds the {}-byte push-constant range; staging-buffer fallback is not implemented",
        size, push_constant_range
      ),
    }
  }
}

impl Error for BackendError {}
