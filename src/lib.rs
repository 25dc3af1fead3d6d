//! A Vulkan rendering backend core: pass compaction, layout/barrier
//! planning, transient allocation, and shader-reflection-driven pipeline
//! layouts. Callers own `VkInstance`/`VkSurfaceKHR` bootstrap and window
//! integration; this crate owns everything from logical-device creation
//! down to command-buffer encoding and submission.
#[macro_use]
extern crate derive_builder;

pub mod config;
pub mod crosswalk;
pub mod device;
pub mod encoders;
pub mod error;
pub mod format;
pub mod frame;
pub mod layout_tracker;
pub mod math;
pub mod pipeline_cache;
pub mod pipeline_state;
pub mod planner;
pub mod reflection;
pub mod render_pass_cache;
pub mod resource_commands;
pub mod resource_pool;
pub mod resources;
pub mod swapchain;
pub mod transient;
pub mod usage;

pub use config::{Config, ConfigBuilder, DeviceSelectionCriteria, DeviceSelectionCriteriaBuilder};
pub use device::{Device, PhysicalDeviceInfo, Queue, QueueRole};
pub use error::{BackendError, BackendResult};
pub use frame::{CommandBufferInfo, FrameCommandBuffer, ImageUsageRecord, TimelinePoint};
pub use pipeline_cache::PipelineCache;
pub use render_pass_cache::RenderPassCache;
pub use resource_pool::ResourcePool;
pub use swapchain::{AcquiredImage, Swapchain};
