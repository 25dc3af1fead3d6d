//! Per-frame transient allocation (§4.3): buffer arenas, the image/history
//! pools, and the argument-buffer descriptor-pool ring. Everything here is
//! indexed by `frame_index mod N`, where `N = Config::in_flight_frame_count`.

pub mod buffer_arena;
pub mod descriptor_ring;
pub mod image_pool;

pub use buffer_arena::{ArenaKind, BufferArena, TransientAllocation};
pub use descriptor_ring::DescriptorRing;
pub use image_pool::ImagePool;
