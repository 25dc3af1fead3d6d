//! POD math types.
//!
//! The geometry/math library the host application uses is explicitly out
//! of scope (§1): the core's only contract with it is as a supplier of
//! plain `float`-typed vectors and matrices. These aliases exist so
//! signatures throughout the crate can name a vector/matrix shape without
//! pulling in (or reimplementing) a math library.

pub type Vec2 = [f32; 2];
pub type Vec3 = [f32; 3];
pub type Vec4 = [f32; 4];
/// Column-major, matching Vulkan's clip-space convention.
pub type Mat4 = [[f32; 4]; 4];
