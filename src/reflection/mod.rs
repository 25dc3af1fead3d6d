//! Shader reflection & pipeline layouts (§4.4).

mod binding_path;
mod cache;
mod shader_module;

pub use binding_path::{BindingPath, ARG_BUFFER_SENTINEL};
pub use cache::{DescriptorSetLayoutCache, PipelineLayoutCache, PipelineLayoutKey};
pub use shader_module::{ReflectedResourceType, ResourceReflection, ShaderIdentifierTable, ShaderReflection};
