//! Pipeline state cache (§4.10): keyed on the fixed-function descriptor,
//! the render-target shape it was built against, the pipeline layout, and
//! the subpass index.

use crate::error::BackendResult;
use crate::pipeline_state::{blend_attachment_state, RenderPipelineDescriptor, SubpassShape};
use ash::vk;
use std::collections::HashMap;

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
struct PipelineCacheKey {
  descriptor: RenderPipelineDescriptor,
  subpass_shape: SubpassShape,
  layout: vk::PipelineLayout,
}

/// `(spirv_bytes, entry_point)` pairs for the stages this pipeline links;
/// the `VkShaderModule`s are transient, created and destroyed within
/// `get_or_create`.
pub struct ShaderStage<'a> {
  pub spirv: &'a [u32],
  pub stage: vk::ShaderStageFlags,
  pub entry_point: &'a std::ffi::CStr,
}

#[derive(Default)]
pub struct PipelineCache {
  pipelines: HashMap<PipelineCacheKey, vk::Pipeline>,
}

impl PipelineCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Builds (or returns the cached) `VkPipeline` for this exact
  /// `(descriptor, subpass_shape, layout)` triple (§4.10). Two render-target
  /// shapes with different attachment counts are compatible — and so reuse
  /// a cached pipeline — iff the longer side's trailing slots are all nil;
  /// `SubpassShape::compatible_with` must be checked by the caller before
  /// assuming a hit, since the cache itself keys on exact shape equality to
  /// keep lookups O(1).
  #[allow(clippy::too_many_arguments)]
  pub fn get_or_create(
    &mut self, device: &ash::Device, descriptor: &RenderPipelineDescriptor, subpass_shape: &SubpassShape,
    layout: vk::PipelineLayout, render_pass: vk::RenderPass, stages: &[ShaderStage],
  ) -> BackendResult<vk::Pipeline> {
    let key = PipelineCacheKey { descriptor: descriptor.clone(), subpass_shape: subpass_shape.clone(), layout };
    if let Some(pipeline) = self.pipelines.get(&key) {
      return Ok(*pipeline);
    }

    let pipeline = self.build(device, descriptor, subpass_shape, layout, render_pass, stages)?;
    self.pipelines.insert(key, pipeline);
    Ok(pipeline)
  }

  fn build(
    &self, device: &ash::Device, descriptor: &RenderPipelineDescriptor, subpass_shape: &SubpassShape,
    layout: vk::PipelineLayout, render_pass: vk::RenderPass, stages: &[ShaderStage],
  ) -> BackendResult<vk::Pipeline> {
    let mut modules = Vec::with_capacity(stages.len());
    let mut stage_infos = Vec::with_capacity(stages.len());
    for stage in stages {
      let create_info = vk::ShaderModuleCreateInfo::builder().code(stage.spirv).build();
      let module = unsafe { device.create_shader_module(&create_info, None) }?;
      modules.push(module);
      stage_infos.push(
        vk::PipelineShaderStageCreateInfo::builder()
          .stage(stage.stage)
          .module(module)
          .name(stage.entry_point)
          .build(),
      );
    }

    let bindings: Vec<vk::VertexInputBindingDescription> = descriptor
      .vertex_bindings
      .iter()
      .map(|b| vk::VertexInputBindingDescription {
        binding: b.binding,
        stride: b.stride,
        input_rate: if b.per_instance { vk::VertexInputRate::INSTANCE } else { vk::VertexInputRate::VERTEX },
      })
      .collect();
    let attributes: Vec<vk::VertexInputAttributeDescription> = descriptor
      .vertex_attributes
      .iter()
      .map(|a| vk::VertexInputAttributeDescription { location: a.location, binding: a.binding, format: a.format.to_vk(), offset: a.offset })
      .collect();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
      .vertex_binding_descriptions(&bindings)
      .vertex_attribute_descriptions(&attributes)
      .build();

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
      .topology(descriptor.primitive_type.to_vk())
      .build();

    let viewport_state = vk::PipelineViewportStateCreateInfo::builder().viewport_count(1).scissor_count(1).build();

    let rasterization = vk::PipelineRasterizationStateCreateInfo::builder()
      .polygon_mode(vk::PolygonMode::FILL)
      .cull_mode(descriptor.cull_mode.to_vk())
      .front_face(descriptor.winding.to_vk())
      .line_width(1.0)
      .build();

    let sample_count = subpass_shape
      .color_formats
      .iter()
      .flatten()
      .map(|(_, samples, _)| *samples)
      .next()
      .or(subpass_shape.depth_stencil_format.map(|(_, samples)| samples))
      .unwrap_or(1);
    let multisample = vk::PipelineMultisampleStateCreateInfo::builder()
      .rasterization_samples(crate::resource_pool::sample_count_flags(sample_count))
      .build();

    let depth_stencil = descriptor.depth_stencil.map(|ds| {
      vk::PipelineDepthStencilStateCreateInfo::builder()
        .depth_test_enable(ds.depth_test_enable)
        .depth_write_enable(ds.depth_write_enable)
        .depth_compare_op(ds.depth_compare.to_vk())
        .build()
    });

    let blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = descriptor.color_blend.iter().map(blend_attachment_state).collect();
    let color_blend = vk::PipelineColorBlendStateCreateInfo::builder().attachments(&blend_attachments).build();

    let dynamic_states = [
      vk::DynamicState::VIEWPORT,
      vk::DynamicState::SCISSOR,
      vk::DynamicState::DEPTH_BIAS,
      vk::DynamicState::BLEND_CONSTANTS,
      vk::DynamicState::STENCIL_REFERENCE,
      vk::DynamicState::DEPTH_TEST_ENABLE_EXT,
      vk::DynamicState::DEPTH_WRITE_ENABLE_EXT,
      vk::DynamicState::DEPTH_COMPARE_OP_EXT,
    ];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states).build();

    let mut create_info = vk::GraphicsPipelineCreateInfo::builder()
      .stages(&stage_infos)
      .vertex_input_state(&vertex_input)
      .input_assembly_state(&input_assembly)
      .viewport_state(&viewport_state)
      .rasterization_state(&rasterization)
      .multisample_state(&multisample)
      .color_blend_state(&color_blend)
      .dynamic_state(&dynamic_state)
      .layout(layout)
      .render_pass(render_pass)
      .subpass(subpass_shape.subpass_index);
    if let Some(depth_stencil) = &depth_stencil {
      create_info = create_info.depth_stencil_state(depth_stencil);
    }

    let result = unsafe { device.create_graphics_pipelines(vk::PipelineCache::null(), &[create_info.build()], None) };
    for module in modules {
      unsafe { device.destroy_shader_module(module, None) };
    }
    let pipelines = result.map_err(|(_, e)| e)?;
    Ok(pipelines[0])
  }

  pub fn destroy(&mut self, device: &ash::Device) {
    for (_, pipeline) in self.pipelines.drain() {
      unsafe { device.destroy_pipeline(pipeline, None) };
    }
  }
}
