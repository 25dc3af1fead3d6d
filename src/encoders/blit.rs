//! Blit encoder (§4.7): buffer/image copies, fills, and blits.
//!
//! `generate_mipmaps` is explicitly out of scope here; the graph recorder
//! is expected to lower it into a sequence of `Blit` commands before the
//! encoder ever sees it.

use crate::encoders::check_resource_commands;
use crate::error::BackendResult;
use crate::resource_commands::{Phase, ResourceCommandStream};
use crate::resource_pool::ResourcePool;
use crate::usage::{BlitCommand, CommandRange};
use ash::vk;

pub struct BlitEncoder<'a> {
  device: &'a ash::Device,
  cmd: vk::CommandBuffer,
  resources: &'a ResourcePool,
}

impl<'a> BlitEncoder<'a> {
  pub fn new(device: &'a ash::Device, cmd: vk::CommandBuffer, resources: &'a ResourcePool) -> Self {
    Self { device, cmd, resources }
  }

  pub fn execute(&self, stream: &mut ResourceCommandStream, range: CommandRange, commands: &[BlitCommand]) -> BackendResult<()> {
    debug_assert_eq!(commands.len(), (range.hi - range.lo) as usize);
    for (offset, command) in commands.iter().enumerate() {
      let index = range.lo + offset as u32;
      check_resource_commands(self.device, self.cmd, stream, index, Phase::Before);
      self.execute_command(command);
      check_resource_commands(self.device, self.cmd, stream, index, Phase::After);
    }
    Ok(())
  }

  fn execute_command(&self, command: &BlitCommand) {
    match command {
      BlitCommand::CopyBufferToBuffer { src, src_offset, dst, dst_offset, size } => {
        let src_buf = self.resources.buffer(*src).expect("copy source buffer handle must resolve").handle;
        let dst_buf = self.resources.buffer(*dst).expect("copy destination buffer handle must resolve").handle;
        let region = vk::BufferCopy { src_offset: *src_offset, dst_offset: *dst_offset, size: *size };
        unsafe { self.device.cmd_copy_buffer(self.cmd, src_buf, dst_buf, &[region]) };
      }
      BlitCommand::CopyBufferToImage { src, src_offset, dst, dst_level, dst_slice } => {
        let src_buf = self.resources.buffer(*src).expect("copy source buffer handle must resolve").handle;
        let dst_image = self.resources.image(*dst).expect("copy destination image handle must resolve");
        for aspect in aspects_present(dst_image.descriptor.pixel_format.aspect_mask(), dst_image.descriptor.pixel_format.aspect_mask()) {
          let region = vk::BufferImageCopy {
            buffer_offset: *src_offset,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
              aspect_mask: aspect,
              mip_level: *dst_level,
              base_array_layer: *dst_slice,
              layer_count: 1,
            },
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: mip_extent(dst_image.descriptor.width, dst_image.descriptor.height, *dst_level),
          };
          unsafe {
            self.device.cmd_copy_buffer_to_image(self.cmd, src_buf, dst_image.handle, vk::ImageLayout::TRANSFER_DST_OPTIMAL, &[region])
          };
        }
      }
      BlitCommand::CopyImageToBuffer { src, src_level, src_slice, dst, dst_offset } => {
        let src_image = self.resources.image(*src).expect("copy source image handle must resolve");
        let dst_buf = self.resources.buffer(*dst).expect("copy destination buffer handle must resolve").handle;
        for aspect in aspects_present(src_image.descriptor.pixel_format.aspect_mask(), src_image.descriptor.pixel_format.aspect_mask()) {
          let region = vk::BufferImageCopy {
            buffer_offset: *dst_offset,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
              aspect_mask: aspect,
              mip_level: *src_level,
              base_array_layer: *src_slice,
              layer_count: 1,
            },
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: mip_extent(src_image.descriptor.width, src_image.descriptor.height, *src_level),
          };
          unsafe {
            self.device.cmd_copy_image_to_buffer(self.cmd, src_image.handle, vk::ImageLayout::TRANSFER_SRC_OPTIMAL, dst_buf, &[region])
          };
        }
      }
      BlitCommand::CopyImageToImage { src, src_level, src_slice, dst, dst_level, dst_slice } => {
        let src_image = self.resources.image(*src).expect("copy source image handle must resolve");
        let dst_image = self.resources.image(*dst).expect("copy destination image handle must resolve");
        for aspect in aspects_present(src_image.descriptor.pixel_format.aspect_mask(), dst_image.descriptor.pixel_format.aspect_mask()) {
          let extent = mip_extent(src_image.descriptor.width, src_image.descriptor.height, *src_level);
          let region = vk::ImageCopy {
            src_subresource: vk::ImageSubresourceLayers { aspect_mask: aspect, mip_level: *src_level, base_array_layer: *src_slice, layer_count: 1 },
            src_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            dst_subresource: vk::ImageSubresourceLayers { aspect_mask: aspect, mip_level: *dst_level, base_array_layer: *dst_slice, layer_count: 1 },
            dst_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            extent,
          };
          unsafe {
            self.device.cmd_copy_image(
              self.cmd,
              src_image.handle,
              vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
              dst_image.handle,
              vk::ImageLayout::TRANSFER_DST_OPTIMAL,
              &[region],
            )
          };
        }
      }
      BlitCommand::Blit { src, src_level, dst, dst_level, filter } => {
        let src_image = self.resources.image(*src).expect("blit source image handle must resolve");
        let dst_image = self.resources.image(*dst).expect("blit destination image handle must resolve");
        for aspect in aspects_present(src_image.descriptor.pixel_format.aspect_mask(), dst_image.descriptor.pixel_format.aspect_mask()) {
          let src_extent = mip_extent(src_image.descriptor.width, src_image.descriptor.height, *src_level);
          let dst_extent = mip_extent(dst_image.descriptor.width, dst_image.descriptor.height, *dst_level);
          let region = vk::ImageBlit {
            src_subresource: vk::ImageSubresourceLayers { aspect_mask: aspect, mip_level: *src_level, base_array_layer: 0, layer_count: 1 },
            src_offsets: [vk::Offset3D { x: 0, y: 0, z: 0 }, extent_as_offset(src_extent)],
            dst_subresource: vk::ImageSubresourceLayers { aspect_mask: aspect, mip_level: *dst_level, base_array_layer: 0, layer_count: 1 },
            dst_offsets: [vk::Offset3D { x: 0, y: 0, z: 0 }, extent_as_offset(dst_extent)],
          };
          unsafe {
            self.device.cmd_blit_image(
              self.cmd,
              src_image.handle,
              vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
              dst_image.handle,
              vk::ImageLayout::TRANSFER_DST_OPTIMAL,
              &[region],
              *filter,
            )
          };
        }
      }
      BlitCommand::Fill { dst, offset, size, value } => {
        let dst_buf = self.resources.buffer(*dst).expect("fill destination buffer handle must resolve").handle;
        unsafe { self.device.cmd_fill_buffer(self.cmd, dst_buf, *offset, *size, *value) };
      }
    }
  }
}

/// One copy region per aspect both sides possess (§4.7): color images
/// never share an aspect with depth/stencil images, so `src & dst` is
/// empty unless both sides are color, or both carry the matching
/// depth/stencil bit.
fn aspects_present(src: vk::ImageAspectFlags, dst: vk::ImageAspectFlags) -> Vec<vk::ImageAspectFlags> {
  let shared = src & dst;
  [vk::ImageAspectFlags::COLOR, vk::ImageAspectFlags::DEPTH, vk::ImageAspectFlags::STENCIL]
    .into_iter()
    .filter(|bit| shared.contains(*bit))
    .collect()
}

fn mip_extent(width: u32, height: u32, level: u32) -> vk::Extent3D {
  vk::Extent3D { width: (width >> level).max(1), height: (height >> level).max(1), depth: 1 }
}

fn extent_as_offset(extent: vk::Extent3D) -> vk::Offset3D {
  vk::Offset3D { x: extent.width as i32, y: extent.height as i32, z: extent.depth as i32 }
}
