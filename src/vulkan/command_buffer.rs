use crate::vulkan::{Buffer, DescriptorSet, Device, Fence, Image, IntoVulkanError, Pipeline, VulkanError};
use ash::vk;
use ash::vk::CommandBuffer as RawCommandBuffer;
use std::rc::Rc;

pub struct CommandBuffer {
    pub inner: RawCommandBuffer,
    device: Rc<Device>,
}

impl CommandBuffer {
    pub fn new(device: Rc<Device>, inner: RawCommandBuffer) -> Self {
        Self { device, inner }
    }

    pub fn reset(&self) -> Result<(), VulkanError> {
        unsafe {
            self.device
                .inner
                .reset_command_buffer(self.inner, vk::CommandBufferResetFlags::empty())
                .map_to_err("Cannot reset command buffer")
        }
    }

    pub fn begin_one_time(&self) -> Result<(), VulkanError> {
        let begin_info = vk::CommandBufferBeginInfo {
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };

        unsafe {
            self.device
                .inner
                .begin_command_buffer(self.inner, &begin_info)
                .map_to_err("cannot begin recording")
        }
    }

    pub fn end(&self) -> Result<(), VulkanError> {
        unsafe {
            self.device
                .inner
                .end_command_buffer(self.inner)
                .map_to_err("cannot end command buffer")
        }
    }

    pub fn submit(&self, fence: &Fence) -> Result<(), VulkanError> {
        let command_buffers = [self.inner];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

        unsafe {
            self.device
                .inner
                .queue_submit(self.device.compute_queue, &[submit_info], fence.inner)
                .map_to_err("cannot submit command buffer")
        }
    }

    pub fn bind_compute_pipeline(&self, pipeline: &Pipeline) {
        unsafe {
            self.device
                .inner
                .cmd_bind_pipeline(self.inner, vk::PipelineBindPoint::COMPUTE, pipeline.inner)
        }
    }

    pub fn bind_descriptor_set(&self, pipeline: &Pipeline, set: &DescriptorSet) {
        unsafe {
            self.device.inner.cmd_bind_descriptor_sets(
                self.inner,
                vk::PipelineBindPoint::COMPUTE,
                pipeline.layout,
                0,
                &[set.inner],
                &[],
            )
        }
    }

    pub fn dispatch(&self, x: u32, y: u32, z: u32) {
        unsafe { self.device.inner.cmd_dispatch(self.inner, x, y, z) }
    }

    pub fn memory_barrier(
        &self,
        src_stage: vk::PipelineStageFlags,
        src_access: vk::AccessFlags,
        dst_stage: vk::PipelineStageFlags,
        dst_access: vk::AccessFlags,
    ) {
        let barrier = vk::MemoryBarrier {
            src_access_mask: src_access,
            dst_access_mask: dst_access,
            ..Default::default()
        };

        unsafe {
            self.device.inner.cmd_pipeline_barrier(
                self.inner,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[barrier],
                &[],
                &[],
            )
        }
    }

    pub fn buffer_barrier(&self, buffer: &Buffer) {
        let barrier = vk::BufferMemoryBarrier {
            src_access_mask: vk::AccessFlags::SHADER_WRITE,
            dst_access_mask: vk::AccessFlags::SHADER_READ,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            buffer: buffer.inner,
            offset: 0,
            size: vk::WHOLE_SIZE,
            ..Default::default()
        };

        unsafe {
            self.device.inner.cmd_pipeline_barrier(
                self.inner,
                vk::PipelineStageFlags::COMPUTE_SHADER,
                vk::PipelineStageFlags::COMPUTE_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[barrier],
                &[],
            )
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn image_barrier(
        &self,
        image: &Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        src_stage: vk::PipelineStageFlags,
        src_access: vk::AccessFlags,
        dst_stage: vk::PipelineStageFlags,
        dst_access: vk::AccessFlags,
    ) {
        let barrier = vk::ImageMemoryBarrier {
            src_access_mask: src_access,
            dst_access_mask: dst_access,
            old_layout,
            new_layout,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image: image.inner,
            subresource_range: Image::color_range(),
            ..Default::default()
        };

        unsafe {
            self.device.inner.cmd_pipeline_barrier(
                self.inner,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            )
        }
    }

    pub fn copy_buffer(&self, src: &Buffer, dst: &Buffer, size: u64) {
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };

        unsafe { self.device.inner.cmd_copy_buffer(self.inner, src.inner, dst.inner, &[region]) }
    }

    pub fn copy_buffer_to_image(&self, src: &Buffer, dst: &Image) {
        let region = Self::image_copy_region(dst);

        unsafe {
            self.device.inner.cmd_copy_buffer_to_image(
                self.inner,
                src.inner,
                dst.inner,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            )
        }
    }

    pub fn copy_image_to_buffer(&self, src: &Image, layout: vk::ImageLayout, dst: &Buffer) {
        let region = Self::image_copy_region(src);

        unsafe {
            self.device
                .inner
                .cmd_copy_image_to_buffer(self.inner, src.inner, layout, dst.inner, &[region])
        }
    }

    fn image_copy_region(image: &Image) -> vk::BufferImageCopy {
        vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D::default(),
            image_extent: image.extent,
        }
    }
}
