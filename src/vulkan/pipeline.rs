use crate::vulkan::{DescriptorSetLayout, Device, IntoVulkanError, ShaderModule, VulkanError};
use ash::vk;
use ash::vk::{Pipeline as RawPipeline, PipelineLayout};
use std::rc::Rc;

pub struct Pipeline {
    pub inner: RawPipeline,
    pub layout: PipelineLayout,
    device: Rc<Device>,
}

impl Pipeline {
    pub fn new_compute(
        device: Rc<Device>,
        shader: &ShaderModule,
        set_layouts: &[&DescriptorSetLayout],
    ) -> Result<Self, VulkanError> {
        let raw_layouts = set_layouts.iter().map(|l| l.inner).collect::<Vec<_>>();
        let pipeline_layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&raw_layouts);

        let layout = unsafe {
            device
                .inner
                .create_pipeline_layout(&pipeline_layout_info, None)
                .map_to_err("Cannot create pipeline layout")?
        };

        let create_info = vk::ComputePipelineCreateInfo::default()
            .stage(shader.stage_info())
            .layout(layout);

        let created = unsafe {
            device
                .inner
                .create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
        };

        let inner = match created {
            Ok(pipelines) => pipelines[0],
            Err((_, code)) => {
                unsafe { device.inner.destroy_pipeline_layout(layout, None) };
                return Err(VulkanError::new("Cannot create compute pipeline", code));
            }
        };

        Ok(Self { inner, layout, device })
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.inner.destroy_pipeline(self.inner, None);
            self.device.inner.destroy_pipeline_layout(self.layout, None);
        }
    }
}
