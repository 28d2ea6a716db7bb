use crate::vulkan::{Device, IntoVulkanError, VulkanError};
use ash::vk;
use std::rc::Rc;

pub struct DescriptorPool {
    pub inner: vk::DescriptorPool,
    device: Rc<Device>,
}

impl DescriptorPool {
    pub fn new(device: Rc<Device>, sizes: &[vk::DescriptorPoolSize], max_sets: u32) -> Result<Self, VulkanError> {
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(sizes)
            .max_sets(max_sets);

        let inner = unsafe {
            device
                .inner
                .create_descriptor_pool(&pool_info, None)
                .map_to_err("Cannot create descriptor pool")?
        };

        Ok(Self { inner, device })
    }

    pub fn allocate_sets(&self, layouts: &[vk::DescriptorSetLayout]) -> Result<Vec<DescriptorSet>, VulkanError> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.inner)
            .set_layouts(layouts);

        unsafe {
            let raw_sets = self
                .device
                .inner
                .allocate_descriptor_sets(&alloc_info)
                .map_to_err("Cannot allocate descriptor sets")?;

            Ok(raw_sets.iter().map(|r| DescriptorSet { inner: *r }).collect())
        }
    }

    /// Returns every set allocated from this pool. Sets must not be in use by the GPU.
    pub fn reset(&self) -> Result<(), VulkanError> {
        unsafe {
            self.device
                .inner
                .reset_descriptor_pool(self.inner, vk::DescriptorPoolResetFlags::empty())
                .map_to_err("Cannot reset descriptor pool")
        }
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.inner.destroy_descriptor_pool(self.inner, None);
        }
    }
}

pub struct DescriptorSetLayout {
    pub inner: vk::DescriptorSetLayout,
    device: Rc<Device>,
}

impl DescriptorSetLayout {
    pub fn new(device: Rc<Device>, bindings: &[vk::DescriptorSetLayoutBinding]) -> Result<Self, VulkanError> {
        let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);

        let inner = unsafe {
            device
                .inner
                .create_descriptor_set_layout(&info, None)
                .map_to_err("Cannot create descriptor set layout")?
        };

        Ok(Self { inner, device })
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.inner.destroy_descriptor_set_layout(self.inner, None);
        }
    }
}

pub struct DescriptorSet {
    pub inner: vk::DescriptorSet,
}
