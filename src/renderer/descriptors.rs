use crate::raytracer::PATH_TRACE_MAX_TEXTURES;
use crate::raytracer::backend::binding;
use crate::vulkan::{Buffer, DescriptorPool, DescriptorSet, DescriptorSetLayout, Device, VulkanError};
use ash::vk;
use std::rc::Rc;

/// Dispatches one frame can record before its descriptor pool runs dry.
pub const MAX_SETS_PER_FRAME: u32 = 64;

/// The one set layout all kernels share. Kernels only touch the bindings they declare.
pub fn layout_bindings() -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
    let binding = |binding: u32, descriptor_type: vk::DescriptorType, descriptor_count: u32| {
        vk::DescriptorSetLayoutBinding {
            binding,
            descriptor_type,
            descriptor_count,
            stage_flags: vk::ShaderStageFlags::COMPUTE,
            ..Default::default()
        }
    };

    vec![
        binding(binding::UNIFORMS, vk::DescriptorType::UNIFORM_BUFFER, 1),
        binding(binding::TRIANGLES, vk::DescriptorType::STORAGE_BUFFER, 1),
        binding(binding::MESHES, vk::DescriptorType::STORAGE_BUFFER, 1),
        binding(binding::LIGHTS, vk::DescriptorType::STORAGE_BUFFER, 1),
        binding(
            binding::TEXTURES,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            PATH_TRACE_MAX_TEXTURES as u32,
        ),
        binding(binding::OUTPUT_IMAGE, vk::DescriptorType::STORAGE_IMAGE, 1),
        binding(binding::BAKE_VERTICES, vk::DescriptorType::STORAGE_BUFFER, 1),
        binding(binding::DIFFUSE_TRIANGLES, vk::DescriptorType::STORAGE_BUFFER, 1),
        binding(binding::AVERAGE, vk::DescriptorType::STORAGE_BUFFER, 1),
    ]
}

pub struct ComputeDescriptors {
    pub layout: DescriptorSetLayout,
    pools: Vec<DescriptorPool>,
}

impl ComputeDescriptors {
    pub fn build(device: Rc<Device>, frames_in_flight: usize) -> Result<Self, VulkanError> {
        let layout = DescriptorSetLayout::new(device.clone(), &layout_bindings())?;

        let sizes = layout_bindings()
            .iter()
            .map(|b| vk::DescriptorPoolSize {
                ty: b.descriptor_type,
                descriptor_count: b.descriptor_count * MAX_SETS_PER_FRAME,
            })
            .collect::<Vec<_>>();

        let pools = (0..frames_in_flight)
            .map(|_| DescriptorPool::new(device.clone(), &sizes, MAX_SETS_PER_FRAME))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { layout, pools })
    }

    /// Frees every set of `slot`. Its last submission must have completed.
    pub fn reset(&self, slot: usize) -> Result<(), VulkanError> {
        match self.pools.get(slot) {
            Some(pool) => pool.reset(),
            None => Ok(()),
        }
    }

    pub fn allocate(&self, slot: usize) -> Result<DescriptorSet, VulkanError> {
        let pool = self
            .pools
            .get(slot)
            .ok_or(VulkanError::new("no descriptor pool for frame slot", vk::Result::ERROR_UNKNOWN))?;

        pool.allocate_sets(&[self.layout.inner])?
            .pop()
            .ok_or(VulkanError::new("empty descriptor set allocation", vk::Result::ERROR_UNKNOWN))
    }
}

enum DescriptorInfo {
    Buffer(vk::DescriptorBufferInfo),
    Images(Vec<vk::DescriptorImageInfo>),
}

/// Collects the bindings of one dispatch and writes them in a single update.
#[derive(Default)]
pub struct DescriptorWriter {
    entries: Vec<(u32, vk::DescriptorType, DescriptorInfo)>,
}

impl DescriptorWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&mut self, binding: u32, descriptor_type: vk::DescriptorType, buffer: &Buffer) {
        let info = vk::DescriptorBufferInfo {
            buffer: buffer.inner,
            offset: 0,
            range: vk::WHOLE_SIZE,
        };

        self.entries.push((binding, descriptor_type, DescriptorInfo::Buffer(info)));
    }

    pub fn images(&mut self, binding: u32, descriptor_type: vk::DescriptorType, images: Vec<vk::DescriptorImageInfo>) {
        self.entries.push((binding, descriptor_type, DescriptorInfo::Images(images)));
    }

    pub fn write(&self, device: &Device, set: &DescriptorSet) {
        let writes = self
            .entries
            .iter()
            .map(|(binding, descriptor_type, info)| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(set.inner)
                    .dst_binding(*binding)
                    .dst_array_element(0)
                    .descriptor_type(*descriptor_type);

                match info {
                    DescriptorInfo::Buffer(info) => write.buffer_info(std::slice::from_ref(info)),
                    DescriptorInfo::Images(images) => write.image_info(images),
                }
            })
            .collect::<Vec<_>>();

        unsafe { device.inner.update_descriptor_sets(&writes, &[]) }
    }
}
