use crate::vulkan::{CommandBuffer, Instance, IntoVulkanError, VulkanError};
use ash::Device as RawDevice;
use ash::ext::debug_utils::Device as DebugUtils;
use ash::vk;
use ash::vk::{PhysicalDevice, Queue};
use std::ffi::{CStr, CString};

pub struct Device {
    pub inner: RawDevice,
    pub compute_queue: Queue,
    pub compute_queue_family: usize,
    pub physical_device: PhysicalDevice,
    pub name: String,
    debug_utils: Option<DebugUtils>,
}

impl Device {
    pub fn query_applicable(instance: &Instance, sampled_images: u32) -> Result<Vec<DeviceQueryResult>, VulkanError> {
        let devices = unsafe {
            instance
                .inner
                .enumerate_physical_devices()
                .map_to_err("Cannot enumerate physical devices")?
        };

        let mut results = Vec::with_capacity(devices.len());

        for device in devices {
            let properties = unsafe { instance.inner.get_physical_device_properties(device) };
            let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
                .to_string_lossy()
                .into_owned();

            let mut missing = Vec::new();

            if properties.api_version < vk::API_VERSION_1_2 {
                missing.push("Vulkan 1.2".to_owned());
            }

            if properties.limits.max_per_stage_descriptor_sampled_images < sampled_images {
                missing.push(format!("{sampled_images} sampled images per stage"));
            }

            let mut features12 = vk::PhysicalDeviceVulkan12Features::default();
            {
                let mut features = vk::PhysicalDeviceFeatures2::default().push_next(&mut features12);
                unsafe { instance.inner.get_physical_device_features2(device, &mut features) };
            }

            if features12.shader_sampled_image_array_non_uniform_indexing != vk::TRUE {
                missing.push("shaderSampledImageArrayNonUniformIndexing".to_owned());
            }

            let compute_queue_family = Self::find_compute_queue_family(instance, device);
            if compute_queue_family.is_none() {
                missing.push("compute queue".to_owned());
            }

            match compute_queue_family {
                Some(compute_queue_family) if missing.is_empty() => {
                    results.push(DeviceQueryResult::Applicable(ApplicableDevice {
                        physical_device: device,
                        name,
                        compute_queue_family,
                        discrete: properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU,
                    }))
                }
                _ => results.push(DeviceQueryResult::NotApplicable(NotApplicableDevice { name, missing })),
            }
        }

        Ok(results)
    }

    pub fn new(instance: &Instance, device: &ApplicableDevice) -> Result<Self, VulkanError> {
        let priorities = [1.0f32];

        let queue_create_info = vk::DeviceQueueCreateInfo {
            queue_family_index: device.compute_queue_family as u32,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        };

        let mut features12 = vk::PhysicalDeviceVulkan12Features {
            shader_sampled_image_array_non_uniform_indexing: vk::TRUE,
            ..Default::default()
        };

        let queue_create_infos = [queue_create_info];
        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .push_next(&mut features12);

        let inner = unsafe {
            instance
                .inner
                .create_device(device.physical_device, &create_info, None)
                .map_to_err("Cannot create logical device")?
        };

        let compute_queue = unsafe { inner.get_device_queue(device.compute_queue_family as u32, 0) };

        let debug_utils = if instance.markers_active() {
            Some(DebugUtils::new(&instance.inner, &inner))
        } else {
            None
        };

        Ok(Self {
            inner,
            compute_queue,
            compute_queue_family: device.compute_queue_family,
            physical_device: device.physical_device,
            name: device.name.clone(),
            debug_utils,
        })
    }

    pub fn wait_idle(&self) -> Result<(), VulkanError> {
        unsafe { self.inner.device_wait_idle().map_to_err("Cannot wait for device idle") }
    }

    pub fn name_object(&self, info: &vk::DebugUtilsObjectNameInfoEXT) -> Result<(), VulkanError> {
        match &self.debug_utils {
            Some(debug_utils) => unsafe {
                debug_utils
                    .set_debug_utils_object_name(info)
                    .map_to_err("Cannot name object")
            },
            None => Ok(()),
        }
    }

    pub fn begin_label(&self, label: &str, command_buffer: &CommandBuffer) {
        if let Some(debug_utils) = &self.debug_utils {
            let name = CString::new(label).unwrap_or_default();
            let label = vk::DebugUtilsLabelEXT {
                p_label_name: name.as_ptr(),
                ..Default::default()
            };

            unsafe { debug_utils.cmd_begin_debug_utils_label(command_buffer.inner, &label) };
        }
    }

    pub fn end_label(&self, command_buffer: &CommandBuffer) {
        if let Some(debug_utils) = &self.debug_utils {
            unsafe { debug_utils.cmd_end_debug_utils_label(command_buffer.inner) };
        }
    }

    fn find_compute_queue_family(instance: &Instance, physical_device: PhysicalDevice) -> Option<usize> {
        let queue_families = unsafe {
            instance
                .inner
                .get_physical_device_queue_family_properties(physical_device)
        };

        // universal queue first, dedicated compute as fallback
        queue_families
            .iter()
            .position(|q| q.queue_flags.contains(vk::QueueFlags::COMPUTE | vk::QueueFlags::GRAPHICS))
            .or_else(|| {
                queue_families
                    .iter()
                    .position(|q| q.queue_flags.contains(vk::QueueFlags::COMPUTE))
            })
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe { self.inner.destroy_device(None) };
    }
}

pub enum DeviceQueryResult {
    Applicable(ApplicableDevice),
    NotApplicable(NotApplicableDevice),
}

pub struct ApplicableDevice {
    pub physical_device: PhysicalDevice,
    pub name: String,
    pub compute_queue_family: usize,
    pub discrete: bool,
}

pub struct NotApplicableDevice {
    pub name: String,
    pub missing: Vec<String>,
}
