use crate::vulkan::{DebugMarker, Device, IntoVulkanError, MemoryError};
use ash::vk;
use ash::vk::{Handle, Image as RawImage};
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

pub struct Image {
    pub inner: RawImage,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    allocation: Option<Allocation>,
    allocator: Arc<Mutex<Allocator>>,
    device: Rc<Device>,
}

impl Image {
    pub fn new(
        device: Rc<Device>,
        allocator: Arc<Mutex<Allocator>>,
        format: vk::Format,
        extent: vk::Extent3D,
        usage: vk::ImageUsageFlags,
        name: &str,
    ) -> Result<Self, MemoryError> {
        let create_info = vk::ImageCreateInfo {
            image_type: vk::ImageType::TYPE_2D,
            format,
            extent,
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };

        let inner = unsafe {
            device
                .inner
                .create_image(&create_info, None)
                .map_to_err("Cannot create image")?
        };

        let requirements = unsafe { device.inner.get_image_memory_requirements(inner) };

        let allocation = {
            let mut allocator = allocator.lock().map_err(|_| MemoryError::Poisoned)?;

            allocator.allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
        };

        let allocation = match allocation {
            Ok(a) => a,
            Err(e) => {
                unsafe { device.inner.destroy_image(inner, None) };
                return Err(e.into());
            }
        };

        unsafe {
            device
                .inner
                .bind_image_memory(inner, allocation.memory(), allocation.offset())
                .map_to_err("Cannot bind memory to image")?
        };

        let image = Self {
            inner,
            format,
            extent,
            allocation: Some(allocation),
            allocator,
            device,
        };

        image.set_name(name)?;

        Ok(image)
    }

    pub fn color_range() -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        }
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            if let Ok(mut allocator) = self.allocator.lock() {
                let _ = allocator.free(allocation);
            }
        }

        unsafe { self.device.inner.destroy_image(self.inner, None) }
    }
}

impl DebugMarker for Image {
    fn device(&self) -> &Rc<Device> {
        &self.device
    }

    fn object_type(&self) -> vk::ObjectType {
        vk::ObjectType::IMAGE
    }

    fn handle(&self) -> u64 {
        self.inner.as_raw()
    }
}
