use crate::vulkan::{DebugMarker, Device, IntoVulkanError, MemoryError};
use ash::vk;
use ash::vk::Handle;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

pub struct Buffer {
    pub inner: vk::Buffer,
    pub size: u64,
    allocation: Option<Allocation>,
    allocator: Arc<Mutex<Allocator>>,
    device: Rc<Device>,
}

impl Buffer {
    pub fn new(
        device: Rc<Device>,
        allocator: Arc<Mutex<Allocator>>,
        location: MemoryLocation,
        usage: vk::BufferUsageFlags,
        size: u64,
        name: &str,
    ) -> Result<Self, MemoryError> {
        let info = vk::BufferCreateInfo {
            size,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };

        let inner = unsafe {
            device
                .inner
                .create_buffer(&info, None)
                .map_to_err("Cannot create buffer")?
        };

        let requirements = unsafe { device.inner.get_buffer_memory_requirements(inner) };

        let allocation = {
            let mut allocator = allocator.lock().map_err(|_| MemoryError::Poisoned)?;

            allocator.allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
        };

        let allocation = match allocation {
            Ok(a) => a,
            Err(e) => {
                unsafe { device.inner.destroy_buffer(inner, None) };
                return Err(e.into());
            }
        };

        unsafe {
            device
                .inner
                .bind_buffer_memory(inner, allocation.memory(), allocation.offset())
                .map_to_err("Cannot bind memory to buffer")?
        };

        let buffer = Self {
            inner,
            size,
            allocation: Some(allocation),
            allocator,
            device,
        };

        buffer.set_name(name)?;

        Ok(buffer)
    }

    pub fn is_host_visible(&self) -> bool {
        self.allocation.as_ref().is_some_and(|a| a.mapped_ptr().is_some())
    }

    pub fn fill_host(&self, data: &[u8]) -> Result<(), MemoryError> {
        let ptr = self
            .allocation
            .as_ref()
            .and_then(|a| a.mapped_ptr())
            .ok_or(MemoryError::NotMapped("buffer".into()))?;

        let len = data.len().min(self.size as usize);

        unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.as_ptr() as *mut u8, len) };

        Ok(())
    }

    pub fn read_host(&self, out: &mut [u8]) -> Result<(), MemoryError> {
        let mapped = self
            .allocation
            .as_ref()
            .and_then(|a| a.mapped_slice())
            .ok_or(MemoryError::NotMapped("buffer".into()))?;

        let len = out.len().min(mapped.len());
        out[..len].copy_from_slice(&mapped[..len]);

        Ok(())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            if let Ok(mut allocator) = self.allocator.lock() {
                let _ = allocator.free(allocation);
            }
        }

        unsafe { self.device.inner.destroy_buffer(self.inner, None) }
    }
}

impl DebugMarker for Buffer {
    fn device(&self) -> &Rc<Device> {
        &self.device
    }

    fn object_type(&self) -> vk::ObjectType {
        vk::ObjectType::BUFFER
    }

    fn handle(&self) -> u64 {
        self.inner.as_raw()
    }
}
