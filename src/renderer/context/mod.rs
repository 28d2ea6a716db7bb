use crate::err::AppError;
use crate::raytracer::PATH_TRACE_MAX_TEXTURES;
use crate::vulkan::{CommandPool, Device, DeviceQueryResult, Instance};
use ash::Entry;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use log::info;
use std::fmt::Write;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

/// Headless Vulkan state: instance, compute device, allocator and the compute command pool.
///
/// Fields drop in declaration order, the allocator has to go before the device and the entry last.
pub struct VulkanContext {
    pub allocator: Arc<Mutex<Allocator>>,
    pub command_pool: CommandPool,
    pub device: Rc<Device>,
    pub instance: Rc<Instance>,
    _entry: Entry,
}

impl VulkanContext {
    pub fn init() -> Result<Self, AppError> {
        let entry = unsafe { Entry::load() }.map_err(|e| AppError::Other(format!("Cannot load Vulkan: {e}")))?;

        let instance = Rc::new(Instance::new(&entry)?);

        let device = Self::init_device(&instance)?;

        info!("using {}", device.name);

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.inner.clone(),
            device: device.inner.clone(),
            physical_device: device.physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        let allocator = Arc::new(Mutex::new(allocator));

        let command_pool = CommandPool::new_compute(device.clone())?;

        Ok(Self {
            allocator,
            command_pool,
            device,
            instance,
            _entry: entry,
        })
    }

    fn init_device(instance: &Instance) -> Result<Rc<Device>, AppError> {
        let devices = Device::query_applicable(instance, PATH_TRACE_MAX_TEXTURES as u32)?;
        if devices.is_empty() {
            return Err(AppError::Other("No GPUs with Vulkan support found".into()));
        }

        let mut applicable = Vec::new();
        let mut message = String::from("No applicable device found: \n");

        for device in devices {
            match device {
                DeviceQueryResult::Applicable(device) => applicable.push(device),
                DeviceQueryResult::NotApplicable(device) => {
                    let missing = device.missing.iter().fold(String::new(), |mut out, m| {
                        let _ = writeln!(out, "\t\t - {m}");
                        out
                    });

                    let _ = write!(message, "\t{}\n\t\tMissing:\n{}", device.name, missing);
                }
            }
        }

        // discrete GPUs first
        applicable.sort_by_key(|d| !d.discrete);

        match applicable.first() {
            Some(device) => Ok(Rc::new(Device::new(instance, device)?)),
            None => Err(AppError::Other(message)),
        }
    }
}
