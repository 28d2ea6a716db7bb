use ash::vk;
use gpu_allocator::AllocationError;
use std::borrow::Cow;
use std::ffi::{CStr, CString};
use std::rc::Rc;
use thiserror::Error;

mod buffer;
mod command_buffer;
mod command_pool;
mod descriptor;
mod device;
mod image;
mod image_view;
mod instance;
mod pipeline;
mod sampler;
mod shader;
mod sync;

pub use buffer::Buffer;
pub use command_buffer::CommandBuffer;
pub use command_pool::CommandPool;
pub use descriptor::{DescriptorPool, DescriptorSet, DescriptorSetLayout};
pub use device::{Device, DeviceQueryResult};
pub use image::Image;
pub use image_view::ImageView;
pub use instance::Instance;
pub use pipeline::Pipeline;
pub use sampler::Sampler;
pub use shader::ShaderModule;
pub use sync::Fence;

pub const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";
pub const DEBUG_UTILS_EXTENSION: &CStr = ash::ext::debug_utils::NAME;

#[derive(Error, Debug)]
#[error("{msg}: {code}")]
pub struct VulkanError {
    msg: Cow<'static, str>,
    code: vk::Result,
}

impl VulkanError {
    pub fn new(msg: impl Into<Cow<'static, str>>, code: vk::Result) -> Self {
        Self { msg: msg.into(), code }
    }
}

pub trait IntoVulkanError<T> {
    fn map_to_err(self, msg: impl Into<Cow<'static, str>>) -> Result<T, VulkanError>;
}

impl<T> IntoVulkanError<T> for ash::prelude::VkResult<T> {
    fn map_to_err(self, msg: impl Into<Cow<'static, str>>) -> Result<T, VulkanError> {
        self.map_err(|code| VulkanError { code, msg: msg.into() })
    }
}

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error(transparent)]
    Vulkan(#[from] VulkanError),
    #[error("{0}")]
    Allocator(#[from] AllocationError),
    #[error("allocator lock poisoned")]
    Poisoned,
    #[error("memory of `{0}` is not host visible")]
    NotMapped(Cow<'static, str>),
}

pub trait DebugMarker {
    fn device(&self) -> &Rc<Device>;

    fn object_type(&self) -> vk::ObjectType;

    fn handle(&self) -> u64;

    fn set_name(&self, name: &str) -> Result<(), VulkanError> {
        let name = CString::new(name).unwrap_or_default();

        let info = vk::DebugUtilsObjectNameInfoEXT {
            object_type: self.object_type(),
            object_handle: self.handle(),
            p_object_name: name.as_ptr(),
            ..Default::default()
        };

        self.device().name_object(&info)
    }
}
