use crate::vulkan::{Device, IntoVulkanError, VulkanError};
use ash::vk;
use ash::vk::Handle;
use std::ffi::CString;
use std::io::Cursor;
use std::rc::Rc;

pub struct ShaderModule {
    pub inner: vk::ShaderModule,
    device: Rc<Device>,
    entry: CString,
}

impl ShaderModule {
    /// Creates a compute shader module from SPIR-V bytes.
    pub fn new(bytecode: &[u8], device: Rc<Device>, name: &str) -> Result<Self, VulkanError> {
        let code = ash::util::read_spv(&mut Cursor::new(bytecode))
            .map_err(|_| VulkanError::new(format!("`{name}` is not valid SPIR-V"), vk::Result::ERROR_INITIALIZATION_FAILED))?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);

        let inner = unsafe {
            device
                .inner
                .create_shader_module(&create_info, None)
                .map_to_err("cannot create shader module")?
        };

        let name_ptr = CString::new(name).unwrap_or_default();
        let name_info = vk::DebugUtilsObjectNameInfoEXT {
            object_type: vk::ObjectType::SHADER_MODULE,
            object_handle: inner.as_raw(),
            p_object_name: name_ptr.as_ptr(),
            ..Default::default()
        };

        device.name_object(&name_info)?;

        Ok(Self {
            inner,
            device,
            entry: c"main".to_owned(),
        })
    }

    pub fn stage_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(self.inner)
            .name(&self.entry)
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_shader_module(self.inner, None) }
    }
}
