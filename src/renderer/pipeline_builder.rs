use crate::err::AppError;
use crate::raytracer::backend::Kernel;
use crate::renderer::shader_loader::ShaderLoader;
use crate::vulkan::{DescriptorSetLayout, Device, Pipeline, ShaderModule};
use log::debug;
use std::collections::HashMap;
use std::rc::Rc;

pub struct PipelineBuilder {
    pipelines: HashMap<Kernel, Pipeline>,
}

impl PipelineBuilder {
    /// Compiles one compute pipeline per kernel. Shader modules are dropped once the pipelines exist.
    pub fn build(shader_loader: &ShaderLoader, device: Rc<Device>, layout: &DescriptorSetLayout) -> Result<Self, AppError> {
        let mut pipelines = HashMap::new();

        for kernel in Kernel::ALL {
            let spirv = shader_loader.compute_stage(kernel.name())?;
            let module = ShaderModule::new(spirv.as_ref(), device.clone(), kernel.name())?;
            let pipeline = Pipeline::new_compute(device.clone(), &module, &[layout])?;

            debug!("built pipeline {}", kernel.name());

            pipelines.insert(kernel, pipeline);
        }

        Ok(Self { pipelines })
    }

    pub fn get(&self, kernel: Kernel) -> Option<&Pipeline> {
        self.pipelines.get(&kernel)
    }
}
