use crate::material::Texture;
use crate::raytracer::RayTraceError;
use crate::vulkan::{Buffer, CommandBuffer, Device, Image, ImageView};
use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::Allocator;
use log::debug;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

pub struct GpuTexture {
    pub view: ImageView,
    _image: Image,
}

/// Sampled images keyed by texture id. A texture is uploaded the first time a dispatch binds it.
#[derive(Default)]
pub struct TextureCache {
    textures: HashMap<u64, GpuTexture>,
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: u64) -> Option<&GpuTexture> {
        self.textures.get(&id)
    }

    /// Records the upload of `texture` into `cb` unless it is resident. Returns the staging buffer, which must
    /// outlive the submission.
    pub fn ensure(
        &mut self,
        texture: &Texture,
        device: &Rc<Device>,
        allocator: &Arc<Mutex<Allocator>>,
        cb: &CommandBuffer,
    ) -> Result<Option<Buffer>, RayTraceError> {
        if self.textures.contains_key(&texture.id) {
            return Ok(None);
        }

        let expected = texture.width as usize * texture.height as usize * 4;
        if texture.width == 0 || texture.height == 0 || texture.rgba.len() != expected {
            return Err(RayTraceError::Backend(
                format!(
                    "texture `{}` is {}x{} but holds {} bytes",
                    texture.name,
                    texture.width,
                    texture.height,
                    texture.rgba.len()
                )
                .into(),
            ));
        }

        let staging = Buffer::new(
            device.clone(),
            allocator.clone(),
            MemoryLocation::CpuToGpu,
            vk::BufferUsageFlags::TRANSFER_SRC,
            texture.rgba.len() as u64,
            "texture staging",
        )?;
        staging.fill_host(&texture.rgba)?;

        let image = Image::new(
            device.clone(),
            allocator.clone(),
            vk::Format::R8G8B8A8_UNORM,
            vk::Extent3D {
                width: texture.width,
                height: texture.height,
                depth: 1,
            },
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            &texture.name,
        )?;

        cb.image_barrier(
            &image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
        );
        cb.copy_buffer_to_image(&staging, &image);
        cb.image_barrier(
            &image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::AccessFlags::SHADER_READ,
        );

        let view = ImageView::new(device.clone(), &image)?;

        debug!("uploaded texture {} ({}x{})", texture.name, texture.width, texture.height);

        self.textures.insert(texture.id, GpuTexture { view, _image: image });

        Ok(Some(staging))
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }
}
