use crate::err::AppError;
use crate::raytracer::backend::{Binding, BufferDesc, BufferUsage, ComputeBackend, Dispatch, GpuBuffer};
use crate::raytracer::{DestroyQueue, MAX_FRAMES_IN_FLIGHT, PATH_TRACE_MAX_TEXTURES, RayTraceError};
use crate::vulkan::{Buffer, CommandBuffer, Fence, Image, ImageView, Sampler};
use ash::vk;
use gpu_allocator::MemoryLocation;
use log::info;
use std::io::Cursor;
use zip::ZipArchive;

mod context;
pub use context::VulkanContext;

mod descriptors;
use descriptors::{ComputeDescriptors, DescriptorWriter};

mod pipeline_builder;
use pipeline_builder::PipelineBuilder;

mod shader_loader;
use shader_loader::ShaderLoader;
pub use shader_loader::ShaderLoaderError;

mod textures;
use textures::TextureCache;

static SHADER_ARCHIVE: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/shaders.zip"));

impl GpuBuffer for Buffer {
    fn size(&self) -> u64 {
        self.size
    }
}

/// `R32G32B32A32_SFLOAT` image kept in `GENERAL` layout for compute writes.
pub struct StorageImage {
    view: ImageView,
    pub image: Image,
    pub width: u32,
    pub height: u32,
}

struct FrameResources {
    command_buffer: CommandBuffer,
    fence: Fence,
}

/// [`ComputeBackend`] on a headless Vulkan device.
///
/// Every frame records into the command buffer of slot `frame % MAX_FRAMES_IN_FLIGHT` and submits it with that
/// slot's fence. `begin_frame` waits on the fence before reusing the slot, so once a frame number is
/// `MAX_FRAMES_IN_FLIGHT` ahead of a dispatch the dispatch has completed.
pub struct VulkanCompute {
    frames: Vec<FrameResources>,
    frame_number: u64,
    recording: bool,
    staging: DestroyQueue<Buffer>,
    textures: TextureCache,
    sampler: Sampler,
    pipelines: PipelineBuilder,
    descriptors: ComputeDescriptors,
    readback: FrameResources,
    context: VulkanContext,
}

impl VulkanCompute {
    pub fn new() -> Result<Self, AppError> {
        let context = VulkanContext::init()?;
        let device = context.device.clone();

        let archive = ZipArchive::new(Cursor::new(SHADER_ARCHIVE)).map_err(ShaderLoaderError::from)?;
        let shader_loader = ShaderLoader::from_zip(archive)?;

        let descriptors = ComputeDescriptors::build(device.clone(), MAX_FRAMES_IN_FLIGHT)?;
        let pipelines = PipelineBuilder::build(&shader_loader, device.clone(), &descriptors.layout)?;

        let mut command_buffers = context
            .command_pool
            .allocate_cmd_buffers(MAX_FRAMES_IN_FLIGHT as u32 + 1)?;

        let readback = FrameResources {
            command_buffer: command_buffers
                .pop()
                .ok_or(AppError::Other("Cannot allocate readback command buffer".into()))?,
            fence: Fence::new(device.clone())?,
        };

        let frames = command_buffers
            .into_iter()
            .map(|command_buffer| {
                Ok(FrameResources {
                    command_buffer,
                    fence: Fence::new(device.clone())?,
                })
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        let sampler = Sampler::new_repeat(device.clone())?;

        Ok(Self {
            frames,
            frame_number: 0,
            recording: false,
            staging: DestroyQueue::new(),
            textures: TextureCache::new(),
            sampler,
            pipelines,
            descriptors,
            readback,
            context,
        })
    }

    fn slot(&self) -> usize {
        (self.frame_number % MAX_FRAMES_IN_FLIGHT as u64) as usize
    }

    fn command_buffer(&self) -> Result<&CommandBuffer, RayTraceError> {
        if !self.recording {
            return Err(RayTraceError::Backend("GPU work recorded outside of a frame".into()));
        }

        Ok(&self.frames[self.slot()].command_buffer)
    }

    pub fn resident_textures(&self) -> usize {
        self.textures.len()
    }

    /// Copies `image` to the host as RGBA floats, row by row. Blocks until the device is idle.
    pub fn read_image(&self, image: &StorageImage) -> Result<Vec<f32>, RayTraceError> {
        if self.recording {
            return Err(RayTraceError::Backend("cannot read an image while a frame is recording".into()));
        }

        self.context.device.wait_idle()?;

        let texels = image.width as usize * image.height as usize * 4;

        let buffer = Buffer::new(
            self.context.device.clone(),
            self.context.allocator.clone(),
            MemoryLocation::GpuToCpu,
            vk::BufferUsageFlags::TRANSFER_DST,
            (texels * size_of::<f32>()) as u64,
            "image readback",
        )?;

        let cb = &self.readback.command_buffer;
        cb.reset()?;
        cb.begin_one_time()?;
        cb.image_barrier(
            &image.image,
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::GENERAL,
            vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::AccessFlags::SHADER_WRITE,
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_READ,
        );
        cb.copy_image_to_buffer(&image.image, vk::ImageLayout::GENERAL, &buffer);
        cb.memory_barrier(
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::HOST,
            vk::AccessFlags::HOST_READ,
        );
        cb.end()?;

        self.readback.fence.reset()?;
        cb.submit(&self.readback.fence)?;
        self.readback.fence.wait()?;

        let mut pixels = vec![0.0f32; texels];
        buffer.read_host(bytemuck::cast_slice_mut(&mut pixels))?;

        Ok(pixels)
    }
}

impl ComputeBackend for VulkanCompute {
    type Buffer = Buffer;
    type Image = StorageImage;

    fn frame_number(&self) -> u64 {
        self.frame_number
    }

    fn begin_frame(&mut self) -> Result<(), RayTraceError> {
        if self.recording {
            return Err(RayTraceError::Backend("frame already recording".into()));
        }

        let slot = self.slot();
        let frame = &self.frames[slot];

        frame.fence.wait()?;

        self.staging.flush(self.frame_number);
        self.descriptors.reset(slot)?;

        frame.command_buffer.reset()?;
        frame.command_buffer.begin_one_time()?;

        self.recording = true;

        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), RayTraceError> {
        let cb = self.command_buffer()?;

        // publishes this frame's writes to later submissions and host reads after the fence
        cb.memory_barrier(
            vk::PipelineStageFlags::COMPUTE_SHADER | vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::SHADER_WRITE | vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::COMPUTE_SHADER | vk::PipelineStageFlags::TRANSFER | vk::PipelineStageFlags::HOST,
            vk::AccessFlags::SHADER_READ
                | vk::AccessFlags::SHADER_WRITE
                | vk::AccessFlags::TRANSFER_READ
                | vk::AccessFlags::TRANSFER_WRITE
                | vk::AccessFlags::HOST_READ,
        );
        cb.end()?;

        let frame = &self.frames[self.slot()];
        frame.fence.reset()?;
        frame.command_buffer.submit(&frame.fence)?;

        self.recording = false;
        self.frame_number += 1;

        Ok(())
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<Buffer, RayTraceError> {
        let usage = match desc.usage {
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Storage => {
                vk::BufferUsageFlags::STORAGE_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_DST
                    | vk::BufferUsageFlags::TRANSFER_SRC
            }
        };

        let location = if desc.host_visible {
            MemoryLocation::CpuToGpu
        } else {
            MemoryLocation::GpuOnly
        };

        Ok(Buffer::new(
            self.context.device.clone(),
            self.context.allocator.clone(),
            location,
            usage,
            desc.size,
            desc.name,
        )?)
    }

    fn write_buffer(&mut self, buffer: &Buffer, data: &[u8]) -> Result<(), RayTraceError> {
        if data.is_empty() {
            return Ok(());
        }

        if data.len() as u64 > buffer.size {
            return Err(RayTraceError::IndexOutOfRange {
                what: "buffer write",
                index: data.len(),
                len: buffer.size as usize,
            });
        }

        if buffer.is_host_visible() {
            return Ok(buffer.fill_host(data)?);
        }

        let staging = Buffer::new(
            self.context.device.clone(),
            self.context.allocator.clone(),
            MemoryLocation::CpuToGpu,
            vk::BufferUsageFlags::TRANSFER_SRC,
            data.len() as u64,
            "staging",
        )?;
        staging.fill_host(data)?;

        let cb = self.command_buffer()?;

        // earlier dispatches of this frame may still read the old contents
        cb.memory_barrier(
            vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
        );
        cb.copy_buffer(&staging, buffer, data.len() as u64);
        cb.memory_barrier(
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::AccessFlags::SHADER_READ,
        );

        self.staging.push(self.frame_number, staging);

        Ok(())
    }

    fn read_buffer(&mut self, buffer: &Buffer, out: &mut [u8]) -> Result<(), RayTraceError> {
        Ok(buffer.read_host(out)?)
    }

    fn create_storage_image(&mut self, name: &'static str, width: u32, height: u32) -> Result<StorageImage, RayTraceError> {
        let image = Image::new(
            self.context.device.clone(),
            self.context.allocator.clone(),
            vk::Format::R32G32B32A32_SFLOAT,
            vk::Extent3D { width, height, depth: 1 },
            vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::TRANSFER_SRC,
            name,
        )?;

        self.command_buffer()?.image_barrier(
            &image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::GENERAL,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
        );

        let view = ImageView::new(self.context.device.clone(), &image)?;

        info!("created {name} {width}x{height}");

        Ok(StorageImage {
            view,
            image,
            width,
            height,
        })
    }

    fn dispatch(&mut self, dispatch: Dispatch<'_, Buffer, StorageImage>) -> Result<(), RayTraceError> {
        if !self.recording {
            return Err(RayTraceError::Backend("GPU work recorded outside of a frame".into()));
        }

        let slot = self.slot();
        let cb = &self.frames[slot].command_buffer;
        let pipeline = self
            .pipelines
            .get(dispatch.kernel)
            .ok_or_else(|| RayTraceError::Backend(format!("no pipeline for {}", dispatch.kernel.name()).into()))?;

        let mut writer = DescriptorWriter::new();

        for (binding, resource) in &dispatch.bindings {
            match resource {
                Binding::Uniform(buffer) => writer.buffer(*binding, vk::DescriptorType::UNIFORM_BUFFER, buffer),
                Binding::Storage(buffer) => writer.buffer(*binding, vk::DescriptorType::STORAGE_BUFFER, buffer),
                Binding::StorageImage(image) => writer.images(
                    *binding,
                    vk::DescriptorType::STORAGE_IMAGE,
                    vec![vk::DescriptorImageInfo {
                        sampler: vk::Sampler::null(),
                        image_view: image.view.inner,
                        image_layout: vk::ImageLayout::GENERAL,
                    }],
                ),
                Binding::Textures(textures) => {
                    if textures.len() > PATH_TRACE_MAX_TEXTURES {
                        return Err(RayTraceError::TooManyTextures {
                            limit: PATH_TRACE_MAX_TEXTURES,
                        });
                    }

                    let mut infos = Vec::with_capacity(PATH_TRACE_MAX_TEXTURES);

                    for texture in textures.iter() {
                        let staging =
                            self.textures
                                .ensure(texture, &self.context.device, &self.context.allocator, cb)?;
                        if let Some(staging) = staging {
                            self.staging.push(self.frame_number, staging);
                        }

                        let resident = self.textures.get(texture.id).ok_or(RayTraceError::Backend(
                            "texture missing after upload".into(),
                        ))?;

                        infos.push(vk::DescriptorImageInfo {
                            sampler: self.sampler.inner,
                            image_view: resident.view.inner,
                            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                        });
                    }

                    // unused slots repeat slot 0, the white texture
                    let first = infos
                        .first()
                        .copied()
                        .ok_or(RayTraceError::Backend("texture binding without textures".into()))?;
                    infos.resize(PATH_TRACE_MAX_TEXTURES, first);

                    writer.images(*binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, infos);
                }
            }
        }

        let set = self.descriptors.allocate(slot)?;
        writer.write(&self.context.device, &set);

        let [x, y, z] = dispatch.groups;

        self.context.device.begin_label(dispatch.kernel.name(), cb);
        cb.bind_compute_pipeline(pipeline);
        cb.bind_descriptor_set(pipeline, &set);
        cb.dispatch(x, y, z);
        self.context.device.end_label(cb);

        Ok(())
    }

    fn buffer_barrier(&mut self, buffer: &Buffer) -> Result<(), RayTraceError> {
        self.command_buffer()?.buffer_barrier(buffer);
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<(), RayTraceError> {
        Ok(self.context.device.wait_idle()?)
    }
}

impl Drop for VulkanCompute {
    fn drop(&mut self) {
        let _ = self.context.device.wait_idle();
    }
}
