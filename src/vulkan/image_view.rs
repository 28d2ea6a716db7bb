use crate::vulkan::{Device, Image, IntoVulkanError, VulkanError};
use ash::vk;
use ash::vk::ImageView as RawImageView;
use std::rc::Rc;

pub struct ImageView {
    pub inner: RawImageView,
    device: Rc<Device>,
}

impl ImageView {
    pub fn new(device: Rc<Device>, image: &Image) -> Result<Self, VulkanError> {
        let create_info = vk::ImageViewCreateInfo {
            image: image.inner,
            view_type: vk::ImageViewType::TYPE_2D,
            format: image.format,
            components: vk::ComponentMapping::default(),
            subresource_range: Image::color_range(),
            ..Default::default()
        };

        let inner = unsafe {
            device
                .inner
                .create_image_view(&create_info, None)
                .map_to_err("Cannot create image view")?
        };

        Ok(Self { inner, device })
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_image_view(self.inner, None) }
    }
}
