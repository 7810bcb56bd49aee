use anyhow::Context;
use ash::vk;
use log::*;

use super::device::{CompleteQueueFamilies, SwapchainSupport};

pub(super) struct Swapchain {
    pub(super) handle: vk::SwapchainKHR,
    pub(super) images: Vec<vk::Image>,
    pub(super) image_views: Vec<vk::ImageView>,
    pub(super) format: vk::Format,
    pub(super) extent: vk::Extent2D,
}

pub(super) struct SwapchainRequest<'a> {
    pub(super) surface: vk::SurfaceKHR,
    pub(super) support: &'a SwapchainSupport,
    pub(super) queue_families: CompleteQueueFamilies,
    pub(super) window_pixel_size: (u32, u32),
    pub(super) prefer_mailbox: bool,
}

impl Swapchain {
    pub(super) fn create(
        device: &ash::Device,
        loader: &ash::khr::swapchain::Device,
        request: SwapchainRequest,
    ) -> anyhow::Result<Self> {
        let support = request.support;
        let surface_format = choose_surface_format(&support.formats)?;
        let present_mode = choose_present_mode(&support.present_modes, request.prefer_mailbox);
        let extent = choose_extent(&support.capabilities, request.window_pixel_size);
        let image_count = choose_image_count(&support.capabilities);

        let family_indices = [
            request.queue_families.graphics,
            request.queue_families.present,
        ];
        let shared = request.queue_families.is_shared();
        let shared_families: &[u32] = if shared { &[] } else { &family_indices };
        let sharing_mode = if shared {
            vk::SharingMode::EXCLUSIVE
        } else {
            vk::SharingMode::CONCURRENT
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(request.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(shared_families)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let handle = unsafe {
            loader
                .create_swapchain(&create_info, None)
                .context("failed to create swapchain")?
        };
        let images = unsafe { loader.get_swapchain_images(handle)? };

        let image_views = images
            .iter()
            .map(|image| create_color_image_view(device, *image, surface_format.format))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "swapchain: {}x{}, {} images, {:?}, {:?}",
            extent.width,
            extent.height,
            images.len(),
            surface_format.format,
            present_mode
        );

        Ok(Self {
            handle,
            images,
            image_views,
            format: surface_format.format,
            extent,
        })
    }

    pub(super) unsafe fn destroy(&self, device: &ash::Device, loader: &ash::khr::swapchain::Device) {
        unsafe {
            for view in &self.image_views {
                device.destroy_image_view(*view, None);
            }
            loader.destroy_swapchain(self.handle, None);
        }
    }

    pub(super) fn aspect_ratio(&self) -> f32 {
        self.extent.width as f32 / self.extent.height.max(1) as f32
    }
}

pub(super) fn create_color_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
) -> anyhow::Result<vk::ImageView> {
    let subresource_range = vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1);

    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(subresource_range);

    let view = unsafe { device.create_image_view(&create_info, None)? };
    Ok(view)
}

/// prefers 8-bit BGRA sRGB, otherwise whatever the surface lists first
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> anyhow::Result<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
        .context("surface reports no formats")
}

/// FIFO is the only mode every driver must support
pub fn choose_present_mode(
    present_modes: &[vk::PresentModeKHR],
    prefer_mailbox: bool,
) -> vk::PresentModeKHR {
    if prefer_mailbox && present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// `current_extent` of u32::MAX means the surface size is set by the swapchain
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window_pixel_size: (u32, u32),
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let (width, height) = window_pixel_size;
    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;

    vk::Extent2D {
        width: width.clamp(min.width, max.width),
        height: height.clamp(min.height, max.height),
    }
}

/// None while there is nothing to draw into: a window with no pixels, or a
/// surface reporting a zero extent (minimized on some platforms)
pub fn drawable_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window_pixel_size: (u32, u32),
) -> Option<vk::Extent2D> {
    let (width, height) = window_pixel_size;
    if width == 0 || height == 0 {
        return None;
    }

    let extent = choose_extent(capabilities, window_pixel_size);
    (extent.width > 0 && extent.height > 0).then_some(extent)
}

/// one more than the minimum, so the driver never blocks us on its own work
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    // zero means no maximum
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}
