use anyhow::{Context, bail};
use ash::vk;
use image::DynamicImage;
use log::*;

use super::buffer::{UploadContext, create_buffer, find_memory_type, submit_one_time_commands};
use super::gpu_write::write_to_gpu_buffer;
use super::swapchain::create_color_image_view;

const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

#[derive(Default)]
pub(super) struct Texture {
    pub(super) image: vk::Image,
    pub(super) image_memory: vk::DeviceMemory,
    pub(super) image_view: vk::ImageView,
    pub(super) sampler: vk::Sampler,
}

impl Texture {
    pub(super) fn create(
        ctx: &UploadContext,
        source: &DynamicImage,
        max_anisotropy: Option<f32>,
    ) -> anyhow::Result<Self> {
        let rgba = source.to_rgba8();
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            bail!("texture has no pixels");
        }
        let pixels = rgba.into_raw();

        let staging = create_buffer(
            ctx,
            pixels.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        let result = (|| -> anyhow::Result<(vk::Image, vk::DeviceMemory)> {
            unsafe { write_to_gpu_buffer(ctx.device, staging.memory, pixels.as_slice())? };

            let (image, image_memory) = create_image(ctx, width, height)?;
            let uploaded = upload_pixels(ctx, staging.buffer, image, width, height);
            if let Err(err) = uploaded {
                unsafe {
                    ctx.device.destroy_image(image, None);
                    ctx.device.free_memory(image_memory, None);
                }
                return Err(err);
            }

            Ok((image, image_memory))
        })();

        unsafe { staging.destroy(ctx.device) };
        let (image, image_memory) = result?;

        let image_view = create_color_image_view(ctx.device, image, TEXTURE_FORMAT)?;
        let sampler = create_sampler(ctx.device, max_anisotropy)?;

        debug!("uploaded {width}x{height} texture");

        Ok(Self {
            image,
            image_memory,
            image_view,
            sampler,
        })
    }

    pub(super) unsafe fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_sampler(self.sampler, None);
            device.destroy_image_view(self.image_view, None);
            device.destroy_image(self.image, None);
            device.free_memory(self.image_memory, None);
        }
    }
}

fn create_image(
    ctx: &UploadContext,
    width: u32,
    height: u32,
) -> anyhow::Result<(vk::Image, vk::DeviceMemory)> {
    let device = ctx.device;
    let image_info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .extent(vk::Extent3D {
            width,
            height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .format(TEXTURE_FORMAT)
        .tiling(vk::ImageTiling::OPTIMAL)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .samples(vk::SampleCountFlags::TYPE_1);

    let image = unsafe { device.create_image(&image_info, None)? };
    let requirements = unsafe { device.get_image_memory_requirements(image) };

    let memory_type_index = find_memory_type(
        ctx.memory_properties,
        requirements.memory_type_bits,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;
    let alloc_info = vk::MemoryAllocateInfo::default()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
        Ok(memory) => memory,
        Err(err) => {
            unsafe { device.destroy_image(image, None) };
            return Err(err).context("failed to allocate texture memory");
        }
    };
    unsafe { device.bind_image_memory(image, memory, 0)? };

    Ok((image, memory))
}

fn upload_pixels(
    ctx: &UploadContext,
    staging: vk::Buffer,
    image: vk::Image,
    width: u32,
    height: u32,
) -> anyhow::Result<()> {
    let to_transfer = layout_barrier(
        image,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    )?;
    let to_shader_read = layout_barrier(
        image,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    )?;

    let region = vk::BufferImageCopy::default()
        .buffer_offset(0)
        .buffer_row_length(0)
        .buffer_image_height(0)
        .image_subresource(
            vk::ImageSubresourceLayers::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .mip_level(0)
                .base_array_layer(0)
                .layer_count(1),
        )
        .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
        .image_extent(vk::Extent3D {
            width,
            height,
            depth: 1,
        });

    submit_one_time_commands(ctx, |command_buffer| unsafe {
        to_transfer.record(ctx.device, command_buffer);
        ctx.device.cmd_copy_buffer_to_image(
            command_buffer,
            staging,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );
        to_shader_read.record(ctx.device, command_buffer);
    })
}

fn create_sampler(device: &ash::Device, max_anisotropy: Option<f32>) -> anyhow::Result<vk::Sampler> {
    let create_info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(max_anisotropy.is_some())
        .max_anisotropy(max_anisotropy.unwrap_or(1.0))
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(0.0);

    let sampler = unsafe { device.create_sampler(&create_info, None)? };
    Ok(sampler)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Access masks and stages for the only two transitions a texture upload needs
pub fn layout_transition(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> anyhow::Result<LayoutTransition> {
    use vk::ImageLayout as Layout;

    let transition = match (old_layout, new_layout) {
        (Layout::UNDEFINED, Layout::TRANSFER_DST_OPTIMAL) => LayoutTransition {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        },
        (Layout::TRANSFER_DST_OPTIMAL, Layout::SHADER_READ_ONLY_OPTIMAL) => LayoutTransition {
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::SHADER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        },
        _ => bail!("unsupported layout transition: {old_layout:?} -> {new_layout:?}"),
    };

    Ok(transition)
}

struct LayoutBarrier {
    transition: LayoutTransition,
    barrier: vk::ImageMemoryBarrier<'static>,
}

fn layout_barrier(
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> anyhow::Result<LayoutBarrier> {
    let transition = layout_transition(old_layout, new_layout)?;

    let subresource_range = vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1);

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(subresource_range)
        .src_access_mask(transition.src_access)
        .dst_access_mask(transition.dst_access);

    Ok(LayoutBarrier {
        transition,
        barrier,
    })
}

impl LayoutBarrier {
    unsafe fn record(&self, device: &ash::Device, command_buffer: vk::CommandBuffer) {
        unsafe {
            device.cmd_pipeline_barrier(
                command_buffer,
                self.transition.src_stage,
                self.transition.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[self.barrier],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_transition_waits_for_nothing() {
        let transition = layout_transition(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();

        assert!(transition.src_access.is_empty());
        assert_eq!(transition.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(transition.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(transition.dst_stage, vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn shader_read_transition_waits_for_the_copy() {
        let transition = layout_transition(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();

        assert_eq!(transition.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(transition.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(transition.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn other_transitions_are_rejected() {
        let result = layout_transition(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        assert!(result.is_err());
    }

    #[test]
    fn barrier_carries_the_transition_masks() {
        let barrier = layout_barrier(
            vk::Image::null(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();

        assert_eq!(barrier.barrier.dst_access_mask, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(barrier.barrier.new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(barrier.barrier.src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
    }
}
