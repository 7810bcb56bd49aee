use anyhow::{Context, bail};
use ash::vk;

use super::gpu_write::{GPUWrite, write_to_gpu_buffer};

/// What buffer/image creation and one-shot uploads need from the renderer
pub(super) struct UploadContext<'a> {
    pub(super) device: &'a ash::Device,
    pub(super) memory_properties: &'a vk::PhysicalDeviceMemoryProperties,
    pub(super) command_pool: vk::CommandPool,
    pub(super) queue: vk::Queue,
}

#[derive(Default)]
pub(super) struct AllocatedBuffer {
    pub(super) buffer: vk::Buffer,
    pub(super) memory: vk::DeviceMemory,
}

impl AllocatedBuffer {
    pub(super) unsafe fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_buffer(self.buffer, None);
            device.free_memory(self.memory, None);
        }
    }
}

/// First memory type allowed by `type_bits` that has every flag in `properties`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    properties: vk::MemoryPropertyFlags,
) -> anyhow::Result<u32> {
    let count = memory_properties.memory_type_count as usize;
    for (i, memory_type) in memory_properties.memory_types[..count].iter().enumerate() {
        let allowed = type_bits & (1 << i) != 0;
        if allowed && memory_type.property_flags.contains(properties) {
            return Ok(i as u32);
        }
    }

    bail!("failed to find a memory type with {properties:?} in {type_bits:#b}")
}

pub(super) fn create_buffer(
    ctx: &UploadContext,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    properties: vk::MemoryPropertyFlags,
) -> anyhow::Result<AllocatedBuffer> {
    let device = ctx.device;
    let buffer_info = vk::BufferCreateInfo::default()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer = unsafe { device.create_buffer(&buffer_info, None)? };
    let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

    let memory_type_index = find_memory_type(
        ctx.memory_properties,
        requirements.memory_type_bits,
        properties,
    )?;
    let alloc_info = vk::MemoryAllocateInfo::default()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    let memory = unsafe { device.allocate_memory(&alloc_info, None) };
    let memory = match memory {
        Ok(memory) => memory,
        Err(err) => {
            unsafe { device.destroy_buffer(buffer, None) };
            return Err(err).context("failed to allocate buffer memory");
        }
    };
    unsafe { device.bind_buffer_memory(buffer, memory, 0)? };

    Ok(AllocatedBuffer { buffer, memory })
}

/// Uploads `elements` into a new device-local buffer through a host-visible staging buffer
pub(super) fn create_device_local_buffer<T: GPUWrite>(
    ctx: &UploadContext,
    usage: vk::BufferUsageFlags,
    elements: &[T],
) -> anyhow::Result<AllocatedBuffer> {
    let size = std::mem::size_of_val(elements) as vk::DeviceSize;
    if size == 0 {
        bail!("refusing to create an empty {usage:?} buffer");
    }

    let staging = create_buffer(
        ctx,
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;

    let result = (|| -> anyhow::Result<AllocatedBuffer> {
        unsafe { write_to_gpu_buffer(ctx.device, staging.memory, elements)? };

        let buffer = create_buffer(
            ctx,
            size,
            vk::BufferUsageFlags::TRANSFER_DST | usage,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let copied = submit_one_time_commands(ctx, |command_buffer| {
            let region = vk::BufferCopy::default().size(size);
            unsafe {
                ctx.device
                    .cmd_copy_buffer(command_buffer, staging.buffer, buffer.buffer, &[region])
            };
        });
        if let Err(err) = copied {
            unsafe { buffer.destroy(ctx.device) };
            return Err(err);
        }

        Ok(buffer)
    })();

    unsafe { staging.destroy(ctx.device) };

    result
}

/// Records `record` into a fresh command buffer, submits it, and waits for the queue to idle
pub(super) fn submit_one_time_commands(
    ctx: &UploadContext,
    record: impl FnOnce(vk::CommandBuffer),
) -> anyhow::Result<()> {
    let device = ctx.device;
    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_pool(ctx.command_pool)
        .command_buffer_count(1);

    let command_buffer = unsafe { device.allocate_command_buffers(&alloc_info)?[0] };

    let result = (|| -> anyhow::Result<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { device.begin_command_buffer(command_buffer, &begin_info)? };

        record(command_buffer);

        unsafe { device.end_command_buffer(command_buffer)? };

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        unsafe {
            device.queue_submit(ctx.queue, &[submit_info], vk::Fence::null())?;
            device.queue_wait_idle(ctx.queue)?;
        }

        Ok(())
    })();

    unsafe { device.free_command_buffers(ctx.command_pool, &[command_buffer]) };

    result
}
