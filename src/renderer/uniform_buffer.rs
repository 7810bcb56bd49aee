use std::ffi::c_void;

use anyhow::bail;
use ash::vk;

use super::buffer::{AllocatedBuffer, UploadContext, create_buffer};
use super::gpu_write::{GPUWrite, copy_to_mapped};

pub(super) struct RawUniformBuffer {
    pub(super) buffer: AllocatedBuffer,
    pub(super) mapped_mem: *mut c_void,
}

/// One persistently mapped uniform buffer per swapchain image
///
/// An image's buffer may only be written once the fence that last submitted
/// that image has signaled.
#[derive(Default)]
pub(super) struct UniformBuffers {
    size: vk::DeviceSize,
    per_image: Vec<RawUniformBuffer>,
}

impl UniformBuffers {
    pub(super) fn create(
        ctx: &UploadContext,
        size: vk::DeviceSize,
        image_count: usize,
    ) -> anyhow::Result<Self> {
        let mut uniform_buffers = Self {
            size,
            per_image: Vec::with_capacity(image_count),
        };

        for _ in 0..image_count {
            let created = create_mapped(ctx, size);
            match created {
                Ok(raw) => uniform_buffers.per_image.push(raw),
                Err(err) => {
                    unsafe { uniform_buffers.destroy(ctx.device) };
                    return Err(err);
                }
            }
        }

        Ok(uniform_buffers)
    }

    pub(super) fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub(super) fn buffer(&self, image_index: usize) -> vk::Buffer {
        self.per_image[image_index].buffer.buffer
    }

    pub(super) fn write<T: GPUWrite>(&mut self, image_index: usize, value: &T) -> anyhow::Result<()> {
        check_fits::<T>(self.size)?;

        let raw = &self.per_image[image_index];
        unsafe { copy_to_mapped(raw.mapped_mem, std::slice::from_ref(value)) };

        Ok(())
    }

    pub(super) unsafe fn destroy(&mut self, device: &ash::Device) {
        for raw in self.per_image.drain(..) {
            unsafe {
                device.unmap_memory(raw.buffer.memory);
                raw.buffer.destroy(device);
            }
        }
    }
}

fn create_mapped(ctx: &UploadContext, size: vk::DeviceSize) -> anyhow::Result<RawUniformBuffer> {
    let buffer = create_buffer(
        ctx,
        size,
        vk::BufferUsageFlags::UNIFORM_BUFFER,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;

    let mapped = unsafe {
        ctx.device
            .map_memory(buffer.memory, 0, size, vk::MemoryMapFlags::empty())
    };
    match mapped {
        Ok(mapped_mem) => Ok(RawUniformBuffer { buffer, mapped_mem }),
        Err(err) => {
            unsafe { buffer.destroy(ctx.device) };
            Err(err.into())
        }
    }
}

fn check_fits<T>(buffer_size: vk::DeviceSize) -> anyhow::Result<()> {
    let value_size = std::mem::size_of::<T>() as vk::DeviceSize;
    if value_size > buffer_size {
        bail!(
            "uniform value of {value_size} bytes ({}) does not fit a {buffer_size} byte buffer",
            std::any::type_name::<T>()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smaller_or_equal_values_fit() {
        assert!(check_fits::<u32>(4).is_ok());
        assert!(check_fits::<u32>(192).is_ok());
    }

    #[test]
    fn larger_values_are_rejected() {
        let err = check_fits::<[f32; 16]>(32).unwrap_err();
        assert!(err.to_string().contains("64 bytes"));
    }
}
