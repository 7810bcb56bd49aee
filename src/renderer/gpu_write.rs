use std::ffi::c_void;

use ash::vk;

/// A marker for plain-data types that get copied byte-for-byte into GPU memory
///
/// An implementing struct must be repr(C) with a layout matching the shader's.
pub trait GPUWrite: Copy {}

impl GPUWrite for u8 {}
impl GPUWrite for u16 {}

/// Maps `buffer_memory`, copies `elements` to its start, and unmaps it again.
///
/// # Safety
/// `buffer_memory` must be host-visible, unmapped, and at least as large as `elements`.
pub(super) unsafe fn write_to_gpu_buffer<T: GPUWrite>(
    device: &ash::Device,
    buffer_memory: vk::DeviceMemory,
    elements: &[T],
) -> anyhow::Result<()> {
    let buffer_size = std::mem::size_of_val(elements) as vk::DeviceSize;

    unsafe {
        let mapped_dst = device.map_memory(
            buffer_memory,
            0,
            buffer_size,
            vk::MemoryMapFlags::empty(),
        )?;
        copy_to_mapped(mapped_dst, elements);
        device.unmap_memory(buffer_memory);
    };

    Ok(())
}

/// # Safety
/// `mapped_dst` must point to mapped memory with room for all of `elements`.
pub(super) unsafe fn copy_to_mapped<T: GPUWrite>(mapped_dst: *mut c_void, elements: &[T]) {
    unsafe {
        std::ptr::copy_nonoverlapping(elements.as_ptr(), mapped_dst as *mut T, elements.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_every_element() {
        let src: [u16; 6] = [0, 1, 2, 2, 3, 0];
        let mut dst = [0u16; 6];

        unsafe { copy_to_mapped(dst.as_mut_ptr() as *mut c_void, &src) };

        assert_eq!(dst, src);
    }
}
