use ash::vk;

use super::texture::Texture;
use super::uniform_buffer::UniformBuffers;

pub(super) const UNIFORM_BINDING: u32 = 0;
pub(super) const SAMPLER_BINDING: u32 = 1;

pub(super) fn layout_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 2] {
    [
        vk::DescriptorSetLayoutBinding::default()
            .binding(UNIFORM_BINDING)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX),
        vk::DescriptorSetLayoutBinding::default()
            .binding(SAMPLER_BINDING)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT),
    ]
}

pub(super) fn create_set_layout(device: &ash::Device) -> anyhow::Result<vk::DescriptorSetLayout> {
    let bindings = layout_bindings();
    let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
    let layout = unsafe { device.create_descriptor_set_layout(&create_info, None)? };

    Ok(layout)
}

pub(super) fn pool_sizes(set_count: u32) -> [vk::DescriptorPoolSize; 2] {
    [
        vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(set_count),
        vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(set_count),
    ]
}

/// One descriptor set per swapchain image; the sets are freed with the pool
#[derive(Default)]
pub(super) struct Descriptors {
    pub(super) pool: vk::DescriptorPool,
    pub(super) sets: Vec<vk::DescriptorSet>,
}

impl Descriptors {
    pub(super) fn create(
        device: &ash::Device,
        layout: vk::DescriptorSetLayout,
        uniform_buffers: &UniformBuffers,
        texture: &Texture,
        image_count: usize,
    ) -> anyhow::Result<Self> {
        let set_count = image_count as u32;
        let sizes = pool_sizes(set_count);
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&sizes)
            .max_sets(set_count);
        let pool = unsafe { device.create_descriptor_pool(&pool_info, None)? };

        let layouts = vec![layout; image_count];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        let sets = match unsafe { device.allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => sets,
            Err(err) => {
                unsafe { device.destroy_descriptor_pool(pool, None) };
                return Err(err.into());
            }
        };

        for (image_index, set) in sets.iter().enumerate() {
            let buffer_info = [vk::DescriptorBufferInfo::default()
                .buffer(uniform_buffers.buffer(image_index))
                .offset(0)
                .range(uniform_buffers.size())];
            let image_info = [vk::DescriptorImageInfo::default()
                .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .image_view(texture.image_view)
                .sampler(texture.sampler)];

            let writes = [
                vk::WriteDescriptorSet::default()
                    .dst_set(*set)
                    .dst_binding(UNIFORM_BINDING)
                    .dst_array_element(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&buffer_info),
                vk::WriteDescriptorSet::default()
                    .dst_set(*set)
                    .dst_binding(SAMPLER_BINDING)
                    .dst_array_element(0)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&image_info),
            ];

            unsafe { device.update_descriptor_sets(&writes, &[]) };
        }

        Ok(Self { pool, sets })
    }

    pub(super) unsafe fn destroy(&self, device: &ash::Device) {
        unsafe { device.destroy_descriptor_pool(self.pool, None) };
    }
}
