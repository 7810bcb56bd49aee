use ash::vk;
use glam::{Vec2, Vec3};

use crate::renderer::{GPUWrite, VertexDescription};

#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct Vertex {
    pub position: Vec2,
    pub color: Vec3,
    pub tex_coord: Vec2,
}

impl GPUWrite for Vertex {}

impl VertexDescription for Vertex {
    fn binding_descriptions() -> Vec<vk::VertexInputBindingDescription> {
        vec![
            vk::VertexInputBindingDescription::default()
                .binding(0)
                .stride(std::mem::size_of::<Self>() as u32)
                .input_rate(vk::VertexInputRate::VERTEX),
        ]
    }

    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        // color formats double as vector sizes; missing components default to 0, alpha to 1
        let vec_2_format = vk::Format::R32G32_SFLOAT;
        let vec_3_format = vk::Format::R32G32B32_SFLOAT;

        vec![
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(0)
                .format(vec_2_format)
                .offset(std::mem::offset_of!(Vertex, position) as u32),
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(1)
                .format(vec_3_format)
                .offset(std::mem::offset_of!(Vertex, color) as u32),
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(2)
                .format(vec_2_format)
                .offset(std::mem::offset_of!(Vertex, tex_coord) as u32),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 28);

        let binding = &Vertex::binding_descriptions()[0];
        assert_eq!(binding.stride, 28);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn attributes_match_shader_locations() {
        let attributes = Vertex::attribute_descriptions();
        let described: Vec<_> = attributes
            .iter()
            .map(|a| (a.location, a.format, a.offset))
            .collect();

        assert_eq!(
            described,
            vec![
                (0, vk::Format::R32G32_SFLOAT, 0),
                (1, vk::Format::R32G32B32_SFLOAT, 8),
                (2, vk::Format::R32G32_SFLOAT, 20),
            ]
        );
    }
}
