use ash::vk;

use super::gpu_write::GPUWrite;

/// A vertex type the renderer can upload and describe to the pipeline
pub trait VertexDescription: GPUWrite {
    fn binding_descriptions() -> Vec<vk::VertexInputBindingDescription>;
    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription>;
}

/// The vertex input state, kept so the pipeline can be rebuilt without the vertex type
#[derive(Debug, Clone)]
pub(super) struct VertexLayout {
    pub(super) bindings: Vec<vk::VertexInputBindingDescription>,
    pub(super) attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl VertexLayout {
    pub(super) fn of<V: VertexDescription>() -> Self {
        Self {
            bindings: V::binding_descriptions(),
            attributes: V::attribute_descriptions(),
        }
    }
}
