use anyhow::bail;
use image::DynamicImage;

use super::pipeline::ShaderPaths;
use super::vertex_description::VertexDescription;

/// Everything the renderer needs from the game up front
pub struct RendererConfig<V: VertexDescription> {
    /// size in bytes of the value written each frame by `Renderer::draw_frame`
    pub uniform_buffer_size: u64,
    pub vertices: Vec<V>,
    pub indices: Vec<u16>,
    pub texture: DynamicImage,
    pub shaders: ShaderPaths,
    pub clear_color: [f32; 4],
    pub prefer_mailbox: bool,
    pub validation: bool,
}

impl<V: VertexDescription> RendererConfig<V> {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.uniform_buffer_size == 0 {
            bail!("uniform buffer size must be non-zero");
        }
        if self.vertices.is_empty() {
            bail!("no vertices to draw");
        }
        if self.indices.is_empty() || self.indices.len() % 3 != 0 {
            bail!(
                "index count must be a non-zero multiple of 3, got {}",
                self.indices.len()
            );
        }

        let vertex_count = self.vertices.len();
        if let Some(index) = self.indices.iter().find(|i| **i as usize >= vertex_count) {
            bail!("index {index} is out of range for {vertex_count} vertices");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use ash::vk;

    use super::super::gpu_write::GPUWrite;
    use super::*;

    #[derive(Debug, Clone, Copy)]
    #[repr(C)]
    struct Point(f32);

    impl GPUWrite for Point {}

    impl VertexDescription for Point {
        fn binding_descriptions() -> Vec<vk::VertexInputBindingDescription> {
            vec![]
        }

        fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
            vec![]
        }
    }

    fn config(vertex_count: usize, indices: Vec<u16>) -> RendererConfig<Point> {
        RendererConfig {
            uniform_buffer_size: 64,
            vertices: vec![Point(0.0); vertex_count],
            indices,
            texture: DynamicImage::new_rgba8(1, 1),
            shaders: ShaderPaths::in_dir(Path::new("shaders")),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            prefer_mailbox: true,
            validation: false,
        }
    }

    #[test]
    fn quad_is_valid() {
        assert!(config(4, vec![0, 1, 2, 2, 3, 0]).validate().is_ok());
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let err = config(3, vec![0, 1, 3]).validate().unwrap_err();
        assert_eq!(err.to_string(), "index 3 is out of range for 3 vertices");
    }

    #[test]
    fn partial_triangles_are_rejected() {
        assert!(config(4, vec![0, 1]).validate().is_err());
        assert!(config(4, vec![]).validate().is_err());
    }

    #[test]
    fn zero_sized_uniform_is_rejected() {
        let mut config = config(3, vec![0, 1, 2]);
        config.uniform_buffer_size = 0;
        assert!(config.validate().is_err());
    }
}
