use std::time::{Duration, Instant};

use glam::{Vec2, Vec3};
use image::{DynamicImage, Rgba, RgbaImage};
use log::*;

use crate::config::{Config, RendererSettings};
use crate::renderer::{Renderer, RendererConfig, ShaderPaths};
use crate::util::load_image;

use super::Game;
use super::mvp::{COLUMN_MAJOR, MVPMatrices, make_mvp_matrices};
use super::vertex::Vertex;

pub const VERTICES: [Vertex; 4] = [
    Vertex {
        position: Vec2::new(-0.5, -0.5),
        color: Vec3::new(1.0, 0.0, 0.0),
        tex_coord: Vec2::new(0.0, 0.0),
    },
    Vertex {
        position: Vec2::new(0.5, -0.5),
        color: Vec3::new(0.0, 1.0, 0.0),
        tex_coord: Vec2::new(1.0, 0.0),
    },
    Vertex {
        position: Vec2::new(0.5, 0.5),
        color: Vec3::new(0.0, 0.0, 1.0),
        tex_coord: Vec2::new(1.0, 1.0),
    },
    Vertex {
        position: Vec2::new(-0.5, 0.5),
        color: Vec3::new(0.0, 1.0, 1.0),
        tex_coord: Vec2::new(0.0, 1.0),
    },
];

pub const INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

const CHECKER_SIZE: u32 = 256;
const CHECKER_SQUARES: u32 = 8;

pub struct TexturedQuad {
    start_time: Instant,
    settings: RendererSettings,
    frame_delay: Duration,
}

impl Game for TexturedQuad {
    type Vertex = Vertex;

    fn setup(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            start_time: Instant::now(),
            settings: config.renderer.clone(),
            frame_delay: config.frame_delay(),
        })
    }

    fn renderer_config(&self) -> anyhow::Result<RendererConfig<Vertex>> {
        let settings = &self.settings;

        let texture = match &settings.texture {
            Some(path) => load_image(path)?,
            None => {
                info!("no texture configured, using a generated checkerboard");
                checkerboard(CHECKER_SIZE, CHECKER_SQUARES)
            }
        };

        Ok(RendererConfig {
            uniform_buffer_size: std::mem::size_of::<MVPMatrices>() as u64,
            vertices: VERTICES.to_vec(),
            indices: INDICES.to_vec(),
            texture,
            shaders: ShaderPaths::in_dir(&settings.shaders_dir()),
            clear_color: settings.clear_color,
            prefer_mailbox: settings.prefer_mailbox,
            validation: settings.validation_enabled(),
        })
    }

    fn draw_frame(&mut self, renderer: &mut Renderer) -> anyhow::Result<()> {
        let aspect_ratio = renderer.aspect_ratio();
        let elapsed = Instant::now() - self.start_time;
        let mvp = make_mvp_matrices(elapsed, aspect_ratio, COLUMN_MAJOR);

        renderer.draw_frame(&mvp)
    }

    fn frame_delay(&self) -> Duration {
        self.frame_delay
    }
}

/// `squares` x `squares` alternating light and dark cells
pub fn checkerboard(size: u32, squares: u32) -> DynamicImage {
    let cell = (size / squares.max(1)).max(1);
    let image = RgbaImage::from_fn(size, size, |x, y| {
        if (x / cell + y / cell) % 2 == 0 {
            Rgba([230, 230, 230, 255])
        } else {
            Rgba([40, 40, 40, 255])
        }
    });

    DynamicImage::ImageRgba8(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_draw_two_triangles_over_every_vertex() {
        assert_eq!(INDICES.len(), 6);
        assert!(INDICES.iter().all(|i| (*i as usize) < VERTICES.len()));
        for vertex in 0..VERTICES.len() as u16 {
            assert!(INDICES.contains(&vertex));
        }
    }

    #[test]
    fn quad_spans_half_a_unit() {
        for vertex in VERTICES {
            assert_eq!(vertex.position.abs(), Vec2::splat(0.5));
        }
    }

    #[test]
    fn texture_corners_follow_positions() {
        for vertex in VERTICES {
            assert_eq!(vertex.tex_coord, vertex.position + Vec2::splat(0.5));
        }
    }

    #[test]
    fn checkerboard_alternates() {
        let board = checkerboard(16, 4).to_rgba8();
        assert_eq!(board.dimensions(), (16, 16));

        let first = *board.get_pixel(0, 0);
        assert_eq!(*board.get_pixel(3, 3), first);
        assert_ne!(*board.get_pixel(4, 0), first);
        assert_ne!(*board.get_pixel(0, 4), first);
        assert_eq!(*board.get_pixel(4, 4), first);
    }

    #[test]
    fn renderer_config_uses_the_generated_texture_by_default() {
        let config = Config::default();
        let game = TexturedQuad::setup(&config).unwrap();
        let renderer_config = game.renderer_config().unwrap();

        assert!(renderer_config.validate().is_ok());
        assert_eq!(renderer_config.uniform_buffer_size, 192);
        assert_eq!(renderer_config.texture.width(), CHECKER_SIZE);
        assert!(renderer_config.shaders.vertex.ends_with("quad.vert.spv"));
    }

    #[test]
    fn missing_texture_file_is_an_error() {
        let mut config = Config::default();
        config.renderer.texture = Some("textures/not-a-real-file.png".into());

        let game = TexturedQuad::setup(&config).unwrap();
        assert!(game.renderer_config().is_err());
    }
}
