use std::time::Duration;

use crate::app::App;
use crate::config::Config;
use crate::renderer::{Renderer, RendererConfig, VertexDescription};

const DEFAULT_FRAME_DELAY: Duration = Duration::from_millis(15); // about 60 fps

/// parameters passed through to SDL to create a window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowDescription {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

/// This is the only trait from this module to implement directly.
pub trait Game {
    type Vertex: VertexDescription;

    fn setup(config: &Config) -> anyhow::Result<Self>
    where
        Self: Sized;

    /// geometry, texture and shaders handed to the renderer once at startup
    fn renderer_config(&self) -> anyhow::Result<RendererConfig<Self::Vertex>>;

    fn draw_frame(&mut self, renderer: &mut Renderer) -> anyhow::Result<()>;

    fn window_title(config: &Config) -> String
    where
        Self: Sized,
    {
        config.window.title.clone()
    }

    fn window_size(config: &Config) -> (u32, u32)
    where
        Self: Sized,
    {
        (config.window.width, config.window.height)
    }

    fn window_description(config: &Config) -> WindowDescription
    where
        Self: Sized,
    {
        let title = Self::window_title(config);
        let (width, height) = Self::window_size(config);

        WindowDescription {
            title,
            width,
            height,
        }
    }

    /// sleep between frames
    fn frame_delay(&self) -> Duration {
        DEFAULT_FRAME_DELAY
    }

    fn run() -> anyhow::Result<()>
    where
        Self: Sized + 'static,
    {
        pretty_env_logger::init();

        let config = Config::load_default_location()?;

        let sdl = sdl3::init()?;
        let video_subsystem = sdl.video()?;
        let window_desc = Self::window_description(&config);
        let window = video_subsystem
            .window(&window_desc.title, window_desc.width, window_desc.height)
            .position_centered()
            .resizable()
            .vulkan()
            .build()?;

        let game = Self::setup(&config)?;
        let renderer_config = game.renderer_config()?;
        let renderer = Renderer::init(window, renderer_config)?;
        let app = App::init(game, renderer, &config);

        let event_pump = sdl.event_pump()?;
        app.run_loop(event_pump)
    }
}
