use std::time::Duration;

use log::*;
use sdl3::EventPump;
use sdl3::event::{Event, WindowEvent};
use sdl3::keyboard::Keycode;
use sdl3::sys::timer::SDL_DelayPrecise;

use crate::config::Config;
use crate::game::Game;
use crate::renderer::Renderer;

#[cfg(debug_assertions)]
use crate::shader_watcher::{self, ShaderChanges};

/// The window events the app loop reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSignal {
    Quit,
    Resized,
    Minimized,
    Restored,
}

impl WindowSignal {
    pub fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::Quit { .. }
            | Event::KeyDown {
                keycode: Some(Keycode::Escape),
                ..
            } => Some(Self::Quit),

            Event::Window { win_event, .. } => match win_event {
                WindowEvent::CloseRequested => Some(Self::Quit),
                WindowEvent::Resized(..) | WindowEvent::PixelSizeChanged(..) => {
                    Some(Self::Resized)
                }
                WindowEvent::Minimized => Some(Self::Minimized),
                WindowEvent::Restored => Some(Self::Restored),
                _ => None,
            },

            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppState {
    pub quit: bool,
    pub minimized: bool,
    /// a resize the renderer hasn't been told about yet
    pub resized: bool,
}

impl AppState {
    pub fn apply(&mut self, signal: WindowSignal) {
        match signal {
            WindowSignal::Quit => self.quit = true,
            WindowSignal::Resized => self.resized = true,
            WindowSignal::Minimized => self.minimized = true,
            WindowSignal::Restored => {
                self.minimized = false;
                self.resized = true;
            }
        }
    }

    /// returns whether a resize was pending, and clears it
    pub fn take_resize(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }
}

pub struct App<G: Game> {
    game: G,
    renderer: Renderer,
    state: AppState,
    frame_delay: Duration,
    #[cfg(debug_assertions)]
    shader_changes: Option<ShaderChanges>,
}

impl<G: Game> App<G> {
    // config only feeds the shader watcher, which release builds leave out
    #[cfg_attr(not(debug_assertions), expect(unused_variables))]
    pub fn init(game: G, renderer: Renderer, config: &Config) -> Self {
        #[cfg(debug_assertions)]
        let shader_changes = match shader_watcher::watch(&config.renderer.shaders_dir()) {
            Ok(changes) => Some(changes),
            Err(err) => {
                warn!("shader hot reload disabled: {err}");
                None
            }
        };

        let frame_delay = game.frame_delay();

        Self {
            game,
            renderer,
            state: AppState::default(),
            frame_delay,
            #[cfg(debug_assertions)]
            shader_changes,
        }
    }

    pub fn run_loop(mut self, mut event_pump: EventPump) -> anyhow::Result<()> {
        let result = self.run_frames(&mut event_pump);

        // every submitted frame must finish before the renderer is dropped
        let drained = self.renderer.drain_gpu();
        result?;
        drained?;

        info!("exiting");

        Ok(())
    }

    fn run_frames(&mut self, event_pump: &mut EventPump) -> anyhow::Result<()> {
        loop {
            for event in event_pump.poll_iter() {
                self.handle_event(&event);
            }
            if self.state.quit {
                return Ok(());
            }

            if self.state.minimized {
                // nothing to draw into; sleep until the window comes back
                let event = event_pump.wait_event();
                self.handle_event(&event);
                continue;
            }

            if self.state.take_resize() {
                self.renderer.on_resize();
            }

            #[cfg(debug_assertions)]
            self.reload_changed_shaders();

            self.game.draw_frame(&mut self.renderer)?;

            unsafe { SDL_DelayPrecise(self.frame_delay.as_nanos() as u64) };
        }
    }

    fn handle_event(&mut self, event: &Event) {
        if let Some(signal) = WindowSignal::from_event(event) {
            trace!("window signal: {signal:?}");
            self.state.apply(signal);
        }
    }

    #[cfg(debug_assertions)]
    fn reload_changed_shaders(&mut self) {
        let Some(shader_changes) = &mut self.shader_changes else {
            return;
        };

        let changed = match shader_changes.spv_changed() {
            Ok(changed) => changed,
            Err(err) => {
                error!("shader watcher failed: {err}");
                return;
            }
        };

        if changed {
            if let Err(err) = self.renderer.reload_shaders() {
                error!("failed to reload shaders: {err:#}");
            }
        }
    }
}
