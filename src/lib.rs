pub mod app;
pub mod config;
pub mod game;
pub mod renderer;
pub mod util;

#[cfg(debug_assertions)]
mod shader_watcher;

pub use game::*;
