use ash_sdl_textured_quad::{Game, TexturedQuad};

fn main() -> Result<(), anyhow::Error> {
    TexturedQuad::run()
}
