mod mvp;
mod textured_quad;
mod traits;
mod vertex;

pub use mvp::{COLUMN_MAJOR, MVPMatrices, make_mvp_matrices};
pub use textured_quad::{INDICES, TexturedQuad, VERTICES, checkerboard};
pub use traits::*;
pub use vertex::Vertex;
