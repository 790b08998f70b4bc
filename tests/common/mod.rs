pub mod backends;
pub mod canvases;

pub use backends::*;
pub use canvases::*;
