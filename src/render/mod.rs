pub mod renderer;

pub use renderer::{PageImageStore, PageRenderer, RenderedPage};
