pub mod json_export;
pub mod markdown_export;

use anyhow::Result;

pub use json_export::{read_json, write_atomic, JsonExporter};
pub use markdown_export::MarkdownExporter;

pub trait Exporter<T: ?Sized> {
    fn export(&self, value: &T) -> Result<()>;
}
