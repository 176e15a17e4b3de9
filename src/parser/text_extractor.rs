use std::ffi::OsStr;
use std::path::Path;

use tracing::warn;

use crate::parser::pdf_reader::run_tool;

/// Plain text of one 1-based page. A failing extraction gives an empty
/// string so the page simply scores nothing.
pub fn extract_page_text(pdf_path: &Path, page: u32) -> String {
    let page_arg = page.to_string();
    let args = [
        OsStr::new("-f"),
        OsStr::new(&page_arg),
        OsStr::new("-l"),
        OsStr::new(&page_arg),
        pdf_path.as_os_str(),
        OsStr::new("-"),
    ];
    match run_tool("pdftotext", args) {
        Ok(text) => text,
        Err(err) => {
            warn!(page, "text extraction failed: {err}");
            String::new()
        }
    }
}
