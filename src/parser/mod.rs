pub mod pdf_reader;
pub mod span_source;
pub mod text_extractor;

pub use pdf_reader::PdfReader;
pub use span_source::{BlockContext, PageSpanSource, PdfTextLayer, SpanFile};
pub use text_extractor::extract_page_text;
