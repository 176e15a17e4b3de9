use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::error::SourceError;
use crate::core::geometry::BBox;
use crate::core::model::{PageSpans, TextSpan};
use crate::parser::pdf_reader::{run_tool, PdfReader};

/// Where page text spans come from. Pages are numbered from 1.
pub trait PageSpanSource: Sync {
    fn page_numbers(&self) -> Vec<u32>;

    /// An empty page yields `PageSpans` without spans; a page the source
    /// does not have is `PageNotFound`.
    fn page_spans(&self, page: u32) -> Result<PageSpans, SourceError>;
}

/// Span dump serialized as JSON, one entry per page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpanFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub pages: Vec<PageSpans>,
}

impl SpanFile {
    pub fn new(pages: Vec<PageSpans>) -> Self {
        Self {
            source: None,
            pages,
        }
    }

    pub fn load(path: &Path) -> Result<Self, SourceError> {
        let data = fs::read_to_string(path)?;
        let file: SpanFile = serde_json::from_str(&data)?;
        info!(path = %path.display(), pages = file.pages.len(), "loaded span file");
        Ok(file)
    }
}

impl PageSpanSource for SpanFile {
    fn page_numbers(&self) -> Vec<u32> {
        let mut pages: Vec<u32> = self.pages.iter().map(|p| p.page).collect();
        pages.sort_unstable();
        pages.dedup();
        pages
    }

    fn page_spans(&self, page: u32) -> Result<PageSpans, SourceError> {
        self.pages
            .iter()
            .find(|p| p.page == page)
            .cloned()
            .ok_or(SourceError::PageNotFound(page))
    }
}

/// Word-level text layer read through `pdftotext -bbox`.
#[derive(Debug, Clone)]
pub struct PdfTextLayer {
    path: PathBuf,
    page_count: u32,
    page_re: Regex,
    word_re: Regex,
}

impl PdfTextLayer {
    pub fn open(reader: &PdfReader) -> Result<Self, SourceError> {
        let page_count = reader.page_count()?;
        Self::with_page_count(reader.path().to_path_buf(), page_count)
    }

    pub(crate) fn with_page_count(path: PathBuf, page_count: u32) -> Result<Self, SourceError> {
        let page_re = Regex::new(r#"<page width="([-\d.]+)" height="([-\d.]+)">"#)
            .map_err(|err| tool_error(err.to_string()))?;
        let word_re = Regex::new(
            r#"<word xMin="([-\d.]+)" yMin="([-\d.]+)" xMax="([-\d.]+)" yMax="([-\d.]+)">(.*?)</word>"#,
        )
        .map_err(|err| tool_error(err.to_string()))?;
        Ok(Self {
            path,
            page_count,
            page_re,
            word_re,
        })
    }

    fn parse_bbox_html(&self, page: u32, html: &str) -> PageSpans {
        let mut result = PageSpans::new(page, Vec::new());
        if let Some(caps) = self.page_re.captures(html) {
            if let (Ok(w), Ok(h)) = (caps[1].parse::<f32>(), caps[2].parse::<f32>()) {
                result = result.with_size(w, h);
            }
        }

        let words: Vec<TextSpan> = self
            .word_re
            .captures_iter(html)
            .filter_map(|caps| {
                let coord = |i: usize| caps[i].parse::<f32>().ok();
                let bbox = BBox::new(coord(1)?, coord(2)?, coord(3)?, coord(4)?);
                let text = html_escape::decode_html_entities(&caps[5]).into_owned();
                Some(TextSpan::new(text, bbox, bbox.height()))
            })
            .collect();

        result.spans = group_words(words);
        debug!(page, spans = result.spans.len(), "parsed text layer");
        result
    }
}

fn tool_error(message: String) -> SourceError {
    SourceError::Tool {
        tool: "pdftotext",
        message,
    }
}

impl PageSpanSource for PdfTextLayer {
    fn page_numbers(&self) -> Vec<u32> {
        (1..=self.page_count).collect()
    }

    fn page_spans(&self, page: u32) -> Result<PageSpans, SourceError> {
        if page == 0 || page > self.page_count {
            return Err(SourceError::PageNotFound(page));
        }
        let page_arg = page.to_string();
        let args = [
            OsStr::new("-bbox"),
            OsStr::new("-f"),
            OsStr::new(&page_arg),
            OsStr::new("-l"),
            OsStr::new(&page_arg),
            self.path.as_os_str(),
            OsStr::new("-"),
        ];
        let html = run_tool("pdftotext", args)?;
        Ok(self.parse_bbox_html(page, &html))
    }
}

/// Joins consecutive words sitting on one baseline into a single span
/// when the horizontal gap is under 0.6 times the word height.
pub fn group_words(words: Vec<TextSpan>) -> Vec<TextSpan> {
    let mut spans: Vec<TextSpan> = Vec::new();
    for word in words {
        if let Some(last) = spans.last_mut() {
            let height = last.bbox.height().max(word.bbox.height());
            let same_line = (last.bbox.y1 - word.bbox.y1).abs() <= height * 0.25;
            let gap = word.bbox.x0 - last.bbox.x1;
            if same_line && gap >= 0.0 && gap < height * 0.6 {
                last.text.push(' ');
                last.text.push_str(&word.text);
                last.bbox = last.bbox.union(&word.bbox);
                last.font_size = last.font_size.max(word.font_size);
                continue;
            }
        }
        spans.push(word);
    }
    spans
}

/// Wraps a source and fills in per-page block letters supplied from the
/// outside. Explicit entries win over what the source reports; the
/// default only applies to pages left without a block.
pub struct BlockContext<'a> {
    inner: &'a dyn PageSpanSource,
    blocks: BTreeMap<u32, String>,
    default_block: Option<String>,
}

impl<'a> BlockContext<'a> {
    pub fn new(inner: &'a dyn PageSpanSource, blocks: BTreeMap<u32, String>) -> Self {
        Self {
            inner,
            blocks,
            default_block: None,
        }
    }

    pub fn with_default(mut self, block: Option<String>) -> Self {
        self.default_block = block;
        self
    }
}

impl PageSpanSource for BlockContext<'_> {
    fn page_numbers(&self) -> Vec<u32> {
        self.inner.page_numbers()
    }

    fn page_spans(&self, page: u32) -> Result<PageSpans, SourceError> {
        let mut spans = self.inner.page_spans(page)?;
        if let Some(block) = self.blocks.get(&page) {
            spans.block = Some(block.clone());
        } else if spans.block.is_none() {
            spans.block = self.default_block.clone();
        }
        Ok(spans)
    }
}
