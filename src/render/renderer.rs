use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::geometry::ScaleFactor;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderedPage {
    pub page: u32,
    pub path: PathBuf,
    pub scale: ScaleFactor,
}

#[derive(Debug, Clone)]
pub struct PageRenderer {
    out_dir: PathBuf,
    dpi: u32,
}

impl PageRenderer {
    pub fn new(out_dir: PathBuf, dpi: u32) -> Self {
        Self { out_dir, dpi }
    }

    pub fn scale(&self) -> ScaleFactor {
        ScaleFactor::from_dpi(self.dpi)
    }

    pub fn image_path(&self, page: u32) -> PathBuf {
        self.out_dir.join(format!("page_{page:03}.png"))
    }

    /// Renders one 1-based page to `page_NNN.png`.
    pub fn render_page(&self, pdf_path: &Path, page: u32) -> Result<RenderedPage> {
        fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("failed to create {}", self.out_dir.display()))?;

        let image_path = self.image_path(page);
        let prefix = image_path.with_extension("");

        let status = Command::new("pdftoppm")
            .arg("-png")
            .arg("-singlefile")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-f")
            .arg(page.to_string())
            .arg("-l")
            .arg(page.to_string())
            .arg(pdf_path)
            .arg(&prefix)
            .status()
            .with_context(|| "failed to invoke pdftoppm; is poppler-utils installed?")?;

        if !status.success() {
            anyhow::bail!("pdftoppm failed on page {page} with status: {status}");
        }

        if !image_path.exists() {
            anyhow::bail!(
                "expected rendered image not found: {}",
                image_path.display()
            );
        }

        Ok(RenderedPage {
            page,
            path: image_path,
            scale: self.scale(),
        })
    }
}

/// Page number to rendered image path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageImageStore {
    images: BTreeMap<u32, PathBuf>,
}

impl PageImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, rendered: RenderedPage) {
        self.images.insert(rendered.page, rendered.path);
    }

    pub fn get(&self, page: u32) -> Option<&Path> {
        self.images.get(&page).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Renders every listed page, keeping going past failures. Returns the
    /// number of pages that failed.
    pub fn render_all(&mut self, renderer: &PageRenderer, pdf_path: &Path, pages: &[u32]) -> usize {
        let mut failed = 0;
        for &page in pages {
            match renderer.render_page(pdf_path, page) {
                Ok(rendered) => self.insert(rendered),
                Err(err) => {
                    warn!(page, "render failed: {err:#}");
                    failed += 1;
                }
            }
        }
        info!(rendered = self.len(), failed, "page images");
        failed
    }

    pub fn into_map(self) -> BTreeMap<u32, PathBuf> {
        self.images
    }
}
