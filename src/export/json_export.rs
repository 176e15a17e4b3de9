use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::export::Exporter;

/// Pretty JSON written through a temporary file and renamed into place, so
/// readers never see a half-written artifact.
#[derive(Debug, Clone)]
pub struct JsonExporter {
    out_dir: PathBuf,
    file_name: String,
}

impl JsonExporter {
    pub fn new(out_dir: PathBuf, file_name: impl Into<String>) -> Self {
        Self {
            out_dir,
            file_name: file_name.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.out_dir.join(&self.file_name)
    }
}

impl<T: Serialize + ?Sized> Exporter<T> for JsonExporter {
    fn export(&self, value: &T) -> Result<()> {
        fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("failed to create {}", self.out_dir.display()))?;
        let data = serde_json::to_string_pretty(value)?;
        write_atomic(&self.path(), data.as_bytes())
    }
}

pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, data).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to move {} into place", path.display()))?;
    debug!(path = %path.display(), bytes = data.len(), "wrote artifact");
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))
}
