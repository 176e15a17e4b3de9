use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::core::error::SourceError;

#[derive(Debug, Clone)]
pub struct PdfReader {
    path: PathBuf,
}

impl PdfReader {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_count(&self) -> Result<u32, SourceError> {
        get_page_count(&self.path)
    }
}

fn get_page_count(pdf_path: &Path) -> Result<u32, SourceError> {
    let stdout = run_tool("pdfinfo", [pdf_path.as_os_str()])?;
    parse_page_count(&stdout).ok_or_else(|| SourceError::Tool {
        tool: "pdfinfo",
        message: format!(
            "output did not contain a 'Pages:' line for {}",
            pdf_path.display()
        ),
    })
}

fn parse_page_count(stdout: &str) -> Option<u32> {
    stdout
        .lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|rest| rest.trim().parse().ok())
}

/// Runs a poppler command line tool and returns its stdout.
pub(crate) fn run_tool<I, S>(tool: &'static str, args: I) -> Result<String, SourceError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = Command::new(tool).args(args).output().map_err(|err| SourceError::Tool {
        tool,
        message: format!("failed to invoke ({err}); is poppler-utils installed?"),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SourceError::Tool {
            tool,
            message: format!("exited with {}: {}", output.status, stderr.trim()),
        });
    }

    debug!(tool, bytes = output.stdout.len(), "tool finished");
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
