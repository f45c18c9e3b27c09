//! Filesystem export for signed invoices.

use super::xml::constants::XML_PROLOG;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Export failure. Distinct from signing and composition errors so callers
/// can retry the write without re-signing.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write invoice: {0}")]
    Io(#[from] std::io::Error),
}

/// Write the XML to `path` in one call, returning the byte count written.
/// Prepends the XML declaration when the content lacks one.
pub(crate) fn write_xml(path: &Path, xml: &str) -> Result<u64, ExportError> {
    let content = if xml.starts_with("<?xml") {
        xml.to_string()
    } else {
        format!("{XML_PROLOG}\n{xml}")
    };
    fs::write(path, &content)?;
    Ok(content.len() as u64)
}
