use std::path::{Path, PathBuf};

use lopdf::Document;
use tracing::{info, instrument};

use crate::error::StampError;
use crate::storage::{delete_file_if_exists, ScratchDir};

use super::{Datestamp, StampSpec};

/// Number of pages in the PDF at `path`.
pub fn page_count(path: &Path) -> Result<usize, StampError> {
    let doc = Document::load(path).map_err(|e| {
        StampError::Generation(format!("failed to read '{}': {}", path.display(), e))
    })?;
    Ok(doc.get_pages().len())
}

fn file_size(path: &Path) -> Result<u64, StampError> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| StampError::Io {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Checks that `output` is a real mutation of `source`: strictly larger on
/// disk with the same page count. `output` is deleted when it is not.
fn verify(
    source: &Path,
    original_size: u64,
    original_pages: usize,
    output: &Path,
) -> Result<(), StampError> {
    let checked = check_output(source, original_size, original_pages, output);
    if checked.is_err() {
        delete_file_if_exists(output);
    }
    checked
}

fn check_output(
    source: &Path,
    original_size: u64,
    original_pages: usize,
    output: &Path,
) -> Result<(), StampError> {
    let stamped_size = file_size(output)?;
    if stamped_size <= original_size {
        return Err(StampError::Verification {
            path: source.to_path_buf(),
            original_size,
            stamped_size,
        });
    }

    let stamped_pages = page_count(output)?;
    if stamped_pages != original_pages {
        return Err(StampError::PageCountChanged {
            path: source.to_path_buf(),
            expected: original_pages,
            actual: stamped_pages,
        });
    }

    info!(
        output = %output.display(),
        original_size,
        stamped_size,
        pages = stamped_pages,
        "Stamped document verified"
    );
    Ok(())
}

/// Stamps documents and checks that the result actually changed.
#[derive(Debug, Clone)]
pub struct PdfStamper {
    scratch: ScratchDir,
}

impl PdfStamper {
    pub fn new(scratch: ScratchDir) -> Self {
        Self { scratch }
    }

    pub fn scratch(&self) -> &ScratchDir {
        &self.scratch
    }

    /// Applies `spec` to `source` and returns the stamped file. The source is
    /// deleted once the stamped file has been verified; on any failure it is
    /// left in place and no output survives.
    ///
    /// The stamped file must be strictly larger than the source and keep the
    /// same number of pages.
    #[instrument(skip(self, spec), fields(source = %source.display(), text = %spec.text))]
    pub fn stamp(&self, source: &Path, spec: &StampSpec) -> Result<PathBuf, StampError> {
        if spec.text.trim().is_empty() {
            return Err(StampError::EmptyText);
        }

        let original_size = file_size(source)?;
        let original_pages = page_count(source)?;

        let output = Datestamp::new(source, &self.scratch).run(spec)?;
        verify(source, original_size, original_pages, &output)?;

        delete_file_if_exists(source);
        Ok(output)
    }

    /// Applies several stamps in order, feeding each output into the next.
    pub fn stamp_all(&self, source: &Path, specs: &[StampSpec]) -> Result<PathBuf, StampError> {
        let mut current = source.to_path_buf();
        for spec in specs {
            current = self.stamp(&current, spec)?;
        }
        Ok(current)
    }
}
