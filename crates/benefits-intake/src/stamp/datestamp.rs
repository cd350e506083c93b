use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use crate::error::StampError;
use crate::storage::{delete_file_if_exists, ScratchDir, ScratchFile};

use super::merge::merge_overlay;
use super::overlay::{targeted_pages, write_overlay, OverlayPage};
use super::stamper::page_count;
use super::{StampSpec, PAGE_TIMESTAMP_FORMAT, STAMP_TIME_FORMAT, TIMESTAMP_LINE_OFFSET};

/// Applies one stamp to a PDF and hands back the stamped copy.
///
/// The returned path points at a fresh file in the scratch directory. The
/// input is never touched; the caller decides when it can go. On failure no
/// output survives. The overlay is always removed.
pub struct Datestamp<'a> {
    file_path: PathBuf,
    scratch: &'a ScratchDir,
    append_to_stamp: Option<String>,
}

impl<'a> Datestamp<'a> {
    pub fn new(file_path: impl Into<PathBuf>, scratch: &'a ScratchDir) -> Self {
        Self {
            file_path: file_path.into(),
            scratch,
            append_to_stamp: None,
        }
    }

    /// Extra text placed after the timestamp in whole-document mode.
    pub fn append_to_stamp(mut self, text: impl Into<String>) -> Self {
        self.append_to_stamp = Some(text.into());
        self
    }

    pub fn run(&self, spec: &StampSpec) -> Result<PathBuf, StampError> {
        if spec.text.trim().is_empty() {
            return Err(StampError::EmptyText);
        }

        let overlay = ScratchFile::new(self.scratch.random_file_path("pdf"));
        if let Err(e) = self.generate(spec, overlay.path()) {
            error!(file = %self.file_path.display(), "Failed to generate datestamp file: {}", e);
            return Err(e);
        }

        let output = self.scratch.random_file_path("pdf");
        match merge_overlay(&self.file_path, overlay.path(), &output, spec.merge_mode()) {
            Ok(()) => {
                debug!(
                    source = %self.file_path.display(),
                    output = %output.display(),
                    "Stamp applied"
                );
                Ok(output)
            }
            Err(e) => {
                delete_file_if_exists(&output);
                Err(e)
            }
        }
    }

    fn generate(&self, spec: &StampSpec, overlay_path: &Path) -> Result<(), StampError> {
        let size = spec.font_size();
        let stamped_at = spec.timestamp.unwrap_or_else(Utc::now);

        let pages = match &spec.page {
            None => {
                let text = self.compose_text(spec, stamped_at);
                vec![OverlayPage::blank().with_line(text, spec.x, spec.y, size)]
            }
            Some(target) => {
                let count = page_count(&self.file_path)?;
                if let Some(template) = target.template.as_deref() {
                    let template_pages = page_count(template)?;
                    if template_pages != count {
                        return Err(StampError::Generation(format!(
                            "template '{}' has {} pages but the document has {}",
                            template.display(),
                            template_pages,
                            count
                        )));
                    }
                }

                let mut marked = OverlayPage::blank().with_line(&spec.text, spec.x, spec.y, size);
                if let Some(timestamp) = spec.timestamp {
                    marked = marked.with_line(
                        timestamp.format(PAGE_TIMESTAMP_FORMAT).to_string(),
                        spec.x,
                        spec.y - TIMESTAMP_LINE_OFFSET,
                        size,
                    );
                }
                targeted_pages(count, target.index, marked)?
            }
        };

        write_overlay(overlay_path, &pages)
    }

    fn compose_text(&self, spec: &StampSpec, stamped_at: DateTime<Utc>) -> String {
        if spec.text_only {
            return spec.text.clone();
        }
        let mut text = format!("{} {}", spec.text, stamped_at.format(STAMP_TIME_FORMAT));
        if let Some(append) = &self.append_to_stamp {
            text.push_str(". ");
            text.push_str(append);
        }
        text
    }
}
