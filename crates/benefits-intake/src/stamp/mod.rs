//! PDF stamping: text overlays generated with lopdf and merged onto an
//! existing document, either on every page or on one targeted page.

pub mod datestamp;
pub mod merge;
pub mod overlay;
pub mod stamper;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use datestamp::Datestamp;
pub use merge::{merge_overlay, MergeMode};
pub use stamper::{page_count, PdfStamper};

/// Default font size when a stamp does not set one.
pub const DEFAULT_FONT_SIZE: f32 = 10.0;

/// Vertical offset of the secondary timestamp line under a page-targeted mark.
pub const TIMESTAMP_LINE_OFFSET: f32 = 12.0;

/// Timestamp suffix appended to whole-document stamps.
pub const STAMP_TIME_FORMAT: &str = "%Y-%m-%d. %I:%M %p %Z";

/// Secondary line drawn beneath a page-targeted mark.
pub const PAGE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %I:%M %p %Z";

/// Places a stamp on exactly one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageTarget {
    /// Zero-based page index.
    pub index: usize,
    /// PDF whose page count sizes the overlay. Defaults to the stamped
    /// document itself.
    #[serde(default)]
    pub template: Option<PathBuf>,
}

/// One text overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StampSpec {
    pub text: String,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub size: Option<f32>,
    /// Skip the timestamp suffix.
    #[serde(default)]
    pub text_only: bool,
    /// Fixed stamp time; `None` means "now".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub page: Option<PageTarget>,
    #[serde(default)]
    pub multistamp: bool,
}

impl StampSpec {
    pub fn new(text: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            size: None,
            text_only: false,
            timestamp: None,
            page: None,
            multistamp: false,
        }
    }

    pub fn text_only(mut self) -> Self {
        self.text_only = true;
        self
    }

    pub fn size(mut self, size: f32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn on_page(mut self, index: usize) -> Self {
        self.page = Some(PageTarget {
            index,
            template: None,
        });
        self.multistamp = true;
        self
    }

    pub fn with_template(mut self, template: impl Into<PathBuf>) -> Self {
        let index = self.page.as_ref().map(|p| p.index).unwrap_or(0);
        self.page = Some(PageTarget {
            index,
            template: Some(template.into()),
        });
        self.multistamp = true;
        self
    }

    pub fn multistamp(mut self) -> Self {
        self.multistamp = true;
        self
    }

    pub fn font_size(&self) -> f32 {
        self.size.unwrap_or(DEFAULT_FONT_SIZE)
    }

    pub fn merge_mode(&self) -> MergeMode {
        if self.multistamp || self.page.is_some() {
            MergeMode::Multistamp
        } else {
            MergeMode::Stamp
        }
    }
}
