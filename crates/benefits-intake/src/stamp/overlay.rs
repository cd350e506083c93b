use std::path::Path;

use lopdf::{dictionary, Document, Object, Stream};

use crate::error::StampError;

/// Resource name of the overlay font. Uncommon enough that merging rarely
/// has to rename it.
pub const OVERLAY_FONT_KEY: &str = "IntakeStampF1";

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayLine {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub size: f32,
}

/// One overlay page. A page without lines stays blank.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayPage {
    pub lines: Vec<OverlayLine>,
}

impl OverlayPage {
    pub fn blank() -> Self {
        Self::default()
    }

    pub fn with_line(mut self, text: impl Into<String>, x: f32, y: f32, size: f32) -> Self {
        self.lines.push(OverlayLine {
            text: text.into(),
            x,
            y,
            size,
        });
        self
    }

    pub fn is_blank(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Lays out `page_count` pages, all blank except `marked_index`.
pub fn targeted_pages(
    page_count: usize,
    marked_index: usize,
    marked: OverlayPage,
) -> Result<Vec<OverlayPage>, StampError> {
    if marked_index >= page_count {
        return Err(StampError::Generation(format!(
            "page index {} is outside a {}-page document",
            marked_index, page_count
        )));
    }

    let mut pages = vec![OverlayPage::blank(); page_count];
    pages[marked_index] = marked;
    Ok(pages)
}

/// Builds the overlay document in memory.
pub fn build_overlay(pages: &[OverlayPage]) -> Result<Document, StampError> {
    if pages.is_empty() {
        return Err(StampError::Generation(
            "overlay must contain at least one page".to_string(),
        ));
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            OVERLAY_FONT_KEY => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for page in pages {
        let content = format_page_content(page);
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages.len() as i64,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    Ok(doc)
}

/// Builds the overlay and writes it to `path`.
pub fn write_overlay(path: &Path, pages: &[OverlayPage]) -> Result<(), StampError> {
    let mut doc = build_overlay(pages)?;
    doc.save(path)
        .map_err(|e| StampError::Generation(format!("failed to write overlay: {}", e)))?;
    Ok(())
}

fn format_page_content(page: &OverlayPage) -> String {
    let mut content = String::new();
    for line in &page.lines {
        content.push_str("BT\n");
        content.push_str(&format!("/{} {} Tf\n", OVERLAY_FONT_KEY, line.size));
        content.push_str(&format!("{} {} Td\n", line.x, line.y));
        content.push_str(&format!("({}) Tj\n", escape_pdf_string(&line.text)));
        content.push_str("ET\n");
    }
    content
}

fn escape_pdf_string(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '(' => "\\(".to_string(),
            ')' => "\\)".to_string(),
            '\\' => "\\\\".to_string(),
            c if c.is_ascii() && !c.is_control() => c.to_string(),
            _ => " ".to_string(),
        })
        .collect()
}
