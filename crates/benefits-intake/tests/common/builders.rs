//! Builders for claims and sample documents.

#![allow(dead_code)]

use std::path::Path;

use lopdf::{dictionary, Document, Object, Stream};
use serde_json::{json, Value};

use benefits_intake::claim::Claim;

/// Builder for `Claim` instances with a valid pension form by default.
pub struct ClaimBuilder {
    id: String,
    form_id: String,
    claim_type: String,
    business_line: String,
    first_name: String,
    last_name: String,
    file_number: Option<String>,
    ssn: Option<String>,
    country: String,
    postal_code: String,
}

impl ClaimBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            form_id: "21P-527EZ".to_string(),
            claim_type: "SavedClaim::Pension".to_string(),
            business_line: "PMC".to_string(),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            file_number: Some("796043735".to_string()),
            ssn: None,
            country: "USA".to_string(),
            postal_code: "12345".to_string(),
        }
    }

    pub fn form_id(mut self, form_id: &str) -> Self {
        self.form_id = form_id.to_string();
        self
    }

    pub fn names(mut self, first: &str, last: &str) -> Self {
        self.first_name = first.to_string();
        self.last_name = last.to_string();
        self
    }

    /// Drops the file number and identifies the veteran by SSN instead.
    pub fn ssn_only(mut self, ssn: &str) -> Self {
        self.file_number = None;
        self.ssn = Some(ssn.to_string());
        self
    }

    pub fn address(mut self, country: &str, postal_code: &str) -> Self {
        self.country = country.to_string();
        self.postal_code = postal_code.to_string();
        self
    }

    pub fn build(self) -> Claim {
        let mut form = json!({
            "veteranFullName": { "first": self.first_name, "last": self.last_name },
            "veteranAddress": { "country": self.country, "postalCode": self.postal_code }
        });
        if let Some(file_number) = self.file_number {
            form["vaFileNumber"] = Value::String(file_number);
        }
        if let Some(ssn) = self.ssn {
            form["veteranSocialSecurityNumber"] = Value::String(ssn);
        }

        Claim {
            guid: format!("guid-{}", self.id),
            id: self.id,
            form_id: self.form_id,
            claim_type: self.claim_type,
            business_line: self.business_line,
            form,
            attachments: vec![],
            submitted_claim_id: None,
        }
    }
}

/// Writes a letter-sized PDF with one line of text per page.
pub fn write_pdf(path: &Path, pages: usize) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for n in 0..pages {
        let content = format!("BT /F1 12 Tf 72 700 Td (Claim page {}) Tj ET", n + 1);
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
            "Count" => pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).expect("Failed to write sample PDF");
}

/// Content streams of every page, concatenated and lossily decoded.
pub fn document_text(path: &Path) -> String {
    let doc = Document::load(path).expect("Failed to load PDF");
    doc.get_pages()
        .values()
        .map(|&page_id| {
            String::from_utf8_lossy(&doc.get_page_content(page_id).unwrap_or_default()).to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}
