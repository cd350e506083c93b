//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! Claim documents carry personal data; span fields only ever see file names,
//! truncated identifiers and response bodies with long runs of digits masked.

use std::path::Path;

/// Longest response body excerpt kept in logs and error records.
const MAX_BODY_EXCERPT: usize = 500;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Masks every run of 5 or more digits (file numbers, SSNs, postal codes).
pub fn mask_digits(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = String::new();

    let flush = |run: &mut String, out: &mut String| {
        if run.len() >= 5 {
            out.push_str(&"*".repeat(run.len()));
        } else {
            out.push_str(run);
        }
        run.clear();
    };

    for c in text.chars() {
        if c.is_ascii_digit() {
            run.push(c);
        } else {
            flush(&mut run, &mut out);
            out.push(c);
        }
    }
    flush(&mut run, &mut out);
    out
}

/// A log-safe excerpt of a remote response body.
pub fn body_excerpt(body: &str) -> String {
    let masked = mask_digits(body.trim());
    if masked.chars().count() <= MAX_BODY_EXCERPT {
        return masked;
    }
    let mut excerpt: String = masked.chars().take(MAX_BODY_EXCERPT).collect();
    excerpt.push_str("...");
    excerpt
}
