use std::collections::HashMap;
use std::path::Path;

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::error::StampError;

/// Depth limit when walking `/Parent` links for inherited resources.
const MAX_PAGE_TREE_DEPTH: usize = 64;

/// How overlay pages map onto the source pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// The first overlay page lands on every source page.
    Stamp,
    /// Overlay page `i` lands on source page `i`. When the overlay is shorter
    /// its last page is repeated.
    Multistamp,
}

/// Merges `overlay` on top of `source` and writes the result to `output`.
/// Neither input file is modified.
pub fn merge_overlay(
    source: &Path,
    overlay: &Path,
    output: &Path,
    mode: MergeMode,
) -> Result<(), StampError> {
    let merge_err = |reason: String| StampError::Merge {
        path: source.to_path_buf(),
        reason,
    };

    let mut doc = Document::load(source).map_err(|e| merge_err(format!("load source: {}", e)))?;
    let overlay_doc =
        Document::load(overlay).map_err(|e| merge_err(format!("load overlay: {}", e)))?;

    let overlay_pages: Vec<ObjectId> = overlay_doc.get_pages().into_values().collect();
    let Some(last_overlay) = overlay_pages.last().copied() else {
        return Err(merge_err("overlay has no pages".to_string()));
    };

    let targets: Vec<ObjectId> = doc.get_pages().into_values().collect();
    let mut imported: HashMap<ObjectId, ObjectId> = HashMap::new();

    for (i, page_id) in targets.iter().enumerate() {
        let overlay_page = match mode {
            MergeMode::Stamp => overlay_pages[0],
            MergeMode::Multistamp => overlay_pages.get(i).copied().unwrap_or(last_overlay),
        };

        let layer = extract_layer(&overlay_doc, overlay_page)
            .map_err(|e| merge_err(format!("read overlay page {}: {}", i + 1, e)))?;
        if layer.is_blank() {
            continue;
        }

        apply_layer(&mut doc, *page_id, &layer, &overlay_doc, &mut imported)
            .map_err(|e| merge_err(format!("stamp page {}: {}", i + 1, e)))?;
    }

    doc.save(output)
        .map_err(|e| merge_err(format!("write output: {}", e)))?;
    Ok(())
}

/// The drawable part of one overlay page.
struct Layer {
    content: Vec<u8>,
    fonts: Dictionary,
}

impl Layer {
    fn is_blank(&self) -> bool {
        self.content.iter().all(|b| b.is_ascii_whitespace())
    }
}

fn extract_layer(doc: &Document, page_id: ObjectId) -> Result<Layer, lopdf::Error> {
    let content = doc.get_page_content(page_id)?;
    let resources = effective_resources(doc, page_id)?;
    let fonts = match resources.get(b"Font") {
        Ok(obj) => resolve_dict(doc, obj)?.clone(),
        Err(_) => Dictionary::new(),
    };
    Ok(Layer { content, fonts })
}

fn apply_layer(
    doc: &mut Document,
    page_id: ObjectId,
    layer: &Layer,
    overlay_doc: &Document,
    imported: &mut HashMap<ObjectId, ObjectId>,
) -> Result<(), lopdf::Error> {
    let mut resources = effective_resources(doc, page_id)?;
    let mut fonts = match resources.get(b"Font") {
        Ok(obj) => resolve_dict(doc, obj)?.clone(),
        Err(_) => Dictionary::new(),
    };

    let mut renames: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();
    for (name, font) in layer.fonts.iter() {
        let font = import_object(doc, overlay_doc, font, imported)?;
        let key = match fonts.get(name) {
            Err(_) => name.clone(),
            Ok(existing) if same_reference(existing, &font) => name.clone(),
            Ok(_) => {
                let fresh = unused_name(&fonts, name);
                renames.insert(name.clone(), fresh.clone());
                fresh
            }
        };
        fonts.set(key, font);
    }
    resources.set("Font", Object::Dictionary(fonts));

    let content = if renames.is_empty() {
        layer.content.clone()
    } else {
        rename_fonts(&layer.content, &renames)?
    };

    let mut stamped = b"Q\nq\n".to_vec();
    stamped.extend_from_slice(&content);
    stamped.extend_from_slice(b"\nQ\n");

    let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let stamp_id = doc.add_object(Stream::new(Dictionary::new(), stamped));

    let page = doc.get_dictionary_mut(page_id)?;
    let mut contents: Vec<Object> = vec![Object::Reference(open_id)];
    match page.get(b"Contents") {
        Ok(Object::Array(items)) => contents.extend(items.iter().cloned()),
        Ok(other) => contents.push(other.clone()),
        Err(_) => {}
    }
    contents.push(Object::Reference(stamp_id));

    page.set("Contents", Object::Array(contents));
    page.set("Resources", Object::Dictionary(resources));
    Ok(())
}

/// Resources of a page, following `/Parent` inheritance, as an owned copy.
fn effective_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary, lopdf::Error> {
    let mut current = Some(page_id);
    let mut depth = 0;

    while let Some(id) = current {
        if depth > MAX_PAGE_TREE_DEPTH {
            break;
        }
        let dict = doc.get_dictionary(id)?;
        if let Ok(resources) = dict.get(b"Resources") {
            return Ok(resolve_dict(doc, resources)?.clone());
        }
        current = dict.get(b"Parent").and_then(|p| p.as_reference()).ok();
        depth += 1;
    }

    Ok(Dictionary::new())
}

fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Result<&'a Dictionary, lopdf::Error> {
    match obj {
        Object::Reference(id) => doc.get_dictionary(*id),
        other => other.as_dict(),
    }
}

fn same_reference(a: &Object, b: &Object) -> bool {
    matches!((a, b), (Object::Reference(x), Object::Reference(y)) if x == y)
}

fn unused_name(fonts: &Dictionary, base: &[u8]) -> Vec<u8> {
    let mut n = 1;
    loop {
        let mut candidate = base.to_vec();
        candidate.extend_from_slice(format!("S{}", n).as_bytes());
        if !fonts.has(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn rename_fonts(
    content: &[u8],
    renames: &HashMap<Vec<u8>, Vec<u8>>,
) -> Result<Vec<u8>, lopdf::Error> {
    let mut decoded = Content::decode(content)?;
    for op in decoded.operations.iter_mut() {
        if op.operator != "Tf" {
            continue;
        }
        if let Some(Object::Name(name)) = op.operands.first_mut() {
            if let Some(fresh) = renames.get(name.as_slice()) {
                *name = fresh.clone();
            }
        }
    }
    decoded.encode()
}

/// Deep-copies `object` from `source` into `target`, remapping references.
fn import_object(
    target: &mut Document,
    source: &Document,
    object: &Object,
    imported: &mut HashMap<ObjectId, ObjectId>,
) -> Result<Object, lopdf::Error> {
    Ok(match object {
        Object::Reference(id) => {
            if let Some(new_id) = imported.get(id) {
                return Ok(Object::Reference(*new_id));
            }
            let new_id = target.new_object_id();
            imported.insert(*id, new_id);
            let resolved = source.get_object(*id)?.clone();
            let copied = import_object(target, source, &resolved, imported)?;
            target.objects.insert(new_id, copied);
            Object::Reference(new_id)
        }
        Object::Dictionary(dict) => Object::Dictionary(import_dictionary(
            target, source, dict, imported,
        )?),
        Object::Array(items) => Object::Array(
            items
                .iter()
                .map(|item| import_object(target, source, item, imported))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Object::Stream(stream) => {
            let dict = import_dictionary(target, source, &stream.dict, imported)?;
            Object::Stream(Stream::new(dict, stream.content.clone()))
        }
        other => other.clone(),
    })
}

fn import_dictionary(
    target: &mut Document,
    source: &Document,
    dict: &Dictionary,
    imported: &mut HashMap<ObjectId, ObjectId>,
) -> Result<Dictionary, lopdf::Error> {
    let mut out = Dictionary::new();
    for (key, value) in dict.iter() {
        out.set(key.clone(), import_object(target, source, value, imported)?);
    }
    Ok(out)
}
