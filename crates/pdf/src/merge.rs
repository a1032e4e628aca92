//! Merging and repairing whole documents.

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::{save_atomic, PdfError, WriteReport};

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITED_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];
const MAX_TREE_DEPTH: usize = 32;

/// Concatenate the pages of `sources`, in order, into `dest`.
///
/// A source that fails to load is skipped and reported. `dest` may itself be
/// one of the sources: everything is read before the destination is replaced,
/// and if `dest` is unreadable the merge fails without touching it.
pub fn merge_pdfs(sources: &[PathBuf], dest: &Path) -> Result<WriteReport, PdfError> {
    let mut report = WriteReport::default();
    let mut next_id = 1;
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();
    let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();

    for source in sources {
        let mut doc = match Document::load(source) {
            Ok(doc) => doc,
            Err(e) if source.as_path() == dest => return Err(PdfError::Lopdf(e)),
            Err(e) => {
                log::warn!("[PDF] skipping invalid source {}: {}", source.display(), e);
                report.skipped.push((source.clone(), e.to_string()));
                continue;
            }
        };
        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;

        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        let mut collected = Vec::with_capacity(page_ids.len());
        for page_id in page_ids {
            match page_with_inherited(&doc, page_id) {
                Ok(page) => collected.push((page_id, page)),
                Err(e) => {
                    log::warn!("[PDF] {}: unreadable page {:?}: {}", source.display(), page_id, e);
                }
            }
        }
        if collected.is_empty() {
            if source.as_path() == dest {
                return Err(PdfError::NothingToWrite(dest.to_path_buf()));
            }
            report.skipped.push((source.clone(), "no readable pages".to_string()));
            continue;
        }

        pages.extend(collected);
        objects.extend(doc.objects);
    }

    if pages.is_empty() {
        return Err(PdfError::NothingToWrite(dest.to_path_buf()));
    }

    let mut merged = Document::with_version("1.5");
    merged.objects = objects;
    merged.max_id = next_id;
    let pages_id = merged.new_object_id();

    let kids: Vec<Object> = pages.iter().map(|(id, _)| Object::Reference(*id)).collect();
    report.pages_written = kids.len();
    for (page_id, mut page) in pages {
        page.set("Parent", pages_id);
        merged.objects.insert(page_id, Object::Dictionary(page));
    }

    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => report.pages_written as i64,
        }),
    );
    let catalog_id = merged.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    merged.trailer.set("Root", catalog_id);

    // The old catalogs and page trees are now unreachable.
    merged.prune_objects();

    save_atomic(&mut merged, dest)?;
    log::info!(
        "[PDF] merged {} sources into {} ({} pages)",
        sources.len() - report.skipped.len(),
        dest.display(),
        report.pages_written
    );
    Ok(report)
}

/// Rewrite `src` into `dest` from its parsed object graph, dropping
/// unreachable objects and empty streams. Returns the page count.
pub fn repair_pdf(src: &Path, dest: &Path) -> Result<usize, PdfError> {
    let mut doc = Document::load(src)?;
    let pages = doc.get_pages().len();
    if pages == 0 {
        return Err(PdfError::NothingToWrite(dest.to_path_buf()));
    }

    doc.prune_objects();
    doc.delete_zero_length_streams();
    save_atomic(&mut doc, dest)?;

    log::info!("[PDF] repaired {} -> {} ({} pages)", src.display(), dest.display(), pages);
    Ok(pages)
}

/// The page dictionary with inheritable attributes copied down from its
/// ancestors, so it survives being re-parented.
fn page_with_inherited(doc: &Document, page_id: ObjectId) -> Result<Dictionary, lopdf::Error> {
    let mut page = doc.get_dictionary(page_id)?.clone();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;

    while let Some(parent_id) = parent {
        depth += 1;
        if depth > MAX_TREE_DEPTH {
            break;
        }
        let node = match doc.get_object(parent_id) {
            Ok(Object::Dictionary(dict)) => dict,
            _ => break,
        };
        for key in INHERITED_KEYS {
            if !page.has(key) {
                if let Ok(value) = node.get(key) {
                    page.set(key.to_vec(), value.clone());
                }
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    Ok(page)
}
