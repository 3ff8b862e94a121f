//! Per-article PDF extraction.
//!
//! A slice keeps the requested physical pages (1-indexed, inclusive) of the
//! source PDF, in their original order and with their original content
//! streams, and drops everything else. Bounds are never clamped: a range
//! reaching outside the document is an [`IngestError::Range`].

use lopdf::Document;

use crate::error::{IngestError, Result};
use crate::extract::MIME_PDF;

fn load(bytes: &[u8]) -> Result<Document> {
    Document::load_mem(bytes).map_err(|e| IngestError::extraction(MIME_PDF, e))
}

/// Number of physical pages in a PDF.
pub fn page_count(bytes: &[u8]) -> Result<u32> {
    Ok(load(bytes)?.get_pages().len() as u32)
}

/// Reject a physical range that does not lie within `1..=page_count`.
pub fn check_bounds(start: i64, end: i64, page_count: u32) -> Result<()> {
    let last = i64::from(page_count);
    if start < 1 || end < start || end > last {
        return Err(IngestError::Range {
            start,
            end,
            page_count,
        });
    }
    Ok(())
}

/// A standalone PDF holding physical pages `start..=end` of `bytes`.
pub fn slice_pdf(bytes: &[u8], start: i64, end: i64) -> Result<Vec<u8>> {
    let mut doc = load(bytes)?;
    let pages = doc.get_pages();
    check_bounds(start, end, pages.len() as u32)?;

    let dropped: Vec<u32> = pages
        .keys()
        .copied()
        .filter(|n| i64::from(*n) < start || i64::from(*n) > end)
        .collect();
    doc.delete_pages(&dropped);
    doc.prune_objects();
    doc.renumber_objects();
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| anyhow::anyhow!("failed to write PDF slice: {}", e))?;

    tracing::debug!(start, end, bytes = out.len(), "PDF sliced");
    Ok(out)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    /// A PDF with one page per entry of `pages`, each showing that text.
    pub fn text_pdf(pages: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }
}
