//! Text extraction from raw document bytes.
//!
//! Flat formats (plain text, markdown, JSON/XML, HTML, DOCX, legacy Word
//! saved as text) produce [`ExtractedContent::PlainText`]. PDFs produce
//! [`ExtractedContent::PagedText`] with one entry per physical page.
//!
//! # PDF backends
//!
//! PDF text is pulled through an ordered list of [`PdfBackend`]s. Each one
//! returns a result value; the first whose output has any non-blank page
//! wins. A backend that parses the file but finds no text layer (a scanned
//! issue, for instance) is remembered, and its empty pages are returned if
//! no later backend does better. Only when every backend fails is an
//! [`IngestError::Extraction`] raised.
//!
//! | Order | Backend            | Notes                                      |
//! |-------|--------------------|--------------------------------------------|
//! | 1     | `pdf-extract` pages | best layout handling                      |
//! | 2     | `lopdf` per page    | tolerant of fonts pdf-extract rejects     |
//! | 3     | `pdf-extract` whole | split on form feeds                       |

use std::io::Read;
use std::panic::{catch_unwind, AssertUnwindSafe};

use scraper::{Html, Node};

use crate::error::{IngestError, Result};
use crate::models::{ExtractedContent, PageText};

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_MSWORD: &str = "application/msword";
pub const MIME_HTML: &str = "text/html";
pub const MIME_XHTML: &str = "application/xhtml+xml";
pub const MIME_OCTET: &str = "application/octet-stream";

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Elements whose text never reaches the output.
const SKIPPED_HTML_ELEMENTS: [&str; 3] = ["script", "style", "noscript"];

/// Resolve the MIME type of a document.
///
/// A non-empty declared type wins (parameters such as `; charset=` are
/// dropped); otherwise it is guessed from the file name's extension.
pub fn detect_mime(file_name: &str, declared: Option<&str>) -> String {
    if let Some(declared) = declared {
        let essence = declared.split(';').next().unwrap_or_default().trim();
        if !essence.is_empty() {
            return essence.to_ascii_lowercase();
        }
    }
    mime_guess::from_path(file_name)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| MIME_OCTET.to_string())
}

/// True when bytes start with the PDF magic header.
pub fn has_pdf_magic(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF")
}

/// Extract text from `bytes` according to `mime`.
pub fn extract(bytes: &[u8], mime: &str) -> Result<ExtractedContent> {
    let mime = mime
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        MIME_PDF => extract_pdf(bytes),
        MIME_HTML | MIME_XHTML => Ok(ExtractedContent::PlainText(html_to_text(
            &String::from_utf8_lossy(bytes),
        ))),
        MIME_DOCX => extract_docx(bytes).map(ExtractedContent::PlainText),
        MIME_MSWORD => Ok(ExtractedContent::PlainText(decode_text(bytes))),
        m if is_text_mime(m) => Ok(ExtractedContent::PlainText(decode_text(bytes))),
        other => Err(IngestError::extraction(other, "unsupported content type")),
    }
}

fn is_text_mime(mime: &str) -> bool {
    mime.starts_with("text/")
        || matches!(
            mime,
            "application/json" | "application/xml" | "application/x-markdown"
        )
}

fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Reduce an HTML document to its visible text, one text node per line.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut lines: Vec<&str> = Vec::new();

    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| SKIPPED_HTML_ELEMENTS.contains(&el.name()))
        });
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed);
        }
    }

    lines.join("\n")
}

/// Contents of the `<title>` element, if any.
pub fn html_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = scraper::Selector::parse("title").ok()?;
    let title = document
        .select(&selector)
        .next()?
        .text()
        .collect::<String>();
    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
    (!title.is_empty()).then_some(title)
}

// ============ PDF ============

/// One way of pulling per-page text out of a PDF.
pub trait PdfBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Page texts in physical order, or a description of the failure.
    fn pages(&self, bytes: &[u8]) -> std::result::Result<Vec<String>, String>;
}

/// `pdf-extract`, page by page.
pub struct PdfExtractPages;

/// `lopdf` content-stream text, page by page.
pub struct LopdfPages;

/// `pdf-extract` over the whole document, split on form feeds.
pub struct PdfExtractWhole;

impl PdfBackend for PdfExtractPages {
    fn name(&self) -> &'static str {
        "pdf-extract-pages"
    }

    fn pages(&self, bytes: &[u8]) -> std::result::Result<Vec<String>, String> {
        guard_panic(|| pdf_extract::extract_text_from_mem_by_pages(bytes))?
            .map_err(|e| e.to_string())
    }
}

impl PdfBackend for LopdfPages {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn pages(&self, bytes: &[u8]) -> std::result::Result<Vec<String>, String> {
        guard_panic(|| {
            let doc = lopdf::Document::load_mem(bytes).map_err(|e| e.to_string())?;
            let numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
            // A page whose content stream lopdf cannot decode keeps an empty slot.
            let pages: Vec<String> = numbers
                .iter()
                .map(|n| doc.extract_text(&[*n]).unwrap_or_default())
                .collect();
            Ok::<_, String>(pages)
        })?
    }
}

impl PdfBackend for PdfExtractWhole {
    fn name(&self) -> &'static str {
        "pdf-extract-whole"
    }

    fn pages(&self, bytes: &[u8]) -> std::result::Result<Vec<String>, String> {
        let text = guard_panic(|| pdf_extract::extract_text_from_mem(bytes))?
            .map_err(|e| e.to_string())?;
        Ok(text.split('\x0C').map(str::to_string).collect())
    }
}

/// Run a parser that may panic on malformed input, turning the panic into an error.
fn guard_panic<T>(f: impl FnOnce() -> T) -> std::result::Result<T, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        format!("parser panicked: {}", msg)
    })
}

/// Backends in reliability order.
pub fn default_pdf_backends() -> Vec<Box<dyn PdfBackend>> {
    vec![
        Box::new(PdfExtractPages),
        Box::new(LopdfPages),
        Box::new(PdfExtractWhole),
    ]
}

/// Extract page-tagged text from a PDF with the default backends.
pub fn extract_pdf(bytes: &[u8]) -> Result<ExtractedContent> {
    extract_pdf_with(bytes, &default_pdf_backends())
}

/// Extract page-tagged text, trying `backends` in order.
pub fn extract_pdf_with(bytes: &[u8], backends: &[Box<dyn PdfBackend>]) -> Result<ExtractedContent> {
    if !has_pdf_magic(bytes) {
        return Err(IngestError::extraction(MIME_PDF, "missing %PDF header"));
    }

    let mut blank: Option<Vec<String>> = None;
    let mut failures: Vec<String> = Vec::new();

    for backend in backends {
        match backend.pages(bytes) {
            Ok(pages) if pages.iter().any(|p| !p.trim().is_empty()) => {
                tracing::debug!(backend = backend.name(), pages = pages.len(), "PDF text extracted");
                return Ok(to_paged(pages));
            }
            Ok(pages) => {
                tracing::debug!(backend = backend.name(), "PDF parsed but has no text layer");
                if blank.is_none() {
                    blank = Some(pages);
                }
            }
            Err(cause) => {
                tracing::warn!(backend = backend.name(), %cause, "PDF backend failed");
                failures.push(format!("{}: {}", backend.name(), cause));
            }
        }
    }

    match blank {
        Some(pages) => Ok(to_paged(pages)),
        None if failures.is_empty() => Err(IngestError::extraction(MIME_PDF, "no backends configured")),
        None => Err(IngestError::extraction(MIME_PDF, failures.join("; "))),
    }
}

fn to_paged(pages: Vec<String>) -> ExtractedContent {
    ExtractedContent::PagedText(
        pages
            .into_iter()
            .enumerate()
            .map(|(i, text)| PageText::new(i as u32 + 1, text))
            .collect(),
    )
}

// ============ DOCX ============

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let ooxml = |e: &dyn std::fmt::Display| IngestError::extraction(MIME_DOCX, e);

    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ooxml(&e))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ooxml(&"word/document.xml not found"))?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ooxml(&e))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ooxml(&"word/document.xml exceeds size limit"));
    }

    docx_paragraphs(&doc_xml).map_err(|e| ooxml(&e))
}

/// Concatenate `w:t` runs, one line per `w:p` paragraph.
fn docx_paragraphs(xml: &[u8]) -> std::result::Result<String, quick_xml::Error> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_text = true,
            Event::Text(te) if in_text => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Event::Empty(e) if matches!(e.local_name().as_ref(), b"tab" | b"br") => out.push(' '),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}
