//! Thin helpers over `lopdf` shared by the keyword locator and the
//! signature compositor.

pub mod cmap;
pub mod text;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::error::PdfError;

pub use text::{extract_page_text, PageText, TextBlock};

const MAX_TREE_DEPTH: usize = 64;
const MAX_REF_DEPTH: usize = 32;
/// Readers accept the `%PDF-` marker anywhere in the first kilobyte.
const HEADER_WINDOW: usize = 1024;

/// Page rectangle in PDF user space (points, origin bottom-left).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl PageBox {
    pub const LETTER: PageBox = PageBox {
        left: 0.0,
        bottom: 0.0,
        right: 612.0,
        top: 792.0,
    };

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }
}

/// True when `bytes` carry a PDF header. Word, ODT and other office
/// formats are rejected here; converting them is up to the store adapter.
pub fn is_pdf(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(HEADER_WINDOW)];
    window.windows(5).any(|w| w == b"%PDF-")
}

pub fn load(bytes: &[u8]) -> Result<Document, PdfError> {
    Document::load_mem(bytes).map_err(|e| PdfError::Load(e.to_string()))
}

/// Serializes a complete new file; `doc` itself is left as is.
pub fn save(doc: &mut Document) -> Result<Vec<u8>, PdfError> {
    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| PdfError::Write(e.to_string()))?;
    Ok(out)
}

/// Object id of the page at zero-based `index`.
pub fn page_id(doc: &Document, index: usize) -> Result<ObjectId, PdfError> {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(PdfError::NoPages);
    }
    pages
        .values()
        .nth(index)
        .copied()
        .ok_or(PdfError::PageNotFound(index))
}

/// Follows indirect references until a direct object is reached.
pub fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Result<&'a Object, PdfError> {
    let mut current = object;
    for _ in 0..MAX_REF_DEPTH {
        match current {
            Object::Reference(id) => current = doc.get_object(*id)?,
            other => return Ok(other),
        }
    }
    Err(PdfError::Content("reference chain too deep".to_string()))
}

pub fn resolve_dict<'a>(doc: &'a Document, object: &'a Object) -> Result<&'a Dictionary, PdfError> {
    Ok(resolve(doc, object)?.as_dict()?)
}

/// Reads a page attribute, walking up the page tree for inheritable keys
/// such as `Resources` and `MediaBox`.
pub fn inherited<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Result<Option<&'a Object>, PdfError> {
    let mut node = doc.get_object(page_id)?.as_dict()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Ok(Some(value));
        }
        match node.get(b"Parent") {
            Ok(Object::Reference(parent)) => node = doc.get_object(*parent)?.as_dict()?,
            _ => return Ok(None),
        }
    }
    Ok(None)
}

/// The page's MediaBox, normalised so `left < right` and `bottom < top`.
/// Pages without one are treated as US Letter.
pub fn media_box(doc: &Document, page_id: ObjectId) -> Result<PageBox, PdfError> {
    let Some(object) = inherited(doc, page_id, b"MediaBox")? else {
        return Ok(PageBox::LETTER);
    };
    let values = resolve(doc, object)?
        .as_array()?
        .iter()
        .map(|item| resolve(doc, item).ok().and_then(number))
        .collect::<Option<Vec<f64>>>()
        .filter(|v| v.len() == 4)
        .ok_or_else(|| PdfError::Content("MediaBox is not four numbers".to_string()))?;

    Ok(PageBox {
        left: values[0].min(values[2]),
        bottom: values[1].min(values[3]),
        right: values[0].max(values[2]),
        top: values[1].max(values[3]),
    })
}

pub fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

pub fn name(object: &Object) -> Option<&[u8]> {
    match object {
        Object::Name(name) => Some(name.as_slice()),
        _ => None,
    }
}

/// Stream payload with filters applied.
pub fn stream_bytes(stream: &Stream) -> Result<Vec<u8>, PdfError> {
    if stream.dict.has(b"Filter") {
        Ok(stream.decompressed_content()?)
    } else {
        Ok(stream.content.clone())
    }
}
