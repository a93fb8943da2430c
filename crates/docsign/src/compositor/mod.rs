//! Stamps a signature image onto a PDF page.
//!
//! The page's existing content streams are left byte-for-byte intact: they
//! are bracketed by a new `q` stream and a new overlay stream that restores
//! the graphics state and draws the image, so nothing the original content
//! does to the CTM can shift the stamp.

pub mod placement;
pub mod signature;

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use crate::error::PdfError;
use crate::locator::Anchor;
use crate::pdf;

pub use placement::{Placement, UserRect};
pub use signature::SignatureImage;

const XOBJECT_PREFIX: &str = "DocsignSig";

/// Decodes `signature_data_url`, stamps it relative to `anchor` and returns
/// the re-serialized document.
pub fn composite(pdf_bytes: &[u8], anchor: &Anchor, signature_data_url: &str) -> Result<Vec<u8>, PdfError> {
    let signature = SignatureImage::from_data_url(signature_data_url)?;
    let mut doc = pdf::load(pdf_bytes)?;
    stamp(&mut doc, anchor, &signature)?;
    pdf::save(&mut doc)
}

/// Adds the signature to `anchor.page` of an already loaded document.
pub fn stamp(doc: &mut Document, anchor: &Anchor, signature: &SignatureImage) -> Result<Placement, PdfError> {
    let _span = tracing::debug_span!("compositor.stamp", page = anchor.page).entered();

    let page_id = pdf::page_id(doc, anchor.page)?;
    let page_box = pdf::media_box(doc, page_id)?;
    let placement = Placement::for_anchor(anchor, signature.width(), signature.height());
    let rect = placement.to_user_space(page_box.top);

    let mut resources = local_resources(doc, page_id)?;
    let mut xobjects = match resources.get(b"XObject") {
        Ok(entry) => pdf::resolve_dict(doc, entry)?.clone(),
        Err(_) => Dictionary::new(),
    };
    let existing_contents = content_refs(doc, page_id)?;

    let image_id = add_image(doc, signature)?;
    let image_name = unique_name(&xobjects);
    xobjects.set(image_name.as_bytes().to_vec(), Object::Reference(image_id));
    resources.set("XObject", Object::Dictionary(xobjects));

    let draw = format!(
        "q\n{:.4} 0 0 {:.4} {:.4} {:.4} cm\n/{} Do\nQ\n",
        rect.width, rect.height, rect.x, rect.y, image_name
    );

    let contents = if existing_contents.is_empty() {
        let overlay = doc.add_object(Stream::new(dictionary! {}, draw.into_bytes()));
        vec![Object::Reference(overlay)]
    } else {
        let save = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
        let overlay = doc.add_object(Stream::new(
            dictionary! {},
            format!("Q\n{}", draw).into_bytes(),
        ));
        let mut contents = Vec::with_capacity(existing_contents.len() + 2);
        contents.push(Object::Reference(save));
        contents.extend(existing_contents);
        contents.push(Object::Reference(overlay));
        contents
    };

    let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
    page.set("Resources", Object::Dictionary(resources));
    page.set("Contents", Object::Array(contents));

    tracing::debug!(
        x = rect.x,
        y = rect.y,
        width = rect.width,
        height = rect.height,
        "signature placed"
    );
    Ok(placement)
}

/// A page-local copy of the (possibly inherited) resource dictionary, so
/// adding the image never alters sibling pages.
fn local_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary, PdfError> {
    match pdf::inherited(doc, page_id, b"Resources")? {
        Some(entry) => Ok(pdf::resolve_dict(doc, entry)?.clone()),
        None => Ok(Dictionary::new()),
    }
}

fn content_refs(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>, PdfError> {
    let page = doc.get_object(page_id)?.as_dict()?;
    match page.get(b"Contents") {
        Err(_) => Ok(Vec::new()),
        Ok(Object::Array(items)) => Ok(items.clone()),
        Ok(Object::Reference(id)) => match doc.get_object(*id)? {
            Object::Array(items) => Ok(items.clone()),
            _ => Ok(vec![Object::Reference(*id)]),
        },
        Ok(_) => Err(PdfError::Content(
            "/Contents is neither a stream reference nor an array".to_string(),
        )),
    }
}

fn unique_name(xobjects: &Dictionary) -> String {
    (0..)
        .map(|n| format!("{}{}", XOBJECT_PREFIX, n))
        .find(|candidate| !xobjects.has(candidate.as_bytes()))
        .unwrap_or_else(|| XOBJECT_PREFIX.to_string())
}

fn add_image(doc: &mut Document, signature: &SignatureImage) -> Result<ObjectId, PdfError> {
    let (rgb, alpha) = signature.planes();
    let width = i64::from(signature.width());
    let height = i64::from(signature.height());

    let mut image = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width,
        "Height" => height,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };

    if let Some(alpha) = alpha {
        let smask_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            deflate(&alpha)?,
        ));
        image.set("SMask", Object::Reference(smask_id));
    }

    Ok(doc.add_object(Stream::new(image, deflate(&rgb)?)))
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, PdfError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| PdfError::Write(format!("failed to compress image: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| PdfError::Write(format!("failed to compress image: {}", e)))
}
