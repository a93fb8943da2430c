//! Fixtures shared by unit tests.

use base64::Engine;
use image::{ImageFormat, Rgba, RgbaImage};
use lopdf::{dictionary, Document, Object, Stream};
use std::io::Cursor;

enum PageSpec {
    Lines(Vec<(f64, f64, String)>),
    Raw(String),
    Blank,
}

/// Builds small Letter-size PDFs. MediaBox and Resources (a Helvetica
/// `/F1`) live on the page tree root so pages inherit them.
pub struct PdfBuilder {
    pages: Vec<PageSpec>,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self {
            pages: vec![PageSpec::Lines(Vec::new())],
        }
    }

    /// Starts a new page.
    pub fn page(mut self) -> Self {
        self.pages.push(PageSpec::Lines(Vec::new()));
        self
    }

    /// Adds 12pt text with its baseline at (`x`, `y`) in user space.
    pub fn text(mut self, x: f64, y: f64, text: &str) -> Self {
        match self.pages.last_mut() {
            Some(PageSpec::Lines(lines)) => lines.push((x, y, text.to_string())),
            _ => self.pages.push(PageSpec::Lines(vec![(x, y, text.to_string())])),
        }
        self
    }

    /// Replaces the current page's content stream.
    pub fn raw(mut self, content: &str) -> Self {
        if let Some(last) = self.pages.last_mut() {
            *last = PageSpec::Raw(content.to_string());
        }
        self
    }

    /// Replaces the current page with one that has no content stream.
    pub fn blank_page(mut self) -> Self {
        if let Some(last) = self.pages.last_mut() {
            *last = PageSpec::Blank;
        }
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let mut kids: Vec<Object> = Vec::new();
        for spec in self.pages {
            let content = match spec {
                PageSpec::Lines(lines) => Some(
                    lines
                        .iter()
                        .map(|(x, y, text)| {
                            format!("BT /F1 12 Tf {} {} Td ({}) Tj ET\n", x, y, escape(text))
                        })
                        .collect::<String>(),
                ),
                PageSpec::Raw(content) => Some(content),
                PageSpec::Blank => None,
            };

            let mut page = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
            };
            if let Some(content) = content {
                let content_id =
                    doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
                page.set("Contents", content_id);
            }
            kids.push(doc.add_object(page).into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                },
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).expect("failed to save test PDF");
        buffer
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

/// A `data:image/png;base64,...` URL for a `width` x `height` signature
/// with a transparent background and an opaque stroke.
pub fn signature_data_url(width: u32, height: u32) -> String {
    let mut image = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));
    for x in 0..width {
        image.put_pixel(x, height / 2, Rgba([10, 20, 120, 255]));
    }
    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .expect("failed to encode test PNG");
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    )
}
