use base64::Engine;
use image::DynamicImage;

use crate::error::PdfError;

/// A decoded handwritten signature, as posted by the signing pad.
#[derive(Debug, Clone)]
pub struct SignatureImage {
    mime: String,
    image: DynamicImage,
}

impl SignatureImage {
    /// Parses `data:<mime>;base64,<payload>`. Whitespace inside the payload
    /// is ignored; anything that does not decode to a non-empty raster
    /// image is a [`PdfError::MalformedSignature`].
    pub fn from_data_url(data_url: &str) -> Result<Self, PdfError> {
        let malformed = |reason: &str| PdfError::MalformedSignature(reason.to_string());

        let rest = data_url
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| malformed("expected a data: URL"))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| malformed("missing ',' between header and payload"))?;

        let mut params = header.split(';');
        let mime = params.next().unwrap_or_default().trim().to_ascii_lowercase();
        if !params.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
            return Err(malformed("payload is not base64-encoded"));
        }
        if !mime.is_empty() && !mime.starts_with("image/") {
            return Err(PdfError::MalformedSignature(format!(
                "unsupported media type '{}'",
                mime
            )));
        }

        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            return Err(malformed("empty payload"));
        }
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| PdfError::MalformedSignature(format!("invalid base64: {}", e)))?;

        let image = image::load_from_memory(&bytes).map_err(|e| {
            PdfError::MalformedSignature(format!("payload is not a decodable image: {}", e))
        })?;
        if image.width() == 0 || image.height() == 0 {
            return Err(malformed("image has no pixels"));
        }

        Ok(Self { mime, image })
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn has_alpha(&self) -> bool {
        self.image.color().has_alpha()
    }

    /// Splits the raster into packed 8-bit RGB samples and, when the image
    /// carries transparency, a matching 8-bit alpha plane.
    pub fn planes(&self) -> (Vec<u8>, Option<Vec<u8>>) {
        let rgba = self.image.to_rgba8();
        let pixels = (rgba.width() * rgba.height()) as usize;
        let mut rgb = Vec::with_capacity(pixels * 3);
        let mut alpha = Vec::with_capacity(pixels);

        for pixel in rgba.pixels() {
            let [r, g, b, a] = pixel.0;
            rgb.extend_from_slice(&[r, g, b]);
            alpha.push(a);
        }

        (rgb, self.has_alpha().then_some(alpha))
    }
}
