mod psd;

pub use self::psd::PsdExtractor;

use crate::error::ExtractError;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};

/// One encoded output image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerImage {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Encoded PNG bytes, written to disk as-is.
    pub data: Vec<u8>,
}

/// Everything produced from one document, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    pub layers: Vec<LayerImage>,
    pub composite: LayerImage,
}

/// Decodes a document into layer images plus a flattened composite.
///
/// Implementations must be deterministic: identical bytes give identical output.
pub trait Extractor {
    fn extract(&self, document: &[u8]) -> Result<ExtractionResult, ExtractError>;
}

impl<E: Extractor + ?Sized> Extractor for &E {
    fn extract(&self, document: &[u8]) -> Result<ExtractionResult, ExtractError> {
        (**self).extract(document)
    }
}

impl<E: Extractor + ?Sized> Extractor for Box<E> {
    fn extract(&self, document: &[u8]) -> Result<ExtractionResult, ExtractError> {
        (**self).extract(document)
    }
}

/// Encode a tightly packed RGBA8 buffer as PNG.
pub fn encode_rgba_png(
    name: &str,
    rgba: &[u8],
    width: u32,
    height: u32,
) -> Result<LayerImage, ExtractError> {
    let expected = width as usize * height as usize * 4;
    if rgba.len() != expected {
        return Err(ExtractError::Unsupported(format!(
            "'{}' has {} bytes of pixel data, expected {} for {}x{} RGBA",
            name,
            rgba.len(),
            expected,
            width,
            height
        )));
    }

    let mut data = Vec::new();
    PngEncoder::new(&mut data)
        .write_image(rgba, width, height, ColorType::Rgba8)
        .map_err(|e| ExtractError::Encode(format!("'{}': {}", name, e)))?;

    Ok(LayerImage {
        name: name.to_string(),
        width,
        height,
        data,
    })
}
