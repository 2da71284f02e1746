use super::{encode_rgba_png, ExtractionResult, Extractor, LayerImage};
use crate::error::ExtractError;
use ::psd::Psd;
use rayon::prelude::*;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::debug;

/// Photoshop document extractor backed by the `psd` crate.
///
/// Layers come out in document order, each rendered at full canvas size.
/// Hidden layers are skipped unless `include_hidden` is set.
#[derive(Debug, Clone, Default)]
pub struct PsdExtractor {
    pub include_hidden: bool,
}

impl PsdExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include_hidden(mut self, include_hidden: bool) -> Self {
        self.include_hidden = include_hidden;
        self
    }
}

struct DecodedDocument {
    width: u32,
    height: u32,
    layers: Vec<(String, Vec<u8>)>,
    composite: Vec<u8>,
}

impl Extractor for PsdExtractor {
    fn extract(&self, document: &[u8]) -> Result<ExtractionResult, ExtractError> {
        let decoded = self.decode(document)?;
        debug!(
            "Decoded {}x{} document with {} layers",
            decoded.width,
            decoded.height,
            decoded.layers.len()
        );

        // Encoding dominates; order is preserved by the indexed collect.
        let layers = decoded
            .layers
            .par_iter()
            .map(|(name, rgba)| encode_rgba_png(name, rgba, decoded.width, decoded.height))
            .collect::<Result<Vec<LayerImage>, ExtractError>>()?;

        let composite =
            encode_rgba_png("composite", &decoded.composite, decoded.width, decoded.height)?;

        Ok(ExtractionResult { layers, composite })
    }
}

const HEADER_LENGTH: usize = 26;
const SIGNATURE: &[u8; 4] = b"8BPS";
const VERSION_PSD: u16 = 1;
const VERSION_PSB: u16 = 2;
const SUPPORTED_DEPTH: u16 = 8;
const COLOR_MODE_RGB: u16 = 3;

/// Reject documents the decoder cannot render before handing them over.
///
/// Layout (big endian): signature, version, 6 reserved bytes, channels,
/// height, width, depth, color mode.
fn check_header(document: &[u8]) -> Result<(), ExtractError> {
    if document.len() < HEADER_LENGTH {
        return Err(ExtractError::Corrupt(format!(
            "truncated header: {} of {} bytes",
            document.len(),
            HEADER_LENGTH
        )));
    }
    if &document[0..4] != SIGNATURE {
        return Err(ExtractError::Corrupt("missing 8BPS signature".to_string()));
    }

    let read_u16 = |at: usize| u16::from_be_bytes([document[at], document[at + 1]]);
    match read_u16(4) {
        VERSION_PSD => {}
        VERSION_PSB => {
            return Err(ExtractError::Unsupported(
                "large document format (PSB)".to_string(),
            ))
        }
        other => return Err(ExtractError::Corrupt(format!("unknown version {}", other))),
    }

    let depth = read_u16(22);
    if depth != SUPPORTED_DEPTH {
        return Err(ExtractError::Unsupported(format!("{}-bit channels", depth)));
    }

    let color_mode = read_u16(24);
    if color_mode != COLOR_MODE_RGB {
        return Err(ExtractError::Unsupported(format!(
            "{} color mode",
            color_mode_name(color_mode)
        )));
    }
    Ok(())
}

fn color_mode_name(mode: u16) -> String {
    match mode {
        0 => "bitmap".to_string(),
        1 => "grayscale".to_string(),
        2 => "indexed".to_string(),
        4 => "CMYK".to_string(),
        7 => "multichannel".to_string(),
        8 => "duotone".to_string(),
        9 => "Lab".to_string(),
        other => format!("unknown ({})", other),
    }
}

impl PsdExtractor {
    fn decode(&self, document: &[u8]) -> Result<DecodedDocument, ExtractError> {
        check_header(document)?;

        // The decoder indexes into untrusted input and can panic on truncated files.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<DecodedDocument, ExtractError> {
            let psd = Psd::from_bytes(document).map_err(|e| ExtractError::Corrupt(e.to_string()))?;

            let layers = psd
                .layers()
                .iter()
                .filter(|layer| self.include_hidden || layer.visible())
                .map(|layer| (layer.name().to_string(), layer.rgba()))
                .collect();

            Ok(DecodedDocument {
                width: psd.width(),
                height: psd.height(),
                layers,
                composite: psd.rgba(),
            })
        }));

        match outcome {
            Ok(result) => result,
            Err(payload) => Err(ExtractError::Corrupt(format!(
                "decoder panicked: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_psd_bytes() {
        let extractor = PsdExtractor::new();
        let err = extractor
            .extract(b"this is a plain text file pretending to be a photoshop document")
            .unwrap_err();
        assert!(matches!(err, ExtractError::Corrupt(_)), "got {:?}", err);
    }

    #[test]
    fn test_rejects_truncated_header() {
        let err = PsdExtractor::new().extract(b"8BPS").unwrap_err();
        assert!(matches!(err, ExtractError::Corrupt(_)), "got {:?}", err);
    }

    /// Header of a 2x2 document with the given version, depth and color mode.
    fn header(version: u16, depth: u16, color_mode: u16) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"8BPS");
        bytes.extend_from_slice(&version.to_be_bytes());
        bytes.extend_from_slice(&[0; 6]);
        bytes.extend_from_slice(&3u16.to_be_bytes());
        bytes.extend_from_slice(&2u32.to_be_bytes());
        bytes.extend_from_slice(&2u32.to_be_bytes());
        bytes.extend_from_slice(&depth.to_be_bytes());
        bytes.extend_from_slice(&color_mode.to_be_bytes());
        bytes
    }

    struct TestLayer {
        name: &'static str,
        rgb: [u8; 3],
        hidden: bool,
    }

    fn push_u32(bytes: &mut Vec<u8>, value: u32) {
        bytes.extend_from_slice(&value.to_be_bytes());
    }

    /// Minimal uncompressed 8-bit RGB document, 2x2, one full-canvas layer per
    /// entry (bottom first) and a composite of `composite_rgb`.
    fn two_by_two_document(layers: &[TestLayer], composite_rgb: [u8; 3]) -> Vec<u8> {
        const PIXELS: usize = 4;
        let mut bytes = header(1, 8, 3);
        push_u32(&mut bytes, 0); // color mode data
        push_u32(&mut bytes, 0); // image resources

        let mut info = Vec::new();
        info.extend_from_slice(&(layers.len() as i16).to_be_bytes());
        for layer in layers {
            for edge in [0i32, 0, 2, 2] {
                info.extend_from_slice(&edge.to_be_bytes());
            }
            info.extend_from_slice(&4u16.to_be_bytes());
            for channel in [-1i16, 0, 1, 2] {
                info.extend_from_slice(&channel.to_be_bytes());
                push_u32(&mut info, (2 + PIXELS) as u32);
            }
            info.extend_from_slice(b"8BIM");
            info.extend_from_slice(b"norm");
            info.push(255); // opacity
            info.push(0); // clipping
            info.push(if layer.hidden { 0b10 } else { 0 });
            info.push(0); // filler

            let mut name = vec![layer.name.len() as u8];
            name.extend_from_slice(layer.name.as_bytes());
            while name.len() % 4 != 0 {
                name.push(0);
            }
            push_u32(&mut info, (4 + 4 + name.len()) as u32);
            push_u32(&mut info, 0); // layer mask
            push_u32(&mut info, 0); // blending ranges
            info.extend_from_slice(&name);
        }
        for layer in layers {
            for value in [255, layer.rgb[0], layer.rgb[1], layer.rgb[2]] {
                info.extend_from_slice(&0u16.to_be_bytes());
                info.extend_from_slice(&[value; PIXELS]);
            }
        }
        if info.len() % 2 != 0 {
            info.push(0);
        }

        push_u32(&mut bytes, (4 + info.len() + 4) as u32);
        push_u32(&mut bytes, info.len() as u32);
        bytes.extend_from_slice(&info);
        push_u32(&mut bytes, 0); // global layer mask

        bytes.extend_from_slice(&0u16.to_be_bytes());
        for value in composite_rgb {
            bytes.extend_from_slice(&[value; PIXELS]);
        }
        bytes
    }

    fn sample_document() -> Vec<u8> {
        two_by_two_document(
            &[
                TestLayer {
                    name: "Background",
                    rgb: [255, 0, 0],
                    hidden: false,
                },
                TestLayer {
                    name: "Hidden",
                    rgb: [0, 0, 255],
                    hidden: true,
                },
            ],
            [255, 0, 0],
        )
    }

    fn first_pixel(png: &[u8]) -> [u8; 4] {
        let decoded = image::load_from_memory(png).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (2, 2));
        decoded.get_pixel(0, 0).0
    }

    #[test]
    fn test_extracts_visible_layers_and_composite() {
        let result = PsdExtractor::new().extract(&sample_document()).unwrap();

        assert_eq!(result.layers.len(), 1);
        assert_eq!(result.layers[0].name, "Background");
        assert_eq!((result.layers[0].width, result.layers[0].height), (2, 2));
        assert_eq!(first_pixel(&result.layers[0].data), [255, 0, 0, 255]);

        assert_eq!((result.composite.width, result.composite.height), (2, 2));
        assert_eq!(first_pixel(&result.composite.data), [255, 0, 0, 255]);
    }

    #[test]
    fn test_include_hidden_keeps_document_order() {
        let result = PsdExtractor::new()
            .include_hidden(true)
            .extract(&sample_document())
            .unwrap();

        let names: Vec<&str> = result.layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Background", "Hidden"]);
        assert_eq!(first_pixel(&result.layers[1].data), [0, 0, 255, 255]);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let document = sample_document();
        let extractor = PsdExtractor::new().include_hidden(true);
        assert_eq!(
            extractor.extract(&document).unwrap(),
            extractor.extract(&document).unwrap()
        );
    }

    #[test]
    fn test_large_document_format_is_unsupported() {
        let err = PsdExtractor::new().extract(&header(2, 8, 3)).unwrap_err();
        assert!(matches!(err, ExtractError::Unsupported(_)), "got {:?}", err);
    }

    #[test]
    fn test_sixteen_bit_depth_is_unsupported() {
        let err = PsdExtractor::new().extract(&header(1, 16, 3)).unwrap_err();
        assert_eq!(err, ExtractError::Unsupported("16-bit channels".to_string()));
    }

    #[test]
    fn test_cmyk_is_unsupported() {
        let err = PsdExtractor::new().extract(&header(1, 8, 4)).unwrap_err();
        assert_eq!(err, ExtractError::Unsupported("CMYK color mode".to_string()));
    }

    #[test]
    fn test_bad_signature_and_version_are_corrupt() {
        let mut document = header(1, 8, 3);
        document[0] = b'X';
        assert!(matches!(check_header(&document), Err(ExtractError::Corrupt(_))));

        assert!(matches!(
            check_header(&header(7, 8, 3)),
            Err(ExtractError::Corrupt(_))
        ));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("index out of bounds");
        assert_eq!(panic_message(payload.as_ref()), "index out of bounds");
    }
}
