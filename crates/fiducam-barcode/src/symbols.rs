//! Symbol decoding over a pluggable scanner backend.

use std::fmt;

use fiducam_core::{AxisRect, Frame};
use image::GrayImage;
use log::{debug, info};
use nalgebra::Point2;
use rxing::{BarcodeFormat, RXingResult, RXingResultMetadataType, RXingResultMetadataValue};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Encoding standard of a decoded symbol.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Symbology {
    Ean8,
    Ean13,
    UpcA,
    UpcE,
    Code39,
    Code93,
    Code128,
    Codabar,
    Itf,
    Qr,
    MicroQr,
    DataMatrix,
    Aztec,
    Pdf417,
    /// Anything the backend reports that has no dedicated variant.
    Other(String),
}

impl Symbology {
    /// Upper-case name used in labels and in the published detection state.
    pub fn name(&self) -> &str {
        match self {
            Symbology::Ean8 => "EAN8",
            Symbology::Ean13 => "EAN13",
            Symbology::UpcA => "UPCA",
            Symbology::UpcE => "UPCE",
            Symbology::Code39 => "CODE39",
            Symbology::Code93 => "CODE93",
            Symbology::Code128 => "CODE128",
            Symbology::Codabar => "CODABAR",
            Symbology::Itf => "I25",
            Symbology::Qr => "QRCODE",
            Symbology::MicroQr => "MICROQR",
            Symbology::DataMatrix => "DATAMATRIX",
            Symbology::Aztec => "AZTEC",
            Symbology::Pdf417 => "PDF417",
            Symbology::Other(name) => name,
        }
    }
}

impl fmt::Display for Symbology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&BarcodeFormat> for Symbology {
    fn from(format: &BarcodeFormat) -> Self {
        match format {
            BarcodeFormat::EAN_8 => Symbology::Ean8,
            BarcodeFormat::EAN_13 => Symbology::Ean13,
            BarcodeFormat::UPC_A => Symbology::UpcA,
            BarcodeFormat::UPC_E => Symbology::UpcE,
            BarcodeFormat::CODE_39 => Symbology::Code39,
            BarcodeFormat::CODE_93 => Symbology::Code93,
            BarcodeFormat::CODE_128 => Symbology::Code128,
            BarcodeFormat::CODABAR => Symbology::Codabar,
            BarcodeFormat::ITF => Symbology::Itf,
            BarcodeFormat::QR_CODE => Symbology::Qr,
            BarcodeFormat::MICRO_QR_CODE => Symbology::MicroQr,
            BarcodeFormat::DATA_MATRIX => Symbology::DataMatrix,
            BarcodeFormat::AZTEC => Symbology::Aztec,
            BarcodeFormat::PDF_417 => Symbology::Pdf417,
            other => Symbology::Other(format!("{other:?}").replace('_', "").to_uppercase()),
        }
    }
}

/// One symbol as reported by a scanner backend, before text validation.
#[derive(Clone, Debug, PartialEq)]
pub struct RawSymbol {
    pub payload: Vec<u8>,
    pub symbology: Symbology,
    /// Backend-specific outline points (finder centers, scan line ends, ...).
    pub points: Vec<Point2<f32>>,
}

/// Backend that finds and decodes every symbol in a grayscale image.
///
/// Implementations return symbols in their native order. Absence of symbols
/// is an empty vector, never an error.
pub trait SymbolScanner: Send {
    fn scan(&mut self, gray: &GrayImage) -> Vec<RawSymbol>;
}

impl<S: SymbolScanner + ?Sized> SymbolScanner for Box<S> {
    fn scan(&mut self, gray: &GrayImage) -> Vec<RawSymbol> {
        (**self).scan(gray)
    }
}

/// Multi-format scanner backed by `rxing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct RxingScanner;

impl SymbolScanner for RxingScanner {
    fn scan(&mut self, gray: &GrayImage) -> Vec<RawSymbol> {
        let luma = gray.as_raw().clone();
        match rxing::helpers::detect_multiple_in_luma(luma, gray.width(), gray.height()) {
            Ok(results) => results
                .iter()
                .map(|r| RawSymbol {
                    payload: payload_bytes(r),
                    symbology: Symbology::from(r.getBarcodeFormat()),
                    points: r.getPoints().iter().map(|p| Point2::new(p.x, p.y)).collect(),
                })
                .collect(),
            Err(rxing::Exceptions::NotFoundException(_)) => Vec::new(),
            Err(e) => {
                debug!("rxing error: {e}");
                Vec::new()
            }
        }
    }
}

/// Raw bytes of a decoded symbol.
///
/// `getText()` is already transcoded by the backend, so byte-mode segments are
/// taken from the result metadata when present. A symbol mixing text segments
/// with valid UTF-8 byte segments keeps its decoded text.
fn payload_bytes(result: &RXingResult) -> Vec<u8> {
    let text = result.getText().as_bytes();
    match result
        .getRXingResultMetadata()
        .get(&RXingResultMetadataType::BYTE_SEGMENTS)
    {
        Some(RXingResultMetadataValue::ByteSegments(segments)) if !segments.is_empty() => {
            let raw = segments.concat();
            if std::str::from_utf8(&raw).is_ok() {
                text.to_vec()
            } else {
                raw
            }
        }
        _ => text.to_vec(),
    }
}

/// A symbol whose payload bytes are not valid UTF-8; dropped from the frame.
#[derive(thiserror::Error, Debug, Clone)]
#[error("{symbology} payload is not valid UTF-8")]
pub struct SymbolTextError {
    pub symbology: Symbology,
    #[source]
    pub source: std::string::FromUtf8Error,
}

/// A decoded, text-validated symbol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecodedSymbol {
    pub payload: Vec<u8>,
    /// `payload` as text.
    pub text: String,
    pub symbology: Symbology,
    /// Axis-aligned box around the backend's outline points.
    pub rect: AxisRect,
}

impl DecodedSymbol {
    /// `"{text} ({symbology})"`.
    pub fn label(&self) -> String {
        format!("{} ({})", self.text, self.symbology)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolDecoderParams {
    /// Only report these symbologies. Empty means all.
    pub formats: Vec<Symbology>,
}

/// Result of decoding one frame.
#[derive(Clone, Debug, Default)]
pub struct SymbolScan {
    pub symbols: Vec<DecodedSymbol>,
    /// Symbols dropped because their payload is not text.
    pub rejected: Vec<SymbolTextError>,
    /// Payloads that differed from the previously announced one, in the
    /// order they were announced.
    pub announced: Vec<String>,
}

/// Decodes symbols and remembers the last distinct payload it saw.
pub struct SymbolDecoder<S: SymbolScanner = RxingScanner> {
    scanner: S,
    params: SymbolDecoderParams,
    last: Option<(String, Symbology)>,
}

impl Default for SymbolDecoder<RxingScanner> {
    fn default() -> Self {
        Self::new(SymbolDecoderParams::default())
    }
}

impl SymbolDecoder<RxingScanner> {
    pub fn new(params: SymbolDecoderParams) -> Self {
        Self::with_scanner(RxingScanner, params)
    }
}

impl<S: SymbolScanner> SymbolDecoder<S> {
    pub fn with_scanner(scanner: S, params: SymbolDecoderParams) -> Self {
        Self {
            scanner,
            params,
            last: None,
        }
    }

    /// Last announced payload, if any.
    pub fn last_payload(&self) -> Option<&str> {
        self.last.as_ref().map(|(p, _)| p.as_str())
    }

    pub fn last_symbology(&self) -> Option<&Symbology> {
        self.last.as_ref().map(|(_, s)| s)
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, frame), fields(width = frame.width(), height = frame.height()))
    )]
    pub fn decode(&mut self, frame: &Frame) -> SymbolScan {
        self.decode_gray(&frame.to_gray())
    }

    pub fn decode_gray(&mut self, gray: &GrayImage) -> SymbolScan {
        let mut scan = SymbolScan::default();

        for raw in self.scanner.scan(gray) {
            if !self.params.formats.is_empty() && !self.params.formats.contains(&raw.symbology) {
                continue;
            }
            let text = match String::from_utf8(raw.payload.clone()) {
                Ok(text) => text,
                Err(source) => {
                    debug!("dropping {} symbol with non-text payload", raw.symbology);
                    scan.rejected.push(SymbolTextError {
                        symbology: raw.symbology,
                        source,
                    });
                    continue;
                }
            };

            if self.last_payload() != Some(text.as_str()) {
                info!("found {} barcode: {}", raw.symbology, text);
                self.last = Some((text.clone(), raw.symbology.clone()));
                scan.announced.push(text.clone());
            }

            scan.symbols.push(DecodedSymbol {
                payload: raw.payload,
                text,
                symbology: raw.symbology,
                rect: AxisRect::enclosing(&raw.points),
            });
        }

        scan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted(Vec<RawSymbol>);

    impl SymbolScanner for Scripted {
        fn scan(&mut self, _gray: &GrayImage) -> Vec<RawSymbol> {
            self.0.clone()
        }
    }

    fn raw(payload: &[u8], symbology: Symbology) -> RawSymbol {
        RawSymbol {
            payload: payload.to_vec(),
            symbology,
            points: vec![Point2::new(10.0, 20.0), Point2::new(60.0, 20.0)],
        }
    }

    fn gray() -> GrayImage {
        GrayImage::new(8, 8)
    }

    #[test]
    fn non_text_payload_is_dropped_not_fatal() {
        let mut decoder = SymbolDecoder::with_scanner(
            Scripted(vec![
                raw(&[0xff, 0xfe, 0x00], Symbology::Code128),
                raw(b"OK-42", Symbology::Qr),
            ]),
            SymbolDecoderParams::default(),
        );
        let scan = decoder.decode_gray(&gray());
        assert_eq!(scan.symbols.len(), 1);
        assert_eq!(scan.symbols[0].text, "OK-42");
        assert_eq!(scan.rejected.len(), 1);
        assert_eq!(scan.rejected[0].symbology, Symbology::Code128);
        assert_eq!(scan.symbols[0].rect, AxisRect::new(10, 20, 50, 1));
    }

    #[test]
    fn announces_only_payload_changes() {
        let mut decoder = SymbolDecoder::with_scanner(
            Scripted(vec![raw(b"A", Symbology::Ean13)]),
            SymbolDecoderParams::default(),
        );
        assert_eq!(decoder.decode_gray(&gray()).announced, vec!["A".to_string()]);
        assert!(decoder.decode_gray(&gray()).announced.is_empty());
        assert_eq!(decoder.last_payload(), Some("A"));
        assert_eq!(decoder.last_symbology(), Some(&Symbology::Ean13));

        decoder.scanner.0 = vec![raw(b"B", Symbology::Ean13)];
        assert_eq!(decoder.decode_gray(&gray()).announced, vec!["B".to_string()]);
        decoder.scanner.0 = vec![raw(b"A", Symbology::Ean13)];
        assert_eq!(decoder.decode_gray(&gray()).announced, vec!["A".to_string()]);
    }

    #[test]
    fn format_filter_skips_other_symbologies() {
        let mut decoder = SymbolDecoder::with_scanner(
            Scripted(vec![raw(b"1", Symbology::Qr), raw(b"2", Symbology::Code128)]),
            SymbolDecoderParams {
                formats: vec![Symbology::Code128],
            },
        );
        let scan = decoder.decode_gray(&gray());
        assert_eq!(scan.symbols.len(), 1);
        assert_eq!(scan.symbols[0].symbology, Symbology::Code128);
    }

    #[test]
    fn label_matches_display_format() {
        let sym = DecodedSymbol {
            payload: b"TEST123".to_vec(),
            text: "TEST123".into(),
            symbology: Symbology::Qr,
            rect: AxisRect::default(),
        };
        assert_eq!(sym.label(), "TEST123 (QRCODE)");
    }

    #[test]
    fn unknown_formats_keep_a_name() {
        let s = Symbology::from(&BarcodeFormat::RSS_14);
        assert_eq!(s, Symbology::Other("RSS14".into()));
    }
}
