//! Barcode localization and symbol decoding.
//!
//! Two independent detectors live here:
//! - [`GradientBarcodeLocator`]: a classical gradient/morphology heuristic
//!   that finds the rotated box around the densest striped region of a
//!   frame, without decoding anything;
//! - [`SymbolDecoder`]: decodes 1D/2D symbols (QR, Code128, EAN, ...) through
//!   a pluggable [`SymbolScanner`] backend and remembers the last payload it
//!   announced.

mod locator;
mod symbols;

pub use locator::{GradientBarcodeLocator, LocatorParams};
pub use symbols::{
    DecodedSymbol, RawSymbol, RxingScanner, SymbolDecoder, SymbolDecoderParams, SymbolScan,
    SymbolScanner, SymbolTextError, Symbology,
};
