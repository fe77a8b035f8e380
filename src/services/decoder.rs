use crate::models::{Barcode, BarcodeFormat, ScanError};
use image::{DynamicImage, GrayImage};
use indexmap::IndexSet;
use std::sync::Arc;

/// Frame-to-barcode decoding backend.
///
/// Implementations decode every symbology they support that is accepted by
/// `formats` (see [`BarcodeFormat::accepts`]) and may return duplicates; the
/// [`FrameAnalyzer`] deduplicates. An `Err` means the frame could not be
/// analyzed at all, not that it held no barcode.
#[cfg_attr(test, mockall::automock)]
pub trait BarcodeDecoder: Send + Sync {
    fn decode(&self, frame: &GrayImage, formats: &[BarcodeFormat]) -> Result<Vec<Barcode>, ScanError>;

    /// Symbologies this decoder can produce
    fn supported_formats(&self) -> Vec<BarcodeFormat>;
}

/// QR code decoder backed by `rqrr`
#[derive(Debug, Default, Clone, Copy)]
pub struct QrDecoder;

impl QrDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl BarcodeDecoder for QrDecoder {
    fn decode(&self, frame: &GrayImage, formats: &[BarcodeFormat]) -> Result<Vec<Barcode>, ScanError> {
        if !BarcodeFormat::accepts(formats, BarcodeFormat::QrCode) {
            return Ok(Vec::new());
        }

        let (width, height) = frame.dimensions();
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(width as usize, height as usize, |x, y| {
                frame.get_pixel(x as u32, y as u32).0[0]
            });

        let grids = prepared.detect_grids();
        tracing::trace!("Found {} potential QR grids", grids.len());

        let mut barcodes = Vec::with_capacity(grids.len());
        for grid in grids {
            match grid.decode() {
                Ok((_, content)) => barcodes.push(Barcode::new(content, BarcodeFormat::QrCode)),
                // A finder pattern without a readable grid is not a frame failure
                Err(e) => tracing::debug!("QR grid decode failed: {:?}", e),
            }
        }

        Ok(barcodes)
    }

    fn supported_formats(&self) -> Vec<BarcodeFormat> {
        vec![BarcodeFormat::QrCode]
    }
}

/// Linear and 2D symbologies through `rxing`, QR codes through [`QrDecoder`].
///
/// `rqrr` finds every QR grid in a frame, so QR stays on it; `rxing` covers
/// the rest and only runs when a non-QR format is requested.
#[derive(Debug, Default, Clone, Copy)]
pub struct MultiFormatDecoder {
    qr: QrDecoder,
}

impl MultiFormatDecoder {
    pub fn new() -> Self {
        Self { qr: QrDecoder::new() }
    }

    fn decode_rxing(frame: &GrayImage) -> Vec<rxing::RXingResult> {
        let (width, height) = frame.dimensions();

        match rxing::helpers::detect_multiple_in_luma(frame.as_raw().clone(), width, height) {
            Ok(results) if !results.is_empty() => results,
            // Single reader as a fallback when the multi reader comes back empty
            _ => match rxing::helpers::detect_in_luma(frame.as_raw().clone(), width, height, None) {
                Ok(result) => vec![result],
                Err(e) => {
                    tracing::trace!("No rxing symbol in frame: {}", e);
                    Vec::new()
                }
            },
        }
    }
}

/// Map an `rxing` symbology onto the formats a caller can request
fn format_from_rxing(format: &rxing::BarcodeFormat) -> Option<BarcodeFormat> {
    use rxing::BarcodeFormat as Rx;

    match format {
        Rx::AZTEC => Some(BarcodeFormat::Aztec),
        Rx::CODABAR => Some(BarcodeFormat::Codabar),
        Rx::CODE_39 => Some(BarcodeFormat::Code39),
        Rx::CODE_93 => Some(BarcodeFormat::Code93),
        Rx::CODE_128 => Some(BarcodeFormat::Code128),
        Rx::DATA_MATRIX => Some(BarcodeFormat::DataMatrix),
        Rx::EAN_8 => Some(BarcodeFormat::Ean8),
        Rx::EAN_13 => Some(BarcodeFormat::Ean13),
        Rx::ITF => Some(BarcodeFormat::Itf),
        Rx::PDF_417 => Some(BarcodeFormat::Pdf417),
        Rx::QR_CODE => Some(BarcodeFormat::QrCode),
        Rx::UPC_A => Some(BarcodeFormat::UpcA),
        Rx::UPC_E => Some(BarcodeFormat::UpcE),
        _ => None,
    }
}

impl BarcodeDecoder for MultiFormatDecoder {
    fn decode(&self, frame: &GrayImage, formats: &[BarcodeFormat]) -> Result<Vec<Barcode>, ScanError> {
        let mut barcodes = self.qr.decode(frame, formats)?;

        let wants_other = formats.is_empty()
            || formats.iter().any(|f| *f != BarcodeFormat::QrCode);
        if !wants_other {
            return Ok(barcodes);
        }

        for result in Self::decode_rxing(frame) {
            match format_from_rxing(result.getBarcodeFormat()) {
                Some(format) if BarcodeFormat::accepts(formats, format) => {
                    barcodes.push(Barcode::new(result.getText(), format));
                }
                Some(format) => tracing::trace!("Skipping unrequested {} symbol", format),
                None => tracing::debug!(
                    "Skipping unsupported symbology {:?}",
                    result.getBarcodeFormat()
                ),
            }
        }

        Ok(barcodes)
    }

    fn supported_formats(&self) -> Vec<BarcodeFormat> {
        vec![
            BarcodeFormat::Code128,
            BarcodeFormat::Code39,
            BarcodeFormat::Code93,
            BarcodeFormat::Codabar,
            BarcodeFormat::Ean13,
            BarcodeFormat::Ean8,
            BarcodeFormat::Itf,
            BarcodeFormat::UpcA,
            BarcodeFormat::UpcE,
            BarcodeFormat::QrCode,
            BarcodeFormat::Pdf417,
            BarcodeFormat::Aztec,
            BarcodeFormat::DataMatrix,
        ]
    }
}

/// Runs a [`BarcodeDecoder`] over camera frames for one scanning session.
///
/// Converts frames to greyscale, restricts results to the requested formats
/// and deduplicates by value, keeping first-seen order.
#[derive(Clone)]
pub struct FrameAnalyzer {
    decoder: Arc<dyn BarcodeDecoder>,
    formats: Vec<BarcodeFormat>,
}

impl FrameAnalyzer {
    pub fn new(decoder: Arc<dyn BarcodeDecoder>, formats: Vec<BarcodeFormat>) -> Self {
        let supported = decoder.supported_formats();
        let unsupported: Vec<_> = formats
            .iter()
            .filter(|f| **f != BarcodeFormat::All && !supported.contains(f))
            .collect();
        if !unsupported.is_empty() {
            tracing::warn!(
                "Decoder cannot produce requested formats {:?}; they will never match",
                unsupported
            );
        }

        Self { decoder, formats }
    }

    /// Analyzer with the default decoder for every supported symbology
    pub fn standard(formats: Vec<BarcodeFormat>) -> Self {
        Self::new(Arc::new(MultiFormatDecoder::new()), formats)
    }

    pub fn formats(&self) -> &[BarcodeFormat] {
        &self.formats
    }

    /// Decode one frame into a deduplicated batch.
    pub fn analyze(&self, frame: &DynamicImage) -> Result<Vec<Barcode>, ScanError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(ScanError::Analyzer(format!(
                "empty frame ({}x{})",
                frame.width(),
                frame.height()
            )));
        }

        self.analyze_luma(&frame.to_luma8())
    }

    /// Decode a frame that is already greyscale.
    pub fn analyze_luma(&self, frame: &GrayImage) -> Result<Vec<Barcode>, ScanError> {
        let decoded = self.decoder.decode(frame, &self.formats)?;

        let unique: IndexSet<Barcode> = decoded
            .into_iter()
            .filter(|b| BarcodeFormat::accepts(&self.formats, b.format))
            .collect();

        Ok(unique.into_iter().collect())
    }
}

impl std::fmt::Debug for FrameAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameAnalyzer")
            .field("formats", &self.formats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_frame() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 64, image::Luma([255u8])))
    }

    #[test]
    fn test_qr_decoder_blank_frame() {
        let decoder = QrDecoder::new();
        let frame = GrayImage::from_pixel(64, 64, image::Luma([255u8]));

        let result = decoder.decode(&frame, &[BarcodeFormat::QrCode]).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_qr_decoder_skips_when_qr_not_requested() {
        let decoder = QrDecoder::new();
        let frame = GrayImage::from_pixel(8, 8, image::Luma([0u8]));

        let result = decoder.decode(&frame, &[BarcodeFormat::Ean13]).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_rxing_formats_map_onto_requestable_formats() {
        assert_eq!(
            format_from_rxing(&rxing::BarcodeFormat::EAN_13),
            Some(BarcodeFormat::Ean13)
        );
        assert_eq!(
            format_from_rxing(&rxing::BarcodeFormat::DATA_MATRIX),
            Some(BarcodeFormat::DataMatrix)
        );
        assert_eq!(format_from_rxing(&rxing::BarcodeFormat::MAXICODE), None);
    }

    #[test]
    fn test_multi_format_decoder_supports_every_format() {
        let supported = MultiFormatDecoder::new().supported_formats();

        assert_eq!(supported.len(), 13);
        assert!(!supported.contains(&BarcodeFormat::All));
    }

    #[test]
    fn test_multi_format_decoder_blank_frame() {
        let decoder = MultiFormatDecoder::new();
        let frame = GrayImage::from_pixel(64, 64, image::Luma([255u8]));

        assert!(decoder.decode(&frame, &[BarcodeFormat::All]).unwrap().is_empty());
    }

    #[test]
    fn test_analyzer_deduplicates_and_filters() {
        let mut decoder = MockBarcodeDecoder::new();
        decoder
            .expect_supported_formats()
            .returning(|| vec![BarcodeFormat::QrCode, BarcodeFormat::Ean13]);
        decoder.expect_decode().returning(|_, _| {
            Ok(vec![
                Barcode::new("a", BarcodeFormat::QrCode),
                Barcode::new("4006381333931", BarcodeFormat::Ean13),
                Barcode::new("a", BarcodeFormat::QrCode),
            ])
        });

        let analyzer = FrameAnalyzer::new(Arc::new(decoder), vec![BarcodeFormat::QrCode]);
        let batch = analyzer.analyze(&blank_frame()).unwrap();

        assert_eq!(batch, vec![Barcode::new("a", BarcodeFormat::QrCode)]);
    }

    #[test]
    fn test_analyzer_propagates_decoder_error() {
        let mut decoder = MockBarcodeDecoder::new();
        decoder
            .expect_supported_formats()
            .returning(|| vec![BarcodeFormat::QrCode]);
        decoder
            .expect_decode()
            .returning(|_, _| Err(ScanError::Analyzer("corrupt buffer".into())));

        let analyzer = FrameAnalyzer::new(Arc::new(decoder), vec![BarcodeFormat::All]);
        let err = analyzer.analyze(&blank_frame()).unwrap_err();

        assert_eq!(err, ScanError::Analyzer("corrupt buffer".into()));
    }

    #[test]
    fn test_analyzer_rejects_empty_frame() {
        let analyzer = FrameAnalyzer::standard(vec![BarcodeFormat::QrCode]);
        let frame = DynamicImage::new_luma8(0, 0);

        assert!(matches!(analyzer.analyze(&frame), Err(ScanError::Analyzer(_))));
    }
}
