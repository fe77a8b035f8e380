use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Barcode symbology a caller can ask the scanner to accept.
///
/// `All` is a wildcard: a requested list containing it accepts every
/// symbology the decoder can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarcodeFormat {
    All,
    Code128,
    Code39,
    Code93,
    Codabar,
    Ean13,
    Ean8,
    Itf,
    UpcA,
    UpcE,
    QrCode,
    Pdf417,
    Aztec,
    DataMatrix,
}

impl BarcodeFormat {
    /// Human-readable name shown in the selection sheet.
    pub fn display_name(&self) -> &'static str {
        match self {
            BarcodeFormat::All => "Any",
            BarcodeFormat::Code128 => "Code 128",
            BarcodeFormat::Code39 => "Code 39",
            BarcodeFormat::Code93 => "Code 93",
            BarcodeFormat::Codabar => "Codabar",
            BarcodeFormat::Ean13 => "EAN-13",
            BarcodeFormat::Ean8 => "EAN-8",
            BarcodeFormat::Itf => "ITF",
            BarcodeFormat::UpcA => "UPC-A",
            BarcodeFormat::UpcE => "UPC-E",
            BarcodeFormat::QrCode => "QR Code",
            BarcodeFormat::Pdf417 => "PDF417",
            BarcodeFormat::Aztec => "Aztec",
            BarcodeFormat::DataMatrix => "Data Matrix",
        }
    }

    /// Check whether `format` is accepted by the `requested` list.
    ///
    /// An empty list accepts everything, same as a list containing [`BarcodeFormat::All`].
    pub fn accepts(requested: &[BarcodeFormat], format: BarcodeFormat) -> bool {
        requested.is_empty()
            || requested
                .iter()
                .any(|f| *f == BarcodeFormat::All || *f == format)
    }
}

impl fmt::Display for BarcodeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A decoded barcode: payload plus the symbology it was read from.
///
/// Two barcodes are the same when both payload and format match, which is
/// what collapses duplicates inside a frame and across frames.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Barcode {
    pub data: String,
    pub format: BarcodeFormat,
}

impl Barcode {
    pub fn new(data: impl Into<String>, format: BarcodeFormat) -> Self {
        Self {
            data: data.into(),
            format,
        }
    }
}

impl fmt::Display for Barcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.data, self.format)
    }
}

/// Errors surfaced to the caller through [`BarcodeResult::Failed`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
    #[error("Failed to bind camera: {0}")]
    CameraBind(String),

    #[error("Frame capture failed: {0}")]
    Capture(String),

    #[error("Frame analysis failed: {0}")]
    Analyzer(String),
}

/// Outcome delivered to the caller's result callback
#[derive(Debug, Clone, PartialEq)]
pub enum BarcodeResult {
    Success(Barcode),
    Failed(ScanError),
    Canceled,
}

impl BarcodeResult {
    pub fn kind(&self) -> ResultKind {
        match self {
            BarcodeResult::Success(_) => ResultKind::Success,
            BarcodeResult::Failed(_) => ResultKind::Failed,
            BarcodeResult::Canceled => ResultKind::Canceled,
        }
    }

    /// Failed and Canceled end the session; Success leaves it to the host.
    pub fn ends_session(&self) -> bool {
        !matches!(self, BarcodeResult::Success(_))
    }
}

/// Payload-free tag of a [`BarcodeResult`], cheap to broadcast
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultKind {
    Success,
    Failed,
    Canceled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_barcode_equality_by_payload_and_format() {
        let a = Barcode::new("123", BarcodeFormat::QrCode);
        let b = Barcode::new("123", BarcodeFormat::QrCode);
        let c = Barcode::new("123", BarcodeFormat::Ean13);

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_accepts_specific_formats() {
        let requested = [BarcodeFormat::QrCode, BarcodeFormat::Ean13];

        assert!(BarcodeFormat::accepts(&requested, BarcodeFormat::QrCode));
        assert!(BarcodeFormat::accepts(&requested, BarcodeFormat::Ean13));
        assert!(!BarcodeFormat::accepts(&requested, BarcodeFormat::Code128));
    }

    #[test]
    fn test_accepts_wildcard_and_empty() {
        assert!(BarcodeFormat::accepts(&[BarcodeFormat::All], BarcodeFormat::Aztec));
        assert!(BarcodeFormat::accepts(&[], BarcodeFormat::Pdf417));
    }

    #[test]
    fn test_format_serde_names() {
        let yaml = serde_yaml_ng::to_string(&vec![BarcodeFormat::QrCode, BarcodeFormat::UpcA])
            .unwrap();
        assert!(yaml.contains("qr_code"));
        assert!(yaml.contains("upc_a"));

        let parsed: Vec<BarcodeFormat> = serde_yaml_ng::from_str("[ean13, data_matrix]").unwrap();
        assert_eq!(parsed, vec![BarcodeFormat::Ean13, BarcodeFormat::DataMatrix]);
    }

    #[test]
    fn test_result_kind_and_termination() {
        let ok = BarcodeResult::Success(Barcode::new("x", BarcodeFormat::QrCode));
        let failed = BarcodeResult::Failed(ScanError::Analyzer("bad frame".into()));

        assert_eq!(ok.kind(), ResultKind::Success);
        assert!(!ok.ends_session());
        assert!(failed.ends_session());
        assert!(BarcodeResult::Canceled.ends_session());
    }

    #[test]
    fn test_error_messages() {
        let err = ScanError::CameraBind("no device".into());
        assert_eq!(err.to_string(), "Failed to bind camera: no device");
    }
}
