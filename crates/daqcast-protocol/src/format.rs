//! Formatting of one sample into a fixed-width decimal field.
//!
//! A field of width `W` is the sample printed with `W - 4` fractional digits,
//! zero padded on the left to exactly `W` characters. A minus sign takes one
//! of the leading digit slots and the decimal point counts as a character:
//!
//! ```text
//! W = 16     3.14159265  ->  "003.141592650000"
//!           -12.5        ->  "-12.500000000000"
//!             0.0        ->  "000.000000000000"
//! ```
//!
//! Values too large for that layout give up fractional digits first; values
//! too large even with no fractional digits saturate to the widest run of
//! nines. NaN is sent as the sentinel and infinities saturate. Every encoded
//! field is therefore exactly `W` bytes.

use daqcast_core::config::{MAX_MESSAGE_WIDTH, MIN_MESSAGE_WIDTH};
use daqcast_core::Sample;

use crate::error::FrameError;

/// Characters reserved for sign, integer digits and the decimal point.
const RESERVED_CHARS: usize = 4;

/// Fixed-width field layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageFormat {
    width: usize,
}

impl MessageFormat {
    /// Creates a format producing fields of exactly `width` bytes.
    pub fn new(width: usize) -> Result<Self, FrameError> {
        if !(MIN_MESSAGE_WIDTH..=MAX_MESSAGE_WIDTH).contains(&width) {
            return Err(FrameError::InvalidWidth {
                width,
                min: MIN_MESSAGE_WIDTH,
                max: MAX_MESSAGE_WIDTH,
            });
        }
        Ok(Self { width })
    }

    /// Field length in bytes.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Fractional digits used when the value fits.
    pub fn decimals(&self) -> usize {
        self.width - RESERVED_CHARS
    }

    /// Formats a sample into exactly `width` ASCII bytes.
    pub fn encode(&self, sample: Sample) -> Vec<u8> {
        self.encode_str(sample.value()).into_bytes()
    }

    fn encode_str(&self, value: f64) -> String {
        let width = self.width;

        if value.is_nan() {
            return self.encode_str(Sample::SENTINEL.value());
        }
        if value.is_infinite() {
            return self.saturated(value.is_sign_negative());
        }

        let mut decimals = self.decimals();
        loop {
            let text = format!("{value:0width$.decimals$}");
            if text.len() <= width {
                return text;
            }
            if decimals == 0 {
                return self.saturated(value.is_sign_negative());
            }
            decimals -= 1;
        }
    }

    /// Largest magnitude representable in the field, as text.
    fn saturated(&self, negative: bool) -> String {
        if negative {
            format!("-{}", "9".repeat(self.width - 1))
        } else {
            "9".repeat(self.width)
        }
    }

    /// Parses one field back into a sample.
    pub fn decode(&self, field: &[u8]) -> Result<Sample, FrameError> {
        if field.len() != self.width {
            return Err(FrameError::WidthMismatch {
                expected: self.width,
                actual: field.len(),
            });
        }
        if !field.is_ascii() {
            return Err(FrameError::InvalidEncoding);
        }
        let text = std::str::from_utf8(field).map_err(|_| FrameError::InvalidEncoding)?;
        text.trim()
            .parse::<f64>()
            .map(Sample::new)
            .map_err(|_| FrameError::InvalidNumber {
                field: text.to_string(),
            })
    }
}

impl Default for MessageFormat {
    fn default() -> Self {
        Self {
            width: daqcast_core::DEFAULT_MESSAGE_WIDTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(format: &MessageFormat, value: f64) -> String {
        String::from_utf8(format.encode(Sample::new(value))).unwrap()
    }

    #[test]
    fn test_default_layout() {
        let format = MessageFormat::default();
        assert_eq!(format.width(), 16);
        assert_eq!(format.decimals(), 12);
    }

    #[test]
    fn test_known_fields() {
        let format = MessageFormat::default();
        assert_eq!(encode(&format, 3.14159265), "003.141592650000");
        assert_eq!(encode(&format, -12.5), "-12.500000000000");
        assert_eq!(encode(&format, 0.0), "000.000000000000");
        assert_eq!(encode(&format, 1.0), "001.000000000000");
        assert_eq!(encode(&format, -3.0), "-03.000000000000");
    }

    #[test]
    fn test_sentinel_field() {
        let format = MessageFormat::default();
        assert_eq!(format.encode(Sample::SENTINEL), b"000.000000000000");
    }

    #[test]
    fn test_round_trip_known_values() {
        let format = MessageFormat::default();

        let decoded = format.decode(&format.encode(Sample::new(3.14159265))).unwrap();
        assert!((decoded.value() - 3.14159265).abs() < 1e-12);

        let field = format.encode(Sample::new(-12.5));
        assert_eq!(field.len(), 16);
        assert_eq!(field.first(), Some(&b'-'));
        assert_eq!(format.decode(&field).unwrap().value(), -12.5);
    }

    #[test]
    fn test_width_invariant_across_magnitudes() {
        let format = MessageFormat::default();
        let values = [
            0.0,
            -0.0,
            1e-15,
            -1e-15,
            9.9999999999999,
            -99.9999999999999,
            999.9999999999999,
            1234.5,
            -1234.5,
            123_456_789.125,
            1e15,
            -1e15,
            1e300,
            -1e300,
            f64::MAX,
            f64::MIN,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NAN,
        ];

        for value in values {
            let field = format.encode(Sample::new(value));
            assert_eq!(field.len(), 16, "value {value} encoded to {field:?}");
            format.decode(&field).unwrap();
        }
    }

    #[test]
    fn test_large_values_lose_precision_first() {
        let format = MessageFormat::default();
        assert_eq!(encode(&format, 1234.5), "1234.50000000000");
        assert_eq!(encode(&format, -1234.5), "-1234.5000000000");
        assert_eq!(encode(&format, 999.9999999999999), "1000.00000000000");
    }

    #[test]
    fn test_out_of_range_values_saturate() {
        let format = MessageFormat::default();
        assert_eq!(encode(&format, 1e20), "9999999999999999");
        assert_eq!(encode(&format, -1e20), "-999999999999999");
        assert_eq!(encode(&format, f64::INFINITY), "9999999999999999");
        assert_eq!(encode(&format, f64::NEG_INFINITY), "-999999999999999");
    }

    #[test]
    fn test_nan_encodes_as_sentinel() {
        let format = MessageFormat::default();
        assert_eq!(encode(&format, f64::NAN), "000.000000000000");
    }

    #[test]
    fn test_other_widths() {
        let narrow = MessageFormat::new(4).unwrap();
        assert_eq!(narrow.decimals(), 0);
        assert_eq!(encode(&narrow, 3.4), "0003");
        assert_eq!(encode(&narrow, -3.4), "-003");

        let wide = MessageFormat::new(20).unwrap();
        assert_eq!(encode(&wide, 2.5), "002.5000000000000000");
    }

    #[test]
    fn test_invalid_widths() {
        assert!(matches!(
            MessageFormat::new(3),
            Err(FrameError::InvalidWidth { width: 3, .. })
        ));
        assert!(MessageFormat::new(65).is_err());
    }

    #[test]
    fn test_decode_errors() {
        let format = MessageFormat::default();

        assert!(matches!(
            format.decode(b"001.5"),
            Err(FrameError::WidthMismatch {
                expected: 16,
                actual: 5
            })
        ));
        assert!(matches!(
            format.decode(b"abcdefghijklmnop"),
            Err(FrameError::InvalidNumber { .. })
        ));
        assert!(matches!(
            format.decode("00\u{e9}.00000000000".as_bytes()),
            Err(FrameError::InvalidEncoding)
        ));
    }
}
