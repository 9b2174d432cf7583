//! Baud rate divisor encoding.
//!
//! The FT231X derives its bit clock from a 3 MHz base (48 MHz / 16). The
//! divisor is a 14-bit integer part plus a 3-bit fraction in eighths. The
//! fraction is not sent as-is: its eight values are scattered over bits
//! 14-15 of `wValue` and bit 0 of `wIndex`.

use crate::error::{Error, Result};
use crate::protocol::{request, ControlRequest};

/// Twice the 24 MHz reference, so integer division keeps one extra bit for
/// round-half-up.
const CLOCK_X2: u32 = 24_000_000 << 1;

/// Highest rate the chip can be asked for.
pub const MAX_BAUD_RATE: u32 = 3_500_000;

/// Requests at or above this rate use the fixed 3 Mbaud divisor.
const FIXED_3M_THRESHOLD: u32 = 2_500_000;

/// Requests at or above this rate (and below 2.5M) use the fixed 2 Mbaud divisor.
const FIXED_2M_THRESHOLD: u32 = 1_750_000;

/// Largest integer divisor that fits the 14-bit field.
const MAX_DIVISOR: u32 = 0x3FFF;

/// Relative deviation at which a request is rejected.
pub const MAX_DEVIATION: f64 = 0.031;

/// Subdivisor (eighths) → (bits 14-15 of value, bit 0 of index)
const SUBDIVISOR_CODES: [(u16, u16); 8] = [
    (0b00, 0), // 0/8
    (0b11, 0), // 1/8
    (0b10, 0), // 2/8
    (0b00, 1), // 3/8
    (0b01, 0), // 4/8
    (0b01, 1), // 5/8
    (0b10, 1), // 6/8
    (0b11, 1), // 7/8
];

/// Result of encoding a requested baud rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaudEncoding {
    /// Integer part of the clock divisor (14 bits)
    pub divisor: u16,
    /// Fractional part of the divisor in eighths
    pub subdivisor: u8,
    /// The rate the chip will actually run at
    pub effective_baud_rate: u32,
    /// `wValue` of the set-baud-rate request
    pub value: u16,
    /// `wIndex` of the set-baud-rate request
    pub index: u16,
}

impl BaudEncoding {
    /// Compute the divisor pair for `baud_rate`.
    pub fn encode(baud_rate: u32) -> Result<Self> {
        if baud_rate == 0 {
            return Err(Error::InvalidArgument(format!(
                "Invalid baud rate: {}",
                baud_rate
            )));
        }

        let (divisor, subdivisor, effective) = if baud_rate > MAX_BAUD_RATE {
            return Err(Error::Unsupported(format!(
                "Baud rate too high: {}",
                baud_rate
            )));
        } else if baud_rate >= FIXED_3M_THRESHOLD {
            (0, 0, 3_000_000)
        } else if baud_rate >= FIXED_2M_THRESHOLD {
            (1, 0, 2_000_000)
        } else {
            let rounded = (CLOCK_X2 / baud_rate + 1) >> 1;
            let subdivisor = rounded & 0x07;
            let divisor = rounded >> 3;
            // Exceeds the 14-bit field below 184 baud
            if divisor > MAX_DIVISOR {
                return Err(Error::Unsupported(format!(
                    "Baud rate too low: {}",
                    baud_rate
                )));
            }
            let effective = (CLOCK_X2 / ((divisor << 3) + subdivisor) + 1) >> 1;
            (divisor, subdivisor, effective)
        };

        let deviation = (1.0 - f64::from(effective) / f64::from(baud_rate)).abs();
        if deviation >= MAX_DEVIATION {
            return Err(Error::Unsupported(format!(
                "Baud rate deviation {:.1}% is higher than allowed 3%",
                deviation * 100.0
            )));
        }

        let (high_bits, index) = SUBDIVISOR_CODES[subdivisor as usize];
        let divisor = divisor as u16;

        Ok(Self {
            divisor,
            subdivisor: subdivisor as u8,
            effective_baud_rate: effective,
            value: divisor | (high_bits << 14),
            index,
        })
    }

    /// Relative error between the requested and the achieved rate.
    pub fn deviation_from(&self, requested: u32) -> f64 {
        (1.0 - f64::from(self.effective_baud_rate) / f64::from(requested)).abs()
    }

    /// The set-baud-rate control transfer carrying this encoding.
    pub fn control_request(&self) -> ControlRequest {
        ControlRequest::vendor_out(request::SET_BAUD_RATE, self.value, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_9600_fixture() {
        let enc = BaudEncoding::encode(9600).unwrap();
        assert_eq!(enc.divisor, 312);
        assert_eq!(enc.subdivisor, 4);
        assert_eq!(enc.effective_baud_rate, 9600);
        assert_eq!(enc.value, 0x4138);
        assert_eq!(enc.index, 0);
        assert!(enc.deviation_from(9600) < MAX_DEVIATION);
    }

    #[test_case(184, 16304, 3, 184, 0x3fb0, 1; "lowest representable")]
    #[test_case(300, 10000, 0, 300, 0x2710, 0; "300")]
    #[test_case(1400, 2142, 7, 1400, 0xc85e, 1; "seven eighths")]
    #[test_case(1800, 1666, 5, 1800, 0x4682, 1; "five eighths")]
    #[test_case(14400, 208, 3, 14397, 0x00d0, 1; "three eighths")]
    #[test_case(19200, 156, 2, 19200, 0x809c, 0; "two eighths")]
    #[test_case(38400, 78, 1, 38400, 0xc04e, 0; "one eighth")]
    #[test_case(57600, 52, 1, 57554, 0xc034, 0; "57600")]
    #[test_case(115200, 26, 0, 115385, 0x001a, 0; "115200")]
    #[test_case(1700000, 1, 6, 1714286, 0x8001, 1; "six eighths")]
    #[test_case(921600, 3, 2, 923077, 0x8003, 0; "921600")]
    fn test_divisor_table(
        baud: u32,
        divisor: u16,
        subdivisor: u8,
        effective: u32,
        value: u16,
        index: u16,
    ) {
        let enc = BaudEncoding::encode(baud).unwrap();
        assert_eq!(enc.divisor, divisor);
        assert_eq!(enc.subdivisor, subdivisor);
        assert_eq!(enc.effective_baud_rate, effective);
        assert_eq!(enc.value, value);
        assert_eq!(enc.index, index);
    }

    #[test_case(2_000_000, 1, 2_000_000; "fixed 2M")]
    #[test_case(3_000_000, 0, 3_000_000; "fixed 3M")]
    #[test_case(3_050_000, 0, 3_000_000; "near 3M")]
    fn test_fixed_divisors(baud: u32, value: u16, effective: u32) {
        let enc = BaudEncoding::encode(baud).unwrap();
        assert_eq!(enc.value, value);
        assert_eq!(enc.index, 0);
        assert_eq!(enc.subdivisor, 0);
        assert_eq!(enc.effective_baud_rate, effective);
    }

    #[test]
    fn test_zero_is_invalid() {
        assert!(matches!(
            BaudEncoding::encode(0),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test_case(3_500_001; "just above max")]
    #[test_case(12_000_000; "far above max")]
    #[test_case(u32::MAX; "u32 max")]
    #[test_case(183; "divisor overflow")]
    #[test_case(100; "very low")]
    #[test_case(1; "one baud")]
    #[test_case(3_500_000; "max deviates from 3M")]
    #[test_case(3_100_000; "just over deviation")]
    #[test_case(2_500_000; "fixed 3M too far")]
    #[test_case(1_750_000; "fixed 2M too far")]
    #[test_case(1_454_546; "computed divisor too coarse")]
    fn test_unsupported_rates(baud: u32) {
        assert!(
            matches!(BaudEncoding::encode(baud), Err(Error::Unsupported(_))),
            "{} should be rejected",
            baud
        );
    }

    #[test]
    fn test_deviation_bound_holds_across_range() {
        // Either the achieved rate is within tolerance or the rate is rejected
        for baud in (183..=MAX_BAUD_RATE).step_by(997) {
            match BaudEncoding::encode(baud) {
                Ok(enc) => assert!(
                    enc.deviation_from(baud) < MAX_DEVIATION,
                    "{} encoded with deviation {}",
                    baud,
                    enc.deviation_from(baud)
                ),
                Err(Error::Unsupported(_)) => {}
                Err(e) => panic!("{} failed with unexpected error {}", baud, e),
            }
        }
    }

    #[test]
    fn test_effective_rate_inverts_encoding() {
        for baud in [1200, 4800, 31250, 76800, 250000, 460800] {
            let enc = BaudEncoding::encode(baud).unwrap();
            let eighths = (u32::from(enc.divisor) << 3) + u32::from(enc.subdivisor);
            assert_eq!(enc.effective_baud_rate, (CLOCK_X2 / eighths + 1) >> 1);
        }
    }

    #[test]
    fn test_control_request() {
        let req = BaudEncoding::encode(9600).unwrap().control_request();
        assert_eq!(req, ControlRequest::vendor_out(3, 0x4138, 0));
        assert_eq!(req.request_type, 0x40);
    }
}
