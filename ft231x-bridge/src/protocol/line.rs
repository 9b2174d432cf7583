//! Line control (data bits, parity, stop bits) encoding.
//!
//! The set-data request packs the whole UART frame format into `wValue`:
//!
//! ```text
//!  15 14 13 | 12 11 | 10  9  8 | 7 .. 0
//!  -------- | stop  | parity   | data bits
//! ```

use bitvec::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{Error, Result};
use crate::protocol::{request, ControlRequest, PORT_INDEX};

/// Parity mode. The discriminant is the value of the parity field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
#[repr(u16)]
pub enum Parity {
    #[default]
    None = 0,
    Odd = 1,
    Even = 2,
    Mark = 3,
    Space = 4,
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
pub enum StopBits {
    #[default]
    #[strum(serialize = "1")]
    #[serde(rename = "1")]
    One,
    #[strum(serialize = "1.5")]
    #[serde(rename = "1.5")]
    OnePointFive,
    #[strum(serialize = "2")]
    #[serde(rename = "2")]
    Two,
}

struct LineWordBuilder {
    word: u16,
}

impl LineWordBuilder {
    fn new() -> Self {
        Self { word: 0 }
    }

    fn with_data_bits(mut self, data_bits: u8) -> Result<Self> {
        match data_bits {
            7 | 8 => {
                let view = self.word.view_bits_mut::<Lsb0>();
                view[0..8].store(data_bits);
                Ok(self)
            }
            5 | 6 => Err(Error::Unsupported(format!(
                "Unsupported data bits: {}",
                data_bits
            ))),
            _ => Err(Error::InvalidArgument(format!(
                "Invalid data bits: {}",
                data_bits
            ))),
        }
    }

    fn with_parity(mut self, parity: Parity) -> Self {
        let view = self.word.view_bits_mut::<Lsb0>();
        view[8..11].store(parity as u16);
        self
    }

    fn with_stop_bits(mut self, stop_bits: StopBits) -> Result<Self> {
        let code: u16 = match stop_bits {
            StopBits::One => 0,
            StopBits::Two => 2,
            StopBits::OnePointFive => {
                return Err(Error::Unsupported("Unsupported stop bits: 1.5".into()))
            }
        };
        let view = self.word.view_bits_mut::<Lsb0>();
        view[11..13].store(code);
        Ok(self)
    }

    fn build(self) -> u16 {
        self.word
    }
}

/// Encode a frame format into the set-data configuration word.
pub fn encode(data_bits: u8, parity: Parity, stop_bits: StopBits) -> Result<u16> {
    Ok(LineWordBuilder::new()
        .with_data_bits(data_bits)?
        .with_parity(parity)
        .with_stop_bits(stop_bits)?
        .build())
}

/// The set-data control transfer carrying `word`.
pub fn control_request(word: u16) -> ControlRequest {
    ControlRequest::vendor_out(request::SET_DATA, word, PORT_INDEX)
}
