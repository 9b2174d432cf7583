//! FT231X vendor control protocol.
//!
//! The chip is configured entirely through vendor control transfers with a
//! zero-length data phase. Each request carries its payload in the `value`
//! and `index` fields of the setup packet.

pub mod baud;
pub mod line;
pub mod status;

pub use baud::BaudEncoding;
pub use line::{Parity, StopBits};
pub use status::ModemStatus;

/// FTDI vendor ID
pub const FTDI_VID: u16 = 0x0403;

/// FT-X series product ID (FT230X, FT231X, FT234XD, ...)
pub const FT231X_PID: u16 = 0x6015;

/// The chip exposes a single interface carrying both bulk endpoints.
pub const INTERFACE: u8 = 0;

/// Number of status bytes the chip prepends to every bulk IN transfer.
pub const STATUS_PREFIX_LEN: usize = 2;

/// bmRequestType: host-to-device, vendor, recipient device
pub const REQTYPE_HOST_TO_DEVICE: u8 = 0x40;

/// Vendor request codes
pub mod request {
    pub const RESET: u8 = 0;
    pub const SET_BAUD_RATE: u8 = 3;
    pub const SET_DATA: u8 = 4;
}

/// `value` of a reset request that resets both directions.
pub const RESET_ALL: u16 = 0;

/// `index` used by the reset and set-data requests.
pub const PORT_INDEX: u16 = 1;

/// A vendor OUT control transfer without a data phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequest {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
}

impl ControlRequest {
    /// Host-to-device vendor request.
    pub const fn vendor_out(request: u8, value: u16, index: u16) -> Self {
        Self {
            request_type: REQTYPE_HOST_TO_DEVICE,
            request,
            value,
            index,
        }
    }

    /// Reset both the RX and TX paths of the UART.
    pub const fn reset() -> Self {
        Self::vendor_out(request::RESET, RESET_ALL, PORT_INDEX)
    }

    /// Short name used when tagging transport failures.
    pub fn operation(&self) -> &'static str {
        match self.request {
            request::RESET => "reset",
            request::SET_BAUD_RATE => "set baudrate",
            request::SET_DATA => "set parameters",
            _ => "control transfer",
        }
    }
}
