//! Status prefix of bulk IN transfers.
//!
//! Every bulk IN packet from the chip starts with two bytes: modem line
//! states in the first, UART line status in the second. They are not part of
//! the serial payload.

use bitflags::bitflags;

bitflags! {
    /// Decoded status prefix, byte 0 in the low half, byte 1 in the high half.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ModemStatus: u16 {
        /// Clear To Send
        const CTS = 0x0010;
        /// Data Set Ready
        const DSR = 0x0020;
        /// Ring Indicator
        const RI = 0x0040;
        /// Receive Line Signal Detect (DCD)
        const RLSD = 0x0080;
        /// Data Ready
        const DATA_READY = 0x0100;
        /// Overrun Error
        const OVERRUN = 0x0200;
        /// Parity Error
        const PARITY = 0x0400;
        /// Framing Error
        const FRAMING = 0x0800;
        /// Break Interrupt
        const BREAK = 0x1000;
        /// Transmitter Holding Register empty
        const THR_EMPTY = 0x2000;
        /// Transmitter empty
        const TX_EMPTY = 0x4000;
        /// Error in RX FIFO
        const FIFO_ERROR = 0x8000;

        /// Receive-side conditions that indicate lost or corrupted data
        const LINE_ERRORS = Self::OVERRUN.bits()
            | Self::PARITY.bits()
            | Self::FRAMING.bits()
            | Self::BREAK.bits();
    }
}

impl ModemStatus {
    /// Decode the first two bytes of a bulk IN transfer.
    ///
    /// Returns `None` if the transfer is shorter than the prefix.
    pub fn from_prefix(packet: &[u8]) -> Option<Self> {
        match packet {
            [modem, line, ..] => Some(Self::from_bits_retain(
                u16::from(*modem) | u16::from(*line) << 8,
            )),
            _ => None,
        }
    }

    /// Line errors reported in this status, if any.
    pub fn line_errors(self) -> Self {
        self & Self::LINE_ERRORS
    }
}
