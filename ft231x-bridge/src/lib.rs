//! Protocol core of a USB-to-serial bridge driver for the FTDI FT231X.
//!
//! The crate turns a [`PortConfig`] into the vendor control transfers the
//! chip expects, runs the open/configure/close lifecycle of the USB
//! connection, and frames bulk reads and writes, stripping the status prefix
//! the chip puts in front of every inbound packet.
//!
//! USB access itself is a capability of the host platform, described by the
//! traits in [`transport`]. With the `usb` feature, [`transport::usb`]
//! provides an implementation on top of `nusb`.

pub mod config;
pub mod error;
pub mod port;
pub mod protocol;
pub mod tracing;
pub mod transport;

pub use config::{BridgeConfig, PortConfig, TransferOptions};
pub use error::{Error, Result};
pub use port::{EndpointPair, PortStatus, ReadResult, SerialPort};
pub use protocol::{BaudEncoding, ModemStatus, Parity, StopBits};
