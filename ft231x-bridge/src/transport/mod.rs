//! Physical transport boundary.
//!
//! The port core never talks to a USB stack directly. Permission, device
//! open/claim/close and the control and bulk transfer primitives are
//! capabilities supplied by the host platform through the traits below.

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::time::Duration;

use crate::protocol::ControlRequest;

#[cfg(test)]
pub(crate) mod mock;

#[cfg_attr(not(feature = "usb"), allow(dead_code))]
pub(crate) mod packet;

#[cfg(feature = "usb")]
pub mod usb;

/// Identity of a USB device selected by the host's enumerator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDeviceInfo {
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial_number: Option<String>,
    pub bus_id: String,
    pub device_address: u8,
}

impl fmt::Display for UsbDeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:04x} at {}:{}",
            self.vendor_id, self.product_id, self.bus_id, self.device_address
        )
    }
}

/// Direction of an endpoint, from the host's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointDirection {
    In,
    Out,
}

impl fmt::Display for EndpointDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointDirection::In => write!(f, "IN"),
            EndpointDirection::Out => write!(f, "OUT"),
        }
    }
}

/// USB transfer type of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

/// One endpoint of the claimed interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub address: u8,
    pub transfer_type: TransferType,
    pub max_packet_size: usize,
}

impl EndpointDescriptor {
    pub fn new(address: u8, transfer_type: TransferType, max_packet_size: usize) -> Self {
        Self {
            address,
            transfer_type,
            max_packet_size,
        }
    }

    /// Direction encoded in bit 7 of the endpoint address.
    pub fn direction(&self) -> EndpointDirection {
        if self.address & 0x80 != 0 {
            EndpointDirection::In
        } else {
            EndpointDirection::Out
        }
    }
}

/// Grants or denies access to a device, possibly after asking the user.
#[async_trait]
pub trait AccessBroker: Send + Sync {
    /// Suspend until access is granted (`true`) or denied (`false`).
    async fn request_access(&self, device: &UsbDeviceInfo) -> bool;
}

/// Broker for hosts without a permission model (desktop Linux/macOS/Windows,
/// where access is decided by file permissions at open time).
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysGranted;

#[async_trait]
impl AccessBroker for AlwaysGranted {
    async fn request_access(&self, _device: &UsbDeviceInfo) -> bool {
        true
    }
}

/// Opens connections to devices.
pub trait UsbHost: Send + Sync {
    type Connection: UsbConnection;

    /// Open `device`, or `None` if the host cannot provide a handle.
    fn open(&self, device: &UsbDeviceInfo) -> Option<Self::Connection>;
}

/// An open connection to one device.
///
/// Transfers take `&self` so that a read and a write can be in flight at the
/// same time. Implementations must tolerate that, but callers serialize
/// transfers on the same endpoint.
#[async_trait]
pub trait UsbConnection: Send + Sync + 'static {
    /// Claim `interface`; `force` detaches any kernel driver holding it.
    fn claim_interface(&mut self, interface: u8, force: bool) -> io::Result<()>;

    /// Endpoints of `interface` in descriptor order.
    fn endpoints(&self, interface: u8) -> Vec<EndpointDescriptor>;

    /// Issue a control OUT transfer without data phase.
    ///
    /// Returns the transport's result code; anything other than `0` is a
    /// failure.
    fn control_out(&self, request: &ControlRequest, timeout: Duration) -> io::Result<usize>;

    /// Bulk IN transfer into `buf`. Returns the number of bytes received.
    ///
    /// A transfer that times out must fail with [`io::ErrorKind::TimedOut`].
    async fn bulk_in(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Bulk OUT transfer of `data`. Returns the number of bytes sent.
    async fn bulk_out(&self, endpoint: u8, data: &[u8], timeout: Duration) -> io::Result<usize>;

    /// Release the interface and close the connection.
    fn close(self)
    where
        Self: Sized;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_direction_from_address() {
        let ep_in = EndpointDescriptor::new(0x81, TransferType::Bulk, 64);
        let ep_out = EndpointDescriptor::new(0x02, TransferType::Bulk, 64);
        assert_eq!(ep_in.direction(), EndpointDirection::In);
        assert_eq!(ep_out.direction(), EndpointDirection::Out);
    }

    #[test]
    fn test_device_display() {
        let dev = UsbDeviceInfo {
            vendor_id: 0x0403,
            product_id: 0x6015,
            serial_number: None,
            bus_id: "1".into(),
            device_address: 7,
        };
        assert_eq!(dev.to_string(), "0403:6015 at 1:7");
    }

    #[tokio::test]
    async fn test_always_granted() {
        let dev = mock::device();
        assert!(AlwaysGranted.request_access(&dev).await);
    }
}
