//! Host adapter backed by the `nusb` crate.
//!
//! Gives direct, driverless access to the chip on Linux, macOS and Windows.
//! There is no permission dialog on these platforms, so pair it with
//! [`AlwaysGranted`](super::AlwaysGranted); access failures show up as a
//! failed open instead.

use async_trait::async_trait;
use nusb::descriptors::TransferType as NusbTransferType;
use nusb::transfer::{Buffer, Bulk, ControlOut, ControlType, In, Out, Recipient};
use nusb::MaybeFuture;
use std::io;
use std::time::Duration;
use tokio::sync::Mutex;

use super::packet::PacketSplitter;
use super::{EndpointDescriptor, TransferType, UsbConnection, UsbDeviceInfo, UsbHost};
use crate::config::DeviceSelector;
use crate::error::{Error, Result};
use crate::protocol::{ControlRequest, REQTYPE_HOST_TO_DEVICE, STATUS_PREFIX_LEN};
use crate::tracing::prelude::*;

/// Full-speed bulk packet size, used when the descriptor cannot be read.
const DEFAULT_MAX_PACKET_SIZE: usize = 64;

fn device_info(dev: &nusb::DeviceInfo) -> UsbDeviceInfo {
    UsbDeviceInfo {
        vendor_id: dev.vendor_id(),
        product_id: dev.product_id(),
        serial_number: dev.serial_number().map(|s| s.to_string()),
        bus_id: dev.bus_id().to_string(),
        device_address: dev.device_address(),
    }
}

/// List attached devices matching `selector`.
pub fn list_devices(selector: &DeviceSelector) -> Result<Vec<UsbDeviceInfo>> {
    let devices = nusb::list_devices()
        .wait()
        .map_err(|e| Error::io("list devices", io::Error::other(e)))?
        .filter(|dev| {
            dev.vendor_id() == selector.vendor_id && dev.product_id() == selector.product_id
        })
        .filter(|dev| match &selector.serial_number {
            Some(serial) => dev.serial_number() == Some(serial.as_str()),
            None => true,
        })
        .map(|dev| device_info(&dev))
        .collect();
    Ok(devices)
}

/// First attached device matching `selector`.
pub fn find_device(selector: &DeviceSelector) -> Result<UsbDeviceInfo> {
    list_devices(selector)?
        .into_iter()
        .next()
        .ok_or(Error::ConnectFailed)
}

/// Opens devices through `nusb`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NusbHost;

impl UsbHost for NusbHost {
    type Connection = NusbConnection;

    fn open(&self, device: &UsbDeviceInfo) -> Option<NusbConnection> {
        let found = nusb::list_devices()
            .wait()
            .map_err(|e| warn!(error = %e, "Failed to list USB devices"))
            .ok()?
            .find(|dev| {
                dev.bus_id() == device.bus_id
                    && dev.device_address() == device.device_address
                    && dev.vendor_id() == device.vendor_id
                    && dev.product_id() == device.product_id
            });
        let Some(found) = found else {
            warn!(device = %device, "Device is no longer attached");
            return None;
        };

        match found.open().wait() {
            Ok(device) => Some(NusbConnection {
                device,
                interface: None,
                splitter: Mutex::new(PacketSplitter::default()),
            }),
            Err(e) => {
                warn!(device = %device, error = %e, "Failed to open device");
                None
            }
        }
    }
}

/// An open `nusb` device and its claimed interface.
pub struct NusbConnection {
    device: nusb::Device,
    interface: Option<nusb::Interface>,
    // Payload of the last packet that did not fit the caller's buffer
    splitter: Mutex<PacketSplitter>,
}

impl NusbConnection {
    fn interface(&self) -> io::Result<&nusb::Interface> {
        self.interface
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "interface not claimed"))
    }
}

#[async_trait]
impl UsbConnection for NusbConnection {
    fn claim_interface(&mut self, interface: u8, force: bool) -> io::Result<()> {
        let claimed = if force {
            self.device.detach_and_claim_interface(interface).wait()
        } else {
            self.device.claim_interface(interface).wait()
        };
        self.interface = Some(claimed.map_err(io::Error::other)?);
        Ok(())
    }

    fn endpoints(&self, interface: u8) -> Vec<EndpointDescriptor> {
        let config = match self.device.active_configuration() {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Failed to read configuration descriptor");
                return Vec::new();
            }
        };

        config
            .interface_alt_settings()
            .filter(|alt| alt.interface_number() == interface && alt.alternate_setting() == 0)
            .flat_map(|alt| {
                alt.endpoints()
                    .map(|ep| {
                        let transfer_type = match ep.transfer_type() {
                            NusbTransferType::Control => TransferType::Control,
                            NusbTransferType::Isochronous => TransferType::Isochronous,
                            NusbTransferType::Bulk => TransferType::Bulk,
                            NusbTransferType::Interrupt => TransferType::Interrupt,
                        };
                        EndpointDescriptor::new(ep.address(), transfer_type, ep.max_packet_size())
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn control_out(&self, request: &ControlRequest, timeout: Duration) -> io::Result<usize> {
        debug_assert_eq!(request.request_type, REQTYPE_HOST_TO_DEVICE);
        self.interface()?
            .control_out(
                ControlOut {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request: request.request,
                    value: request.value,
                    index: request.index,
                    data: &[],
                },
                timeout,
            )
            .wait()
            .map_err(io::Error::other)?;
        Ok(0)
    }

    async fn bulk_in(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        if buf.len() <= STATUS_PREFIX_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "bulk IN buffer cannot hold data after the status prefix",
            ));
        }

        let mut splitter = self.splitter.lock().await;
        if splitter.pending() > 0 {
            return Ok(splitter.take(buf));
        }

        let mut ep = self
            .interface()?
            .endpoint::<Bulk, In>(endpoint)
            .map_err(io::Error::other)?;

        // One packet per request: every packet carries its own status prefix
        let packet_size = match ep.max_packet_size() {
            0 => DEFAULT_MAX_PACKET_SIZE,
            n => n,
        };
        ep.submit(ep.allocate(packet_size));

        let completion = match tokio::time::timeout(timeout, ep.next_complete()).await {
            Ok(completion) => completion,
            Err(_) => {
                ep.cancel_all();
                let _ = ep.next_complete().await;
                return Err(io::Error::new(io::ErrorKind::TimedOut, "bulk IN timed out"));
            }
        };
        completion.status.map_err(io::Error::other)?;

        let packet = &completion.buffer[..completion.actual_len];
        let n = splitter.accept(packet, buf);
        if splitter.pending() > 0 {
            trace!(endpoint, pending = splitter.pending(), "Holding rest of packet");
        }
        Ok(n)
    }

    async fn bulk_out(&self, endpoint: u8, data: &[u8], timeout: Duration) -> io::Result<usize> {
        let mut ep = self
            .interface()?
            .endpoint::<Bulk, Out>(endpoint)
            .map_err(io::Error::other)?;

        let mut buffer = Buffer::new(data.len());
        buffer.extend_from_slice(data);
        ep.submit(buffer);

        let completion = match tokio::time::timeout(timeout, ep.next_complete()).await {
            Ok(completion) => completion,
            Err(_) => {
                ep.cancel_all();
                let _ = ep.next_complete().await;
                return Err(io::Error::new(io::ErrorKind::TimedOut, "bulk OUT timed out"));
            }
        };
        completion.status.map_err(io::Error::other)?;
        Ok(completion.actual_len)
    }

    fn close(self) {
        // Dropping the interface releases it; dropping the device closes it
        drop(self.interface);
        drop(self.device);
    }
}
