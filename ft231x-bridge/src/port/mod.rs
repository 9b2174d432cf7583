//! Serial port lifecycle.
//!
//! [`SerialPort`] drives a device from `Closed` to `Ready`. It gets access from
//! the broker, opens and claims the device, resets the UART, and programs the
//! line format and baud rate. It then discovers the bulk endpoints and hands
//! them to the transfer framer. Any failure along the way closes what was
//! opened and leaves the port `Closed`.

pub mod framer;

pub use framer::ReadResult;

use std::io;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::{PortConfig, TransferOptions};
use crate::error::{Error, Result};
use crate::protocol::{line, BaudEncoding, ControlRequest, INTERFACE};
use crate::tracing::prelude::*;
use crate::transport::{
    AccessBroker, EndpointDescriptor, EndpointDirection, TransferType, UsbConnection,
    UsbDeviceInfo, UsbHost,
};
use framer::TransferFramer;

/// Observable lifecycle phase of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortStatus {
    Closed,
    /// Waiting for access or for the device handle
    Connecting,
    /// Handle acquired, control transfers in progress
    Configuring,
    Ready,
}

// Connecting and Configuring carry no fields: until Ready the connection is
// owned by the open sequence, which closes it on failure.
enum PortState<C> {
    Closed,
    Connecting,
    Configuring,
    Ready(Session<C>),
}

struct Session<C> {
    connection: C,
    framer: TransferFramer,
    endpoints: EndpointPair,
    effective_baud_rate: u32,
}

/// Bulk endpoints of the claimed interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointPair {
    pub bulk_in: EndpointDescriptor,
    pub bulk_out: EndpointDescriptor,
}

impl EndpointPair {
    /// Pick the bulk IN and bulk OUT endpoints from an interface's endpoint
    /// list. The first bulk endpoint of each direction is used.
    pub fn discover(endpoints: &[EndpointDescriptor]) -> Result<Self> {
        let mut bulk_in: Option<EndpointDescriptor> = None;
        let mut bulk_out: Option<EndpointDescriptor> = None;

        for ep in endpoints
            .iter()
            .filter(|ep| ep.transfer_type == TransferType::Bulk)
        {
            let slot = match ep.direction() {
                EndpointDirection::In => &mut bulk_in,
                EndpointDirection::Out => &mut bulk_out,
            };
            match *slot {
                Some(kept) => warn!(
                    kept = %format!("{:#04x}", kept.address),
                    ignored = %format!("{:#04x}", ep.address),
                    "Ignoring additional bulk endpoint"
                ),
                None => *slot = Some(*ep),
            }
        }

        Ok(Self {
            bulk_in: bulk_in.ok_or(Error::EndpointNotFound(EndpointDirection::In))?,
            bulk_out: bulk_out.ok_or(Error::EndpointNotFound(EndpointDirection::Out))?,
        })
    }
}

/// A serial port on one FT231X.
///
/// The frame format is fixed at construction. `open()` must reach
/// [`PortStatus::Ready`] before `read()`/`write()` are used.
pub struct SerialPort<H: UsbHost, B: AccessBroker> {
    host: H,
    broker: B,
    device: UsbDeviceInfo,
    config: PortConfig,
    options: TransferOptions,
    state: PortState<H::Connection>,
}

impl<H: UsbHost, B: AccessBroker> SerialPort<H, B> {
    /// Create a closed port for `device`.
    pub fn new(host: H, broker: B, device: UsbDeviceInfo, config: PortConfig) -> Self {
        Self {
            host,
            broker,
            device,
            config,
            options: TransferOptions::default(),
            state: PortState::Closed,
        }
    }

    /// Replace the transfer timeouts and read poll cap.
    pub fn with_options(mut self, options: TransferOptions) -> Self {
        self.options = options;
        self
    }

    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    pub fn device(&self) -> &UsbDeviceInfo {
        &self.device
    }

    pub fn status(&self) -> PortStatus {
        match self.state {
            PortState::Closed => PortStatus::Closed,
            PortState::Connecting => PortStatus::Connecting,
            PortState::Configuring => PortStatus::Configuring,
            PortState::Ready(_) => PortStatus::Ready,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, PortState::Ready(_))
    }

    /// Rate the chip was programmed with, once the port is ready.
    pub fn effective_baud_rate(&self) -> Result<u32> {
        Ok(self.session()?.effective_baud_rate)
    }

    /// Endpoints discovered for the current session.
    pub fn endpoints(&self) -> Result<EndpointPair> {
        Ok(self.session()?.endpoints)
    }

    /// Open and configure the device.
    ///
    /// If the returned future is dropped before it completes, the port is
    /// left `Closed`.
    pub async fn open(&mut self) -> Result<()> {
        if let PortState::Ready(_) = self.state {
            return Err(Error::AlreadyOpen);
        }

        info!(
            device = %self.device,
            baud = self.config.baud_rate,
            data_bits = self.config.data_bits,
            parity = %self.config.parity,
            stop_bits = %self.config.stop_bits,
            "Opening port."
        );

        let Self {
            host,
            broker,
            device,
            config,
            options,
            state,
        } = self;
        let mut phase = OpenPhase::begin(state);

        match connect(host, broker, device, config, *options, &mut phase).await {
            Ok(session) => {
                info!(
                    device = %device,
                    effective_baud = session.effective_baud_rate,
                    "Port ready."
                );
                phase.finish(session);
                Ok(())
            }
            Err(e) => {
                error!(device = %device, error = %e, "Failed to open port.");
                Err(e)
            }
        }
    }

    /// Release the connection. Safe to call in any state, any number of times.
    pub fn close(&mut self) {
        match std::mem::replace(&mut self.state, PortState::Closed) {
            PortState::Ready(session) => {
                session.connection.close();
                info!(device = %self.device, "Port closed.");
            }
            _ => trace!("Close on a port that is not open."),
        }
    }

    /// Write `data` to the device.
    pub async fn write(&self, data: &[u8], cancel: &CancellationToken) -> Result<usize> {
        let session = self.session()?;
        session.framer.write(&session.connection, data, cancel).await
    }

    /// Read from the device. `count` is the size of the bulk IN request and
    /// includes the 2-byte status prefix, so at most `count - 2` payload bytes
    /// are returned.
    ///
    /// Blocks until the chip delivers data, `cancel` fires, or the poll cap
    /// in [`TransferOptions`] is reached.
    pub async fn read(&self, count: usize, cancel: &CancellationToken) -> Result<ReadResult> {
        let session = self.session()?;
        session.framer.read(&session.connection, count, cancel).await
    }

    fn session(&self) -> Result<&Session<H::Connection>> {
        match &self.state {
            PortState::Ready(session) => Ok(session),
            _ => Err(Error::NotConnected),
        }
    }
}

impl<H: UsbHost, B: AccessBroker> Drop for SerialPort<H, B> {
    fn drop(&mut self) {
        self.close();
    }
}

// Tracks an open sequence in progress. Unless it reaches `Ready`, the port
// goes back to `Closed` when this is dropped, which also covers an `open()`
// future dropped while waiting for access.
struct OpenPhase<'a, C> {
    state: &'a mut PortState<C>,
}

impl<'a, C> OpenPhase<'a, C> {
    fn begin(state: &'a mut PortState<C>) -> Self {
        *state = PortState::Connecting;
        Self { state }
    }

    fn configuring(&mut self) {
        *self.state = PortState::Configuring;
    }

    fn finish(self, session: Session<C>) {
        *self.state = PortState::Ready(session);
    }
}

impl<C> Drop for OpenPhase<'_, C> {
    fn drop(&mut self) {
        if !matches!(self.state, PortState::Ready(_)) {
            *self.state = PortState::Closed;
        }
    }
}

async fn connect<H: UsbHost, B: AccessBroker>(
    host: &H,
    broker: &B,
    device: &UsbDeviceInfo,
    config: &PortConfig,
    options: TransferOptions,
    phase: &mut OpenPhase<'_, H::Connection>,
) -> Result<Session<H::Connection>> {
    if !broker.request_access(device).await {
        return Err(Error::PermissionDenied);
    }

    let mut connection = host.open(device).ok_or(Error::ConnectFailed)?;

    phase.configuring();
    match configure(&mut connection, config, &options) {
        Ok((endpoints, effective_baud_rate)) => Ok(Session {
            framer: TransferFramer::new(endpoints, options),
            connection,
            endpoints,
            effective_baud_rate,
        }),
        Err(e) => {
            connection.close();
            Err(e)
        }
    }
}

fn configure<C: UsbConnection>(
    connection: &mut C,
    config: &PortConfig,
    options: &TransferOptions,
) -> Result<(EndpointPair, u32)> {
    connection
        .claim_interface(INTERFACE, true)
        .map_err(|e| Error::io("claim interface", e))?;

    let timeout = options.control_timeout();
    send_control(connection, &ControlRequest::reset(), timeout)?;

    // Validate everything before programming anything
    let line_word = line::encode(config.data_bits, config.parity, config.stop_bits)?;
    let baud = BaudEncoding::encode(config.baud_rate)?;

    send_control(connection, &baud.control_request(), timeout)?;
    send_control(connection, &line::control_request(line_word), timeout)?;

    let endpoints = EndpointPair::discover(&connection.endpoints(INTERFACE))?;
    debug!(
        bulk_in = %format!("{:#04x}", endpoints.bulk_in.address),
        bulk_out = %format!("{:#04x}", endpoints.bulk_out.address),
        "Discovered endpoints"
    );

    Ok((endpoints, baud.effective_baud_rate))
}

fn send_control<C: UsbConnection>(
    connection: &C,
    request: &ControlRequest,
    timeout: Duration,
) -> Result<()> {
    debug!(
        "Control {}: request={} value=0x{:04x} index={}",
        request.operation(),
        request.request,
        request.value,
        request.index
    );
    match connection.control_out(request, timeout) {
        Ok(0) => Ok(()),
        Ok(result) => Err(Error::io(
            request.operation(),
            io::Error::other(format!("result={}", result)),
        )),
        Err(e) => Err(Error::io(request.operation(), e)),
    }
}
