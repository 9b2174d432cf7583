//! Scripted in-memory transport for unit tests.
//!
//! `MockHost` hands out connections that share one `MockState`, so a test can
//! keep the host and inspect what the port did after the connection has been
//! moved into (and closed by) the port.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;
use std::time::Duration;

use super::packet::PacketSplitter;
use super::{
    AccessBroker, EndpointDescriptor, TransferType, UsbConnection, UsbDeviceInfo, UsbHost,
};
use crate::protocol::ControlRequest;

pub(crate) fn device() -> UsbDeviceInfo {
    UsbDeviceInfo {
        vendor_id: 0x0403,
        product_id: 0x6015,
        serial_number: Some("DK0AB1CD".into()),
        bus_id: "1".into(),
        device_address: 4,
    }
}

/// Outcome of one scripted bulk IN transfer.
#[derive(Debug, Clone)]
pub(crate) enum MockRead {
    Data(Vec<u8>),
    TimedOut,
    Fail,
    /// Never completes
    Pending,
}

#[derive(Debug, Default)]
pub(crate) struct MockState {
    // script
    reads: VecDeque<MockRead>,
    endpoints: Vec<EndpointDescriptor>,
    control_results: HashMap<u8, usize>,
    claim_fails: bool,
    splitter: PacketSplitter,
    // log
    pub opens: usize,
    pub claimed: Option<(u8, bool)>,
    pub controls: Vec<ControlRequest>,
    pub read_calls: Vec<(u8, usize)>,
    pub writes: Vec<(u8, Vec<u8>)>,
    pub closed: usize,
}

#[derive(Clone)]
pub(crate) struct MockHost {
    pub state: Arc<Mutex<MockState>>,
    available: bool,
}

impl MockHost {
    /// Host whose device has one bulk IN (0x81) and one bulk OUT (0x02).
    pub fn new() -> Self {
        let state = MockState {
            endpoints: vec![
                EndpointDescriptor::new(0x81, TransferType::Bulk, 64),
                EndpointDescriptor::new(0x02, TransferType::Bulk, 64),
            ],
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            available: true,
        }
    }

    /// Host that never returns a handle.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn with_reads(self, reads: impl IntoIterator<Item = MockRead>) -> Self {
        self.state.lock().reads.extend(reads);
        self
    }

    pub fn with_endpoints(self, endpoints: Vec<EndpointDescriptor>) -> Self {
        self.state.lock().endpoints = endpoints;
        self
    }

    pub fn with_control_result(self, request: u8, result: usize) -> Self {
        self.state.lock().control_results.insert(request, result);
        self
    }

    pub fn with_failing_claim(self) -> Self {
        self.state.lock().claim_fails = true;
        self
    }

    pub fn push_read(&self, read: MockRead) {
        self.state.lock().reads.push_back(read);
    }
}

impl UsbHost for MockHost {
    type Connection = MockConnection;

    fn open(&self, _device: &UsbDeviceInfo) -> Option<MockConnection> {
        self.state.lock().opens += 1;
        self.available.then(|| MockConnection {
            state: self.state.clone(),
        })
    }
}

pub(crate) struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl UsbConnection for MockConnection {
    fn claim_interface(&mut self, interface: u8, force: bool) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.claim_fails {
            return Err(io::Error::new(io::ErrorKind::ResourceBusy, "interface busy"));
        }
        state.claimed = Some((interface, force));
        Ok(())
    }

    fn endpoints(&self, _interface: u8) -> Vec<EndpointDescriptor> {
        self.state.lock().endpoints.clone()
    }

    fn control_out(&self, request: &ControlRequest, _timeout: Duration) -> io::Result<usize> {
        let mut state = self.state.lock();
        state.controls.push(*request);
        Ok(state.control_results.get(&request.request).copied().unwrap_or(0))
    }

    async fn bulk_in(&self, endpoint: u8, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
        let next = {
            let mut state = self.state.lock();
            state.read_calls.push((endpoint, buf.len()));
            // Leftover payload of a packet larger than the last request
            if state.splitter.pending() > 0 {
                return Ok(state.splitter.take(buf));
            }
            state.reads.pop_front()
        };
        match next {
            Some(MockRead::Data(packet)) => Ok(self.state.lock().splitter.accept(&packet, buf)),
            Some(MockRead::TimedOut) => Err(io::Error::new(io::ErrorKind::TimedOut, "timed out")),
            Some(MockRead::Fail) => Err(io::Error::other("pipe error")),
            Some(MockRead::Pending) | None => std::future::pending().await,
        }
    }

    async fn bulk_out(&self, endpoint: u8, data: &[u8], _timeout: Duration) -> io::Result<usize> {
        self.state.lock().writes.push((endpoint, data.to_vec()));
        Ok(data.len())
    }

    fn close(self) {
        self.state.lock().closed += 1;
    }
}

pub(crate) struct MockBroker {
    /// `None` never answers
    grant: Option<bool>,
}

impl MockBroker {
    pub fn granting() -> Self {
        Self { grant: Some(true) }
    }

    pub fn denying() -> Self {
        Self { grant: Some(false) }
    }

    pub fn unanswered() -> Self {
        Self { grant: None }
    }
}

#[async_trait]
impl AccessBroker for MockBroker {
    async fn request_access(&self, _device: &UsbDeviceInfo) -> bool {
        match self.grant {
            Some(grant) => grant,
            None => std::future::pending().await,
        }
    }
}
