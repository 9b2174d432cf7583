//! Bulk transfer framing.
//!
//! Writes go out unchanged. Reads have to deal with the chip's status prefix:
//! the chip answers every bulk IN request, even when it has no data, with a
//! packet holding just its two status bytes. A read therefore keeps issuing
//! transfers until one carries more than the prefix, then strips it.

use bytes::Bytes;
use std::io;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::EndpointPair;
use crate::config::TransferOptions;
use crate::error::{Error, Result};
use crate::protocol::{ModemStatus, STATUS_PREFIX_LEN};
use crate::tracing::prelude::*;
use crate::transport::UsbConnection;

/// Payload of one read, without the status prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResult {
    pub data: Bytes,
    pub length: usize,
    /// Status prefix of the transfer that produced `data`
    pub status: ModemStatus,
}

impl ReadResult {
    fn empty(status: ModemStatus) -> Self {
        Self {
            data: Bytes::new(),
            length: 0,
            status,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// Frames reads and writes over one endpoint pair.
///
/// Each direction has its own lock: one read and one write may be in flight
/// together, two reads (or two writes) are serialized.
pub(crate) struct TransferFramer {
    endpoints: EndpointPair,
    options: TransferOptions,
    read_buffer: Mutex<Vec<u8>>,
    write_lock: Mutex<()>,
}

impl TransferFramer {
    pub fn new(endpoints: EndpointPair, options: TransferOptions) -> Self {
        Self {
            endpoints,
            options,
            read_buffer: Mutex::new(Vec::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Send `data` in a single bulk OUT transfer.
    ///
    /// Returns the length the transport reports; a short write is not
    /// retried.
    pub async fn write<C: UsbConnection>(
        &self,
        connection: &C,
        data: &[u8],
        cancel: &CancellationToken,
    ) -> Result<usize> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            guard = self.write_lock.lock() => guard,
        };

        let endpoint = self.endpoints.bulk_out.address;
        trace!(endpoint, len = data.len(), data = %hex::encode(data), "Bulk OUT");

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = connection.bulk_out(endpoint, data, self.options.write_timeout()) => {
                result.map_err(|e| Error::io("bulk write", e))?
            }
        };

        if sent != data.len() {
            debug!(sent, len = data.len(), "Short bulk write");
        }
        Ok(sent)
    }

    /// Read up to `count - 2` payload bytes.
    ///
    /// Transfers that return only the status prefix, or time out, are
    /// repeated until data arrives, the poll cap in [`TransferOptions`] is
    /// reached (yielding an empty result) or `cancel` fires.
    pub async fn read<C: UsbConnection>(
        &self,
        connection: &C,
        count: usize,
        cancel: &CancellationToken,
    ) -> Result<ReadResult> {
        if count <= STATUS_PREFIX_LEN {
            return Err(Error::InvalidArgument(format!(
                "Read of {} bytes cannot hold data after the {}-byte status prefix",
                count, STATUS_PREFIX_LEN
            )));
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut buffer = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            guard = self.read_buffer.lock() => guard,
        };
        buffer.resize(count, 0);

        let endpoint = self.endpoints.bulk_in.address;
        let timeout = self.options.read_timeout();
        let mut last_status = ModemStatus::default();
        let mut polls: u32 = 0;

        let received = loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                result = connection.bulk_in(endpoint, &mut buffer[..], timeout) => result,
            };

            match result {
                Ok(n) if n > STATUS_PREFIX_LEN => break n.min(count),
                Ok(n) => {
                    if let Some(status) = ModemStatus::from_prefix(&buffer[..n]) {
                        last_status = status;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    trace!(endpoint, "Bulk IN timed out");
                }
                Err(e) => return Err(Error::io("bulk read", e)),
            }

            polls += 1;
            if let Some(max) = self.options.max_read_polls {
                if polls >= max {
                    debug!(polls, "No data after poll limit");
                    return Ok(ReadResult::empty(last_status));
                }
            }
        };

        let status = ModemStatus::from_prefix(&buffer[..received]).unwrap_or_default();
        let errors = status.line_errors();
        if !errors.is_empty() {
            warn!(status = ?errors, "Line errors reported by chip");
        }

        let payload = &buffer[STATUS_PREFIX_LEN..received];
        trace!(endpoint, polls, len = payload.len(), data = %hex::encode(payload), "Bulk IN");

        Ok(ReadResult {
            data: Bytes::copy_from_slice(payload),
            length: payload.len(),
            status,
        })
    }
}
