use crate::constants::{ENDPOINT_IN, ENDPOINT_OUT, INTERFACE, MAX_READ_SIZE, PID, VID};
use bytes::{Bytes, BytesMut};
use nusb::Interface;
use nusb::transfer::{RequestBuffer, TransferError};
use std::future::Future;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

// Default timeout for USB operations
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Extend flag in the first header byte, at the same position for every layout.
const EXTEND_FLAG: u8 = 0x80;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("USB device not found. Is the POWER-Z KM003C connected?")]
    DeviceNotFound,

    #[error("USB error: {0}")]
    Usb(#[from] nusb::Error),

    #[error("USB transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Timeout during USB operation: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Short write: sent {actual} of {expected} bytes")]
    ShortWrite { expected: usize, actual: usize },

    #[error("Failed to start transfer runtime: {0}")]
    Runtime(#[source] io::Error),
}

/// One blocking command round trip with the device.
///
/// Implementations write `out` in full, read one inbound frame and, when
/// that frame's header has the extend flag set, exactly one more frame
/// which is appended. The returned bytes start with the 4-byte header.
pub trait Transport {
    fn transfer(&mut self, out: &[u8]) -> Result<Bytes, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn transfer(&mut self, out: &[u8]) -> Result<Bytes, TransportError> {
        (**self).transfer(out)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn transfer(&mut self, out: &[u8]) -> Result<Bytes, TransportError> {
        (**self).transfer(out)
    }
}

/// Whether a response frame announces a continuation read.
pub fn frame_extends(frame: &[u8]) -> bool {
    frame.first().is_some_and(|b| b & EXTEND_FLAG != 0)
}

/// USB binding for [`UsbTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub vid: u16,
    pub pid: u16,
    pub interface: u8,
    pub endpoint_out: u8,
    pub endpoint_in: u8,
    /// Size of the buffer handed to each bulk IN read.
    pub read_size: usize,
    /// Deadline for each write or read; `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            vid: VID,
            pid: PID,
            interface: INTERFACE,
            endpoint_out: ENDPOINT_OUT,
            endpoint_in: ENDPOINT_IN,
            read_size: MAX_READ_SIZE,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}

/// Bulk transport over the vendor interface of a KM003C.
pub struct UsbTransport {
    interface: Interface,
    runtime: Runtime,
    config: TransportConfig,
}

impl UsbTransport {
    /// Open the first device matching the configured VID/PID and claim its interface.
    pub fn open(config: TransportConfig) -> Result<Self, TransportError> {
        info!("Searching for POWER-Z KM003C...");
        let device_info = nusb::list_devices()?
            .find(|d| d.vendor_id() == config.vid && d.product_id() == config.pid)
            .ok_or(TransportError::DeviceNotFound)?;

        info!(
            "Found device on bus {} addr {}",
            device_info.bus_number(),
            device_info.device_address()
        );

        let device = device_info.open()?;
        let interface = device.detach_and_claim_interface(config.interface)?;
        info!("Interface claimed successfully.");

        // nusb transfers are futures; a private current-thread runtime drives
        // them so the public API stays blocking.
        let runtime = Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(TransportError::Runtime)?;

        Ok(Self {
            interface,
            runtime,
            config,
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn block_on<F: Future>(&self, future: F) -> Result<F::Output, TransportError> {
        match self.config.timeout {
            // the timer has to be created inside the runtime
            Some(limit) => Ok(self
                .runtime
                .block_on(async { tokio::time::timeout(limit, future).await })?),
            None => Ok(self.runtime.block_on(future)),
        }
    }

    fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        debug!(bytes = hex::encode(data), "USB Write");
        let completion = self.block_on(self.interface.bulk_out(self.config.endpoint_out, data.to_vec()))?;
        let sent = completion.into_result()?.actual_length();
        if sent != data.len() {
            return Err(TransportError::ShortWrite {
                expected: data.len(),
                actual: sent,
            });
        }
        Ok(())
    }

    fn read(&self) -> Result<Vec<u8>, TransportError> {
        let buffer = RequestBuffer::new(self.config.read_size);
        let completion = self.block_on(self.interface.bulk_in(self.config.endpoint_in, buffer))?;
        let data = completion.into_result()?;
        debug!(bytes = hex::encode(&data), "USB Read");
        Ok(data)
    }
}

impl Transport for UsbTransport {
    fn transfer(&mut self, out: &[u8]) -> Result<Bytes, TransportError> {
        self.write(out)?;
        let first = self.read()?;
        if !frame_extends(&first) {
            return Ok(Bytes::from(first));
        }

        // the continuation must be read before anything else is written
        let rest = self.read()?;
        let mut frame = BytesMut::with_capacity(first.len() + rest.len());
        frame.extend_from_slice(&first);
        frame.extend_from_slice(&rest);
        Ok(frame.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_flag_is_bit_7_of_first_byte() {
        assert!(frame_extends(&[0xC1, 0x00, 0x00, 0x00]));
        assert!(!frame_extends(&[0x41, 0x00, 0x00, 0x00]));
        assert!(!frame_extends(&[]));
    }

    #[test]
    fn default_config_targets_km003c() {
        let config = TransportConfig::default();
        assert_eq!((config.vid, config.pid), (0x5FC9, 0x0063));
        assert_eq!((config.endpoint_out, config.endpoint_in), (0x01, 0x81));
        assert_eq!(config.read_size, 10240);
    }
}
