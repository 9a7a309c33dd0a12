//! Common test utilities and shared imports

// Allow unused imports and dead code since this is a shared module
// used across multiple test files - not all items are used in every test file
#[allow(unused_imports)]
pub use bytes::Bytes;
#[allow(unused_imports)]
pub use km003c_driver::packet::{Attribute, ExtendedHeader, MessageHeader, PacketType};
#[allow(unused_imports)]
pub use km003c_driver::{AdcQueueEntry, AdcSnapshot, KMError, PayloadRecord, SampleRate};
#[allow(unused_imports)]
pub use km003c_driver::{Transport, TransportError};

use std::collections::VecDeque;

/// Decode hex string to bytes for testing
#[allow(dead_code)]
pub fn hex_to_bytes(hex_data: &str) -> Bytes {
    Bytes::from(hex::decode(hex_data).expect("Failed to decode hex"))
}

/// Control response frame with no payload.
#[allow(dead_code)]
pub fn ctrl_response(packet_type: PacketType, id: u8) -> Bytes {
    Bytes::copy_from_slice(&MessageHeader::command(packet_type, id, 0).encode())
}

/// PUT_DATA frame carrying `payload`.
#[allow(dead_code)]
pub fn put_data_response(id: u8, payload: &[u8]) -> Bytes {
    let words = (payload.len() / 4) as u16;
    let mut frame = MessageHeader::new(PacketType::PutData, false, id, words).encode().to_vec();
    frame.extend_from_slice(payload);
    Bytes::from(frame)
}

/// Extended header followed by `body`.
#[allow(dead_code)]
pub fn chunk(attribute: Attribute, next: bool, chunk_count: u8, record_size: u16, body: &[u8]) -> Vec<u8> {
    let mut out = ExtendedHeader::from_fields(attribute.into(), next, chunk_count, record_size)
        .encode()
        .to_vec();
    out.extend_from_slice(body);
    out
}

#[allow(dead_code)]
pub fn queue_entry(timestamp_ms: u32) -> AdcQueueEntry {
    AdcQueueEntry {
        timestamp_ms,
        vbus_uv: 5_000_000 + timestamp_ms as i32,
        ibus_ua: -1_500,
        vcc1_tenth_mv: 572,
        vcc2_tenth_mv: 32_350,
        vdp_mv: 600,
        vdm_mv: 590,
    }
}

/// Scripted transport: replies are handed out in order and every request is recorded.
#[derive(Default)]
pub struct MockTransport {
    pub replies: VecDeque<Result<Bytes, TransportError>>,
    pub requests: Vec<Vec<u8>>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, frame: Bytes) -> Self {
        self.replies.push_back(Ok(frame));
        self
    }

    pub fn fail(mut self, err: TransportError) -> Self {
        self.replies.push_back(Err(err));
        self
    }

    /// Replies for a successful CONNECT + unlock exchange.
    pub fn handshake(self) -> Self {
        self.reply(ctrl_response(PacketType::Accept, 1))
            .reply(Bytes::from_static(&[0x4C, 0x02, 0x00, 0x00]))
    }

    /// Decoded header of the `index`-th request.
    pub fn request_header(&self, index: usize) -> MessageHeader {
        MessageHeader::decode(&self.requests[index][..4]).expect("request header")
    }
}

impl Transport for MockTransport {
    fn transfer(&mut self, out: &[u8]) -> Result<Bytes, TransportError> {
        self.requests.push(out.to_vec());
        self.replies.pop_front().unwrap_or(Err(TransportError::DeviceNotFound))
    }
}
