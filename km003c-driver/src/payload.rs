//! Walks a PUT_DATA body as a chain of `(ExtendedHeader, record bytes)`
//! chunks and turns each chunk into a typed record.

use crate::adc::AdcSnapshot;
use crate::adcqueue::AdcQueueEntry;
use crate::constants::{ADC_QUEUE_ENTRY_SIZE, ADC_RECORD_SIZE, EXTENDED_HEADER_SIZE};
use crate::error::KMError;
use crate::packet::{Attribute, ExtendedHeader};
use bytes::Bytes;
use num_enum::FromPrimitive;
use tracing::{trace, warn};

/// One decoded chunk of a data response.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadRecord {
    Adc(AdcSnapshot),
    AdcQueue(Vec<AdcQueueEntry>),
    /// Attribute this driver has no decoder for, kept verbatim.
    Unknown { attribute: u16, data: Bytes },
}

impl PayloadRecord {
    pub fn attribute(&self) -> Attribute {
        match self {
            PayloadRecord::Adc(_) => Attribute::Adc,
            PayloadRecord::AdcQueue(_) => Attribute::AdcQueue,
            PayloadRecord::Unknown { attribute, .. } => Attribute::from_primitive(*attribute),
        }
    }
}

/// Decode a data payload (the bytes after the 4-byte main header).
///
/// Chunks are consumed until one arrives without the `next` flag. Bytes left
/// after that chunk are reported and ignored since the device may pad.
pub fn decode_payload(bytes: &[u8]) -> Result<Vec<PayloadRecord>, KMError> {
    let mut records = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let remaining = bytes.len() - pos;
        if remaining < EXTENDED_HEADER_SIZE {
            return Err(KMError::TruncatedFrame {
                offset: pos,
                needed: EXTENDED_HEADER_SIZE,
                available: remaining,
            });
        }

        let ext = ExtendedHeader::decode(&bytes[pos..pos + EXTENDED_HEADER_SIZE])?;
        trace!("{}", ext);

        let body_start = pos + EXTENDED_HEADER_SIZE;
        let body_len = ext.body_len();
        let available = bytes.len() - body_start;
        if body_len > available {
            return Err(KMError::TruncatedFrame {
                offset: pos,
                needed: body_len,
                available,
            });
        }

        let body = &bytes[body_start..body_start + body_len];
        records.push(decode_chunk(&ext, body)?);
        pos = body_start + body_len;

        if !ext.next() {
            if pos < bytes.len() {
                warn!(trailing = bytes.len() - pos, "Ignoring bytes after last payload chunk");
            }
            break;
        }
    }

    Ok(records)
}

fn decode_chunk(ext: &ExtendedHeader, body: &[u8]) -> Result<PayloadRecord, KMError> {
    let record_size = usize::from(ext.record_size());
    match ext.kind() {
        Attribute::Adc => {
            if record_size < ADC_RECORD_SIZE {
                return Err(KMError::TruncatedRecord {
                    expected: ADC_RECORD_SIZE,
                    actual: record_size,
                });
            }
            Ok(PayloadRecord::Adc(AdcSnapshot::decode(&body[..record_size])?))
        }
        Attribute::AdcQueue => {
            if record_size < ADC_QUEUE_ENTRY_SIZE {
                return Err(KMError::TruncatedRecord {
                    expected: ADC_QUEUE_ENTRY_SIZE,
                    actual: record_size,
                });
            }
            let entries = body
                .chunks_exact(record_size)
                .map(AdcQueueEntry::decode)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(PayloadRecord::AdcQueue(entries))
        }
        _ => Ok(PayloadRecord::Unknown {
            attribute: ext.attribute(),
            data: Bytes::copy_from_slice(body),
        }),
    }
}
