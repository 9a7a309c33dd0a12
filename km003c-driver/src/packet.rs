use crate::constants::{EXTENDED_HEADER_SIZE, MAIN_HEADER_SIZE, MAX_CTRL_TYPE};
use crate::error::KMError;
use modular_bitfield::prelude::*;
use num_enum::{FromPrimitive, IntoPrimitive};
use std::fmt;

const TYPE_MASK: u8 = 0x7F;
const ATTRIBUTE_MASK: u16 = 0x7FFF;
const OBJ_WORDS_MASK: u16 = 0x03FF;
const CHUNK_MASK: u8 = 0x3F;
const SIZE_MASK: u16 = 0x03FF;

/// Header layout for control messages (type <= 63).
#[bitfield(bytes = 4)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CtrlHeader {
    pub packet_type: B7,
    pub extend: bool,
    pub id: u8,
    #[skip]
    unused: bool,
    pub attribute: B15,
}

/// Header layout for data messages (type > 63).
#[bitfield(bytes = 4)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataHeader {
    pub packet_type: B7,
    pub extend: bool,
    pub id: u8,
    #[skip]
    unused: B6,
    pub obj_count_words: B10,
}

/// Secondary header in front of every payload chunk.
#[bitfield(bytes = 4)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtendedHeader {
    pub attribute: B15,
    pub next: bool,
    pub chunk_count: B6,
    pub record_size: B10,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum PacketType {
    // 0 is reserved, 1..=63 are control types
    Sync = 0x01,
    Connect = 0x02,
    Disconnect = 0x03,
    Reset = 0x04,
    Accept = 0x05,
    Reject = 0x06,
    Finished = 0x07,
    JumpAprom = 0x08,
    JumpDfu = 0x09,
    GetStatus = 0x0A,
    Error = 0x0B,
    GetData = 0x0C,
    GetFile = 0x0D,
    SetRate = 0x0E,
    Stop = 0x0F,

    // 64..=127 are data types
    Head = 64,
    PutData = 65,

    #[num_enum(catch_all)]
    Unknown(u8),
}

impl PacketType {
    pub fn is_ctrl_type(&self) -> bool {
        let value: u8 = (*self).into();
        value <= MAX_CTRL_TYPE
    }
}

/// Attribute values used in command headers and extended headers.
///
/// GET_DATA requests treat these as a bitmask, so several kinds can be
/// requested at once by OR-ing the raw values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, FromPrimitive)]
#[repr(u16)]
pub enum Attribute {
    None = 0,
    Adc = 0x1,
    AdcQueue = 0x2,
    AdcQueue10k = 0x4,
    Settings = 0x8,
    PdPacket = 0x10,
    PdStatus = 0x20,
    QcPacket = 0x40,

    #[num_enum(catch_all)]
    Unknown(u16),
}

/// The 4-byte primary header. The meaning of the upper 15 bits depends on
/// the type discriminant, so the two layouts are kept as separate variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageHeader {
    Ctrl(CtrlHeader),
    Data(DataHeader),
}

impl MessageHeader {
    /// Build a header from raw field values. `value` is the attribute for
    /// control types and the payload length in 32-bit words for data types;
    /// every field is masked to its bit width.
    pub fn new(packet_type: impl Into<u8>, extend: bool, id: u8, value: u16) -> Self {
        let packet_type = packet_type.into() & TYPE_MASK;
        if packet_type <= MAX_CTRL_TYPE {
            MessageHeader::Ctrl(
                CtrlHeader::new()
                    .with_packet_type(packet_type)
                    .with_extend(extend)
                    .with_id(id)
                    .with_attribute(value & ATTRIBUTE_MASK),
            )
        } else {
            MessageHeader::Data(
                DataHeader::new()
                    .with_packet_type(packet_type)
                    .with_extend(extend)
                    .with_id(id)
                    .with_obj_count_words(value & OBJ_WORDS_MASK),
            )
        }
    }

    /// Control command header without the extend flag.
    pub fn command(packet_type: PacketType, id: u8, attribute: u16) -> Self {
        Self::new(packet_type, false, id, attribute)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, KMError> {
        let raw: [u8; MAIN_HEADER_SIZE] = bytes.try_into().map_err(|_| KMError::MalformedFrame {
            expected: MAIN_HEADER_SIZE,
            actual: bytes.len(),
        })?;
        // the type lives in the low 7 bits of the first byte
        if PacketType::from_primitive(raw[0] & TYPE_MASK).is_ctrl_type() {
            Ok(MessageHeader::Ctrl(CtrlHeader::from_bytes(raw)))
        } else {
            Ok(MessageHeader::Data(DataHeader::from_bytes(raw)))
        }
    }

    pub fn encode(&self) -> [u8; MAIN_HEADER_SIZE] {
        match self {
            MessageHeader::Ctrl(header) => header.into_bytes(),
            MessageHeader::Data(header) => header.into_bytes(),
        }
    }

    pub fn raw_type(&self) -> u8 {
        match self {
            MessageHeader::Ctrl(header) => header.packet_type(),
            MessageHeader::Data(header) => header.packet_type(),
        }
    }

    pub fn packet_type(&self) -> PacketType {
        PacketType::from_primitive(self.raw_type())
    }

    pub fn extend(&self) -> bool {
        match self {
            MessageHeader::Ctrl(header) => header.extend(),
            MessageHeader::Data(header) => header.extend(),
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            MessageHeader::Ctrl(header) => header.id(),
            MessageHeader::Data(header) => header.id(),
        }
    }

    /// Attribute bits, only present on control headers.
    pub fn attribute(&self) -> Option<u16> {
        match self {
            MessageHeader::Ctrl(header) => Some(header.attribute()),
            MessageHeader::Data(_) => None,
        }
    }

    /// Declared payload length in 32-bit words, only present on data headers.
    pub fn obj_count_words(&self) -> Option<u16> {
        match self {
            MessageHeader::Ctrl(_) => None,
            MessageHeader::Data(header) => Some(header.obj_count_words()),
        }
    }
}

/// Pack raw header fields into the 4 wire bytes.
pub fn encode_header(packet_type: u8, extend: bool, id: u8, value: u16) -> [u8; MAIN_HEADER_SIZE] {
    MessageHeader::new(packet_type, extend, id, value).encode()
}

impl fmt::Display for MessageHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageHeader::Ctrl(header) => write!(
                f,
                "ctrl {:?} ({}) extend={} id={} attribute={:?} ({:#06x})",
                self.packet_type(),
                header.packet_type(),
                header.extend(),
                header.id(),
                Attribute::from_primitive(header.attribute()),
                header.attribute()
            ),
            MessageHeader::Data(header) => write!(
                f,
                "data {:?} ({}) extend={} id={} object={} bytes",
                self.packet_type(),
                header.packet_type(),
                header.extend(),
                header.id(),
                header.obj_count_words() as usize * 4
            ),
        }
    }
}

impl ExtendedHeader {
    pub fn from_fields(attribute: u16, next: bool, chunk_count: u8, record_size: u16) -> Self {
        ExtendedHeader::new()
            .with_attribute(attribute & ATTRIBUTE_MASK)
            .with_next(next)
            .with_chunk_count(chunk_count & CHUNK_MASK)
            .with_record_size(record_size & SIZE_MASK)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, KMError> {
        let raw: [u8; EXTENDED_HEADER_SIZE] = bytes.try_into().map_err(|_| KMError::MalformedFrame {
            expected: EXTENDED_HEADER_SIZE,
            actual: bytes.len(),
        })?;
        Ok(ExtendedHeader::from_bytes(raw))
    }

    pub fn encode(&self) -> [u8; EXTENDED_HEADER_SIZE] {
        self.into_bytes()
    }

    pub fn kind(&self) -> Attribute {
        Attribute::from_primitive(self.attribute())
    }

    /// Number of records in the chunk; a zero chunk count still carries one.
    pub fn record_count(&self) -> usize {
        usize::from(self.chunk_count()).max(1)
    }

    /// Byte length of the chunk body following this header.
    pub fn body_len(&self) -> usize {
        usize::from(self.record_size()) * self.record_count()
    }
}

impl fmt::Display for ExtendedHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ext {:?} next={} chunk={} size={}",
            self.kind(),
            self.next(),
            self.chunk_count(),
            self.record_size()
        )
    }
}
