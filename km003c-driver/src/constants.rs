// Protocol constants for KM003C

/// Size of main packet header (4 bytes)
pub const MAIN_HEADER_SIZE: usize = 4;

/// Size of the extended header that prefixes every payload chunk (4 bytes)
pub const EXTENDED_HEADER_SIZE: usize = 4;

/// Size of one ADC snapshot record (40 bytes)
pub const ADC_RECORD_SIZE: usize = 40;

/// Size of one ADC queue entry (20 bytes)
pub const ADC_QUEUE_ENTRY_SIZE: usize = 20;

/// Upper bound for a single bulk IN read; the device never sends more than ~10 KiB
pub const MAX_READ_SIZE: usize = 10240;

/// Largest value the 7-bit type field can hold that still denotes a control message
pub const MAX_CTRL_TYPE: u8 = 63;

/// Header id used by CONNECT and DISCONNECT
pub const CONNECT_ID: u8 = 1;

/// First id handed out by the session counter (1 = CONNECT, 2 = unlock frame)
pub const FIRST_SESSION_ID: u8 = 3;

// USB binding
pub const VID: u16 = 0x5FC9;
pub const PID: u16 = 0x0063;
pub const INTERFACE: u8 = 0;
pub const ENDPOINT_OUT: u8 = 0x01;
pub const ENDPOINT_IN: u8 = 0x81;

/// Opaque vendor frame sent right after CONNECT. Without it the device
/// never fills the ADC queue. Its header declares type 0x4C, id 2.
#[rustfmt::skip]
pub const UNLOCK_SEQUENCE: [u8; 36] = [
    0x4c, 0x02, 0x00, 0x02, 0x2d, 0x09, 0x9f, 0xb2, 0xff, 0xe3, 0x67, 0xdb,
    0x47, 0x72, 0x84, 0x29, 0x9b, 0xc6, 0x22, 0xec, 0x3f, 0xa1, 0xea, 0xf7,
    0x42, 0xdd, 0x59, 0x36, 0x28, 0xca, 0xe3, 0xd9, 0x82, 0x7a, 0xec, 0x81,
];

/// Response type the device answers the unlock frame with
pub const UNLOCK_ACCEPT_CODE: u8 = 0x4C;
