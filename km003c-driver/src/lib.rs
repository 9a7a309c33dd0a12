pub mod adc;
pub mod adcqueue;
pub mod constants;
pub mod error;
pub mod packet;
pub mod payload;
pub mod session;
pub mod transport;

pub use adc::{AdcSnapshot, SampleRate};
pub use adcqueue::AdcQueueEntry;
pub use error::KMError;
pub use packet::{Attribute, ExtendedHeader, MessageHeader, PacketType};
pub use payload::{PayloadRecord, decode_payload};
pub use session::{Session, SessionState};
pub use transport::{Transport, TransportConfig, TransportError, UsbTransport};
