use crate::adc::{AdcSnapshot, SampleRate};
use crate::adcqueue::AdcQueueEntry;
use crate::constants::{CONNECT_ID, FIRST_SESSION_ID, MAIN_HEADER_SIZE, UNLOCK_ACCEPT_CODE, UNLOCK_SEQUENCE};
use crate::error::KMError;
use crate::packet::{Attribute, MessageHeader, PacketType};
use crate::payload::{PayloadRecord, decode_payload};
use crate::transport::Transport;
use bytes::Bytes;
use strum_macros::Display;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SessionState {
    Disconnected,
    /// Connected and unlocked, acquisition stopped.
    Connected,
    /// Acquisition running at the last rate set.
    Streaming,
}

/// Command session with one KM003C.
///
/// The device handles one command at a time, so every method takes
/// `&mut self` and blocks for the full round trip. Dropping a session that
/// is still connected sends DISCONNECT.
///
/// Request ids: CONNECT and DISCONNECT always use 1, the unlock frame
/// carries 2, and every later command takes the next value of a counter
/// starting at 3 and wrapping at 256. The device echoes ids but does not
/// appear to check them, so mismatches are only logged.
pub struct Session<T: Transport> {
    transport: T,
    state: SessionState,
    transaction_id: u8,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: SessionState::Disconnected,
            transaction_id: FIRST_SESSION_ID,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Id the next counted command will carry.
    pub fn transaction_id(&self) -> u8 {
        self.transaction_id
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn next_id(&mut self) -> u8 {
        let id = self.transaction_id;
        self.transaction_id = self.transaction_id.wrapping_add(1);
        id
    }

    fn ensure_connected(&self) -> Result<(), KMError> {
        match self.state {
            SessionState::Disconnected => Err(KMError::NotConnected),
            _ => Ok(()),
        }
    }

    /// Send raw request bytes and split the response into header and payload.
    fn exchange(&mut self, request: &[u8]) -> Result<(MessageHeader, Bytes), KMError> {
        let mut response = self.transport.transfer(request)?;
        if response.len() < MAIN_HEADER_SIZE {
            return Err(KMError::MalformedFrame {
                expected: MAIN_HEADER_SIZE,
                actual: response.len(),
            });
        }
        let payload = response.split_off(MAIN_HEADER_SIZE);
        let header = MessageHeader::decode(&response)?;
        trace!(%header, payload_len = payload.len(), "Response");
        Ok((header, payload))
    }

    fn command(&mut self, request: MessageHeader) -> Result<(MessageHeader, Bytes), KMError> {
        trace!(header = %request, "Request");
        let (response, payload) = self.exchange(&request.encode())?;
        if response.id() != request.id() {
            debug!(sent = request.id(), received = response.id(), "Response id differs from request");
        }
        Ok((response, payload))
    }

    fn expect_type(response: MessageHeader, accepted: u8) -> Result<(), KMError> {
        if response.packet_type() == PacketType::Reject {
            Err(KMError::CommandRejected(response))
        } else if response.raw_type() == accepted {
            Ok(())
        } else {
            Err(KMError::UnexpectedResponse(response))
        }
    }

    /// CONNECT followed by the vendor unlock frame that enables the ADC queue.
    pub fn connect(&mut self) -> Result<(), KMError> {
        if self.state != SessionState::Disconnected {
            debug!(state = %self.state, "Already connected");
            return Ok(());
        }

        info!("--- Starting Connection Handshake ---");
        let (response, _) = self.command(MessageHeader::command(PacketType::Connect, CONNECT_ID, 0))?;
        Self::expect_type(response, PacketType::Accept.into())?;

        let unlocked = self
            .exchange(&UNLOCK_SEQUENCE)
            .and_then(|(response, _)| Self::expect_type(response, UNLOCK_ACCEPT_CODE));
        if let Err(err) = unlocked {
            // CONNECT was accepted, so release the device before bailing out
            self.send_disconnect();
            return Err(err);
        }

        self.transaction_id = FIRST_SESSION_ID;
        self.state = SessionState::Connected;
        info!("Device connected and unlocked");
        Ok(())
    }

    /// Stop acquisition. Required before the rate can be changed.
    pub fn stop(&mut self) -> Result<(), KMError> {
        self.ensure_connected()?;
        let id = self.next_id();
        let (response, _) = self.command(MessageHeader::command(PacketType::Stop, id, 0))?;
        Self::expect_type(response, PacketType::Accept.into())?;
        self.state = SessionState::Connected;
        info!("Acquisition stopped");
        Ok(())
    }

    /// Set the sample rate, which also starts acquisition. The firmware
    /// rejects this while already streaming; call [`Session::stop`] first.
    pub fn set_rate(&mut self, rate: SampleRate) -> Result<(), KMError> {
        self.ensure_connected()?;
        let id = self.next_id();
        let attribute = u16::from(u8::from(rate));
        let (response, _) = self.command(MessageHeader::command(PacketType::SetRate, id, attribute))?;
        Self::expect_type(response, PacketType::Accept.into())?;
        self.state = SessionState::Streaming;
        info!(%rate, "Acquisition started");
        Ok(())
    }

    /// Poll for data of the kinds in `attribute_mask`.
    ///
    /// A response other than PUT_DATA means nothing new is available and
    /// yields an empty list.
    pub fn get_data(&mut self, attribute_mask: u16) -> Result<Vec<PayloadRecord>, KMError> {
        self.ensure_connected()?;
        let id = self.next_id();
        let (response, payload) = self.command(MessageHeader::command(PacketType::GetData, id, attribute_mask))?;
        if response.packet_type() != PacketType::PutData {
            debug!(%response, "No data in response");
            return Ok(Vec::new());
        }
        decode_payload(&payload)
    }

    /// Poll the ADC queue and flatten every queue chunk into one list.
    pub fn get_adc_queue(&mut self) -> Result<Vec<AdcQueueEntry>, KMError> {
        let records = self.get_data(Attribute::AdcQueue.into())?;
        Ok(records
            .into_iter()
            .filter_map(|record| match record {
                PayloadRecord::AdcQueue(entries) => Some(entries),
                _ => None,
            })
            .flatten()
            .collect())
    }

    /// Request a single ADC snapshot.
    pub fn get_adc(&mut self) -> Result<Option<AdcSnapshot>, KMError> {
        let records = self.get_data(Attribute::Adc.into())?;
        Ok(records.into_iter().find_map(|record| match record {
            PayloadRecord::Adc(snapshot) => Some(snapshot),
            _ => None,
        }))
    }

    /// Best-effort DISCONNECT. Never fails; the session ends up Disconnected.
    pub fn disconnect(&mut self) {
        self.send_disconnect();
        self.state = SessionState::Disconnected;
        info!("Device disconnected");
    }

    fn send_disconnect(&mut self) {
        let request = MessageHeader::command(PacketType::Disconnect, CONNECT_ID, 0);
        if let Err(err) = self.transport.transfer(&request.encode()) {
            warn!("Ignoring failed disconnect: {}", err);
        }
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if self.state != SessionState::Disconnected {
            self.disconnect();
        }
    }
}
