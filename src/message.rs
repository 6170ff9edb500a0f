//! Pairwise wire messages.
//!
//! ```text
//! Message        { 1: version, 2: RegularMessage, 3: PrekeyMessage? }
//! RegularMessage { 1: header bytes, 2: cipher_text }
//! Header         { 1: counter, 2: prev_chain_count, 3: public_key[32] }
//! PrekeyMessage  { 1: sender_identity_key, 2: sender_ephemeral_key,
//!                  3: receiver_long_term_key, 4: receiver_one_time_key? }
//! ```
//!
//! The header travels as raw bytes so the exact encoding the sender
//! authenticated is what the receiver feeds into the AEAD.

use crate::error::{Error, Result};
use crate::keys::PublicKey;
use crate::wire::{Reader, Writer, MAX_VARINT32_LEN};

/// Wire protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

/// Encoded header size: two tagged varints plus a tagged 32-byte key.
pub const MAX_REGULAR_MESSAGE_HEADER_LEN: usize = 2 * (1 + MAX_VARINT32_LEN) + 2 + PublicKey::SIZE;

/// Header field limit, leaving room for future optional fields.
pub const MAX_HEADER_FIELD_LEN: usize = 52;

/// Message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Carries the handshake keys; sent until the initiator hears back.
    Prekey,
    Regular,
}

/// Handshake public keys embedded in the initiator's early messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PrekeyMessage {
    pub sender_identity_key: PublicKey,
    pub sender_ephemeral_key: PublicKey,
    pub receiver_long_term_key: PublicKey,
    pub receiver_one_time_key: Option<PublicKey>,
}

impl PrekeyMessage {
    fn encode(&self, writer: &mut Writer) {
        writer.put_bytes(1, self.sender_identity_key.as_bytes());
        writer.put_bytes(2, self.sender_ephemeral_key.as_bytes());
        writer.put_bytes(3, self.receiver_long_term_key.as_bytes());
        if let Some(one_time) = &self.receiver_one_time_key {
            writer.put_bytes(4, one_time.as_bytes());
        }
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut identity = None;
        let mut ephemeral = None;
        let mut long_term = None;
        let mut one_time = None;

        let mut reader = Reader::new(bytes);
        while let Some((tag, field)) = reader.next_field()? {
            match tag {
                1 => identity = Some(PublicKey::from_slice(field.as_bytes()?)?),
                2 => ephemeral = Some(PublicKey::from_slice(field.as_bytes()?)?),
                3 => long_term = Some(PublicKey::from_slice(field.as_bytes()?)?),
                4 => one_time = Some(PublicKey::from_slice(field.as_bytes()?)?),
                _ => {}
            }
        }

        Ok(Self {
            sender_identity_key: identity.ok_or(Error::WireFormatInvalid)?,
            sender_ephemeral_key: ephemeral.ok_or(Error::WireFormatInvalid)?,
            receiver_long_term_key: long_term.ok_or(Error::WireFormatInvalid)?,
            receiver_one_time_key: one_time,
        })
    }
}

/// Ratchet header: message counter, previous sending chain length and the
/// sender's current ratchet public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegularMessageHeader {
    pub counter: u32,
    pub prev_chain_count: u32,
    pub public_key: PublicKey,
}

impl RegularMessageHeader {
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        writer.put_u32(1, self.counter);
        writer.put_u32(2, self.prev_chain_count);
        writer.put_bytes(3, self.public_key.as_bytes());
        writer.into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_HEADER_FIELD_LEN {
            return Err(Error::WireFormatInvalid);
        }

        let mut counter = 0;
        let mut prev_chain_count = 0;
        let mut public_key = None;

        let mut reader = Reader::new(bytes);
        while let Some((tag, field)) = reader.next_field()? {
            match tag {
                1 => counter = field.as_u32()?,
                2 => prev_chain_count = field.as_u32()?,
                3 => public_key = Some(PublicKey::from_slice(field.as_bytes()?)?),
                _ => {}
            }
        }

        Ok(Self {
            counter,
            prev_chain_count,
            public_key: public_key.ok_or(Error::WireFormatInvalid)?,
        })
    }
}

/// Encrypted payload with its serialized header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegularMessage {
    header: Vec<u8>,
    cipher_text: Vec<u8>,
}

impl RegularMessage {
    pub(crate) fn new(header: Vec<u8>, cipher_text: Vec<u8>) -> Self {
        Self {
            header,
            cipher_text,
        }
    }

    /// Raw header bytes, as authenticated.
    #[must_use]
    pub fn header_bytes(&self) -> &[u8] {
        &self.header
    }

    /// Parsed header.
    pub fn header(&self) -> Result<RegularMessageHeader> {
        RegularMessageHeader::from_bytes(&self.header)
    }

    #[must_use]
    pub fn cipher_text(&self) -> &[u8] {
        &self.cipher_text
    }

    fn encode(&self, writer: &mut Writer) {
        writer.put_bytes(1, &self.header);
        writer.put_bytes(2, &self.cipher_text);
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut header = None;
        let mut cipher_text = None;

        let mut reader = Reader::new(bytes);
        while let Some((tag, field)) = reader.next_field()? {
            match tag {
                1 => header = Some(field.as_bytes()?),
                2 => cipher_text = Some(field.as_bytes()?),
                _ => {}
            }
        }

        let header = header.ok_or(Error::WireFormatInvalid)?;
        if header.len() > MAX_HEADER_FIELD_LEN {
            return Err(Error::WireFormatInvalid);
        }

        Ok(Self {
            header: header.to_vec(),
            cipher_text: cipher_text.ok_or(Error::WireFormatInvalid)?.to_vec(),
        })
    }

    #[cfg(test)]
    pub(crate) fn cipher_text_mut(&mut self) -> &mut Vec<u8> {
        &mut self.cipher_text
    }

    #[cfg(test)]
    pub(crate) fn header_mut(&mut self) -> &mut Vec<u8> {
        &mut self.header
    }
}

/// Top-level pairwise message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    version: u32,
    regular_message: RegularMessage,
    prekey_message: Option<PrekeyMessage>,
}

impl Message {
    pub(crate) fn new(regular_message: RegularMessage, prekey_message: Option<PrekeyMessage>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            regular_message,
            prekey_message,
        }
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    #[must_use]
    pub fn message_type(&self) -> MessageType {
        if self.prekey_message.is_some() {
            MessageType::Prekey
        } else {
            MessageType::Regular
        }
    }

    #[must_use]
    pub fn regular_message(&self) -> &RegularMessage {
        &self.regular_message
    }

    #[must_use]
    pub fn prekey_message(&self) -> Option<&PrekeyMessage> {
        self.prekey_message.as_ref()
    }

    /// Counter from the ratchet header.
    pub fn counter(&self) -> Result<u32> {
        Ok(self.regular_message.header()?.counter)
    }

    /// Receiver's long-term key from a prekey message.
    #[must_use]
    pub fn long_term_public_key(&self) -> Option<PublicKey> {
        self.prekey_message.map(|p| p.receiver_long_term_key)
    }

    /// Receiver's one-time key from a prekey message, if one was used.
    #[must_use]
    pub fn one_time_public_key(&self) -> Option<PublicKey> {
        self.prekey_message.and_then(|p| p.receiver_one_time_key)
    }

    /// Encodes the message for transport.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut regular = Writer::new();
        self.regular_message.encode(&mut regular);

        let mut writer = Writer::new();
        writer.put_u32(1, self.version);
        writer.put_bytes(2, &regular.into_bytes());
        if let Some(prekey) = &self.prekey_message {
            let mut inner = Writer::new();
            prekey.encode(&mut inner);
            writer.put_bytes(3, &inner.into_bytes());
        }
        writer.into_bytes()
    }

    /// Decodes a message received from the transport.
    ///
    /// Fails with [`Error::BadMessageVersion`] for any version other than
    /// [`PROTOCOL_VERSION`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut version = None;
        let mut regular_message = None;
        let mut prekey_message = None;

        let mut reader = Reader::new(bytes);
        while let Some((tag, field)) = reader.next_field()? {
            match tag {
                1 => version = Some(field.as_u32()?),
                2 => regular_message = Some(RegularMessage::decode(field.as_bytes()?)?),
                3 => prekey_message = Some(PrekeyMessage::decode(field.as_bytes()?)?),
                _ => {}
            }
        }

        if version.ok_or(Error::WireFormatInvalid)? != PROTOCOL_VERSION {
            return Err(Error::BadMessageVersion);
        }

        Ok(Self {
            version: PROTOCOL_VERSION,
            regular_message: regular_message.ok_or(Error::WireFormatInvalid)?,
            prekey_message,
        })
    }

    #[cfg(test)]
    pub(crate) fn regular_message_mut(&mut self) -> &mut RegularMessage {
        &mut self.regular_message
    }
}
