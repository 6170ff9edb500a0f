//! Group wire messages.
//!
//! ```text
//! GroupMessage        { 1: version, 2: MessageGroupInfo | 3: RegularGroupMessage }
//! MessageGroupInfo    { 1: session_id[32], 2: epoch, 3: key[32] }
//! RegularGroupMessage { 1: header bytes, 2: signature[64], 3: cipher_text }
//! Header              { 1: session_id[32], 2: epoch,
//!                       3: prev_epochs_msgs (4 entries), 4: counter }
//! ```
//!
//! `prev_epochs_msgs` is written packed; the unpacked form (one varint
//! field per entry) is accepted as well.

use crate::error::{Error, Result};
use crate::keys::SymmetricKey;
use crate::message::PROTOCOL_VERSION;
use crate::wire::{array32, Field, Reader, Writer, MAX_VARINT32_LEN};
use crate::xeddsa::Signature;

use zeroize::Zeroize;

/// Number of trailing epochs whose message counts travel in every header.
pub const PREV_EPOCHS_WINDOW: usize = 4;

/// Largest encoded group header.
pub const MAX_GROUP_HEADER_LEN: usize =
    (2 + 32) + 2 * (1 + MAX_VARINT32_LEN) + (2 + PREV_EPOCHS_WINDOW * MAX_VARINT32_LEN);

/// Header field limit accepted from the wire.
pub const MAX_GROUP_HEADER_FIELD_LEN: usize = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupMessageType {
    /// Epoch key distribution, sent over a pairwise session.
    GroupInfo,
    Regular,
}

/// New epoch key for a group.
///
/// Carries secret material; only ever send it inside a pairwise
/// [`Session`](crate::session::Session).
#[derive(Clone, PartialEq, Eq)]
pub struct MessageGroupInfo {
    pub session_id: [u8; 32],
    pub epoch: u32,
    pub key: SymmetricKey,
}

impl MessageGroupInfo {
    fn encode(&self, writer: &mut Writer) {
        writer.put_bytes(1, &self.session_id);
        writer.put_u32(2, self.epoch);
        writer.put_bytes(3, self.key.as_bytes());
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut session_id = None;
        let mut epoch = 0;
        let mut key = None;

        let mut reader = Reader::new(bytes);
        while let Some((tag, field)) = reader.next_field()? {
            match tag {
                1 => session_id = Some(array32(field.as_bytes()?)?),
                2 => epoch = field.as_u32()?,
                3 => {
                    let mut raw = array32(field.as_bytes()?)?;
                    key = Some(SymmetricKey::from_bytes(raw));
                    raw.zeroize();
                }
                _ => {}
            }
        }

        Ok(Self {
            session_id: session_id.ok_or(Error::WireFormatInvalid)?,
            epoch,
            key: key.ok_or(Error::WireFormatInvalid)?,
        })
    }
}

impl std::fmt::Debug for MessageGroupInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageGroupInfo")
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

/// Header of a regular group message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegularGroupMessageHeader {
    pub session_id: [u8; 32],
    pub epoch: u32,
    /// Messages the sender sent in each of the previous epochs, newest first.
    pub prev_epochs_msgs: [u32; PREV_EPOCHS_WINDOW],
    pub counter: u32,
}

impl RegularGroupMessageHeader {
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        writer.put_bytes(1, &self.session_id);
        writer.put_u32(2, self.epoch);
        writer.put_packed_u32(3, &self.prev_epochs_msgs);
        writer.put_u32(4, self.counter);
        writer.into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_GROUP_HEADER_FIELD_LEN {
            return Err(Error::WireFormatInvalid);
        }

        let mut session_id = None;
        let mut epoch = 0;
        let mut prev_epochs_msgs = [0; PREV_EPOCHS_WINDOW];
        let mut counter = 0;
        let mut unpacked = 0;

        let mut reader = Reader::new(bytes);
        while let Some((tag, field)) = reader.next_field()? {
            match (tag, field) {
                (1, _) => session_id = Some(array32(field.as_bytes()?)?),
                (2, _) => epoch = field.as_u32()?,
                (3, Field::Varint(_)) => {
                    let slot = prev_epochs_msgs
                        .get_mut(unpacked)
                        .ok_or(Error::WireFormatInvalid)?;
                    *slot = field.as_u32()?;
                    unpacked += 1;
                }
                (3, _) => prev_epochs_msgs = field.as_packed_u32::<PREV_EPOCHS_WINDOW>()?,
                (4, _) => counter = field.as_u32()?,
                _ => {}
            }
        }
        if unpacked != 0 && unpacked != PREV_EPOCHS_WINDOW {
            return Err(Error::WireFormatInvalid);
        }

        Ok(Self {
            session_id: session_id.ok_or(Error::WireFormatInvalid)?,
            epoch,
            prev_epochs_msgs,
            counter,
        })
    }
}

/// Signed, encrypted group payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegularGroupMessage {
    header: Vec<u8>,
    signature: Signature,
    cipher_text: Vec<u8>,
}

impl RegularGroupMessage {
    pub(crate) fn new(header: Vec<u8>, signature: Signature, cipher_text: Vec<u8>) -> Self {
        Self {
            header,
            signature,
            cipher_text,
        }
    }

    #[must_use]
    pub fn header_bytes(&self) -> &[u8] {
        &self.header
    }

    pub fn header(&self) -> Result<RegularGroupMessageHeader> {
        RegularGroupMessageHeader::from_bytes(&self.header)
    }

    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    #[must_use]
    pub fn cipher_text(&self) -> &[u8] {
        &self.cipher_text
    }

    /// Bytes covered by the signature.
    pub(crate) fn signed_bytes(header: &[u8], cipher_text: &[u8]) -> Vec<u8> {
        let mut signed = Vec::with_capacity(header.len() + cipher_text.len());
        signed.extend_from_slice(header);
        signed.extend_from_slice(cipher_text);
        signed
    }

    fn encode(&self, writer: &mut Writer) {
        writer.put_bytes(1, &self.header);
        writer.put_bytes(2, &self.signature);
        writer.put_bytes(3, &self.cipher_text);
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut header = None;
        let mut signature = None;
        let mut cipher_text = None;

        let mut reader = Reader::new(bytes);
        while let Some((tag, field)) = reader.next_field()? {
            match tag {
                1 => header = Some(field.as_bytes()?),
                2 => {
                    let raw: Signature = field
                        .as_bytes()?
                        .try_into()
                        .map_err(|_| Error::WireFormatInvalid)?;
                    signature = Some(raw);
                }
                3 => cipher_text = Some(field.as_bytes()?),
                _ => {}
            }
        }

        let header = header.ok_or(Error::WireFormatInvalid)?;
        if header.len() > MAX_GROUP_HEADER_FIELD_LEN {
            return Err(Error::WireFormatInvalid);
        }

        Ok(Self {
            header: header.to_vec(),
            signature: signature.ok_or(Error::WireFormatInvalid)?,
            cipher_text: cipher_text.ok_or(Error::WireFormatInvalid)?.to_vec(),
        })
    }
}

/// Payload of a [`GroupMessage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupMessageBody {
    GroupInfo(MessageGroupInfo),
    Regular(RegularGroupMessage),
}

/// Top-level group message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMessage {
    version: u32,
    body: GroupMessageBody,
}

impl GroupMessage {
    pub(crate) fn new(body: GroupMessageBody) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            body,
        }
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    #[must_use]
    pub fn body(&self) -> &GroupMessageBody {
        &self.body
    }

    #[must_use]
    pub fn message_type(&self) -> GroupMessageType {
        match self.body {
            GroupMessageBody::GroupInfo(_) => GroupMessageType::GroupInfo,
            GroupMessageBody::Regular(_) => GroupMessageType::Regular,
        }
    }

    #[must_use]
    pub fn group_info(&self) -> Option<&MessageGroupInfo> {
        match &self.body {
            GroupMessageBody::GroupInfo(info) => Some(info),
            GroupMessageBody::Regular(_) => None,
        }
    }

    #[must_use]
    pub fn regular_message(&self) -> Option<&RegularGroupMessage> {
        match &self.body {
            GroupMessageBody::Regular(regular) => Some(regular),
            GroupMessageBody::GroupInfo(_) => None,
        }
    }

    pub fn session_id(&self) -> Result<[u8; 32]> {
        match &self.body {
            GroupMessageBody::GroupInfo(info) => Ok(info.session_id),
            GroupMessageBody::Regular(regular) => Ok(regular.header()?.session_id),
        }
    }

    pub fn epoch(&self) -> Result<u32> {
        match &self.body {
            GroupMessageBody::GroupInfo(info) => Ok(info.epoch),
            GroupMessageBody::Regular(regular) => Ok(regular.header()?.epoch),
        }
    }

    /// Counter of a regular message; group info messages have none.
    pub fn counter(&self) -> Result<u32> {
        match &self.body {
            GroupMessageBody::GroupInfo(_) => Err(Error::BadMessageType),
            GroupMessageBody::Regular(regular) => Ok(regular.header()?.counter),
        }
    }

    /// Encodes the message for transport.
    ///
    /// The output of a group info message holds the epoch key.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut inner = Writer::new();
        let mut writer = Writer::new();
        writer.put_u32(1, self.version);
        match &self.body {
            GroupMessageBody::GroupInfo(info) => {
                info.encode(&mut inner);
                writer.put_bytes(2, &inner.into_bytes());
            }
            GroupMessageBody::Regular(regular) => {
                regular.encode(&mut inner);
                writer.put_bytes(3, &inner.into_bytes());
            }
        }
        writer.into_bytes()
    }

    /// Decodes a message received from the transport.
    ///
    /// Exactly one body must be present.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut version = None;
        let mut body = None;

        let mut reader = Reader::new(bytes);
        while let Some((tag, field)) = reader.next_field()? {
            let decoded = match tag {
                1 => {
                    version = Some(field.as_u32()?);
                    continue;
                }
                2 => GroupMessageBody::GroupInfo(MessageGroupInfo::decode(field.as_bytes()?)?),
                3 => GroupMessageBody::Regular(RegularGroupMessage::decode(field.as_bytes()?)?),
                _ => continue,
            };
            if body.replace(decoded).is_some() {
                return Err(Error::WireFormatInvalid);
            }
        }

        if version.ok_or(Error::WireFormatInvalid)? != PROTOCOL_VERSION {
            return Err(Error::BadMessageVersion);
        }

        Ok(Self {
            version: PROTOCOL_VERSION,
            body: body.ok_or(Error::WireFormatInvalid)?,
        })
    }
}
