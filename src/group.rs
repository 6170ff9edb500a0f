//! Group sessions with epoch rotation.
//!
//! A group runs in epochs. Each epoch has one random key, distributed by a
//! [`GroupTicket`] over pairwise sessions. Every member derives its own
//! sending chain from that key and ratchets it per message, so members never
//! share a chain within an epoch:
//!
//! ```text
//! chain(member, epoch) = HKDF(salt = session_id, ikm = epoch_key,
//!                             info = GROUP_CHAIN_INFO || member_id || epoch_le)
//! ```
//!
//! Messages are encrypted with the sender's chain and signed with the
//! sender's X25519 identity key (XEdDSA), so receivers authenticate the
//! sender without trusting the other members.
//!
//! Membership changes are new epochs. A removed member never receives the
//! new ticket and cannot read anything sent after the rotation. Each member
//! keeps the last `max_group_epochs` epochs per peer; messages from older
//! epochs fail with [`Error::EpochNotFound`].

use crate::config::RatchetConfig;
use crate::error::{Error, Result};
use crate::group_message::{
    GroupMessage, GroupMessageBody, MessageGroupInfo, RegularGroupMessage,
    RegularGroupMessageHeader, PREV_EPOCHS_WINDOW,
};
use crate::kdf::ChainKey;
use crate::keys::{PublicKey, SecretKey, SymmetricKey, KEY_SIZE_32};
use crate::provider::{generate_nonce, CryptoProvider, DefaultProvider};
use crate::ring::EvictingRing;
use crate::skipped::SkippedKeys;

use std::collections::HashSet;
use tracing::{debug, trace, warn};
use zeroize::Zeroize;

pub(crate) const GROUP_CHAIN_INFO: &[u8] = b"RatchetSession_GroupChain_v1";

const STATE_VERSION: u32 = 1;

/// Application-chosen member identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParticipantId([u8; KEY_SIZE_32]);

impl ParticipantId {
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_SIZE_32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE_32] {
        &self.0
    }
}

impl std::fmt::Debug for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ParticipantId({:02x}{:02x}{:02x}{:02x}..)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

/// A member as known to the others: id and identity public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticipantInfo {
    pub id: ParticipantId,
    pub public_key: PublicKey,
}

/// Key material for one epoch, sent to every member over a pairwise
/// session.
///
/// ```
/// use ratchet_session::{DefaultProvider, GroupSession, GroupTicket};
///
/// let mut provider = DefaultProvider::new();
/// let session_id = GroupSession::generate_session_id(&mut provider);
/// let ticket = GroupTicket::new(&mut provider, session_id);
///
/// let wire = ticket.message().to_bytes();
/// let received = GroupTicket::from_message(&ratchet_session::GroupMessage::from_bytes(&wire)?)?;
/// assert_eq!(received.epoch(), 0);
/// # Ok::<(), ratchet_session::Error>(())
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct GroupTicket {
    info: MessageGroupInfo,
}

impl GroupTicket {
    /// Ticket for epoch 0 of a new group.
    pub fn new<P: CryptoProvider + ?Sized>(provider: &mut P, session_id: [u8; KEY_SIZE_32]) -> Self {
        Self::for_epoch(provider, session_id, 0)
    }

    fn for_epoch<P: CryptoProvider + ?Sized>(
        provider: &mut P,
        session_id: [u8; KEY_SIZE_32],
        epoch: u32,
    ) -> Self {
        let mut raw = [0u8; KEY_SIZE_32];
        provider.fill_random(&mut raw);
        let key = SymmetricKey::from_bytes(raw);
        raw.zeroize();

        Self {
            info: MessageGroupInfo {
                session_id,
                epoch,
                key,
            },
        }
    }

    /// Reads a ticket out of a received group info message.
    pub fn from_message(message: &GroupMessage) -> Result<Self> {
        let info = message.group_info().ok_or(Error::BadMessageType)?;
        Ok(Self { info: info.clone() })
    }

    #[must_use]
    pub fn session_id(&self) -> &[u8; KEY_SIZE_32] {
        &self.info.session_id
    }

    #[must_use]
    pub fn epoch(&self) -> u32 {
        self.info.epoch
    }

    /// Group info message for distribution.
    #[must_use]
    pub fn message(&self) -> GroupMessage {
        GroupMessage::new(GroupMessageBody::GroupInfo(self.info.clone()))
    }

    #[must_use]
    pub fn into_message(self) -> GroupMessage {
        GroupMessage::new(GroupMessageBody::GroupInfo(self.info))
    }

    fn key(&self) -> &SymmetricKey {
        &self.info.key
    }
}

impl std::fmt::Debug for GroupTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupTicket")
            .field("epoch", &self.info.epoch)
            .finish_non_exhaustive()
    }
}

/// A peer's chain in one epoch.
///
/// `chain_key` is dropped once the epoch is closed; late messages are then
/// served from `skipped` only.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct ParticipantEpoch {
    epoch: u32,
    chain_key: Option<ChainKey>,
    skipped: SkippedKeys,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct ParticipantData {
    id: ParticipantId,
    public_key: PublicKey,
    epochs: EvictingRing<ParticipantEpoch>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct GroupSessionState {
    version: u32,
    config: RatchetConfig,
    session_id: [u8; KEY_SIZE_32],
    my_id: ParticipantId,
    my_public_key: PublicKey,
    my_epoch: u32,
    my_chain_key: ChainKey,
    /// Entry `i`: messages I sent in epoch `my_epoch - 1 - i`.
    messages_count: [u32; PREV_EPOCHS_WINDOW],
    participants: Vec<ParticipantData>,
}

/// One member's view of a group.
///
/// Not internally synchronized, like [`Session`](crate::session::Session).
pub struct GroupSession<P: CryptoProvider = DefaultProvider> {
    provider: P,
    my_private_key: SecretKey,
    state: GroupSessionState,
}

impl<P: CryptoProvider> GroupSession<P> {
    /// Joins a group at the ticket's epoch.
    ///
    /// `participants` lists every other member; it must not contain
    /// `my_id`.
    pub fn new(
        provider: P,
        config: RatchetConfig,
        my_id: ParticipantId,
        my_private_key: SecretKey,
        ticket: &GroupTicket,
        participants: &[ParticipantInfo],
    ) -> Result<Self> {
        config.validate()?;
        check_members(&config, my_id, participants)?;

        let state = GroupSessionState {
            version: STATE_VERSION,
            config,
            session_id: *ticket.session_id(),
            my_id,
            my_public_key: my_private_key.public_key(),
            my_epoch: ticket.epoch(),
            my_chain_key: participant_chain(&provider, ticket, my_id)?,
            messages_count: [0; PREV_EPOCHS_WINDOW],
            participants: new_participants(&provider, &config, ticket, participants)?,
        };

        debug!(
            target: "ratchet_session::group",
            epoch = ticket.epoch(),
            participants = participants.len(),
            "joined group"
        );

        Ok(Self {
            provider,
            my_private_key,
            state,
        })
    }

    /// Random group session identifier.
    pub fn generate_session_id(provider: &mut P) -> [u8; KEY_SIZE_32] {
        let mut id = [0u8; KEY_SIZE_32];
        provider.fill_random(&mut id);
        id
    }

    /// Resets the session to the ticket's group and epoch.
    ///
    /// All peer chains and skipped keys are dropped. A ticket for this group
    /// must carry a later epoch than the current one, otherwise the sending
    /// chain would restart on keys already used.
    pub fn setup_session_state(
        &mut self,
        ticket: &GroupTicket,
        participants: &[ParticipantInfo],
    ) -> Result<()> {
        if ticket.session_id() == &self.state.session_id && ticket.epoch() <= self.state.my_epoch {
            warn!(
                target: "ratchet_session::group",
                epoch = ticket.epoch(),
                my_epoch = self.state.my_epoch,
                "refusing to reset to a used epoch"
            );
            return Err(Error::InvalidSessionState);
        }

        let config = self.state.config;
        check_members(&config, self.state.my_id, participants)?;

        let my_chain_key = participant_chain(&self.provider, ticket, self.state.my_id)?;
        let new_participants = new_participants(&self.provider, &config, ticket, participants)?;

        self.state.session_id = *ticket.session_id();
        self.state.my_epoch = ticket.epoch();
        self.state.my_chain_key = my_chain_key;
        self.state.messages_count = [0; PREV_EPOCHS_WINDOW];
        self.state.participants = new_participants;

        debug!(
            target: "ratchet_session::group",
            epoch = ticket.epoch(),
            participants = participants.len(),
            "reset group session"
        );
        Ok(())
    }

    /// Moves to the ticket's epoch, applying a membership change.
    ///
    /// The ticket must belong to this group and carry a later epoch.
    /// Removed members are forgotten along with their old epochs; retained
    /// members keep theirs so late messages still decrypt.
    pub fn update_session_state(
        &mut self,
        ticket: &GroupTicket,
        add: &[ParticipantInfo],
        remove: &[ParticipantId],
    ) -> Result<()> {
        if ticket.session_id() != &self.state.session_id {
            return Err(Error::SessionIdMismatch);
        }
        if ticket.epoch() <= self.state.my_epoch {
            return Err(Error::InvalidEpoch);
        }

        for id in remove {
            if !self.state.participants.iter().any(|p| p.id == *id) {
                return Err(Error::ParticipantNotFound);
            }
        }
        let mut members: Vec<ParticipantInfo> = self
            .state
            .participants
            .iter()
            .filter(|p| !remove.contains(&p.id))
            .map(|p| ParticipantInfo {
                id: p.id,
                public_key: p.public_key,
            })
            .collect();
        members.extend_from_slice(add);
        let config = self.state.config;
        check_members(&config, self.state.my_id, &members)?;

        let my_chain_key = participant_chain(&self.provider, ticket, self.state.my_id)?;
        let mut next_epochs = Vec::with_capacity(members.len());
        for member in &members {
            next_epochs.push(new_epoch(&self.provider, &config, ticket, member.id)?);
        }

        self.state.participants.retain(|p| !remove.contains(&p.id));
        for (member, epoch) in members.iter().zip(next_epochs) {
            match self.state.participants.iter_mut().find(|p| p.id == member.id) {
                Some(participant) => {
                    participant.epochs.push(epoch);
                }
                None => {
                    let mut epochs = EvictingRing::new(config.max_group_epochs);
                    epochs.push(epoch);
                    self.state.participants.push(ParticipantData {
                        id: member.id,
                        public_key: member.public_key,
                        epochs,
                    });
                }
            }
        }

        self.state.messages_count = shift_window(
            self.state.messages_count,
            self.state.my_epoch,
            ticket.epoch(),
            self.state.my_chain_key.index(),
        );
        self.state.my_epoch = ticket.epoch();
        self.state.my_chain_key = my_chain_key;

        debug!(
            target: "ratchet_session::group",
            epoch = ticket.epoch(),
            added = add.len(),
            removed = remove.len(),
            participants = self.state.participants.len(),
            "rotated group epoch"
        );
        Ok(())
    }

    /// Ticket for the next epoch.
    ///
    /// Distribute it to the members of the next epoch, then apply it here
    /// with [`update_session_state`](Self::update_session_state).
    pub fn create_group_ticket(&mut self) -> Result<GroupTicket> {
        let epoch = self
            .state
            .my_epoch
            .checked_add(1)
            .ok_or(Error::CounterOverflow)?;
        Ok(GroupTicket::for_epoch(
            &mut self.provider,
            self.state.session_id,
            epoch,
        ))
    }

    /// Encrypts and signs `plaintext` for every current member.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<GroupMessage> {
        self.state.config.check_plain_text(plaintext)?;

        let (next, message_key) = self.state.my_chain_key.advance(&self.provider)?;
        let header = RegularGroupMessageHeader {
            session_id: self.state.session_id,
            epoch: self.state.my_epoch,
            prev_epochs_msgs: self.state.messages_count,
            counter: message_key.index(),
        };
        let header_bytes = header.to_bytes();

        let nonce = generate_nonce(header.counter, self.state.my_id.as_bytes());
        let cipher_text = self.provider.aead_encrypt(
            message_key.key(),
            &nonce,
            plaintext,
            &authenticated_data(&self.state.my_id, &header_bytes),
        )?;
        let signature = self.provider.sign(
            &self.my_private_key,
            &RegularGroupMessage::signed_bytes(&header_bytes, &cipher_text),
        )?;
        self.state.my_chain_key = next;

        trace!(
            target: "ratchet_session::group",
            epoch = header.epoch,
            counter = header.counter,
            len = plaintext.len(),
            "encrypted group message"
        );
        Ok(GroupMessage::new(GroupMessageBody::Regular(
            RegularGroupMessage::new(header_bytes, signature, cipher_text),
        )))
    }

    /// Decrypts a message from `sender`.
    pub fn decrypt(&mut self, message: &GroupMessage, sender: &ParticipantId) -> Result<Vec<u8>> {
        let regular = message.regular_message().ok_or(Error::BadMessageType)?;
        let header = regular.header()?;

        if header.session_id != self.state.session_id {
            warn!(target: "ratchet_session::group", "message for another group");
            return Err(Error::SessionIdMismatch);
        }

        let max_skip = self.state.config.max_skipped_messages;
        let participant = self
            .state
            .participants
            .iter_mut()
            .find(|p| p.id == *sender)
            .ok_or(Error::ParticipantNotFound)?;

        if participant.epochs.find(|e| e.epoch == header.epoch).is_none() {
            warn!(
                target: "ratchet_session::group",
                sender = ?sender,
                epoch = header.epoch,
                "no such epoch"
            );
            return Err(Error::EpochNotFound);
        }

        let signed = RegularGroupMessage::signed_bytes(regular.header_bytes(), regular.cipher_text());
        self.provider
            .verify(&participant.public_key, &signed, regular.signature())
            .map_err(|err| {
                warn!(
                    target: "ratchet_session::group",
                    sender = ?sender,
                    "group message signature rejected"
                );
                err
            })?;

        let entry = participant
            .epochs
            .find_mut(|e| e.epoch == header.epoch)
            .ok_or(Error::EpochNotFound)?;

        let (message_key, advanced) = match &entry.chain_key {
            Some(chain) if header.counter >= chain.index() => {
                let (next, skipped, message_key) =
                    chain.derive_to(&self.provider, header.counter, max_skip)?;
                (message_key, Some((next, skipped)))
            }
            _ => {
                let message_key = entry.skipped.take(header.counter).ok_or_else(|| {
                    warn!(
                        target: "ratchet_session::group",
                        epoch = header.epoch,
                        counter = header.counter,
                        "no key for group message"
                    );
                    Error::DuplicateOrMissingMessage
                })?;
                (message_key, None)
            }
        };

        let nonce = generate_nonce(header.counter, sender.as_bytes());
        let plaintext = self.provider.aead_decrypt(
            message_key.key(),
            &nonce,
            regular.cipher_text(),
            &authenticated_data(sender, regular.header_bytes()),
        )?;

        if let Some((next, skipped)) = advanced {
            entry.chain_key = Some(next);
            for key in skipped {
                entry.skipped.store(key);
            }
        }
        close_previous_epochs(&self.provider, participant, &header, max_skip);

        trace!(
            target: "ratchet_session::group",
            epoch = header.epoch,
            counter = header.counter,
            "decrypted group message"
        );
        Ok(plaintext)
    }

    #[must_use]
    pub fn session_id(&self) -> &[u8; KEY_SIZE_32] {
        &self.state.session_id
    }

    #[must_use]
    pub fn my_id(&self) -> ParticipantId {
        self.state.my_id
    }

    #[must_use]
    pub fn my_public_key(&self) -> PublicKey {
        self.state.my_public_key
    }

    #[must_use]
    pub fn my_epoch(&self) -> u32 {
        self.state.my_epoch
    }

    /// Messages sent in the current epoch.
    #[must_use]
    pub fn sender_counter(&self) -> u32 {
        self.state.my_chain_key.index()
    }

    /// Messages sent in each of the previous epochs, newest first.
    #[must_use]
    pub fn messages_count(&self) -> [u32; PREV_EPOCHS_WINDOW] {
        self.state.messages_count
    }

    #[must_use]
    pub fn participants(&self) -> Vec<ParticipantInfo> {
        self.state
            .participants
            .iter()
            .map(|p| ParticipantInfo {
                id: p.id,
                public_key: p.public_key,
            })
            .collect()
    }

    /// Retained epochs of a member, oldest first.
    #[must_use]
    pub fn participant_epochs(&self, id: &ParticipantId) -> Option<Vec<u32>> {
        self.state
            .participants
            .iter()
            .find(|p| p.id == *id)
            .map(|p| p.epochs.iter().map(|e| e.epoch).collect())
    }

    #[must_use]
    pub fn config(&self) -> &RatchetConfig {
        &self.state.config
    }
}

#[cfg(feature = "serde")]
impl<P: CryptoProvider> GroupSession<P> {
    /// Serializes the session state. The member's private key is not
    /// included.
    pub fn serialize(&self) -> Result<zeroize::Zeroizing<Vec<u8>>> {
        let bytes = bincode::serde::encode_to_vec(&self.state, bincode::config::standard())?;
        Ok(zeroize::Zeroizing::new(bytes))
    }

    /// Restores a session serialized with [`serialize`](Self::serialize).
    ///
    /// `my_private_key` must match the key the session was created with.
    pub fn deserialize(bytes: &[u8], provider: P, my_private_key: SecretKey) -> Result<Self> {
        let (state, _): (GroupSessionState, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;

        if state.version != STATE_VERSION {
            return Err(Error::DeserializationError);
        }
        state.config.validate()?;
        let consistent = state.participants.len() <= state.config.max_participants
            && state.participants.iter().all(|p| {
                p.epochs.is_within_capacity()
                    && p.epochs.iter().all(|e| e.skipped.is_within_capacity())
            });
        if !consistent {
            return Err(Error::DeserializationError);
        }
        if state.my_public_key != my_private_key.public_key() {
            return Err(Error::IdentityMismatch);
        }

        Ok(Self {
            provider,
            my_private_key,
            state,
        })
    }
}

impl<P: CryptoProvider> std::fmt::Debug for GroupSession<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupSession")
            .field("my_id", &self.state.my_id)
            .field("my_epoch", &self.state.my_epoch)
            .field("sender_counter", &self.state.my_chain_key.index())
            .field("participants", &self.state.participants.len())
            .finish_non_exhaustive()
    }
}

/// Rejects self, duplicates and oversized groups.
fn check_members(config: &RatchetConfig, my_id: ParticipantId, members: &[ParticipantInfo]) -> Result<()> {
    if members.len() > config.max_participants {
        return Err(Error::TooManyParticipants);
    }
    let mut seen = HashSet::with_capacity(members.len());
    for member in members {
        if member.id == my_id || !seen.insert(member.id) {
            return Err(Error::DuplicateParticipant);
        }
    }
    Ok(())
}

fn participant_chain<P: CryptoProvider + ?Sized>(
    provider: &P,
    ticket: &GroupTicket,
    id: ParticipantId,
) -> Result<ChainKey> {
    let mut info = Vec::with_capacity(GROUP_CHAIN_INFO.len() + KEY_SIZE_32 + 4);
    info.extend_from_slice(GROUP_CHAIN_INFO);
    info.extend_from_slice(id.as_bytes());
    info.extend_from_slice(&ticket.epoch().to_le_bytes());

    let mut output = [0u8; KEY_SIZE_32];
    let result = provider.hkdf(
        Some(ticket.session_id()),
        ticket.key().as_bytes(),
        &info,
        &mut output,
    );
    let chain_key = result.map(|()| ChainKey::new(SymmetricKey::from_bytes(output)));
    output.zeroize();
    chain_key
}

fn new_epoch<P: CryptoProvider + ?Sized>(
    provider: &P,
    config: &RatchetConfig,
    ticket: &GroupTicket,
    id: ParticipantId,
) -> Result<ParticipantEpoch> {
    Ok(ParticipantEpoch {
        epoch: ticket.epoch(),
        chain_key: Some(participant_chain(provider, ticket, id)?),
        skipped: SkippedKeys::new(config.skipped_capacity()),
    })
}

fn new_participants<P: CryptoProvider + ?Sized>(
    provider: &P,
    config: &RatchetConfig,
    ticket: &GroupTicket,
    members: &[ParticipantInfo],
) -> Result<Vec<ParticipantData>> {
    members
        .iter()
        .map(|member| {
            let mut epochs = EvictingRing::new(config.max_group_epochs);
            epochs.push(new_epoch(provider, config, ticket, member.id)?);
            Ok(ParticipantData {
                id: member.id,
                public_key: member.public_key,
                epochs,
            })
        })
        .collect()
}

/// Sender id followed by the header bytes.
fn authenticated_data(sender: &ParticipantId, header_bytes: &[u8]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(KEY_SIZE_32 + header_bytes.len());
    aad.extend_from_slice(sender.as_bytes());
    aad.extend_from_slice(header_bytes);
    aad
}

/// Message-count window after moving from `old_epoch` to `new_epoch`,
/// having sent `sent` messages in `old_epoch`.
fn shift_window(
    window: [u32; PREV_EPOCHS_WINDOW],
    old_epoch: u32,
    new_epoch: u32,
    sent: u32,
) -> [u32; PREV_EPOCHS_WINDOW] {
    let mut shifted = [0; PREV_EPOCHS_WINDOW];
    for (i, slot) in (0u32..).zip(shifted.iter_mut()) {
        let Some(epoch) = new_epoch.checked_sub(i + 1) else {
            break;
        };
        *slot = if epoch == old_epoch {
            sent
        } else if epoch < old_epoch {
            let age = old_epoch - epoch - 1;
            usize::try_from(age)
                .ok()
                .and_then(|age| window.get(age).copied())
                .unwrap_or(0)
        } else {
            0
        };
    }
    shifted
}

/// Uses the counts announced in `header` to finish the sender's earlier
/// epochs: keys still expected move into the skipped table, and the chain
/// key is dropped.
fn close_previous_epochs<P: CryptoProvider + ?Sized>(
    provider: &P,
    participant: &mut ParticipantData,
    header: &RegularGroupMessageHeader,
    max_skip: u32,
) {
    for (i, count) in (0u32..).zip(header.prev_epochs_msgs) {
        let Some(epoch) = header.epoch.checked_sub(i + 1) else {
            break;
        };
        let Some(entry) = participant.epochs.find_mut(|e| e.epoch == epoch) else {
            continue;
        };
        let Some(chain) = entry.chain_key.take() else {
            continue;
        };
        if count <= chain.index() {
            continue;
        }

        match chain.skip_to(provider, count, max_skip) {
            Ok((_, keys)) => {
                for key in keys {
                    entry.skipped.store(key);
                }
            }
            Err(_) => warn!(
                target: "ratchet_session::group",
                epoch,
                announced = count,
                "closed epoch without keeping late message keys"
            ),
        }
        debug!(
            target: "ratchet_session::group",
            sender = ?participant.id,
            epoch,
            "closed previous epoch"
        );
    }
}
