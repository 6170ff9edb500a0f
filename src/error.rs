//! Error types for pairwise and group sessions.

use thiserror::Error;

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during protocol operations.
///
/// Every failure is reported as a value. None of the messages carry key
/// material.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Message kind does not fit the operation (prekey vs. regular,
    /// group info vs. regular group message)
    #[error("bad message type")]
    BadMessageType,

    /// Unsupported protocol version on an incoming message
    #[error("bad message version")]
    BadMessageVersion,

    /// Key for this message was already used or never derived
    #[error("duplicate or missing message")]
    DuplicateOrMissingMessage,

    /// Group message refers to an epoch that is not retained
    #[error("epoch not found")]
    EpochNotFound,

    /// Ticket epoch does not move the group session forward
    #[error("invalid epoch")]
    InvalidEpoch,

    /// Group message or ticket belongs to another group session
    #[error("session id mismatch")]
    SessionIdMismatch,

    /// Handshake keys do not match the expected identity
    #[error("identity mismatch")]
    IdentityMismatch,

    /// Message counter is too far ahead of the receiving chain
    #[error("too many skipped messages")]
    TooManySkippedMessages,

    /// Plaintext exceeds the configured limit
    #[error("plain text too long")]
    PlainTextTooLong,

    /// Group would exceed the configured participant limit
    #[error("too many participants")]
    TooManyParticipants,

    /// Chain counter cannot advance any further
    #[error("message counter overflow")]
    CounterOverflow,

    /// AEAD tag did not verify
    #[error("authentication failed")]
    AeadAuthenticationFailed,

    /// Group message signature did not verify
    #[error("signature verification failed")]
    SignatureVerificationFailed,

    /// Public key bytes are malformed or of low order
    #[error("key deserialization failed")]
    KeyDeserializationFailed,

    /// Wire bytes could not be decoded
    #[error("invalid wire format")]
    WireFormatInvalid,

    /// Sender is not a participant of the group session
    #[error("participant not found")]
    ParticipantNotFound,

    /// Participant is already part of the group session
    #[error("duplicate participant")]
    DuplicateParticipant,

    /// Operation is not valid in the current session state
    #[error("invalid session state")]
    InvalidSessionState,

    /// Configuration value out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// Serialization failed
    #[error("serialization error")]
    SerializationError,

    /// Deserialization failed
    #[error("deserialization error")]
    DeserializationError,

    /// Internal cryptographic error
    #[error("cryptographic error")]
    CryptoError,

    /// Registry lock was poisoned by a panicking holder
    #[error("session registry lock poisoned")]
    LockPoisoned,

    /// Fingerprint input set is empty or contains empty identifiers
    #[error("invalid fingerprint input")]
    InvalidFingerprintInput,
}

#[cfg(feature = "serde")]
impl From<bincode::error::EncodeError> for Error {
    fn from(_: bincode::error::EncodeError) -> Self {
        Error::SerializationError
    }
}

#[cfg(feature = "serde")]
impl From<bincode::error::DecodeError> for Error {
    fn from(_: bincode::error::DecodeError) -> Self {
        Error::DeserializationError
    }
}
