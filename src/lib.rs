//! End-to-end encrypted sessions: a Double Ratchet over an X3DH handshake,
//! and group sessions with epoch rotation.
//!
//! # Security Properties
//!
//! ## Forward Secrecy
//! Every message is encrypted under a one-time key derived from a one-way
//! chain. Message keys are zeroized after use, so a later state compromise
//! does not expose earlier messages.
//!
//! ## Post-Compromise Security
//! Each change of speaking direction mixes a fresh Diffie-Hellman output into
//! the root key. Once an honest round trip completes, a passive attacker who
//! stole the session state loses track of it.
//!
//! ## Asynchronous Start
//! The initiator encrypts against the responder's published identity,
//! long-term and optional one-time keys. The handshake keys ride along with
//! every message until the first reply arrives, so losing the first message
//! does not break the session.
//!
//! ## Groups
//! Group members share one random key per epoch, derive independent sending
//! chains from it, and sign every message. Membership changes rotate the
//! epoch; removed members cannot read what follows.
//!
//! # Threat Model
//!
//! **Assumed adversary capabilities:**
//! - Active network attacker (inject, modify, replay, reorder, drop messages)
//! - Compromise of session state at some point in time
//!
//! **Security assumptions:**
//! - X25519 ECDH provides computational security
//! - HKDF-SHA256 and HMAC-SHA256 are secure key derivation functions
//! - ChaCha20-Poly1305 is a secure AEAD cipher
//! - XEdDSA signatures over X25519 keys are unforgeable
//! - The random number generator is cryptographically secure
//!
//! # Protocol Flow
//!
//! ```rust
//! use ratchet_session::{DefaultProvider, IdentityKeyPair, RatchetConfig, SecretKey, Session};
//! use rand_core::OsRng;
//!
//! // Bob publishes his identity key, a long-term prekey and a one-time prekey.
//! let bob = IdentityKeyPair::generate(&mut OsRng);
//! let bob_long_term = SecretKey::generate(&mut OsRng);
//! let bob_one_time = SecretKey::generate(&mut OsRng);
//!
//! // Alice starts a session from Bob's published keys.
//! let alice = IdentityKeyPair::generate(&mut OsRng);
//! let mut alice_session = Session::initiate(
//!     DefaultProvider::new(),
//!     RatchetConfig::default(),
//!     &alice,
//!     bob.public_key(),
//!     bob_long_term.public_key(),
//!     Some(bob_one_time.public_key()),
//! )?;
//! let hello = alice_session.encrypt(b"Hello Bob!")?;
//!
//! // Bob answers the handshake carried by the first message.
//! let received = ratchet_session::Message::from_bytes(&hello.to_bytes())?;
//! let mut bob_session = Session::respond(
//!     DefaultProvider::new(),
//!     RatchetConfig::default(),
//!     alice.public_key(),
//!     &bob,
//!     &bob_long_term,
//!     Some(&bob_one_time),
//!     &received,
//! )?;
//! assert_eq!(bob_session.decrypt(&received)?, b"Hello Bob!");
//!
//! let reply = bob_session.encrypt(b"Hello Alice!")?;
//! assert_eq!(alice_session.decrypt(&reply)?, b"Hello Alice!");
//! assert_eq!(alice_session.id(), bob_session.id());
//! # Ok::<(), ratchet_session::Error>(())
//! ```
//!
//! # Modules
//!
//! - [`session`]: pairwise session (X3DH handshake plus Double Ratchet)
//! - [`ratchet`]: the Double Ratchet state machine
//! - [`group`]: group tickets and group sessions
//! - [`message`], [`group_message`]: wire formats
//! - [`provider`]: the primitive capability trait and its default
//! - [`kdf`], [`x3dh`], [`xeddsa`]: key derivation and signatures
//! - [`skipped`], [`ring`]: bounded storage for late message keys
//! - [`registry`]: shared ownership of live sessions
//! - [`fingerprint`]: numeric safety fingerprints
//! - [`config`], [`error`]: limits and error types

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unreachable_pub)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![warn(clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    missing_docs,
    clippy::missing_errors_doc,
    clippy::missing_fields_in_debug
)]

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod group;
pub mod group_message;
pub mod kdf;
pub mod keys;
pub mod message;
pub mod provider;
pub mod ratchet;
pub mod registry;
pub mod ring;
pub mod session;
pub mod skipped;
mod wire;
pub mod x3dh;
pub mod xeddsa;

// Re-export main types
pub use config::RatchetConfig;
pub use error::{Error, Result};
pub use fingerprint::number_fingerprint;
pub use group::{GroupSession, GroupTicket, ParticipantId, ParticipantInfo};
pub use group_message::{GroupMessage, GroupMessageType};
pub use keys::{IdentityKeyPair, PublicKey, SecretKey, SymmetricKey};
pub use message::{Message, MessageType};
pub use provider::{CryptoProvider, DefaultProvider};
pub use registry::{SessionRegistry, SharedSession};
pub use session::{Role, Session};
