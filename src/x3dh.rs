//! X3DH key agreement.
//!
//! Both sides compute the same four Diffie-Hellman outputs, in this order:
//!
//! ```text
//! DH1 = DH(IK_A, LTK_B)
//! DH2 = DH(EK_A, IK_B)
//! DH3 = DH(EK_A, LTK_B)
//! DH4 = DH(EK_A, OTK_B)      only when a one-time key was used
//! SK  = HKDF(salt = 0^32, ikm = 0xFF^32 || DH1 || DH2 || DH3 [|| DH4], info)
//! ```
//!
//! `IK` is an identity key, `LTK` the responder's long-term (signed) prekey,
//! `OTK` a one-time prekey and `EK` the initiator's ephemeral key. The
//! `0xFF` prefix separates X25519 inputs from other curve encodings.

use crate::error::Result;
use crate::keys::{DhOutput, PublicKey, SecretKey, SymmetricKey, KEY_SIZE_32};
use crate::provider::CryptoProvider;

use zeroize::Zeroize;

pub(crate) const X3DH_INFO: &[u8] = b"RatchetSession_X3DH_v1";

const F: [u8; KEY_SIZE_32] = [0xFF; KEY_SIZE_32];

/// Combines the DH outputs into the initial root key.
pub fn derive_shared_secret<P: CryptoProvider + ?Sized>(
    provider: &P,
    dh1: &DhOutput,
    dh2: &DhOutput,
    dh3: &DhOutput,
    dh4: Option<&DhOutput>,
) -> Result<SymmetricKey> {
    let mut ikm = [0u8; KEY_SIZE_32 * 5];
    let mut len = 0;

    let parts = [
        Some(&F),
        Some(dh1.as_bytes()),
        Some(dh2.as_bytes()),
        Some(dh3.as_bytes()),
        dh4.map(DhOutput::as_bytes),
    ];
    for part in parts.into_iter().flatten() {
        ikm[len..len + KEY_SIZE_32].copy_from_slice(part);
        len += KEY_SIZE_32;
    }

    let salt = [0u8; KEY_SIZE_32];
    let mut output = [0u8; KEY_SIZE_32];
    let result = provider.hkdf(Some(&salt), &ikm[..len], X3DH_INFO, &mut output);
    ikm.zeroize();
    result?;

    let secret = SymmetricKey::from_bytes(output);
    output.zeroize();
    Ok(secret)
}

/// Initiator side: identity and ephemeral secrets against the responder's
/// published keys.
pub fn initiator_secret<P: CryptoProvider + ?Sized>(
    provider: &P,
    identity: &SecretKey,
    ephemeral: &SecretKey,
    receiver_identity: &PublicKey,
    receiver_long_term: &PublicKey,
    receiver_one_time: Option<&PublicKey>,
) -> Result<SymmetricKey> {
    let dh1 = provider.diffie_hellman(identity, receiver_long_term)?;
    let dh2 = provider.diffie_hellman(ephemeral, receiver_identity)?;
    let dh3 = provider.diffie_hellman(ephemeral, receiver_long_term)?;
    let dh4 = receiver_one_time
        .map(|one_time| provider.diffie_hellman(ephemeral, one_time))
        .transpose()?;

    derive_shared_secret(provider, &dh1, &dh2, &dh3, dh4.as_ref())
}

/// Responder side: own identity, long-term and one-time secrets against the
/// initiator's identity and ephemeral keys.
pub fn responder_secret<P: CryptoProvider + ?Sized>(
    provider: &P,
    identity: &SecretKey,
    long_term: &SecretKey,
    one_time: Option<&SecretKey>,
    sender_identity: &PublicKey,
    sender_ephemeral: &PublicKey,
) -> Result<SymmetricKey> {
    let dh1 = provider.diffie_hellman(long_term, sender_identity)?;
    let dh2 = provider.diffie_hellman(identity, sender_ephemeral)?;
    let dh3 = provider.diffie_hellman(long_term, sender_ephemeral)?;
    let dh4 = one_time
        .map(|one_time| provider.diffie_hellman(one_time, sender_ephemeral))
        .transpose()?;

    derive_shared_secret(provider, &dh1, &dh2, &dh3, dh4.as_ref())
}
