//! XEdDSA signatures over X25519 keys.
//!
//! Group members sign with the same X25519 identity key they use for the
//! pairwise handshake. Follows "The XEdDSA and VXEdDSA Signature Schemes",
//! revision 1.

use crate::error::{Error, Result};
use crate::keys::{PublicKey, SecretKey};
use curve25519_dalek::{
    constants::ED25519_BASEPOINT_TABLE,
    edwards::{CompressedEdwardsY, EdwardsPoint},
    montgomery::MontgomeryPoint,
    scalar::Scalar,
};
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Signature length: compressed R followed by scalar s.
pub const SIGNATURE_LENGTH: usize = 64;

/// Random input length for nonce derivation.
pub const SIGNING_RANDOM_LENGTH: usize = 64;

/// Detached XEdDSA signature.
pub type Signature = [u8; SIGNATURE_LENGTH];

/// Edwards signing scalar `a` and its public point `A` (sign bit clear).
#[derive(Zeroize, ZeroizeOnDrop)]
struct SigningScalar {
    a: Scalar,
    #[zeroize(skip)]
    public: CompressedEdwardsY,
}

impl SigningScalar {
    fn from_secret(secret: &SecretKey) -> Self {
        let mut k = *secret.as_bytes();
        k[0] &= 248;
        k[31] &= 127;
        k[31] |= 64;

        let k_scalar = Scalar::from_bytes_mod_order(k);
        k.zeroize();

        let e = (&k_scalar * ED25519_BASEPOINT_TABLE).compress();
        let negate = (e.as_bytes()[31] >> 7) & 1 == 1;
        let a = if negate { -k_scalar } else { k_scalar };

        let mut public = *e.as_bytes();
        public[31] &= 0x7F;

        Self {
            a,
            public: CompressedEdwardsY(public),
        }
    }
}

/// Maps an X25519 public key onto its Edwards form with sign bit 0.
fn edwards_public(public: &PublicKey) -> Result<CompressedEdwardsY> {
    let mut u = *public.as_bytes();
    u[31] &= 0x7F;

    let edwards = MontgomeryPoint(u)
        .to_edwards(0)
        .ok_or(Error::KeyDeserializationFailed)?;

    let mut bytes = *edwards.compress().as_bytes();
    bytes[31] &= 0x7F;
    Ok(CompressedEdwardsY(bytes))
}

fn wide_scalar(hasher: Sha512) -> Scalar {
    let digest = hasher.finalize();
    let mut wide = [0u8; 64];
    wide.copy_from_slice(&digest);
    let scalar = Scalar::from_bytes_mod_order_wide(&wide);
    wide.zeroize();
    scalar
}

/// h = SHA-512(R || A || M) mod q
fn challenge(r: &CompressedEdwardsY, a: &CompressedEdwardsY, message: &[u8]) -> Scalar {
    let mut hasher = Sha512::new();
    hasher.update(r.as_bytes());
    hasher.update(a.as_bytes());
    hasher.update(message);
    wide_scalar(hasher)
}

/// Signs `message` with an X25519 secret key.
#[must_use]
pub fn sign(secret: &SecretKey, message: &[u8], random: &[u8; SIGNING_RANDOM_LENGTH]) -> Signature {
    let key = SigningScalar::from_secret(secret);

    // r = hash1(a || M || Z)
    let mut hasher = Sha512::new();
    hasher.update([0xFE]);
    hasher.update([0xFF; 31]);
    hasher.update(key.a.as_bytes());
    hasher.update(message);
    hasher.update(random);
    let mut r = wide_scalar(hasher);

    let r_point = (&r * ED25519_BASEPOINT_TABLE).compress();
    let h = challenge(&r_point, &key.public, message);
    let s = r + h * key.a;
    r.zeroize();

    let mut signature = [0u8; SIGNATURE_LENGTH];
    signature[..32].copy_from_slice(r_point.as_bytes());
    signature[32..].copy_from_slice(s.as_bytes());
    signature
}

/// Verifies an XEdDSA signature against an X25519 public key.
pub fn verify(public: &PublicKey, message: &[u8], signature: &Signature) -> Result<()> {
    let a_compressed = edwards_public(public)?;
    let a_point = a_compressed
        .decompress()
        .ok_or(Error::KeyDeserializationFailed)?;
    if !a_point.is_torsion_free() {
        return Err(Error::KeyDeserializationFailed);
    }

    let mut r_bytes = [0u8; 32];
    let mut s_bytes = [0u8; 32];
    r_bytes.copy_from_slice(&signature[..32]);
    s_bytes.copy_from_slice(&signature[32..]);

    let r_compressed = CompressedEdwardsY(r_bytes);
    if r_compressed.decompress().is_none() {
        return Err(Error::SignatureVerificationFailed);
    }

    let s: Option<Scalar> = Scalar::from_canonical_bytes(s_bytes).into();
    let s = s.ok_or(Error::SignatureVerificationFailed)?;

    let h = challenge(&r_compressed, &a_compressed, message);
    let r_check = EdwardsPoint::vartime_double_scalar_mul_basepoint(&h, &-a_point, &s);

    if r_check.compress().as_bytes().ct_eq(&r_bytes).into() {
        Ok(())
    } else {
        Err(Error::SignatureVerificationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::{OsRng, RngCore};

    fn random() -> [u8; SIGNING_RANDOM_LENGTH] {
        let mut z = [0u8; SIGNING_RANDOM_LENGTH];
        OsRng.fill_bytes(&mut z);
        z
    }

    #[test]
    fn test_sign_verify() {
        let secret = SecretKey::generate(&mut OsRng);
        let message = b"group header and ciphertext";

        let signature = sign(&secret, message, &random());
        verify(&secret.public_key(), message, &signature).unwrap();
    }

    #[test]
    fn test_many_keys_verify() {
        // Half of all keys need the sign-bit negation.
        for _ in 0..32 {
            let secret = SecretKey::generate(&mut OsRng);
            let signature = sign(&secret, b"m", &random());
            verify(&secret.public_key(), b"m", &signature).unwrap();
        }
    }

    #[test]
    fn test_wrong_message_rejected() {
        let secret = SecretKey::generate(&mut OsRng);
        let signature = sign(&secret, b"original", &random());

        assert_eq!(
            verify(&secret.public_key(), b"different", &signature),
            Err(Error::SignatureVerificationFailed)
        );
    }

    #[test]
    fn test_wrong_key_rejected() {
        let secret = SecretKey::generate(&mut OsRng);
        let other = SecretKey::generate(&mut OsRng);
        let signature = sign(&secret, b"message", &random());

        assert!(verify(&other.public_key(), b"message", &signature).is_err());
    }

    #[test]
    fn test_non_canonical_scalar_rejected() {
        let secret = SecretKey::generate(&mut OsRng);
        let mut signature = sign(&secret, b"message", &random());
        signature[63] = 0xFF;

        assert!(verify(&secret.public_key(), b"message", &signature).is_err());
    }
}
