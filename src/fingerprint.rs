//! Numeric safety fingerprint.
//!
//! Users compare the 60 digits out of band to confirm they hold the same
//! set of identities. The identifiers are sorted first, so every member of a
//! conversation computes the same number.

use crate::error::{Error, Result};

use sha2::{Digest, Sha384};

const ITERATIONS: usize = 4096;
const GROUPS: usize = 12;
const GROUP_MODULUS: u32 = 100_000;

/// 12 space-separated groups of 5 digits over `ids`.
///
/// ```
/// use ratchet_session::number_fingerprint;
///
/// let fingerprint = number_fingerprint(&["b", "c", "a"])?;
/// assert_eq!(
///     fingerprint,
///     "95767 63932 18392 87777 58010 79361 43185 89666 69268 33576 75875 36436"
/// );
/// # Ok::<(), ratchet_session::Error>(())
/// ```
pub fn number_fingerprint<I: AsRef<[u8]>>(ids: &[I]) -> Result<String> {
    if ids.is_empty() || ids.iter().any(|id| id.as_ref().is_empty()) {
        return Err(Error::InvalidFingerprintInput);
    }

    let mut sorted: Vec<&[u8]> = ids.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();
    let input = sorted.concat();

    let mut hash = Vec::new();
    for _ in 0..ITERATIONS {
        let mut hasher = Sha384::new();
        hasher.update(&input);
        hasher.update(&hash);
        hash = hasher.finalize().to_vec();
    }

    let groups: Vec<String> = hash
        .chunks_exact(4)
        .take(GROUPS)
        .map(|chunk| {
            let value = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            format!("{:05}", value % GROUP_MODULUS)
        })
        .collect();
    Ok(groups.join(" "))
}
