// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Content hashing for the output service: a fixed-width SHA-256 fingerprint, and the
//! (fingerprint, size) pair the remote execution protocol addresses blobs by.

use std::fmt;

use sha2::{Digest as _, Sha256};

pub const FINGERPRINT_SIZE: usize = 32;

/// SHA-256 of the empty input.
pub const EMPTY_FINGERPRINT: Fingerprint = Fingerprint([
    0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14,
    0x9a, 0xfb, 0xf4, 0xc8, 0x99, 0x6f, 0xb9, 0x24,
    0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c,
    0xa4, 0x95, 0x99, 0x1b, 0x78, 0x52, 0xb8, 0x55,
]);

pub const EMPTY_DIGEST: Digest = Digest {
    hash: EMPTY_FINGERPRINT,
    size_bytes: 0,
};

/// A 256-bit content hash, held as raw bytes and rendered as lowercase hex.
#[derive(Clone, Copy, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct Fingerprint(pub [u8; FINGERPRINT_SIZE]);

impl Fingerprint {
    /// Parse a fingerprint from its hex rendering. Both cases are accepted; anything
    /// that does not decode to exactly [`FINGERPRINT_SIZE`] bytes is an error.
    pub fn from_hex(hex: &str) -> Result<Fingerprint, String> {
        let mut bytes = [0_u8; FINGERPRINT_SIZE];
        hex::decode_to_slice(hex, &mut bytes).map_err(|err| {
            format!("{hex:?} is not a {FINGERPRINT_SIZE}-byte hex fingerprint: {err}")
        })?;
        Ok(Fingerprint(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

/// A content address: a blob's fingerprint together with its size in bytes.
///
/// Carries the same information as a Remote Execution API `Digest` without the
/// protobuf wrapping. The size rides along because the remote protocol addresses
/// blobs by the pair, never by the hash alone.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct Digest {
    pub hash: Fingerprint,
    pub size_bytes: usize,
}

impl Digest {
    pub fn new(hash: Fingerprint, size_bytes: usize) -> Digest {
        Digest { hash, size_bytes }
    }

    /// Hash `bytes` and pair the fingerprint with their length.
    pub fn of_bytes(bytes: &[u8]) -> Digest {
        Digest {
            hash: Fingerprint(Sha256::digest(bytes).into()),
            size_bytes: bytes.len(),
        }
    }
}

impl fmt::Display for Digest {
    // The `fingerprint-size` rendering, as used for digest-addressed filenames.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.hash, self.size_bytes)
    }
}

#[cfg(test)]
mod fingerprint_tests;

#[cfg(test)]
mod digest_tests;
