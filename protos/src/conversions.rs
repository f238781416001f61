// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Conversions between the wire-level digest message and `hashing::Digest`.

use crate::pb::build::bazel::remote::execution::v2 as remexec;

impl From<hashing::Digest> for remexec::Digest {
    fn from(digest: hashing::Digest) -> Self {
        remexec::Digest {
            hash: digest.hash.to_hex(),
            size_bytes: digest.size_bytes as i64,
        }
    }
}

impl From<&hashing::Digest> for remexec::Digest {
    fn from(digest: &hashing::Digest) -> Self {
        (*digest).into()
    }
}

impl TryFrom<&remexec::Digest> for hashing::Digest {
    type Error = String;

    fn try_from(digest: &remexec::Digest) -> Result<Self, String> {
        let hash = hashing::Fingerprint::from_hex(&digest.hash)
            .map_err(|err| format!("Cannot parse digest hash: {err}"))?;
        Ok(hashing::Digest::new(hash, digest.size_bytes as usize))
    }
}

impl TryFrom<remexec::Digest> for hashing::Digest {
    type Error = String;

    fn try_from(digest: remexec::Digest) -> Result<Self, String> {
        (&digest).try_into()
    }
}

/// Unwrap the digest field of a protobuf message. The Remote Execution API models
/// digests as optional fields even where they are semantically required.
pub fn require_digest<'a, D: Into<Option<&'a remexec::Digest>>>(
    digest_opt: D,
) -> Result<hashing::Digest, String> {
    digest_opt
        .into()
        .ok_or_else(|| "A required digest field was not set".to_owned())
        .and_then(|digest| hashing::Digest::try_from(digest))
}
