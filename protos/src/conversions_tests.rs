// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
use crate::pb::build::bazel::remote::execution::v2 as remexec;
use crate::require_digest;

#[test]
fn digest_round_trips_through_the_wire_form() {
    let digest = hashing::Digest::of_bytes(b"Grey Heron");
    let wire: remexec::Digest = digest.into();
    assert_eq!(wire.hash, digest.hash.to_hex());
    assert_eq!(wire.size_bytes, 10);
    assert_eq!(hashing::Digest::try_from(&wire), Ok(digest));
}

#[test]
fn reference_and_value_conversions_agree() {
    let digest = hashing::Digest::of_bytes(b"Tawny Owl");
    let by_ref: remexec::Digest = (&digest).into();
    let by_value: remexec::Digest = digest.into();
    assert_eq!(by_ref, by_value);
}

#[test]
fn non_hex_hash_is_rejected() {
    let wire = remexec::Digest {
        hash: "not hex at all".to_owned(),
        size_bytes: 4,
    };
    let err = hashing::Digest::try_from(&wire).expect_err("Want err for a non-hex hash");
    assert!(
        err.contains("Cannot parse digest hash"),
        "Bad error message: {err}"
    );
}

#[test]
fn truncated_hash_is_rejected() {
    let wire = remexec::Digest {
        hash: "abcd".to_owned(),
        size_bytes: 4,
    };
    hashing::Digest::try_from(&wire).expect_err("Want err for a truncated hash");
}

#[test]
fn empty_digest_is_the_empty_fingerprint() {
    let converted: hashing::Digest = (&remexec::empty_digest()).try_into().unwrap();
    assert_eq!(converted, hashing::EMPTY_DIGEST);
}

#[test]
fn require_digest_unwraps_a_present_field() {
    let digest = hashing::Digest::of_bytes(b"Eurasian Wren");
    let wire: remexec::Digest = digest.into();
    assert_eq!(require_digest(Some(&wire)), Ok(digest));
}

#[test]
fn require_digest_rejects_an_unset_field() {
    let err = require_digest(Option::<&remexec::Digest>::None)
        .expect_err("Want err for an unset digest field");
    assert!(err.contains("not set"), "Bad error message: {err}");
}
