// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
use super::{Digest, EMPTY_DIGEST, Fingerprint};

#[test]
fn of_bytes() {
    assert_eq!(
        Digest::of_bytes(b"abc"),
        Digest::new(
            Fingerprint::from_hex(
                "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
            )
            .unwrap(),
            3,
        )
    );
}

#[test]
fn of_empty_bytes_is_empty_digest() {
    assert_eq!(Digest::of_bytes(b""), EMPTY_DIGEST);
}

#[test]
fn display() {
    assert_eq!(
        format!("{EMPTY_DIGEST}"),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855-0"
    );
}
