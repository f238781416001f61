// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
use crate::{FINGERPRINT_SIZE, Fingerprint};

#[test]
fn hex_round_trip() {
    let fingerprint = Fingerprint(std::array::from_fn(|i| i as u8));
    assert_eq!(
        fingerprint.to_hex(),
        "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f"
    );
    assert_eq!(
        Fingerprint::from_hex(&fingerprint.to_hex()).unwrap(),
        fingerprint
    );
}

#[test]
fn from_hex_accepts_uppercase() {
    assert_eq!(
        Fingerprint::from_hex(&"F".repeat(FINGERPRINT_SIZE * 2)).unwrap(),
        Fingerprint([0xff; FINGERPRINT_SIZE])
    );
}

#[test]
fn from_hex_rejects_wrong_lengths() {
    let too_short = "a".repeat(FINGERPRINT_SIZE * 2 - 2);
    let too_long = "a".repeat(FINGERPRINT_SIZE * 2 + 2);
    for bad in ["", "ab", too_short.as_str(), too_long.as_str()] {
        Fingerprint::from_hex(bad).expect_err("Want err for a wrong-length hex string");
    }
}

#[test]
fn from_hex_rejects_non_hex_characters() {
    let err = Fingerprint::from_hex(&"g".repeat(FINGERPRINT_SIZE * 2))
        .expect_err("Want err for non-hex input");
    assert!(err.contains("hex fingerprint"), "Bad error message: {err}");
}

#[test]
fn display_and_debug_render_hex() {
    let fingerprint = Fingerprint([0x5a; FINGERPRINT_SIZE]);
    assert_eq!(format!("{fingerprint}"), "5a".repeat(FINGERPRINT_SIZE));
    assert_eq!(
        format!("{fingerprint:?}"),
        format!("Fingerprint({})", "5a".repeat(FINGERPRINT_SIZE))
    );
}

#[test]
fn ordering_follows_byte_values() {
    let mut fingerprints = vec![
        Fingerprint([0x80; FINGERPRINT_SIZE]),
        Fingerprint([0x01; FINGERPRINT_SIZE]),
        Fingerprint(std::array::from_fn(|i| if i == 0 { 0x01 } else { 0xff })),
    ];
    fingerprints.sort();
    assert_eq!(
        fingerprints,
        vec![
            Fingerprint([0x01; FINGERPRINT_SIZE]),
            Fingerprint(std::array::from_fn(|i| if i == 0 { 0x01 } else { 0xff })),
            Fingerprint([0x80; FINGERPRINT_SIZE]),
        ]
    );
}
