//! Security-focused tests for pgp-engine
//!
//! These tests cover key parameter floors, passphrase handling, secret
//! redaction, size limits and rejection of hostile key material.

mod common;

use common::{keypair, public};
use pgp_engine::{
    armor::{encode_packets, ArmorOptions, ArmorType},
    crypto::{
        generate_keypair, password::S2k, rsa_public_key, HashAlgorithm, KeyGenOptions, Password,
        PrivateKey, ProtectionParams, PublicKey,
    },
    encrypt,
    packet::{Mpi, PacketBody, PublicKeyPacket, SecretKeyPacket, UserIdPacket},
    sign,
    validation::{Validator, MAX_MESSAGE_SIZE, MAX_USER_ID_LENGTH},
    PgpError,
};
use rand::rngs::OsRng;

#[test]
fn test_weak_key_sizes_rejected() {
    for bits in [0, 512, 768, 1000, 2000, 3000] {
        let result = generate_keypair(&KeyGenOptions::rsa(bits, "weak@example.com"), &mut OsRng);
        assert!(
            matches!(result, Err(PgpError::WeakKeyParameters(_))),
            "{}-bit key was not rejected as weak",
            bits
        );
    }
    assert!(matches!(
        generate_keypair(&KeyGenOptions::rsa(8192, "big@example.com"), &mut OsRng),
        Err(PgpError::InvalidInput(_))
    ));
}

#[test]
fn test_unsupported_key_type_rejected() {
    for json in [
        r#"{"keyType":"ECC","userId":"a@example.com","unlocked":true}"#,
        r#"{"keyType":"dsa","userId":"a@example.com","unlocked":true}"#,
        r#"{"keyType":22,"userId":"a@example.com","unlocked":true}"#,
    ] {
        assert!(matches!(
            KeyGenOptions::from_json(json),
            Err(PgpError::UnsupportedKeyType(_))
        ));
    }
}

#[test]
fn test_unlocked_option_is_explicit() {
    let missing_passphrase =
        KeyGenOptions::from_json(r#"{"keyType":"RSA","numBits":1024,"userId":"a@example.com"}"#)
            .unwrap();
    assert!(matches!(
        generate_keypair(&missing_passphrase, &mut OsRng),
        Err(PgpError::InvalidInput(_))
    ));

    let contradictory = KeyGenOptions::from_json(
        r#"{"numBits":1024,"userId":"a@example.com","unlocked":true,"passphrase":"pw"}"#,
    )
    .unwrap();
    assert!(matches!(
        generate_keypair(&contradictory, &mut OsRng),
        Err(PgpError::InvalidInput(_))
    ));

    let empty = KeyGenOptions::rsa(1024, "a@example.com").with_passphrase("");
    assert!(matches!(
        generate_keypair(&empty, &mut OsRng),
        Err(PgpError::InvalidInput(_))
    ));
}

#[test]
fn test_secrets_not_in_debug_output() {
    let password = Password::from("very secret passphrase");
    assert!(!format!("{:?}", password).contains("very secret"));

    let private = keypair(0).private_key();
    let debug = format!("{:?}", private);
    assert!(debug.contains("locked"));
    assert!(!debug.contains("Mpi"));

    let options = KeyGenOptions::rsa(1024, "a@example.com").with_passphrase("hunter2");
    assert!(!format!("{:?}", options).contains("hunter2"));
}

/// Every S2K mode locks and unlocks, and a wrong passphrase always fails cleanly
#[test]
fn test_passphrase_protection_modes() {
    let private = keypair(1).private_key();
    let password = Password::from("pass phrase");
    for hash in [HashAlgorithm::Sha1, HashAlgorithm::Sha256, HashAlgorithm::Sha512] {
        let protection = ProtectionParams {
            s2k_hash: hash,
            s2k_count: 0x10,
        };
        let locked = private.lock_with(&password, &protection, &mut OsRng).unwrap();
        let reparsed = PrivateKey::from_armored(&locked.to_armored()).unwrap();

        for wrong in ["", "pass phrase ", "Pass phrase", "pass"] {
            assert!(matches!(
                reparsed.unlock(&Password::from(wrong)),
                Err(PgpError::WrongPassphrase)
            ));
        }
        let unlocked = reparsed.unlock(&password).unwrap();
        assert!(sign(b"x", &unlocked, &mut OsRng).is_ok());
    }
}

#[test]
fn test_locked_key_material_is_encrypted() {
    let password = Password::from("pw");
    let locked = keypair(2).private_key().lock(&password, &mut OsRng).unwrap();
    let packet = locked.to_packets()[0].parse_body::<SecretKeyPacket>().unwrap();
    match packet.secret {
        pgp_engine::packet::SecretKeyMaterial::Encrypted { usage, s2k, .. } => {
            assert_eq!(usage, 254);
            assert!(matches!(s2k, S2k::IteratedSalted { .. }));
        }
        other => panic!("locked key exported as {:?}", other),
    }
}

#[test]
fn test_oversized_message_rejected() {
    let oversized = vec![0u8; MAX_MESSAGE_SIZE + 1];
    match encrypt(&oversized, &[public(0)], &mut OsRng) {
        Err(PgpError::Validation(msg)) => assert!(msg.contains("Message too large")),
        other => panic!("expected a validation error, got {:?}", other.map(|s| s.len())),
    }
}

#[test]
fn test_user_id_limits() {
    assert!(Validator::validate_user_id("Alice <alice@example.com>").is_ok());
    assert!(Validator::validate_user_id("").is_err());
    assert!(Validator::validate_user_id(&"a".repeat(MAX_USER_ID_LENGTH + 1)).is_err());
    assert!(Validator::validate_user_id("evil\0user").is_err());
    assert!(UserIdPacket::from_bytes(&[0xFF, 0xFE]).is_err());
}

fn key_block_with(packet: PublicKeyPacket) -> String {
    let user_id = UserIdPacket::new("hostile@example.com").unwrap();
    encode_packets(
        &[packet.to_packet(), user_id.to_packet()],
        &ArmorType::PublicKey,
        &ArmorOptions::bare(),
    )
}

/// Hostile RSA parameters never reach an RSA operation
#[test]
fn test_hostile_public_keys_rejected() {
    let genuine = keypair(0).public_key().packet().clone();

    let mut small = genuine.clone();
    small.n = Mpi::from_slice(&[0xC5; 64]);
    let mut even_exponent = genuine.clone();
    even_exponent.e = Mpi::from_slice(&[2]);
    let mut huge = genuine.clone();
    huge.n = Mpi::from_slice(&[0xFF; 1025]);

    // A 512-bit modulus behind 64 zero bytes, declared as 1024 bits
    let mut encoded = vec![0x04, 0x00];
    encoded.extend_from_slice(&[0x00; 64]);
    encoded.extend_from_slice(&[0xC5; 64]);
    let mut padded = genuine.clone();
    padded.n = Mpi::parse(&encoded, 0).unwrap().0;

    for packet in [&small, &even_exponent, &huge, &padded] {
        assert!(matches!(
            rsa_public_key(packet),
            Err(PgpError::InvalidPublicKey(_))
        ));
    }
    rsa_public_key(&genuine).unwrap();

    for packet in [small, even_exponent, huge, padded, genuine] {
        assert!(matches!(
            PublicKey::from_armored(&key_block_with(packet)),
            Err(PgpError::InvalidPublicKey(_))
        ));
    }
}

#[test]
fn test_distinct_keys_have_distinct_identifiers() {
    let ids: Vec<_> = (0..3).map(|i| keypair(i).key_id()).collect();
    assert_ne!(ids[0], ids[1]);
    assert_ne!(ids[1], ids[2]);
    assert_ne!(ids[0], ids[2]);
    assert_ne!(keypair(0).fingerprint(), keypair(1).fingerprint());
}

#[test]
fn test_ciphertexts_are_randomized() {
    let a = encrypt(b"same plaintext", &[public(0)], &mut OsRng).unwrap();
    let b = encrypt(b"same plaintext", &[public(0)], &mut OsRng).unwrap();
    assert_ne!(a, b);
}

#[test]
fn test_only_unknown_packets_are_recoverable() {
    assert!(PgpError::UnknownPacketTag(60).is_recoverable());
    assert!(!PgpError::ChecksumMismatch { expected: 1, actual: 2 }.is_recoverable());
    assert!(!PgpError::IntegrityCheckFailed("mdc".into()).is_recoverable());
    assert!(!PgpError::NoValidSignature.is_recoverable());
}
