//! Property-style tests over seeded random inputs
//!
//! Each property is checked across many generated cases. The generators are
//! seeded so failures reproduce.

mod common;

use common::{keypair, public};
use pgp_engine::{
    armor::{crc24, decode, decode_packets_from_armor, encode, encode_packets, ArmorOptions, ArmorType},
    crypto::{ct_eq, Fingerprint, KeyId},
    decrypt, encrypt,
    packet::{
        decode_packets, serialize_packets, HeaderFormat, LiteralDataPacket, Mpi, Packet, PacketBody,
        PacketType,
    },
    sign, verify,
};
use rand::rngs::{OsRng, StdRng};
use rand::{Rng, SeedableRng};

fn random_bytes(rng: &mut StdRng, max_len: usize) -> Vec<u8> {
    let len = rng.gen_range(0..=max_len);
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes[..]);
    bytes
}

fn random_packet(rng: &mut StdRng) -> Packet {
    let types = [
        PacketType::LiteralData,
        PacketType::UserId,
        PacketType::Signature,
        PacketType::SymEncryptedIntegrityProtectedData,
        PacketType::PublicKeyEncryptedSessionKey,
    ];
    let packet_type = types[rng.gen_range(0..types.len())];
    // Old-format headers only carry tags below 16
    let format = if packet_type.to_byte() < 16 && rng.gen_bool(0.5) {
        HeaderFormat::Old
    } else {
        HeaderFormat::New
    };
    let max_len = if rng.gen_bool(0.1) { 70_000 } else { 400 };
    Packet::with_format(packet_type, random_bytes(rng, max_len), format)
}

/// Property: armor decode(encode(packets)) == packets
#[test]
fn property_armor_roundtrip() {
    let mut rng = StdRng::seed_from_u64(1);
    for _ in 0..60 {
        let count = rng.gen_range(1..5);
        let packets: Vec<Packet> = (0..count).map(|_| random_packet(&mut rng)).collect();
        let armored = encode_packets(&packets, &ArmorType::Message, &ArmorOptions::default());

        for line in armored.lines() {
            assert!(line.len() <= 76, "armor line longer than 76 characters");
        }
        let (armor_type, decoded) = decode_packets_from_armor(&armored).unwrap();
        assert_eq!(armor_type, ArmorType::Message);
        assert_eq!(decoded, packets);
    }
}

/// Property: raw binary survives armor for every length modulo 3
#[test]
fn property_armor_binary_lengths() {
    let mut rng = StdRng::seed_from_u64(2);
    for len in 0..200 {
        let mut data = vec![0u8; len];
        rng.fill(&mut data[..]);
        for armor_type in [ArmorType::Message, ArmorType::Signature, ArmorType::PublicKey] {
            let block = decode(&encode(&data, &armor_type)).unwrap();
            assert_eq!(block.data, data);
            assert_eq!(block.armor_type, armor_type);
        }
    }
}

/// Property: the packet stream codec is lossless for every header form
#[test]
fn property_packet_stream_roundtrip() {
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..100 {
        let count = rng.gen_range(0..8);
        let packets: Vec<Packet> = (0..count).map(|_| random_packet(&mut rng)).collect();
        assert_eq!(decode_packets(&serialize_packets(&packets)).unwrap(), packets);
    }
}

/// Property: MPIs keep their declared bit length and value
#[test]
fn property_mpi_preserves_bits() {
    let mut rng = StdRng::seed_from_u64(4);
    for _ in 0..200 {
        let mut bytes = random_bytes(&mut rng, 64);
        if let Some(first) = bytes.first_mut() {
            *first |= 0x01;
        }
        let mpi = Mpi::from_slice(&bytes);
        let expected_bits = bytes
            .first()
            .map_or(0, |b| (bytes.len() - 1) * 8 + (8 - b.leading_zeros() as usize));
        assert_eq!(mpi.bits() as usize, expected_bits);

        let encoded = mpi.to_bytes();
        let (parsed, consumed) = Mpi::parse(&encoded, 0).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(parsed, mpi);
        assert_eq!(parsed.as_bytes(), &bytes[..]);
    }
}

/// Property: decrypt(encrypt(M, [pub]), priv) == M
#[test]
fn property_encryption_roundtrip() {
    let mut rng = StdRng::seed_from_u64(5);
    for _ in 0..25 {
        let message = random_bytes(&mut rng, 4096);
        let armored = encrypt(&message, &[public(0)], &mut OsRng).unwrap();
        assert_eq!(
            decrypt(&armored, keypair(0).private_key(), &mut OsRng).unwrap(),
            message,
            "Roundtrip property violated: decrypted != original"
        );
    }
}

/// Property: every signed message verifies under its signer only
#[test]
fn property_sign_verify() {
    let mut rng = StdRng::seed_from_u64(6);
    for round in 0..12 {
        let signer = round % 3;
        let message = random_bytes(&mut rng, 1024);
        let signed = sign(&message, keypair(signer).private_key(), &mut OsRng).unwrap();

        let verified = verify(&signed, &[public(0), public(1), public(2)]).unwrap();
        assert_eq!(verified.signer, keypair(signer).key_id());
        assert_eq!(verified.data, message);

        let others: Vec<_> = (0..3).filter(|&i| i != signer).map(public).collect();
        assert!(verify(&signed, &others).is_err());
    }
}

/// Property: literal packets keep format, name and date
#[test]
fn property_literal_fields_roundtrip() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..50 {
        let data = random_bytes(&mut rng, 256);
        let literal = LiteralDataPacket::binary(&data, rng.gen()).with_filename("report.pdf");
        let parsed = LiteralDataPacket::from_bytes(&literal.to_bytes()).unwrap();
        assert_eq!(parsed, literal);
    }
}

/// Property: CRC24 changes for any single-bit change
#[test]
fn property_crc24_detects_bit_flips() {
    let mut rng = StdRng::seed_from_u64(8);
    for _ in 0..100 {
        let mut data = random_bytes(&mut rng, 512);
        if data.is_empty() {
            data.push(0);
        }
        let checksum = crc24(&data);
        assert!(checksum <= 0xFF_FFFF);
        let index = rng.gen_range(0..data.len());
        data[index] ^= 1 << rng.gen_range(0..8);
        assert_ne!(crc24(&data), checksum);
    }
}

/// Property: identifiers survive hex formatting
#[test]
fn property_identifier_hex_roundtrip() {
    let mut rng = StdRng::seed_from_u64(9);
    for _ in 0..50 {
        let fingerprint = Fingerprint(rng.gen());
        assert_eq!(Fingerprint::from_hex(&fingerprint.to_string()).unwrap(), fingerprint);
        let key_id = KeyId::from(rng.gen::<u64>());
        assert_eq!(KeyId::from_hex(&key_id.to_string()).unwrap(), key_id);
        assert!(key_id.ct_eq(&key_id));
        assert!(ct_eq(fingerprint.as_bytes(), fingerprint.as_bytes()));
    }
}
