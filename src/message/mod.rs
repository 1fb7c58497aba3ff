//! High-level message operations.
//!
//! Every operation takes typed keys and raw data and returns armored text,
//! or takes armored text and returns the recovered data together with the
//! key id that verified it. Signed messages are written as
//! `One-Pass Signature, Literal Data, Signature`. Signed and encrypted
//! messages wrap that sequence in the encrypted payload, and verification
//! only runs once the payload passed its integrity check.

use rand::{CryptoRng, RngCore};
use tracing::{debug, warn};

use crate::armor::cleartext::{self, signed_text};
use crate::armor::{decode, encode_packets, ArmorOptions, ArmorType};
use crate::crypto::encryption::{decrypt_packets, encrypt_packets, EncryptedMessage};
use crate::crypto::keys::{PrivateKey, PublicKey};
use crate::crypto::signature::verify_data;
use crate::crypto::{current_timestamp, KeyId, SignatureBuilder};
use crate::error::{PgpError, Result};
use crate::packet::{
    decode_packets, serialize_packets, LiteralDataPacket, OnePassSignaturePacket, Packet,
    PacketBody, PacketType, SignaturePacket, SignatureType,
};
use crate::validation::Validator;

/// Plaintext recovered from a signed message, with the key that signed it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedMessage {
    /// The signed data
    pub data: Vec<u8>,
    /// Key id of the first candidate key that verified a signature
    pub signer: KeyId,
}

/// The packet structure of a plaintext message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The literal data
    pub literal: LiteralDataPacket,
    /// One-pass signature headers, if any
    pub one_pass: Vec<OnePassSignaturePacket>,
    /// Signatures over the literal data
    pub signatures: Vec<SignaturePacket>,
}

impl Message {
    /// Unsigned message with binary literal data
    pub fn new(data: &[u8]) -> Self {
        Self::from_literal(LiteralDataPacket::binary(data, current_timestamp()))
    }

    /// Unsigned message from a prepared literal packet
    pub fn from_literal(literal: LiteralDataPacket) -> Self {
        Self {
            literal,
            one_pass: Vec::new(),
            signatures: Vec::new(),
        }
    }

    /// The literal content
    pub fn data(&self) -> &[u8] {
        &self.literal.data
    }

    /// Whether any signature is attached
    pub fn is_signed(&self) -> bool {
        !self.signatures.is_empty()
    }

    /// Issuer key ids announced by the signatures
    pub fn signers(&self) -> Vec<KeyId> {
        self.signatures
            .iter()
            .filter_map(SignaturePacket::issuer)
            .collect()
    }

    /// Sign the literal data and attach the signature with its one-pass header
    pub fn sign<R: CryptoRng + RngCore>(mut self, signer: &PrivateKey, rng: &mut R) -> Result<Self> {
        let signature =
            SignatureBuilder::new(SignatureType::Binary).sign_data(signer, &self.literal.data, rng)?;
        // The newest signature wraps the existing ones, so its one-pass header
        // goes first and is only marked last when nothing else follows.
        let last = self.one_pass.is_empty();
        self.one_pass.insert(
            0,
            OnePassSignaturePacket {
                sig_type: signature.sig_type,
                hash_algorithm: signature.hash_algorithm,
                pk_algorithm: signature.pk_algorithm,
                key_id: signer.key_id(),
                last,
            },
        );
        self.signatures.push(signature);
        Ok(self)
    }

    /// Parse a plaintext packet stream.
    ///
    /// Accepts `One-Pass*, Literal, Signature*` as well as the older
    /// `Signature*, Literal` order. Signatures and one-pass headers naming an
    /// unsupported key or hash algorithm are skipped.
    pub fn from_packets(packets: &[Packet]) -> Result<Self> {
        let mut literal = None;
        let mut one_pass = Vec::new();
        let mut signatures = Vec::new();

        for packet in packets {
            match packet.packet_type() {
                PacketType::LiteralData => {
                    if literal.is_some() {
                        return Err(PgpError::validation("Message has more than one literal data packet"));
                    }
                    literal = Some(packet.parse_body::<LiteralDataPacket>()?);
                }
                PacketType::OnePassSignature => {
                    match packet.parse_body::<OnePassSignaturePacket>() {
                        Ok(ops) => one_pass.push(ops),
                        Err(
                            PgpError::UnsupportedKeyType(algorithm)
                            | PgpError::UnsupportedAlgorithm(algorithm),
                        ) => warn!(algorithm = %algorithm, "Skipping one-pass signature"),
                        Err(e) => return Err(e),
                    }
                }
                PacketType::Signature => match packet.parse_body::<SignaturePacket>() {
                    Ok(signature) => signatures.push(signature),
                    Err(
                        PgpError::UnsupportedKeyType(algorithm)
                        | PgpError::UnsupportedAlgorithm(algorithm),
                    ) => warn!(algorithm = %algorithm, "Skipping signature"),
                    Err(e) => return Err(e),
                },
                PacketType::CompressedData => {
                    return Err(PgpError::validation("Compressed messages are not supported"))
                }
                other => debug!(packet_type = ?other, "Ignoring packet in message"),
            }
        }

        let literal =
            literal.ok_or_else(|| PgpError::validation("Message has no literal data packet"))?;
        Ok(Self {
            literal,
            one_pass,
            signatures,
        })
    }

    /// One-pass headers outermost first, literal data, then signatures innermost first
    pub fn to_packets(&self) -> Vec<Packet> {
        let mut packets: Vec<Packet> = self.one_pass.iter().map(PacketBody::to_packet).collect();
        packets.push(self.literal.to_packet());
        packets.extend(self.signatures.iter().map(PacketBody::to_packet));
        packets
    }

    /// Check the signatures against candidate keys and return the first signer found
    pub fn verify(&self, candidates: &[PublicKey]) -> Result<KeyId> {
        if self.signatures.is_empty() {
            return Err(PgpError::NoValidSignature);
        }
        self.signatures
            .iter()
            .find_map(|signature| verify_data(signature, &self.literal.data, candidates).ok())
            .ok_or(PgpError::NoValidSignature)
    }
}

fn message_packets(armored: &str) -> Result<Vec<Packet>> {
    decode(armored)?.expect_packets(&ArmorType::Message)
}

/// Encrypt `data` to every recipient
pub fn encrypt<R: CryptoRng + RngCore>(
    data: &[u8],
    recipients: &[PublicKey],
    rng: &mut R,
) -> Result<String> {
    encrypt_with(data, recipients, &ArmorOptions::default(), rng)
}

/// Encrypt `data` to every recipient with custom armor headers
pub fn encrypt_with<R: CryptoRng + RngCore>(
    data: &[u8],
    recipients: &[PublicKey],
    options: &ArmorOptions,
    rng: &mut R,
) -> Result<String> {
    Validator::validate_message_size(data)?;
    encrypt_message(&Message::new(data), recipients, options, rng)
}

/// Encrypt a prepared message, signed or not
pub fn encrypt_message<R: CryptoRng + RngCore>(
    message: &Message,
    recipients: &[PublicKey],
    options: &ArmorOptions,
    rng: &mut R,
) -> Result<String> {
    let inner = serialize_packets(&message.to_packets());
    let encrypted = encrypt_packets(recipients, &inner, rng)?;
    Ok(encode_packets(&encrypted.to_packets(), &ArmorType::Message, options))
}

/// Parse the recipients of an armored encrypted message without decrypting it
pub fn inspect_encrypted(armored: &str) -> Result<EncryptedMessage> {
    EncryptedMessage::from_packets(&message_packets(armored)?)
}

/// Decrypt a message and return its full plaintext structure.
///
/// `rng` blinds the RSA private key operation.
pub fn decrypt_message<R: CryptoRng + RngCore>(
    armored: &str,
    private: &PrivateKey,
    rng: &mut R,
) -> Result<Message> {
    let encrypted = inspect_encrypted(armored)?;
    let inner = decrypt_packets(&encrypted, private, rng)?;
    Message::from_packets(&decode_packets(&inner)?)
}

/// Decrypt a message and return the literal data
pub fn decrypt<R: CryptoRng + RngCore>(
    armored: &str,
    private: &PrivateKey,
    rng: &mut R,
) -> Result<Vec<u8>> {
    Ok(decrypt_message(armored, private, rng)?.literal.data)
}

/// Sign `data` into an armored signed message
pub fn sign<R: CryptoRng + RngCore>(data: &[u8], signer: &PrivateKey, rng: &mut R) -> Result<String> {
    sign_with(data, signer, &ArmorOptions::default(), rng)
}

/// Sign `data` with custom armor headers
pub fn sign_with<R: CryptoRng + RngCore>(
    data: &[u8],
    signer: &PrivateKey,
    options: &ArmorOptions,
    rng: &mut R,
) -> Result<String> {
    Validator::validate_message_size(data)?;
    let message = Message::new(data).sign(signer, rng)?;
    Ok(encode_packets(&message.to_packets(), &ArmorType::Message, options))
}

/// Verify an armored signed message against candidate keys
pub fn verify(armored: &str, candidates: &[PublicKey]) -> Result<VerifiedMessage> {
    let message = Message::from_packets(&message_packets(armored)?)?;
    let signer = message.verify(candidates)?;
    Ok(VerifiedMessage {
        data: message.literal.data,
        signer,
    })
}

/// Sign `data`, then encrypt the signed message to every recipient
pub fn sign_and_encrypt<R: CryptoRng + RngCore>(
    data: &[u8],
    signer: &PrivateKey,
    recipients: &[PublicKey],
    rng: &mut R,
) -> Result<String> {
    Validator::validate_message_size(data)?;
    let message = Message::new(data).sign(signer, rng)?;
    encrypt_message(&message, recipients, &ArmorOptions::default(), rng)
}

/// Decrypt a message, then verify its signature against candidate keys
pub fn decrypt_and_verify<R: CryptoRng + RngCore>(
    armored: &str,
    private: &PrivateKey,
    candidates: &[PublicKey],
    rng: &mut R,
) -> Result<VerifiedMessage> {
    let message = decrypt_message(armored, private, rng)?;
    let signer = message.verify(candidates)?;
    Ok(VerifiedMessage {
        data: message.literal.data,
        signer,
    })
}

/// Create an armored detached signature over `data`
pub fn sign_detached<R: CryptoRng + RngCore>(
    data: &[u8],
    signer: &PrivateKey,
    rng: &mut R,
) -> Result<String> {
    let signature = SignatureBuilder::new(SignatureType::Binary).sign_data(signer, data, rng)?;
    Ok(encode_packets(
        &[signature.to_packet()],
        &ArmorType::Signature,
        &ArmorOptions::default(),
    ))
}

/// Verify an armored detached signature over `data`
pub fn verify_detached(data: &[u8], armored_signature: &str, candidates: &[PublicKey]) -> Result<KeyId> {
    let packets = decode(armored_signature)?.expect_packets(&ArmorType::Signature)?;
    packets
        .iter()
        .filter(|packet| packet.packet_type() == PacketType::Signature)
        .filter_map(|packet| packet.parse_body::<SignaturePacket>().ok())
        .find_map(|signature| verify_data(&signature, data, candidates).ok())
        .ok_or(PgpError::NoValidSignature)
}

/// Produce a cleartext signed message over `text`
pub fn sign_cleartext<R: CryptoRng + RngCore>(
    text: &str,
    signer: &PrivateKey,
    rng: &mut R,
) -> Result<String> {
    let builder = SignatureBuilder::new(SignatureType::Text);
    let hash = builder.hash();
    let signature = builder.sign_data(signer, &signed_text(text), rng)?;
    Ok(cleartext::encode(
        text,
        &[hash],
        &[signature.to_packet()],
        &ArmorOptions::default(),
    ))
}

/// Verify a cleartext signed message; the returned data is the message text
pub fn verify_cleartext(armored: &str, candidates: &[PublicKey]) -> Result<VerifiedMessage> {
    let message = cleartext::decode_message(armored)?;
    let signed = signed_text(&message.text);
    let packets = message.signature.packets()?;

    let signer = packets
        .iter()
        .filter(|packet| packet.packet_type() == PacketType::Signature)
        .filter_map(|packet| packet.parse_body::<SignaturePacket>().ok())
        .filter(|signature| {
            message.hashes.is_empty() || message.hashes.contains(&signature.hash_algorithm)
        })
        .find_map(|signature| verify_data(&signature, &signed, candidates).ok())
        .ok_or(PgpError::NoValidSignature)?;

    Ok(VerifiedMessage {
        data: message.text.into_bytes(),
        signer,
    })
}
