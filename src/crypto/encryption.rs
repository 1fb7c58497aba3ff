//! Multi-recipient public key encryption.
//!
//! A fresh AES-256 session key encrypts the payload once into an integrity
//! protected data packet. The session key is then wrapped to the encryption
//! key of every recipient with RSA PKCS#1 v1.5 into one session key packet
//! each. The session key is wiped when the operation returns.

use rand::{CryptoRng, RngCore};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey};
use std::fmt;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::crypto::keys::{rsa_public_key, PrivateKey, PublicKey};
use crate::crypto::symmetric::{self, SessionKey};
use crate::crypto::{ct_eq, KeyId, SymmetricAlgorithm};
use crate::error::{PgpError, Result};
use crate::packet::{
    Mpi, Packet, PacketBody, PacketType, PublicKeyEncryptedSessionKeyPacket,
    SymEncryptedIntegrityProtectedDataPacket,
};

/// Wrap a session key to the encryption key of one recipient (RFC 4880 §5.1)
pub fn wrap_session_key<R: CryptoRng + RngCore>(
    session_key: &SessionKey,
    recipient: &PublicKey,
    rng: &mut R,
) -> Result<PublicKeyEncryptedSessionKeyPacket> {
    let key = recipient.encryption_key().ok_or_else(|| {
        PgpError::invalid_public_key(format!(
            "Key {} is not usable for encryption",
            recipient.key_id()
        ))
    })?;
    let rsa = rsa_public_key(key)?;

    let mut message = Zeroizing::new(Vec::with_capacity(3 + session_key.as_bytes().len()));
    message.push(session_key.algorithm().to_byte());
    message.extend_from_slice(session_key.as_bytes());
    message.extend_from_slice(&session_key.checksum().to_be_bytes());

    let encrypted = rsa
        .encrypt(rng, Pkcs1v15Encrypt, &message)
        .map_err(|e| PgpError::crypto(format!("Session key encryption failed: {}", e)))?;

    Ok(PublicKeyEncryptedSessionKeyPacket {
        key_id: key.key_id(),
        algorithm: key.algorithm,
        encrypted_key: Mpi::from_slice(&encrypted),
    })
}

/// Recover the session key from a packet addressed to `private`.
///
/// A packet with the wildcard key id is tried against every decryption
/// component of the key. Padding, algorithm and checksum failures all
/// surface as the same [`PgpError::IntegrityCheckFailed`].
pub fn unwrap_session_key<R: CryptoRng + RngCore>(
    packet: &PublicKeyEncryptedSessionKeyPacket,
    private: &PrivateKey,
    rng: &mut R,
) -> Result<SessionKey> {
    let key_ids: Vec<KeyId> = private
        .decryption_key_ids()
        .into_iter()
        .filter(|key_id| packet.key_id.is_wildcard() || packet.key_id.ct_eq(key_id))
        .collect();

    let mut last_error = PgpError::NoMatchingKey;
    for key_id in &key_ids {
        let rsa = private.decryption_key(key_id)?;
        match unwrap_with(packet, &rsa, rng) {
            Ok(session_key) => return Ok(session_key),
            Err(e) => last_error = e,
        }
    }
    Err(last_error)
}

fn unwrap_with<R: CryptoRng + RngCore>(
    packet: &PublicKeyEncryptedSessionKeyPacket,
    rsa: &RsaPrivateKey,
    rng: &mut R,
) -> Result<SessionKey> {
    let ciphertext = packet.encrypted_key.to_padded(rsa.size());
    let plain = Zeroizing::new(
        rsa.decrypt_blinded(rng, Pkcs1v15Encrypt, &ciphertext)
            .map_err(|_| PgpError::integrity("Session key decryption failed"))?,
    );

    if plain.len() < 3 {
        return Err(PgpError::integrity("Session key decryption failed"));
    }
    let algorithm = SymmetricAlgorithm::from_byte(plain[0])
        .map_err(|_| PgpError::integrity("Session key decryption failed"))?;
    let (key, checksum) = plain[1..].split_at(plain.len() - 3);
    let session_key = SessionKey::from_bytes(algorithm, key)?;
    if !ct_eq(&session_key.checksum().to_be_bytes(), checksum) {
        return Err(PgpError::integrity("Session key decryption failed"));
    }
    Ok(session_key)
}

/// The packet structure of an encrypted message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedMessage {
    /// One wrapped session key per recipient
    pub session_keys: Vec<PublicKeyEncryptedSessionKeyPacket>,
    /// The encrypted payload
    pub data: SymEncryptedIntegrityProtectedDataPacket,
}

impl EncryptedMessage {
    /// Pick the session key packets and the encrypted payload out of a packet stream.
    ///
    /// Session key packets for algorithms this engine does not support are
    /// skipped. Legacy encrypted data without an MDC is refused, and so is a
    /// second encrypted data packet.
    pub fn from_packets(packets: &[Packet]) -> Result<Self> {
        let mut session_keys = Vec::new();
        let mut data = None;

        for packet in packets {
            match packet.packet_type() {
                PacketType::PublicKeyEncryptedSessionKey => {
                    match packet.parse_body::<PublicKeyEncryptedSessionKeyPacket>() {
                        Ok(pkesk) => session_keys.push(pkesk),
                        Err(PgpError::UnsupportedKeyType(algorithm)) => {
                            warn!(algorithm = %algorithm, "Skipping session key for unsupported algorithm");
                        }
                        Err(e) => return Err(e),
                    }
                }
                PacketType::SymEncryptedIntegrityProtectedData => {
                    if data.is_some() {
                        return Err(PgpError::validation(
                            "Message has more than one encrypted data packet",
                        ));
                    }
                    data = Some(packet.parse_body::<SymEncryptedIntegrityProtectedDataPacket>()?);
                }
                PacketType::SymmetricallyEncryptedData => {
                    return Err(PgpError::integrity(
                        "Encrypted data has no modification detection code",
                    ));
                }
                other => debug!(packet_type = ?other, "Ignoring packet in encrypted message"),
            }
        }

        let data = data.ok_or_else(|| PgpError::validation("Message has no encrypted data packet"))?;
        Ok(Self { session_keys, data })
    }

    /// Session key packets followed by the encrypted payload
    pub fn to_packets(&self) -> Vec<Packet> {
        let mut packets: Vec<Packet> = self.session_keys.iter().map(PacketBody::to_packet).collect();
        packets.push(self.data.to_packet());
        packets
    }

    /// Key ids the message is addressed to; the wildcard id stands for hidden recipients
    pub fn recipients(&self) -> Vec<KeyId> {
        self.session_keys.iter().map(|pkesk| pkesk.key_id).collect()
    }
}

impl fmt::Display for EncryptedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let recipients: Vec<String> = self.recipients().iter().map(KeyId::to_string).collect();
        write!(
            f,
            "EncryptedMessage(recipients: [{}], {} bytes)",
            recipients.join(", "),
            self.data.data.len()
        )
    }
}

/// Encrypt a serialized packet stream to every recipient
pub fn encrypt_packets<R: CryptoRng + RngCore>(
    recipients: &[PublicKey],
    inner: &[u8],
    rng: &mut R,
) -> Result<EncryptedMessage> {
    if recipients.is_empty() {
        return Err(PgpError::NoRecipients);
    }
    for recipient in recipients {
        recipient.validate()?;
        if !recipient.can_encrypt() {
            return Err(PgpError::invalid_public_key(format!(
                "Key {} is not usable for encryption",
                recipient.key_id()
            )));
        }
    }

    let session_key = SessionKey::generate(rng)?;
    let data = symmetric::encrypt(inner, &session_key, rng)?;
    let session_keys = recipients
        .iter()
        .map(|recipient| wrap_session_key(&session_key, recipient, rng))
        .collect::<Result<Vec<_>>>()?;

    debug!(
        recipients = recipients.len(),
        payload_len = inner.len(),
        "Encrypted message"
    );
    Ok(EncryptedMessage { session_keys, data })
}

/// Decrypt a message with one private key, returning the inner packet stream.
///
/// Session key packets addressed to one of the key's decryption components
/// are tried first, then packets with the wildcard id.
pub fn decrypt_packets<R: CryptoRng + RngCore>(
    message: &EncryptedMessage,
    private: &PrivateKey,
    rng: &mut R,
) -> Result<Vec<u8>> {
    let key_ids = private.decryption_key_ids();
    let exact = message
        .session_keys
        .iter()
        .filter(|pkesk| key_ids.iter().any(|key_id| pkesk.key_id.ct_eq(key_id)));
    let wildcard = message
        .session_keys
        .iter()
        .filter(|pkesk| pkesk.key_id.is_wildcard());
    let candidates: Vec<_> = exact.chain(wildcard).collect();

    if candidates.is_empty() {
        debug!(key_id = %private.key_id(), recipients = message.session_keys.len(), "No session key for this key");
        return Err(PgpError::NoMatchingKey);
    }
    if private.is_locked() {
        return Err(PgpError::KeyLocked);
    }

    let mut last_error = PgpError::NoMatchingKey;
    for pkesk in candidates {
        match unwrap_session_key(pkesk, private, rng) {
            Ok(session_key) => {
                let plaintext = symmetric::decrypt(&message.data, &session_key)?;
                debug!(key_id = %pkesk.key_id, payload_len = plaintext.len(), "Decrypted message");
                return Ok(plaintext);
            }
            Err(e) => last_error = e,
        }
    }
    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::test_keys::keypair;
    use crate::crypto::Password;
    use rand::rngs::OsRng;

    fn encryption_key_id(index: usize) -> KeyId {
        keypair(index).public_key().encryption_key_id().unwrap()
    }

    #[test]
    fn test_wrap_unwrap_session_key() {
        let pair = keypair(0);
        let session_key = SessionKey::generate(&mut OsRng).unwrap();
        let packet = wrap_session_key(&session_key, pair.public_key(), &mut OsRng).unwrap();
        assert_eq!(packet.key_id, encryption_key_id(0));
        assert_ne!(packet.key_id, pair.key_id());

        let recovered = unwrap_session_key(&packet, pair.private_key(), &mut OsRng).unwrap();
        assert_eq!(recovered.as_bytes(), session_key.as_bytes());
    }

    #[test]
    fn test_wrap_to_key_without_encryption_key() {
        let public = keypair(0).public_key();
        let mut packets = public.to_packets();
        packets.truncate(3);
        let primary_only = PublicKey::from_packets(&packets).unwrap();
        let session_key = SessionKey::generate(&mut OsRng).unwrap();
        assert!(matches!(
            wrap_session_key(&session_key, &primary_only, &mut OsRng),
            Err(PgpError::InvalidPublicKey(_))
        ));
        assert!(matches!(
            encrypt_packets(&[primary_only], b"x", &mut OsRng),
            Err(PgpError::InvalidPublicKey(_))
        ));
    }

    #[test]
    fn test_unwrap_with_wrong_key() {
        let session_key = SessionKey::generate(&mut OsRng).unwrap();
        let mut packet = wrap_session_key(&session_key, keypair(0).public_key(), &mut OsRng).unwrap();
        assert!(matches!(
            unwrap_session_key(&packet, keypair(1).private_key(), &mut OsRng),
            Err(PgpError::NoMatchingKey)
        ));
        packet.key_id = KeyId::WILDCARD;
        assert!(matches!(
            unwrap_session_key(&packet, keypair(1).private_key(), &mut OsRng),
            Err(PgpError::IntegrityCheckFailed(_))
        ));
    }

    #[test]
    fn test_multi_recipient() {
        let recipients = [keypair(0).public_key().clone(), keypair(1).public_key().clone()];
        let message = encrypt_packets(&recipients, b"inner packets", &mut OsRng).unwrap();
        assert_eq!(message.recipients(), vec![encryption_key_id(0), encryption_key_id(1)]);

        for index in 0..2 {
            let plain = decrypt_packets(&message, keypair(index).private_key(), &mut OsRng).unwrap();
            assert_eq!(plain, b"inner packets");
        }
        assert!(matches!(
            decrypt_packets(&message, keypair(2).private_key(), &mut OsRng),
            Err(PgpError::NoMatchingKey)
        ));
    }

    #[test]
    fn test_no_recipients() {
        assert!(matches!(
            encrypt_packets(&[], b"x", &mut OsRng),
            Err(PgpError::NoRecipients)
        ));
    }

    #[test]
    fn test_wildcard_recipient() {
        let pair = keypair(1);
        let mut message = encrypt_packets(&[pair.public_key().clone()], b"hidden", &mut OsRng).unwrap();
        message.session_keys[0].key_id = KeyId::WILDCARD;
        assert_eq!(decrypt_packets(&message, pair.private_key(), &mut OsRng).unwrap(), b"hidden");
        assert!(decrypt_packets(&message, keypair(0).private_key(), &mut OsRng).is_err());
    }

    #[test]
    fn test_locked_key() {
        let pair = keypair(0);
        let message = encrypt_packets(&[pair.public_key().clone()], b"x", &mut OsRng).unwrap();
        let locked = pair
            .private_key()
            .lock(&Password::from("pw"), &mut OsRng)
            .unwrap();
        assert!(matches!(
            decrypt_packets(&message, &locked, &mut OsRng),
            Err(PgpError::KeyLocked)
        ));
    }

    #[test]
    fn test_packet_structure_roundtrip() {
        let recipients = [keypair(0).public_key().clone(), keypair(2).public_key().clone()];
        let message = encrypt_packets(&recipients, b"payload", &mut OsRng).unwrap();
        let packets = message.to_packets();
        assert_eq!(packets.len(), 3);
        assert_eq!(EncryptedMessage::from_packets(&packets).unwrap(), message);
        assert!(message.to_string().contains(&encryption_key_id(2).to_string()));

        assert!(EncryptedMessage::from_packets(&packets[..2]).is_err());
    }

    #[test]
    fn test_second_encrypted_payload_rejected() {
        let message = encrypt_packets(&[keypair(0).public_key().clone()], b"one", &mut OsRng).unwrap();
        let other = encrypt_packets(&[keypair(0).public_key().clone()], b"two", &mut OsRng).unwrap();
        let mut packets = message.to_packets();
        packets.push(other.data.to_packet());
        assert!(matches!(
            EncryptedMessage::from_packets(&packets),
            Err(PgpError::Validation(_))
        ));

        let mut packets = message.to_packets();
        packets.push(Packet::new(PacketType::SymmetricallyEncryptedData, vec![0; 32]));
        assert!(matches!(
            EncryptedMessage::from_packets(&packets),
            Err(PgpError::IntegrityCheckFailed(_))
        ));
    }

    #[test]
    fn test_session_key_to_primary_ignored() {
        let pair = keypair(1);
        let mut message = encrypt_packets(&[pair.public_key().clone()], b"x", &mut OsRng).unwrap();
        message.session_keys[0].key_id = pair.key_id();
        assert!(matches!(
            decrypt_packets(&message, pair.private_key(), &mut OsRng),
            Err(PgpError::NoMatchingKey)
        ));
    }

    #[test]
    fn test_tampered_payload() {
        let pair = keypair(0);
        let mut message = encrypt_packets(&[pair.public_key().clone()], b"payload", &mut OsRng).unwrap();
        let last = message.data.data.len() - 1;
        message.data.data[last] ^= 0x80;
        assert!(matches!(
            decrypt_packets(&message, pair.private_key(), &mut OsRng),
            Err(PgpError::IntegrityCheckFailed(_))
        ));
    }
}
