//! AES-256 OpenPGP CFB with Modification Detection Code (RFC 4880 §5.13).
//!
//! The payload is `prefix || prefix[14..16] || plaintext || 0xD3 0x14 || SHA-1`,
//! encrypted in plain CFB mode with an all-zero IV. Decryption returns nothing
//! unless the MDC matches.

use aes::Aes256;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use rand::{CryptoRng, RngCore};
use sha1::{Digest, Sha1};
use std::fmt;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::{ct_eq, secure_random_bytes, SymmetricAlgorithm};
use crate::error::{PgpError, Result};
use crate::packet::key::checksum16;
use crate::packet::{
    ModificationDetectionCodePacket, PacketBody, SymEncryptedIntegrityProtectedDataPacket,
};

type Aes256CfbEnc = cfb_mode::Encryptor<Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<Aes256>;

/// Encrypt `buf` in place with AES-256 CFB
pub(crate) fn cfb_encrypt(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<()> {
    Aes256CfbEnc::new_from_slices(key, iv)
        .map_err(|e| PgpError::crypto(format!("Invalid CFB key or IV: {}", e)))?
        .encrypt(buf);
    Ok(())
}

/// Decrypt `buf` in place with AES-256 CFB
pub(crate) fn cfb_decrypt(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<()> {
    Aes256CfbDec::new_from_slices(key, iv)
        .map_err(|e| PgpError::crypto(format!("Invalid CFB key or IV: {}", e)))?
        .decrypt(buf);
    Ok(())
}

/// Ephemeral per-message symmetric key, wiped on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey {
    #[zeroize(skip)]
    algorithm: SymmetricAlgorithm,
    key: [u8; 32],
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl SessionKey {
    /// Generate a fresh random AES-256 session key
    pub fn generate<R: CryptoRng + RngCore>(rng: &mut R) -> Result<Self> {
        let bytes = Zeroizing::new(secure_random_bytes(rng, 32)?);
        Self::from_bytes(SymmetricAlgorithm::Aes256, &bytes)
    }

    /// Wrap existing key bytes
    pub fn from_bytes(algorithm: SymmetricAlgorithm, bytes: &[u8]) -> Result<Self> {
        let key: [u8; 32] = bytes.try_into().map_err(|_| {
            PgpError::integrity(format!(
                "Session key has {} bytes, expected {}",
                bytes.len(),
                algorithm.key_size()
            ))
        })?;
        Ok(Self { algorithm, key })
    }

    /// Cipher this key is for
    pub fn algorithm(&self) -> SymmetricAlgorithm {
        self.algorithm
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    /// Two-octet checksum carried next to the key in session key packets
    pub fn checksum(&self) -> u16 {
        checksum16(&self.key)
    }
}

/// Encrypt a serialized packet stream into an integrity-protected packet
pub fn encrypt<R: CryptoRng + RngCore>(
    plaintext: &[u8],
    session_key: &SessionKey,
    rng: &mut R,
) -> Result<SymEncryptedIntegrityProtectedDataPacket> {
    let block_size = session_key.algorithm().block_size();
    let prefix = Zeroizing::new(secure_random_bytes(rng, block_size)?);

    let mut buf = Vec::with_capacity(
        block_size + 2 + plaintext.len() + ModificationDetectionCodePacket::ENCODED_LEN,
    );
    buf.extend_from_slice(&prefix);
    buf.extend_from_slice(&prefix[block_size - 2..]);
    buf.extend_from_slice(plaintext);
    buf.extend_from_slice(&ModificationDetectionCodePacket::HEADER);

    let mdc = ModificationDetectionCodePacket {
        hash: Sha1::digest(&buf).into(),
    };
    buf.extend_from_slice(&mdc.to_bytes());

    let iv = vec![0u8; block_size];
    cfb_encrypt(session_key.as_bytes(), &iv, &mut buf)?;

    debug!(
        plaintext_len = plaintext.len(),
        ciphertext_len = buf.len(),
        "Encrypted SEIPD payload"
    );
    Ok(SymEncryptedIntegrityProtectedDataPacket { data: buf })
}

/// Decrypt an integrity-protected packet and check its MDC.
///
/// The quick-check bytes, the MDC header and the MDC hash are all evaluated
/// before a single [`PgpError::IntegrityCheckFailed`] is returned, so a
/// failure does not reveal which check tripped.
pub fn decrypt(
    packet: &SymEncryptedIntegrityProtectedDataPacket,
    session_key: &SessionKey,
) -> Result<Vec<u8>> {
    let block_size = session_key.algorithm().block_size();
    let overhead = block_size + 2 + ModificationDetectionCodePacket::ENCODED_LEN;
    if packet.data.len() < overhead {
        return Err(PgpError::integrity("Encrypted payload shorter than its framing"));
    }

    let mut buf = Zeroizing::new(packet.data.clone());
    let iv = vec![0u8; block_size];
    cfb_decrypt(session_key.as_bytes(), &iv, &mut buf)?;

    let mdc_start = buf.len() - ModificationDetectionCodePacket::ENCODED_LEN;
    let hash_start = mdc_start + 2;
    let quick_check_ok = ct_eq(
        &buf[block_size - 2..block_size],
        &buf[block_size..block_size + 2],
    );
    let header_ok = ct_eq(
        &buf[mdc_start..hash_start],
        &ModificationDetectionCodePacket::HEADER,
    );
    let expected = Sha1::digest(&buf[..hash_start]);
    let hash_ok = ModificationDetectionCodePacket::from_bytes(&buf[hash_start..])
        .map(|mdc| ct_eq(&mdc.hash, &expected))
        .unwrap_or(false);

    if !(quick_check_ok & header_ok & hash_ok) {
        return Err(PgpError::integrity("Modification detection code mismatch"));
    }

    Ok(buf[block_size + 2..mdc_start].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_session_key_generation() {
        let a = SessionKey::generate(&mut OsRng).unwrap();
        let b = SessionKey::generate(&mut OsRng).unwrap();
        assert_eq!(a.as_bytes().len(), 32);
        assert_ne!(a.as_bytes(), b.as_bytes());
        assert_eq!(a.algorithm(), SymmetricAlgorithm::Aes256);
        assert!(!format!("{:?}", a).contains("key:"));
    }

    #[test]
    fn test_session_key_length_checked() {
        assert!(SessionKey::from_bytes(SymmetricAlgorithm::Aes256, &[0; 16]).is_err());
        let key = SessionKey::from_bytes(SymmetricAlgorithm::Aes256, &[1; 32]).unwrap();
        assert_eq!(key.checksum(), 32);
    }

    #[test]
    fn test_encrypt_decrypt() {
        let key = SessionKey::generate(&mut OsRng).unwrap();
        for plaintext in [&b""[..], b"hello", &[0x5A; 10_000][..]] {
            let packet = encrypt(plaintext, &key, &mut OsRng).unwrap();
            assert_eq!(packet.data.len(), plaintext.len() + 16 + 2 + 22);
            assert_eq!(decrypt(&packet, &key).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_ciphertext_is_randomized() {
        let key = SessionKey::generate(&mut OsRng).unwrap();
        let a = encrypt(b"same", &key, &mut OsRng).unwrap();
        let b = encrypt(b"same", &key, &mut OsRng).unwrap();
        assert_ne!(a.data, b.data);
    }

    #[test]
    fn test_tampering_fails_closed() {
        let key = SessionKey::generate(&mut OsRng).unwrap();
        let packet = encrypt(b"attack at dawn", &key, &mut OsRng).unwrap();
        for i in 0..packet.data.len() {
            let mut tampered = packet.clone();
            tampered.data[i] ^= 0x01;
            assert!(
                matches!(decrypt(&tampered, &key), Err(PgpError::IntegrityCheckFailed(_))),
                "byte {} flip was not detected",
                i
            );
        }
    }

    #[test]
    fn test_truncation_and_wrong_key() {
        let key = SessionKey::generate(&mut OsRng).unwrap();
        let packet = encrypt(b"payload", &key, &mut OsRng).unwrap();

        let mut truncated = packet.clone();
        truncated.data.truncate(30);
        assert!(matches!(
            decrypt(&truncated, &key),
            Err(PgpError::IntegrityCheckFailed(_))
        ));

        let other = SessionKey::generate(&mut OsRng).unwrap();
        assert!(matches!(
            decrypt(&packet, &other),
            Err(PgpError::IntegrityCheckFailed(_))
        ));
    }
}
