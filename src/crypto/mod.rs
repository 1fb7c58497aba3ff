//! Cryptographic primitives for the OpenPGP engine.
//!
//! This module collects the algorithm identifiers used on the wire and the
//! helpers shared by the key, cipher and message layers:
//!
//! - **RSA**: key generation, PKCS#1 v1.5 session key transport and signatures
//! - **AES-256**: OpenPGP CFB with a SHA-1 Modification Detection Code
//! - **SHA-1 / SHA-2**: fingerprints, MDC and signature digests

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;

use crate::error::{PgpError, Result};

pub mod encryption;
pub mod keys;
pub mod password;
pub mod signature;
pub mod symmetric;

pub use encryption::{unwrap_session_key, wrap_session_key};
pub use keys::{
    generate_keypair, rsa_public_key, KeyGenOptions, KeyPair, KeyType, PrivateKey, PublicKey, Subkey,
};
pub use password::{Password, ProtectionParams, S2k};
pub use signature::{sign_digest, verify_digest, SignatureBuilder};
pub use symmetric::SessionKey;

/// Public-key algorithm identifiers (RFC 4880 §9.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PublicKeyAlgorithm {
    /// RSA (Encrypt or Sign)
    RsaEncryptSign = 1,
    /// RSA Encrypt-Only
    RsaEncryptOnly = 2,
    /// RSA Sign-Only
    RsaSignOnly = 3,
}

impl PublicKeyAlgorithm {
    /// Parse the wire identifier
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            1 => Ok(Self::RsaEncryptSign),
            2 => Ok(Self::RsaEncryptOnly),
            3 => Ok(Self::RsaSignOnly),
            other => Err(PgpError::UnsupportedKeyType(format!(
                "public-key algorithm {}",
                other
            ))),
        }
    }

    /// Wire identifier
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Returns the algorithm name as a string
    pub fn name(&self) -> &'static str {
        match self {
            Self::RsaEncryptSign => "RSA",
            Self::RsaEncryptOnly => "RSA (encrypt only)",
            Self::RsaSignOnly => "RSA (sign only)",
        }
    }

    /// Whether keys of this algorithm may receive session keys
    pub fn can_encrypt(&self) -> bool {
        matches!(self, Self::RsaEncryptSign | Self::RsaEncryptOnly)
    }

    /// Whether keys of this algorithm may produce signatures
    pub fn can_sign(&self) -> bool {
        matches!(self, Self::RsaEncryptSign | Self::RsaSignOnly)
    }
}

impl fmt::Display for PublicKeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Symmetric algorithm identifiers (RFC 4880 §9.2). Only AES-256 is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymmetricAlgorithm {
    /// AES with 256-bit key
    Aes256 = 9,
}

impl SymmetricAlgorithm {
    /// Parse the wire identifier
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            9 => Ok(Self::Aes256),
            other => Err(PgpError::unsupported_algorithm(format!(
                "symmetric algorithm {}",
                other
            ))),
        }
    }

    /// Wire identifier
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Key size in bytes
    pub fn key_size(&self) -> usize {
        32
    }

    /// Cipher block size in bytes
    pub fn block_size(&self) -> usize {
        16
    }
}

/// Hash algorithm identifiers (RFC 4880 §9.4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// SHA-1 (fingerprints, MDC, legacy signatures)
    Sha1 = 2,
    /// SHA2-256 (default for signatures and S2K)
    Sha256 = 8,
    /// SHA2-384
    Sha384 = 9,
    /// SHA2-512
    Sha512 = 10,
}

impl HashAlgorithm {
    /// Parse the wire identifier
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            2 => Ok(Self::Sha1),
            8 => Ok(Self::Sha256),
            9 => Ok(Self::Sha384),
            10 => Ok(Self::Sha512),
            other => Err(PgpError::unsupported_algorithm(format!(
                "hash algorithm {}",
                other
            ))),
        }
    }

    /// Wire identifier
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Name used in `Hash:` armor headers
    pub fn armor_name(&self) -> &'static str {
        match self {
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
            Self::Sha384 => "SHA384",
            Self::Sha512 => "SHA512",
        }
    }

    /// Parse a `Hash:` armor header value
    pub fn from_armor_name(name: &str) -> Result<Self> {
        match name.trim() {
            "SHA1" => Ok(Self::Sha1),
            "SHA256" => Ok(Self::Sha256),
            "SHA384" => Ok(Self::Sha384),
            "SHA512" => Ok(Self::Sha512),
            other => Err(PgpError::unsupported_algorithm(format!("hash '{}'", other))),
        }
    }

    /// Digest length in bytes
    pub fn digest_size(&self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Fresh incremental hasher
    pub fn hasher(&self) -> Hasher {
        match self {
            Self::Sha1 => Hasher::Sha1(Sha1::new()),
            Self::Sha256 => Hasher::Sha256(Sha256::new()),
            Self::Sha384 => Hasher::Sha384(Sha384::new()),
            Self::Sha512 => Hasher::Sha512(Sha512::new()),
        }
    }
}

/// Incremental hasher over the supported algorithms
#[derive(Clone)]
pub enum Hasher {
    /// SHA-1 state
    Sha1(Sha1),
    /// SHA2-256 state
    Sha256(Sha256),
    /// SHA2-384 state
    Sha384(Sha384),
    /// SHA2-512 state
    Sha512(Sha512),
}

impl Hasher {
    /// Absorb more data
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha1(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
            Self::Sha384(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    /// Finish and return the digest
    pub fn finalize(self) -> Vec<u8> {
        match self {
            Self::Sha1(h) => h.finalize().to_vec(),
            Self::Sha256(h) => h.finalize().to_vec(),
            Self::Sha384(h) => h.finalize().to_vec(),
            Self::Sha512(h) => h.finalize().to_vec(),
        }
    }
}

/// Fill a fresh buffer from a cryptographic RNG.
///
/// A failing random source is fatal for the calling operation.
pub fn secure_random_bytes<R: CryptoRng + RngCore>(rng: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut bytes = vec![0u8; len];
    rng.try_fill_bytes(&mut bytes)
        .map_err(|e| PgpError::EntropyUnavailable(e.to_string()))?;
    Ok(bytes)
}

/// Constant-time byte comparison. Lengths are not secret.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

/// Current time as an OpenPGP timestamp
pub fn current_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().min(u32::MAX as u64) as u32)
        .unwrap_or(0)
}

fn parse_hex<const N: usize>(s: &str) -> Result<[u8; N]> {
    let s = s.trim().trim_start_matches("0x").replace(' ', "");
    let mut out = [0u8; N];
    hex::decode_to_slice(&s, &mut out).map_err(|e| {
        PgpError::invalid_input(format!("Expected {} hex digits, got '{}': {}", N * 2, s, e))
    })?;
    Ok(out)
}

/// V4 key fingerprint: SHA-1 over the framed public key packet body
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub [u8; 20]);

impl Fingerprint {
    /// Compute the fingerprint of a public key packet body
    pub fn of_public_key_body(body: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update([0x99]);
        hasher.update((body.len() as u16).to_be_bytes());
        hasher.update(body);
        Self(hasher.finalize().into())
    }

    /// Raw fingerprint bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// The key ID is the low-order 64 bits of the fingerprint
    pub fn key_id(&self) -> KeyId {
        let mut id = [0u8; 8];
        id.copy_from_slice(&self.0[12..20]);
        KeyId(id)
    }

    /// Parse from hex (40 digits, spaces allowed)
    pub fn from_hex(s: &str) -> Result<Self> {
        parse_hex::<20>(s).map(Self)
    }

    /// Constant-time equality
    pub fn ct_eq(&self, other: &Fingerprint) -> bool {
        ct_eq(&self.0, &other.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self)
    }
}

/// 64-bit key identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyId(pub [u8; 8]);

impl KeyId {
    /// The all-zero id used by anonymous recipients
    pub const WILDCARD: KeyId = KeyId([0u8; 8]);

    /// Raw id bytes
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Id as an integer
    pub fn as_u64(&self) -> u64 {
        u64::from_be_bytes(self.0)
    }

    /// Whether this is the wildcard id
    pub fn is_wildcard(&self) -> bool {
        self.ct_eq(&Self::WILDCARD)
    }

    /// Parse from 16 hex digits
    pub fn from_hex(s: &str) -> Result<Self> {
        parse_hex::<8>(s).map(Self)
    }

    /// Constant-time equality, used wherever ids come from untrusted messages
    pub fn ct_eq(&self, other: &KeyId) -> bool {
        ct_eq(&self.0, &other.0)
    }
}

impl From<u64> for KeyId {
    fn from(id: u64) -> Self {
        Self(id.to_be_bytes())
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_ids() {
        assert_eq!(PublicKeyAlgorithm::from_byte(1).unwrap(), PublicKeyAlgorithm::RsaEncryptSign);
        assert!(matches!(
            PublicKeyAlgorithm::from_byte(17),
            Err(PgpError::UnsupportedKeyType(_))
        ));
        assert!(PublicKeyAlgorithm::RsaEncryptOnly.can_encrypt());
        assert!(!PublicKeyAlgorithm::RsaEncryptOnly.can_sign());
        assert!(!PublicKeyAlgorithm::RsaSignOnly.can_encrypt());

        assert_eq!(SymmetricAlgorithm::from_byte(9).unwrap(), SymmetricAlgorithm::Aes256);
        assert!(SymmetricAlgorithm::from_byte(7).is_err());
        assert_eq!(HashAlgorithm::from_byte(8).unwrap(), HashAlgorithm::Sha256);
        assert!(matches!(
            HashAlgorithm::from_byte(1),
            Err(PgpError::UnsupportedAlgorithm(_))
        ));
    }

    fn hash_data(algorithm: HashAlgorithm, data: &[u8]) -> Vec<u8> {
        let mut hasher = algorithm.hasher();
        hasher.update(data);
        hasher.finalize()
    }

    #[test]
    fn test_hash_vectors() {
        // FIPS 180 "abc" test vectors
        let sha1 = hash_data(HashAlgorithm::Sha1, b"abc");
        assert_eq!(
            format!("{}", Fingerprint(sha1.clone().try_into().unwrap())),
            "A9993E364706816ABA3E25717850C26C9CD0D89D"
        );
        let sha256 = hash_data(HashAlgorithm::Sha256, b"abc");
        assert_eq!(sha256[..4], [0xBA, 0x78, 0x16, 0xBF]);
        for alg in [
            HashAlgorithm::Sha1,
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha384,
            HashAlgorithm::Sha512,
        ] {
            assert_eq!(hash_data(alg, b"x").len(), alg.digest_size());
            assert_eq!(HashAlgorithm::from_armor_name(alg.armor_name()).unwrap(), alg);
        }
    }

    #[test]
    fn test_incremental_hash_matches_one_shot() {
        let mut hasher = HashAlgorithm::Sha512.hasher();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.finalize(), hash_data(HashAlgorithm::Sha512, b"hello world"));
    }

    #[test]
    fn test_key_id_from_fingerprint() {
        let fp = Fingerprint([
            0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 0xDE, 0xAD, 0xBE, 0xEF, 1, 2, 3, 4,
        ]);
        let id = fp.key_id();
        assert_eq!(id.to_string(), "DEADBEEF01020304");
        assert_eq!(KeyId::from_hex("deadbeef01020304").unwrap(), id);
        assert_eq!(Fingerprint::from_hex(&fp.to_string()).unwrap(), fp);
        assert!(id.ct_eq(&KeyId::from(0xDEADBEEF01020304)));
        assert!(!id.is_wildcard());
        assert!(KeyId::WILDCARD.is_wildcard());
    }

    #[test]
    fn test_parse_hex_rejects_garbage() {
        assert!(KeyId::from_hex("1234").is_err());
        assert!(KeyId::from_hex("zzzzzzzzzzzzzzzz").is_err());
        assert!(KeyId::from_hex("ÄÄÄÄÄÄÄÄ").is_err());
    }

    #[test]
    fn test_ct_eq() {
        assert!(ct_eq(b"abc", b"abc"));
        assert!(!ct_eq(b"abc", b"abd"));
        assert!(!ct_eq(b"abc", b"ab"));
    }

    #[test]
    fn test_secure_random_bytes() {
        let mut rng = rand::rngs::OsRng;
        let a = secure_random_bytes(&mut rng, 32).unwrap();
        let b = secure_random_bytes(&mut rng, 32).unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
