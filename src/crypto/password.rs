//! Passphrase-based private key protection using OpenPGP S2K and AES-256 CFB.
//!
//! Locked keys use S2K usage 254: the secret MPIs followed by their SHA-1
//! hash are encrypted with a key derived from the passphrase. A wrong
//! passphrase is detected through that hash.

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::symmetric::{cfb_decrypt, cfb_encrypt};
use crate::crypto::{ct_eq, secure_random_bytes, HashAlgorithm, SymmetricAlgorithm};
use crate::error::{PgpError, Result};
use crate::packet::key::checksum16;
use crate::packet::mpi::BodyReader;
use crate::packet::{SecretKeyMaterial, SecretParams};

/// Default iteration count octet: 0x96 encodes 720896 hashed bytes
pub const DEFAULT_S2K_COUNT: u8 = 0x96;

/// Passphrase for key locking and unlocking
#[derive(Clone)]
pub struct Password(String);

impl Password {
    /// Create a new password from a string
    pub fn new(password: String) -> Self {
        Self(password)
    }

    /// Get password as bytes
    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Check if password is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Password {
    fn from(password: &str) -> Self {
        Self(password.to_string())
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

impl Drop for Password {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// String-to-key specifier (RFC 4880 §3.7)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum S2k {
    /// Type 0: hash of the passphrase
    Simple {
        /// Digest algorithm
        hash: HashAlgorithm,
    },
    /// Type 1: hash of salt and passphrase
    Salted {
        /// Digest algorithm
        hash: HashAlgorithm,
        /// Eight-octet salt
        salt: [u8; 8],
    },
    /// Type 3: salt and passphrase hashed repeatedly up to a byte count
    IteratedSalted {
        /// Digest algorithm
        hash: HashAlgorithm,
        /// Eight-octet salt
        salt: [u8; 8],
        /// Coded count octet
        count: u8,
    },
}

/// Decode the one-octet iteration count
pub fn decode_count(count: u8) -> usize {
    (16 + (count as usize & 15)) << ((count as usize >> 4) + 6)
}

impl S2k {
    pub(crate) fn read(reader: &mut BodyReader<'_>) -> Result<Self> {
        let kind = reader.u8()?;
        let hash = HashAlgorithm::from_byte(reader.u8()?)?;
        let mut salt = [0u8; 8];
        match kind {
            0 => Ok(Self::Simple { hash }),
            1 => {
                salt.copy_from_slice(reader.take(8)?);
                Ok(Self::Salted { hash, salt })
            }
            3 => {
                salt.copy_from_slice(reader.take(8)?);
                let count = reader.u8()?;
                Ok(Self::IteratedSalted { hash, salt, count })
            }
            other => Err(PgpError::crypto(format!("Unsupported S2K type {}", other))),
        }
    }

    /// Append the wire encoding
    pub fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Self::Simple { hash } => {
                out.push(0);
                out.push(hash.to_byte());
            }
            Self::Salted { hash, salt } => {
                out.push(1);
                out.push(hash.to_byte());
                out.extend_from_slice(salt);
            }
            Self::IteratedSalted { hash, salt, count } => {
                out.push(3);
                out.push(hash.to_byte());
                out.extend_from_slice(salt);
                out.push(*count);
            }
        }
    }

    /// Derive `key_size` bytes of key material from the passphrase
    pub fn derive_key(&self, password: &Password, key_size: usize) -> Zeroizing<Vec<u8>> {
        let (hash, salt, count) = match self {
            Self::Simple { hash } => (*hash, &[][..], None),
            Self::Salted { hash, salt } => (*hash, &salt[..], None),
            Self::IteratedSalted { hash, salt, count } => {
                (*hash, &salt[..], Some(decode_count(*count)))
            }
        };

        let mut input = Zeroizing::new(Vec::with_capacity(salt.len() + password.as_bytes().len()));
        input.extend_from_slice(salt);
        input.extend_from_slice(password.as_bytes());

        let mut key = Zeroizing::new(Vec::with_capacity(key_size));
        let mut preload = 0usize;
        while key.len() < key_size {
            let mut hasher = hash.hasher();
            hasher.update(&vec![0u8; preload]);
            match count {
                Some(count) if !input.is_empty() => {
                    let count = count.max(input.len());
                    for _ in 0..count / input.len() {
                        hasher.update(&input);
                    }
                    hasher.update(&input[..count % input.len()]);
                }
                _ => hasher.update(&input),
            }
            let digest = Zeroizing::new(hasher.finalize());
            let take = (key_size - key.len()).min(digest.len());
            key.extend_from_slice(&digest[..take]);
            preload += 1;
        }
        key
    }
}

/// Parameters used when locking a private key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProtectionParams {
    /// Digest used by the S2K function
    pub s2k_hash: HashAlgorithm,
    /// Coded S2K iteration count
    pub s2k_count: u8,
}

impl Default for ProtectionParams {
    fn default() -> Self {
        Self {
            s2k_hash: HashAlgorithm::Sha256,
            s2k_count: DEFAULT_S2K_COUNT,
        }
    }
}

/// Encrypt secret parameters under a passphrase (S2K usage 254)
pub fn protect<R: CryptoRng + RngCore>(
    params: &SecretParams,
    password: &Password,
    protection: &ProtectionParams,
    rng: &mut R,
) -> Result<SecretKeyMaterial> {
    if password.is_empty() {
        return Err(PgpError::invalid_input("Passphrase cannot be empty"));
    }

    let sym_algorithm = SymmetricAlgorithm::Aes256;
    let mut salt = [0u8; 8];
    salt.copy_from_slice(&secure_random_bytes(rng, 8)?);
    let iv = secure_random_bytes(rng, sym_algorithm.block_size())?;
    let s2k = S2k::IteratedSalted {
        hash: protection.s2k_hash,
        salt,
        count: protection.s2k_count,
    };
    let key = s2k.derive_key(password, sym_algorithm.key_size());

    let mut data = params.to_bytes();
    let hash = Sha1::digest(&data);
    data.extend_from_slice(&hash);
    cfb_encrypt(&key, &iv, &mut data)?;

    Ok(SecretKeyMaterial::Encrypted {
        usage: 254,
        sym_algorithm,
        s2k,
        iv,
        data,
    })
}

/// Decrypt protected secret parameters.
///
/// Any failure after decryption (hash, checksum or MPI structure) is
/// reported as [`PgpError::WrongPassphrase`].
pub fn unprotect(material: &SecretKeyMaterial, password: &Password) -> Result<SecretParams> {
    let (usage, sym_algorithm, s2k, iv, data) = match material {
        SecretKeyMaterial::Plain(params) => return Ok(params.clone()),
        SecretKeyMaterial::Encrypted {
            usage,
            sym_algorithm,
            s2k,
            iv,
            data,
        } => (*usage, *sym_algorithm, s2k, iv, data),
    };

    let key = s2k.derive_key(password, sym_algorithm.key_size());
    let mut plain = Zeroizing::new(data.clone());
    cfb_decrypt(&key, iv, &mut plain)?;

    let check_len = if usage == 254 { 20 } else { 2 };
    if plain.len() < check_len {
        return Err(PgpError::WrongPassphrase);
    }
    let (secret, check) = plain.split_at(plain.len() - check_len);
    let valid = if usage == 254 {
        ct_eq(&Sha1::digest(secret), check)
    } else {
        ct_eq(&checksum16(secret).to_be_bytes(), check)
    };
    if !valid {
        return Err(PgpError::WrongPassphrase);
    }

    let mut reader = BodyReader::new(secret);
    let params = SecretParams::read(&mut reader).map_err(|_| PgpError::WrongPassphrase)?;
    if !reader.is_empty() {
        return Err(PgpError::WrongPassphrase);
    }
    Ok(params)
}
