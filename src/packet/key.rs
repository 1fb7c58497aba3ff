//! Key material packets: Public-Key (tag 6), Secret-Key (tag 5) and User ID (tag 13).

use super::mpi::{BodyReader, Mpi};
use super::{PacketBody, PacketType};
use crate::crypto::password::S2k;
use crate::crypto::{Fingerprint, KeyId, PublicKeyAlgorithm, SymmetricAlgorithm};
use crate::error::{PgpError, Result};
use crate::validation::Validator;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Version 4 public key packet body (RFC 4880 §5.5.2)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyPacket {
    /// Key creation time (seconds since the epoch)
    pub created: u32,
    /// Public-key algorithm
    pub algorithm: PublicKeyAlgorithm,
    /// RSA modulus
    pub n: Mpi,
    /// RSA public exponent
    pub e: Mpi,
}

impl PublicKeyPacket {
    /// Packet version written by this engine
    pub const VERSION: u8 = 4;

    fn read(reader: &mut BodyReader<'_>) -> Result<Self> {
        let version = reader.u8()?;
        if version != Self::VERSION {
            return Err(PgpError::validation(format!(
                "Unsupported public key version {}",
                version
            )));
        }
        let created = reader.u32()?;
        let algorithm = PublicKeyAlgorithm::from_byte(reader.u8()?)?;
        let n = reader.mpi()?;
        let e = reader.mpi()?;
        Ok(Self {
            created,
            algorithm,
            n,
            e,
        })
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.push(Self::VERSION);
        out.extend_from_slice(&self.created.to_be_bytes());
        out.push(self.algorithm.to_byte());
        self.n.write_to(out);
        self.e.write_to(out);
    }

    /// SHA-1 v4 fingerprint of this key
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of_public_key_body(&self.to_bytes())
    }

    /// Low 64 bits of the fingerprint
    pub fn key_id(&self) -> KeyId {
        self.fingerprint().key_id()
    }

    /// Modulus size in bits, measured on its value
    pub fn bits(&self) -> usize {
        self.n.to_biguint().bits()
    }
}

impl PacketBody for PublicKeyPacket {
    const TAG: PacketType = PacketType::PublicKey;

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(6 + self.n.encoded_len() + self.e.encoded_len());
        self.write_to(&mut out);
        out
    }

    fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut reader = BodyReader::new(data);
        let packet = Self::read(&mut reader)?;
        if !reader.is_empty() {
            return Err(PgpError::validation(format!(
                "{} trailing bytes after public key",
                reader.remaining().len()
            )));
        }
        Ok(packet)
    }
}

/// RSA secret parameters (RFC 4880 §5.5.3): `d`, `p`, `q` and `u = p^-1 mod q`
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretParams {
    /// Secret exponent
    pub d: Mpi,
    /// Smaller prime
    pub p: Mpi,
    /// Larger prime
    pub q: Mpi,
    /// Multiplicative inverse of p modulo q
    pub u: Mpi,
}

impl fmt::Debug for SecretParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretParams")
            .field("d_bits", &self.d.bits())
            .finish_non_exhaustive()
    }
}

impl SecretParams {
    /// Serialized MPIs without checksum
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for mpi in [&self.d, &self.p, &self.q, &self.u] {
            mpi.write_to(&mut out);
        }
        out
    }

    pub(crate) fn read(reader: &mut BodyReader<'_>) -> Result<Self> {
        Ok(Self {
            d: reader.mpi()?,
            p: reader.mpi()?,
            q: reader.mpi()?,
            u: reader.mpi()?,
        })
    }
}

/// Two-octet sum of the bytes, used for unprotected secret keys and session keys
pub fn checksum16(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |acc, &b| acc.wrapping_add(b as u16))
}

/// Secret half of a secret key packet
#[derive(Clone, PartialEq, Eq)]
pub enum SecretKeyMaterial {
    /// Unprotected parameters (S2K usage 0)
    Plain(SecretParams),
    /// Passphrase-protected parameters (S2K usage 254 or 255)
    Encrypted {
        /// S2K usage octet
        usage: u8,
        /// Cipher protecting the parameters
        sym_algorithm: SymmetricAlgorithm,
        /// Passphrase to key derivation
        s2k: S2k,
        /// CFB initialization vector
        iv: Vec<u8>,
        /// Encrypted parameters plus SHA-1 hash (254) or checksum (255)
        data: Vec<u8>,
    },
}

impl fmt::Debug for SecretKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("SecretKeyMaterial::Plain(..)"),
            Self::Encrypted {
                usage,
                sym_algorithm,
                s2k,
                ..
            } => f
                .debug_struct("SecretKeyMaterial::Encrypted")
                .field("usage", usage)
                .field("sym_algorithm", sym_algorithm)
                .field("s2k", s2k)
                .finish_non_exhaustive(),
        }
    }
}

impl SecretKeyMaterial {
    /// Whether a passphrase is needed to use this material
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::Encrypted { .. })
    }
}

/// Version 4 secret key packet body (RFC 4880 §5.5.3)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretKeyPacket {
    /// Public portion, identical to the matching public key packet
    pub public: PublicKeyPacket,
    /// Secret portion
    pub secret: SecretKeyMaterial,
}

impl PacketBody for SecretKeyPacket {
    const TAG: PacketType = PacketType::SecretKey;

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.public.write_to(&mut out);
        match &self.secret {
            SecretKeyMaterial::Plain(params) => {
                out.push(0);
                let mut secret = params.to_bytes();
                out.extend_from_slice(&secret);
                out.extend_from_slice(&checksum16(&secret).to_be_bytes());
                secret.zeroize();
            }
            SecretKeyMaterial::Encrypted {
                usage,
                sym_algorithm,
                s2k,
                iv,
                data,
            } => {
                out.push(*usage);
                out.push(sym_algorithm.to_byte());
                s2k.write_to(&mut out);
                out.extend_from_slice(iv);
                out.extend_from_slice(data);
            }
        }
        out
    }

    fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut reader = BodyReader::new(data);
        let public = PublicKeyPacket::read(&mut reader)?;

        let secret = match reader.u8()? {
            0 => {
                let params = SecretParams::read(&mut reader)?;
                let declared = reader.u16()?;
                let mut secret = params.to_bytes();
                let actual = checksum16(&secret);
                secret.zeroize();
                if declared != actual {
                    return Err(PgpError::integrity("Secret key checksum mismatch"));
                }
                if !reader.is_empty() {
                    return Err(PgpError::validation("Trailing bytes after secret key"));
                }
                SecretKeyMaterial::Plain(params)
            }
            usage @ (254 | 255) => {
                let sym_algorithm = SymmetricAlgorithm::from_byte(reader.u8()?)?;
                let s2k = S2k::read(&mut reader)?;
                let iv = reader.take(sym_algorithm.block_size())?.to_vec();
                let data = reader.rest().to_vec();
                if data.is_empty() {
                    return Err(PgpError::truncated("Encrypted secret key has no data"));
                }
                SecretKeyMaterial::Encrypted {
                    usage,
                    sym_algorithm,
                    s2k,
                    iv,
                    data,
                }
            }
            other => {
                return Err(PgpError::crypto(format!(
                    "Unsupported secret key protection (usage {})",
                    other
                )))
            }
        };

        Ok(Self { public, secret })
    }
}

/// User ID packet body (RFC 4880 §5.11)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdPacket {
    /// The user id, conventionally `Name <email>`
    pub user_id: String,
}

impl UserIdPacket {
    /// Validate and wrap a user id
    pub fn new(user_id: &str) -> Result<Self> {
        Validator::validate_user_id(user_id)?;
        Ok(Self {
            user_id: user_id.to_string(),
        })
    }
}

impl PacketBody for UserIdPacket {
    const TAG: PacketType = PacketType::UserId;

    fn to_bytes(&self) -> Vec<u8> {
        self.user_id.as_bytes().to_vec()
    }

    fn from_bytes(data: &[u8]) -> Result<Self> {
        let user_id = std::str::from_utf8(data)
            .map_err(|_| PgpError::validation("User ID is not valid UTF-8"))?;
        Self::new(user_id)
    }
}
