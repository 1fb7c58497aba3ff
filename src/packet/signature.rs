//! Signature (tag 2) and One-Pass Signature (tag 4) packets.
//!
//! Only version 4 signatures are produced and accepted. The hashed subpacket
//! area and the trailer returned by [`SignaturePacket::hash_trailer`] are what
//! the digest covers after the signed data itself.

use super::mpi::{BodyReader, Mpi};
use super::{PacketBody, PacketType};
use crate::crypto::{Fingerprint, HashAlgorithm, KeyId, PublicKeyAlgorithm};
use crate::error::{PgpError, Result};

/// Signature types (RFC 4880 §5.2.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureType {
    /// Signature of a binary document
    Binary,
    /// Signature of a canonical text document
    Text,
    /// Generic certification of a User ID
    GenericCertification,
    /// Persona certification
    PersonaCertification,
    /// Casual certification
    CasualCertification,
    /// Positive certification, used for self-signatures
    PositiveCertification,
    /// Binding of a subkey to its primary key
    SubkeyBinding,
    /// Any other type, carried through unchanged
    Other(u8),
}

impl SignatureType {
    /// Convert signature type to byte value
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Binary => 0x00,
            Self::Text => 0x01,
            Self::GenericCertification => 0x10,
            Self::PersonaCertification => 0x11,
            Self::CasualCertification => 0x12,
            Self::PositiveCertification => 0x13,
            Self::SubkeyBinding => 0x18,
            Self::Other(b) => b,
        }
    }

    /// Convert byte value to signature type
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => Self::Binary,
            0x01 => Self::Text,
            0x10 => Self::GenericCertification,
            0x11 => Self::PersonaCertification,
            0x12 => Self::CasualCertification,
            0x13 => Self::PositiveCertification,
            0x18 => Self::SubkeyBinding,
            other => Self::Other(other),
        }
    }

    /// Whether this type binds a User ID to a key
    pub fn is_certification(self) -> bool {
        matches!(
            self,
            Self::GenericCertification
                | Self::PersonaCertification
                | Self::CasualCertification
                | Self::PositiveCertification
        )
    }

    /// Whether this type signs document data
    pub fn is_document(self) -> bool {
        matches!(self, Self::Binary | Self::Text)
    }
}

/// Key flag bits (RFC 4880 §5.2.3.21)
pub mod key_flags {
    /// May certify other keys
    pub const CERTIFY: u8 = 0x01;
    /// May sign data
    pub const SIGN: u8 = 0x02;
    /// May encrypt communications
    pub const ENCRYPT_COMMUNICATIONS: u8 = 0x04;
    /// May encrypt storage
    pub const ENCRYPT_STORAGE: u8 = 0x08;
}

/// Signature subpackets this engine interprets; everything else is kept raw
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subpacket {
    /// Signature creation time (type 2)
    SignatureCreationTime(u32),
    /// Preferred symmetric algorithms (type 11)
    PreferredSymmetric(Vec<u8>),
    /// Issuer key id (type 16)
    Issuer(KeyId),
    /// Preferred hash algorithms (type 21)
    PreferredHash(Vec<u8>),
    /// Key flags (type 27), first octet only
    KeyFlags(u8),
    /// Issuer fingerprint (type 33, key version 4)
    IssuerFingerprint(Fingerprint),
    /// Uninterpreted subpacket
    Unknown {
        /// Subpacket type without the critical bit
        tag: u8,
        /// Critical bit
        critical: bool,
        /// Raw body
        data: Vec<u8>,
    },
}

impl Subpacket {
    fn tag(&self) -> u8 {
        match self {
            Self::SignatureCreationTime(_) => 2,
            Self::PreferredSymmetric(_) => 11,
            Self::Issuer(_) => 16,
            Self::PreferredHash(_) => 21,
            Self::KeyFlags(_) => 27,
            Self::IssuerFingerprint(_) => 33,
            Self::Unknown { tag, .. } => *tag,
        }
    }

    fn body(&self) -> Vec<u8> {
        match self {
            Self::SignatureCreationTime(t) => t.to_be_bytes().to_vec(),
            Self::PreferredSymmetric(algos) | Self::PreferredHash(algos) => algos.clone(),
            Self::Issuer(id) => id.as_bytes().to_vec(),
            Self::KeyFlags(flags) => vec![*flags],
            Self::IssuerFingerprint(fp) => {
                let mut body = vec![4];
                body.extend_from_slice(fp.as_bytes());
                body
            }
            Self::Unknown { data, .. } => data.clone(),
        }
    }

    /// Whether the subpacket is unknown and flagged critical
    pub fn is_unknown_critical(&self) -> bool {
        matches!(self, Self::Unknown { critical: true, .. })
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        let body = self.body();
        let len = body.len() + 1;
        if len < 192 {
            out.push(len as u8);
        } else if len < 8384 {
            let encoded = len - 192;
            out.push(192 + (encoded >> 8) as u8);
            out.push((encoded & 0xFF) as u8);
        } else {
            out.push(0xFF);
            out.extend_from_slice(&(len as u32).to_be_bytes());
        }
        let critical = matches!(self, Self::Unknown { critical: true, .. });
        out.push(self.tag() | if critical { 0x80 } else { 0 });
        out.extend_from_slice(&body);
    }

    fn read(reader: &mut BodyReader<'_>) -> Result<Self> {
        let first = reader.u8()?;
        let len = match first {
            0..=191 => first as usize,
            192..=254 => ((first as usize - 192) << 8) + reader.u8()? as usize + 192,
            255 => reader.u32()? as usize,
        };
        if len == 0 {
            return Err(PgpError::validation("Empty signature subpacket"));
        }
        let type_octet = reader.u8()?;
        let data = reader.take(len - 1)?;
        let critical = type_octet & 0x80 != 0;
        let tag = type_octet & 0x7F;

        let exact = |want: usize| -> Result<()> {
            if data.len() == want {
                Ok(())
            } else {
                Err(PgpError::validation(format!(
                    "Subpacket {} has length {}, expected {}",
                    tag,
                    data.len(),
                    want
                )))
            }
        };

        Ok(match tag {
            2 => {
                exact(4)?;
                Self::SignatureCreationTime(u32::from_be_bytes([data[0], data[1], data[2], data[3]]))
            }
            11 => Self::PreferredSymmetric(data.to_vec()),
            16 => {
                exact(8)?;
                let mut id = [0u8; 8];
                id.copy_from_slice(data);
                Self::Issuer(KeyId(id))
            }
            21 => Self::PreferredHash(data.to_vec()),
            27 if data.len() == 1 => Self::KeyFlags(data[0]),
            33 if data.first() == Some(&4) => {
                exact(21)?;
                let mut fp = [0u8; 20];
                fp.copy_from_slice(&data[1..]);
                Self::IssuerFingerprint(Fingerprint(fp))
            }
            _ => Self::Unknown {
                tag,
                critical,
                data: data.to_vec(),
            },
        })
    }
}

/// Encode a subpacket area without its two-octet length
pub fn encode_subpackets(subpackets: &[Subpacket]) -> Vec<u8> {
    let mut area = Vec::new();
    for subpacket in subpackets {
        subpacket.write_to(&mut area);
    }
    area
}

fn read_subpacket_area<'a>(reader: &mut BodyReader<'a>) -> Result<(Vec<Subpacket>, &'a [u8])> {
    let len = reader.u16()? as usize;
    let raw = reader.take(len)?;
    let mut area = BodyReader::new(raw);
    let mut subpackets = Vec::new();
    while !area.is_empty() {
        subpackets.push(Subpacket::read(&mut area)?);
    }
    Ok((subpackets, raw))
}

/// Version 4 signature packet body (RFC 4880 §5.2.3)
///
/// The hashed area is kept exactly as received so that signatures made by
/// other implementations hash the same bytes they signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignaturePacket {
    /// What the signature covers
    pub sig_type: SignatureType,
    /// Signing algorithm
    pub pk_algorithm: PublicKeyAlgorithm,
    /// Digest algorithm
    pub hash_algorithm: HashAlgorithm,
    hashed: Vec<Subpacket>,
    hashed_area: Vec<u8>,
    /// Advisory subpackets outside the signature
    pub unhashed: Vec<Subpacket>,
    /// Leftmost 16 bits of the signed digest
    pub hash_prefix: [u8; 2],
    /// RSA signature value `m^d mod n`
    pub signature: Mpi,
}

impl SignaturePacket {
    /// Packet version written by this engine
    pub const VERSION: u8 = 4;

    /// Assemble a signature from its parts
    pub fn new(
        sig_type: SignatureType,
        pk_algorithm: PublicKeyAlgorithm,
        hash_algorithm: HashAlgorithm,
        hashed: Vec<Subpacket>,
        unhashed: Vec<Subpacket>,
        hash_prefix: [u8; 2],
        signature: Mpi,
    ) -> Self {
        let hashed_area = encode_subpackets(&hashed);
        Self {
            sig_type,
            pk_algorithm,
            hash_algorithm,
            hashed,
            hashed_area,
            unhashed,
            hash_prefix,
            signature,
        }
    }

    /// Subpackets covered by the signature
    pub fn hashed(&self) -> &[Subpacket] {
        &self.hashed
    }

    /// The bytes hashed after the signed data: version, type, algorithms,
    /// hashed subpackets and the final `0x04 0xFF` length trailer.
    pub fn hash_trailer(&self) -> Vec<u8> {
        Self::trailer_for(
            self.sig_type,
            self.pk_algorithm,
            self.hash_algorithm,
            &self.hashed_area,
        )
    }

    /// Hash trailer for an encoded hashed area
    pub fn trailer_for(
        sig_type: SignatureType,
        pk_algorithm: PublicKeyAlgorithm,
        hash_algorithm: HashAlgorithm,
        hashed_area: &[u8],
    ) -> Vec<u8> {
        let mut trailer = Vec::with_capacity(12 + hashed_area.len());
        trailer.push(Self::VERSION);
        trailer.push(sig_type.to_byte());
        trailer.push(pk_algorithm.to_byte());
        trailer.push(hash_algorithm.to_byte());
        trailer.extend_from_slice(&(hashed_area.len() as u16).to_be_bytes());
        trailer.extend_from_slice(hashed_area);

        let hashed_len = trailer.len() as u32;
        trailer.push(Self::VERSION);
        trailer.push(0xFF);
        trailer.extend_from_slice(&hashed_len.to_be_bytes());
        trailer
    }

    fn all_subpackets(&self) -> impl Iterator<Item = &Subpacket> {
        self.hashed.iter().chain(self.unhashed.iter())
    }

    /// Issuer key id from the issuer or issuer-fingerprint subpacket
    pub fn issuer(&self) -> Option<KeyId> {
        self.all_subpackets().find_map(|sp| match sp {
            Subpacket::Issuer(id) => Some(*id),
            Subpacket::IssuerFingerprint(fp) => Some(fp.key_id()),
            _ => None,
        })
    }

    /// Issuer fingerprint, if present
    pub fn issuer_fingerprint(&self) -> Option<Fingerprint> {
        self.all_subpackets().find_map(|sp| match sp {
            Subpacket::IssuerFingerprint(fp) => Some(*fp),
            _ => None,
        })
    }

    /// Creation time from the hashed area
    pub fn created(&self) -> Option<u32> {
        self.hashed.iter().find_map(|sp| match sp {
            Subpacket::SignatureCreationTime(t) => Some(*t),
            _ => None,
        })
    }

    /// Key flags from the hashed area
    pub fn key_flags(&self) -> Option<u8> {
        self.hashed.iter().find_map(|sp| match sp {
            Subpacket::KeyFlags(flags) => Some(*flags),
            _ => None,
        })
    }

    /// Whether the hashed area carries a critical subpacket we cannot interpret
    pub fn has_unknown_critical(&self) -> bool {
        self.hashed.iter().any(Subpacket::is_unknown_critical)
    }
}

impl PacketBody for SignaturePacket {
    const TAG: PacketType = PacketType::Signature;

    fn to_bytes(&self) -> Vec<u8> {
        let hashed = &self.hashed_area;
        let unhashed = encode_subpackets(&self.unhashed);
        let mut out = Vec::with_capacity(10 + hashed.len() + unhashed.len() + self.signature.encoded_len());
        out.push(Self::VERSION);
        out.push(self.sig_type.to_byte());
        out.push(self.pk_algorithm.to_byte());
        out.push(self.hash_algorithm.to_byte());
        out.extend_from_slice(&(hashed.len() as u16).to_be_bytes());
        out.extend_from_slice(hashed);
        out.extend_from_slice(&(unhashed.len() as u16).to_be_bytes());
        out.extend_from_slice(&unhashed);
        out.extend_from_slice(&self.hash_prefix);
        self.signature.write_to(&mut out);
        out
    }

    fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut reader = BodyReader::new(data);
        let version = reader.u8()?;
        if version != Self::VERSION {
            return Err(PgpError::validation(format!(
                "Unsupported signature version {}",
                version
            )));
        }
        let sig_type = SignatureType::from_byte(reader.u8()?);
        let pk_algorithm = PublicKeyAlgorithm::from_byte(reader.u8()?)?;
        let hash_algorithm = HashAlgorithm::from_byte(reader.u8()?)?;
        let (hashed, hashed_area) = read_subpacket_area(&mut reader)?;
        let (unhashed, _) = read_subpacket_area(&mut reader)?;
        let prefix = reader.take(2)?;
        let signature = reader.mpi()?;
        if !reader.is_empty() {
            return Err(PgpError::validation("Trailing bytes after signature"));
        }

        Ok(Self {
            sig_type,
            pk_algorithm,
            hash_algorithm,
            hashed,
            hashed_area: hashed_area.to_vec(),
            unhashed,
            hash_prefix: [prefix[0], prefix[1]],
            signature,
        })
    }
}

/// One-pass signature packet body (RFC 4880 §5.4)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnePassSignaturePacket {
    /// Type of the signature that follows the data
    pub sig_type: SignatureType,
    /// Digest algorithm
    pub hash_algorithm: HashAlgorithm,
    /// Signing algorithm
    pub pk_algorithm: PublicKeyAlgorithm,
    /// Key id of the signer
    pub key_id: KeyId,
    /// False when another one-pass signature follows (nested)
    pub last: bool,
}

impl PacketBody for OnePassSignaturePacket {
    const TAG: PacketType = PacketType::OnePassSignature;

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(13);
        out.push(3);
        out.push(self.sig_type.to_byte());
        out.push(self.hash_algorithm.to_byte());
        out.push(self.pk_algorithm.to_byte());
        out.extend_from_slice(self.key_id.as_bytes());
        out.push(u8::from(self.last));
        out
    }

    fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut reader = BodyReader::new(data);
        let version = reader.u8()?;
        if version != 3 {
            return Err(PgpError::validation(format!(
                "Unsupported one-pass signature version {}",
                version
            )));
        }
        let sig_type = SignatureType::from_byte(reader.u8()?);
        let hash_algorithm = HashAlgorithm::from_byte(reader.u8()?)?;
        let pk_algorithm = PublicKeyAlgorithm::from_byte(reader.u8()?)?;
        let mut id = [0u8; 8];
        id.copy_from_slice(reader.take(8)?);
        let last = reader.u8()? != 0;

        Ok(Self {
            sig_type,
            hash_algorithm,
            pk_algorithm,
            key_id: KeyId(id),
            last,
        })
    }
}
