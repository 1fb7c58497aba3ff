//! Message packets: session keys, encrypted data, literal data and MDC.

use super::mpi::{BodyReader, Mpi};
use super::{PacketBody, PacketType};
use crate::crypto::{KeyId, PublicKeyAlgorithm};
use crate::error::{PgpError, Result};
use crate::validation::Validator;

/// Public-Key Encrypted Session Key packet body, version 3 (RFC 4880 §5.1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyEncryptedSessionKeyPacket {
    /// Recipient key id, or the wildcard id for anonymous recipients
    pub key_id: KeyId,
    /// Recipient public-key algorithm
    pub algorithm: PublicKeyAlgorithm,
    /// RSA-encrypted `algo || session key || checksum`
    pub encrypted_key: Mpi,
}

impl PacketBody for PublicKeyEncryptedSessionKeyPacket {
    const TAG: PacketType = PacketType::PublicKeyEncryptedSessionKey;

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(10 + self.encrypted_key.encoded_len());
        out.push(3);
        out.extend_from_slice(self.key_id.as_bytes());
        out.push(self.algorithm.to_byte());
        self.encrypted_key.write_to(&mut out);
        out
    }

    fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut reader = BodyReader::new(data);
        let version = reader.u8()?;
        if version != 3 {
            return Err(PgpError::validation(format!(
                "Unsupported session key packet version {}",
                version
            )));
        }
        let mut id = [0u8; 8];
        id.copy_from_slice(reader.take(8)?);
        let algorithm = PublicKeyAlgorithm::from_byte(reader.u8()?)?;
        let encrypted_key = reader.mpi()?;
        Ok(Self {
            key_id: KeyId(id),
            algorithm,
            encrypted_key,
        })
    }
}

/// Symmetrically Encrypted Integrity Protected Data packet body, version 1
/// (RFC 4880 §5.13). `data` holds the CFB ciphertext of the random prefix,
/// the plaintext packets and the trailing MDC packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymEncryptedIntegrityProtectedDataPacket {
    /// Encrypted payload
    pub data: Vec<u8>,
}

impl PacketBody for SymEncryptedIntegrityProtectedDataPacket {
    const TAG: PacketType = PacketType::SymEncryptedIntegrityProtectedData;

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.data.len());
        out.push(1);
        out.extend_from_slice(&self.data);
        out
    }

    fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut reader = BodyReader::new(data);
        let version = reader.u8()?;
        if version != 1 {
            return Err(PgpError::validation(format!(
                "Unsupported encrypted data version {}",
                version
            )));
        }
        Ok(Self {
            data: reader.rest().to_vec(),
        })
    }
}

/// Legacy Symmetrically Encrypted Data packet body (RFC 4880 §5.7).
///
/// It carries no integrity protection, so it is parsed for inspection but
/// never decrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymmetricallyEncryptedDataPacket {
    /// Encrypted payload
    pub data: Vec<u8>,
}

impl PacketBody for SymmetricallyEncryptedDataPacket {
    const TAG: PacketType = PacketType::SymmetricallyEncryptedData;

    fn to_bytes(&self) -> Vec<u8> {
        self.data.clone()
    }

    fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(Self {
            data: data.to_vec(),
        })
    }
}

/// Literal data format octet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiteralFormat {
    /// `b`: binary data
    Binary,
    /// `t`: text
    Text,
    /// `u`: UTF-8 text
    Utf8,
}

impl LiteralFormat {
    /// Convert format to its octet
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Binary => b'b',
            Self::Text => b't',
            Self::Utf8 => b'u',
        }
    }

    /// Convert octet to format
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            b'b' => Ok(Self::Binary),
            b't' => Ok(Self::Text),
            b'u' => Ok(Self::Utf8),
            other => Err(PgpError::validation(format!(
                "Unknown literal data format 0x{:02X}",
                other
            ))),
        }
    }
}

/// Literal Data packet body (RFC 4880 §5.9)
#[derive(Clone, PartialEq, Eq)]
pub struct LiteralDataPacket {
    /// Data format
    pub format: LiteralFormat,
    /// File name, at most 255 bytes
    pub filename: Vec<u8>,
    /// Modification date or 0
    pub date: u32,
    /// The literal content
    pub data: Vec<u8>,
}

impl std::fmt::Debug for LiteralDataPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiteralDataPacket")
            .field("format", &self.format)
            .field("filename", &String::from_utf8_lossy(&self.filename))
            .field("date", &self.date)
            .field("data_len", &self.data.len())
            .finish()
    }
}

impl LiteralDataPacket {
    /// Binary literal data without file name
    pub fn binary(data: &[u8], date: u32) -> Self {
        Self {
            format: LiteralFormat::Binary,
            filename: Vec::new(),
            date,
            data: data.to_vec(),
        }
    }

    /// Attach a file name, truncated to the 255 bytes the format allows
    pub fn with_filename(mut self, filename: &str) -> Self {
        let mut end = filename.len().min(255);
        while !filename.is_char_boundary(end) {
            end -= 1;
        }
        self.filename = filename.as_bytes()[..end].to_vec();
        self
    }
}

impl PacketBody for LiteralDataPacket {
    const TAG: PacketType = PacketType::LiteralData;

    fn to_bytes(&self) -> Vec<u8> {
        let name_len = self.filename.len().min(255);
        let mut out = Vec::with_capacity(6 + name_len + self.data.len());
        out.push(self.format.to_byte());
        out.push(name_len as u8);
        out.extend_from_slice(&self.filename[..name_len]);
        out.extend_from_slice(&self.date.to_be_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut reader = BodyReader::new(data);
        let format = LiteralFormat::from_byte(reader.u8()?)?;
        let name_len = reader.u8()? as usize;
        let filename = reader.take(name_len)?.to_vec();
        let date = reader.u32()?;
        let content = reader.rest();
        Validator::validate_message_size(content)?;
        Ok(Self {
            format,
            filename,
            date,
            data: content.to_vec(),
        })
    }
}

/// Modification Detection Code packet body (RFC 4880 §5.14).
///
/// Only ever appears as the last 22 bytes of a decrypted SEIPD payload,
/// always with the fixed header `0xD3 0x14`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModificationDetectionCodePacket {
    /// SHA-1 over the prefix, plaintext and the MDC header
    pub hash: [u8; 20],
}

impl ModificationDetectionCodePacket {
    /// The fixed new-format header preceding the hash
    pub const HEADER: [u8; 2] = [0xD3, 0x14];

    /// Header plus body length
    pub const ENCODED_LEN: usize = 22;
}

impl PacketBody for ModificationDetectionCodePacket {
    const TAG: PacketType = PacketType::ModificationDetectionCode;

    fn to_bytes(&self) -> Vec<u8> {
        self.hash.to_vec()
    }

    fn from_bytes(data: &[u8]) -> Result<Self> {
        let hash: [u8; 20] = data
            .try_into()
            .map_err(|_| PgpError::integrity("MDC packet has wrong length"))?;
        Ok(Self { hash })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{decode_packets, Packet};

    #[test]
    fn test_pkesk_roundtrip() {
        let packet = PublicKeyEncryptedSessionKeyPacket {
            key_id: KeyId([1, 2, 3, 4, 5, 6, 7, 8]),
            algorithm: PublicKeyAlgorithm::RsaEncryptSign,
            encrypted_key: Mpi::from_slice(&[0x77; 256]),
        };
        let bytes = packet.to_bytes();
        assert_eq!(bytes[0], 3);
        assert_eq!(&bytes[1..9], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(
            PublicKeyEncryptedSessionKeyPacket::from_bytes(&bytes).unwrap(),
            packet
        );
    }

    #[test]
    fn test_pkesk_rejects_v2() {
        let mut bytes = PublicKeyEncryptedSessionKeyPacket {
            key_id: KeyId::WILDCARD,
            algorithm: PublicKeyAlgorithm::RsaEncryptSign,
            encrypted_key: Mpi::from_slice(&[1]),
        }
        .to_bytes();
        bytes[0] = 2;
        assert!(PublicKeyEncryptedSessionKeyPacket::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_seipd_version() {
        let packet = SymEncryptedIntegrityProtectedDataPacket {
            data: vec![1, 2, 3],
        };
        assert_eq!(packet.to_bytes(), vec![1, 1, 2, 3]);
        assert_eq!(
            SymEncryptedIntegrityProtectedDataPacket::from_bytes(&[1, 1, 2, 3]).unwrap(),
            packet
        );
        assert!(SymEncryptedIntegrityProtectedDataPacket::from_bytes(&[2, 1]).is_err());
        assert!(SymEncryptedIntegrityProtectedDataPacket::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_literal_roundtrip() {
        let packet = LiteralDataPacket::binary(b"hello", 1_234_567).with_filename("note.txt");
        let bytes = packet.to_bytes();
        assert_eq!(bytes[0], b'b');
        assert_eq!(bytes[1], 8);
        assert_eq!(&bytes[2..10], b"note.txt");
        assert_eq!(LiteralDataPacket::from_bytes(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_literal_empty_and_formats() {
        let mut packet = LiteralDataPacket::binary(b"", 0);
        packet.format = LiteralFormat::Utf8;
        let parsed = LiteralDataPacket::from_bytes(&packet.to_bytes()).unwrap();
        assert!(parsed.data.is_empty());
        assert_eq!(parsed.format, LiteralFormat::Utf8);

        assert!(LiteralDataPacket::from_bytes(&[b'x', 0, 0, 0, 0, 0]).is_err());
        assert!(matches!(
            LiteralDataPacket::from_bytes(&[b'b', 5, b'a']),
            Err(PgpError::TruncatedPacket(_))
        ));
    }

    #[test]
    fn test_long_filename_is_truncated_on_char_boundary() {
        let name = "é".repeat(200);
        let packet = LiteralDataPacket::binary(b"x", 0).with_filename(&name);
        assert_eq!(packet.filename.len(), 254);
        assert!(std::str::from_utf8(&packet.filename).is_ok());
    }

    #[test]
    fn test_mdc_packet_header() {
        let mdc = ModificationDetectionCodePacket { hash: [0x42; 20] };
        let bytes = mdc.to_packet().to_bytes();
        assert_eq!(bytes.len(), ModificationDetectionCodePacket::ENCODED_LEN);
        assert_eq!(&bytes[..2], &ModificationDetectionCodePacket::HEADER);
        assert!(ModificationDetectionCodePacket::from_bytes(&[0; 19]).is_err());
    }

    #[test]
    fn test_legacy_encrypted_data_is_parsed() {
        let packet = Packet::new(PacketType::SymmetricallyEncryptedData, vec![9; 40]);
        let packets = decode_packets(&packet.to_bytes()).unwrap();
        let sed: SymmetricallyEncryptedDataPacket = packets[0].parse_body().unwrap();
        assert_eq!(sed.data.len(), 40);
    }
}
