//! OpenPGP packet framing (RFC 4880 §4).
//!
//! A packet is a tag plus a length-prefixed body. This module handles the
//! framing only: new-format headers (one, two and five octet lengths plus
//! partial body chunks) and old-format headers (one, two, four octet and
//! indeterminate lengths). The typed bodies live in the submodules and all
//! implement [`PacketBody`].
//!
//! Stream decoding via [`decode_packets`] skips packets whose tag is unknown
//! and logs them; every other framing problem aborts the stream.

use crate::error::{PgpError, Result};
use crate::validation::Validator;
use tracing::warn;

pub mod key;
pub mod message;
pub mod mpi;
pub mod signature;

pub use key::{PublicKeyPacket, SecretKeyMaterial, SecretKeyPacket, SecretParams, UserIdPacket};
pub use message::{
    LiteralDataPacket, LiteralFormat, ModificationDetectionCodePacket,
    PublicKeyEncryptedSessionKeyPacket, SymEncryptedIntegrityProtectedDataPacket,
    SymmetricallyEncryptedDataPacket,
};
pub use mpi::Mpi;
pub use signature::{key_flags, OnePassSignaturePacket, SignaturePacket, SignatureType, Subpacket};

/// PGP packet types defined in RFC 4880
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Public-Key Encrypted Session Key Packet
    PublicKeyEncryptedSessionKey = 1,
    /// Signature Packet
    Signature = 2,
    /// Symmetric-Key Encrypted Session Key Packet
    SymmetricKeyEncryptedSessionKey = 3,
    /// One-Pass Signature Packet
    OnePassSignature = 4,
    /// Secret-Key Packet
    SecretKey = 5,
    /// Public-Key Packet
    PublicKey = 6,
    /// Secret-Subkey Packet
    SecretSubkey = 7,
    /// Compressed Data Packet
    CompressedData = 8,
    /// Symmetrically Encrypted Data Packet
    SymmetricallyEncryptedData = 9,
    /// Marker Packet
    Marker = 10,
    /// Literal Data Packet
    LiteralData = 11,
    /// Trust Packet
    Trust = 12,
    /// User ID Packet
    UserId = 13,
    /// Public-Subkey Packet
    PublicSubkey = 14,
    /// User Attribute Packet
    UserAttribute = 17,
    /// Sym. Encrypted and Integrity Protected Data Packet
    SymEncryptedIntegrityProtectedData = 18,
    /// Modification Detection Code Packet
    ModificationDetectionCode = 19,
}

impl PacketType {
    /// Convert packet type to byte value
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Convert byte value to packet type
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::PublicKeyEncryptedSessionKey),
            2 => Some(Self::Signature),
            3 => Some(Self::SymmetricKeyEncryptedSessionKey),
            4 => Some(Self::OnePassSignature),
            5 => Some(Self::SecretKey),
            6 => Some(Self::PublicKey),
            7 => Some(Self::SecretSubkey),
            8 => Some(Self::CompressedData),
            9 => Some(Self::SymmetricallyEncryptedData),
            10 => Some(Self::Marker),
            11 => Some(Self::LiteralData),
            12 => Some(Self::Trust),
            13 => Some(Self::UserId),
            14 => Some(Self::PublicSubkey),
            17 => Some(Self::UserAttribute),
            18 => Some(Self::SymEncryptedIntegrityProtectedData),
            19 => Some(Self::ModificationDetectionCode),
            _ => None,
        }
    }
}

/// Packet header encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderFormat {
    /// RFC 4880 new format (`0xC0 | tag`)
    New,
    /// Legacy format (`0x80 | tag << 2 | length type`)
    Old,
}

/// PGP packet header format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    /// Packet type
    pub packet_type: PacketType,
    /// Packet body length
    pub length: usize,
    /// Header encoding
    pub format: HeaderFormat,
}

/// A complete PGP packet with header and body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Packet header
    pub header: PacketHeader,
    /// Packet body data
    pub body: Vec<u8>,
}

/// Typed packet bodies that map to exactly one packet tag.
pub trait PacketBody: Sized {
    /// The tag this body is carried under
    const TAG: PacketType;

    /// Serialize to packet body bytes
    fn to_bytes(&self) -> Vec<u8>;

    /// Parse from packet body bytes
    fn from_bytes(data: &[u8]) -> Result<Self>;

    /// Wrap the body into a new-format packet
    fn to_packet(&self) -> Packet {
        Packet::new(Self::TAG, self.to_bytes())
    }
}

/// Body length as declared by a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyLength {
    Definite(usize),
    Partial(usize),
    Indeterminate,
}

/// Header fields before the tag is resolved, so unknown tags can be skipped.
struct RawHeader {
    tag: u8,
    format: HeaderFormat,
    length: BodyLength,
    consumed: usize,
}

fn parse_new_length(data: &[u8], offset: usize) -> Result<(BodyLength, usize)> {
    let first = Validator::validate_u8_from_bytes(data, offset)?;
    match first {
        0..=191 => Ok((BodyLength::Definite(first as usize), 1)),
        192..=223 => {
            let second = Validator::validate_u8_from_bytes(data, offset + 1)?;
            let len = ((first as usize - 192) << 8) + second as usize + 192;
            Ok((BodyLength::Definite(len), 2))
        }
        224..=254 => Ok((BodyLength::Partial(1usize << (first & 0x1F)), 1)),
        255 => {
            let len = Validator::validate_u32_from_bytes(data, offset + 1)? as usize;
            Ok((BodyLength::Definite(len), 5))
        }
    }
}

fn parse_raw_header(data: &[u8]) -> Result<RawHeader> {
    let first_byte = Validator::validate_u8_from_bytes(data, 0)
        .map_err(|_| PgpError::truncated("Empty packet header"))?;

    if (first_byte & 0x80) == 0 {
        return Err(PgpError::validation("Invalid packet header: MSB not set"));
    }

    if (first_byte & 0x40) != 0 {
        let (length, length_bytes) = parse_new_length(data, 1)?;
        Ok(RawHeader {
            tag: first_byte & 0x3F,
            format: HeaderFormat::New,
            length,
            consumed: 1 + length_bytes,
        })
    } else {
        let tag = (first_byte >> 2) & 0x0F;
        let (length, length_bytes) = match first_byte & 0x03 {
            0 => (
                BodyLength::Definite(Validator::validate_u8_from_bytes(data, 1)? as usize),
                1,
            ),
            1 => (
                BodyLength::Definite(Validator::validate_u16_from_bytes(data, 1)? as usize),
                2,
            ),
            2 => (
                BodyLength::Definite(Validator::validate_u32_from_bytes(data, 1)? as usize),
                4,
            ),
            _ => (BodyLength::Indeterminate, 0),
        };
        Ok(RawHeader {
            tag,
            format: HeaderFormat::Old,
            length,
            consumed: 1 + length_bytes,
        })
    }
}

fn encode_new_length(length: usize, out: &mut Vec<u8>) {
    if length < 192 {
        out.push(length as u8);
    } else if length < 8384 {
        let encoded = length - 192;
        out.push(192 + (encoded >> 8) as u8);
        out.push((encoded & 0xFF) as u8);
    } else {
        out.push(0xFF);
        out.extend_from_slice(&(length as u32).to_be_bytes());
    }
}

impl PacketHeader {
    /// Create a new-format packet header
    pub fn new(packet_type: PacketType, length: usize) -> Self {
        Self {
            packet_type,
            length,
            format: HeaderFormat::New,
        }
    }

    /// Create an old-format packet header
    pub fn new_old_format(packet_type: PacketType, length: usize) -> Self {
        Self {
            packet_type,
            length,
            format: HeaderFormat::Old,
        }
    }

    /// Serialize packet header to bytes.
    ///
    /// Old-format headers can only carry tags below 16; larger tags are
    /// always written in the new format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(6);
        let tag = self.packet_type.to_byte();

        if self.format == HeaderFormat::Old && tag < 16 {
            let base = 0x80 | (tag << 2);
            if self.length < 0x100 {
                bytes.push(base);
                bytes.push(self.length as u8);
            } else if self.length < 0x10000 {
                bytes.push(base | 1);
                bytes.extend_from_slice(&(self.length as u16).to_be_bytes());
            } else {
                bytes.push(base | 2);
                bytes.extend_from_slice(&(self.length as u32).to_be_bytes());
            }
        } else {
            bytes.push(0xC0 | tag);
            encode_new_length(self.length, &mut bytes);
        }

        bytes
    }

    /// Parse a packet header with a definite length.
    ///
    /// Returns the header and the number of header bytes consumed. Partial
    /// and indeterminate lengths need the body as well; use
    /// [`Packet::parse`] for those.
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize)> {
        let raw = parse_raw_header(data)?;
        let packet_type =
            PacketType::from_byte(raw.tag).ok_or(PgpError::UnknownPacketTag(raw.tag))?;

        let length = match raw.length {
            BodyLength::Definite(len) => len,
            BodyLength::Partial(_) | BodyLength::Indeterminate => {
                return Err(PgpError::validation(
                    "Header without definite length needs the packet body",
                ))
            }
        };
        Validator::validate_packet_size(length)?;

        Ok((
            Self {
                packet_type,
                length,
                format: raw.format,
            },
            raw.consumed,
        ))
    }
}

/// A packet whose tag has not been resolved yet.
struct RawPacket {
    tag: u8,
    format: HeaderFormat,
    body: Vec<u8>,
    consumed: usize,
}

fn read_raw_packet(data: &[u8]) -> Result<RawPacket> {
    let header = parse_raw_header(data)?;
    let mut offset = header.consumed;

    let body = match header.length {
        BodyLength::Definite(len) => {
            Validator::validate_packet_size(len)?;
            let body = Validator::validate_slice_extraction(data, offset, len).map_err(|_| {
                PgpError::truncated(format!(
                    "Packet tag {} declares {} body bytes, {} available",
                    header.tag,
                    len,
                    data.len().saturating_sub(offset)
                ))
            })?;
            offset += len;
            body.to_vec()
        }
        BodyLength::Indeterminate => {
            let body = data[offset..].to_vec();
            Validator::validate_packet_size(body.len())?;
            offset = data.len();
            body
        }
        BodyLength::Partial(first_chunk) => {
            let mut body = Vec::new();
            let mut len = first_chunk;
            let mut last = false;
            loop {
                Validator::validate_packet_size(body.len() + len)?;
                let part = Validator::validate_slice_extraction(data, offset, len)
                    .map_err(|_| PgpError::truncated("Partial body chunk exceeds input"))?;
                body.extend_from_slice(part);
                offset += len;

                if last {
                    break;
                }
                let (next, length_bytes) = parse_new_length(data, offset)?;
                offset += length_bytes;
                match next {
                    BodyLength::Partial(next_len) => len = next_len,
                    BodyLength::Definite(next_len) => {
                        len = next_len;
                        last = true;
                    }
                    BodyLength::Indeterminate => {
                        return Err(PgpError::validation("Indeterminate length in partial body"))
                    }
                }
            }
            body
        }
    };

    Ok(RawPacket {
        tag: header.tag,
        format: header.format,
        body,
        consumed: offset,
    })
}

impl Packet {
    /// Create a new packet with a new-format header
    pub fn new(packet_type: PacketType, body: Vec<u8>) -> Self {
        let header = PacketHeader::new(packet_type, body.len());
        Self { header, body }
    }

    /// Create a new packet with the given header format
    pub fn with_format(packet_type: PacketType, body: Vec<u8>, format: HeaderFormat) -> Self {
        let header = PacketHeader {
            packet_type,
            length: body.len(),
            format,
        };
        Self { header, body }
    }

    /// The packet's tag
    pub fn packet_type(&self) -> PacketType {
        self.header.packet_type
    }

    /// Serialize packet to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.header.to_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }

    /// Parse one packet from the front of `data`.
    ///
    /// Returns the packet and the number of bytes it occupied. Partial body
    /// chunks are joined; the resulting packet records a definite length.
    pub fn parse(data: &[u8]) -> Result<(Self, usize)> {
        let raw = read_raw_packet(data)?;
        let packet_type =
            PacketType::from_byte(raw.tag).ok_or(PgpError::UnknownPacketTag(raw.tag))?;
        Ok((
            Self::with_format(packet_type, raw.body, raw.format),
            raw.consumed,
        ))
    }

    /// Parse a single packet from bytes, ignoring anything after it
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::parse(data).map(|(packet, _)| packet)
    }

    /// Decode the body as the typed packet `T`
    pub fn parse_body<T: PacketBody>(&self) -> Result<T> {
        if self.header.packet_type != T::TAG {
            return Err(PgpError::validation(format!(
                "Expected {:?} packet, found {:?}",
                T::TAG,
                self.header.packet_type
            )));
        }
        T::from_bytes(&self.body)
    }
}

/// Serialize a packet sequence into one contiguous byte stream
pub fn serialize_packets(packets: &[Packet]) -> Vec<u8> {
    let total = packets.iter().map(|p| p.body.len() + 6).sum();
    let mut bytes = Vec::with_capacity(total);
    for packet in packets {
        bytes.extend_from_slice(&packet.to_bytes());
    }
    bytes
}

/// Decode a byte stream into its packet sequence.
///
/// Packets with unknown tags, Marker packets and Trust packets are skipped;
/// every other failure is returned to the caller.
pub fn decode_packets(mut data: &[u8]) -> Result<Vec<Packet>> {
    let mut packets = Vec::new();

    while !data.is_empty() {
        let raw = read_raw_packet(data)?;
        data = &data[raw.consumed..];

        match PacketType::from_byte(raw.tag) {
            Some(packet_type @ (PacketType::Marker | PacketType::Trust)) => {
                warn!(packet_type = ?packet_type, len = raw.body.len(), "Skipping packet");
            }
            Some(packet_type) => {
                packets.push(Packet::with_format(packet_type, raw.body, raw.format));
                Validator::validate_packet_count(packets.len())?;
            }
            None => {
                let err = PgpError::UnknownPacketTag(raw.tag);
                warn!(tag = raw.tag, len = raw.body.len(), error = %err, "Skipping packet");
            }
        }
    }

    Ok(packets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_type_conversion() {
        assert_eq!(PacketType::PublicKey.to_byte(), 6);
        assert_eq!(PacketType::from_byte(6), Some(PacketType::PublicKey));
        assert_eq!(PacketType::from_byte(60), None);
    }

    #[test]
    fn test_packet_header_serialization() {
        let header = PacketHeader::new(PacketType::PublicKey, 100);
        let bytes = header.to_bytes();

        let (parsed_header, consumed) = PacketHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed_header, header);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_packet_header_length_encoding() {
        let tag = 0xC0 | PacketType::PublicKey.to_byte();
        let test_cases = vec![
            (50, vec![tag, 50]),
            (200, vec![tag, 192, 8]),
            (8383, vec![tag, 223, 255]),
            (10000, vec![tag, 255, 0, 0, 39, 16]),
        ];

        for (length, expected_bytes) in test_cases {
            let header = PacketHeader::new(PacketType::PublicKey, length);
            let bytes = header.to_bytes();
            assert_eq!(bytes, expected_bytes);

            let (parsed, _) = PacketHeader::from_bytes(&bytes).unwrap();
            assert_eq!(parsed.length, length);
        }
    }

    #[test]
    fn test_old_format_headers() {
        let cases = vec![
            (10, vec![0x80 | (6 << 2), 10]),
            (300, vec![0x80 | (6 << 2) | 1, 0x01, 0x2C]),
            (70000, vec![0x80 | (6 << 2) | 2, 0, 1, 0x11, 0x70]),
        ];
        for (length, expected) in cases {
            let header = PacketHeader::new_old_format(PacketType::PublicKey, length);
            assert_eq!(header.to_bytes(), expected);
            let (parsed, consumed) = PacketHeader::from_bytes(&expected).unwrap();
            assert_eq!(parsed, header);
            assert_eq!(consumed, expected.len());
        }
    }

    #[test]
    fn test_old_format_falls_back_for_high_tags() {
        let header = PacketHeader::new_old_format(PacketType::SymEncryptedIntegrityProtectedData, 5);
        assert_eq!(header.to_bytes(), vec![0xC0 | 18, 5]);
    }

    #[test]
    fn test_indeterminate_old_length() {
        let mut data = vec![0x80 | (11 << 2) | 3];
        data.extend_from_slice(b"rest of stream");
        let (packet, consumed) = Packet::parse(&data).unwrap();
        assert_eq!(packet.packet_type(), PacketType::LiteralData);
        assert_eq!(packet.body, b"rest of stream");
        assert_eq!(consumed, data.len());
    }

    #[test]
    fn test_partial_body_lengths() {
        // 2 byte partial chunk (0xE1), then 512 (0xE9), then definite 3
        let mut data = vec![0xC0 | 11, 0xE1, b'a', b'b', 0xE9];
        data.extend(std::iter::repeat(b'x').take(512));
        data.extend_from_slice(&[3, b'y', b'z', b'!']);

        let (packet, consumed) = Packet::parse(&data).unwrap();
        assert_eq!(consumed, data.len());
        assert_eq!(packet.body.len(), 2 + 512 + 3);
        assert_eq!(&packet.body[..2], b"ab");
        assert_eq!(&packet.body[packet.body.len() - 3..], b"yz!");
        assert_eq!(packet.header.length, packet.body.len());
    }

    #[test]
    fn test_packet_serialization() {
        let body = vec![1, 2, 3, 4, 5];
        let packet = Packet::new(PacketType::UserId, body.clone());
        let bytes = packet.to_bytes();

        let parsed_packet = Packet::from_bytes(&bytes).unwrap();
        assert_eq!(parsed_packet.header.packet_type, PacketType::UserId);
        assert_eq!(parsed_packet.body, body);
    }

    #[test]
    fn test_truncated_body() {
        let data = [0xC0 | 13, 10, b'a', b'b'];
        assert!(matches!(
            Packet::from_bytes(&data),
            Err(PgpError::TruncatedPacket(_))
        ));
        assert!(matches!(
            Packet::from_bytes(&[0xC0 | 13, 0xFF, 0]),
            Err(PgpError::TruncatedPacket(_))
        ));
    }

    #[test]
    fn test_unknown_tag_single_packet() {
        let data = [0xC0 | 60, 1, 0];
        assert_eq!(
            Packet::from_bytes(&data),
            Err(PgpError::UnknownPacketTag(60))
        );
    }

    #[test]
    fn test_stream_skips_unknown_and_marker() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&[0xC0 | 60, 2, 0xAA, 0xBB]);
        stream.extend_from_slice(&Packet::new(PacketType::Marker, b"PGP".to_vec()).to_bytes());
        stream.extend_from_slice(&Packet::new(PacketType::UserId, b"bob".to_vec()).to_bytes());

        let packets = decode_packets(&stream).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].body, b"bob");
    }

    #[test]
    fn test_stream_skips_trust() {
        assert_eq!(decode_packets(&[0xC0 | 12, 0x01, 0x00]).unwrap(), vec![]);

        let mut stream = Packet::new(PacketType::UserId, b"bob".to_vec()).to_bytes();
        let trust = Packet::with_format(PacketType::Trust, vec![0x3C, 0x00], HeaderFormat::Old);
        stream.extend_from_slice(&trust.to_bytes());
        let packets = decode_packets(&stream).unwrap();
        assert_eq!(packets, vec![Packet::new(PacketType::UserId, b"bob".to_vec())]);
    }

    #[test]
    fn test_stream_roundtrip_preserves_format() {
        let packets = vec![
            Packet::new(PacketType::UserId, b"alice".to_vec()),
            Packet::with_format(PacketType::LiteralData, vec![7; 300], HeaderFormat::Old),
            Packet::new(PacketType::Signature, vec![9; 9000]),
        ];
        let bytes = serialize_packets(&packets);
        assert_eq!(decode_packets(&bytes).unwrap(), packets);
    }

    #[test]
    fn test_invalid_first_byte() {
        assert!(decode_packets(&[0x00, 0x01]).is_err());
        assert!(PacketHeader::from_bytes(&[]).is_err());
    }
}
