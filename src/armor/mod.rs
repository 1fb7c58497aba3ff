//! ASCII armor encoding and decoding for OpenPGP messages and keys.
//!
//! This module implements the ASCII armor format defined in RFC 4880 §6,
//! which allows binary OpenPGP data to be represented as printable text
//! for safe transmission through text-only channels like email.
//!
//! Decoding fails closed: a missing or wrong CRC-24 checksum, a broken
//! frame and invalid base64 each produce their own error kind.

use crate::error::{PgpError, Result};
use crate::packet::{decode_packets, serialize_packets, Packet};
use crate::validation::Validator;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::collections::BTreeMap;

pub mod cleartext;

/// CRC-24 polynomial used for armor checksums
const CRC24_POLY: u32 = 0x1864CFB;
const CRC24_INIT: u32 = 0xB704CE;

/// Base64 characters per body line
pub const LINE_LENGTH: usize = 76;

/// ASCII armor block types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArmorType {
    /// OpenPGP message (encrypted or signed data)
    Message,
    /// Cleartext signed message
    SignedMessage,
    /// Public key block
    PublicKey,
    /// Private key block
    PrivateKey,
    /// Detached signature block
    Signature,
    /// Multi-part message
    MultiPartMessage {
        /// One-based part number
        part: u32,
        /// Total number of parts, 0 if unknown
        total: u32,
    },
    /// Any other label
    Custom(String),
}

impl ArmorType {
    /// Get the armor header string for this type
    pub fn header_string(&self) -> String {
        match self {
            ArmorType::Message => "PGP MESSAGE".to_string(),
            ArmorType::SignedMessage => "PGP SIGNED MESSAGE".to_string(),
            ArmorType::PublicKey => "PGP PUBLIC KEY BLOCK".to_string(),
            ArmorType::PrivateKey => "PGP PRIVATE KEY BLOCK".to_string(),
            ArmorType::Signature => "PGP SIGNATURE".to_string(),
            ArmorType::MultiPartMessage { part, total } if *total > 0 => {
                format!("PGP MESSAGE, PART {}/{}", part, total)
            }
            ArmorType::MultiPartMessage { part, .. } => format!("PGP MESSAGE, PART {}", part),
            ArmorType::Custom(s) => s.clone(),
        }
    }

    /// Parse armor type from header string
    pub fn from_header_string(header: &str) -> Result<Self> {
        match header {
            "PGP MESSAGE" => Ok(ArmorType::Message),
            "PGP SIGNED MESSAGE" => Ok(ArmorType::SignedMessage),
            "PGP PUBLIC KEY BLOCK" => Ok(ArmorType::PublicKey),
            "PGP PRIVATE KEY BLOCK" => Ok(ArmorType::PrivateKey),
            "PGP SIGNATURE" => Ok(ArmorType::Signature),
            s => match s.strip_prefix("PGP MESSAGE, PART ") {
                Some(part_info) => {
                    let parse = |n: &str| {
                        n.parse::<u32>().map_err(|_| {
                            PgpError::malformed_armor(format!("Invalid part number in '{}'", s))
                        })
                    };
                    match part_info.split_once('/') {
                        Some((part, total)) => Ok(ArmorType::MultiPartMessage {
                            part: parse(part)?,
                            total: parse(total)?,
                        }),
                        None => Ok(ArmorType::MultiPartMessage {
                            part: parse(part_info)?,
                            total: 0,
                        }),
                    }
                }
                None if s.is_empty() => Err(PgpError::malformed_armor("Empty armor label")),
                None => Ok(ArmorType::Custom(s.to_string())),
            },
        }
    }
}

/// Optional armor headers written by encoding operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmorOptions {
    /// `Version:` header
    pub version: Option<String>,
    /// `Comment:` header
    pub comment: Option<String>,
}

impl Default for ArmorOptions {
    fn default() -> Self {
        Self {
            version: Some(format!("pgp-engine {}", crate::VERSION)),
            comment: None,
        }
    }
}

impl ArmorOptions {
    /// Options that emit no headers at all
    pub fn bare() -> Self {
        Self {
            version: None,
            comment: None,
        }
    }

    /// Set the comment header
    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    /// The header map these options produce
    pub fn headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        if let Some(version) = &self.version {
            headers.insert("Version".to_string(), version.clone());
        }
        if let Some(comment) = &self.comment {
            headers.insert("Comment".to_string(), comment.clone());
        }
        headers
    }
}

/// A decoded armor block: label, headers and binary body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmorBlock {
    /// The type of armored data
    pub armor_type: ArmorType,
    /// Armor headers (key-value pairs)
    pub headers: BTreeMap<String, String>,
    /// The decoded binary data
    pub data: Vec<u8>,
}

impl ArmorBlock {
    /// Create a block without headers
    pub fn new(armor_type: ArmorType, data: Vec<u8>) -> Self {
        Self {
            armor_type,
            headers: BTreeMap::new(),
            data,
        }
    }

    /// Create a block carrying the given packets
    pub fn from_packets(armor_type: ArmorType, packets: &[Packet], options: &ArmorOptions) -> Self {
        Self {
            armor_type,
            headers: options.headers(),
            data: serialize_packets(packets),
        }
    }

    /// Add a header to the block
    pub fn add_header(&mut self, key: &str, value: &str) {
        self.headers.insert(key.to_string(), value.to_string());
    }

    /// Get a header value
    pub fn get_header(&self, key: &str) -> Option<&String> {
        self.headers.get(key)
    }

    /// Decode the body as a packet stream
    pub fn packets(&self) -> Result<Vec<Packet>> {
        decode_packets(&self.data)
    }

    /// Decode the body, insisting on the given block type
    pub fn expect_packets(&self, armor_type: &ArmorType) -> Result<Vec<Packet>> {
        if &self.armor_type != armor_type {
            return Err(PgpError::malformed_armor(format!(
                "Expected {}, found {}",
                armor_type.header_string(),
                self.armor_type.header_string()
            )));
        }
        self.packets()
    }

    /// Render the block as armored text
    pub fn to_armored(&self) -> String {
        encode_with_headers(&self.data, &self.armor_type, &self.headers)
    }
}

/// Calculate the CRC-24 checksum used in armor
pub fn crc24(data: &[u8]) -> u32 {
    let mut crc = CRC24_INIT;

    for &byte in data {
        crc ^= (byte as u32) << 16;
        for _ in 0..8 {
            crc <<= 1;
            if (crc & 0x1000000) != 0 {
                crc ^= CRC24_POLY;
            }
        }
    }

    crc & 0xFFFFFF
}

/// Encode binary data as ASCII armored text
pub fn encode(data: &[u8], armor_type: &ArmorType) -> String {
    encode_with_headers(data, armor_type, &BTreeMap::new())
}

/// Encode a packet sequence as ASCII armored text
pub fn encode_packets(packets: &[Packet], armor_type: &ArmorType, options: &ArmorOptions) -> String {
    ArmorBlock::from_packets(armor_type.clone(), packets, options).to_armored()
}

/// Encode binary data as ASCII armored text with custom headers
pub fn encode_with_headers(
    data: &[u8],
    armor_type: &ArmorType,
    headers: &BTreeMap<String, String>,
) -> String {
    let header_string = armor_type.header_string();
    let body = STANDARD.encode(data);
    let mut output = String::with_capacity(body.len() + body.len() / LINE_LENGTH + 128);

    output.push_str(&format!("-----BEGIN {}-----\n", header_string));
    for (key, value) in headers {
        output.push_str(&format!("{}: {}\n", key, value));
    }
    output.push('\n');

    // base64 output is ASCII, so byte offsets are char boundaries
    let mut start = 0;
    while start < body.len() {
        let end = (start + LINE_LENGTH).min(body.len());
        output.push_str(&body[start..end]);
        output.push('\n');
        start = end;
    }

    let checksum = crc24(data).to_be_bytes();
    output.push('=');
    output.push_str(&STANDARD.encode(&checksum[1..]));
    output.push('\n');

    output.push_str(&format!("-----END {}-----\n", header_string));
    output
}

/// Check if a line contains only base64 alphabet characters
fn is_base64_line(line: &str) -> bool {
    !line.is_empty()
        && line
            .bytes()
            .all(|c| c.is_ascii_alphanumeric() || c == b'+' || c == b'/' || c == b'=')
}

fn decode_base64(data: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(data)
        .map_err(|e| PgpError::InvalidBase64(e.to_string()))
}

/// Decode the first armor block found in `armored_text`.
///
/// Text before the `-----BEGIN` line is ignored.
pub fn decode(armored_text: &str) -> Result<ArmorBlock> {
    Validator::validate_armor_size(armored_text)?;
    let mut lines = armored_text.lines().map(str::trim_end);

    let armor_type = loop {
        let line = lines
            .next()
            .ok_or_else(|| PgpError::malformed_armor("No armor header found"))?;
        if let Some(label) = line
            .trim_start()
            .strip_prefix("-----BEGIN ")
            .and_then(|rest| rest.strip_suffix("-----"))
        {
            break ArmorType::from_header_string(label)?;
        }
    };

    // Header lines, terminated by a blank line. A base64 line here means the
    // producer omitted the blank separator.
    let mut headers = BTreeMap::new();
    let mut body = String::new();
    loop {
        let line = lines
            .next()
            .ok_or_else(|| PgpError::malformed_armor("Unexpected end of input in headers"))?;
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(": ") {
            headers.insert(key.to_string(), value.to_string());
        } else if let Some(key) = line.strip_suffix(':') {
            headers.insert(key.to_string(), String::new());
        } else if is_base64_line(line) {
            body.push_str(line.trim());
            break;
        } else {
            return Err(PgpError::malformed_armor(format!(
                "Invalid armor header line '{}'",
                line
            )));
        }
    }

    let end_line = format!("-----END {}-----", armor_type.header_string());
    let mut checksum_text: Option<String> = None;
    loop {
        let line = lines
            .next()
            .ok_or_else(|| PgpError::malformed_armor("Missing armor end line"))?
            .trim_start();

        if line.starts_with("-----") {
            if line != end_line {
                return Err(PgpError::malformed_armor(format!(
                    "End line mismatch: expected '{}', got '{}'",
                    end_line, line
                )));
            }
            break;
        }
        if checksum_text.is_some() {
            return Err(PgpError::malformed_armor("Data after armor checksum"));
        }
        if let Some(checksum) = line.strip_prefix('=') {
            checksum_text = Some(checksum.to_string());
        } else if !line.is_empty() {
            body.push_str(line);
        }
    }

    let checksum_text =
        checksum_text.ok_or_else(|| PgpError::malformed_armor("Missing armor checksum"))?;
    let data = decode_base64(&body)?;

    let checksum_bytes = decode_base64(&checksum_text)?;
    if checksum_bytes.len() != 3 {
        return Err(PgpError::malformed_armor("Armor checksum must be 3 bytes"));
    }
    let expected = u32::from_be_bytes([0, checksum_bytes[0], checksum_bytes[1], checksum_bytes[2]]);
    let actual = crc24(&data);
    if actual != expected {
        return Err(PgpError::ChecksumMismatch { expected, actual });
    }

    Ok(ArmorBlock {
        armor_type,
        headers,
        data,
    })
}

/// Decode armored text straight to its packet sequence
pub fn decode_packets_from_armor(armored_text: &str) -> Result<(ArmorType, Vec<Packet>)> {
    let block = decode(armored_text)?;
    let packets = block.packets()?;
    Ok((block.armor_type, packets))
}
