//! Cleartext Signature Framework (RFC 4880 §7).
//!
//! A cleartext signed message keeps the text readable and appends an armored
//! signature. Lines starting with a dash are escaped with `- `. The signed
//! bytes are the text with trailing whitespace removed from every line and
//! `CR LF` line endings; see [`signed_text`].

use super::{decode, encode_packets, ArmorBlock, ArmorOptions, ArmorType};
use crate::crypto::HashAlgorithm;
use crate::error::{PgpError, Result};
use crate::packet::Packet;
use crate::validation::Validator;

const BEGIN_SIGNED: &str = "-----BEGIN PGP SIGNED MESSAGE-----";
const BEGIN_SIGNATURE: &str = "-----BEGIN PGP SIGNATURE-----";

/// A parsed cleartext signed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleartextMessage {
    /// Digests announced in `Hash:` headers
    pub hashes: Vec<HashAlgorithm>,
    /// The message text with dash-escaping removed
    pub text: String,
    /// The trailing signature block
    pub signature: ArmorBlock,
}

/// The bytes a cleartext signature covers
pub fn signed_text(text: &str) -> Vec<u8> {
    let lines: Vec<&str> = text
        .split('\n')
        .map(|line| line.trim_end_matches(['\r', ' ', '\t']))
        .collect();
    lines.join("\r\n").into_bytes()
}

fn dash_escape(line: &str) -> String {
    if line.starts_with('-') {
        format!("- {}", line)
    } else {
        line.to_string()
    }
}

/// Build a cleartext signed message from its text and signature packets
pub fn encode(
    text: &str,
    hashes: &[HashAlgorithm],
    signature: &[Packet],
    options: &ArmorOptions,
) -> String {
    let mut output = String::with_capacity(text.len() + 1024);
    output.push_str(BEGIN_SIGNED);
    output.push('\n');
    if !hashes.is_empty() {
        let names: Vec<&str> = hashes.iter().map(HashAlgorithm::armor_name).collect();
        output.push_str(&format!("Hash: {}\n", names.join(",")));
    }
    output.push('\n');

    for line in text.split('\n') {
        output.push_str(&dash_escape(line.trim_end_matches('\r')));
        output.push('\n');
    }

    output.push_str(&encode_packets(signature, &ArmorType::Signature, options));
    output
}

/// Parse a cleartext signed message.
///
/// Fails with `MalformedArmor` when the frame is broken and with the usual
/// armor errors when the signature block is corrupt.
pub fn decode_message(armored: &str) -> Result<CleartextMessage> {
    Validator::validate_armor_size(armored)?;
    let mut lines = armored.lines();

    loop {
        let line = lines
            .next()
            .ok_or_else(|| PgpError::malformed_armor("No signed message header found"))?;
        if line.trim() == BEGIN_SIGNED {
            break;
        }
    }

    let mut hashes = Vec::new();
    loop {
        let line = lines
            .next()
            .ok_or_else(|| PgpError::malformed_armor("Unexpected end of input in headers"))?
            .trim_end();
        if line.is_empty() {
            break;
        }
        let value = line.strip_prefix("Hash: ").ok_or_else(|| {
            PgpError::malformed_armor(format!("Unexpected cleartext header '{}'", line))
        })?;
        for name in value.split(',') {
            hashes.push(HashAlgorithm::from_armor_name(name)?);
        }
    }

    let mut text_lines = Vec::new();
    let mut signature_lines = Vec::new();
    for line in lines.by_ref() {
        if line.trim_end() == BEGIN_SIGNATURE {
            signature_lines.push(line);
            break;
        }
        let unescaped = match line.strip_prefix("- ") {
            Some(rest) => rest,
            None if line.starts_with('-') => {
                return Err(PgpError::malformed_armor(format!(
                    "Unescaped dash line '{}' in cleartext",
                    line
                )))
            }
            None => line,
        };
        text_lines.push(unescaped);
    }
    if signature_lines.is_empty() {
        return Err(PgpError::malformed_armor("Missing signature block"));
    }
    signature_lines.extend(lines);

    let signature = decode(&signature_lines.join("\n"))?;
    if signature.armor_type != ArmorType::Signature {
        return Err(PgpError::malformed_armor("Cleartext is not followed by a signature"));
    }

    Ok(CleartextMessage {
        hashes,
        text: text_lines.join("\n"),
        signature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketType;

    fn dummy_signature() -> Vec<Packet> {
        vec![Packet::new(PacketType::Signature, vec![4, 1, 1, 8])]
    }

    #[test]
    fn test_signed_text_canonicalization() {
        assert_eq!(signed_text("a  \nb\t\r\nc"), b"a\r\nb\r\nc");
        assert_eq!(signed_text("hello\n"), b"hello\r\n");
        assert_eq!(signed_text(""), b"");
    }

    #[test]
    fn test_cleartext_roundtrip() {
        let text = "Dear Bob,\n- not a list\n-----BEGIN fake-----\nregards\n";
        let armored = encode(
            text,
            &[HashAlgorithm::Sha256],
            &dummy_signature(),
            &ArmorOptions::bare(),
        );
        assert!(armored.starts_with("-----BEGIN PGP SIGNED MESSAGE-----\nHash: SHA256\n\n"));
        assert!(armored.contains("\n- - not a list\n"));
        assert!(armored.contains("\n- -----BEGIN fake-----\n"));

        let parsed = decode_message(&armored).unwrap();
        assert_eq!(parsed.text, text);
        assert_eq!(parsed.hashes, vec![HashAlgorithm::Sha256]);
        assert_eq!(parsed.signature.packets().unwrap(), dummy_signature());
    }

    #[test]
    fn test_multiple_hash_headers() {
        let armored = encode(
            "x",
            &[HashAlgorithm::Sha256, HashAlgorithm::Sha512],
            &dummy_signature(),
            &ArmorOptions::bare(),
        );
        assert!(armored.contains("Hash: SHA256,SHA512\n"));
        let parsed = decode_message(&armored).unwrap();
        assert_eq!(parsed.hashes.len(), 2);
    }

    #[test]
    fn test_missing_signature_block() {
        let armored = "-----BEGIN PGP SIGNED MESSAGE-----\nHash: SHA256\n\nhello\n";
        assert!(matches!(
            decode_message(armored),
            Err(PgpError::MalformedArmor(_))
        ));
    }

    #[test]
    fn test_bad_cleartext_header() {
        let armored = encode("x", &[], &dummy_signature(), &ArmorOptions::bare())
            .replacen("\n\n", "\nCharset: UTF-8\n\n", 1);
        assert!(matches!(
            decode_message(&armored),
            Err(PgpError::MalformedArmor(_))
        ));
    }

    #[test]
    fn test_corrupted_signature_block() {
        let armored = encode("x", &[HashAlgorithm::Sha256], &dummy_signature(), &ArmorOptions::bare());
        let pos = armored.rfind("\n=").unwrap();
        let mut corrupted = armored.clone();
        corrupted.replace_range(pos + 2..pos + 3, if &armored[pos + 2..pos + 3] == "A" { "B" } else { "A" });
        assert!(matches!(
            decode_message(&corrupted),
            Err(PgpError::ChecksumMismatch { .. })
        ));
    }
}
