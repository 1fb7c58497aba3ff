//! Input validation and size limits for untrusted OpenPGP data.
//!
//! Every parser in the crate reads fixed-width integers and slices through
//! [`Validator`], so a short buffer always surfaces as
//! [`PgpError::TruncatedPacket`] instead of a panic.

use crate::error::{PgpError, Result};

/// Maximum allowed plaintext message size (100MB)
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Maximum allowed size of a single packet body (110MB, plaintext plus overhead)
pub const MAX_PACKET_SIZE: usize = 110 * 1024 * 1024;

/// Maximum allowed armored input (base64 inflates by 4/3, plus line breaks)
pub const MAX_ARMOR_SIZE: usize = 160 * 1024 * 1024;

/// Maximum allowed User ID length (1KB)
pub const MAX_USER_ID_LENGTH: usize = 1024;

/// Maximum allowed number of packets in a single stream
pub const MAX_PACKETS_PER_MESSAGE: usize = 1000;

/// Maximum RSA modulus size accepted on import
pub const MAX_RSA_BITS: usize = 4096;

/// Validation functions for input data
pub struct Validator;

impl Validator {
    /// Validate plaintext message size
    pub fn validate_message_size(data: &[u8]) -> Result<()> {
        if data.len() > MAX_MESSAGE_SIZE {
            return Err(PgpError::validation(format!(
                "Message too large: {} bytes exceeds maximum of {} bytes",
                data.len(),
                MAX_MESSAGE_SIZE
            )));
        }
        Ok(())
    }

    /// Validate armored text size
    pub fn validate_armor_size(text: &str) -> Result<()> {
        if text.len() > MAX_ARMOR_SIZE {
            return Err(PgpError::validation(format!(
                "Armored input too large: {} bytes exceeds maximum of {} bytes",
                text.len(),
                MAX_ARMOR_SIZE
            )));
        }
        Ok(())
    }

    /// Validate packet size
    pub fn validate_packet_size(size: usize) -> Result<()> {
        if size > MAX_PACKET_SIZE {
            return Err(PgpError::validation(format!(
                "Packet too large: {} bytes exceeds maximum of {} bytes",
                size, MAX_PACKET_SIZE
            )));
        }
        Ok(())
    }

    /// Validate packet count in a stream
    pub fn validate_packet_count(count: usize) -> Result<()> {
        if count > MAX_PACKETS_PER_MESSAGE {
            return Err(PgpError::validation(format!(
                "Too many packets: {} exceeds maximum of {}",
                count, MAX_PACKETS_PER_MESSAGE
            )));
        }
        Ok(())
    }

    /// Validate User ID string
    pub fn validate_user_id(user_id: &str) -> Result<()> {
        if user_id.len() > MAX_USER_ID_LENGTH {
            return Err(PgpError::validation(format!(
                "User ID too long: {} bytes exceeds maximum of {} bytes",
                user_id.len(),
                MAX_USER_ID_LENGTH
            )));
        }

        if user_id.contains('\0') {
            return Err(PgpError::validation("User ID contains null bytes"));
        }

        if user_id.chars().any(|c| c.is_control() && c != '\t') {
            return Err(PgpError::validation(
                "User ID contains invalid control characters",
            ));
        }

        if user_id.trim().is_empty() {
            return Err(PgpError::validation("User ID cannot be empty"));
        }

        Ok(())
    }

    /// Read a big-endian u32 with bounds checking
    pub fn validate_u32_from_bytes(data: &[u8], offset: usize) -> Result<u32> {
        let bytes = Self::validate_slice_extraction(data, offset, 4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a big-endian u16 with bounds checking
    pub fn validate_u16_from_bytes(data: &[u8], offset: usize) -> Result<u16> {
        let bytes = Self::validate_slice_extraction(data, offset, 2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Read a single byte with bounds checking
    pub fn validate_u8_from_bytes(data: &[u8], offset: usize) -> Result<u8> {
        data.get(offset).copied().ok_or_else(|| {
            PgpError::truncated(format!(
                "Insufficient data for u8: need {} bytes, have {} bytes",
                offset + 1,
                data.len()
            ))
        })
    }

    /// Extract a slice with bounds checking
    pub fn validate_slice_extraction(data: &[u8], offset: usize, length: usize) -> Result<&[u8]> {
        let end = offset.checked_add(length).ok_or_else(|| {
            PgpError::truncated(format!("Length overflow at offset {}", offset))
        })?;
        data.get(offset..end).ok_or_else(|| {
            PgpError::truncated(format!(
                "Slice out of bounds: trying to extract {} bytes at offset {} from {} byte array",
                length,
                offset,
                data.len()
            ))
        })
    }

    /// Validate algorithm identifier is supported
    pub fn validate_algorithm_id(algorithm_id: u8, valid_algorithms: &[u8]) -> Result<()> {
        if !valid_algorithms.contains(&algorithm_id) {
            return Err(PgpError::validation(format!(
                "Unsupported algorithm ID: {}",
                algorithm_id
            )));
        }
        Ok(())
    }
}
