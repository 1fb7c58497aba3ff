//! Multiprecision integers (RFC 4880 §3.2).
//!
//! An MPI is a two-octet bit count followed by the big-endian magnitude.
//! The declared bit count is kept verbatim so that a parsed value
//! re-encodes to exactly the bytes it came from.

use crate::error::{PgpError, Result};
use crate::validation::Validator;
use rsa::BigUint;
use std::fmt;
use zeroize::Zeroize;

/// A multiprecision integer as stored in packets
#[derive(Clone, PartialEq, Eq, Zeroize)]
pub struct Mpi {
    /// Declared bit length
    bits: u16,
    /// Big-endian magnitude, `ceil(bits / 8)` bytes long
    value: Vec<u8>,
}

impl fmt::Debug for Mpi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mpi").field("bits", &self.bits).finish()
    }
}

fn bit_length(bytes: &[u8]) -> usize {
    match bytes.first() {
        None => 0,
        Some(&first) => (bytes.len() - 1) * 8 + (8 - first.leading_zeros() as usize),
    }
}

impl Mpi {
    /// Creates a canonical MPI from big-endian bytes, stripping leading zeros.
    pub fn from_slice(bytes: &[u8]) -> Self {
        let offset = bytes.iter().take_while(|&&b| b == 0).count();
        let value = bytes[offset..].to_vec();
        let bits = bit_length(&value) as u16;
        Self { bits, value }
    }

    /// Creates a canonical MPI from a big integer
    pub fn from_biguint(n: &BigUint) -> Self {
        let mut bytes = n.to_bytes_be();
        let mpi = Self::from_slice(&bytes);
        bytes.zeroize();
        mpi
    }

    /// Converts the magnitude into a big integer
    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_be(&self.value)
    }

    /// Declared bit length
    pub fn bits(&self) -> u16 {
        self.bits
    }

    /// Big-endian magnitude bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.value
    }

    /// Magnitude left-padded with zeros to `len` bytes.
    ///
    /// Values longer than `len` are returned unchanged.
    pub fn to_padded(&self, len: usize) -> Vec<u8> {
        let significant = &self.value[self.value.iter().take_while(|&&b| b == 0).count()..];
        if significant.len() >= len {
            return significant.to_vec();
        }
        let mut out = vec![0u8; len - significant.len()];
        out.extend_from_slice(significant);
        out
    }

    /// Number of bytes this MPI occupies on the wire
    pub fn encoded_len(&self) -> usize {
        2 + self.value.len()
    }

    /// Append the wire encoding to `out`
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.bits.to_be_bytes());
        out.extend_from_slice(&self.value);
    }

    /// Wire encoding
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.write_to(&mut out);
        out
    }

    /// Parse an MPI at `offset`, returning it and the bytes consumed
    pub fn parse(data: &[u8], offset: usize) -> Result<(Self, usize)> {
        let bits = Validator::validate_u16_from_bytes(data, offset)?;
        let byte_len = (bits as usize).div_ceil(8);
        let value = Validator::validate_slice_extraction(data, offset + 2, byte_len)
            .map_err(|_| {
                PgpError::truncated(format!(
                    "MPI declares {} bits but only {} bytes remain",
                    bits,
                    data.len().saturating_sub(offset + 2)
                ))
            })?
            .to_vec();

        if bit_length(&value) > bits as usize {
            return Err(PgpError::validation(format!(
                "MPI value exceeds its declared {} bits",
                bits
            )));
        }

        Ok((Self { bits, value }, 2 + byte_len))
    }
}

/// Sequential reader over a packet body, used by the typed parsers.
pub(crate) struct BodyReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> BodyReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn remaining(&self) -> &'a [u8] {
        &self.data[self.offset..]
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.offset >= self.data.len()
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        let v = Validator::validate_u8_from_bytes(self.data, self.offset)?;
        self.offset += 1;
        Ok(v)
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        let v = Validator::validate_u16_from_bytes(self.data, self.offset)?;
        self.offset += 2;
        Ok(v)
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        let v = Validator::validate_u32_from_bytes(self.data, self.offset)?;
        self.offset += 4;
        Ok(v)
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let v = Validator::validate_slice_extraction(self.data, self.offset, len)?;
        self.offset += len;
        Ok(v)
    }

    pub(crate) fn mpi(&mut self) -> Result<Mpi> {
        let (mpi, consumed) = Mpi::parse(self.data, self.offset)?;
        self.offset += consumed;
        Ok(mpi)
    }

    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.offset.min(self.data.len())..];
        self.offset = self.data.len();
        rest
    }
}
