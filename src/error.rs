//! Error types for OpenPGP engine operations.
//!
//! Integrity failures (armor checksum, MDC, signatures) each have their own
//! variant so callers can tell corrupted input apart from a wrong key or a
//! missing signature.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, PgpError>;

/// Main error type for engine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PgpError {
    /// The requested public-key algorithm is not supported
    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),

    /// A hash or symmetric algorithm id this engine does not implement
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Key parameters are below the safety floor
    #[error("Weak key parameters: {0}")]
    WeakKeyParameters(String),

    /// The random source could not produce entropy
    #[error("Entropy unavailable: {0}")]
    EntropyUnavailable(String),

    /// The passphrase did not unlock the private key
    #[error("Wrong passphrase")]
    WrongPassphrase,

    /// The operation needs an unlocked private key
    #[error("Private key is locked")]
    KeyLocked,

    /// Armor framing is broken (header, footer or header lines)
    #[error("Malformed armor: {0}")]
    MalformedArmor(String),

    /// The armor CRC-24 does not match the body
    #[error("Armor checksum mismatch: expected {expected:06X}, got {actual:06X}")]
    ChecksumMismatch {
        /// Checksum declared in the armor
        expected: u32,
        /// Checksum recomputed over the decoded body
        actual: u32,
    },

    /// The armor body is not valid base64
    #[error("Invalid base64: {0}")]
    InvalidBase64(String),

    /// A packet ended before its declared length
    #[error("Truncated packet: {0}")]
    TruncatedPacket(String),

    /// A packet carries a tag this engine does not understand
    #[error("Unknown packet tag: {0}")]
    UnknownPacketTag(u8),

    /// Modification detection or a related integrity check failed
    #[error("Integrity check failed: {0}")]
    IntegrityCheckFailed(String),

    /// Encryption was requested without any recipient
    #[error("No recipients given")]
    NoRecipients,

    /// A public key failed structural validation
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// No session key packet targets the supplied private key
    #[error("No session key packet matches the private key")]
    NoMatchingKey,

    /// No supplied public key verifies the signature
    #[error("No valid signature")]
    NoValidSignature,

    /// The signature could not be produced
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// Other cryptographic failures
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Invalid input or arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Input validation errors (size limits, malformed fields)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Option parsing errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PgpError {
    /// Creates a new cryptographic error.
    pub fn crypto<T: ToString>(msg: T) -> Self {
        Self::Crypto(msg.to_string())
    }

    /// Creates a new unsupported algorithm error.
    pub fn unsupported_algorithm<T: ToString>(msg: T) -> Self {
        Self::UnsupportedAlgorithm(msg.to_string())
    }

    /// Creates a new invalid input error.
    pub fn invalid_input<T: ToString>(msg: T) -> Self {
        Self::InvalidInput(msg.to_string())
    }

    /// Creates a new validation error.
    pub fn validation<T: ToString>(msg: T) -> Self {
        Self::Validation(msg.to_string())
    }

    /// Creates a new serialization error.
    pub fn serialization<T: ToString>(msg: T) -> Self {
        Self::Serialization(msg.to_string())
    }

    /// Creates a new malformed armor error.
    pub fn malformed_armor<T: ToString>(msg: T) -> Self {
        Self::MalformedArmor(msg.to_string())
    }

    /// Creates a new truncated packet error.
    pub fn truncated<T: ToString>(msg: T) -> Self {
        Self::TruncatedPacket(msg.to_string())
    }

    /// Creates a new integrity error.
    pub fn integrity<T: ToString>(msg: T) -> Self {
        Self::IntegrityCheckFailed(msg.to_string())
    }

    /// Creates a new invalid public key error.
    pub fn invalid_public_key<T: ToString>(msg: T) -> Self {
        Self::InvalidPublicKey(msg.to_string())
    }

    /// Creates a new signing error.
    pub fn signing<T: ToString>(msg: T) -> Self {
        Self::SigningFailed(msg.to_string())
    }

    /// Returns true when the failure can be handled locally by skipping
    /// the offending item instead of aborting the operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::UnknownPacketTag(_))
    }
}

impl From<serde_json::Error> for PgpError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
