//! # pgp-engine - OpenPGP message engine
//!
//! An implementation of the RFC 4880 (v4) OpenPGP profile in Rust: RSA key
//! generation, multi-recipient encryption, signing, decryption, verification
//! and ASCII armor. Every operation is a synchronous function over explicit
//! inputs; there is no global state.
//!
//! ## Features
//!
//! - **Keys**: RSA 1024-4096 primary key with a User ID, a verified
//!   self-signature and a bound RSA encryption subkey, optionally protected
//!   with an iterated and salted S2K passphrase
//! - **Encryption**: one AES-256 session key per message, wrapped to the
//!   encryption subkey of every recipient, payload protected by a
//!   Modification Detection Code
//! - **Signatures**: v4 RSA signatures over SHA-256, inline, detached or in
//!   the cleartext signature framework
//! - **Armor**: strict decoding that fails closed on bad checksums and base64
//!
//! ## Cryptographic Algorithms
//!
//! - **Public key**: RSA (PKCS#1 v1.5 encryption and signatures)
//! - **Symmetric Encryption**: AES-256 in OpenPGP CFB mode with MDC
//! - **Hashing**: SHA-256 by default; SHA-1 for fingerprints and the MDC
//!
//! ## Examples
//!
//! ### Key Generation
//!
//! ```rust,no_run
//! use pgp_engine::crypto::{generate_keypair, KeyGenOptions};
//! use rand::rngs::OsRng;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let options = KeyGenOptions::rsa(2048, "alice@example.com");
//! let keypair = generate_keypair(&options, &mut OsRng)?;
//! println!("{} with fingerprint {}", keypair, keypair.fingerprint());
//! # Ok(())
//! # }
//! ```
//!
//! ### Encryption and Decryption
//!
//! ```rust,no_run
//! use pgp_engine::crypto::{generate_keypair, KeyGenOptions};
//! use pgp_engine::message::{decrypt, encrypt};
//! use rand::rngs::OsRng;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let keypair = generate_keypair(&KeyGenOptions::rsa(2048, "bob@example.com"), &mut OsRng)?;
//! let armored = encrypt(b"hello", &[keypair.public_key().clone()], &mut OsRng)?;
//! let plaintext = decrypt(&armored, keypair.private_key(), &mut OsRng)?;
//! assert_eq!(plaintext, b"hello");
//! # Ok(())
//! # }
//! ```

pub mod armor;
pub mod crypto;
pub mod error;
pub mod message;
pub mod packet;
pub mod validation;

pub use crypto::{
    generate_keypair, Fingerprint, KeyGenOptions, KeyId, KeyPair, KeyType, Password, PrivateKey,
    PublicKey,
};
pub use error::{PgpError, Result};
pub use message::{
    decrypt, decrypt_and_verify, encrypt, sign, sign_and_encrypt, sign_cleartext, sign_detached,
    verify, verify_cleartext, verify_detached, VerifiedMessage,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// OpenPGP key and signature packet version produced
pub const PGP_VERSION: u8 = 4;
