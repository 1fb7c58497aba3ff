//! RSA key generation and management.
//!
//! A key is one RSA primary key (algorithm 1) for certifying and signing,
//! one User ID with a positive certification self-signature, and RSA
//! encryption subkeys bound to the primary by subkey binding signatures.
//! Fingerprints and key ids are always derived from the key packets and
//! never stored on their own.

use rand::{CryptoRng, RngCore};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use zeroize::Zeroize;

use crate::armor::{decode, ArmorBlock, ArmorOptions, ArmorType};
use crate::crypto::password::{protect, unprotect};
use crate::crypto::signature::{
    certification_hasher, subkey_binding_hasher, verify_with_hasher, SignatureBuilder,
};
use crate::crypto::{
    current_timestamp, secure_random_bytes, Fingerprint, KeyId, Password, ProtectionParams,
    PublicKeyAlgorithm,
};
use crate::error::{PgpError, Result};
use crate::packet::{
    key_flags, Mpi, Packet, PacketBody, PacketType, PublicKeyPacket, SecretKeyMaterial,
    SecretKeyPacket, SecretParams, SignaturePacket, SignatureType, Subpacket, UserIdPacket,
};
use crate::validation::MAX_RSA_BITS;

/// RSA modulus sizes accepted for new keys
pub const ALLOWED_KEY_SIZES: [usize; 4] = [1024, 2048, 3072, 4096];

/// Smallest modulus accepted anywhere
pub const MIN_RSA_BITS: usize = 1024;

/// Default modulus size for new keys
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Key algorithms that can be generated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "KeyTypeRepr", into = "String")]
pub enum KeyType {
    /// RSA, usable for both encryption and signing
    #[default]
    Rsa,
}

/// Accepted spellings of `keyType`: a name or an OpenPGP algorithm id
#[derive(Deserialize)]
#[serde(untagged)]
enum KeyTypeRepr {
    Name(String),
    Id(u64),
}

impl KeyType {
    /// Parse a key type name, case-insensitively
    pub fn from_name(name: &str) -> Result<Self> {
        if name.eq_ignore_ascii_case("rsa") {
            Ok(KeyType::Rsa)
        } else {
            Err(PgpError::UnsupportedKeyType(name.to_string()))
        }
    }

    /// Parse an OpenPGP public key algorithm id
    pub fn from_id(id: u64) -> Result<Self> {
        match id {
            1 => Ok(KeyType::Rsa),
            other => Err(PgpError::UnsupportedKeyType(format!("algorithm {}", other))),
        }
    }

    /// Canonical name, as used in the options map
    pub fn name(&self) -> &'static str {
        match self {
            KeyType::Rsa => "RSA",
        }
    }

    /// Algorithm written into generated key packets
    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        match self {
            KeyType::Rsa => PublicKeyAlgorithm::RsaEncryptSign,
        }
    }
}

impl TryFrom<KeyTypeRepr> for KeyType {
    type Error = PgpError;

    fn try_from(repr: KeyTypeRepr) -> Result<Self> {
        match repr {
            KeyTypeRepr::Name(name) => KeyType::from_name(&name),
            KeyTypeRepr::Id(id) => KeyType::from_id(id),
        }
    }
}

impl From<KeyType> for String {
    fn from(key_type: KeyType) -> Self {
        key_type.name().to_string()
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn default_num_bits() -> usize {
    DEFAULT_KEY_BITS
}

/// Options for [`generate_keypair`].
///
/// Deserializes from the camelCase option map
/// `{"keyType": "RSA", "numBits": 2048, "userId": "...", "unlocked": true}`.
/// With `unlocked: false` (the default) a `passphrase` is required and the
/// private key is returned locked.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyGenOptions {
    /// Key algorithm
    #[serde(default)]
    pub key_type: KeyType,
    /// RSA modulus size in bits
    #[serde(default = "default_num_bits")]
    pub num_bits: usize,
    /// User ID bound to the key
    pub user_id: String,
    /// Leave the private key without passphrase protection
    #[serde(default)]
    pub unlocked: bool,
    /// Passphrase protecting the private key
    #[serde(default, skip_serializing)]
    pub passphrase: Option<String>,
    /// S2K settings used when locking
    #[serde(default)]
    pub protection: ProtectionParams,
}

impl fmt::Debug for KeyGenOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyGenOptions")
            .field("key_type", &self.key_type)
            .field("num_bits", &self.num_bits)
            .field("user_id", &self.user_id)
            .field("unlocked", &self.unlocked)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .field("protection", &self.protection)
            .finish()
    }
}

impl Drop for KeyGenOptions {
    fn drop(&mut self) {
        self.passphrase.zeroize();
    }
}

impl KeyGenOptions {
    /// Options for an unprotected RSA key
    pub fn rsa(num_bits: usize, user_id: &str) -> Self {
        Self {
            key_type: KeyType::Rsa,
            num_bits,
            user_id: user_id.to_string(),
            unlocked: true,
            passphrase: None,
            protection: ProtectionParams::default(),
        }
    }

    /// Protect the generated private key with `passphrase`
    pub fn with_passphrase(mut self, passphrase: &str) -> Self {
        self.unlocked = false;
        self.passphrase = Some(passphrase.to_string());
        self
    }

    /// Override the S2K settings
    pub fn with_protection(mut self, protection: ProtectionParams) -> Self {
        self.protection = protection;
        self
    }

    /// Parse the JSON option map.
    ///
    /// An unknown `keyType` fails with `UnsupportedKeyType` rather than a
    /// generic serialization error.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if let Some(key_type) = value.get("keyType") {
            KeyType::try_from(KeyTypeRepr::deserialize(key_type)?)?;
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Check size, user id and passphrase rules
    pub fn validate(&self) -> Result<()> {
        let bits = self.num_bits;
        if bits < MIN_RSA_BITS {
            return Err(PgpError::WeakKeyParameters(format!(
                "{}-bit RSA is below the {}-bit minimum",
                bits, MIN_RSA_BITS
            )));
        }
        if !ALLOWED_KEY_SIZES.contains(&bits) {
            return if ALLOWED_KEY_SIZES.iter().any(|&size| bits < size) {
                Err(PgpError::WeakKeyParameters(format!(
                    "{}-bit RSA is not a supported size",
                    bits
                )))
            } else {
                Err(PgpError::invalid_input(format!(
                    "{}-bit RSA exceeds the {}-bit maximum",
                    bits, MAX_RSA_BITS
                )))
            };
        }

        UserIdPacket::new(&self.user_id)?;

        match (self.unlocked, &self.passphrase) {
            (true, Some(_)) => Err(PgpError::invalid_input(
                "A passphrase cannot be combined with unlocked: true",
            )),
            (false, None) => Err(PgpError::invalid_input(
                "A passphrase is required unless unlocked is set",
            )),
            (false, Some(passphrase)) if passphrase.is_empty() => {
                Err(PgpError::invalid_input("Passphrase cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// Generate a new RSA keypair.
///
/// Key generation is CPU bound and may take seconds for 4096-bit keys.
pub fn generate_keypair<R: CryptoRng + RngCore>(
    options: &KeyGenOptions,
    rng: &mut R,
) -> Result<KeyPair> {
    options.validate()?;
    secure_random_bytes(rng, 32)?;

    info!(
        key_type = %options.key_type,
        bits = options.num_bits,
        user_id = %options.user_id,
        "Generating keypair"
    );

    let rsa = RsaPrivateKey::new(rng, options.num_bits)
        .map_err(|e| PgpError::crypto(format!("RSA key generation failed: {}", e)))?;
    let subkey_rsa = RsaPrivateKey::new(rng, options.num_bits)
        .map_err(|e| PgpError::crypto(format!("RSA subkey generation failed: {}", e)))?;

    let created = current_timestamp();
    let algorithm = options.key_type.algorithm();
    let packet = key_packet(&rsa, algorithm, created);
    let subkey_packet = key_packet(&subkey_rsa, algorithm, created);
    let user_id = UserIdPacket::new(&options.user_id)?;

    let builder = SignatureBuilder::new(SignatureType::PositiveCertification)
        .created(created)
        .subpacket(Subpacket::KeyFlags(key_flags::CERTIFY | key_flags::SIGN))
        .subpacket(Subpacket::PreferredSymmetric(vec![9]))
        .subpacket(Subpacket::PreferredHash(vec![8, 10, 9]));
    let hasher = certification_hasher(builder.hash(), &packet, &user_id);
    let self_signature =
        builder.sign_raw(&rsa, packet.algorithm, packet.fingerprint(), hasher, rng)?;

    let binder = SignatureBuilder::new(SignatureType::SubkeyBinding)
        .created(created)
        .subpacket(Subpacket::KeyFlags(ENCRYPT_FLAGS));
    let hasher = subkey_binding_hasher(binder.hash(), &packet, &subkey_packet);
    let binding = binder.sign_raw(&rsa, packet.algorithm, packet.fingerprint(), hasher, rng)?;

    let public = Arc::new(PublicKey {
        packet,
        user_id,
        self_signature,
        subkeys: vec![Subkey {
            packet: subkey_packet,
            binding,
        }],
    });

    let password = match &options.passphrase {
        Some(passphrase) if !options.unlocked => Some(Password::new(passphrase.clone())),
        _ => None,
    };
    let mut seal = |params: SecretParams| match &password {
        Some(password) => protect(&params, password, &options.protection, rng),
        None => Ok(SecretKeyMaterial::Plain(params)),
    };
    let secret = seal(secret_params(&rsa)?)?;
    let subkey_secret = seal(secret_params(&subkey_rsa)?)?;

    let keypair = KeyPair {
        public: Arc::clone(&public),
        private: PrivateKey {
            public,
            secret,
            subkey_secrets: vec![subkey_secret],
        },
    };
    info!(
        key_id = %keypair.key_id(),
        locked = keypair.private.is_locked(),
        "Generated keypair"
    );
    Ok(keypair)
}

fn key_packet(rsa: &RsaPrivateKey, algorithm: PublicKeyAlgorithm, created: u32) -> PublicKeyPacket {
    PublicKeyPacket {
        created,
        algorithm,
        n: Mpi::from_biguint(rsa.n()),
        e: Mpi::from_biguint(rsa.e()),
    }
}

/// Build the RSA public key of a key packet, checking its parameters.
///
/// The modulus size is measured on the value itself, so zero bytes in
/// front of an encoded modulus do not count towards the minimum.
pub fn rsa_public_key(packet: &PublicKeyPacket) -> Result<RsaPublicKey> {
    let n = packet.n.to_biguint();
    let e = packet.e.to_biguint();

    let bits = n.bits();
    if !(MIN_RSA_BITS..=MAX_RSA_BITS).contains(&bits) {
        return Err(PgpError::invalid_public_key(format!(
            "{}-bit modulus outside {}..={}",
            bits, MIN_RSA_BITS, MAX_RSA_BITS
        )));
    }
    let odd = e.to_bytes_be().last().map_or(false, |byte| byte & 1 == 1);
    if !odd || e < BigUint::from(3u8) {
        return Err(PgpError::invalid_public_key(
            "RSA exponent must be odd and at least 3",
        ));
    }

    RsaPublicKey::new(n, e).map_err(|err| PgpError::invalid_public_key(err.to_string()))
}

/// Unlocked RSA private key for one key packet
fn rsa_private_key(packet: &PublicKeyPacket, secret: &SecretKeyMaterial) -> Result<RsaPrivateKey> {
    let SecretKeyMaterial::Plain(params) = secret else {
        return Err(PgpError::KeyLocked);
    };
    rsa_public_key(packet)?;
    let mut key = RsaPrivateKey::from_components(
        packet.n.to_biguint(),
        packet.e.to_biguint(),
        params.d.to_biguint(),
        vec![params.p.to_biguint(), params.q.to_biguint()],
    )
    .map_err(|e| PgpError::crypto(format!("Invalid RSA secret parameters: {}", e)))?;
    key.validate()
        .map_err(|e| PgpError::crypto(format!("Invalid RSA secret parameters: {}", e)))?;
    key.precompute()
        .map_err(|e| PgpError::crypto(format!("RSA precomputation failed: {}", e)))?;
    Ok(key)
}

fn flags_allow(signature: &SignaturePacket, wanted: u8) -> bool {
    signature
        .key_flags()
        .map_or(true, |flags| flags & wanted != 0)
}

fn is_subkey_packet(packet_type: PacketType) -> bool {
    matches!(packet_type, PacketType::PublicSubkey | PacketType::SecretSubkey)
}

const ENCRYPT_FLAGS: u8 = key_flags::ENCRYPT_COMMUNICATIONS | key_flags::ENCRYPT_STORAGE;

/// A subkey bound to its primary key by a verified binding signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subkey {
    packet: PublicKeyPacket,
    binding: SignaturePacket,
}

impl Subkey {
    /// 20-byte v4 fingerprint of the subkey
    pub fn fingerprint(&self) -> Fingerprint {
        self.packet.fingerprint()
    }

    /// Key id of the subkey
    pub fn key_id(&self) -> KeyId {
        self.packet.key_id()
    }

    /// The subkey packet
    pub fn packet(&self) -> &PublicKeyPacket {
        &self.packet
    }

    /// The binding signature made by the primary key
    pub fn binding(&self) -> &SignaturePacket {
        &self.binding
    }

    /// Whether the binding allows session keys to be wrapped to this subkey
    pub fn can_encrypt(&self) -> bool {
        self.packet.algorithm.can_encrypt() && flags_allow(&self.binding, ENCRYPT_FLAGS)
    }
}

/// Extract OpenPGP secret parameters, ordering the primes so that p < q
fn secret_params(rsa: &RsaPrivateKey) -> Result<SecretParams> {
    let (p, q) = match rsa.primes() {
        [a, b] if a < b => (a, b),
        [a, b] => (b, a),
        primes => {
            return Err(PgpError::crypto(format!(
                "Expected two RSA primes, got {}",
                primes.len()
            )))
        }
    };
    let two = BigUint::from(2u8);
    let u = p.modpow(&(q - &two), q);

    Ok(SecretParams {
        d: Mpi::from_biguint(rsa.d()),
        p: Mpi::from_biguint(p),
        q: Mpi::from_biguint(q),
        u: Mpi::from_biguint(&u),
    })
}

/// A public key with its User ID and verified self-signature
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    packet: PublicKeyPacket,
    user_id: UserIdPacket,
    self_signature: SignaturePacket,
    subkeys: Vec<Subkey>,
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("algorithm", &self.packet.algorithm)
            .field("bits", &self.bits())
            .field("key_id", &self.key_id())
            .field("user_id", &self.user_id.user_id)
            .field("subkeys", &self.subkeys.iter().map(Subkey::key_id).collect::<Vec<_>>())
            .finish()
    }
}

impl PublicKey {
    /// 20-byte v4 fingerprint
    pub fn fingerprint(&self) -> Fingerprint {
        self.packet.fingerprint()
    }

    /// Low 8 bytes of the fingerprint
    pub fn key_id(&self) -> KeyId {
        self.packet.key_id()
    }

    /// Public key algorithm
    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        self.packet.algorithm
    }

    /// Modulus size in bits
    pub fn bits(&self) -> usize {
        self.packet.bits()
    }

    /// The bound User ID
    pub fn user_id(&self) -> &str {
        &self.user_id.user_id
    }

    /// Creation time in seconds since the epoch
    pub fn created(&self) -> u32 {
        self.packet.created
    }

    /// The underlying key packet
    pub fn packet(&self) -> &PublicKeyPacket {
        &self.packet
    }

    /// The self-signature binding the User ID
    pub fn self_signature(&self) -> &SignaturePacket {
        &self.self_signature
    }

    /// Subkeys with a valid binding signature
    pub fn subkeys(&self) -> &[Subkey] {
        &self.subkeys
    }

    fn primary_can_encrypt(&self) -> bool {
        self.algorithm().can_encrypt() && flags_allow(&self.self_signature, ENCRYPT_FLAGS)
    }

    /// The key packet session keys are wrapped to.
    ///
    /// This is the first encryption subkey, or the primary key when no
    /// subkey qualifies and the self-signature allows encryption.
    pub fn encryption_key(&self) -> Option<&PublicKeyPacket> {
        self.subkeys
            .iter()
            .find(|subkey| subkey.can_encrypt())
            .map(Subkey::packet)
            .or_else(|| self.primary_can_encrypt().then_some(&self.packet))
    }

    /// Key id recipients of this key are addressed by
    pub fn encryption_key_id(&self) -> Option<KeyId> {
        self.encryption_key().map(PublicKeyPacket::key_id)
    }

    /// Whether session keys may be wrapped to this key
    pub fn can_encrypt(&self) -> bool {
        self.encryption_key().is_some()
    }

    /// Whether this key may make data signatures
    pub fn can_sign(&self) -> bool {
        self.algorithm().can_sign() && flags_allow(&self.self_signature, key_flags::SIGN)
    }

    /// Build the RSA public key of the primary key, checking its parameters
    pub fn rsa_key(&self) -> Result<RsaPublicKey> {
        rsa_public_key(&self.packet)
    }

    /// Structural check of the RSA parameters of the primary key and subkeys
    pub fn validate(&self) -> Result<()> {
        self.rsa_key()?;
        for subkey in &self.subkeys {
            rsa_public_key(&subkey.packet)?;
        }
        Ok(())
    }

    /// Key, User ID and self-signature packets, then each subkey with its binding
    pub fn to_packets(&self) -> Vec<Packet> {
        let mut packets = vec![
            self.packet.to_packet(),
            self.user_id.to_packet(),
            self.self_signature.to_packet(),
        ];
        for subkey in &self.subkeys {
            packets.push(Packet::new(PacketType::PublicSubkey, subkey.packet.to_bytes()));
            packets.push(subkey.binding.to_packet());
        }
        packets
    }

    /// Parse a transferable public key.
    ///
    /// Requires a public key packet first and a User ID with a valid
    /// self-certification. Further User IDs are ignored. Subkeys without a
    /// valid binding signature are skipped.
    pub fn from_packets(packets: &[Packet]) -> Result<Self> {
        let (first, rest) = packets
            .split_first()
            .ok_or_else(|| PgpError::invalid_public_key("Empty key block"))?;
        if first.packet_type() != PacketType::PublicKey {
            return Err(PgpError::invalid_public_key(format!(
                "Key block starts with {:?}",
                first.packet_type()
            )));
        }
        let packet = first.parse_body::<PublicKeyPacket>().map_err(key_error)?;
        Self::from_parts(packet, rest).map(|(key, _)| key)
    }

    /// Certify a parsed key packet from `rest`, then collect the subkeys.
    ///
    /// The returned secrets run parallel to the subkeys and are present for
    /// secret subkey packets.
    fn from_parts(
        packet: PublicKeyPacket,
        rest: &[Packet],
    ) -> Result<(Self, Vec<Option<SecretKeyMaterial>>)> {
        rsa_public_key(&packet).map_err(key_error)?;
        let split = rest
            .iter()
            .position(|p| is_subkey_packet(p.packet_type()))
            .unwrap_or(rest.len());
        let (user_ids, subkey_packets) = rest.split_at(split);
        let mut key = Self::certified(packet, user_ids)?;

        let mut secrets = Vec::new();
        let mut index = 0;
        while index < subkey_packets.len() {
            let candidate = &subkey_packets[index];
            index += 1;
            if !is_subkey_packet(candidate.packet_type()) {
                continue;
            }
            let start = index;
            while index < subkey_packets.len()
                && subkey_packets[index].packet_type() == PacketType::Signature
            {
                index += 1;
            }

            let parsed = if candidate.packet_type() == PacketType::SecretSubkey {
                SecretKeyPacket::from_bytes(&candidate.body).map(|s| (s.public, Some(s.secret)))
            } else {
                PublicKeyPacket::from_bytes(&candidate.body).map(|p| (p, None))
            };
            let (subkey_packet, secret) = match parsed {
                Ok(parsed) => parsed,
                Err(PgpError::UnsupportedKeyType(algorithm)) => {
                    warn!(algorithm = %algorithm, "Skipping subkey");
                    continue;
                }
                Err(e) => return Err(key_error(e)),
            };

            match key.bind_subkey(subkey_packet, &subkey_packets[start..index]) {
                Some(subkey) => {
                    key.subkeys.push(subkey);
                    secrets.push(secret);
                }
                None => warn!(key_id = %key.key_id(), "Skipping subkey without a valid binding"),
            }
        }

        debug!(
            key_id = %key.key_id(),
            user_id = %key.user_id(),
            subkeys = key.subkeys.len(),
            "Loaded public key"
        );
        Ok((key, secrets))
    }

    /// Bind a key packet to the first User ID in `packets` that carries a
    /// valid self-certification
    fn certified(packet: PublicKeyPacket, packets: &[Packet]) -> Result<Self> {
        let mut saw_user_id = false;
        let mut index = 0;
        while index < packets.len() {
            let candidate = &packets[index];
            index += 1;
            if candidate.packet_type() != PacketType::UserId {
                continue;
            }
            saw_user_id = true;
            let user_id = candidate.parse_body::<UserIdPacket>().map_err(key_error)?;

            while index < packets.len() && packets[index].packet_type() == PacketType::Signature {
                let signature = packets[index].parse_body::<SignaturePacket>();
                index += 1;
                let Ok(signature) = signature else { continue };
                if !signature.sig_type.is_certification() {
                    continue;
                }
                let key = PublicKey {
                    packet: packet.clone(),
                    user_id: user_id.clone(),
                    self_signature: signature,
                    subkeys: Vec::new(),
                };
                let hasher = certification_hasher(
                    key.self_signature.hash_algorithm,
                    &key.packet,
                    &key.user_id,
                );
                if verify_with_hasher(&key.self_signature, &key, hasher) {
                    return Ok(key);
                }
            }
        }

        if saw_user_id {
            Err(PgpError::invalid_public_key("No valid self-signature"))
        } else {
            Err(PgpError::invalid_public_key("Key has no User ID"))
        }
    }

    /// Pair a subkey packet with the first binding signature in `signatures`
    /// that this primary key made over it
    fn bind_subkey(&self, packet: PublicKeyPacket, signatures: &[Packet]) -> Option<Subkey> {
        if let Err(e) = rsa_public_key(&packet) {
            warn!(subkey = %packet.key_id(), error = %e, "Rejecting subkey parameters");
            return None;
        }
        let binding = signatures
            .iter()
            .filter_map(|p| p.parse_body::<SignaturePacket>().ok())
            .filter(|signature| signature.sig_type == SignatureType::SubkeyBinding)
            .find(|signature| {
                let hasher = subkey_binding_hasher(signature.hash_algorithm, &self.packet, &packet);
                verify_with_hasher(signature, self, hasher)
            })?;
        Some(Subkey { packet, binding })
    }

    /// Armored PUBLIC KEY BLOCK with the default headers
    pub fn to_armored(&self) -> String {
        self.to_armored_with(&ArmorOptions::default())
    }

    /// Armored PUBLIC KEY BLOCK with custom headers
    pub fn to_armored_with(&self, options: &ArmorOptions) -> String {
        ArmorBlock::from_packets(ArmorType::PublicKey, &self.to_packets(), options).to_armored()
    }

    /// Parse an armored PUBLIC KEY BLOCK
    pub fn from_armored(armored: &str) -> Result<Self> {
        let block = decode(armored)?;
        Self::from_packets(&block.expect_packets(&ArmorType::PublicKey)?)
    }
}

/// Structural key errors become `InvalidPublicKey`; unsupported algorithms keep their kind
fn key_error(error: PgpError) -> PgpError {
    match error {
        PgpError::UnsupportedKeyType(_) | PgpError::InvalidPublicKey(_) => error,
        other => PgpError::invalid_public_key(other.to_string()),
    }
}

/// A private key, locked or unlocked, sharing its public half
#[derive(Clone)]
pub struct PrivateKey {
    public: Arc<PublicKey>,
    secret: SecretKeyMaterial,
    subkey_secrets: Vec<SecretKeyMaterial>,
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("key_id", &self.key_id())
            .field("locked", &self.is_locked())
            .finish()
    }
}

impl PrivateKey {
    /// The public half
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Key id of the public half
    pub fn key_id(&self) -> KeyId {
        self.public.key_id()
    }

    /// Fingerprint of the public half
    pub fn fingerprint(&self) -> Fingerprint {
        self.public.fingerprint()
    }

    /// Whether a passphrase is needed before use
    pub fn is_locked(&self) -> bool {
        self.secret.is_encrypted() || self.subkey_secrets.iter().any(SecretKeyMaterial::is_encrypted)
    }

    /// Return an unlocked copy; the receiver is left as it is.
    ///
    /// Unlocking an already unlocked key returns a copy of it.
    pub fn unlock(&self, passphrase: &Password) -> Result<PrivateKey> {
        let params = unprotect(&self.secret, passphrase)?;
        let subkey_secrets = self
            .subkey_secrets
            .iter()
            .map(|secret| unprotect(secret, passphrase).map(SecretKeyMaterial::Plain))
            .collect::<Result<Vec<_>>>()?;
        let unlocked = PrivateKey {
            public: Arc::clone(&self.public),
            secret: SecretKeyMaterial::Plain(params),
            subkey_secrets,
        };
        // Parameters that decrypt cleanly but do not form the key are treated
        // like any other wrong passphrase.
        unlocked.rsa_key().map_err(|_| PgpError::WrongPassphrase)?;
        for (subkey, secret) in unlocked.public.subkeys.iter().zip(&unlocked.subkey_secrets) {
            rsa_private_key(&subkey.packet, secret).map_err(|_| PgpError::WrongPassphrase)?;
        }
        debug!(key_id = %self.key_id(), "Unlocked private key");
        Ok(unlocked)
    }

    /// Return a copy locked with `passphrase` and default S2K settings
    pub fn lock<R: CryptoRng + RngCore>(&self, passphrase: &Password, rng: &mut R) -> Result<PrivateKey> {
        self.lock_with(passphrase, &ProtectionParams::default(), rng)
    }

    /// Return a copy locked with `passphrase` and the given S2K settings
    pub fn lock_with<R: CryptoRng + RngCore>(
        &self,
        passphrase: &Password,
        protection: &ProtectionParams,
        rng: &mut R,
    ) -> Result<PrivateKey> {
        let mut lock = |material: &SecretKeyMaterial| match material {
            SecretKeyMaterial::Plain(params) => protect(params, passphrase, protection, rng),
            SecretKeyMaterial::Encrypted { .. } => {
                Err(PgpError::invalid_input("Private key is already locked"))
            }
        };
        let secret = lock(&self.secret)?;
        let subkey_secrets = self
            .subkey_secrets
            .iter()
            .map(&mut lock)
            .collect::<Result<Vec<_>>>()?;
        debug!(key_id = %self.key_id(), "Locked private key");
        Ok(PrivateKey {
            public: Arc::clone(&self.public),
            secret,
            subkey_secrets,
        })
    }

    /// Build the RSA private key of the primary; fails with `KeyLocked` while locked
    pub(crate) fn rsa_key(&self) -> Result<RsaPrivateKey> {
        rsa_private_key(&self.public.packet, &self.secret)
    }

    fn decryption_components(
        &self,
    ) -> impl Iterator<Item = (&'_ PublicKeyPacket, &'_ SecretKeyMaterial)> + '_ {
        let subkeys = self
            .public
            .subkeys
            .iter()
            .zip(&self.subkey_secrets)
            .filter(|(subkey, _)| subkey.can_encrypt())
            .map(|(subkey, secret)| (&subkey.packet, secret));
        let primary = self
            .public
            .primary_can_encrypt()
            .then_some((&self.public.packet, &self.secret));
        subkeys.chain(primary)
    }

    /// Key ids of the components that can decrypt session keys, subkeys first
    pub fn decryption_key_ids(&self) -> Vec<KeyId> {
        self.decryption_components()
            .map(|(packet, _)| packet.key_id())
            .collect()
    }

    /// Build the RSA private key of the decryption component `key_id`
    pub(crate) fn decryption_key(&self, key_id: &KeyId) -> Result<RsaPrivateKey> {
        let (packet, secret) = self
            .decryption_components()
            .find(|(packet, _)| packet.key_id().ct_eq(key_id))
            .ok_or(PgpError::NoMatchingKey)?;
        rsa_private_key(packet, secret)
    }

    /// Secret key, User ID and self-signature packets, then each secret
    /// subkey with its binding
    pub fn to_packets(&self) -> Vec<Packet> {
        let secret = SecretKeyPacket {
            public: self.public.packet.clone(),
            secret: self.secret.clone(),
        };
        let mut packets = vec![
            secret.to_packet(),
            self.public.user_id.to_packet(),
            self.public.self_signature.to_packet(),
        ];
        for (subkey, secret) in self.public.subkeys.iter().zip(&self.subkey_secrets) {
            let body = SecretKeyPacket {
                public: subkey.packet.clone(),
                secret: secret.clone(),
            }
            .to_bytes();
            packets.push(Packet::new(PacketType::SecretSubkey, body));
            packets.push(subkey.binding.to_packet());
        }
        packets
    }

    /// Parse a transferable secret key
    pub fn from_packets(packets: &[Packet]) -> Result<Self> {
        let (first, rest) = packets
            .split_first()
            .ok_or_else(|| PgpError::invalid_public_key("Empty key block"))?;
        if first.packet_type() != PacketType::SecretKey {
            return Err(PgpError::invalid_public_key(format!(
                "Key block starts with {:?}",
                first.packet_type()
            )));
        }
        let SecretKeyPacket { public, secret } = first.parse_body::<SecretKeyPacket>()?;
        let (mut public, secrets) = PublicKey::from_parts(public, rest)?;

        let (subkeys, subkey_secrets): (Vec<_>, Vec<_>) = std::mem::take(&mut public.subkeys)
            .into_iter()
            .zip(secrets)
            .filter_map(|(subkey, secret)| match secret {
                Some(secret) => Some((subkey, secret)),
                None => {
                    warn!(subkey = %subkey.key_id(), "Skipping subkey without secret material");
                    None
                }
            })
            .unzip();
        public.subkeys = subkeys;

        Ok(PrivateKey {
            public: Arc::new(public),
            secret,
            subkey_secrets,
        })
    }

    /// Armored PRIVATE KEY BLOCK with the default headers
    pub fn to_armored(&self) -> String {
        self.to_armored_with(&ArmorOptions::default())
    }

    /// Armored PRIVATE KEY BLOCK with custom headers
    pub fn to_armored_with(&self, options: &ArmorOptions) -> String {
        ArmorBlock::from_packets(ArmorType::PrivateKey, &self.to_packets(), options).to_armored()
    }

    /// Parse an armored PRIVATE KEY BLOCK
    pub fn from_armored(armored: &str) -> Result<Self> {
        let block = decode(armored)?;
        Self::from_packets(&block.expect_packets(&ArmorType::PrivateKey)?)
    }
}

/// A generated public/private key pair
#[derive(Debug, Clone)]
pub struct KeyPair {
    public: Arc<PublicKey>,
    private: PrivateKey,
}

impl KeyPair {
    /// Pair a private key with its own public half
    pub fn from_private(private: PrivateKey) -> Self {
        Self {
            public: Arc::clone(&private.public),
            private,
        }
    }

    /// The public key
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// The private key, possibly locked
    pub fn private_key(&self) -> &PrivateKey {
        &self.private
    }

    /// Key id of the pair
    pub fn key_id(&self) -> KeyId {
        self.public.key_id()
    }

    /// Fingerprint of the pair
    pub fn fingerprint(&self) -> Fingerprint {
        self.public.fingerprint()
    }

    /// User ID of the pair
    pub fn user_id(&self) -> &str {
        self.public.user_id()
    }

    /// Creation time in seconds since the epoch
    pub fn created(&self) -> u32 {
        self.public.created()
    }
}

impl fmt::Display for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "KeyPair({}-{}, {}, ID: {})",
            self.public.algorithm().name(),
            self.public.bits(),
            self.user_id(),
            self.key_id()
        )
    }
}

#[cfg(test)]
pub(crate) mod test_keys {
    use super::*;
    use rand::rngs::OsRng;
    use std::sync::OnceLock;

    /// Three unprotected 1024-bit keys shared across unit tests
    pub(crate) fn keypair(index: usize) -> &'static KeyPair {
        static KEYS: OnceLock<Vec<KeyPair>> = OnceLock::new();
        &KEYS.get_or_init(|| {
            ["alice@example.com", "bob@example.com", "carol@example.com"]
                .iter()
                .map(|uid| {
                    generate_keypair(&KeyGenOptions::rsa(1024, uid), &mut OsRng)
                        .expect("test key generation")
                })
                .collect()
        })[index]
    }
}
