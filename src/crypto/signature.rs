//! RSA PKCS#1 v1.5 signatures in OpenPGP v4 packets.
//!
//! The digest of a v4 signature covers the signed data followed by the
//! packet's hash trailer. Certification signatures hash the primary key and
//! the User ID in front of that.
//!
//! Verification against several candidate keys checks every candidate and
//! selects the first success without branching on the outcome.

use rand::{CryptoRng, RngCore};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use subtle::{Choice, ConditionallySelectable};
use tracing::debug;

use crate::crypto::keys::{PrivateKey, PublicKey};
use crate::crypto::{current_timestamp, Fingerprint, HashAlgorithm, Hasher, KeyId, PublicKeyAlgorithm};
use crate::error::{PgpError, Result};
use crate::packet::signature::encode_subpackets;
use crate::packet::{
    Mpi, PacketBody, PublicKeyPacket, SignaturePacket, SignatureType, Subpacket, UserIdPacket,
};

fn pkcs1_scheme(hash: HashAlgorithm) -> Pkcs1v15Sign {
    match hash {
        HashAlgorithm::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
        HashAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
        HashAlgorithm::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
        HashAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
    }
}

/// Sign a finished digest with RSA PKCS#1 v1.5
pub fn sign_digest<R: CryptoRng + RngCore>(
    key: &RsaPrivateKey,
    hash: HashAlgorithm,
    digest: &[u8],
    rng: &mut R,
) -> Result<Mpi> {
    let signature = key
        .sign_with_rng(rng, pkcs1_scheme(hash), digest)
        .map_err(|e| PgpError::signing(e.to_string()))?;
    Ok(Mpi::from_slice(&signature))
}

/// Check an RSA PKCS#1 v1.5 signature over a finished digest
pub fn verify_digest(key: &RsaPublicKey, hash: HashAlgorithm, digest: &[u8], signature: &Mpi) -> bool {
    let padded = signature.to_padded(key.size());
    key.verify(pkcs1_scheme(hash), digest, &padded).is_ok()
}

/// Normalize line endings to `CR LF` for text signatures
pub fn canonicalize_text(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 32);
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            b'\r' if data.get(i + 1) == Some(&b'\n') => {
                out.extend_from_slice(b"\r\n");
                i += 1;
            }
            b'\r' | b'\n' => out.extend_from_slice(b"\r\n"),
            b => out.push(b),
        }
        i += 1;
    }
    out
}

/// Start a digest over a key and User ID, as certifications require
pub fn certification_hasher(
    hash: HashAlgorithm,
    key: &PublicKeyPacket,
    user_id: &UserIdPacket,
) -> Hasher {
    let mut hasher = hash.hasher();
    let key_body = key.to_bytes();
    hasher.update(&[0x99]);
    hasher.update(&(key_body.len() as u16).to_be_bytes());
    hasher.update(&key_body);

    let uid = user_id.to_bytes();
    hasher.update(&[0xB4]);
    hasher.update(&(uid.len() as u32).to_be_bytes());
    hasher.update(&uid);
    hasher
}

/// Start a digest over a primary key and a subkey, as subkey bindings require
pub fn subkey_binding_hasher(
    hash: HashAlgorithm,
    primary: &PublicKeyPacket,
    subkey: &PublicKeyPacket,
) -> Hasher {
    let mut hasher = hash.hasher();
    for key in [primary, subkey] {
        let body = key.to_bytes();
        hasher.update(&[0x99]);
        hasher.update(&(body.len() as u16).to_be_bytes());
        hasher.update(&body);
    }
    hasher
}

/// Start a digest over document data for the given signature type
pub fn document_hasher(hash: HashAlgorithm, sig_type: SignatureType, data: &[u8]) -> Hasher {
    let mut hasher = hash.hasher();
    match sig_type {
        SignatureType::Text => hasher.update(&canonicalize_text(data)),
        _ => hasher.update(data),
    }
    hasher
}

/// Builder for v4 signature packets.
///
/// Creation time and issuer fingerprint are always added to the hashed
/// area; the issuer key id goes to the unhashed area.
#[derive(Debug, Clone)]
pub struct SignatureBuilder {
    sig_type: SignatureType,
    hash_algorithm: HashAlgorithm,
    created: u32,
    extra: Vec<Subpacket>,
}

impl SignatureBuilder {
    /// New builder using SHA-256 and the current time
    pub fn new(sig_type: SignatureType) -> Self {
        Self {
            sig_type,
            hash_algorithm: HashAlgorithm::Sha256,
            created: current_timestamp(),
            extra: Vec::new(),
        }
    }

    /// Choose the digest algorithm
    pub fn hash_algorithm(mut self, hash: HashAlgorithm) -> Self {
        self.hash_algorithm = hash;
        self
    }

    /// Override the creation time
    pub fn created(mut self, created: u32) -> Self {
        self.created = created;
        self
    }

    /// Add a hashed subpacket
    pub fn subpacket(mut self, subpacket: Subpacket) -> Self {
        self.extra.push(subpacket);
        self
    }

    /// The digest algorithm this builder signs with
    pub fn hash(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    /// The signature type this builder produces
    pub fn sig_type(&self) -> SignatureType {
        self.sig_type
    }

    /// Finish the digest in `hasher` and sign it with a raw RSA key.
    pub(crate) fn sign_raw<R: CryptoRng + RngCore>(
        self,
        key: &RsaPrivateKey,
        pk_algorithm: PublicKeyAlgorithm,
        issuer: Fingerprint,
        mut hasher: Hasher,
        rng: &mut R,
    ) -> Result<SignaturePacket> {
        if !pk_algorithm.can_sign() {
            return Err(PgpError::signing(format!(
                "{} keys cannot sign",
                pk_algorithm
            )));
        }

        let mut hashed = vec![
            Subpacket::SignatureCreationTime(self.created),
            Subpacket::IssuerFingerprint(issuer),
        ];
        hashed.extend(self.extra);

        let area = encode_subpackets(&hashed);
        let trailer =
            SignaturePacket::trailer_for(self.sig_type, pk_algorithm, self.hash_algorithm, &area);
        hasher.update(&trailer);
        let digest = hasher.finalize();

        let signature = sign_digest(key, self.hash_algorithm, &digest, rng)?;
        debug!(
            sig_type = self.sig_type.to_byte(),
            issuer = %issuer.key_id(),
            "Created signature"
        );

        Ok(SignaturePacket::new(
            self.sig_type,
            pk_algorithm,
            self.hash_algorithm,
            hashed,
            vec![Subpacket::Issuer(issuer.key_id())],
            [digest[0], digest[1]],
            signature,
        ))
    }

    /// Sign `data` with an unlocked private key
    pub fn sign_data<R: CryptoRng + RngCore>(
        self,
        signer: &PrivateKey,
        data: &[u8],
        rng: &mut R,
    ) -> Result<SignaturePacket> {
        let rsa = signer.rsa_key()?;
        let public = signer.public_key();
        if !public.can_sign() {
            return Err(PgpError::signing("Key is not usable for signing"));
        }
        let hasher = document_hasher(self.hash_algorithm, self.sig_type, data);
        self.sign_raw(&rsa, public.algorithm(), public.fingerprint(), hasher, rng)
    }
}

/// Check one signature over a prepared digest state against one key
pub fn verify_with_hasher(signature: &SignaturePacket, key: &PublicKey, mut hasher: Hasher) -> bool {
    if !signature.pk_algorithm.can_sign() || signature.has_unknown_critical() {
        return false;
    }
    let rsa = match key.rsa_key() {
        Ok(rsa) => rsa,
        Err(_) => return false,
    };
    hasher.update(&signature.hash_trailer());
    let digest = hasher.finalize();
    verify_digest(&rsa, signature.hash_algorithm, &digest, &signature.signature)
}

/// Verify a document signature against every candidate key.
///
/// Only binary and text signatures are accepted. Returns the key id of the
/// first candidate that verifies, or [`PgpError::NoValidSignature`].
pub fn verify_data(signature: &SignaturePacket, data: &[u8], candidates: &[PublicKey]) -> Result<KeyId> {
    if !signature.sig_type.is_document() {
        return Err(PgpError::NoValidSignature);
    }
    let hasher = document_hasher(signature.hash_algorithm, signature.sig_type, data);

    let mut found = Choice::from(0);
    let mut selected = 0u64;
    for (index, key) in candidates.iter().enumerate() {
        let ok = Choice::from(u8::from(verify_with_hasher(signature, key, hasher.clone())));
        selected.conditional_assign(&(index as u64), ok & !found);
        found |= ok;
    }

    if bool::from(found) {
        let key_id = candidates
            .get(selected as usize)
            .map(PublicKey::key_id)
            .ok_or(PgpError::NoValidSignature)?;
        debug!(signer = %key_id, candidates = candidates.len(), "Signature verified");
        Ok(key_id)
    } else {
        debug!(candidates = candidates.len(), "No candidate verified the signature");
        Err(PgpError::NoValidSignature)
    }
}
