//! Shared fixtures for the integration test suites.

#![allow(dead_code)]

use pgp_engine::crypto::{generate_keypair, KeyGenOptions, KeyPair, PublicKey};
use rand::rngs::OsRng;
use std::sync::{Once, OnceLock};

/// Route `tracing` output through the test harness; honours `RUST_LOG`
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Unprotected 1024-bit keys for alice, bob and carol, generated once per test binary
pub fn keypair(index: usize) -> &'static KeyPair {
    static KEYS: OnceLock<Vec<KeyPair>> = OnceLock::new();
    init_tracing();
    &KEYS.get_or_init(|| {
        ["alice@example.com", "bob@example.com", "carol@example.com"]
            .iter()
            .map(|uid| {
                generate_keypair(&KeyGenOptions::rsa(1024, uid), &mut OsRng)
                    .expect("Failed to generate test key")
            })
            .collect()
    })[index]
}

pub fn public(index: usize) -> PublicKey {
    keypair(index).public_key().clone()
}
