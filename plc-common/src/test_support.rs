//! Shared fixtures for unit tests: deterministic keypairs and operation
//! signing. Only compiled for tests.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64;
use k256::ecdsa::signature::Signer;

use crate::cbor;
use crate::crypto::PublicKey;
use crate::types::{Operation, Tombstone};

pub(crate) struct TestKey {
    pub signing: k256::ecdsa::SigningKey,
    pub did_key: String,
}

pub(crate) struct TestKeyP256 {
    #[allow(dead_code)]
    pub signing: p256::ecdsa::SigningKey,
    pub did_key: String,
}

/// Deterministic secp256k1 keypair from a one-byte seed. Seeds stay well
/// below the curve order.
pub(crate) fn secp_key(seed: u8) -> TestKey {
    let signing = k256::ecdsa::SigningKey::from_slice(&[seed; 32]).unwrap();
    let did_key = PublicKey::Secp256k1(*signing.verifying_key()).to_did_key();
    TestKey { signing, did_key }
}

pub(crate) fn p256_key(seed: u8) -> TestKeyP256 {
    let signing = p256::ecdsa::SigningKey::from_slice(&[seed; 32]).unwrap();
    let did_key = PublicKey::P256(*signing.verifying_key()).to_did_key();
    TestKeyP256 { signing, did_key }
}

/// A tombstone with a placeholder signature, ready for `sign_operation`.
pub(crate) fn unsigned_tombstone(prev: &str) -> Operation {
    Operation::PlcTombstone(Tombstone {
        prev: prev.to_string(),
        sig: String::new(),
    })
}

/// Sign `op`'s canonical payload with `key` and return the operation with
/// its signature filled in.
pub(crate) fn sign_operation(mut op: Operation, key: &k256::ecdsa::SigningKey) -> Operation {
    let payload = cbor::signing_payload(&op).unwrap();
    let sig: k256::ecdsa::Signature = key.sign(&payload);
    let encoded = BASE64.encode(sig.to_bytes());
    match &mut op {
        Operation::PlcOperation(inner) => inner.sig = encoded,
        Operation::Create(inner) => inner.sig = encoded,
        Operation::PlcTombstone(inner) => inner.sig = encoded,
    }
    op
}
