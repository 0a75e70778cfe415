//! Replay validation for a DID's operation log.
//!
//! The log is a `prev`-linked chain rooted at a genesis operation whose hash
//! *is* the DID. A later operation may fork off an earlier ancestor and
//! displace the operations after it, but only when signed by a strictly more
//! powerful rotation key than the displaced signer, and only within 72 hours
//! of the first displaced operation. A tombstone ends the chain for good.
//!
//! Everything here is a pure function of its inputs: no I/O, no shared state,
//! identical inputs produce identical results.

use chrono::{DateTime, FixedOffset};
use multibase::Base;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::cbor;
use crate::crypto;
use crate::error::{PlcError, Result};
use crate::types::{DidDocument, LogEntry, Operation};

/// How long after a displaced operation a recovery fork is still accepted.
pub const RECOVERY_GRACE_PERIOD_MS: i64 = 72 * 60 * 60 * 1000;

/// Derive the DID bound to a genesis operation: SHA-256 over the signed
/// canonical CBOR, base32-lower, truncated to 24 characters.
pub fn did_for_genesis(op: &Operation) -> Result<String> {
    let bytes = cbor::signed_bytes(op)?;
    let digest = Sha256::digest(&bytes);
    let encoded = multibase::encode(Base::Base32Lower, digest);
    // index 0 is the multibase prefix character
    Ok(format!("did:plc:{}", &encoded[1..25]))
}

/// Check that `op` is a valid genesis for `did`: not a tombstone, signed by
/// one of its own rotation keys, hashing to `did`, and without a `prev`.
pub fn assure_valid_genesis(did: &str, op: &Operation) -> Result<()> {
    let Some(normalized) = op.normalized() else {
        return Err(PlcError::MisorderedOperation);
    };
    crypto::verify_operation_signature(&normalized.rotation_keys, op)?;
    let expected = did_for_genesis(op)?;
    if expected != did {
        return Err(PlcError::GenesisHash(expected));
    }
    if op.prev().is_some() {
        return Err(PlcError::ImproperOperation {
            message: "genesis operation must not reference a prev".to_string(),
            operation: Box::new(op.clone()),
        });
    }
    Ok(())
}

/// The result of accepting one operation: the new confirmed history, the
/// `prev` link it attached to, and the CIDs it displaced (if any).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub nullified: Vec<String>,
    pub prev: Option<String>,
    pub ops: Vec<LogEntry>,
}

/// Decide whether `proposed` extends `confirmed`, forks it, or is rejected.
///
/// `confirmed` must itself be a valid history; entries are never mutated —
/// a fork only changes which entries belong to the confirmed prefix.
pub fn apply_operation(
    did: &str,
    confirmed: &[LogEntry],
    proposed: &LogEntry,
) -> Result<StepOutcome> {
    if confirmed.is_empty() {
        assure_valid_genesis(did, &proposed.operation)?;
        return Ok(StepOutcome {
            nullified: Vec::new(),
            prev: None,
            ops: vec![proposed.clone()],
        });
    }

    // Only the genesis operation may omit prev.
    let Some(prev) = proposed.operation.prev() else {
        return Err(PlcError::MisorderedOperation);
    };
    let Some(index) = confirmed.iter().position(|entry| entry.cid == prev) else {
        return Err(PlcError::MisorderedOperation);
    };
    let (prefix, tail) = confirmed.split_at(index + 1);
    let head = &prefix[index];

    // A tombstone head has no rotation keys to extend under.
    let Some(head_op) = head.operation.normalized() else {
        return Err(PlcError::MisorderedOperation);
    };
    let allowed_keys = head_op.rotation_keys;

    if tail.is_empty() {
        crypto::verify_operation_signature(&allowed_keys, &proposed.operation)?;
        let mut ops = confirmed.to_vec();
        ops.push(proposed.clone());
        return Ok(StepOutcome {
            nullified: Vec::new(),
            prev: Some(prev.to_string()),
            ops,
        });
    }

    // Forked history. The displaced signature is verified first: the
    // displaced signer's position in the rotation list sets the power
    // threshold the recovery signer has to beat.
    let first_nullified = &tail[0];
    let disputed_signer =
        crypto::verify_operation_signature(&allowed_keys, &first_nullified.operation)?;
    let power = allowed_keys
        .iter()
        .position(|key| *key == disputed_signer)
        .unwrap_or(0);
    let more_powerful = &allowed_keys[..power];
    crypto::verify_operation_signature(more_powerful, &proposed.operation)?;

    // The window runs from the first displaced operation, not the latest.
    // Only an upper bound: negative skew is tolerated, upstream ordering is
    // authoritative.
    let proposed_at = parse_timestamp(&proposed.created_at, &proposed.operation)?;
    let nullified_at =
        parse_timestamp(&first_nullified.created_at, &first_nullified.operation)?;
    let elapsed = proposed_at
        .signed_duration_since(nullified_at)
        .num_milliseconds();
    if elapsed > RECOVERY_GRACE_PERIOD_MS {
        return Err(PlcError::LateRecovery(elapsed));
    }

    let nullified = tail.iter().map(|entry| entry.cid.clone()).collect();
    let mut ops = prefix.to_vec();
    ops.push(proposed.clone());
    Ok(StepOutcome {
        nullified,
        prev: Some(prev.to_string()),
        ops,
    })
}

/// Replay a DID's full operation log and derive its current document.
///
/// Returns `None` for a tombstoned DID. CIDs are recomputed from the
/// operations themselves, so chain and nullification checks hold even if the
/// storage-supplied index data was tampered with.
///
/// # Panics
///
/// An empty log is a caller-contract violation and panics.
pub fn validate_operation_log(did: &str, entries: &[LogEntry]) -> Result<Option<DidDocument>> {
    let mut history: Vec<LogEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        let indexed = LogEntry {
            cid: cbor::cid_for_operation(&entry.operation)?.to_string(),
            ..entry.clone()
        };
        let outcome = apply_operation(did, &history, &indexed)?;
        if !outcome.nullified.is_empty() {
            debug!(did, nullified = ?outcome.nullified, "operations displaced by recovery fork");
        }
        history = outcome.ops;
    }

    let last = history.last().expect("operation log must not be empty");
    match last.operation.normalized() {
        None => Ok(None),
        Some(op) => Ok(Some(DidDocument::new(did, &op))),
    }
}

fn parse_timestamp(value: &str, op: &Operation) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value).map_err(|_| PlcError::ImproperOperation {
        message: format!("unparseable createdAt timestamp: {value}"),
        operation: Box::new(op.clone()),
    })
}
