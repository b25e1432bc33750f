//! Deterministic identity generation
//!
//! Maps `(object kind, local key)` to a stable, globally unique identifier
//! without any allocator or coordination: a name-based UUID (version 5)
//! inside one fixed namespace, rendered as
//! `x-mitre-mapper-{kind}--{uuid}`. Two independent processes derive the
//! same id for the same logical entity.

use crate::graph::NodeId;
use uuid::Uuid;

/// Fixed namespace for all mapper-generated ids.
///
/// Changing this constant changes every derived id; it is part of the wire
/// contract with independently produced records.
const NAMESPACE: Uuid = Uuid::from_bytes([
    0x8f, 0x3b, 0x5e, 0xd2, 0x1a, 0x4c, 0x4b, 0x9e, 0x8d, 0x27, 0x6f, 0x0e, 0x52, 0x91, 0xc3,
    0x7a,
]);

/// Textual prefix shared by all mapper-generated ids
const PREFIX: &str = "x-mitre-mapper";

/// Derive the stable id for `(object_type, local_key)`.
///
/// Pure and deterministic: repeated calls, process restarts, and independent
/// implementations sharing the namespace constant all agree.
pub fn generate(object_type: &str, local_key: &str) -> NodeId {
    let uuid = Uuid::new_v5(&NAMESPACE, local_key.as_bytes());
    NodeId::from_string(format!("{}-{}--{}", PREFIX, object_type, uuid))
}

/// True if a reference is already in canonical id form and needs no
/// resolution (STIX-style `type--uuid` ids).
pub fn is_canonical_ref(reference: &str) -> bool {
    match reference.split_once("--") {
        Some((_, tail)) => Uuid::parse_str(tail).is_ok(),
        None => false,
    }
}
