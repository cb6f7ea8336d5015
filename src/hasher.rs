//! Repository identities and content fingerprints via SHA-256.
//!
//! Identity keys on the *requested* ref verbatim, never the commit it resolved
//! to. A caller tracking `main` therefore keeps one identity while the branch
//! moves (stale content is caught per file by fingerprint), and a caller
//! pinned to a SHA or tag gets an identity that never changes meaning.
use sha2::{Digest as _, Sha256};

use crate::snapshot::Location;
use crate::types::{Fingerprint, RepositoryIdentity};

/// Version tag mixed into every identity so the key space can be rotated.
const IDENTITY_DOMAIN: &[u8] = b"repodex/identity/v1";

/// Stands in for an absent ref. Contains a NUL, which git forbids in ref names.
const NO_REF_MARKER: &[u8] = b"\0<default>";

/// Stable content hash of a file's bytes.
pub fn fingerprint_of(bytes: &[u8]) -> Fingerprint {
    let digest = Sha256::digest(bytes);
    return Fingerprint(format!("{digest:x}"));
}

/// Deterministic identity of a `(location, requested ref)` pair.
///
/// The location is normalized first, so `https://host/a/b.git` and
/// `https://HOST/a/b/` collapse to one identity. Fields are length-prefixed
/// so no location/ref pair can collide with another by concatenation.
pub fn identity_of(location: &Location, requested_ref: Option<&str>) -> RepositoryIdentity {
    let normalized = location.normalized();
    let mut hasher = Sha256::new();
    hasher.update(IDENTITY_DOMAIN);
    update_length_prefixed(&mut hasher, normalized.as_bytes());
    match requested_ref {
        Some(reference) => update_length_prefixed(&mut hasher, reference.as_bytes()),
        None => update_length_prefixed(&mut hasher, NO_REF_MARKER),
    }
    let digest = hasher.finalize();
    return RepositoryIdentity(format!("{digest:x}"));
}

/// Short stable key for naming cache directories after a location.
pub fn location_key(location: &Location) -> String {
    let digest = Sha256::digest(location.normalized().as_bytes());
    let hex = format!("{digest:x}");
    return hex.chars().take(24).collect();
}

/// Feed one field into the hasher, prefixed by its byte length.
fn update_length_prefixed(hasher: &mut Sha256, field: &[u8]) {
    let len = u64::try_from(field.len()).unwrap_or(u64::MAX);
    hasher.update(len.to_le_bytes());
    hasher.update(field);
}
