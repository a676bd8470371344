//! BLAKE3 patch digests.
//!
//! The digest covers the canonical text form, so two patches with the same
//! operations in the same order share a digest regardless of how the
//! original text was laid out.

use crate::Patch;

/// Compute the BLAKE3 hash of a patch's canonical text. Returns hex.
pub fn compute_patch_digest(patch: &Patch) -> String {
    blake3::hash(patch.to_text().as_bytes()).to_hex().to_string()
}
