//! graphsync-patch: the change log exchanged between stores.
//!
//! A patch is an ordered list of operations: headers, transaction markers,
//! prefix changes and quad additions/deletions. Patches travel over the bus
//! as RDF Patch text, are replayed into a [`PatchHandler`], and are produced
//! incrementally by a [`PatchWriter`].

pub mod codec;
pub mod handler;
pub mod hash;
pub mod writer;

use graphsync_core::{Quad, Term};
use serde::Serialize;

pub use handler::PatchHandler;
pub use writer::PatchWriter;

/// Header key carrying the patch identifier.
pub const HEADER_ID: &str = "id";

// ── Errors ───────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// Unparseable text or a structurally invalid operation sequence.
    /// `line` is 1-based; 0 means the patch as a whole.
    #[error("Malformed patch at line {line}: {message}")]
    Malformed { line: usize, message: String },
}

impl PatchError {
    pub(crate) fn malformed(line: usize, message: impl Into<String>) -> Self {
        Self::Malformed {
            line,
            message: message.into(),
        }
    }
}

// ── Core Types ───────────────────────────────────────────────────

/// One patch operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOp {
    Header { key: String, value: Term },
    TxnBegin,
    TxnCommit,
    TxnAbort,
    AddPrefix { prefix: String, uri: String },
    DeletePrefix { prefix: String, uri: String },
    Add(Quad),
    Delete(Quad),
}

/// A structurally valid sequence of patch operations.
///
/// Construction goes through [`Patch::from_ops`], [`Patch::parse`] or a
/// [`PatchWriter`], all of which enforce transaction nesting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    ops: Vec<PatchOp>,
}

/// Operation counts, logged per applied patch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PatchSummary {
    pub headers: usize,
    pub adds: usize,
    pub deletes: usize,
    pub prefix_ops: usize,
    pub commits: usize,
    pub aborts: usize,
}

impl Patch {
    /// Build a patch from operations, checking transaction structure.
    pub fn from_ops(ops: Vec<PatchOp>) -> Result<Self, PatchError> {
        validate(&ops)?;
        Ok(Self { ops })
    }

    pub fn ops(&self) -> &[PatchOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The `id` header value, if present.
    pub fn id(&self) -> Option<&Term> {
        self.ops.iter().find_map(|op| match op {
            PatchOp::Header { key, value } if key == HEADER_ID => Some(value),
            _ => None,
        })
    }

    /// Replay every operation into `handler`, then call `finish`.
    ///
    /// Stops at the first handler error; `finish` is not called in that case.
    pub fn apply<H: PatchHandler>(&self, handler: &mut H) -> Result<(), H::Error> {
        for op in &self.ops {
            match op {
                PatchOp::Header { key, value } => handler.header(key, value)?,
                PatchOp::TxnBegin => handler.txn_begin()?,
                PatchOp::TxnCommit => handler.txn_commit()?,
                PatchOp::TxnAbort => handler.txn_abort()?,
                PatchOp::AddPrefix { prefix, uri } => handler.add_prefix(prefix, uri)?,
                PatchOp::DeletePrefix { prefix, uri } => handler.delete_prefix(prefix, uri)?,
                PatchOp::Add(quad) => handler.add(quad)?,
                PatchOp::Delete(quad) => handler.delete(quad)?,
            }
        }
        handler.finish()
    }

    pub fn summary(&self) -> PatchSummary {
        let mut summary = PatchSummary::default();
        for op in &self.ops {
            match op {
                PatchOp::Header { .. } => summary.headers += 1,
                PatchOp::TxnBegin => {}
                PatchOp::TxnCommit => summary.commits += 1,
                PatchOp::TxnAbort => summary.aborts += 1,
                PatchOp::AddPrefix { .. } | PatchOp::DeletePrefix { .. } => {
                    summary.prefix_ops += 1
                }
                PatchOp::Add(_) => summary.adds += 1,
                PatchOp::Delete(_) => summary.deletes += 1,
            }
        }
        summary
    }

    /// BLAKE3 hex digest of the canonical text form.
    pub fn digest(&self) -> String {
        hash::compute_patch_digest(self)
    }
}

/// Check transaction structure: no nesting, no commit/abort outside a
/// transaction, nothing left open.
pub(crate) fn validate(ops: &[PatchOp]) -> Result<(), PatchError> {
    let mut open = false;
    for (i, op) in ops.iter().enumerate() {
        match op {
            PatchOp::TxnBegin if open => {
                return Err(PatchError::malformed(i + 1, "nested transaction"))
            }
            PatchOp::TxnBegin => open = true,
            PatchOp::TxnCommit | PatchOp::TxnAbort if !open => {
                return Err(PatchError::malformed(i + 1, "no transaction to end"))
            }
            PatchOp::TxnCommit | PatchOp::TxnAbort => open = false,
            _ => {}
        }
    }
    if open {
        return Err(PatchError::malformed(0, "transaction left open"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphsync_core::Triple;

    fn quad(o: &str) -> Quad {
        Triple::new(
            Term::iri("http://ex/s"),
            Term::iri("http://ex/p"),
            Term::literal(o),
        )
        .in_default_graph()
    }

    #[test]
    fn nested_transaction_rejected() {
        let err = Patch::from_ops(vec![PatchOp::TxnBegin, PatchOp::TxnBegin]).unwrap_err();
        assert!(matches!(err, PatchError::Malformed { line: 2, .. }));
    }

    #[test]
    fn commit_without_begin_rejected() {
        assert!(Patch::from_ops(vec![PatchOp::TxnCommit]).is_err());
    }

    #[test]
    fn open_transaction_rejected() {
        let err = Patch::from_ops(vec![PatchOp::TxnBegin, PatchOp::Add(quad("x"))]).unwrap_err();
        assert!(matches!(err, PatchError::Malformed { line: 0, .. }));
    }

    #[test]
    fn data_outside_transaction_allowed() {
        let patch = Patch::from_ops(vec![PatchOp::Add(quad("x")), PatchOp::Delete(quad("y"))]);
        assert!(patch.is_ok());
    }

    #[test]
    fn summary_counts_operations() {
        let patch = Patch::from_ops(vec![
            PatchOp::TxnBegin,
            PatchOp::Add(quad("a")),
            PatchOp::Add(quad("b")),
            PatchOp::Delete(quad("c")),
            PatchOp::TxnCommit,
            PatchOp::TxnBegin,
            PatchOp::TxnAbort,
        ])
        .unwrap();
        let summary = patch.summary();
        assert_eq!(summary.adds, 2);
        assert_eq!(summary.deletes, 1);
        assert_eq!(summary.commits, 1);
        assert_eq!(summary.aborts, 1);
    }
}
