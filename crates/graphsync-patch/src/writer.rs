//! Incremental patch recorder.
//!
//! Capture code forwards change events to a writer and drives transaction
//! markers explicitly:
//!
//! ```
//! # use graphsync_patch::{PatchHandler, PatchWriter};
//! # use graphsync_core::{Term, Triple};
//! let mut writer = PatchWriter::with_id();
//! let quad = Triple::new(
//!     Term::iri("http://example/s"),
//!     Term::iri("http://example/p"),
//!     Term::literal("o"),
//! )
//! .in_default_graph();
//! writer.txn_begin().unwrap();
//! writer.add(&quad).unwrap();
//! writer.txn_commit().unwrap();
//! let patch = writer.into_patch().unwrap();
//! assert_eq!(patch.summary().adds, 1);
//! ```

use graphsync_core::{Quad, Term};
use uuid::Uuid;

use crate::{Patch, PatchError, PatchHandler, PatchOp, HEADER_ID};

/// Records operations in order and yields a validated [`Patch`].
#[derive(Debug, Default)]
pub struct PatchWriter {
    ops: Vec<PatchOp>,
    in_txn: bool,
}

impl PatchWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a patch with a fresh `H id <urn:uuid:...>` header.
    pub fn with_id() -> Self {
        let mut writer = Self::new();
        writer.ops.push(PatchOp::Header {
            key: HEADER_ID.to_string(),
            value: Term::iri(format!("urn:uuid:{}", Uuid::new_v4())),
        });
        writer
    }

    pub fn in_transaction(&self) -> bool {
        self.in_txn
    }

    /// Number of data operations recorded so far.
    pub fn data_ops(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, PatchOp::Add(_) | PatchOp::Delete(_)))
            .count()
    }

    /// Finish recording. Fails if a transaction is still open.
    pub fn into_patch(self) -> Result<Patch, PatchError> {
        Patch::from_ops(self.ops)
    }

    fn marker_error(&self, message: &str) -> PatchError {
        PatchError::malformed(self.ops.len() + 1, message)
    }
}

impl PatchHandler for PatchWriter {
    type Error = PatchError;

    fn header(&mut self, key: &str, value: &Term) -> Result<(), PatchError> {
        self.ops.push(PatchOp::Header {
            key: key.to_string(),
            value: value.clone(),
        });
        Ok(())
    }

    fn add_prefix(&mut self, prefix: &str, uri: &str) -> Result<(), PatchError> {
        self.ops.push(PatchOp::AddPrefix {
            prefix: prefix.to_string(),
            uri: uri.to_string(),
        });
        Ok(())
    }

    fn delete_prefix(&mut self, prefix: &str, uri: &str) -> Result<(), PatchError> {
        self.ops.push(PatchOp::DeletePrefix {
            prefix: prefix.to_string(),
            uri: uri.to_string(),
        });
        Ok(())
    }

    fn add(&mut self, quad: &Quad) -> Result<(), PatchError> {
        self.ops.push(PatchOp::Add(quad.clone()));
        Ok(())
    }

    fn delete(&mut self, quad: &Quad) -> Result<(), PatchError> {
        self.ops.push(PatchOp::Delete(quad.clone()));
        Ok(())
    }

    fn txn_begin(&mut self) -> Result<(), PatchError> {
        if self.in_txn {
            return Err(self.marker_error("nested transaction"));
        }
        self.in_txn = true;
        self.ops.push(PatchOp::TxnBegin);
        Ok(())
    }

    fn txn_commit(&mut self) -> Result<(), PatchError> {
        if !self.in_txn {
            return Err(self.marker_error("no transaction to commit"));
        }
        self.in_txn = false;
        self.ops.push(PatchOp::TxnCommit);
        Ok(())
    }

    fn txn_abort(&mut self) -> Result<(), PatchError> {
        if !self.in_txn {
            return Err(self.marker_error("no transaction to abort"));
        }
        self.in_txn = false;
        self.ops.push(PatchOp::TxnAbort);
        Ok(())
    }
}
