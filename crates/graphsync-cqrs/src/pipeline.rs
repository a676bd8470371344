//! The capture → patch → publish request path.
//!
//! `execute` never mutates the store. The update closure runs against a
//! [`CaptureDataset`] over a read snapshot, the recorded patch is published,
//! and the request succeeds only once the bus has accepted it.

use std::io::Write;
use std::sync::Arc;

use graphsync_bus::Publisher;
use graphsync_core::labels::labels_from_header;
use graphsync_core::message::{HEADER_CONTENT_TYPE, HEADER_REQUEST_ID, HEADER_SECURITY_LABEL};
use graphsync_core::{vocab, Headers, OutboundMessage, Quad, RdfSyntax, UserAttributes};
use graphsync_ingest::parser;
use graphsync_store::Store;
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::dataset::CaptureDataset;
use crate::error::{CqrsError, Result};

/// Per-request inputs.
#[derive(Debug, Clone, Default)]
pub struct UpdateContext {
    /// Generated when absent.
    pub request_id: Option<String>,
    /// Raw `Security-Label` header, forwarded unchanged.
    pub security_label: Option<String>,
    /// Caller attributes for the store's API-access check.
    pub user: Option<UserAttributes>,
}

impl UpdateContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn with_security_label(mut self, label: impl Into<String>) -> Self {
        self.security_label = Some(label.into());
        self
    }

    pub fn with_user(mut self, user: UserAttributes) -> Self {
        self.user = Some(user);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CqrsOutcome {
    pub request_id: String,
    /// Bus offset of the published patch; `None` in disconnected mode.
    pub offset: Option<u64>,
    pub adds: usize,
    pub deletes: usize,
    pub patch_bytes: usize,
}

pub struct CqrsPipeline {
    topic: String,
    publisher: Option<Arc<dyn Publisher>>,
    local_sink: Mutex<Box<dyn Write + Send>>,
}

impl CqrsPipeline {
    /// Publish patches to `topic`.
    pub fn connected(topic: impl Into<String>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            topic: topic.into(),
            publisher: Some(publisher),
            local_sink: Mutex::new(Box::new(std::io::stdout())),
        }
    }

    /// Write patches to stdout instead of a bus.
    pub fn disconnected(topic: impl Into<String>) -> Self {
        Self::with_sink(topic, Box::new(std::io::stdout()))
    }

    /// Write patches to `sink` instead of a bus.
    pub fn with_sink(topic: impl Into<String>, sink: Box<dyn Write + Send>) -> Self {
        Self {
            topic: topic.into(),
            publisher: None,
            local_sink: Mutex::new(sink),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_connected(&self) -> bool {
        self.publisher.is_some()
    }

    /// Run `update` against a private overlay of `store` and publish the
    /// changes it made as one patch transaction.
    pub async fn execute<F>(&self, store: &Store, ctx: &UpdateContext, update: F) -> Result<CqrsOutcome>
    where
        F: FnOnce(&mut CaptureDataset) -> Result<()>,
    {
        if let Some(user) = &ctx.user {
            store.check_api_access(user)?;
        }
        let labels = labels_from_header(ctx.security_label.as_deref())?;
        if labels.is_some() && !store.is_labelled() {
            return Err(CqrsError::Authz(format!(
                "security label sent to unlabelled store '{}'",
                store.name()
            )));
        }
        let request_id = ctx
            .request_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut capture = CaptureDataset::new(store.read());
        capture.begin()?;
        if let Err(e) = update(&mut capture) {
            tracing::warn!(
                store = %store.name(),
                request_id = %request_id,
                error = %e,
                "Update failed; nothing published"
            );
            return Err(e);
        }
        let patch = capture.commit()?;
        let summary = patch.summary();
        let body = patch.to_text().into_bytes();

        let mut outcome = CqrsOutcome {
            request_id: request_id.clone(),
            offset: None,
            adds: summary.adds,
            deletes: summary.deletes,
            patch_bytes: body.len(),
        };

        match &self.publisher {
            Some(publisher) => {
                let mut headers = Headers::new()
                    .with(HEADER_CONTENT_TYPE, vocab::MEDIA_RDF_PATCH)
                    .with(HEADER_REQUEST_ID, request_id.as_str());
                if let Some(label) = &ctx.security_label {
                    headers.insert(HEADER_SECURITY_LABEL, label.as_str());
                }
                let message = OutboundMessage {
                    topic: self.topic.clone(),
                    headers,
                    body,
                };
                let offset = publisher.publish(message).await.map_err(|e| {
                    tracing::error!(
                        topic = %self.topic,
                        request_id = %request_id,
                        error = %e,
                        "Patch publish failed"
                    );
                    CqrsError::Publish(e)
                })?;
                outcome.offset = Some(offset);
            }
            None => {
                let mut sink = self.local_sink.lock();
                sink.write_all(&body)?;
                sink.flush()?;
            }
        }

        tracing::info!(
            store = %store.name(),
            topic = %self.topic,
            request_id = %outcome.request_id,
            offset = ?outcome.offset,
            adds = outcome.adds,
            deletes = outcome.deletes,
            "Update captured"
        );
        Ok(outcome)
    }

    /// Upload RDF data, graph-store-protocol style: every statement becomes
    /// an add in the published patch.
    pub async fn load(
        &self,
        store: &Store,
        ctx: &UpdateContext,
        syntax: RdfSyntax,
        body: &[u8],
    ) -> Result<CqrsOutcome> {
        let quads = parser::parse_all(syntax, &parser::base_iri(&self.topic), body)?;
        if !store.is_labelled() && quads.iter().any(|q| q.graph.is_iri(vocab::LABELS_GRAPH)) {
            return Err(CqrsError::Authz(format!(
                "labels graph sent to unlabelled store '{}'",
                store.name()
            )));
        }
        self.insert_data(store, ctx, quads).await
    }

    pub async fn insert_data(
        &self,
        store: &Store,
        ctx: &UpdateContext,
        quads: Vec<Quad>,
    ) -> Result<CqrsOutcome> {
        self.execute(store, ctx, |ds| {
            for quad in &quads {
                ds.add(quad)?;
            }
            Ok(())
        })
        .await
    }

    pub async fn delete_data(
        &self,
        store: &Store,
        ctx: &UpdateContext,
        quads: Vec<Quad>,
    ) -> Result<CqrsOutcome> {
        self.execute(store, ctx, |ds| {
            for quad in &quads {
                ds.delete(quad)?;
            }
            Ok(())
        })
        .await
    }
}
