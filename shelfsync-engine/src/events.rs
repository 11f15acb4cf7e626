use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use shelfsync_core::DocFingerprint;

use crate::progress::Progress;

/// Consistency level of an emitted snapshot. The engine only reports
/// `Committed`: by the time an event fires, the document it covers is
/// durable in the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    Committed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocMutation {
    pub kind: MutationKind,
    pub fingerprint: DocFingerprint,
}

/// One unit of reconciliation progress delivered to the caller's listener.
#[derive(Debug, Clone)]
pub struct DocSnapshotEvent {
    /// Identifier of the origin the progress is reported for.
    pub origin: String,
    pub progress: Progress,
    pub consistency: Consistency,
    /// Document mutations carried by this event; empty at this layer.
    pub mutations: Vec<DocMutation>,
}

/// Asynchronous event callback. Listener failures are a caller bug: the
/// emitter awaits but does not guard them.
pub type SnapshotListener = Arc<dyn Fn(DocSnapshotEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Synchronous progress callback used while building inventories.
pub type ProgressListener = Arc<dyn Fn(Progress) + Send + Sync>;

pub fn null_snapshot_listener() -> SnapshotListener {
    Arc::new(|_| async {}.boxed())
}

pub fn null_progress_listener() -> ProgressListener {
    Arc::new(|_| {})
}
