//! Reconciliation engine: compares two document inventories and moves
//! files and metadata until both hold the union at its most current
//! version.

use thiserror::Error;

use shelfsync_core::DocMetaError;
use shelfsync_store::StoreError;

pub mod events;
pub mod inventory;
pub mod progress;
pub mod queue;
pub mod transfer;
pub mod visibility;

pub use events::{
    Consistency, DocMutation, DocSnapshotEvent, MutationKind, ProgressListener, SnapshotListener,
    null_progress_listener, null_snapshot_listener,
};
pub use inventory::{to_sync_doc_map, to_sync_doc_map_from_refs};
pub use progress::{Progress, ProgressTracker};
pub use queue::{Completion, QueueError, WorkQueue};
pub use transfer::{
    SyncOrigin, TransferConfig, TransferMetrics, TransferResult, merge, synchronize_origins,
    transfer, transfer_with_config,
};
pub use visibility::change_visibility;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("metadata error: {0}")]
    Meta(#[from] DocMetaError),
    #[error("metadata body missing for fingerprint: {0}")]
    MissingDocMeta(String),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
